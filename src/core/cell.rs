use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::ops::{Neg, Sub};

use crate::errors::DesignError;

const DETERMINANT_EPSILON: f64 = 1e-9;

/// Parallelepipedal repetition unit: basis columns are the lattice vectors
/// a, b, c. The inverse is cached and refreshed on every basis write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitCell {
    basis: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl UnitCell {
    pub fn new(basis: Matrix3<f64>) -> Result<Self, DesignError> {
        let inverse = Self::invert(&basis)?;
        Ok(Self { basis, inverse })
    }

    pub fn cubic(edge: f64) -> Self {
        Self::new(Matrix3::from_diagonal_element(edge)).expect("cubic cell with positive edge")
    }

    pub fn basis(&self) -> &Matrix3<f64> {
        &self.basis
    }

    pub fn inverse_basis(&self) -> &Matrix3<f64> {
        &self.inverse
    }

    pub fn set_basis(&mut self, basis: Matrix3<f64>) -> Result<(), DesignError> {
        self.inverse = Self::invert(&basis)?;
        self.basis = basis;
        Ok(())
    }

    /// `B += delta`, refreshing the cached inverse.
    pub fn apply_deformation(&mut self, delta: &Matrix3<f64>) -> Result<(), DesignError> {
        self.set_basis(self.basis + delta)
    }

    pub fn determinant(&self) -> f64 {
        self.basis.determinant()
    }

    pub fn volume(&self) -> f64 {
        self.determinant().abs()
    }

    pub fn is_feasible(&self) -> bool {
        let determinant = self.determinant();
        determinant.is_finite() && determinant.abs() > DETERMINANT_EPSILON
    }

    pub fn to_fractional(&self, cartesian: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.inverse * cartesian.coords)
    }

    pub fn to_cartesian(&self, fractional: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.basis * fractional.coords)
    }

    /// Cartesian translation for a lattice point: `B * (i, j, k)`.
    pub fn translation_vector(&self, point: LatticePoint) -> Vector3<f64> {
        self.basis * Vector3::new(point.0 as f64, point.1 as f64, point.2 as f64)
    }

    /// Distance from each basis vector to the plane of the other two.
    /// Governs how many lattice images fit inside a given cutoff.
    pub fn perpendicular_heights(&self) -> [f64; 3] {
        let volume = self.volume();
        let a = self.basis.column(0);
        let b = self.basis.column(1);
        let c = self.basis.column(2);

        [
            volume / b.cross(&c).norm(),
            volume / c.cross(&a).norm(),
            volume / a.cross(&b).norm(),
        ]
    }

    fn invert(basis: &Matrix3<f64>) -> Result<Matrix3<f64>, DesignError> {
        let determinant = basis.determinant();
        if !determinant.is_finite() || determinant.abs() <= DETERMINANT_EPSILON {
            return Err(DesignError::InvalidCell(format!(
                "basis determinant {determinant:.3e} is not invertible"
            )));
        }

        basis.try_inverse().ok_or_else(|| {
            DesignError::InvalidCell("basis inversion failed despite non-zero determinant".into())
        })
    }
}

/// Integer lattice translation (i, j, k); lexicographic ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct LatticePoint(pub i32, pub i32, pub i32);

impl LatticePoint {
    pub const ORIGIN: LatticePoint = LatticePoint(0, 0, 0);

    pub fn is_origin(&self) -> bool {
        *self == Self::ORIGIN
    }

    /// Lexicographically above the origin; the canonical half-space for
    /// self-image pairs.
    pub fn is_positive(&self) -> bool {
        *self > Self::ORIGIN
    }
}

impl Neg for LatticePoint {
    type Output = LatticePoint;

    fn neg(self) -> LatticePoint {
        LatticePoint(-self.0, -self.1, -self.2)
    }
}

impl Sub for LatticePoint {
    type Output = LatticePoint;

    fn sub(self, other: LatticePoint) -> LatticePoint {
        LatticePoint(self.0 - other.0, self.1 - other.1, self.2 - other.2)
    }
}

/// An atom of a translated image: index into the source cell plus the
/// lattice point of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TranslatedIndex {
    pub original: usize,
    pub cell: LatticePoint,
}

impl TranslatedIndex {
    pub fn new(original: usize, cell: LatticePoint) -> Self {
        Self { original, cell }
    }

    pub fn in_cell(original: usize) -> Self {
        Self { original, cell: LatticePoint::ORIGIN }
    }

    pub fn is_in_original_cell(&self) -> bool {
        self.cell.is_origin()
    }

    /// The ledger entry the partner holds for the same physical pair: from
    /// the partner's frame, `from` sits in the negated image.
    pub fn reverse_partner(&self, from: usize) -> TranslatedIndex {
        TranslatedIndex::new(from, -self.cell)
    }

    /// Re-expresses this image relative to `frame` (another image of the
    /// same source cell).
    pub fn relative_to(&self, frame: &TranslatedIndex) -> TranslatedIndex {
        TranslatedIndex::new(self.original, self.cell - frame.cell)
    }
}

/// Canonical unordered pair of atoms, possibly across cell images.
///
/// Same-cell form requires `a < b`; translated form requires `a < b`, or
/// `a == b` with a lexicographically positive lattice point. Every physical
/// pair has exactly one canonical representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    pub first: usize,
    pub second: TranslatedIndex,
}

impl PairKey {
    /// Canonicalises an arbitrary (first, second-image) pair. Returns `None`
    /// for a same-cell self pair, which is not a physical pair.
    pub fn canonical(first: usize, second: TranslatedIndex) -> Option<PairKey> {
        if first == second.original {
            if second.cell.is_origin() {
                return None;
            }
            let cell = if second.cell.is_positive() { second.cell } else { -second.cell };
            return Some(PairKey { first, second: TranslatedIndex::new(first, cell) });
        }

        if first < second.original {
            Some(PairKey { first, second })
        } else {
            Some(PairKey {
                first: second.original,
                second: TranslatedIndex::new(first, -second.cell),
            })
        }
    }

    pub fn is_same_cell(&self) -> bool {
        self.second.is_in_original_cell()
    }
}
