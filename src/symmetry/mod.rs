pub mod reduction;

use nalgebra::{Matrix3, Point3, Vector3};

use crate::core::cell::UnitCell;
use crate::core::domain::IonicSpecies;
use crate::errors::DesignError;

pub use reduction::ReductionOracle;

/// One space-group operation in the reduced basis: integer rotation plus a
/// fractional translation in [0, 1).
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetryOp {
    pub rotation: Matrix3<i32>,
    pub translation: Vector3<f64>,
}

impl SymmetryOp {
    pub fn identity() -> Self {
        Self { rotation: Matrix3::identity(), translation: Vector3::zeros() }
    }

    /// CIF-style coordinate triplet, e.g. `x,y,z` or `-x,y+1/2,z`.
    pub fn to_xyz_triplet(&self) -> String {
        let axes = ["x", "y", "z"];
        let mut parts = Vec::with_capacity(3);

        for row in 0..3 {
            let mut term = String::new();
            for (col, axis) in axes.iter().enumerate() {
                match self.rotation[(row, col)] {
                    0 => {}
                    1 => {
                        if !term.is_empty() {
                            term.push('+');
                        }
                        term.push_str(axis);
                    }
                    -1 => {
                        term.push('-');
                        term.push_str(axis);
                    }
                    n => {
                        if n > 0 && !term.is_empty() {
                            term.push('+');
                        }
                        term.push_str(&format!("{n}{axis}"));
                    }
                }
            }

            let shift = fractional_label(self.translation[row]);
            if !shift.is_empty() {
                if term.is_empty() {
                    term.push_str(&shift);
                } else {
                    term.push('+');
                    term.push_str(&shift);
                }
            }
            if term.is_empty() {
                term.push('0');
            }
            parts.push(term);
        }

        parts.join(",")
    }
}

fn fractional_label(value: f64) -> String {
    const NAMED: [(f64, &str); 8] = [
        (0.0, ""),
        (0.5, "1/2"),
        (1.0 / 3.0, "1/3"),
        (2.0 / 3.0, "2/3"),
        (0.25, "1/4"),
        (0.75, "3/4"),
        (1.0 / 6.0, "1/6"),
        (5.0 / 6.0, "5/6"),
    ];
    for (fraction, label) in NAMED {
        if (value - fraction).abs() < 1e-6 {
            return label.to_string();
        }
    }
    format!("{value:.6}")
}

/// One crystallographic site with the symmetry bookkeeping an oracle fills.
#[derive(Debug, Clone, PartialEq)]
pub struct CrystallographicSite {
    pub species: IonicSpecies,
    pub position: Point3<f64>,
    pub label: String,
    pub wyckoff: char,
    pub site_symmetry: String,
    pub multiplicity: usize,
}

impl CrystallographicSite {
    pub fn new(species: IonicSpecies, position: Point3<f64>) -> Self {
        Self {
            species,
            position,
            label: String::new(),
            wyckoff: '?',
            site_symmetry: String::new(),
            multiplicity: 0,
        }
    }

    pub fn has_symmetry_information(&self) -> bool {
        !self.label.is_empty() && self.wyckoff != '?' && !self.site_symmetry.is_empty()
    }
}

/// A cell plus labelled sites, the unit of exchange with a symmetry backend.
#[derive(Debug, Clone)]
pub struct SymmetrizedStructure {
    pub cell: UnitCell,
    pub sites: Vec<CrystallographicSite>,
}

impl SymmetrizedStructure {
    pub fn new(cell: UnitCell, sites: Vec<CrystallographicSite>) -> Self {
        Self { cell, sites }
    }
}

/// The contract the design core requires from a space-group backend.
///
/// The reference implementation performs lattice reduction from scratch and
/// answers symmetry queries as P1; a full space-group library can be slotted
/// in behind this trait without touching the engine.
pub trait SymmetryOracle: Send + Sync {
    /// Oracle precision; positive.
    fn precision(&self) -> f64;

    /// Replaces the cell basis with a Delaunay-reduced one and wraps every
    /// position into the new [0, 1)^3 fractional box.
    fn delaunay_reduce(
        &self,
        cell: &mut UnitCell,
        positions: &mut [Point3<f64>],
    ) -> Result<(), DesignError>;

    /// Reduces to the primitive cell and labels the sites.
    fn to_primitive(&self, structure: &mut SymmetrizedStructure) -> Result<u16, DesignError>;

    /// Converts to the conventional cell and labels the sites.
    fn conventionalize(&self, structure: &mut SymmetrizedStructure) -> Result<u16, DesignError>;

    /// Labels the sites without changing cell or positions.
    fn update_symmetry_information(
        &self,
        structure: &mut SymmetrizedStructure,
    ) -> Result<u16, DesignError>;

    /// Operations consistent with the declared space group; retries with
    /// `precision * 0.8` up to 20 times before failing.
    fn symmetry_operations(
        &self,
        structure: &SymmetrizedStructure,
        space_group: u16,
    ) -> Result<Vec<SymmetryOp>, DesignError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_triplet() {
        assert_eq!(SymmetryOp::identity().to_xyz_triplet(), "x,y,z");
    }

    #[test]
    fn triplet_with_rotation_and_shift() {
        let mut rotation = Matrix3::identity();
        rotation[(0, 0)] = -1;
        let op = SymmetryOp { rotation, translation: Vector3::new(0.0, 0.5, 0.0) };
        assert_eq!(op.to_xyz_triplet(), "-x,y+1/2,z");
    }
}
