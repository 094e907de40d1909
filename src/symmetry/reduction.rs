use nalgebra::{Matrix3, Point3, Vector3};

use crate::core::cell::UnitCell;
use crate::core::spatial;
use crate::errors::DesignError;
use crate::symmetry::{SymmetrizedStructure, SymmetryOp, SymmetryOracle};

const DEFAULT_PRECISION: f64 = 1e-5;
const MAX_REDUCTION_SWEEPS: usize = 1000;
const MAX_OPERATION_RETRIES: usize = 20;

/// The built-in symmetry backend: Delaunay reduction through the obtuse
/// superbase (Selling) algorithm, with P1 answers to space-group queries.
#[derive(Debug, Clone)]
pub struct ReductionOracle {
    precision: f64,
}

impl ReductionOracle {
    pub fn new(precision: f64) -> Result<Self, DesignError> {
        if precision <= 0.0 {
            return Err(DesignError::SymmetryOracleFailure {
                operation: "construction",
                message: format!("precision {precision} is not positive"),
            });
        }
        Ok(Self { precision })
    }

    // This backend performs no symmetry search; every arrangement is P1.
    fn detect_space_group(&self, _precision: f64) -> u16 {
        1
    }

    fn label_p1_sites(structure: &mut SymmetrizedStructure) {
        for (index, site) in structure.sites.iter_mut().enumerate() {
            site.label = format!("{}{}", site.species.symbol(), index + 1);
            site.wyckoff = 'a';
            site.site_symmetry = "1".to_string();
            site.multiplicity = 1;
        }
    }
}

impl Default for ReductionOracle {
    fn default() -> Self {
        Self { precision: DEFAULT_PRECISION }
    }
}

/// Selling reduction of the superbase {b1, b2, b3, -(b1+b2+b3)}: while any
/// pairwise scalar product is positive, apply the exchange step. On success
/// all pairs are non-positive and (v1, v2, v3) is a Delaunay-reduced basis
/// of the same lattice.
pub fn delaunay_reduce_basis(
    basis: &Matrix3<f64>,
    precision: f64,
) -> Result<Matrix3<f64>, DesignError> {
    let b0: Vector3<f64> = basis.column(0).into_owned();
    let b1: Vector3<f64> = basis.column(1).into_owned();
    let b2: Vector3<f64> = basis.column(2).into_owned();
    let mut v = [b0, b1, b2, -(b0 + b1 + b2)];

    let scale = v.iter().map(|w| w.norm_squared()).fold(0.0f64, f64::max);
    let threshold = precision * scale.max(1.0);

    for _ in 0..MAX_REDUCTION_SWEEPS {
        let mut positive_pair = None;
        'search: for i in 0..4 {
            for j in (i + 1)..4 {
                if v[i].dot(&v[j]) > threshold {
                    positive_pair = Some((i, j));
                    break 'search;
                }
            }
        }

        let Some((i, j)) = positive_pair else {
            let mut columns = [v[0], v[1], v[2]];
            columns.sort_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()));

            let mut reduced = Matrix3::from_columns(&columns);
            // A negated axis spans the same lattice; restore right-handedness.
            if reduced.determinant() < 0.0 {
                let negated = -reduced.column(2);
                reduced.set_column(2, &negated);
            }
            return Ok(reduced);
        };

        let vi = v[i];
        for k in 0..4 {
            if k != i && k != j {
                v[k] += vi;
            }
        }
        v[i] = -vi;
    }

    Err(DesignError::SymmetryOracleFailure {
        operation: "delaunay_reduce",
        message: format!("superbase did not become obtuse within {MAX_REDUCTION_SWEEPS} sweeps"),
    })
}

impl SymmetryOracle for ReductionOracle {
    fn precision(&self) -> f64 {
        self.precision
    }

    fn delaunay_reduce(
        &self,
        cell: &mut UnitCell,
        positions: &mut [Point3<f64>],
    ) -> Result<(), DesignError> {
        let reduced = delaunay_reduce_basis(cell.basis(), self.precision)?;
        cell.set_basis(reduced).map_err(|error| {
            DesignError::InfeasibleReduction(format!("reduced basis is degenerate: {error}"))
        })?;

        for position in positions.iter_mut() {
            *position = spatial::wrap_position(cell, position);
        }
        Ok(())
    }

    fn to_primitive(&self, structure: &mut SymmetrizedStructure) -> Result<u16, DesignError> {
        // P1 backend: the cell is already primitive up to lattice reduction.
        let mut positions: Vec<Point3<f64>> =
            structure.sites.iter().map(|site| site.position).collect();
        let mut cell = structure.cell.clone();
        self.delaunay_reduce(&mut cell, &mut positions)?;

        structure.cell = cell;
        for (site, position) in structure.sites.iter_mut().zip(positions) {
            site.position = position;
        }
        Self::label_p1_sites(structure);
        Ok(1)
    }

    fn conventionalize(&self, structure: &mut SymmetrizedStructure) -> Result<u16, DesignError> {
        self.to_primitive(structure)
    }

    fn update_symmetry_information(
        &self,
        structure: &mut SymmetrizedStructure,
    ) -> Result<u16, DesignError> {
        Self::label_p1_sites(structure);
        Ok(1)
    }

    fn symmetry_operations(
        &self,
        _structure: &SymmetrizedStructure,
        space_group: u16,
    ) -> Result<Vec<SymmetryOp>, DesignError> {
        let mut precision = self.precision;
        let mut detected = self.detect_space_group(precision);
        for _ in 0..MAX_OPERATION_RETRIES {
            if detected == space_group {
                return Ok(vec![SymmetryOp::identity()]);
            }
            precision *= 0.8;
            detected = self.detect_space_group(precision);
        }

        Err(DesignError::SymmetryOracleFailure {
            operation: "symmetry_operations",
            message: format!(
                "detected space group {detected} does not match requested {space_group} after \
                 {MAX_OPERATION_RETRIES} retries"
            ),
        })
    }
}
