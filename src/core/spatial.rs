use nalgebra::Point3;

use crate::core::cell::{LatticePoint, TranslatedIndex, UnitCell};

/// Squared separation of `a` and the image of `b` at `cell`.
#[inline]
pub fn image_distance_sq(
    unit_cell: &UnitCell,
    a: &Point3<f64>,
    b: &Point3<f64>,
    cell: LatticePoint,
) -> f64 {
    let displacement = (b - a) + unit_cell.translation_vector(cell);
    displacement.norm_squared()
}

/// Squared separation for a (source atom, translated partner) pair.
#[inline]
pub fn pair_distance_sq(
    unit_cell: &UnitCell,
    positions: &[Point3<f64>],
    a: usize,
    partner: TranslatedIndex,
) -> f64 {
    image_distance_sq(unit_cell, &positions[a], &positions[partner.original], partner.cell)
}

/// Wraps one Cartesian position into the cell's [0, 1)^3 fractional box.
///
/// Idempotent on already-wrapped positions; same-cell distances are
/// unchanged (images shift accordingly).
pub fn wrap_position(unit_cell: &UnitCell, position: &Point3<f64>) -> Point3<f64> {
    let mut fractional = unit_cell.to_fractional(position);
    for c in 0..3 {
        let floor = fractional[c].floor();
        if floor != 0.0 {
            fractional[c] -= floor;
        }
    }
    unit_cell.to_cartesian(&fractional)
}

/// Squared separation under the minimum image convention: the fractional
/// delta is wrapped to [-0.5, 0.5] before converting back to Cartesian.
#[inline]
pub fn minimum_image_distance_sq(unit_cell: &UnitCell, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let mut delta = unit_cell.inverse_basis() * (b - a);
    for c in 0..3 {
        delta[c] -= delta[c].round();
    }
    (unit_cell.basis() * delta).norm_squared()
}

/// Per-axis image bound so that every lattice point within `cutoff` of the
/// origin cell is enumerated. Derived from the perpendicular cell heights.
pub fn image_search_bounds(unit_cell: &UnitCell, cutoff: f64) -> [i32; 3] {
    let heights = unit_cell.perpendicular_heights();
    let mut bounds = [0i32; 3];
    for c in 0..3 {
        bounds[c] = if heights[c] > 0.0 {
            (cutoff / heights[c]).ceil() as i32
        } else {
            0
        };
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_is_idempotent() {
        let cell = UnitCell::cubic(5.0);
        let p = Point3::new(-1.0, 7.5, 4.999);
        let wrapped = wrap_position(&cell, &p);
        let twice = wrap_position(&cell, &wrapped);
        assert!((wrapped - twice).norm() < 1e-12);

        let fractional = cell.to_fractional(&wrapped);
        for c in 0..3 {
            assert!((0.0..1.0).contains(&fractional[c]));
        }
    }

    #[test]
    fn image_distance_accounts_for_translation() {
        let cell = UnitCell::cubic(10.0);
        let a = Point3::new(0.5, 0.0, 0.0);
        let b = Point3::new(9.5, 0.0, 0.0);
        // Across the boundary the pair is only 1.0 apart.
        let d_sq = image_distance_sq(&cell, &a, &b, LatticePoint(-1, 0, 0));
        assert!((d_sq - 1.0).abs() < 1e-12);
    }

    #[test]
    fn search_bounds_scale_with_cutoff() {
        let cell = UnitCell::cubic(4.0);
        assert_eq!(image_search_bounds(&cell, 3.9), [1, 1, 1]);
        assert_eq!(image_search_bounds(&cell, 8.5), [3, 3, 3]);
    }
}
