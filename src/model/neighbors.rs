use nalgebra::Point3;

use crate::core::cell::{LatticePoint, TranslatedIndex, UnitCell};
use crate::core::spatial;

/// One registered (source atom, translated partner) pair, in canonical form:
/// `original < partner.original`, or equal originals with a lexicographically
/// positive lattice point. Same-cell pairs are never registered here; they
/// are enumerated directly from the atom list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TranslatedPair {
    pub original: usize,
    pub partner: TranslatedIndex,
}

/// Scans every pair and every lattice image within the cutoff and records
/// those whose distance is below `cutoff_ratio * (r_a + r_b)`.
///
/// `radii` are the per-atom tracing radii; the image bound is wide enough
/// that no qualifying image is missed.
pub fn collect_translated_pairs(
    cell: &UnitCell,
    positions: &[Point3<f64>],
    radii: &[f64],
    cutoff_ratio: f64,
) -> Vec<TranslatedPair> {
    debug_assert_eq!(positions.len(), radii.len());

    let max_radius = radii.iter().copied().fold(0.0f64, f64::max);
    let max_cutoff = cutoff_ratio * 2.0 * max_radius;
    let bounds = spatial::image_search_bounds(cell, max_cutoff);

    let mut pairs = Vec::new();
    for a in 0..positions.len() {
        for b in a..positions.len() {
            let cutoff = cutoff_ratio * (radii[a] + radii[b]);
            let cutoff_sq = cutoff * cutoff;

            for i in -bounds[0]..=bounds[0] {
                for j in -bounds[1]..=bounds[1] {
                    for k in -bounds[2]..=bounds[2] {
                        let image = LatticePoint(i, j, k);
                        if image.is_origin() {
                            continue;
                        }
                        // Self pairs keep only the positive half-space so each
                        // physical pair is registered once.
                        if a == b && !image.is_positive() {
                            continue;
                        }

                        let d_sq =
                            spatial::image_distance_sq(cell, &positions[a], &positions[b], image);
                        if d_sq < cutoff_sq {
                            pairs.push(TranslatedPair {
                                original: a,
                                partner: TranslatedIndex::new(b, image),
                            });
                        }
                    }
                }
            }
        }
    }

    pairs
}

/// Filters already-traced pairs down to the tighter constraining cutoff.
pub fn filter_constraining_pairs(
    cell: &UnitCell,
    positions: &[Point3<f64>],
    radii: &[f64],
    tracing_pairs: &[TranslatedPair],
    cutoff_ratio: f64,
) -> Vec<TranslatedPair> {
    tracing_pairs
        .iter()
        .copied()
        .filter(|pair| {
            let cutoff = cutoff_ratio * (radii[pair.original] + radii[pair.partner.original]);
            let d_sq = spatial::pair_distance_sq(cell, positions, pair.original, pair.partner);
            d_sq < cutoff * cutoff
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traces_images_across_the_boundary() {
        let cell = UnitCell::cubic(4.0);
        let positions = vec![Point3::new(0.5, 2.0, 2.0), Point3::new(3.5, 2.0, 2.0)];
        let radii = vec![1.0, 1.0];

        let pairs = collect_translated_pairs(&cell, &positions, &radii, 1.0);
        // Distance through the -x image is 1.0 < 2.0; the in-cell distance
        // (3.0) is a same-cell concern, not a translated pair.
        assert!(pairs
            .iter()
            .any(|p| p.original == 0
                && p.partner == TranslatedIndex::new(1, LatticePoint(-1, 0, 0))));
        for pair in &pairs {
            assert!(pair.original <= pair.partner.original);
            assert!(!pair.partner.cell.is_origin());
        }
    }

    #[test]
    fn self_image_pairs_use_positive_half_space() {
        let cell = UnitCell::cubic(2.0);
        let positions = vec![Point3::new(1.0, 1.0, 1.0)];
        let radii = vec![1.5];

        let pairs = collect_translated_pairs(&cell, &positions, &radii, 1.0);
        assert!(!pairs.is_empty());
        for pair in &pairs {
            assert!(pair.partner.cell.is_positive());
        }
    }

    #[test]
    fn constraining_pairs_are_a_subset() {
        let cell = UnitCell::cubic(5.0);
        let positions = vec![Point3::new(0.5, 0.5, 0.5), Point3::new(4.3, 0.5, 0.5)];
        let radii = vec![1.0, 1.0];

        let tracing = collect_translated_pairs(&cell, &positions, &radii, 2.0);
        let constraining =
            filter_constraining_pairs(&cell, &positions, &radii, &tracing, 1.0);

        assert!(constraining.len() <= tracing.len());
        for pair in &constraining {
            assert!(tracing.contains(pair));
            let d_sq = spatial::pair_distance_sq(&cell, &positions, pair.original, pair.partner);
            let cutoff = radii[pair.original] + radii[pair.partner.original];
            assert!(d_sq < cutoff * cutoff);
        }
    }
}
