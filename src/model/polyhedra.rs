use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::cell::{PairKey, TranslatedIndex};
use crate::core::domain::{Composition, IonicSpecies};
use crate::model::atom::ConstrainingAtom;
use crate::model::bonds::BondKind;

/// How two coordination polyhedra share their common bridging anions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingClass {
    Vertex,
    Edge,
    Face,
}

impl SharingClass {
    pub fn from_count(common_anions: usize) -> Option<SharingClass> {
        match common_anions {
            0 => None,
            1 => Some(SharingClass::Vertex),
            2 => Some(SharingClass::Edge),
            _ => Some(SharingClass::Face),
        }
    }
}

/// Per-cation-pair caps on common bridging anion counts.
///
/// A missing entry leaves a pair unconstrained. Keys are stored with the
/// smaller species first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeasiblePolyhedraConnections {
    rules: BTreeMap<(IonicSpecies, IonicSpecies), Composition>,
}

impl FeasiblePolyhedraConnections {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn insert_rule(&mut self, a: IonicSpecies, b: IonicSpecies, caps: Composition) {
        self.rules.insert(Self::key(a, b), caps);
    }

    fn key(a: IonicSpecies, b: IonicSpecies) -> (IonicSpecies, IonicSpecies) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// The largest allowed sub-multiset of `observed`: each species count is
    /// capped by the rule for this pair of centres. Without a rule the
    /// observed multiset is already feasible.
    pub fn closest_feasible_common_bridging(
        &self,
        a: IonicSpecies,
        b: IonicSpecies,
        observed: &Composition,
    ) -> Composition {
        match self.rules.get(&Self::key(a, b)) {
            None => observed.clone(),
            Some(caps) => {
                let mut feasible = Vec::new();
                for (z, count) in observed.iter() {
                    feasible.push((z, count.min(caps.count(z))));
                }
                Composition::from_pairs(&feasible)
            }
        }
    }
}

/// The common-bridging-anion map for every linked pair of ionically bonded
/// centres. Bridging indices are expressed in the frame of the key's first
/// atom; the map ordering makes downstream pruning deterministic.
pub fn collect_links(atoms: &[ConstrainingAtom]) -> BTreeMap<PairKey, Vec<TranslatedIndex>> {
    let mut links: BTreeMap<PairKey, Vec<TranslatedIndex>> = BTreeMap::new();

    for (anion_index, anion) in atoms.iter().enumerate() {
        if !anion.species.is_anion() {
            continue;
        }

        let partners: Vec<TranslatedIndex> = anion.ledger().partners(BondKind::Ionic).collect();
        for (i, &p) in partners.iter().enumerate() {
            for &q in &partners[(i + 1)..] {
                // In p's frame, q sits at the relative image and the anion at
                // the negated one.
                let relative = q.relative_to(&p);
                let Some(key) = PairKey::canonical(p.original, relative) else {
                    continue;
                };

                let kept_first_frame = key.first == p.original && key.second == relative;
                let bridge = if kept_first_frame {
                    TranslatedIndex::new(anion_index, -p.cell)
                } else {
                    TranslatedIndex::new(anion_index, -q.cell)
                };

                links.entry(key).or_default().push(bridge);
            }
        }
    }

    for bridging in links.values_mut() {
        bridging.sort();
        bridging.dedup();
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::LatticePoint;
    use crate::core::domain::{AtomicRadii, CoordinationConstraints, RadiusRange};
    use nalgebra::Point3;

    fn ion(z: u8, q: i8, position: Point3<f64>) -> ConstrainingAtom {
        let radii = AtomicRadii {
            covalent: RadiusRange::zero(),
            ionic: RadiusRange::new(0.8, 1.2),
            repulsion: RadiusRange::new(0.8, 0.8),
        };
        ConstrainingAtom::new(
            IonicSpecies::new(z, q),
            radii,
            CoordinationConstraints::unconstrained(),
            position,
        )
    }

    #[test]
    fn sharing_class_from_counts() {
        assert_eq!(SharingClass::from_count(0), None);
        assert_eq!(SharingClass::from_count(1), Some(SharingClass::Vertex));
        assert_eq!(SharingClass::from_count(2), Some(SharingClass::Edge));
        assert_eq!(SharingClass::from_count(5), Some(SharingClass::Face));
    }

    #[test]
    fn caps_produce_largest_feasible_subset() {
        let mg = IonicSpecies::new(12, 2);
        let mut rules = FeasiblePolyhedraConnections::unconstrained();
        rules.insert_rule(mg, mg, Composition::from_pairs(&[(8, 3)]));

        let observed = Composition::from_pairs(&[(8, 4)]);
        let feasible = rules.closest_feasible_common_bridging(mg, mg, &observed);
        assert_eq!(feasible.count(8), 3);
        assert!(feasible.is_proper_subset_of(&observed));

        let unconstrained = FeasiblePolyhedraConnections::unconstrained();
        assert_eq!(
            unconstrained.closest_feasible_common_bridging(mg, mg, &observed),
            observed
        );
    }

    #[test]
    fn two_cations_sharing_two_anions_form_an_edge_link() {
        // Cations at 0 and 1, anions at 2 and 3, every cation bonded to both
        // anions in the same cell.
        let mut atoms = vec![
            ion(12, 2, Point3::new(0.0, 0.0, 0.0)),
            ion(12, 2, Point3::new(2.0, 0.0, 0.0)),
            ion(8, -2, Point3::new(1.0, 1.0, 0.0)),
            ion(8, -2, Point3::new(1.0, -1.0, 0.0)),
        ];
        for cation in 0..2usize {
            for anion in 2..4usize {
                atoms[cation].ledger.insert(BondKind::Ionic, TranslatedIndex::in_cell(anion));
                atoms[anion].ledger.insert(BondKind::Ionic, TranslatedIndex::in_cell(cation));
            }
        }

        let links = collect_links(&atoms);
        let key = PairKey::canonical(0, TranslatedIndex::in_cell(1)).unwrap();
        let bridging = links.get(&key).expect("link between the two cations");
        assert_eq!(bridging.len(), 2);
        assert_eq!(SharingClass::from_count(bridging.len()), Some(SharingClass::Edge));
    }

    #[test]
    fn translated_centres_keep_image_arithmetic() {
        // One cation bonded to one anion in-cell and to the anion's +x image;
        // the two cation images share that anion.
        let mut atoms = vec![
            ion(12, 2, Point3::new(0.5, 0.0, 0.0)),
            ion(8, -2, Point3::new(1.5, 0.0, 0.0)),
        ];
        let image = TranslatedIndex::new(0, LatticePoint(1, 0, 0));
        atoms[1].ledger.insert(BondKind::Ionic, TranslatedIndex::in_cell(0));
        atoms[1].ledger.insert(BondKind::Ionic, image);
        atoms[0].ledger.insert(BondKind::Ionic, TranslatedIndex::in_cell(1));
        atoms[0].ledger.insert(BondKind::Ionic, TranslatedIndex::new(1, LatticePoint(-1, 0, 0)));

        let links = collect_links(&atoms);
        assert_eq!(links.len(), 1);
        let (key, bridging) = links.iter().next().unwrap();
        assert_eq!(key.first, 0);
        assert_eq!(key.second.original, 0);
        assert!(key.second.cell.is_positive());
        assert_eq!(bridging.len(), 1);
        assert_eq!(bridging[0].original, 1);
    }
}
