use nalgebra::Point3;

use crate::core::cell::TranslatedIndex;
use crate::core::domain::{
    AtomicRadii, Composition, CoordinationConstraints, IonicSpecies, SphericalAtom,
};
use crate::model::bonds::{BondKind, BondLedger};

/// The design-time form of an atom: identity, geometry rules, position, and
/// the mutable bond ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainingAtom {
    pub species: IonicSpecies,
    pub radii: AtomicRadii,
    pub coordination: CoordinationConstraints,
    pub position: Point3<f64>,
    pub(crate) ledger: BondLedger,
}

impl ConstrainingAtom {
    pub fn new(
        species: IonicSpecies,
        radii: AtomicRadii,
        coordination: CoordinationConstraints,
        position: Point3<f64>,
    ) -> Self {
        Self { species, radii, coordination, position, ledger: BondLedger::new() }
    }

    /// Rebuilds the design form from an optimizer atom; the ledger starts
    /// empty and is refilled by constraint derivation or an import.
    pub fn from_spherical(atom: &SphericalAtom, coordination: CoordinationConstraints) -> Self {
        Self::new(atom.species, atom.radii, coordination, atom.position)
    }

    pub fn to_spherical(&self) -> SphericalAtom {
        SphericalAtom::new(self.species, self.radii, self.position)
    }

    pub fn has_covalent_bond_with(&self, partner: TranslatedIndex) -> bool {
        self.ledger.contains(BondKind::Covalent, partner)
    }

    pub fn has_ionic_bond_with(&self, partner: TranslatedIndex) -> bool {
        self.ledger.contains(BondKind::Ionic, partner)
    }

    pub fn has_ionic_repulsion_with(&self, partner: TranslatedIndex) -> bool {
        self.ledger.contains(BondKind::IonicRepulsion, partner)
    }

    pub fn covalent_coordination_number(&self) -> usize {
        self.ledger.count(BondKind::Covalent)
    }

    pub fn ionic_coordination_number(&self) -> usize {
        self.ledger.count(BondKind::Ionic)
    }

    pub fn coordination_number(&self) -> usize {
        self.covalent_coordination_number() + self.ionic_coordination_number()
    }

    /// Multiset of partner elements over the covalent and ionic shells.
    pub fn coordination_composition(&self, atoms: &[ConstrainingAtom]) -> Composition {
        let mut composition = Composition::new();
        for partner in self.ledger.chemical_partners() {
            composition.add(atoms[partner.original].species.atomic_number);
        }
        composition
    }

    pub fn ledger(&self) -> &BondLedger {
        &self.ledger
    }

    /// Radius governing perturbation amplitude and sphere volume.
    pub fn characteristic_radius(&self) -> f64 {
        self.radii.characteristic_radius(&self.species)
    }
}
