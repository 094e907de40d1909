use std::collections::BTreeSet;

use crate::core::cell::TranslatedIndex;

/// The three stored pair classes. Exclusions are the derived complement and
/// are never written into a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondKind {
    Covalent,
    Ionic,
    IonicRepulsion,
}

impl BondKind {
    pub const ALL: [BondKind; 3] = [BondKind::Covalent, BondKind::Ionic, BondKind::IonicRepulsion];
}

/// Per-atom record of bonded partners, each expressed in this atom's frame.
///
/// Same-cell partners carry the origin lattice point. Ordered sets keep
/// every iteration deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondLedger {
    covalent: BTreeSet<TranslatedIndex>,
    ionic: BTreeSet<TranslatedIndex>,
    repulsion: BTreeSet<TranslatedIndex>,
}

impl BondLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, kind: BondKind) -> &BTreeSet<TranslatedIndex> {
        match kind {
            BondKind::Covalent => &self.covalent,
            BondKind::Ionic => &self.ionic,
            BondKind::IonicRepulsion => &self.repulsion,
        }
    }

    fn set_mut(&mut self, kind: BondKind) -> &mut BTreeSet<TranslatedIndex> {
        match kind {
            BondKind::Covalent => &mut self.covalent,
            BondKind::Ionic => &mut self.ionic,
            BondKind::IonicRepulsion => &mut self.repulsion,
        }
    }

    pub fn insert(&mut self, kind: BondKind, partner: TranslatedIndex) -> bool {
        self.set_mut(kind).insert(partner)
    }

    pub fn remove(&mut self, kind: BondKind, partner: TranslatedIndex) -> bool {
        self.set_mut(kind).remove(&partner)
    }

    pub fn contains(&self, kind: BondKind, partner: TranslatedIndex) -> bool {
        self.set(kind).contains(&partner)
    }

    pub fn partners(&self, kind: BondKind) -> impl Iterator<Item = TranslatedIndex> + '_ {
        self.set(kind).iter().copied()
    }

    pub fn count(&self, kind: BondKind) -> usize {
        self.set(kind).len()
    }

    /// Partners counted for the coordination shell: covalent plus ionic.
    pub fn chemical_partners(&self) -> impl Iterator<Item = TranslatedIndex> + '_ {
        self.covalent.iter().chain(self.ionic.iter()).copied()
    }

    pub fn clear(&mut self) {
        self.covalent.clear();
        self.ionic.clear();
        self.repulsion.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.covalent.is_empty() && self.ionic.is_empty() && self.repulsion.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::LatticePoint;

    #[test]
    fn insert_and_query_per_kind() {
        let mut ledger = BondLedger::new();
        let partner = TranslatedIndex::new(3, LatticePoint(1, 0, 0));

        assert!(ledger.insert(BondKind::Ionic, partner));
        assert!(!ledger.insert(BondKind::Ionic, partner));
        assert!(ledger.contains(BondKind::Ionic, partner));
        assert!(!ledger.contains(BondKind::Covalent, partner));
        assert_eq!(ledger.count(BondKind::Ionic), 1);

        assert!(ledger.remove(BondKind::Ionic, partner));
        assert!(ledger.is_empty());
    }

    #[test]
    fn chemical_partners_merge_covalent_and_ionic() {
        let mut ledger = BondLedger::new();
        ledger.insert(BondKind::Covalent, TranslatedIndex::in_cell(1));
        ledger.insert(BondKind::Ionic, TranslatedIndex::in_cell(2));
        ledger.insert(BondKind::IonicRepulsion, TranslatedIndex::in_cell(4));

        assert_eq!(ledger.chemical_partners().count(), 2);
    }
}
