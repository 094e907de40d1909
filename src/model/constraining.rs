use log::debug;
use nalgebra::{Matrix3, Point3, Vector3};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::core::cell::{TranslatedIndex, UnitCell};
use crate::core::domain::Composition;
use crate::core::spatial;
use crate::errors::DesignError;
use crate::model::atom::ConstrainingAtom;
use crate::model::bonds::BondKind;
use crate::model::neighbors::{self, TranslatedPair};
use crate::model::objective::ObjectiveCrystalStructure;
use crate::model::polyhedra::{self, FeasiblePolyhedraConnections};
use crate::symmetry::SymmetryOracle;

const DEFAULT_MINIMUM_PACKING_FRACTION: f64 = 0.2;

/// Geometry rules shared by the constraint derivation, the feasibility
/// predicates, and the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeometricalConstraintParameters {
    /// rho: multiplier (< 1) on summed maximum radii for non-bonded approach.
    pub minimum_exclusion_distance_ratio: f64,
    /// Wide cutoff ratio for the periodic tracer.
    pub tracer_cutoff_ratio: f64,
    /// Tight cutoff ratio for constraining pairs.
    pub constrainer_cutoff_ratio: f64,
    /// Soft staleness timeouts, in force steps.
    pub cell_reduction_timeout: usize,
    pub tracer_timeout: usize,
    pub minimum_packing_fraction: f64,
}

impl Default for GeometricalConstraintParameters {
    fn default() -> Self {
        Self {
            minimum_exclusion_distance_ratio: 0.85,
            tracer_cutoff_ratio: 2.0,
            constrainer_cutoff_ratio: 1.2,
            cell_reduction_timeout: 2000,
            tracer_timeout: 600,
            minimum_packing_fraction: DEFAULT_MINIMUM_PACKING_FRACTION,
        }
    }
}

/// The design view of a structure under construction: unit cell, atoms with
/// bond ledgers, the periodic neighbor indices, the polyhedra rules, and the
/// structure-owned RNG.
#[derive(Debug, Clone)]
pub struct ConstrainingCrystalStructure {
    cell: UnitCell,
    atoms: Vec<ConstrainingAtom>,
    tracing_pairs: Vec<TranslatedPair>,
    constraining_pairs: Vec<TranslatedPair>,
    polyhedra_rules: FeasiblePolyhedraConnections,

    feasible_error_rate: f64,
    exclusion_ratio: f64,
    tracer_cutoff_ratio: f64,
    constrainer_cutoff_ratio: f64,
    minimum_packing_fraction: f64,

    rng: ChaCha8Rng,
}

impl ConstrainingCrystalStructure {
    pub fn new(
        cell: UnitCell,
        atoms: Vec<ConstrainingAtom>,
        polyhedra_rules: FeasiblePolyhedraConnections,
    ) -> Self {
        Self::with_rng(cell, atoms, polyhedra_rules, ChaCha8Rng::from_entropy())
    }

    /// Reproducible construction for tests and seeded production runs.
    pub fn with_seed(
        cell: UnitCell,
        atoms: Vec<ConstrainingAtom>,
        polyhedra_rules: FeasiblePolyhedraConnections,
        seed: u64,
    ) -> Self {
        Self::with_rng(cell, atoms, polyhedra_rules, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(
        cell: UnitCell,
        atoms: Vec<ConstrainingAtom>,
        polyhedra_rules: FeasiblePolyhedraConnections,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            cell,
            atoms,
            tracing_pairs: Vec::new(),
            constraining_pairs: Vec::new(),
            polyhedra_rules,
            feasible_error_rate: 0.0,
            exclusion_ratio: 1.0,
            tracer_cutoff_ratio: 2.0,
            constrainer_cutoff_ratio: 1.2,
            minimum_packing_fraction: DEFAULT_MINIMUM_PACKING_FRACTION,
            rng,
        }
    }

    // --- Accessors ---

    pub fn cell(&self) -> &UnitCell {
        &self.cell
    }

    pub fn atoms(&self) -> &[ConstrainingAtom] {
        &self.atoms
    }

    pub fn constraining_pairs(&self) -> &[TranslatedPair] {
        &self.constraining_pairs
    }

    pub fn tracing_pairs(&self) -> &[TranslatedPair] {
        &self.tracing_pairs
    }

    pub fn feasible_error_rate(&self) -> f64 {
        self.feasible_error_rate
    }

    pub fn exclusion_ratio(&self) -> f64 {
        self.exclusion_ratio
    }

    pub fn set_feasible_error_rate(&mut self, rate: f64) {
        self.feasible_error_rate = rate;
    }

    pub fn set_geometrical_parameters(&mut self, parameters: &GeometricalConstraintParameters) {
        self.exclusion_ratio = parameters.minimum_exclusion_distance_ratio;
        self.tracer_cutoff_ratio = parameters.tracer_cutoff_ratio;
        self.constrainer_cutoff_ratio = parameters.constrainer_cutoff_ratio;
        self.minimum_packing_fraction = parameters.minimum_packing_fraction;
    }

    fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|atom| atom.position).collect()
    }

    fn tracing_radii(&self) -> Vec<f64> {
        self.atoms.iter().map(|atom| atom.radii.tracing_radius()).collect()
    }

    fn pair_distance_sq(&self, a: usize, partner: TranslatedIndex) -> f64 {
        spatial::image_distance_sq(
            &self.cell,
            &self.atoms[a].position,
            &self.atoms[partner.original].position,
            partner.cell,
        )
    }

    // --- Species pair classification ---

    pub fn is_ionic_attractive(&self, a: usize, b: usize) -> bool {
        let qa = self.atoms[a].species.formal_charge as i32;
        let qb = self.atoms[b].species.formal_charge as i32;
        qa * qb < 0
    }

    pub fn is_ionic_repulsive(&self, a: usize, b: usize) -> bool {
        let qa = self.atoms[a].species.formal_charge as i32;
        let qb = self.atoms[b].species.formal_charge as i32;
        qa * qb > 0
    }

    pub fn is_innate_covalent_bondable(&self, a: usize, b: usize) -> bool {
        !self.atoms[a].radii.covalent.is_null() && !self.atoms[b].radii.covalent.is_null()
    }

    pub fn is_innate_ionic_bondable(&self, a: usize, b: usize) -> bool {
        self.is_ionic_attractive(a, b)
            && !self.atoms[a].radii.ionic.is_null()
            && !self.atoms[b].radii.ionic.is_null()
    }

    pub fn is_innate_chemical_bondable(&self, a: usize, b: usize) -> bool {
        self.is_innate_covalent_bondable(a, b) || self.is_innate_ionic_bondable(a, b)
    }

    // --- Constraining distance windows ---

    fn within_window(&self, a: usize, partner: TranslatedIndex, radius_sum: f64) -> bool {
        let cutoff = self.constrainer_cutoff_ratio * radius_sum;
        self.pair_distance_sq(a, partner) < cutoff * cutoff
    }

    pub fn is_constrainable_covalent_distance(&self, a: usize, partner: TranslatedIndex) -> bool {
        let sum = self.atoms[a].radii.covalent.maximum
            + self.atoms[partner.original].radii.covalent.maximum;
        self.within_window(a, partner, sum)
    }

    pub fn is_constrainable_ionic_distance(&self, a: usize, partner: TranslatedIndex) -> bool {
        let sum =
            self.atoms[a].radii.ionic.maximum + self.atoms[partner.original].radii.ionic.maximum;
        self.within_window(a, partner, sum)
    }

    pub fn is_constrainable_repulsion_distance(&self, a: usize, partner: TranslatedIndex) -> bool {
        let sum = self.atoms[a].radii.repulsion.minimum
            + self.atoms[partner.original].radii.repulsion.minimum;
        self.within_window(a, partner, sum)
    }

    // --- Feasibility predicates ---

    fn bond_window_ok(&self, d_sq: f64, minimum: f64, maximum: f64) -> bool {
        let eps = self.feasible_error_rate;
        let lower = (1.0 - eps) * minimum;
        let upper = (1.0 + eps) * maximum;
        lower * lower <= d_sq && d_sq <= upper * upper
    }

    fn approach_ok(&self, d_sq: f64, minimum: f64) -> bool {
        let lower = (1.0 - self.feasible_error_rate) * minimum;
        d_sq >= lower * lower
    }

    pub fn is_feasible_covalent_bond(&self, a: usize, partner: TranslatedIndex) -> bool {
        let ra = &self.atoms[a].radii.covalent;
        let rb = &self.atoms[partner.original].radii.covalent;
        self.bond_window_ok(
            self.pair_distance_sq(a, partner),
            ra.minimum + rb.minimum,
            ra.maximum + rb.maximum,
        )
    }

    pub fn is_feasible_ionic_bond(&self, a: usize, partner: TranslatedIndex) -> bool {
        let ra = &self.atoms[a].radii.ionic;
        let rb = &self.atoms[partner.original].radii.ionic;
        self.bond_window_ok(
            self.pair_distance_sq(a, partner),
            ra.minimum + rb.minimum,
            ra.maximum + rb.maximum,
        )
    }

    pub fn is_feasible_covalent_exclusion(&self, a: usize, partner: TranslatedIndex) -> bool {
        let sum = self.atoms[a].radii.covalent.maximum
            + self.atoms[partner.original].radii.covalent.maximum;
        self.approach_ok(self.pair_distance_sq(a, partner), self.exclusion_ratio * sum)
    }

    pub fn is_feasible_ionic_exclusion(&self, a: usize, partner: TranslatedIndex) -> bool {
        let sum =
            self.atoms[a].radii.ionic.maximum + self.atoms[partner.original].radii.ionic.maximum;
        self.approach_ok(self.pair_distance_sq(a, partner), self.exclusion_ratio * sum)
    }

    pub fn is_feasible_ionic_repulsion(&self, a: usize, partner: TranslatedIndex) -> bool {
        let sum = self.atoms[a].radii.repulsion.minimum
            + self.atoms[partner.original].radii.repulsion.minimum;
        self.approach_ok(self.pair_distance_sq(a, partner), sum)
    }

    // --- Neighbor index maintenance ---

    /// Rebuilds the wide periodic pair index from current positions.
    pub fn update_tracing_index_pairs(&mut self) {
        let positions = self.positions();
        let radii = self.tracing_radii();
        self.tracing_pairs = neighbors::collect_translated_pairs(
            &self.cell,
            &positions,
            &radii,
            self.tracer_cutoff_ratio,
        );
        self.constraining_pairs.clear();
    }

    /// Filters the tracer output to the constraining window, then derives
    /// chemical bonds and prunes infeasible coordination shells.
    pub fn create_interatomic_distance_constraints(&mut self) {
        let positions = self.positions();
        let radii = self.tracing_radii();
        self.constraining_pairs = neighbors::filter_constraining_pairs(
            &self.cell,
            &positions,
            &radii,
            &self.tracing_pairs,
            self.constrainer_cutoff_ratio,
        );

        self.create_chemical_bonds();
        self.optimize_coordination_compositions();
    }

    pub fn clear_interatomic_distance_constraints(&mut self) {
        self.tracing_pairs.clear();
        self.constraining_pairs.clear();
    }

    pub fn normalize_fractional_coordinates(&mut self) {
        for atom in &mut self.atoms {
            atom.position = spatial::wrap_position(&self.cell, &atom.position);
        }
    }

    // --- Bond creation and erasure ---

    fn create_pair(&mut self, kind: BondKind, a: usize, partner: TranslatedIndex) {
        for other in BondKind::ALL {
            if other != kind {
                self.erase_pair(other, a, partner);
            }
        }
        let back = partner.reverse_partner(a);
        self.atoms[a].ledger.insert(kind, partner);
        self.atoms[partner.original].ledger.insert(kind, back);
    }

    fn erase_pair(&mut self, kind: BondKind, a: usize, partner: TranslatedIndex) {
        let back = partner.reverse_partner(a);
        self.atoms[a].ledger.remove(kind, partner);
        self.atoms[partner.original].ledger.remove(kind, back);
    }

    pub fn create_covalent_bond(&mut self, a: usize, partner: TranslatedIndex) {
        self.create_pair(BondKind::Covalent, a, partner);
    }

    pub fn create_ionic_bond(&mut self, a: usize, partner: TranslatedIndex) {
        self.create_pair(BondKind::Ionic, a, partner);
    }

    pub fn create_ionic_repulsion(&mut self, a: usize, partner: TranslatedIndex) {
        self.create_pair(BondKind::IonicRepulsion, a, partner);
    }

    pub fn erase_covalent_bond(&mut self, a: usize, partner: TranslatedIndex) {
        self.erase_pair(BondKind::Covalent, a, partner);
    }

    pub fn erase_ionic_bond(&mut self, a: usize, partner: TranslatedIndex) {
        self.erase_pair(BondKind::Ionic, a, partner);
    }

    pub fn erase_ionic_repulsion(&mut self, a: usize, partner: TranslatedIndex) {
        self.erase_pair(BondKind::IonicRepulsion, a, partner);
    }

    pub fn clear_bonds(&mut self) {
        for atom in &mut self.atoms {
            atom.ledger.clear();
        }
    }

    /// Applies the bond derivation rules to every same-cell pair and every
    /// constraining translated pair.
    pub fn create_chemical_bonds(&mut self) {
        let n = self.atoms.len();
        for a in 0..n {
            for b in (a + 1)..n {
                self.derive_pair(a, TranslatedIndex::in_cell(b));
            }
        }

        let pairs = self.constraining_pairs.clone();
        for pair in pairs {
            self.derive_pair(pair.original, pair.partner);
        }
    }

    fn derive_pair(&mut self, a: usize, partner: TranslatedIndex) {
        let b = partner.original;

        if self.is_innate_chemical_bondable(a, b) {
            if self.is_ionic_attractive(a, b) {
                if self.is_innate_ionic_bondable(a, b)
                    && self.is_constrainable_ionic_distance(a, partner)
                {
                    self.create_ionic_bond(a, partner);
                }
            } else if self.is_ionic_repulsive(a, b) {
                if self.is_innate_covalent_bondable(a, b)
                    && self.is_constrainable_covalent_distance(a, partner)
                {
                    self.create_covalent_bond(a, partner);
                } else {
                    self.create_ionic_repulsion(a, partner);
                }
            } else if self.is_innate_covalent_bondable(a, b)
                && self.is_constrainable_covalent_distance(a, partner)
            {
                self.create_covalent_bond(a, partner);
            }
        } else if self.is_ionic_repulsive(a, b) {
            self.create_ionic_repulsion(a, partner);
        }
    }

    // --- Coordination shell pruning ---

    pub fn coordination_composition(&self, index: usize) -> Composition {
        self.atoms[index].coordination_composition(&self.atoms)
    }

    pub fn has_feasible_coordination_composition_at(&self, index: usize) -> bool {
        let constraints = &self.atoms[index].coordination;
        if !constraints.is_constrained() {
            return true;
        }

        if constraints.has_feasible_compositions() {
            return constraints.allows(&self.coordination_composition(index));
        }

        let atom = &self.atoms[index];
        let covalent_ok = !constraints.has_feasible_covalent_coordination_numbers()
            || constraints.allows_covalent_number(atom.covalent_coordination_number());
        let ionic_ok = !constraints.has_feasible_ionic_coordination_numbers()
            || constraints.allows_ionic_number(atom.ionic_coordination_number());
        covalent_ok && ionic_ok
    }

    pub fn has_feasible_coordination_composition(&self) -> bool {
        (0..self.atoms.len()).all(|index| self.has_feasible_coordination_composition_at(index))
    }

    /// Partners of the centre in the given bond kinds, filtered by species,
    /// ordered by ascending squared bond length.
    fn ordered_partners(
        &self,
        centre: usize,
        kinds: &[BondKind],
        species_filter: Option<u8>,
    ) -> Vec<(f64, TranslatedIndex)> {
        let mut partners: Vec<(f64, TranslatedIndex)> = Vec::new();
        for &kind in kinds {
            for partner in self.atoms[centre].ledger.partners(kind) {
                if let Some(z) = species_filter {
                    if self.atoms[partner.original].species.atomic_number != z {
                        continue;
                    }
                }
                partners.push((self.pair_distance_sq(centre, partner), partner));
            }
        }
        partners.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        partners
    }

    /// Trims every over-coordinated centre down to its closest allowed
    /// environment, popping the longest bonds first.
    pub fn optimize_coordination_compositions(&mut self) {
        for centre in 0..self.atoms.len() {
            let constraints = self.atoms[centre].coordination.clone();

            if constraints.has_feasible_compositions() {
                self.make_closest_coordination_composition(centre);
            } else if constraints.has_feasible_covalent_coordination_numbers()
                || constraints.has_feasible_ionic_coordination_numbers()
            {
                self.make_closest_coordination_numbers(centre);
            }
        }
    }

    fn make_closest_coordination_composition(&mut self, centre: usize) {
        let constraints = self.atoms[centre].coordination.clone();
        if self.atoms[centre].coordination_number() <= constraints.max_coordination_number() {
            return;
        }

        let current = self.coordination_composition(centre);
        let closest = constraints.closest_feasible(&current).clone();

        for (z, target) in closest.iter() {
            let mut partners = self.ordered_partners(
                centre,
                &[BondKind::Covalent, BondKind::Ionic],
                Some(z),
            );
            while target < partners.len() {
                let (_, longest) = partners.pop().expect("non-empty partner list");
                self.erase_covalent_bond(centre, longest);
                self.erase_ionic_bond(centre, longest);
            }
        }
    }

    fn make_closest_coordination_numbers(&mut self, centre: usize) {
        let constraints = self.atoms[centre].coordination.clone();

        let covalent_count = self.atoms[centre].covalent_coordination_number();
        let ionic_count = self.atoms[centre].ionic_coordination_number();

        let lower_bound = if constraints.has_lower_bound_compositions() {
            let covalent = self.shell_composition(centre, BondKind::Covalent);
            let ionic = self.shell_composition(centre, BondKind::Ionic);
            Some(constraints.closest_lower_bound(&covalent, &ionic))
        } else {
            None
        };

        if constraints.has_feasible_covalent_coordination_numbers() {
            let target = constraints.closest_feasible_covalent_number(covalent_count);
            if target < covalent_count {
                self.truncate_shell(centre, BondKind::Covalent, target, lower_bound.as_ref());
            }
        }

        if constraints.has_feasible_ionic_coordination_numbers() {
            let target = constraints.closest_feasible_ionic_number(ionic_count);
            if target < ionic_count {
                self.truncate_shell(centre, BondKind::Ionic, target, lower_bound.as_ref());
            }
        }
    }

    fn shell_composition(&self, centre: usize, kind: BondKind) -> Composition {
        let mut composition = Composition::new();
        for partner in self.atoms[centre].ledger.partners(kind) {
            composition.add(self.atoms[partner.original].species.atomic_number);
        }
        composition
    }

    fn truncate_shell(
        &mut self,
        centre: usize,
        kind: BondKind,
        target: usize,
        lower_bound: Option<&Composition>,
    ) {
        let mut partners = self.ordered_partners(centre, &[kind], None);
        let mut protected_streak = 0usize;

        while target < partners.len() && protected_streak < partners.len() {
            let (_, longest) = *partners.last().expect("non-empty partner list");
            let z = self.atoms[longest.original].species.atomic_number;

            let erasable = match lower_bound {
                None => true,
                Some(bound) => {
                    let shell = self.shell_composition(centre, kind);
                    bound.count(z) < shell.count(z)
                }
            };

            if erasable {
                self.erase_covalent_bond(centre, longest);
                self.erase_ionic_bond(centre, longest);
                partners.pop();
                protected_streak = 0;
            } else {
                // Lower bound protects this species; rotate it to the front
                // and try the next longest.
                let last = partners.pop().expect("non-empty partner list");
                partners.insert(0, last);
                protected_streak += 1;
            }
        }
    }

    /// Erases every stored chemical bond whose current distance violates its
    /// feasibility window at the current error rate.
    pub fn erase_infeasible_chemical_bonds(&mut self) {
        let mut infeasible: Vec<(BondKind, usize, TranslatedIndex)> = Vec::new();
        for a in 0..self.atoms.len() {
            for partner in self.atoms[a].ledger.partners(BondKind::Covalent) {
                if !self.is_feasible_covalent_bond(a, partner) {
                    infeasible.push((BondKind::Covalent, a, partner));
                }
            }
            for partner in self.atoms[a].ledger.partners(BondKind::Ionic) {
                if !self.is_feasible_ionic_bond(a, partner) {
                    infeasible.push((BondKind::Ionic, a, partner));
                }
            }
        }

        for (kind, a, partner) in infeasible {
            self.erase_pair(kind, a, partner);
        }
    }

    // --- Polyhedra connectivity ---

    /// Deterministic endpoint preference: keep the bridging bond of the
    /// central-cell atom when the other centre is an image.
    fn will_choose_original_atom_index(key: &crate::core::cell::PairKey) -> bool {
        key.second.is_in_original_cell()
    }

    /// Shrinks every over-shared polyhedra link to its feasible bridging
    /// multiset, dropping randomly chosen excess anion bonds.
    pub fn erase_infeasible_ionic_polyhedra_connections(&mut self) {
        let links = polyhedra::collect_links(&self.atoms);

        for (key, bridging) in links {
            let species_a = self.atoms[key.first].species;
            let species_b = self.atoms[key.second.original].species;

            let mut observed = Composition::new();
            for bridge in &bridging {
                observed.add(self.atoms[bridge.original].species.atomic_number);
            }

            let feasible = self.polyhedra_rules.closest_feasible_common_bridging(
                species_a,
                species_b,
                &observed,
            );
            if !feasible.is_proper_subset_of(&observed) {
                continue;
            }

            for z in observed.species().collect::<Vec<_>>() {
                let target = feasible.count(z);
                let observed_count = observed.count(z);
                if observed_count <= target {
                    continue;
                }

                let mut candidates: Vec<TranslatedIndex> = bridging
                    .iter()
                    .copied()
                    .filter(|bridge| {
                        self.atoms[bridge.original].species.atomic_number == z
                    })
                    .collect();
                candidates.shuffle(&mut self.rng);

                for _ in target..observed_count {
                    let victim = candidates.pop().expect("excess bridging anion");

                    if Self::will_choose_original_atom_index(&key) {
                        self.erase_ionic_bond(key.first, victim);
                    } else {
                        let relative = victim.relative_to(&key.second);
                        self.erase_ionic_bond(key.second.original, relative);
                    }
                }
            }
        }
    }

    // --- Global feasibility ---

    /// Coordination compositions plus every same-cell and constraining pair
    /// under its applicable predicate.
    pub fn is_feasible(&self) -> bool {
        if !self.has_feasible_coordination_composition() {
            return false;
        }

        let n = self.atoms.len();
        for a in 0..n {
            for b in (a + 1)..n {
                if !self.pair_is_feasible(a, TranslatedIndex::in_cell(b)) {
                    return false;
                }
            }
        }

        self.constraining_pairs
            .iter()
            .all(|pair| self.pair_is_feasible(pair.original, pair.partner))
    }

    fn pair_is_feasible(&self, a: usize, partner: TranslatedIndex) -> bool {
        let atom = &self.atoms[a];
        let b = partner.original;

        if self.is_ionic_attractive(a, b) {
            if atom.has_ionic_bond_with(partner) {
                self.is_feasible_ionic_bond(a, partner)
            } else {
                self.is_feasible_ionic_exclusion(a, partner)
            }
        } else if self.is_ionic_repulsive(a, b) {
            if atom.has_covalent_bond_with(partner) {
                self.is_feasible_covalent_bond(a, partner)
            } else {
                self.is_feasible_ionic_repulsion(a, partner)
            }
        } else if atom.has_covalent_bond_with(partner) {
            self.is_feasible_covalent_bond(a, partner)
        } else {
            self.is_feasible_covalent_exclusion(a, partner)
        }
    }

    // --- Geometry bookkeeping ---

    pub fn atomic_sphere_volume(&self) -> f64 {
        self.atoms
            .iter()
            .map(|atom| {
                let r = atom.characteristic_radius();
                4.0 / 3.0 * std::f64::consts::PI * r * r * r
            })
            .sum()
    }

    pub fn packing_fraction(&self) -> f64 {
        self.atomic_sphere_volume() / self.cell.volume()
    }

    pub fn has_feasible_unit_cell(&self) -> bool {
        self.cell.is_feasible()
    }

    // --- Perturbation and reduction ---

    pub fn distort_structure(&mut self) -> Result<(), DesignError> {
        self.distort(0.1)
    }

    pub fn distort_structure_largely(&mut self) -> Result<(), DesignError> {
        self.distort(0.2)
    }

    fn distort(&mut self, magnitude: f64) -> Result<(), DesignError> {
        let mut stress = Matrix3::zeros();
        {
            stress[(0, 0)] = self.rng.gen_range(-magnitude..magnitude);
            stress[(1, 0)] = self.rng.gen_range(-magnitude..magnitude);
            stress[(2, 0)] = self.rng.gen_range(-magnitude..magnitude);
            stress[(0, 1)] = stress[(1, 0)];
            stress[(1, 1)] = self.rng.gen_range(-magnitude..magnitude);
            stress[(2, 1)] = self.rng.gen_range(-magnitude..magnitude);
            stress[(0, 2)] = stress[(2, 0)];
            stress[(1, 2)] = stress[(2, 1)];
            stress[(2, 2)] = self.rng.gen_range(-magnitude..magnitude);
        }

        let deformation = stress * self.cell.basis();
        self.cell.apply_deformation(&deformation)?;

        for index in 0..self.atoms.len() {
            let radius = self.atoms[index].characteristic_radius();
            let size = self.rng.gen_range(0.0..magnitude) * radius;

            // Uniform direction on the sphere.
            let z: f64 = self.rng.gen_range(-1.0..1.0);
            let phi: f64 = self.rng.gen_range(0.0..(2.0 * std::f64::consts::PI));
            let planar = (1.0 - z * z).max(0.0).sqrt();
            let jitter = Vector3::new(planar * phi.cos(), planar * phi.sin(), z) * size;

            let atom = &mut self.atoms[index];
            atom.position += jitter;
            let stressed = stress * atom.position.coords;
            atom.position += stressed;
        }

        Ok(())
    }

    /// Delaunay-reduces the cell through the symmetry oracle and invalidates
    /// every traced index pair.
    pub fn reduce_structure(&mut self, oracle: &dyn SymmetryOracle) -> Result<(), DesignError> {
        if self.cell.volume() <= 0.0 || !self.cell.is_feasible() {
            return Err(DesignError::InvalidCell(
                "cell volume is not positive; structure cannot be reduced".into(),
            ));
        }
        if self.atomic_sphere_volume() <= self.minimum_packing_fraction * self.cell.volume() {
            return Err(DesignError::InvalidCell(format!(
                "packing fraction {:.4} is below the reducible minimum {:.4}",
                self.packing_fraction(),
                self.minimum_packing_fraction
            )));
        }

        let mut positions = self.positions();
        oracle.delaunay_reduce(&mut self.cell, &mut positions)?;
        for (atom, position) in self.atoms.iter_mut().zip(positions) {
            atom.position = position;
        }

        debug!(
            "reduced cell to volume {:.3} (packing fraction {:.3})",
            self.cell.volume(),
            self.packing_fraction()
        );
        self.clear_interatomic_distance_constraints();
        Ok(())
    }

    // --- Exchange with the objective view ---

    /// Imports cell and positions only. The ledgers restart empty; the
    /// driver re-derives constraints right afterwards.
    pub fn import_structure(
        &mut self,
        structure: &ObjectiveCrystalStructure,
    ) -> Result<(), DesignError> {
        structure.validate()?;
        if structure.atoms().len() != self.atoms.len() {
            return Err(DesignError::InfeasibleObjective(format!(
                "imported structure has {} atoms, expected {}",
                structure.atoms().len(),
                self.atoms.len()
            )));
        }

        self.cell = structure.cell().clone();
        for (atom, imported) in self.atoms.iter_mut().zip(structure.atoms()) {
            atom.position = imported.position;
            atom.ledger.clear();
        }
        Ok(())
    }

    /// Full import: cell, positions, and the five bonded collections.
    pub fn import(&mut self, structure: &ObjectiveCrystalStructure) -> Result<(), DesignError> {
        self.import_structure(structure)?;

        for pair in structure.covalent_bonded() {
            self.create_covalent_bond(pair.0, TranslatedIndex::in_cell(pair.1));
        }
        for pair in structure.ionic_bonded() {
            self.create_ionic_bond(pair.0, TranslatedIndex::in_cell(pair.1));
        }
        for pair in structure.ionic_repulsed() {
            self.create_ionic_repulsion(pair.0, TranslatedIndex::in_cell(pair.1));
        }
        for pair in structure.translated_covalent_bonded() {
            self.create_covalent_bond(pair.0, pair.1);
        }
        for pair in structure.translated_ionic_bonded() {
            self.create_ionic_bond(pair.0, pair.1);
        }
        for pair in structure.translated_ionic_repulsed() {
            self.create_ionic_repulsion(pair.0, pair.1);
        }
        Ok(())
    }
}
