use crate::core::cell::{TranslatedIndex, UnitCell};
use crate::core::domain::{CoordinationConstraints, IonicSpecies, SphericalAtom};
use crate::core::spatial;
use crate::errors::DesignError;
use crate::model::constraining::ConstrainingCrystalStructure;

/// A same-cell constrained pair, `a < b`.
pub type SamePair = (usize, usize);
/// A constrained pair against a translated image.
pub type ImagePair = (usize, TranslatedIndex);

/// The optimization view of a structure: a frozen snapshot of the design
/// view with flat atom data and the ten constraint index lists. It never
/// talks back to the design view; the driver re-imports it explicitly.
#[derive(Debug, Clone, Default)]
pub struct ObjectiveCrystalStructure {
    cell: Option<UnitCell>,
    atoms: Vec<SphericalAtom>,
    species: Vec<IonicSpecies>,
    coordination: Vec<CoordinationConstraints>,

    covalent_bonded: Vec<SamePair>,
    covalent_excluded: Vec<SamePair>,
    ionic_bonded: Vec<SamePair>,
    ionic_excluded: Vec<SamePair>,
    ionic_repulsed: Vec<SamePair>,

    translated_covalent_bonded: Vec<ImagePair>,
    translated_covalent_excluded: Vec<ImagePair>,
    translated_ionic_bonded: Vec<ImagePair>,
    translated_ionic_excluded: Vec<ImagePair>,
    translated_ionic_repulsed: Vec<ImagePair>,
}

impl ObjectiveCrystalStructure {
    pub fn new(structure: &ConstrainingCrystalStructure) -> Self {
        let mut objective = Self::default();
        objective.import(structure);
        objective
    }

    /// Rebuilds the snapshot in place from the design view.
    pub fn import(&mut self, structure: &ConstrainingCrystalStructure) {
        self.cell = Some(structure.cell().clone());

        self.atoms.clear();
        self.species.clear();
        self.coordination.clear();
        for atom in structure.atoms() {
            self.atoms.push(atom.to_spherical());
            self.species.push(atom.species);
            self.coordination.push(atom.coordination.clone());
        }

        self.covalent_bonded.clear();
        self.covalent_excluded.clear();
        self.ionic_bonded.clear();
        self.ionic_excluded.clear();
        self.ionic_repulsed.clear();
        self.translated_covalent_bonded.clear();
        self.translated_covalent_excluded.clear();
        self.translated_ionic_bonded.clear();
        self.translated_ionic_excluded.clear();
        self.translated_ionic_repulsed.clear();

        let n = structure.atoms().len();
        for a in 0..n {
            for b in (a + 1)..n {
                let partner = TranslatedIndex::in_cell(b);
                let atom = &structure.atoms()[a];

                if structure.is_ionic_attractive(a, b) {
                    if atom.has_ionic_bond_with(partner) {
                        self.ionic_bonded.push((a, b));
                    } else if structure.is_constrainable_ionic_distance(a, partner) {
                        self.ionic_excluded.push((a, b));
                    }
                } else if structure.is_ionic_repulsive(a, b) {
                    if atom.has_covalent_bond_with(partner) {
                        self.covalent_bonded.push((a, b));
                    } else if structure.is_constrainable_repulsion_distance(a, partner) {
                        self.ionic_repulsed.push((a, b));
                    }
                } else if atom.has_covalent_bond_with(partner) {
                    self.covalent_bonded.push((a, b));
                } else if structure.is_constrainable_covalent_distance(a, partner) {
                    self.covalent_excluded.push((a, b));
                }
            }
        }

        for pair in structure.constraining_pairs() {
            let a = pair.original;
            let partner = pair.partner;
            let b = partner.original;
            let atom = &structure.atoms()[a];

            if structure.is_ionic_attractive(a, b) {
                if atom.has_ionic_bond_with(partner) {
                    self.translated_ionic_bonded.push((a, partner));
                } else {
                    self.translated_ionic_excluded.push((a, partner));
                }
            } else if structure.is_ionic_repulsive(a, b) {
                if atom.has_covalent_bond_with(partner) {
                    self.translated_covalent_bonded.push((a, partner));
                } else {
                    self.translated_ionic_repulsed.push((a, partner));
                }
            } else if atom.has_covalent_bond_with(partner) {
                self.translated_covalent_bonded.push((a, partner));
            } else {
                self.translated_covalent_excluded.push((a, partner));
            }
        }
    }

    // --- Accessors ---

    pub fn cell(&self) -> &UnitCell {
        self.cell.as_ref().expect("objective structure built from a design view")
    }

    pub fn cell_mut(&mut self) -> &mut UnitCell {
        self.cell.as_mut().expect("objective structure built from a design view")
    }

    pub fn atoms(&self) -> &[SphericalAtom] {
        &self.atoms
    }

    pub fn atoms_mut(&mut self) -> &mut [SphericalAtom] {
        &mut self.atoms
    }

    pub fn corresponding_species(&self) -> &[IonicSpecies] {
        &self.species
    }

    pub fn corresponding_coordination_constraints(&self) -> &[CoordinationConstraints] {
        &self.coordination
    }

    pub fn covalent_bonded(&self) -> &[SamePair] {
        &self.covalent_bonded
    }

    pub fn covalent_excluded(&self) -> &[SamePair] {
        &self.covalent_excluded
    }

    pub fn ionic_bonded(&self) -> &[SamePair] {
        &self.ionic_bonded
    }

    pub fn ionic_excluded(&self) -> &[SamePair] {
        &self.ionic_excluded
    }

    pub fn ionic_repulsed(&self) -> &[SamePair] {
        &self.ionic_repulsed
    }

    pub fn translated_covalent_bonded(&self) -> &[ImagePair] {
        &self.translated_covalent_bonded
    }

    pub fn translated_covalent_excluded(&self) -> &[ImagePair] {
        &self.translated_covalent_excluded
    }

    pub fn translated_ionic_bonded(&self) -> &[ImagePair] {
        &self.translated_ionic_bonded
    }

    pub fn translated_ionic_excluded(&self) -> &[ImagePair] {
        &self.translated_ionic_excluded
    }

    pub fn translated_ionic_repulsed(&self) -> &[ImagePair] {
        &self.translated_ionic_repulsed
    }

    pub fn constrained_pair_count(&self) -> usize {
        self.covalent_bonded.len()
            + self.covalent_excluded.len()
            + self.ionic_bonded.len()
            + self.ionic_excluded.len()
            + self.ionic_repulsed.len()
            + self.translated_covalent_bonded.len()
            + self.translated_covalent_excluded.len()
            + self.translated_ionic_bonded.len()
            + self.translated_ionic_excluded.len()
            + self.translated_ionic_repulsed.len()
    }

    /// Guard for the parallel-list invariant; violation is a programmer
    /// error surfaced as `InfeasibleObjective`.
    pub fn validate(&self) -> Result<(), DesignError> {
        if self.cell.is_none() {
            return Err(DesignError::InfeasibleObjective("no unit cell".into()));
        }
        if self.atoms.len() != self.species.len() || self.atoms.len() != self.coordination.len() {
            return Err(DesignError::InfeasibleObjective(format!(
                "parallel lists disagree: {} atoms, {} species, {} constraint sets",
                self.atoms.len(),
                self.species.len(),
                self.coordination.len()
            )));
        }
        Ok(())
    }

    // --- Feasibility ---

    fn same_distance_sq(&self, a: usize, b: usize) -> f64 {
        (self.atoms[b].position - self.atoms[a].position).norm_squared()
    }

    fn image_distance_sq(&self, a: usize, partner: TranslatedIndex) -> f64 {
        spatial::image_distance_sq(
            self.cell(),
            &self.atoms[a].position,
            &self.atoms[partner.original].position,
            partner.cell,
        )
    }

    fn bond_ok(d_sq: f64, minimum: f64, maximum: f64, error_rate: f64) -> bool {
        let lower = (1.0 - error_rate) * minimum;
        let upper = (1.0 + error_rate) * maximum;
        lower * lower <= d_sq && d_sq <= upper * upper
    }

    fn approach_ok(d_sq: f64, minimum: f64, error_rate: f64) -> bool {
        let lower = (1.0 - error_rate) * minimum;
        d_sq >= lower * lower
    }

    /// Checks all ten constraint lists against the given tolerances.
    pub fn is_feasible(&self, error_rate: f64, exclusion_ratio: f64) -> bool {
        for &(a, b) in &self.covalent_bonded {
            let (ra, rb) = (&self.atoms[a].radii.covalent, &self.atoms[b].radii.covalent);
            if !Self::bond_ok(
                self.same_distance_sq(a, b),
                ra.minimum + rb.minimum,
                ra.maximum + rb.maximum,
                error_rate,
            ) {
                return false;
            }
        }

        for &(a, b) in &self.covalent_excluded {
            let sum = self.atoms[a].radii.covalent.maximum + self.atoms[b].radii.covalent.maximum;
            if !Self::approach_ok(self.same_distance_sq(a, b), exclusion_ratio * sum, error_rate) {
                return false;
            }
        }

        for &(a, b) in &self.ionic_bonded {
            let (ra, rb) = (&self.atoms[a].radii.ionic, &self.atoms[b].radii.ionic);
            if !Self::bond_ok(
                self.same_distance_sq(a, b),
                ra.minimum + rb.minimum,
                ra.maximum + rb.maximum,
                error_rate,
            ) {
                return false;
            }
        }

        for &(a, b) in &self.ionic_excluded {
            let sum = self.atoms[a].radii.ionic.maximum + self.atoms[b].radii.ionic.maximum;
            if !Self::approach_ok(self.same_distance_sq(a, b), exclusion_ratio * sum, error_rate) {
                return false;
            }
        }

        for &(a, b) in &self.ionic_repulsed {
            let sum =
                self.atoms[a].radii.repulsion.minimum + self.atoms[b].radii.repulsion.minimum;
            if !Self::approach_ok(self.same_distance_sq(a, b), sum, error_rate) {
                return false;
            }
        }

        for &(a, partner) in &self.translated_covalent_bonded {
            let b = partner.original;
            let (ra, rb) = (&self.atoms[a].radii.covalent, &self.atoms[b].radii.covalent);
            if !Self::bond_ok(
                self.image_distance_sq(a, partner),
                ra.minimum + rb.minimum,
                ra.maximum + rb.maximum,
                error_rate,
            ) {
                return false;
            }
        }

        for &(a, partner) in &self.translated_covalent_excluded {
            let b = partner.original;
            let sum = self.atoms[a].radii.covalent.maximum + self.atoms[b].radii.covalent.maximum;
            if !Self::approach_ok(
                self.image_distance_sq(a, partner),
                exclusion_ratio * sum,
                error_rate,
            ) {
                return false;
            }
        }

        for &(a, partner) in &self.translated_ionic_bonded {
            let b = partner.original;
            let (ra, rb) = (&self.atoms[a].radii.ionic, &self.atoms[b].radii.ionic);
            if !Self::bond_ok(
                self.image_distance_sq(a, partner),
                ra.minimum + rb.minimum,
                ra.maximum + rb.maximum,
                error_rate,
            ) {
                return false;
            }
        }

        for &(a, partner) in &self.translated_ionic_excluded {
            let b = partner.original;
            let sum = self.atoms[a].radii.ionic.maximum + self.atoms[b].radii.ionic.maximum;
            if !Self::approach_ok(
                self.image_distance_sq(a, partner),
                exclusion_ratio * sum,
                error_rate,
            ) {
                return false;
            }
        }

        for &(a, partner) in &self.translated_ionic_repulsed {
            let b = partner.original;
            let sum =
                self.atoms[a].radii.repulsion.minimum + self.atoms[b].radii.repulsion.minimum;
            if !Self::approach_ok(self.image_distance_sq(a, partner), sum, error_rate) {
                return false;
            }
        }

        true
    }
}
