use nalgebra::{Matrix3, Vector3};

use crate::engine::params::{GeometricalConstraintParameters, OptimizationParameters};
use crate::errors::DesignError;
use crate::model::objective::ObjectiveCrystalStructure;
use crate::report::recorder::DesignRecorder;

// Coincident atoms have no defined force direction.
const MIN_SEPARATION_SQ: f64 = 1e-24;

/// The five pair classes the force kernel distinguishes; the bonded classes
/// carry a full window, the rest only a minimum approach.
#[derive(Debug, Clone, Copy)]
enum PairClass {
    CovalentBond,
    CovalentExclusion,
    IonicBond,
    IonicExclusion,
    IonicRepulsion,
}

#[derive(Debug, Clone, Copy)]
enum ForceRule {
    Bond { minimum: f64, maximum: f64 },
    Repel { minimum: f64 },
}

/// Explicit integrator driving an objective structure toward feasibility:
/// per step it accumulates pairwise forces and a lattice transformation
/// (pressure plus the pair virial), then moves atoms and deforms the cell.
#[derive(Debug, Clone)]
pub struct CrystalOptimizer {
    parameters: OptimizationParameters,
    exclusion_ratio: f64,
}

impl CrystalOptimizer {
    pub fn new(
        parameters: OptimizationParameters,
        geometry: &GeometricalConstraintParameters,
    ) -> Self {
        Self { parameters, exclusion_ratio: geometry.minimum_exclusion_distance_ratio }
    }

    pub fn parameters(&self) -> &OptimizationParameters {
        &self.parameters
    }

    /// Runs the configured number of steps.
    pub fn execute(&self, structure: &mut ObjectiveCrystalStructure) -> Result<(), DesignError> {
        self.run(structure, None)
    }

    /// Runs the configured number of steps, reporting to the recorder at its
    /// interval.
    pub fn execute_recorded(
        &self,
        structure: &mut ObjectiveCrystalStructure,
        recorder: &DesignRecorder,
    ) -> Result<(), DesignError> {
        self.run(structure, Some(recorder))
    }

    fn run(
        &self,
        structure: &mut ObjectiveCrystalStructure,
        recorder: Option<&DesignRecorder>,
    ) -> Result<(), DesignError> {
        structure.validate()?;
        for _ in 0..self.parameters.max_optimizing_steps {
            self.step(structure)?;
            if let Some(recorder) = recorder {
                recorder.advance(structure)?;
            }
        }
        Ok(())
    }

    /// One integrator step over all ten constraint lists.
    pub fn step(&self, structure: &mut ObjectiveCrystalStructure) -> Result<(), DesignError> {
        for atom in structure.atoms_mut() {
            atom.clear_force();
        }

        let mut cell_transformation = Matrix3::zeros();
        self.apply_pressure(structure, &mut cell_transformation);

        let inverse_basis = *structure.cell().inverse_basis();

        for class in [
            PairClass::CovalentBond,
            PairClass::CovalentExclusion,
            PairClass::IonicBond,
            PairClass::IonicExclusion,
            PairClass::IonicRepulsion,
        ] {
            self.apply_class_forces(structure, class, &inverse_basis, &mut cell_transformation);
        }

        let eta_atom = self.parameters.atom_step_size;
        for atom in structure.atoms_mut() {
            let force = atom.applied_force;
            atom.position += eta_atom * force;
        }

        let eta_cell = self.parameters.cell_step_size;
        if eta_cell != 0.0 {
            structure.cell_mut().apply_deformation(&(cell_transformation * eta_cell))?;
        }

        Ok(())
    }

    /// Pressure on the lattice: column k of the transformation gains
    /// `p * (b_{k+1} x b_{k+2})`, the volume gradient with respect to b_k.
    fn apply_pressure(
        &self,
        structure: &ObjectiveCrystalStructure,
        cell_transformation: &mut Matrix3<f64>,
    ) {
        let pressure = self.parameters.pressure;
        if pressure == 0.0 {
            return;
        }

        let basis = structure.cell().basis();
        for k in 0..3 {
            let u: Vector3<f64> = basis.column((k + 1) % 3).into_owned();
            let w: Vector3<f64> = basis.column((k + 2) % 3).into_owned();
            let gradient = u.cross(&w) * pressure;
            for r in 0..3 {
                cell_transformation[(r, k)] += gradient[r];
            }
        }
    }

    fn apply_class_forces(
        &self,
        structure: &mut ObjectiveCrystalStructure,
        class: PairClass,
        inverse_basis: &Matrix3<f64>,
        cell_transformation: &mut Matrix3<f64>,
    ) {
        let same_count = match class {
            PairClass::CovalentBond => structure.covalent_bonded().len(),
            PairClass::CovalentExclusion => structure.covalent_excluded().len(),
            PairClass::IonicBond => structure.ionic_bonded().len(),
            PairClass::IonicExclusion => structure.ionic_excluded().len(),
            PairClass::IonicRepulsion => structure.ionic_repulsed().len(),
        };

        for index in 0..same_count {
            let (a, b) = match class {
                PairClass::CovalentBond => structure.covalent_bonded()[index],
                PairClass::CovalentExclusion => structure.covalent_excluded()[index],
                PairClass::IonicBond => structure.ionic_bonded()[index],
                PairClass::IonicExclusion => structure.ionic_excluded()[index],
                PairClass::IonicRepulsion => structure.ionic_repulsed()[index],
            };
            let rule = self.force_rule(structure, a, b, class);
            self.apply_pair_force(structure, a, b, None, rule, inverse_basis, cell_transformation);
        }

        let translated_count = match class {
            PairClass::CovalentBond => structure.translated_covalent_bonded().len(),
            PairClass::CovalentExclusion => structure.translated_covalent_excluded().len(),
            PairClass::IonicBond => structure.translated_ionic_bonded().len(),
            PairClass::IonicExclusion => structure.translated_ionic_excluded().len(),
            PairClass::IonicRepulsion => structure.translated_ionic_repulsed().len(),
        };

        for index in 0..translated_count {
            let (a, partner) = match class {
                PairClass::CovalentBond => structure.translated_covalent_bonded()[index],
                PairClass::CovalentExclusion => structure.translated_covalent_excluded()[index],
                PairClass::IonicBond => structure.translated_ionic_bonded()[index],
                PairClass::IonicExclusion => structure.translated_ionic_excluded()[index],
                PairClass::IonicRepulsion => structure.translated_ionic_repulsed()[index],
            };
            let translation = structure.cell().translation_vector(partner.cell);
            let rule = self.force_rule(structure, a, partner.original, class);
            self.apply_pair_force(
                structure,
                a,
                partner.original,
                Some(translation),
                rule,
                inverse_basis,
                cell_transformation,
            );
        }
    }

    fn force_rule(
        &self,
        structure: &ObjectiveCrystalStructure,
        a: usize,
        b: usize,
        class: PairClass,
    ) -> ForceRule {
        let atoms = structure.atoms();
        match class {
            PairClass::CovalentBond => ForceRule::Bond {
                minimum: atoms[a].radii.covalent.minimum + atoms[b].radii.covalent.minimum,
                maximum: atoms[a].radii.covalent.maximum + atoms[b].radii.covalent.maximum,
            },
            PairClass::IonicBond => ForceRule::Bond {
                minimum: atoms[a].radii.ionic.minimum + atoms[b].radii.ionic.minimum,
                maximum: atoms[a].radii.ionic.maximum + atoms[b].radii.ionic.maximum,
            },
            PairClass::CovalentExclusion => ForceRule::Repel {
                minimum: self.exclusion_ratio
                    * (atoms[a].radii.covalent.maximum + atoms[b].radii.covalent.maximum),
            },
            PairClass::IonicExclusion => ForceRule::Repel {
                minimum: self.exclusion_ratio
                    * (atoms[a].radii.ionic.maximum + atoms[b].radii.ionic.maximum),
            },
            PairClass::IonicRepulsion => ForceRule::Repel {
                minimum: atoms[a].radii.repulsion.minimum + atoms[b].radii.repulsion.minimum,
            },
        }
    }

    /// The shared pair kernel. `force` below is the force applied to the
    /// second endpoint; the first receives its negation, and the pair virial
    /// feeds the cell transformation so overlap dilates the cell while
    /// stretched bonds contract it.
    #[allow(clippy::too_many_arguments)]
    fn apply_pair_force(
        &self,
        structure: &mut ObjectiveCrystalStructure,
        a: usize,
        b: usize,
        translation: Option<Vector3<f64>>,
        rule: ForceRule,
        inverse_basis: &Matrix3<f64>,
        cell_transformation: &mut Matrix3<f64>,
    ) {
        let atoms = structure.atoms();
        let mut displacement = atoms[b].position - atoms[a].position;
        if let Some(translation) = translation {
            displacement += translation;
        }

        let distance_sq = displacement.norm_squared();
        if distance_sq < MIN_SEPARATION_SQ {
            return;
        }

        let direction = displacement / distance_sq.sqrt();
        let force = match rule {
            ForceRule::Repel { minimum } => {
                if distance_sq < minimum * minimum {
                    direction * self.parameters.repulsive_force_constant
                } else {
                    return;
                }
            }
            ForceRule::Bond { minimum, maximum } => {
                if distance_sq < minimum * minimum {
                    direction * self.parameters.repulsive_force_constant
                } else if distance_sq > maximum * maximum {
                    -direction * self.parameters.attractive_force_constant
                } else {
                    return;
                }
            }
        };

        let fractional = inverse_basis * displacement;

        let atoms = structure.atoms_mut();
        atoms[b].applied_force += force;
        atoms[a].applied_force -= force;

        for c in 0..3 {
            for r in 0..3 {
                cell_transformation[(r, c)] += fractional[c] * force[r];
            }
        }
    }
}
