use crossbeam_channel::Sender;
use log::{debug, info};

use crate::design::{AttemptStats, DesignEvent};
use crate::engine::optimizer::CrystalOptimizer;
use crate::engine::params::{DesignParameters, GeometricalConstraintParameters};
use crate::errors::DesignError;
use crate::model::constraining::ConstrainingCrystalStructure;
use crate::model::objective::ObjectiveCrystalStructure;
use crate::report::recorder::DesignRecorder;
use crate::symmetry::SymmetryOracle;

/// How a design attempt ended; fatal conditions surface as errors instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesignOutcome {
    /// The structure satisfies every constraint at the precise tolerance.
    Feasible { total_steps: usize },
    /// The optimization budget ran out; the returned structure has all
    /// currently-infeasible bonds erased.
    TimedOut { total_steps: usize },
}

impl DesignOutcome {
    pub fn is_feasible(&self) -> bool {
        matches!(self, DesignOutcome::Feasible { .. })
    }

    pub fn total_steps(&self) -> usize {
        match self {
            DesignOutcome::Feasible { total_steps } | DesignOutcome::TimedOut { total_steps } => {
                *total_steps
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DesignCounters {
    total: usize,
    ceaseless_global: usize,
    tracer_usage: usize,
    cell_usage: usize,
}

impl DesignCounters {
    fn advance_global(&mut self, steps: usize) {
        self.total += steps;
        self.ceaseless_global += steps;
        self.tracer_usage += steps;
        self.cell_usage += steps;
    }
}

/// The watchdog-driven driver: alternates global relaxation, constraint
/// re-derivation, local and precise refinement, cell reductions, and random
/// perturbations until the structure is feasible or the budget is spent.
pub struct CrystalDesigner {
    max_total_optimizing: usize,
    max_ceaseless_global_optimizing: usize,
    geometry: GeometricalConstraintParameters,
    global_optimizer: CrystalOptimizer,
    local_optimizer: CrystalOptimizer,
    precise_optimizer: CrystalOptimizer,
}

impl CrystalDesigner {
    pub fn new(parameters: &DesignParameters) -> Self {
        Self {
            max_total_optimizing: parameters.max_total_optimizing,
            max_ceaseless_global_optimizing: parameters.max_ceaseless_global_optimizing,
            geometry: parameters.geometry,
            global_optimizer: CrystalOptimizer::new(parameters.global, &parameters.geometry),
            local_optimizer: CrystalOptimizer::new(parameters.local, &parameters.geometry),
            precise_optimizer: CrystalOptimizer::new(parameters.precise, &parameters.geometry),
        }
    }

    pub fn precise_error_rate(&self) -> f64 {
        self.precise_optimizer.parameters().feasible_error_rate
    }

    /// Runs one design attempt on a prepared structure.
    pub fn execute(
        &self,
        structure: &mut ConstrainingCrystalStructure,
        oracle: &dyn SymmetryOracle,
    ) -> Result<DesignOutcome, DesignError> {
        self.run(structure, oracle, None, None, 0)
    }

    /// As `execute`, with trajectory recording and progress events.
    pub fn execute_recorded(
        &self,
        structure: &mut ConstrainingCrystalStructure,
        oracle: &dyn SymmetryOracle,
        recorder: &DesignRecorder,
        events: Option<&Sender<DesignEvent>>,
        attempt: usize,
    ) -> Result<DesignOutcome, DesignError> {
        self.run(structure, oracle, Some(recorder), events, attempt)
    }

    fn run(
        &self,
        structure: &mut ConstrainingCrystalStructure,
        oracle: &dyn SymmetryOracle,
        recorder: Option<&DesignRecorder>,
        events: Option<&Sender<DesignEvent>>,
        attempt: usize,
    ) -> Result<DesignOutcome, DesignError> {
        let mut counters = DesignCounters::default();

        structure.set_geometrical_parameters(&self.geometry);
        structure
            .set_feasible_error_rate(self.global_optimizer.parameters().feasible_error_rate);
        structure.update_tracing_index_pairs();
        structure.create_interatomic_distance_constraints();
        structure.erase_infeasible_ionic_polyhedra_connections();

        if let Some(recorder) = recorder {
            recorder.force_record(&ObjectiveCrystalStructure::new(structure))?;
        }

        match self.design_loop(structure, oracle, recorder, events, attempt, &mut counters) {
            Ok(()) => {
                info!(
                    "design attempt {attempt} feasible after {} force steps",
                    counters.total
                );
                Ok(DesignOutcome::Feasible { total_steps: counters.total })
            }
            Err(DesignError::DesignTimeout { steps }) => {
                structure.set_feasible_error_rate(self.precise_error_rate());
                structure.erase_infeasible_chemical_bonds();
                info!("design attempt {attempt} timed out after {steps} force steps");
                Ok(DesignOutcome::TimedOut { total_steps: steps })
            }
            Err(error) => Err(error),
        }
    }

    fn design_loop(
        &self,
        structure: &mut ConstrainingCrystalStructure,
        oracle: &dyn SymmetryOracle,
        recorder: Option<&DesignRecorder>,
        events: Option<&Sender<DesignEvent>>,
        attempt: usize,
        counters: &mut DesignCounters,
    ) -> Result<(), DesignError> {
        while counters.total < self.max_total_optimizing {
            structure
                .set_feasible_error_rate(self.global_optimizer.parameters().feasible_error_rate);

            let mut objective = ObjectiveCrystalStructure::new(structure);
            self.run_stage(&self.global_optimizer, &mut objective, recorder)?;
            counters.advance_global(self.global_optimizer.parameters().max_optimizing_steps);

            structure.import_structure(&objective)?;
            self.update_constraints(structure, oracle, counters)?;

            let coordination_feasible = structure.has_feasible_coordination_composition();
            self.emit_stats(events, attempt, structure, counters, coordination_feasible);

            if coordination_feasible {
                counters.ceaseless_global = 0;
                objective.import(structure);

                if self.apply_local(&mut objective, recorder, counters)? {
                    if self.apply_precise(&mut objective, recorder, counters)? {
                        structure.import_structure(&objective)?;
                        structure.set_feasible_error_rate(self.precise_error_rate());

                        if self.finalize_feasible(structure, oracle, counters)? {
                            return Ok(());
                        }

                        structure.erase_infeasible_chemical_bonds();
                        structure.distort_structure()?;
                        counters.cell_usage = self.geometry.cell_reduction_timeout;
                        continue;
                    }
                    // Precisely infeasible but locally sound: let the next
                    // global pass work from the refined geometry.
                } else {
                    structure.import_structure(&objective)?;
                    structure.set_feasible_error_rate(
                        self.local_optimizer.parameters().feasible_error_rate,
                    );

                    self.reduce_and_rebuild(structure, oracle, counters)?;
                    structure.erase_infeasible_chemical_bonds();
                    structure.distort_structure()?;
                    counters.cell_usage = self.geometry.cell_reduction_timeout;
                    continue;
                }
            } else if self.max_ceaseless_global_optimizing < counters.ceaseless_global {
                debug!(
                    "watchdog: {} ceaseless global steps, applying large distortion",
                    counters.ceaseless_global
                );
                structure.distort_structure_largely()?;
                self.reduce_and_rebuild(structure, oracle, counters)?;
                counters.ceaseless_global = 0;
            }
        }

        Err(DesignError::DesignTimeout { steps: counters.total })
    }

    fn run_stage(
        &self,
        optimizer: &CrystalOptimizer,
        objective: &mut ObjectiveCrystalStructure,
        recorder: Option<&DesignRecorder>,
    ) -> Result<(), DesignError> {
        match recorder {
            Some(recorder) => optimizer.execute_recorded(objective, recorder),
            None => optimizer.execute(objective),
        }
    }

    /// Two local passes with a feasibility check between them.
    fn apply_local(
        &self,
        objective: &mut ObjectiveCrystalStructure,
        recorder: Option<&DesignRecorder>,
        counters: &mut DesignCounters,
    ) -> Result<bool, DesignError> {
        let error_rate = self.local_optimizer.parameters().feasible_error_rate;
        let exclusion_ratio = self.geometry.minimum_exclusion_distance_ratio;
        let steps = self.local_optimizer.parameters().max_optimizing_steps;

        self.run_stage(&self.local_optimizer, objective, recorder)?;
        counters.total += steps;
        if objective.is_feasible(error_rate, exclusion_ratio) {
            return Ok(true);
        }

        self.run_stage(&self.local_optimizer, objective, recorder)?;
        counters.total += steps;
        Ok(objective.is_feasible(error_rate, exclusion_ratio))
    }

    fn apply_precise(
        &self,
        objective: &mut ObjectiveCrystalStructure,
        recorder: Option<&DesignRecorder>,
        counters: &mut DesignCounters,
    ) -> Result<bool, DesignError> {
        let error_rate = self.precise_error_rate();
        let exclusion_ratio = self.geometry.minimum_exclusion_distance_ratio;

        self.run_stage(&self.precise_optimizer, objective, recorder)?;
        counters.total += self.precise_optimizer.parameters().max_optimizing_steps;
        Ok(objective.is_feasible(error_rate, exclusion_ratio))
    }

    /// Final verification: reduce, rebuild every constraint, drop bonds that
    /// fell out of their windows, then run the full feasibility check.
    fn finalize_feasible(
        &self,
        structure: &mut ConstrainingCrystalStructure,
        oracle: &dyn SymmetryOracle,
        counters: &mut DesignCounters,
    ) -> Result<bool, DesignError> {
        structure.reduce_structure(oracle)?;
        if !structure.has_feasible_unit_cell() {
            return Err(DesignError::InfeasibleReduction(
                "unit cell failed the feasibility test after the final reduction".into(),
            ));
        }

        structure.update_tracing_index_pairs();
        structure.create_interatomic_distance_constraints();
        structure.erase_infeasible_chemical_bonds();
        counters.tracer_usage = 0;
        counters.cell_usage = 0;

        Ok(structure.is_feasible())
    }

    /// Reduction followed by a full rebuild of the neighbor and constraint
    /// state, including the polyhedra pruning.
    fn reduce_and_rebuild(
        &self,
        structure: &mut ConstrainingCrystalStructure,
        oracle: &dyn SymmetryOracle,
        counters: &mut DesignCounters,
    ) -> Result<(), DesignError> {
        structure.reduce_structure(oracle)?;
        if !structure.has_feasible_unit_cell() {
            return Err(DesignError::InfeasibleReduction(
                "unit cell failed the feasibility test after reduction".into(),
            ));
        }

        structure.update_tracing_index_pairs();
        structure.create_interatomic_distance_constraints();
        structure.erase_infeasible_ionic_polyhedra_connections();
        counters.tracer_usage = 0;
        counters.cell_usage = 0;
        Ok(())
    }

    /// Staleness-driven constraint refresh between optimizer stages.
    fn update_constraints(
        &self,
        structure: &mut ConstrainingCrystalStructure,
        oracle: &dyn SymmetryOracle,
        counters: &mut DesignCounters,
    ) -> Result<(), DesignError> {
        if self.geometry.cell_reduction_timeout < counters.cell_usage {
            return self.reduce_and_rebuild(structure, oracle, counters);
        }

        if !structure.has_feasible_unit_cell() {
            return Err(DesignError::InvalidCell(
                "unit cell became infeasible between optimizer stages".into(),
            ));
        }

        if self.geometry.tracer_timeout < counters.tracer_usage {
            structure.normalize_fractional_coordinates();
            structure.update_tracing_index_pairs();
            structure.create_interatomic_distance_constraints();
            structure.erase_infeasible_ionic_polyhedra_connections();
            counters.tracer_usage = 0;
        } else {
            structure.create_interatomic_distance_constraints();
            structure.erase_infeasible_ionic_polyhedra_connections();
        }
        Ok(())
    }

    fn emit_stats(
        &self,
        events: Option<&Sender<DesignEvent>>,
        attempt: usize,
        structure: &ConstrainingCrystalStructure,
        counters: &DesignCounters,
        feasible_coordination: bool,
    ) {
        if let Some(sender) = events {
            let _ = sender.send(DesignEvent::IterationUpdate(AttemptStats {
                attempt,
                total_steps: counters.total,
                ceaseless_global_steps: counters.ceaseless_global,
                feasible_coordination,
                cell_volume: structure.cell().volume(),
                packing_fraction: structure.packing_fraction(),
            }));
        }
    }
}
