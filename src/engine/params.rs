use serde::{Deserialize, Serialize};

pub use crate::model::constraining::GeometricalConstraintParameters;

/// Constants of one structural optimization stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizationParameters {
    pub repulsive_force_constant: f64,
    pub attractive_force_constant: f64,
    /// Step size applied to atomic forces.
    pub atom_step_size: f64,
    /// Step size applied to the accumulated cell transformation.
    pub cell_step_size: f64,
    /// Scalar pressure on the lattice; negative values compact the cell.
    pub pressure: f64,
    /// Epsilon of the feasibility windows checked at this stage.
    pub feasible_error_rate: f64,
    pub max_optimizing_steps: usize,
    pub record_interval: usize,
}

impl OptimizationParameters {
    /// Largest steps, widest tolerance: escape bad initial geometry.
    pub fn global() -> Self {
        Self {
            repulsive_force_constant: 1.0,
            attractive_force_constant: 1.0,
            atom_step_size: 0.05,
            cell_step_size: 0.005,
            pressure: -0.0005,
            feasible_error_rate: 0.2,
            max_optimizing_steps: 200,
            record_interval: 50,
        }
    }

    /// Moderate steps once the coordination shells look right.
    pub fn local() -> Self {
        Self {
            repulsive_force_constant: 1.0,
            attractive_force_constant: 0.5,
            atom_step_size: 0.02,
            cell_step_size: 0.002,
            pressure: -0.0002,
            feasible_error_rate: 0.05,
            max_optimizing_steps: 100,
            record_interval: 50,
        }
    }

    /// Smallest steps and the tightest windows for the final polish.
    pub fn precise() -> Self {
        Self {
            repulsive_force_constant: 0.5,
            attractive_force_constant: 0.25,
            atom_step_size: 0.005,
            cell_step_size: 0.0005,
            pressure: 0.0,
            feasible_error_rate: 0.01,
            max_optimizing_steps: 50,
            record_interval: 25,
        }
    }
}

impl Default for OptimizationParameters {
    fn default() -> Self {
        Self::local()
    }
}

/// Everything a design attempt needs: budgets, geometry rules, the three
/// optimizer stages, and the initial-structure generation knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignParameters {
    /// Hard limit on total force steps per attempt.
    pub max_total_optimizing: usize,
    /// Watchdog: global steps allowed without a coordination success.
    pub max_ceaseless_global_optimizing: usize,
    pub geometry: GeometricalConstraintParameters,
    pub global: OptimizationParameters,
    pub local: OptimizationParameters,
    pub precise: OptimizationParameters,
    pub generation: GenerationParameters,
}

impl Default for DesignParameters {
    fn default() -> Self {
        Self {
            max_total_optimizing: 20_000,
            max_ceaseless_global_optimizing: 2_000,
            geometry: GeometricalConstraintParameters::default(),
            global: OptimizationParameters::global(),
            local: OptimizationParameters::local(),
            precise: OptimizationParameters::precise(),
            generation: GenerationParameters::default(),
        }
    }
}

/// Knobs of the random initial-structure generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    /// Target sphere-packing fraction of the starting cubic cell.
    pub target_packing_fraction: f64,
    /// Scale on summed radii below which a random placement is rejected.
    pub collision_scale: f64,
    pub max_placement_attempts: usize,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            target_packing_fraction: 0.3,
            collision_scale: 0.7,
            max_placement_attempts: 100,
        }
    }
}
