use thiserror::Error;

/// Failures produced by the design engine.
///
/// The force kernel and the feasibility predicates are pure on valid inputs;
/// every error source is concentrated in cell operations, symmetry-oracle
/// calls, and the import-mismatch guards.
#[derive(Debug, Error)]
pub enum DesignError {
    /// Cell volume is non-positive or the basis cannot be inverted.
    #[error("invalid unit cell: {0}")]
    InvalidCell(String),

    /// A Delaunay reduction was applied but the resulting cell is still unusable.
    #[error("unit cell is infeasible despite the reduction: {0}")]
    InfeasibleReduction(String),

    /// An objective structure with mismatched atom/species/constraint lists.
    #[error("objective structure is inconsistent: {0}")]
    InfeasibleObjective(String),

    /// The symmetry oracle did not converge.
    #[error("symmetry oracle failed in {operation}: {message}")]
    SymmetryOracleFailure { operation: &'static str, message: String },

    /// The total optimization budget ran out without a feasible structure.
    #[error("design timed out after {steps} structural optimization steps")]
    DesignTimeout { steps: usize },

    /// The random generator could not pack the requested composition.
    #[error("structure generation failed: {0}")]
    GenerationFailure(String),

    /// A run definition that cannot be turned into species records.
    #[error("invalid run definition: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
