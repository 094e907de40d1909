pub mod designer;
pub mod generator;

/// Snapshot statistics of one outer designer iteration, for telemetry.
#[derive(Debug, Clone, Default)]
pub struct AttemptStats {
    pub attempt: usize,
    pub total_steps: usize,
    pub ceaseless_global_steps: usize,
    pub feasible_coordination: bool,
    pub cell_volume: f64,
    pub packing_fraction: f64,
}

/// Events emitted by design workers to the main thread.
#[derive(Debug, Clone)]
pub enum DesignEvent {
    /// Diagnostic log message.
    Log(String),

    /// A worker picked up a fresh random structure.
    AttemptStarted { attempt: usize, seed: u64 },

    /// A completed outer iteration with full statistics.
    IterationUpdate(AttemptStats),

    /// A design attempt ran to completion.
    AttemptFinished { attempt: usize, feasible: bool, total_steps: usize },
}
