use nalgebra::Point3;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::errors::DesignError;
use crate::model::objective::ObjectiveCrystalStructure;
use crate::report::trajectory;

struct RecorderState {
    writer: Option<BufWriter<File>>,
    elapsed_count: usize,
    last_recorded: usize,
}

/// Trajectory recorder shared by the optimizer stages of one design attempt.
///
/// All file writes are serialised behind the internal mutex, which is held
/// only across the frame write, never while callers hold references into the
/// structures being optimized.
pub struct DesignRecorder {
    state: Mutex<RecorderState>,
    interval: usize,
}

impl DesignRecorder {
    pub fn create(path: &Path, interval: usize) -> Result<Self, DesignError> {
        let file = File::create(path)?;
        Ok(Self {
            state: Mutex::new(RecorderState {
                writer: Some(BufWriter::new(file)),
                elapsed_count: 0,
                last_recorded: 0,
            }),
            interval: interval.max(1),
        })
    }

    /// A recorder that swallows every frame; used when trajectory output is
    /// switched off.
    pub fn disabled() -> Self {
        Self {
            state: Mutex::new(RecorderState {
                writer: None,
                elapsed_count: 0,
                last_recorded: 0,
            }),
            interval: 1,
        }
    }

    pub fn elapsed_count(&self) -> usize {
        self.state.lock().elapsed_count
    }

    /// Advances the internal step counter and records at the interval.
    pub fn advance(&self, structure: &ObjectiveCrystalStructure) -> Result<(), DesignError> {
        let mut state = self.state.lock();
        state.elapsed_count += 1;
        let step = state.elapsed_count;
        Self::record_locked(&mut state, self.interval, structure, step)
    }

    /// Records iff `step_count` advances past the last written frame and
    /// lands on the interval.
    pub fn record(
        &self,
        structure: &ObjectiveCrystalStructure,
        step_count: usize,
    ) -> Result<(), DesignError> {
        let mut state = self.state.lock();
        state.elapsed_count = state.elapsed_count.max(step_count);
        Self::record_locked(&mut state, self.interval, structure, step_count)
    }

    /// Writes a frame unconditionally.
    pub fn force_record(&self, structure: &ObjectiveCrystalStructure) -> Result<(), DesignError> {
        let mut state = self.state.lock();
        let step = state.elapsed_count;
        Self::write_frame(&mut state, structure, step)
    }

    /// Flushes and closes the trajectory file; further records are dropped.
    pub fn release(&self) -> Result<(), DesignError> {
        let mut state = self.state.lock();
        if let Some(mut writer) = state.writer.take() {
            writer.flush()?;
        }
        state.elapsed_count = 0;
        state.last_recorded = 0;
        Ok(())
    }

    fn record_locked(
        state: &mut RecorderState,
        interval: usize,
        structure: &ObjectiveCrystalStructure,
        step_count: usize,
    ) -> Result<(), DesignError> {
        if step_count <= state.last_recorded || step_count % interval != 0 {
            return Ok(());
        }
        Self::write_frame(state, structure, step_count)
    }

    fn write_frame(
        state: &mut RecorderState,
        structure: &ObjectiveCrystalStructure,
        step_count: usize,
    ) -> Result<(), DesignError> {
        let Some(writer) = state.writer.as_mut() else {
            return Ok(());
        };

        let atoms: Vec<(u8, Point3<f64>)> = structure
            .corresponding_species()
            .iter()
            .zip(structure.atoms())
            .map(|(species, atom)| (species.atomic_number, atom.position))
            .collect();

        trajectory::write_frame(writer, structure.cell().basis(), &atoms, step_count, None)?;
        writer.flush()?;
        state.last_recorded = state.last_recorded.max(step_count);
        Ok(())
    }
}

impl Drop for DesignRecorder {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Some(mut writer) = state.writer.take() {
            let _ = writer.flush();
        }
    }
}
