use chrono::Utc;
use log::info;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::errors::DesignError;
use crate::model::constraining::ConstrainingCrystalStructure;
use crate::report::cif;
use crate::symmetry::{CrystallographicSite, SymmetrizedStructure, SymmetryOracle};

// Serialises mutations of the shared results tree across worker threads.
static RESULTS_TREE_MUTEX: Mutex<()> = Mutex::new(());

/// Outcome row of one design attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub attempt: usize,
    pub seed: u64,
    pub feasible: bool,
    pub total_steps: usize,
}

/// Per-rank production reporter: owns `<root>/rank_<r>/`, writes one CIF per
/// finished attempt, and appends to the rank's CSV summary.
pub struct ProductionReporter {
    directory: PathBuf,
    summary: Mutex<csv::Writer<BufWriter<File>>>,
}

impl ProductionReporter {
    pub fn new(root: &Path, rank: usize) -> Result<Self, DesignError> {
        let directory = root.join(format!("rank_{rank}"));
        {
            let _guard = RESULTS_TREE_MUTEX.lock();
            fs::create_dir_all(&directory)?;
        }

        let summary_path = directory.join("summary.csv");
        let mut summary = csv::Writer::from_writer(BufWriter::new(File::create(&summary_path)?));
        summary
            .write_record([
                "attempt",
                "seed",
                "outcome",
                "total_steps",
                "space_group",
                "formula",
                "volume",
                "packing_fraction",
                "recorded_at",
            ])
            .map_err(into_io)?;
        summary.flush()?;

        Ok(Self { directory, summary: Mutex::new(summary) })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Unique production name for one attempt's output files.
    pub fn production_name(&self) -> String {
        format!("xtal-{}", Uuid::new_v4())
    }

    pub fn trajectory_path(&self, production_name: &str) -> PathBuf {
        self.directory.join(format!("{production_name}.md"))
    }

    /// Labels the structure through the oracle, writes `<name>.cif`, and
    /// appends the summary row.
    pub fn report_attempt(
        &self,
        record: &AttemptRecord,
        production_name: &str,
        structure: &ConstrainingCrystalStructure,
        oracle: &dyn SymmetryOracle,
    ) -> Result<PathBuf, DesignError> {
        let sites: Vec<CrystallographicSite> = structure
            .atoms()
            .iter()
            .map(|atom| CrystallographicSite::new(atom.species, atom.position))
            .collect();
        let mut symmetrized = SymmetrizedStructure::new(structure.cell().clone(), sites);

        let space_group = oracle.update_symmetry_information(&mut symmetrized)?;
        let operations = oracle.symmetry_operations(&symmetrized, space_group)?;

        let cif_path = self.directory.join(format!("{production_name}.cif"));
        {
            let _guard = RESULTS_TREE_MUTEX.lock();
            let mut writer = BufWriter::new(File::create(&cif_path)?);
            cif::write_cif(&mut writer, &symmetrized, space_group, &operations)?;
        }

        let outcome = if record.feasible { "feasible" } else { "timed_out" };
        {
            let mut summary = self.summary.lock();
            summary
                .write_record([
                    record.attempt.to_string(),
                    record.seed.to_string(),
                    outcome.to_string(),
                    record.total_steps.to_string(),
                    space_group.to_string(),
                    cif::sum_formula(&symmetrized),
                    format!("{:.6}", structure.cell().volume()),
                    format!("{:.6}", structure.packing_fraction()),
                    Utc::now().to_rfc3339(),
                ])
                .map_err(into_io)?;
            summary.flush()?;
        }

        info!(
            "attempt {} ({}): {} after {} steps -> {}",
            record.attempt,
            production_name,
            outcome,
            record.total_steps,
            cif_path.display()
        );
        Ok(cif_path)
    }
}

fn into_io(error: csv::Error) -> DesignError {
    DesignError::Io(std::io::Error::new(std::io::ErrorKind::Other, error))
}
