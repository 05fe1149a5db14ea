use crate::ingest::LoadStats;
use crate::ml::ClassifierStatus;
use crate::models::RiskLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Final summary of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub artifact_dir: PathBuf,
    pub n_incidents: usize,
    /// Input counters, including rows degraded while decoding
    pub load: LoadStats,
    pub n_clusters: usize,
    pub label_distribution: BTreeMap<RiskLabel, usize>,
    pub train_size: usize,
    pub test_size: usize,
    pub train_distribution: BTreeMap<RiskLabel, usize>,
    pub test_distribution: BTreeMap<RiskLabel, usize>,
    /// Clusters whose summary is a sentinel
    pub degraded_clusters: usize,
    /// Incidents with at least one numeric field imputed
    pub imputed_rows: usize,
    pub classifier_status: ClassifierStatus,
    pub accuracy: Option<f64>,
    pub macro_f1: Option<f64>,
}

impl RunReport {
    pub fn label_count(&self, label: RiskLabel) -> usize {
        self.label_distribution.get(&label).copied().unwrap_or(0)
    }
}

fn write_distribution(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    counts: &BTreeMap<RiskLabel, usize>,
) -> fmt::Result {
    write!(f, "{}:", title)?;
    for label in RiskLabel::ALL {
        write!(f, " {}={}", label, counts.get(&label).copied().unwrap_or(0))?;
    }
    writeln!(f)
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} ({})", self.run_id, self.artifact_dir.display())?;
        writeln!(
            f,
            "Incidents: {}  Clusters: {}  Degraded clusters: {}  Imputed rows: {}",
            self.n_incidents, self.n_clusters, self.degraded_clusters, self.imputed_rows
        )?;
        writeln!(
            f,
            "Loaded rows: {}  Lossy rows: {}  Skipped rows: {}  Synthetic ids: {}  Out-of-range durations: {}",
            self.load.rows,
            self.load.lossy_rows,
            self.load.skipped_rows,
            self.load.synthetic_ids,
            self.load.out_of_range_durations
        )?;
        write_distribution(f, "Labels", &self.label_distribution)?;
        writeln!(f, "Train: {}  Test: {}", self.train_size, self.test_size)?;
        write_distribution(f, "Train labels", &self.train_distribution)?;
        write_distribution(f, "Test labels", &self.test_distribution)?;
        write!(f, "Classifier: {}", self.classifier_status)?;
        if let (Some(accuracy), Some(macro_f1)) = (self.accuracy, self.macro_f1) {
            write!(f, "  accuracy={:.4}  macro_f1={:.4}", accuracy, macro_f1)?;
        }
        writeln!(f)
    }
}
