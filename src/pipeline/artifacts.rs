//! Versioned artifact directory for one pipeline run.
//!
//! Every run gets its own `run-<UTC timestamp>` directory under the output
//! root, and files are created with `create_new` so a persisted artifact is
//! never overwritten.

use crate::error::Result;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Artifact file names
pub mod names {
    pub const CLUSTER_VECTORIZER: &str = "cluster_vectorizer.json";
    pub const KMEANS_MODEL: &str = "kmeans_model.bin";
    pub const CLUSTER_SUMMARIES: &str = "cluster_summaries.json";
    pub const CLUSTER_LABELS: &str = "cluster_labels.json";
    pub const CLUSTER_DIAGNOSTICS: &str = "cluster_diagnostics.json";
    pub const TRAIN_SET: &str = "train_set.csv";
    pub const TEST_SET: &str = "test_set.csv";
    pub const CLASSIFIER_VECTORIZER: &str = "classifier_vectorizer.json";
    pub const FEATURE_ENCODER: &str = "feature_encoder.json";
    pub const CLASSIFIER_MODEL: &str = "classifier_model.bin";
    pub const CLASSIFIER_REPORT: &str = "classifier_report.txt";
    pub const CONFUSION_MATRIX: &str = "confusion_matrix.csv";
    pub const MISCLASSIFIED: &str = "misclassified_samples.csv";
    pub const RUN_REPORT: &str = "run_report.json";
}

/// Directory holding the artifacts of one run
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    run_id: String,
    dir: PathBuf,
}

impl ArtifactStore {
    /// Create a fresh run directory under `root`
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;

        let base = format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"));
        let mut run_id = base.clone();
        let mut attempt = 1;
        loop {
            let dir = root.join(&run_id);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    info!(run_id = %run_id, dir = %dir.display(), "Created artifact directory");
                    return Ok(Self { run_id, dir });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    attempt += 1;
                    run_id = format!("{}-{}", base, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Open an existing run directory for reading
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let run_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { run_id, dir }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// New buffered file; fails if the artifact already exists
    pub fn create_file(&self, name: &str) -> Result<(BufWriter<File>, PathBuf)> {
        let path = self.path(name);
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        debug!(path = %path.display(), "Writing artifact");
        Ok((BufWriter::new(file), path))
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let (mut writer, path) = self.create_file(name)?;
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        Ok(path)
    }

    pub fn write_bincode<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let (mut writer, path) = self.create_file(name)?;
        bincode::serialize_into(&mut writer, value)?;
        writer.flush()?;
        Ok(path)
    }

    pub fn write_text(&self, name: &str, text: &str) -> Result<PathBuf> {
        let (mut writer, path) = self.create_file(name)?;
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        Ok(path)
    }

    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let reader = BufReader::new(File::open(self.path(name))?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn read_bincode<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let reader = BufReader::new(File::open(self.path(name))?);
        Ok(bincode::deserialize_from(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn test_runs_get_distinct_directories() {
        let root = tempdir().unwrap();
        let first = ArtifactStore::create(root.path()).unwrap();
        let second = ArtifactStore::create(root.path()).unwrap();

        assert_ne!(first.dir(), second.dir());
        assert!(first.run_id().starts_with("run-"));
        assert!(first.dir().is_dir());
    }

    #[test]
    fn test_artifacts_are_never_overwritten() {
        let root = tempdir().unwrap();
        let store = ArtifactStore::create(root.path()).unwrap();

        store.write_text(names::CLASSIFIER_REPORT, "first").unwrap();
        assert!(store.write_text(names::CLASSIFIER_REPORT, "second").is_err());
        assert_eq!(
            fs::read_to_string(store.path(names::CLASSIFIER_REPORT)).unwrap(),
            "first"
        );
    }

    #[test]
    fn test_json_and_bincode_read_back() {
        let root = tempdir().unwrap();
        let store = ArtifactStore::create(root.path()).unwrap();
        let labels: BTreeMap<usize, String> = [(0, "HIGH".to_string()), (3, "LOW".to_string())]
            .into_iter()
            .collect();

        store.write_json(names::CLUSTER_LABELS, &labels).unwrap();
        store.write_bincode(names::KMEANS_MODEL, &labels).unwrap();

        let reopened = ArtifactStore::open(store.dir());
        assert_eq!(reopened.run_id(), store.run_id());
        let from_json: BTreeMap<usize, String> = reopened.read_json(names::CLUSTER_LABELS).unwrap();
        let from_bin: BTreeMap<usize, String> = reopened.read_bincode(names::KMEANS_MODEL).unwrap();
        assert_eq!(from_json, labels);
        assert_eq!(from_bin, labels);
    }
}
