use crate::config::{Config, PipelineConfig};
use crate::error::{AppError, Result};
use crate::ingest::{IncidentLoader, IncidentWriter, LoadStats};
use crate::llm::{ClusterSummarizer, OllamaClient};
use crate::ml::{
    build_classifier, label_distribution, write_confusion_matrix, BoostingConfig,
    ClassifierStatus, ClusterConfig, ClusterLabeler, Clusterer, EncoderConfig, Evaluator,
    FeatureBuilder, FeatureEncoder, LabelerConfig, Split, StratifiedSplitter, TfidfConfig,
    TrainingDataset,
};
use crate::models::{Incident, RiskLabel};
use crate::pipeline::artifacts::{names, ArtifactStore};
use crate::pipeline::report::RunReport;
use crate::pipeline::state::PipelineState;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs every stage once, in order, writing a new artifact directory
pub struct Pipeline {
    config: PipelineConfig,
    summarizer: ClusterSummarizer,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, summarizer: ClusterSummarizer) -> Self {
        Self { config, summarizer }
    }

    /// Pipeline backed by the HTTP text-generation client
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = OllamaClient::new(&config.llm)?;
        let summarizer = ClusterSummarizer::from_config(Arc::new(client), &config.llm);
        Ok(Self::new(config.pipeline.clone(), summarizer))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the configured input file and run
    pub async fn run(&self) -> Result<RunReport> {
        let (incidents, stats) = IncidentLoader::new().load(&self.config.input_path)?;
        self.run_with_incidents(incidents, stats).await
    }

    /// Run over already loaded incidents
    pub async fn run_with_incidents(
        &self,
        incidents: Vec<Incident>,
        load_stats: LoadStats,
    ) -> Result<RunReport> {
        if incidents.is_empty() {
            return Err(AppError::Validation("no incidents to process".to_string()));
        }

        let store = ArtifactStore::create(&self.config.output_dir)?;
        let mut state = PipelineState::new(incidents, load_stats);
        info!(
            run_id = store.run_id(),
            incidents = state.incidents.len(),
            "Starting risk-scoring run"
        );

        self.build_features(&mut state);
        self.cluster(&mut state, &store)?;
        self.label(&mut state, &store).await?;
        self.split(&mut state, &store)?;
        self.encode_and_classify(&mut state, &store)?;

        let report = self.report(&state, &store)?;
        info!(
            run_id = %report.run_id,
            status = %report.classifier_status,
            degraded_clusters = report.degraded_clusters,
            "Run complete"
        );
        Ok(report)
    }

    fn build_features(&self, state: &mut PipelineState) {
        let stats = FeatureBuilder::build_all(&mut state.incidents);
        let imputed = state.imputed_rows();
        if imputed > 0 {
            warn!(imputed_rows = imputed, "Incidents with missing or out-of-range numeric fields");
        }
        info!(
            rows = stats.rows,
            unknown_age = stats.unknown_age,
            "Built medical text"
        );
        state.build_stats = Some(stats);
    }

    fn cluster(&self, state: &mut PipelineState, store: &ArtifactStore) -> Result<()> {
        let clusterer = Clusterer::new(ClusterConfig {
            n_clusters: self.config.n_clusters,
            max_features: self.config.cluster_max_features,
            n_init: self.config.kmeans_n_init,
            max_iter: self.config.kmeans_max_iter,
            seed: self.config.seed,
        });
        let outcome = clusterer.fit_assign(&mut state.incidents)?;

        let vectorizer_path = store.write_json(names::CLUSTER_VECTORIZER, &outcome.vectorizer)?;
        let model_path = store.write_bincode(names::KMEANS_MODEL, &outcome.model)?;
        info!(
            vectorizer = %vectorizer_path.display(),
            model = %model_path.display(),
            "Saved clustering artifacts"
        );

        state.clustering = Some(outcome);
        Ok(())
    }

    async fn label(&self, state: &mut PipelineState, store: &ArtifactStore) -> Result<()> {
        let labeler = ClusterLabeler::new(
            LabelerConfig {
                samples_per_cluster: self.config.samples_per_cluster,
                seed: self.config.seed,
            },
            self.summarizer.clone(),
        );
        let outcome = labeler.label(&mut state.incidents).await?;

        let degraded = outcome.degraded_clusters();
        if degraded > 0 {
            warn!(degraded_clusters = degraded, "Clusters labeled from sentinel summaries");
        }

        store.write_json(names::CLUSTER_SUMMARIES, &outcome.summary_texts())?;
        store.write_json(names::CLUSTER_LABELS, &outcome.labels())?;
        let diagnostics_path = store.write_json(names::CLUSTER_DIAGNOSTICS, &outcome.diagnostics)?;
        info!(
            distribution = ?label_distribution(&state.incidents),
            diagnostics = %diagnostics_path.display(),
            "Saved cluster labels"
        );

        state.labeling = Some(outcome);
        Ok(())
    }

    fn split(&self, state: &mut PipelineState, store: &ArtifactStore) -> Result<()> {
        let splitter = StratifiedSplitter::new(self.config.test_fraction, self.config.seed)?;
        let split = splitter.split(std::mem::take(&mut state.incidents))?;

        write_split_file(store, names::TRAIN_SET, &split.train)?;
        write_split_file(store, names::TEST_SET, &split.test)?;
        info!(
            train = split.train.len(),
            test = split.test.len(),
            "Saved train/test sets"
        );

        state.split = Some(split);
        Ok(())
    }

    fn encode_and_classify(&self, state: &mut PipelineState, store: &ArtifactStore) -> Result<()> {
        let split = state
            .split
            .as_ref()
            .ok_or_else(|| AppError::Internal("split stage has not run".to_string()))?;

        let mut encoder = FeatureEncoder::new(EncoderConfig {
            tfidf: TfidfConfig::with_max_features(self.config.classifier_max_features),
            ..EncoderConfig::default()
        });
        let train_matrix = encoder.fit_transform(&split.train)?;
        let test_matrix = encoder.transform(&split.test)?;
        debug_assert_eq!(train_matrix.columns, test_matrix.columns);

        store.write_json(names::CLASSIFIER_VECTORIZER, encoder.vectorizer())?;
        store.write_json(names::FEATURE_ENCODER, &encoder)?;

        let boosting = BoostingConfig {
            n_rounds: self.config.boosting_rounds,
            learning_rate: self.config.learning_rate,
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            seed: self.config.seed,
        };

        let Some(mut classifier) = build_classifier(&boosting) else {
            warn!("Gradient boosting support not compiled in, skipping classifier training");
            state.encoder = Some(encoder);
            state.classifier_status = Some(ClassifierStatus::Unavailable);
            return Ok(());
        };

        let train_labels = labels_of(&split.train)?;
        let dataset = TrainingDataset::new(train_matrix.values, &train_labels)?;
        classifier.train(&dataset)?;
        classifier.save(&store.path(names::CLASSIFIER_MODEL))?;

        let evaluation = Evaluator::evaluate(classifier.as_ref(), &test_matrix, &split.test)?;

        let report_text = split_report(split) + &evaluation.report();
        store.write_text(names::CLASSIFIER_REPORT, &report_text)?;

        let matrix = evaluation
            .metrics
            .confusion_matrix
            .clone()
            .unwrap_or_else(|| ndarray::Array2::zeros((RiskLabel::COUNT, RiskLabel::COUNT)));
        let (mut writer, _) = store.create_file(names::CONFUSION_MATRIX)?;
        write_confusion_matrix(&mut writer, &matrix)?;
        writer.flush()?;

        let (mut writer, misclassified_path) = store.create_file(names::MISCLASSIFIED)?;
        evaluation.write_misclassified(&mut writer, &split.test)?;
        writer.flush()?;
        info!(
            misclassified = evaluation.misclassified.len(),
            path = %misclassified_path.display(),
            "Saved evaluation artifacts"
        );

        state.encoder = Some(encoder);
        state.evaluation = Some(evaluation);
        state.classifier_status = Some(ClassifierStatus::Trained);
        Ok(())
    }

    fn report(&self, state: &PipelineState, store: &ArtifactStore) -> Result<RunReport> {
        let split = state
            .split
            .as_ref()
            .ok_or_else(|| AppError::Internal("split stage has not run".to_string()))?;
        let labels = state
            .labeling
            .as_ref()
            .ok_or_else(|| AppError::Internal("labeling stage has not run".to_string()))?;

        let mut distribution: BTreeMap<RiskLabel, usize> = BTreeMap::new();
        for label in state.all_incidents().filter_map(Incident::risk_label) {
            *distribution.entry(label).or_insert(0) += 1;
        }

        let report = RunReport {
            run_id: store.run_id().to_string(),
            artifact_dir: store.dir().to_path_buf(),
            n_incidents: state.n_incidents(),
            load: state.load_stats.clone(),
            n_clusters: state
                .clustering
                .as_ref()
                .map(|c| c.model.n_clusters())
                .unwrap_or(0),
            label_distribution: distribution,
            train_size: split.train.len(),
            test_size: split.test.len(),
            train_distribution: split.train_distribution(),
            test_distribution: split.test_distribution(),
            degraded_clusters: labels.degraded_clusters(),
            imputed_rows: state.imputed_rows(),
            classifier_status: state
                .classifier_status
                .unwrap_or(ClassifierStatus::Unavailable),
            accuracy: state.evaluation.as_ref().map(|e| e.metrics.accuracy),
            macro_f1: state.evaluation.as_ref().map(|e| e.metrics.f1_score),
        };

        store.write_json(names::RUN_REPORT, &report)?;
        Ok(report)
    }
}

/// Persist one side of the split; fails if the file already exists
fn write_split_file(store: &ArtifactStore, name: &str, incidents: &[Incident]) -> Result<()> {
    let (file, _) = store.create_file(name)?;
    let mut writer = IncidentWriter::from_writer(file, &[])?;
    for incident in incidents {
        writer.write(incident, &[])?;
    }
    writer.finish()?.flush()?;
    Ok(())
}

fn labels_of(incidents: &[Incident]) -> Result<Vec<RiskLabel>> {
    incidents
        .iter()
        .map(|i| {
            i.risk_label().ok_or_else(|| {
                AppError::Processing(format!("incident {} has no risk label", i.id))
            })
        })
        .collect()
}

/// Header of the classifier report: split sizes and class distributions
fn split_report(split: &Split) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Train size: {}", split.train.len());
    let _ = writeln!(out, "Test size: {}", split.test.len());
    for (title, counts) in [
        ("Train label distribution", split.train_distribution()),
        ("Test label distribution", split.test_distribution()),
    ] {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}:", title);
        for label in RiskLabel::ALL {
            let _ = writeln!(out, "  {}: {}", label, counts.get(&label).copied().unwrap_or(0));
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Classification report (test set):");
    out
}
