use crate::error::Result;
use crate::ml::models::{ModelMetadata, ModelMetrics, TrainingDataset};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum::Display;

#[cfg(feature = "boosting")]
pub use boosting::GradientBoostingClassifier;

/// Trait for classifiers
pub trait Classifier: Send + Sync {
    /// Train the classifier
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics>;

    /// Predict class labels
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>>;

    /// Predict class probabilities
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Check if model is trained
    fn is_trained(&self) -> bool;

    /// Persist the trained model
    fn save(&self, path: &Path) -> Result<()>;
}

/// Outcome of the classifier stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClassifierStatus {
    /// Model trained and evaluated
    Trained,

    /// Built without the boosting library; stage skipped
    Unavailable,
}

/// Gradient boosting hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostingConfig {
    pub n_rounds: usize,
    pub learning_rate: f64,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_rounds: 500,
            learning_rate: 0.05,
            max_depth: 6,
            min_samples_leaf: 5,
            seed: 42,
        }
    }
}

/// Whether this build can train classifiers
pub fn boosting_available() -> bool {
    cfg!(feature = "boosting")
}

/// A fresh untrained classifier, or `None` when the tree library is not compiled in
pub fn build_classifier(config: &BoostingConfig) -> Option<Box<dyn Classifier>> {
    #[cfg(feature = "boosting")]
    {
        Some(Box::new(GradientBoostingClassifier::new(config.clone())))
    }
    #[cfg(not(feature = "boosting"))]
    {
        let _ = config;
        None
    }
}

/// Numerically stable softmax of one score row
pub fn softmax(scores: ArrayView1<f64>) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

#[cfg(feature = "boosting")]
mod boosting {
    use super::*;
    use crate::error::AppError;
    use crate::ml::evaluation::calculate_metrics;
    use crate::models::RiskLabel;
    use ndarray::Axis;
    use smartcore::linalg::basic::matrix::DenseMatrix;
    use smartcore::tree::decision_tree_regressor::{
        DecisionTreeRegressor, DecisionTreeRegressorParameters,
    };
    use std::collections::HashMap;
    use std::fs::{File, OpenOptions};
    use std::io::{BufReader, BufWriter};
    use tracing::{debug, info};

    type RegressionTree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

    /// Floor applied to class priors so an absent class keeps a finite score
    const MIN_PRIOR: f64 = 1e-6;

    /// Multiclass gradient boosting with softmax loss.
    ///
    /// Starts from log class priors; every round fits one regression tree per
    /// class to the residual `y_k - p_k` and adds `learning_rate` times its
    /// prediction to that class's score.
    #[derive(Serialize, Deserialize)]
    pub struct GradientBoostingClassifier {
        /// Model metadata
        metadata: ModelMetadata,

        config: BoostingConfig,

        /// Log prior per class
        initial_scores: Vec<f64>,

        /// One tree per class per round
        rounds: Vec<Vec<RegressionTree>>,

        /// Is trained
        trained: bool,
    }

    impl GradientBoostingClassifier {
        pub fn new(config: BoostingConfig) -> Self {
            let hyperparameters: HashMap<String, String> = [
                ("n_rounds", config.n_rounds.to_string()),
                ("learning_rate", config.learning_rate.to_string()),
                ("max_depth", config.max_depth.to_string()),
                ("min_samples_leaf", config.min_samples_leaf.to_string()),
                ("seed", config.seed.to_string()),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

            Self {
                metadata: ModelMetadata {
                    name: "Gradient Boosting".to_string(),
                    version: "1.0".to_string(),
                    trained_at: chrono::Utc::now(),
                    n_training_samples: 0,
                    n_features: 0,
                    training_metrics: ModelMetrics::new(),
                    hyperparameters,
                },
                config,
                initial_scores: Vec::new(),
                rounds: Vec::new(),
                trained: false,
            }
        }

        /// Load a model written by [`Classifier::save`]
        pub fn load(path: &Path) -> Result<Self> {
            let reader = BufReader::new(File::open(path)?);
            Ok(bincode::deserialize_from(reader)?)
        }

        pub fn n_rounds(&self) -> usize {
            self.rounds.len()
        }

        fn ndarray_to_densematrix(arr: &Array2<f64>) -> DenseMatrix<f64> {
            let shape = arr.shape();
            let data: Vec<f64> = arr.iter().copied().collect();
            DenseMatrix::new(shape[0], shape[1], data, false)
        }

        fn tree_parameters(&self, round: usize, class: usize) -> DecisionTreeRegressorParameters {
            let mut params = DecisionTreeRegressorParameters::default()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf)
                .with_min_samples_split(2);
            params.seed = Some(
                self.config
                    .seed
                    .wrapping_add((round * RiskLabel::COUNT + class) as u64),
            );
            params
        }

        fn prior_scores(dataset: &TrainingDataset) -> Vec<f64> {
            let n = dataset.n_samples as f64;
            dataset
                .class_counts()
                .iter()
                .map(|&count| (count as f64 / n).max(MIN_PRIOR).ln())
                .collect()
        }

        /// Raw scores for every row
        fn decision_function(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
            if !self.trained {
                return Err(AppError::NotFitted("Model not trained".to_string()));
            }
            if features.ncols() != self.metadata.n_features {
                return Err(AppError::Validation(format!(
                    "expected {} features, got {}",
                    self.metadata.n_features,
                    features.ncols()
                )));
            }

            let n_samples = features.nrows();
            let mut scores = Array2::zeros((n_samples, RiskLabel::COUNT));
            for (k, &prior) in self.initial_scores.iter().enumerate() {
                scores.column_mut(k).fill(prior);
            }
            if n_samples == 0 {
                return Ok(scores);
            }

            let x = Self::ndarray_to_densematrix(features);
            for trees in &self.rounds {
                for (k, tree) in trees.iter().enumerate() {
                    let update = tree
                        .predict(&x)
                        .map_err(|e| AppError::Internal(format!("Prediction failed: {}", e)))?;
                    for (score, delta) in scores.column_mut(k).iter_mut().zip(update) {
                        *score += self.config.learning_rate * delta;
                    }
                }
            }
            Ok(scores)
        }

        fn argmax_rows(proba: &Array2<f64>) -> Vec<usize> {
            proba
                .axis_iter(Axis(0))
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .max_by(|a, b| a.1.total_cmp(b.1))
                        .map(|(idx, _)| idx)
                        .unwrap_or(0)
                })
                .collect()
        }

        fn scores_to_proba(scores: &Array2<f64>) -> Array2<f64> {
            let mut proba = Array2::zeros(scores.raw_dim());
            for (i, row) in scores.axis_iter(Axis(0)).enumerate() {
                for (k, p) in softmax(row).into_iter().enumerate() {
                    proba[[i, k]] = p;
                }
            }
            proba
        }
    }

    impl Classifier for GradientBoostingClassifier {
        fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics> {
            if dataset.n_samples == 0 {
                return Err(AppError::Training(
                    "Cannot train on an empty dataset".to_string(),
                ));
            }

            info!(
                samples = dataset.n_samples,
                features = dataset.n_features,
                rounds = self.config.n_rounds,
                "Training gradient boosting classifier"
            );

            let x = Self::ndarray_to_densematrix(&dataset.features);
            self.initial_scores = Self::prior_scores(dataset);
            self.rounds = Vec::with_capacity(self.config.n_rounds);

            let mut scores = Array2::zeros((dataset.n_samples, RiskLabel::COUNT));
            for (k, &prior) in self.initial_scores.iter().enumerate() {
                scores.column_mut(k).fill(prior);
            }

            for round in 0..self.config.n_rounds {
                let proba = Self::scores_to_proba(&scores);
                let mut trees = Vec::with_capacity(RiskLabel::COUNT);

                for k in 0..RiskLabel::COUNT {
                    let residuals: Vec<f64> = dataset
                        .labels
                        .iter()
                        .zip(proba.column(k))
                        .map(|(&label, &p)| if label == k { 1.0 - p } else { -p })
                        .collect();

                    let tree = RegressionTree::fit(&x, &residuals, self.tree_parameters(round, k))
                        .map_err(|e| {
                            AppError::Training(format!("Failed to fit boosting tree: {}", e))
                        })?;
                    let update = tree
                        .predict(&x)
                        .map_err(|e| AppError::Training(format!("Tree prediction failed: {}", e)))?;
                    for (score, delta) in scores.column_mut(k).iter_mut().zip(update) {
                        *score += self.config.learning_rate * delta;
                    }
                    trees.push(tree);
                }

                self.rounds.push(trees);
                if (round + 1) % 100 == 0 {
                    debug!(round = round + 1, "Boosting progress");
                }
            }

            self.trained = true;

            let predictions = Self::argmax_rows(&Self::scores_to_proba(&scores));
            let metrics = calculate_metrics(&dataset.labels, &predictions);

            self.metadata.n_training_samples = dataset.n_samples;
            self.metadata.n_features = dataset.n_features;
            self.metadata.trained_at = chrono::Utc::now();
            self.metadata.training_metrics = metrics.clone();

            info!(accuracy = metrics.accuracy, "Training complete");
            Ok(metrics)
        }

        fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
            Ok(Self::argmax_rows(&self.predict_proba(features)?))
        }

        fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
            let scores = self.decision_function(features)?;
            Ok(Self::scores_to_proba(&scores))
        }

        fn metadata(&self) -> &ModelMetadata {
            &self.metadata
        }

        fn is_trained(&self) -> bool {
            self.trained
        }

        fn save(&self, path: &Path) -> Result<()> {
            if !self.trained {
                return Err(AppError::NotFitted("Model not trained".to_string()));
            }
            let file = OpenOptions::new().write(true).create_new(true).open(path)?;
            let writer = BufWriter::new(file);
            bincode::serialize_into(writer, self)?;
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use tempfile::tempdir;

        fn separable() -> TrainingDataset {
            let mut rows = Vec::new();
            let mut labels = Vec::new();
            for i in 0..30 {
                let jitter = (i % 5) as f64 * 0.1;
                rows.extend_from_slice(&[0.0 + jitter, 1.0]);
                labels.push(RiskLabel::Low);
                rows.extend_from_slice(&[5.0 + jitter, 1.0]);
                labels.push(RiskLabel::Medium);
                rows.extend_from_slice(&[10.0 + jitter, -1.0]);
                labels.push(RiskLabel::High);
            }
            let features = Array2::from_shape_vec((labels.len(), 2), rows).unwrap();
            TrainingDataset::new(features, &labels).unwrap()
        }

        fn small_config() -> BoostingConfig {
            BoostingConfig {
                n_rounds: 40,
                learning_rate: 0.3,
                max_depth: 3,
                min_samples_leaf: 1,
                seed: 42,
            }
        }

        #[test]
        fn test_untrained_model_rejects_prediction() {
            let model = GradientBoostingClassifier::new(small_config());
            assert!(!model.is_trained());
            assert!(model.predict(&Array2::zeros((1, 2))).is_err());
        }

        #[test]
        fn test_learns_separable_classes() {
            let dataset = separable();
            let mut model = GradientBoostingClassifier::new(small_config());
            let metrics = model.train(&dataset).unwrap();

            assert!(metrics.accuracy > 0.95);
            assert_eq!(model.n_rounds(), 40);
            assert_eq!(model.metadata().n_features, 2);

            let test = ndarray::array![[0.2, 1.0], [5.1, 1.0], [10.3, -1.0]];
            assert_eq!(model.predict(&test).unwrap(), vec![0, 1, 2]);
        }

        #[test]
        fn test_probabilities_sum_to_one() {
            let dataset = separable();
            let mut model = GradientBoostingClassifier::new(small_config());
            model.train(&dataset).unwrap();

            let proba = model.predict_proba(&dataset.features).unwrap();
            assert_eq!(proba.shape(), &[90, 3]);
            for row in proba.axis_iter(Axis(0)) {
                assert!((row.sum() - 1.0).abs() < 1e-9);
            }
        }

        #[test]
        fn test_feature_count_mismatch() {
            let dataset = separable();
            let mut model = GradientBoostingClassifier::new(small_config());
            model.train(&dataset).unwrap();
            assert!(model.predict(&Array2::zeros((1, 3))).is_err());
        }

        #[test]
        fn test_save_and_load() {
            let dataset = separable();
            let mut model = GradientBoostingClassifier::new(small_config());
            model.train(&dataset).unwrap();

            let dir = tempdir().unwrap();
            let path = dir.path().join("classifier_model.bin");
            model.save(&path).unwrap();

            let loaded = GradientBoostingClassifier::load(&path).unwrap();
            assert_eq!(
                loaded.predict(&dataset.features).unwrap(),
                model.predict(&dataset.features).unwrap()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_softmax_is_normalized_and_stable() {
        let p = softmax(array![1000.0, 1000.0, 1000.0].view());
        for v in &p {
            assert!((v - 1.0 / 3.0).abs() < 1e-12);
        }

        let p = softmax(array![0.0, 2.0, 1.0].view());
        assert!(p[1] > p[2] && p[2] > p[0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_availability_matches_build() {
        assert_eq!(
            build_classifier(&BoostingConfig::default()).is_some(),
            boosting_available()
        );
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(ClassifierStatus::Trained.to_string(), "trained");
        assert_eq!(ClassifierStatus::Unavailable.to_string(), "unavailable");
    }
}
