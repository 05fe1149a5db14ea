use crate::error::{AppError, Result};
use crate::models::RiskLabel;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Prediction result with confidence score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction<T> {
    /// Predicted value
    pub value: T,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,

    /// All class probabilities, in class-index order
    pub probabilities: Vec<f64>,
}

impl<T> Prediction<T> {
    pub fn new(value: T, confidence: f64) -> Self {
        Self {
            value,
            confidence,
            probabilities: Vec::new(),
        }
    }

    pub fn with_probabilities(mut self, probabilities: Vec<f64>) -> Self {
        self.probabilities = probabilities;
        self
    }
}

impl Prediction<RiskLabel> {
    /// Build from one row of class probabilities (argmax wins)
    pub fn from_probabilities(probabilities: &[f64]) -> Result<Self> {
        let (index, &confidence) = probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .ok_or_else(|| AppError::Validation("empty probability vector".to_string()))?;
        let value = RiskLabel::from_index(index).ok_or_else(|| {
            AppError::Validation(format!("class index {} is not a risk label", index))
        })?;
        Ok(Self::new(value, confidence).with_probabilities(probabilities.to_vec()))
    }
}

/// Encoded features and integer labels for training
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    /// Feature matrix (n_samples × n_features)
    pub features: Array2<f64>,

    /// Class indices (LOW=0, MEDIUM=1, HIGH=2)
    pub labels: Vec<usize>,

    /// Number of samples
    pub n_samples: usize,

    /// Number of features
    pub n_features: usize,
}

impl TrainingDataset {
    pub fn new(features: Array2<f64>, labels: &[RiskLabel]) -> Result<Self> {
        let (n_samples, n_features) = features.dim();
        if labels.len() != n_samples {
            return Err(AppError::Validation(format!(
                "{} labels for {} feature rows",
                labels.len(),
                n_samples
            )));
        }
        Ok(Self {
            features,
            labels: labels.iter().map(|l| l.index()).collect(),
            n_samples,
            n_features,
        })
    }

    /// Rows per class index
    pub fn class_counts(&self) -> [usize; RiskLabel::COUNT] {
        let mut counts = [0; RiskLabel::COUNT];
        for &label in &self.labels {
            counts[label] += 1;
        }
        counts
    }
}

/// Model evaluation metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy
    pub accuracy: f64,

    /// Macro-averaged precision
    pub precision: f64,

    /// Macro-averaged recall
    pub recall: f64,

    /// Macro-averaged F1 score
    pub f1_score: f64,

    /// Support-weighted precision
    pub weighted_precision: f64,

    /// Support-weighted recall
    pub weighted_recall: f64,

    /// Support-weighted F1 score
    pub weighted_f1_score: f64,

    /// Rows are true classes, columns predicted classes
    pub confusion_matrix: Option<Array2<usize>>,

    /// Per-class metrics
    pub per_class_metrics: BTreeMap<RiskLabel, ClassMetrics>,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            weighted_precision: 0.0,
            weighted_recall: 0.0,
            weighted_f1_score: 0.0,
            confusion_matrix: None,
            per_class_metrics: BTreeMap::new(),
        }
    }

    /// Total number of evaluated rows
    pub fn support(&self) -> usize {
        self.per_class_metrics.values().map(|m| m.support).sum()
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Model version
    pub version: String,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Training metrics
    pub training_metrics: ModelMetrics,

    /// Hyperparameters
    pub hyperparameters: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dataset_requires_matching_lengths() {
        let features = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(TrainingDataset::new(features.clone(), &[RiskLabel::Low]).is_err());

        let dataset = TrainingDataset::new(features, &[RiskLabel::Low, RiskLabel::High]).unwrap();
        assert_eq!(dataset.n_samples, 2);
        assert_eq!(dataset.n_features, 2);
        assert_eq!(dataset.labels, vec![0, 2]);
        assert_eq!(dataset.class_counts(), [1, 0, 1]);
    }

    #[test]
    fn test_prediction_from_probabilities() {
        let prediction = Prediction::from_probabilities(&[0.1, 0.2, 0.7]).unwrap();
        assert_eq!(prediction.value, RiskLabel::High);
        assert!((prediction.confidence - 0.7).abs() < 1e-12);
        assert_eq!(prediction.probabilities.len(), 3);

        assert!(Prediction::from_probabilities(&[]).is_err());
    }

    #[test]
    fn test_metrics_default() {
        let metrics = ModelMetrics::default();
        assert_eq!(metrics.accuracy, 0.0);
        assert_eq!(metrics.support(), 0);
        assert!(metrics.confusion_matrix.is_none());
    }
}
