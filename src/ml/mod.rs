/// Machine learning stages of the risk-scoring pipeline
///
/// This module provides:
/// - Medical-text feature building
/// - TF-IDF vectorization and sparse k-means clustering
/// - Keyword-based cluster labeling from free-text summaries
/// - Stratified train/test splitting
/// - Feature encoding fit on the training split only
/// - Gradient-boosted classification and evaluation

pub mod classifier;
pub mod clustering;
pub mod encoder;
pub mod evaluation;
pub mod features;
pub mod labeling;
pub mod models;
pub mod split;
pub mod text;

pub use classifier::{
    boosting_available, build_classifier, BoostingConfig, Classifier, ClassifierStatus,
};
#[cfg(feature = "boosting")]
pub use classifier::GradientBoostingClassifier;
pub use clustering::{ClusterConfig, Clusterer, ClusteringOutcome, KMeans, KMeansConfig, KMeansModel};
pub use encoder::{
    CategoricalField, EncoderConfig, FeatureEncoder, FeatureMatrix, OneHotEncoder,
    MISSING_SENTINEL, UNKNOWN_CATEGORY,
};
pub use evaluation::{
    calculate_metrics, classification_report, confusion_matrix, confusion_matrix_table,
    write_confusion_matrix, Evaluation, Evaluator, Misclassified,
};
pub use features::{BuildStats, FeatureBuilder, TextPreprocessor};
pub use labeling::{extract_label, ClusterLabeler, LabelerConfig, LabelingOutcome};
pub use models::{ClassMetrics, ModelMetadata, ModelMetrics, Prediction, TrainingDataset};
pub use split::{label_distribution, Split, StratifiedSplitter};
pub use text::{SparseVector, TfidfConfig, TfidfVectorizer};
