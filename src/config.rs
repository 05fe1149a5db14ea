use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Pipeline configuration
    #[validate(nested)]
    pub pipeline: PipelineConfig,

    /// Text-generation collaborator configuration
    #[validate(nested)]
    pub llm: LlmConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("EMS_RISK_CONFIG").unwrap_or_else(|_| "config/local.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: EMS_RISK_)
            .add_source(
                config::Environment::with_prefix("EMS_RISK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            llm: LlmConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    /// Incident CSV file
    pub input_path: PathBuf,

    /// Root directory for versioned run artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Number of narrative clusters
    #[serde(default = "default_n_clusters")]
    #[validate(range(min = 1))]
    pub n_clusters: usize,

    /// Incidents sent to the summarizer per cluster
    #[serde(default = "default_samples_per_cluster")]
    #[validate(range(min = 1))]
    pub samples_per_cluster: usize,

    /// Held-out fraction for the stratified split
    #[serde(default = "default_test_fraction")]
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub test_fraction: f64,

    /// Seed shared by every randomized stage
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Vocabulary bound for the clustering vectorizer
    #[serde(default = "default_cluster_max_features")]
    #[validate(range(min = 1))]
    pub cluster_max_features: usize,

    /// Vocabulary bound for the classifier vectorizer
    #[serde(default = "default_classifier_max_features")]
    #[validate(range(min = 1))]
    pub classifier_max_features: usize,

    /// K-means restarts
    #[serde(default = "default_kmeans_n_init")]
    #[validate(range(min = 1))]
    pub kmeans_n_init: usize,

    /// K-means iteration cap per restart
    #[serde(default = "default_kmeans_max_iter")]
    #[validate(range(min = 1))]
    pub kmeans_max_iter: usize,

    /// Boosting rounds
    #[serde(default = "default_boosting_rounds")]
    #[validate(range(min = 1))]
    pub boosting_rounds: usize,

    /// Shrinkage applied to every tree
    #[serde(default = "default_learning_rate")]
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub learning_rate: f64,

    /// Maximum depth of each regression tree
    #[serde(default = "default_max_depth")]
    #[validate(range(min = 1))]
    pub max_depth: u16,

    /// Minimum samples per tree leaf
    #[serde(default = "default_min_samples_leaf")]
    #[validate(range(min = 1))]
    pub min_samples_leaf: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("data/eda.csv"),
            output_dir: default_output_dir(),
            n_clusters: default_n_clusters(),
            samples_per_cluster: default_samples_per_cluster(),
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            cluster_max_features: default_cluster_max_features(),
            classifier_max_features: default_classifier_max_features(),
            kmeans_n_init: default_kmeans_n_init(),
            kmeans_max_iter: default_kmeans_max_iter(),
            boosting_rounds: default_boosting_rounds(),
            learning_rate: default_learning_rate(),
            max_depth: default_max_depth(),
            min_samples_leaf: default_min_samples_leaf(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LlmConfig {
    /// Base URL of the text-generation server
    #[serde(default = "default_llm_base_url")]
    #[validate(url)]
    pub base_url: String,

    /// Model name passed with every request
    #[serde(default = "default_llm_model")]
    #[validate(length(min = 1))]
    pub model: String,

    /// Request timeout (seconds)
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Attempts per request before giving up
    #[serde(default = "default_max_retries")]
    #[validate(range(min = 1))]
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Multiplier applied to the delay after each failed attempt
    #[serde(default = "default_backoff_multiplier")]
    #[validate(range(min = 1.0))]
    pub backoff_multiplier: f64,

    /// Pause after every cluster summarization (milliseconds)
    #[serde(default = "default_sleep_between_calls")]
    pub sleep_between_calls_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            sleep_between_calls_ms: default_sleep_between_calls(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

// Default value functions
fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_n_clusters() -> usize {
    30
}

fn default_samples_per_cluster() -> usize {
    30
}

fn default_test_fraction() -> f64 {
    0.3
}

fn default_seed() -> u64 {
    42
}

fn default_cluster_max_features() -> usize {
    8000
}

fn default_classifier_max_features() -> usize {
    500
}

fn default_kmeans_n_init() -> usize {
    10
}

fn default_kmeans_max_iter() -> usize {
    300
}

fn default_boosting_rounds() -> usize {
    500
}

fn default_learning_rate() -> f64 {
    0.05
}

fn default_max_depth() -> u16 {
    6
}

fn default_min_samples_leaf() -> usize {
    5
}

fn default_llm_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_llm_model() -> String {
    "gemma:7b-instruct".to_string()
}

fn default_llm_timeout() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_sleep_between_calls() -> u64 {
    250
}

fn default_log_level() -> String {
    "info".to_string()
}
