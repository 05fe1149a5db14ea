use crate::error::{AppError, Result};
use crate::llm::ClusterSummarizer;
use crate::models::{
    ClusterDiagnostic, ClusterSummary, DiagnosticExample, Incident, RiskLabel, SampleRecord,
    ERROR_SENTINEL, NO_RESPONSE_SENTINEL,
};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const HIGH_KEYWORDS: &[&str] = &[
    "cardiac arrest",
    "life-threatening",
    "severe",
    "airway",
    "major",
    "unconscious",
    "seizure",
    "death",
    "dead on arrival",
    "expired",
];

const LOW_KEYWORDS: &[&str] = &[
    "low risk",
    "minor",
    "no injury",
    "epistaxis",
    "nosebleed",
    "public assist",
    "lift assist",
    "lift-assist",
    "non traumatic",
    "non-traumatic",
    "no treatment",
];

const MEDIUM_KEYWORDS: &[&str] = &[
    "moderate",
    "stable",
    "transport",
    "observation",
    "requires transport",
    "non life-threatening",
];

static CARE_DESTINATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(hospital|ed|transport)\b").expect("valid regex"));

/// Number of example rows kept per cluster in the diagnostics
pub const DIAGNOSTIC_EXAMPLES: usize = 3;

/// Map a free-text summary to a risk label.
///
/// Keyword groups are checked in a fixed order: HIGH, then LOW, then MEDIUM.
/// Anything unmatched, including sentinel summaries, is MEDIUM.
pub fn extract_label(summary: &str) -> RiskLabel {
    if ClusterSummary::is_sentinel(summary) {
        return RiskLabel::Medium;
    }

    let text = summary.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

    if mentions(HIGH_KEYWORDS) {
        RiskLabel::High
    } else if mentions(LOW_KEYWORDS) {
        RiskLabel::Low
    } else if mentions(MEDIUM_KEYWORDS) || CARE_DESTINATION.is_match(&text) {
        RiskLabel::Medium
    } else {
        debug!("No risk keyword in summary, defaulting to MEDIUM");
        RiskLabel::Medium
    }
}

/// Labeler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelerConfig {
    /// Upper bound on incidents sent per cluster
    pub samples_per_cluster: usize,

    /// Sampling seed
    pub seed: u64,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            samples_per_cluster: 30,
            seed: 42,
        }
    }
}

/// Everything the labeler produced for one run
#[derive(Debug, Clone, Default)]
pub struct LabelingOutcome {
    /// One summary per non-empty cluster, ordered by cluster id
    pub summaries: Vec<ClusterSummary>,

    pub diagnostics: BTreeMap<usize, ClusterDiagnostic>,
}

impl LabelingOutcome {
    /// Cluster id -> label
    pub fn labels(&self) -> BTreeMap<usize, RiskLabel> {
        self.summaries.iter().map(|s| (s.cluster_id, s.label)).collect()
    }

    /// Cluster id -> summary text
    pub fn summary_texts(&self) -> BTreeMap<usize, String> {
        self.summaries
            .iter()
            .map(|s| (s.cluster_id, s.summary.clone()))
            .collect()
    }

    pub fn degraded_clusters(&self) -> usize {
        self.summaries.iter().filter(|s| s.degraded).count()
    }
}

/// Summarizes clusters and propagates the derived label to every member
pub struct ClusterLabeler {
    config: LabelerConfig,
    summarizer: ClusterSummarizer,
}

impl ClusterLabeler {
    pub fn new(config: LabelerConfig, summarizer: ClusterSummarizer) -> Self {
        Self { config, summarizer }
    }

    /// Label every clustered incident.
    ///
    /// Clusters are summarized one at a time. A failed or empty summary is
    /// recorded as a sentinel and labeled MEDIUM; it never stops the run.
    pub async fn label(&self, incidents: &mut [Incident]) -> Result<LabelingOutcome> {
        let members = group_by_cluster(incidents)?;
        info!(
            clusters = members.len(),
            summarizer = self.summarizer.generator_name(),
            "Labeling clusters"
        );

        let mut outcome = LabelingOutcome::default();

        for (&cluster_id, indices) in &members {
            let samples = self.sample(cluster_id, indices, incidents);
            let summary = match self.summarizer.summarize(cluster_id, &samples).await {
                Ok(text) if text.is_empty() => {
                    warn!(cluster_id, "Empty summary, recording sentinel");
                    NO_RESPONSE_SENTINEL.to_string()
                }
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        cluster_id,
                        code = e.error_code(),
                        error = %e,
                        "Summarization failed, recording sentinel"
                    );
                    ERROR_SENTINEL.to_string()
                }
            };

            let label = extract_label(&summary);
            let degraded = ClusterSummary::is_sentinel(&summary);
            info!(cluster_id, size = indices.len(), %label, degraded, "Cluster labeled");

            for &idx in indices {
                incidents[idx].assign_label(label)?;
            }

            outcome.diagnostics.insert(
                cluster_id,
                ClusterDiagnostic {
                    assigned_label: label,
                    cluster_size: indices.len(),
                    examples: indices
                        .iter()
                        .take(DIAGNOSTIC_EXAMPLES)
                        .map(|&idx| DiagnosticExample::from(&incidents[idx]))
                        .collect(),
                },
            );
            outcome.summaries.push(ClusterSummary {
                cluster_id,
                summary,
                label,
                size: indices.len(),
                degraded,
            });
        }

        Ok(outcome)
    }

    /// Seeded sample of at most `samples_per_cluster` members
    fn sample(&self, cluster_id: usize, indices: &[usize], incidents: &[Incident]) -> Vec<SampleRecord> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(cluster_id as u64));
        let amount = indices.len().min(self.config.samples_per_cluster);
        indices
            .choose_multiple(&mut rng, amount)
            .map(|&idx| SampleRecord::from(&incidents[idx]))
            .collect()
    }
}

/// Member indices per cluster id, in incident order
fn group_by_cluster(incidents: &[Incident]) -> Result<BTreeMap<usize, Vec<usize>>> {
    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, incident) in incidents.iter().enumerate() {
        let cluster_id = incident.cluster_id().ok_or_else(|| {
            AppError::Processing(format!("incident {} has no cluster assignment", incident.id))
        })?;
        members.entry(cluster_id).or_default().push(idx);
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TextGenerator;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct KeywordGenerator;

    #[async_trait]
    impl TextGenerator for KeywordGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            if prompt.contains("Cardiac Arrest") {
                Ok("Cardiac arrest calls with CPR in progress.".to_string())
            } else if prompt.contains("Fall") {
                Ok(String::new())
            } else {
                Err(AppError::Collaborator {
                    collaborator: "keyword".to_string(),
                    message: "no answer".to_string(),
                })
            }
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    fn clustered(id: &str, impression: &str, cluster_id: usize) -> Incident {
        let mut incident = Incident::new(id).with_impression(impression);
        incident.assign_cluster(cluster_id).unwrap();
        incident
    }

    #[test]
    fn test_high_checked_before_low() {
        assert_eq!(
            extract_label("Minor injuries but one cardiac arrest"),
            RiskLabel::High
        );
        assert_eq!(extract_label("LIFE-THREATENING airway"), RiskLabel::High);
    }

    #[test]
    fn test_low_checked_before_medium() {
        assert_eq!(
            extract_label("Stable patients, lift assist only"),
            RiskLabel::Low
        );
    }

    #[test]
    fn test_hyphenated_and_bare_keywords() {
        assert_eq!(extract_label("Mostly lift-assist calls."), RiskLabel::Low);
        assert_eq!(extract_label("Patient death on scene"), RiskLabel::High);
        assert_eq!(extract_label("Obvious death, no resuscitation"), RiskLabel::High);
    }

    #[test]
    fn test_medium_and_default() {
        assert_eq!(extract_label("Moderate complaints"), RiskLabel::Medium);
        assert_eq!(extract_label("Taken to the ED"), RiskLabel::Medium);
        assert_eq!(extract_label("gibberish"), RiskLabel::Medium);
        assert_eq!(extract_label(""), RiskLabel::Medium);
    }

    #[test]
    fn test_sentinels_are_medium() {
        assert_eq!(extract_label(ERROR_SENTINEL), RiskLabel::Medium);
        assert_eq!(extract_label(NO_RESPONSE_SENTINEL), RiskLabel::Medium);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let summary = "Severe respiratory distress, requires transport";
        assert_eq!(extract_label(summary), extract_label(summary));
    }

    #[tokio::test]
    async fn test_label_propagates_to_members() {
        let mut incidents = vec![
            clustered("1", "Cardiac Arrest", 0),
            clustered("2", "Cardiac Arrest", 0),
            clustered("3", "Fall", 1),
            clustered("4", "Headache", 2),
            clustered("5", "Headache", 2),
        ];
        let labeler = ClusterLabeler::new(
            LabelerConfig::default(),
            ClusterSummarizer::new(Arc::new(KeywordGenerator)),
        );
        let outcome = labeler.label(&mut incidents).await.unwrap();

        assert_eq!(outcome.summaries.len(), 3);
        assert_eq!(outcome.degraded_clusters(), 2);
        assert_eq!(outcome.summaries[1].summary, NO_RESPONSE_SENTINEL);
        assert_eq!(outcome.summaries[2].summary, ERROR_SENTINEL);

        let labels = outcome.labels();
        assert_eq!(labels[&0], RiskLabel::High);
        assert_eq!(labels[&1], RiskLabel::Medium);
        assert_eq!(labels[&2], RiskLabel::Medium);

        for incident in &incidents {
            let cluster_id = incident.cluster_id().unwrap();
            assert_eq!(incident.risk_label(), Some(labels[&cluster_id]));
        }

        assert_eq!(outcome.diagnostics[&0].cluster_size, 2);
        assert_eq!(outcome.diagnostics[&0].examples[0].incident_number, "1");
    }

    #[tokio::test]
    async fn test_unclustered_incident_is_rejected() {
        let mut incidents = vec![Incident::new("x")];
        let labeler = ClusterLabeler::new(
            LabelerConfig::default(),
            ClusterSummarizer::new(Arc::new(KeywordGenerator)),
        );
        assert!(labeler.label(&mut incidents).await.is_err());
    }
}
