use crate::models::{AgeBucket, Incident, RiskLabel};
use serde::{Deserialize, Serialize};

/// Summary recorded when the collaborator returned nothing
pub const NO_RESPONSE_SENTINEL: &str = "[NO LLM RESPONSE]";

/// Summary recorded when the collaborator failed after all retries
pub const ERROR_SENTINEL: &str = "[ERROR]";

/// Canonical summary and derived label for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Cluster id (0..K)
    pub cluster_id: usize,

    /// Free-text summary, or a sentinel string
    pub summary: String,

    /// Label derived from the summary
    pub label: RiskLabel,

    /// Number of member incidents
    pub size: usize,

    /// Whether the summary is a sentinel
    pub degraded: bool,
}

impl ClusterSummary {
    pub fn is_sentinel(summary: &str) -> bool {
        summary == NO_RESPONSE_SENTINEL || summary == ERROR_SENTINEL
    }
}

/// Incident fields sent to the summarizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRecord {
    pub incident_id: String,
    pub response_time_min: Option<f64>,
    pub turnout_time_min: Option<f64>,
    pub call_cycle_time_min: Option<f64>,
    pub on_scene_time_min: Option<f64>,
    pub protocol: String,
    pub impression: String,
    pub age_group: AgeBucket,
    pub disposition: Option<String>,
}

impl From<&Incident> for SampleRecord {
    fn from(incident: &Incident) -> Self {
        Self {
            incident_id: incident.id.clone(),
            response_time_min: incident.timings.response_min,
            turnout_time_min: incident.timings.turnout_min,
            call_cycle_time_min: incident.timings.call_cycle_min,
            on_scene_time_min: incident.timings.on_scene_min,
            protocol: incident.protocol_used.clone().unwrap_or_default(),
            impression: incident.primary_impression.clone().unwrap_or_default(),
            age_group: incident.age_bucket,
            disposition: incident.disposition.clone(),
        }
    }
}

/// Per-cluster diagnostics written next to the summaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDiagnostic {
    pub assigned_label: RiskLabel,
    pub cluster_size: usize,
    pub examples: Vec<DiagnosticExample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticExample {
    pub incident_number: String,
    pub primary_impression: String,
    pub protocol_used: String,
    pub age_group: AgeBucket,
}

impl From<&Incident> for DiagnosticExample {
    fn from(incident: &Incident) -> Self {
        Self {
            incident_number: incident.id.clone(),
            primary_impression: incident.primary_impression.clone().unwrap_or_default(),
            protocol_used: incident.protocol_used.clone().unwrap_or_default(),
            age_group: incident.age_bucket,
        }
    }
}
