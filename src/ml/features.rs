use crate::models::{AgeBucket, Incident, MEDICAL_TEXT_SEPARATOR};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Counters reported by the feature builder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    pub rows: usize,
    pub unknown_age: usize,
    pub missing_impression: usize,
    pub missing_protocol: usize,
}

/// Derives the age bucket and medical text for incidents
pub struct FeatureBuilder;

impl FeatureBuilder {
    /// Derive fields for every incident in place
    pub fn build_all(incidents: &mut [Incident]) -> BuildStats {
        let mut stats = BuildStats::default();
        for incident in incidents.iter_mut() {
            Self::build(incident);
            stats.rows += 1;
            if incident.age_bucket == AgeBucket::Unknown {
                stats.unknown_age += 1;
            }
            if incident.primary_impression.is_none() {
                stats.missing_impression += 1;
            }
            if incident.protocol_used.is_none() {
                stats.missing_protocol += 1;
            }
        }
        debug!(?stats, "Built medical text");
        stats
    }

    /// Derive fields for one incident
    pub fn build(incident: &mut Incident) {
        incident.age_bucket = AgeBucket::from_age(incident.patient_age);
        incident.medical_text = Self::medical_text(
            incident.primary_impression.as_deref(),
            incident.protocol_used.as_deref(),
            incident.age_bucket,
        );
    }

    /// `impression | protocol | age_bucket`, lowercased and trimmed
    pub fn medical_text(
        impression: Option<&str>,
        protocol: Option<&str>,
        age_bucket: AgeBucket,
    ) -> String {
        [
            TextPreprocessor::normalize(impression.unwrap_or("")),
            TextPreprocessor::normalize(protocol.unwrap_or("")),
            age_bucket.to_string(),
        ]
        .join(MEDICAL_TEXT_SEPARATOR)
    }
}

/// Text preprocessing utilities
pub struct TextPreprocessor;

impl TextPreprocessor {
    /// Normalize text (lowercase, trim)
    pub fn normalize(text: &str) -> String {
        text.trim().to_lowercase()
    }

    /// Column-safe name: lowercase, non-alphanumerics collapsed to `_`
    pub fn safe_name(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last_underscore = false;
        for c in text.trim().to_lowercase().chars() {
            let c = if c.is_ascii_alphanumeric() { c } else { '_' };
            if c == '_' {
                if !last_underscore {
                    out.push('_');
                }
                last_underscore = true;
            } else {
                out.push(c);
                last_underscore = false;
            }
        }
        if out.is_empty() {
            "na".to_string()
        } else {
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_medical_text_layout() {
        let text = FeatureBuilder::medical_text(
            Some("  Chest Pain "),
            Some("Cardiac - Chest Pain"),
            AgeBucket::Adult,
        );
        assert_eq!(text, "chest pain | cardiac - chest pain | adult");
    }

    #[test]
    fn test_missing_inputs_degrade_to_empty() {
        let text = FeatureBuilder::medical_text(None, None, AgeBucket::Unknown);
        assert_eq!(text, " |  | unknown");
    }

    #[test]
    fn test_build_all_counts() {
        let mut incidents = vec![
            Incident::new("1").with_impression("Fall").with_age(80.0),
            Incident::new("2").with_protocol("Trauma"),
            Incident::new("3").with_impression("Seizure").with_age(200.0),
        ];
        let stats = FeatureBuilder::build_all(&mut incidents);

        assert_eq!(stats.rows, 3);
        assert_eq!(stats.unknown_age, 2);
        assert_eq!(stats.missing_impression, 1);
        assert_eq!(stats.missing_protocol, 2);
        assert_eq!(incidents[0].age_bucket, AgeBucket::Elderly);
        assert_eq!(incidents[0].medical_text, "fall |  | elderly");
        assert_eq!(incidents[2].age_bucket, AgeBucket::Unknown);
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(TextPreprocessor::safe_name("Chest Pain"), "chest_pain");
        assert_eq!(TextPreprocessor::safe_name("  N/A -- (x)"), "n_a_x_");
        assert_eq!(TextPreprocessor::safe_name(""), "na");
    }
}
