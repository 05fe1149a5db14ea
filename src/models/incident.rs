use crate::error::{AppError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Oldest age treated as a plausible patient age; anything beyond is unknown.
pub const MAX_PLAUSIBLE_AGE: f64 = 120.0;

/// Separator placed between the parts of the medical text
pub const MEDICAL_TEXT_SEPARATOR: &str = " | ";

/// One EMS call record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// Unique identifier (incident number)
    pub id: String,

    /// Primary impression as recorded by the crew
    pub primary_impression: Option<String>,

    /// Protocol used by EMS personnel
    pub protocol_used: Option<String>,

    /// Patient age in years, as parsed from the source row
    pub patient_age: Option<f64>,

    /// Patient gender
    pub gender: Option<String>,

    /// Incident county
    pub county: Option<String>,

    /// Incident city
    pub city: Option<String>,

    /// Disposition / transport outcome
    pub disposition: Option<String>,

    /// Time the call was received
    pub call_received_at: Option<NaiveDateTime>,

    /// Operational timings
    pub timings: Timings,

    /// Age bucket (derived)
    pub age_bucket: AgeBucket,

    /// Normalized impression + protocol + age bucket (derived)
    pub medical_text: String,

    cluster_id: Option<usize>,

    risk_label: Option<RiskLabel>,
}

impl Incident {
    /// Create a new incident with no derived fields
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            primary_impression: None,
            protocol_used: None,
            patient_age: None,
            gender: None,
            county: None,
            city: None,
            disposition: None,
            call_received_at: None,
            timings: Timings::default(),
            age_bucket: AgeBucket::Unknown,
            medical_text: String::new(),
            cluster_id: None,
            risk_label: None,
        }
    }

    pub fn with_impression(mut self, impression: impl Into<String>) -> Self {
        self.primary_impression = Some(impression.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol_used = Some(protocol.into());
        self
    }

    pub fn with_age(mut self, age: f64) -> Self {
        self.patient_age = Some(age);
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn with_location(mut self, county: impl Into<String>, city: impl Into<String>) -> Self {
        self.county = Some(county.into());
        self.city = Some(city.into());
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Age if it is a plausible patient age
    pub fn valid_age(&self) -> Option<f64> {
        self.patient_age
            .filter(|a| a.is_finite() && *a >= 0.0 && *a <= MAX_PLAUSIBLE_AGE)
    }

    /// Cluster id, once assigned
    pub fn cluster_id(&self) -> Option<usize> {
        self.cluster_id
    }

    /// Risk label, once assigned
    pub fn risk_label(&self) -> Option<RiskLabel> {
        self.risk_label
    }

    /// Assign the cluster id. A cluster id can only be assigned once.
    pub fn assign_cluster(&mut self, cluster_id: usize) -> Result<()> {
        match self.cluster_id {
            Some(existing) if existing != cluster_id => Err(AppError::Processing(format!(
                "incident {} already belongs to cluster {}",
                self.id, existing
            ))),
            _ => {
                self.cluster_id = Some(cluster_id);
                Ok(())
            }
        }
    }

    /// Assign the risk label. A label can only be assigned once.
    pub fn assign_label(&mut self, label: RiskLabel) -> Result<()> {
        match self.risk_label {
            Some(existing) if existing != label => Err(AppError::Processing(format!(
                "incident {} already labeled {}",
                self.id, existing
            ))),
            _ => {
                self.risk_label = Some(label);
                Ok(())
            }
        }
    }

    /// Whether any numeric field had to be treated as missing
    pub fn has_missing_numeric(&self) -> bool {
        self.valid_age().is_none() || self.timings.values().iter().any(Option::is_none)
    }
}

/// Durations in minutes. `None` when missing or out of range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub response_min: Option<f64>,
    pub turnout_min: Option<f64>,
    pub call_cycle_min: Option<f64>,
    pub on_scene_min: Option<f64>,
}

impl Timings {
    /// Column names in feature order
    pub const NAMES: [&'static str; 4] = [
        "response_time_min",
        "turnout_time_min",
        "call_cycle_time_min",
        "on_scene_time_min",
    ];

    /// Values in feature order
    pub fn values(&self) -> [Option<f64>; 4] {
        [
            self.response_min,
            self.turnout_min,
            self.call_cycle_min,
            self.on_scene_min,
        ]
    }
}

/// Patient age bucket
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgeBucket {
    Infant,
    Child,
    Teen,
    Adult,
    Elderly,
    Unknown,
}

impl AgeBucket {
    /// Bucket an age: ≤1 infant, ≤12 child, ≤18 teen, ≤65 adult, else elderly.
    /// Missing, negative, non-finite or implausible ages are unknown.
    pub fn from_age(age: Option<f64>) -> Self {
        match age {
            Some(a) if a.is_finite() && (0.0..=MAX_PLAUSIBLE_AGE).contains(&a) => {
                if a <= 1.0 {
                    AgeBucket::Infant
                } else if a <= 12.0 {
                    AgeBucket::Child
                } else if a <= 18.0 {
                    AgeBucket::Teen
                } else if a <= 65.0 {
                    AgeBucket::Adult
                } else {
                    AgeBucket::Elderly
                }
            }
            _ => AgeBucket::Unknown,
        }
    }

    /// Bucket a raw cell value
    pub fn from_raw(raw: &str) -> Self {
        Self::from_age(raw.trim().parse::<f64>().ok())
    }
}

/// Risk label derived from a cluster summary
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum RiskLabel {
    Low,
    Medium,
    High,
}

impl RiskLabel {
    /// All labels in class-index order
    pub const ALL: [RiskLabel; 3] = [RiskLabel::Low, RiskLabel::Medium, RiskLabel::High];

    /// Number of classes
    pub const COUNT: usize = 3;

    /// Class index used by the classifier (LOW=0, MEDIUM=1, HIGH=2)
    pub fn index(self) -> usize {
        match self {
            RiskLabel::Low => 0,
            RiskLabel::Medium => 1,
            RiskLabel::High => 2,
        }
    }

    /// Label for a class index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_age_bucket_thresholds() {
        assert_eq!(AgeBucket::from_age(Some(0.0)), AgeBucket::Infant);
        assert_eq!(AgeBucket::from_age(Some(1.0)), AgeBucket::Infant);
        assert_eq!(AgeBucket::from_age(Some(1.01)), AgeBucket::Child);
        assert_eq!(AgeBucket::from_age(Some(12.0)), AgeBucket::Child);
        assert_eq!(AgeBucket::from_age(Some(18.0)), AgeBucket::Teen);
        assert_eq!(AgeBucket::from_age(Some(65.0)), AgeBucket::Adult);
        assert_eq!(AgeBucket::from_age(Some(65.5)), AgeBucket::Elderly);
    }

    #[test]
    fn test_age_bucket_unknown_inputs() {
        assert_eq!(AgeBucket::from_age(None), AgeBucket::Unknown);
        assert_eq!(AgeBucket::from_age(Some(200.0)), AgeBucket::Unknown);
        assert_eq!(AgeBucket::from_age(Some(-3.0)), AgeBucket::Unknown);
        assert_eq!(AgeBucket::from_age(Some(f64::NAN)), AgeBucket::Unknown);
        assert_eq!(AgeBucket::from_raw("abc"), AgeBucket::Unknown);
        assert_eq!(AgeBucket::from_raw(" 40 "), AgeBucket::Adult);
    }

    #[test]
    fn test_age_bucket_strings() {
        let names: Vec<String> = AgeBucket::iter().map(|b| b.to_string()).collect();
        assert_eq!(
            names,
            vec!["infant", "child", "teen", "adult", "elderly", "unknown"]
        );
    }

    #[test]
    fn test_risk_label_indices() {
        for (i, label) in RiskLabel::ALL.iter().enumerate() {
            assert_eq!(label.index(), i);
            assert_eq!(RiskLabel::from_index(i), Some(*label));
        }
        assert_eq!(RiskLabel::from_index(3), None);
        assert_eq!(RiskLabel::High.to_string(), "HIGH");
        assert_eq!(RiskLabel::from_str("medium").unwrap(), RiskLabel::Medium);
    }

    #[test]
    fn test_cluster_and_label_assigned_once() {
        let mut incident = Incident::new("A-1");
        incident.assign_cluster(3).unwrap();
        incident.assign_cluster(3).unwrap();
        assert!(incident.assign_cluster(4).is_err());
        assert_eq!(incident.cluster_id(), Some(3));

        incident.assign_label(RiskLabel::High).unwrap();
        assert!(incident.assign_label(RiskLabel::Low).is_err());
        assert_eq!(incident.risk_label(), Some(RiskLabel::High));
    }

    #[test]
    fn test_missing_numeric_detection() {
        let complete = Incident::new("A-1").with_age(40.0).with_timings(Timings {
            response_min: Some(6.0),
            turnout_min: Some(1.0),
            call_cycle_min: Some(40.0),
            on_scene_min: Some(15.0),
        });
        assert!(!complete.has_missing_numeric());

        let partial = Incident::new("A-2").with_age(250.0);
        assert!(partial.has_missing_numeric());
    }
}
