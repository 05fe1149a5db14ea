//! Incident row ingestion.
//!
//! Reads the cleaned incident table (one row per call) into [`Incident`]s.
//! Rows are never rejected here: unparseable or out-of-range values become
//! `None` and are imputed downstream.
//!
//! [`Incident`]: crate::models::Incident

pub mod loader;
pub mod writer;

pub use loader::{IncidentLoader, LoadStats, LoaderConfig};
pub use writer::{record_fields, IncidentWriter, RECORD_COLUMNS};

/// Recognized column names
pub mod columns {
    pub const INCIDENT_NUMBER: &str = "Incident_Number";
    pub const PRIMARY_IMPRESSION: &str = "Primary_Impression";
    pub const PROTOCOL_USED: &str = "Protocol_Used_by_EMS_Personnel";
    pub const PATIENT_AGE: &str = "Patient_Age";
    pub const PATIENT_GENDER: &str = "Patient_Gender";
    pub const INCIDENT_COUNTY: &str = "Incident_County";
    pub const INCIDENT_CITY: &str = "Incident_City";
    pub const DISPOSITION: &str = "Disposition";

    pub const TIME_CALL_RECEIVED: &str = "Time_Call_Was_Received";
    pub const TIME_DISPATCHED: &str = "Time_Vehicle_was_Dispatched";
    pub const TIME_ARRIVED: &str = "Time_Arrived_on_Scene";
    pub const TIME_DEPARTED: &str = "Time_Departed_from_the_Scene";

    pub const RESPONSE_TIME: &str = "response_time_min";
    pub const TURNOUT_TIME: &str = "turnout_time_min";
    pub const CALL_CYCLE_TIME: &str = "call_cycle_time_min";
    pub const ON_SCENE_TIME: &str = "on_scene_time_min";

    pub const AGE_GROUP: &str = "age_group";
    pub const MEDICAL_TEXT: &str = "medical_text";
    pub const CLUSTER_ID: &str = "cluster_id";
    pub const RISK_LABEL: &str = "risk_label";
}
