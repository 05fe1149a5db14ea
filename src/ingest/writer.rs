use crate::error::{AppError, Result};
use crate::ingest::columns;
use crate::models::Incident;
use csv::Writer;
use std::io::Write;

/// Layout used when writing timestamps back out
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Columns of a persisted incident row, readable by [`IncidentLoader`]
///
/// [`IncidentLoader`]: crate::ingest::IncidentLoader
pub const RECORD_COLUMNS: [&str; 17] = [
    columns::INCIDENT_NUMBER,
    columns::PRIMARY_IMPRESSION,
    columns::PROTOCOL_USED,
    columns::PATIENT_AGE,
    columns::PATIENT_GENDER,
    columns::INCIDENT_COUNTY,
    columns::INCIDENT_CITY,
    columns::DISPOSITION,
    columns::TIME_CALL_RECEIVED,
    columns::RESPONSE_TIME,
    columns::TURNOUT_TIME,
    columns::CALL_CYCLE_TIME,
    columns::ON_SCENE_TIME,
    columns::AGE_GROUP,
    columns::MEDICAL_TEXT,
    columns::CLUSTER_ID,
    columns::RISK_LABEL,
];

fn opt_text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn opt_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Cell values in [`RECORD_COLUMNS`] order
pub fn record_fields(incident: &Incident) -> Vec<String> {
    let t = incident.timings;
    vec![
        incident.id.clone(),
        opt_text(&incident.primary_impression),
        opt_text(&incident.protocol_used),
        opt_number(incident.patient_age),
        opt_text(&incident.gender),
        opt_text(&incident.county),
        opt_text(&incident.city),
        opt_text(&incident.disposition),
        incident
            .call_received_at
            .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default(),
        opt_number(t.response_min),
        opt_number(t.turnout_min),
        opt_number(t.call_cycle_min),
        opt_number(t.on_scene_min),
        incident.age_bucket.to_string(),
        incident.medical_text.clone(),
        incident
            .cluster_id()
            .map(|c| c.to_string())
            .unwrap_or_default(),
        incident
            .risk_label()
            .map(|l| l.to_string())
            .unwrap_or_default(),
    ]
}

/// CSV writer for incident rows, optionally with trailing extra columns
pub struct IncidentWriter<W: Write> {
    writer: Writer<W>,
    n_extra: usize,
}

impl<W: Write> IncidentWriter<W> {
    /// Wrap a writer and emit the header row
    pub fn from_writer(inner: W, extra_columns: &[&str]) -> Result<Self> {
        let mut writer = Writer::from_writer(inner);
        writer.write_record(RECORD_COLUMNS.iter().chain(extra_columns.iter()))?;
        Ok(Self {
            writer,
            n_extra: extra_columns.len(),
        })
    }

    /// Write one incident followed by its extra cells
    pub fn write(&mut self, incident: &Incident, extra: &[String]) -> Result<()> {
        debug_assert_eq!(extra.len(), self.n_extra);
        let mut fields = record_fields(incident);
        fields.extend_from_slice(extra);
        self.writer.write_record(&fields)?;
        Ok(())
    }

    /// Flush and return the inner writer
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| AppError::Csv(e.to_string()))
    }
}
