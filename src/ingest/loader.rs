use crate::error::Result;
use crate::ingest::columns;
use crate::models::{Incident, RiskLabel, Timings};
use chrono::NaiveDateTime;
use csv::{ByteRecord, ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Timestamp layouts seen in EMS exports
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Loader configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Field delimiter
    pub delimiter: u8,
    /// Durations outside [0, max] minutes are treated as missing
    pub max_duration_min: f64,
    /// Maximum number of rows to load (0 = unlimited)
    pub max_records: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            max_duration_min: 300.0,
            max_records: 0,
        }
    }
}

/// Counters collected while loading
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadStats {
    pub rows: usize,
    /// Rows with at least one cell that was not valid UTF-8
    pub lossy_rows: usize,
    /// Rows the CSV reader could not split into fields
    pub skipped_rows: usize,
    pub synthetic_ids: usize,
    pub out_of_range_durations: usize,
    pub derived_durations: usize,
}

/// CSV loader for incident rows
pub struct IncidentLoader {
    config: LoaderConfig,
}

impl Default for IncidentLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl IncidentLoader {
    pub fn new() -> Self {
        Self {
            config: LoaderConfig::default(),
        }
    }

    pub fn with_config(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Load incidents from a CSV file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<(Vec<Incident>, LoadStats)> {
        let path = path.as_ref();
        info!("Loading incidents from {:?}", path);
        let file = File::open(path)?;
        let (incidents, stats) = self.load_from_reader(file)?;
        info!(
            rows = stats.rows,
            lossy = stats.lossy_rows,
            out_of_range = stats.out_of_range_durations,
            derived = stats.derived_durations,
            "Loaded incidents"
        );
        Ok((incidents, stats))
    }

    /// Load incidents from any reader producing CSV text
    ///
    /// Cells are decoded lossily, so a stray non-UTF-8 byte degrades one
    /// value instead of dropping the row.
    pub fn load_from_reader<R: Read>(&self, reader: R) -> Result<(Vec<Incident>, LoadStats)> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let (headers, _) = decode_lossy(csv_reader.byte_headers()?);
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim(), i))
            .collect();
        debug!("Detected {} columns", index.len());

        let mut stats = LoadStats::default();
        let mut incidents = Vec::new();

        for (row_idx, record) in csv_reader.byte_records().enumerate() {
            if self.config.max_records > 0 && incidents.len() >= self.config.max_records {
                break;
            }
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(row = row_idx, error = %e, "Skipping unreadable CSV row");
                    stats.skipped_rows += 1;
                    continue;
                }
            };
            let (record, lossy) = decode_lossy(&record);
            if lossy {
                debug!(row = row_idx, "Replaced invalid UTF-8 in row");
                stats.lossy_rows += 1;
            }
            let row = Row {
                record: &record,
                index: &index,
            };
            incidents.push(self.parse_row(&row, row_idx, &mut stats));
            stats.rows += 1;
        }

        if stats.lossy_rows > 0 || stats.skipped_rows > 0 {
            warn!(
                lossy = stats.lossy_rows,
                skipped = stats.skipped_rows,
                "Degraded CSV rows"
            );
        }
        Ok((incidents, stats))
    }

    fn parse_row(&self, row: &Row<'_>, row_idx: usize, stats: &mut LoadStats) -> Incident {
        let id = match row.text(columns::INCIDENT_NUMBER) {
            Some(id) => id,
            None => {
                stats.synthetic_ids += 1;
                format!("row-{}", row_idx)
            }
        };

        let mut incident = Incident::new(id);
        incident.primary_impression = row.text(columns::PRIMARY_IMPRESSION);
        incident.protocol_used = row.text(columns::PROTOCOL_USED);
        incident.patient_age = row.number(columns::PATIENT_AGE);
        incident.gender = row.text(columns::PATIENT_GENDER);
        incident.county = row.text(columns::INCIDENT_COUNTY);
        incident.city = row.text(columns::INCIDENT_CITY);
        incident.disposition = row.text(columns::DISPOSITION);

        let received = row.timestamp(columns::TIME_CALL_RECEIVED);
        let dispatched = row.timestamp(columns::TIME_DISPATCHED);
        let arrived = row.timestamp(columns::TIME_ARRIVED);
        let departed = row.timestamp(columns::TIME_DEPARTED);
        incident.call_received_at = received;

        incident.timings = Timings {
            response_min: self.duration(row, columns::RESPONSE_TIME, dispatched, arrived, stats),
            turnout_min: self.duration(row, columns::TURNOUT_TIME, received, dispatched, stats),
            call_cycle_min: self.duration(row, columns::CALL_CYCLE_TIME, received, departed, stats),
            on_scene_min: self.duration(row, columns::ON_SCENE_TIME, arrived, departed, stats),
        };

        // Columns present only in persisted split files
        if let Some(cluster_id) = row.number(columns::CLUSTER_ID) {
            if cluster_id >= 0.0 {
                let _ = incident.assign_cluster(cluster_id as usize);
            }
        }
        if let Some(label) = row
            .text(columns::RISK_LABEL)
            .and_then(|l| RiskLabel::from_str(&l).ok())
        {
            let _ = incident.assign_label(label);
        }

        incident
    }

    /// Pre-computed duration column, falling back to the timestamp difference
    fn duration(
        &self,
        row: &Row<'_>,
        column: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        stats: &mut LoadStats,
    ) -> Option<f64> {
        let value = match row.number(column) {
            Some(v) => Some(v),
            None => match (start, end) {
                (Some(s), Some(e)) => {
                    stats.derived_durations += 1;
                    Some((e - s).num_seconds() as f64 / 60.0)
                }
                _ => None,
            },
        }?;

        if value.is_finite() && value >= 0.0 && value <= self.config.max_duration_min {
            Some(value)
        } else {
            stats.out_of_range_durations += 1;
            None
        }
    }
}

/// Decode every cell, replacing invalid UTF-8 sequences. Also reports whether
/// any replacement happened.
fn decode_lossy(record: &ByteRecord) -> (StringRecord, bool) {
    let mut lossy = false;
    let fields: Vec<String> = record
        .iter()
        .map(|cell| match std::str::from_utf8(cell) {
            Ok(text) => text.to_string(),
            Err(_) => {
                lossy = true;
                String::from_utf8_lossy(cell).into_owned()
            }
        })
        .collect();
    (StringRecord::from(fields), lossy)
}

struct Row<'a> {
    record: &'a StringRecord,
    index: &'a HashMap<&'a str, usize>,
}

impl Row<'_> {
    fn raw(&self, column: &str) -> Option<&str> {
        self.index
            .get(column)
            .and_then(|&i| self.record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan"))
    }

    fn text(&self, column: &str) -> Option<String> {
        self.raw(column).map(str::to_string)
    }

    fn number(&self, column: &str) -> Option<f64> {
        self.raw(column)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }

    fn timestamp(&self, column: &str) -> Option<NaiveDateTime> {
        let raw = self.raw(column)?;
        TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Incident_Number,Primary_Impression,Protocol_Used_by_EMS_Personnel,Patient_Age,Patient_Gender,Incident_County,Incident_City,Time_Call_Was_Received,Time_Vehicle_was_Dispatched,Time_Arrived_on_Scene,Time_Departed_from_the_Scene,response_time_min
E-1,Chest Pain,Cardiac,54,Male,Wake,Raleigh,2023-01-01 10:00:00,2023-01-01 10:01:00,2023-01-01 10:09:00,2023-01-01 10:30:00,
E-2,Ankle Sprain,,abc,,Durham,Durham,,,,,7.5
,Fall,Trauma,80,Female,Wake,Cary,2023-01-01 11:00:00,2023-01-01 11:02:00,2023-01-01 19:00:00,2023-01-01 19:10:00,
";

    #[test]
    fn test_load_rows() {
        let loader = IncidentLoader::new();
        let (incidents, stats) = loader.load_from_reader(SAMPLE.as_bytes()).unwrap();

        assert_eq!(incidents.len(), 3);
        assert_eq!(stats.rows, 3);
        assert_eq!(incidents[0].id, "E-1");
        assert_eq!(incidents[0].primary_impression.as_deref(), Some("Chest Pain"));
        assert_eq!(incidents[0].patient_age, Some(54.0));
        assert_eq!(incidents[0].city.as_deref(), Some("Raleigh"));
    }

    #[test]
    fn test_durations_derived_from_timestamps() {
        let (incidents, _) = IncidentLoader::new()
            .load_from_reader(SAMPLE.as_bytes())
            .unwrap();
        let t = incidents[0].timings;

        assert_eq!(t.turnout_min, Some(1.0));
        assert_eq!(t.response_min, Some(8.0));
        assert_eq!(t.on_scene_min, Some(21.0));
        assert_eq!(t.call_cycle_min, Some(30.0));
    }

    #[test]
    fn test_missing_values_degrade_gracefully() {
        let (incidents, stats) = IncidentLoader::new()
            .load_from_reader(SAMPLE.as_bytes())
            .unwrap();

        let sprain = &incidents[1];
        assert_eq!(sprain.patient_age, None);
        assert_eq!(sprain.protocol_used, None);
        assert_eq!(sprain.gender, None);
        assert_eq!(sprain.timings.response_min, Some(7.5));
        assert_eq!(sprain.timings.turnout_min, None);

        let fall = &incidents[2];
        assert_eq!(fall.id, "row-2");
        assert_eq!(stats.synthetic_ids, 1);
        // 478 minute response is out of range
        assert_eq!(fall.timings.response_min, None);
        assert!(stats.out_of_range_durations >= 1);
    }

    #[test]
    fn test_persisted_label_columns_are_read() {
        let csv = "Incident_Number,cluster_id,risk_label\nX-1,4,HIGH\nX-2,,\n";
        let (incidents, _) = IncidentLoader::new()
            .load_from_reader(csv.as_bytes())
            .unwrap();

        assert_eq!(incidents[0].cluster_id(), Some(4));
        assert_eq!(incidents[0].risk_label(), Some(RiskLabel::High));
        assert_eq!(incidents[1].risk_label(), None);
    }

    #[test]
    fn test_invalid_utf8_cell_keeps_the_row() {
        let mut csv = b"Incident_Number,Primary_Impression,Incident_City\n".to_vec();
        csv.extend_from_slice(b"A-1,Fall,Raleigh\n");
        csv.extend_from_slice(b"A-2,Chest Pain,Dur\xFFham\n");
        csv.extend_from_slice(b"A-3,Seizure,Cary\n");

        let (incidents, stats) = IncidentLoader::new()
            .load_from_reader(csv.as_slice())
            .unwrap();

        let ids: Vec<&str> = incidents.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["A-1", "A-2", "A-3"]);
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.lossy_rows, 1);
        assert_eq!(stats.skipped_rows, 0);
        assert_eq!(incidents[1].primary_impression.as_deref(), Some("Chest Pain"));
        assert_eq!(incidents[1].city.as_deref(), Some("Dur\u{FFFD}ham"));
    }
}
