//! High-risk case summaries by city and county

use crate::analytics::statistics::{mean, round_to};
use crate::error::Result;
use crate::models::{Incident, RiskLabel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

/// Cities listed in the by-city summary
pub const TOP_CITIES: usize = 15;

/// Cities listed in the delay summary
pub const TOP_DELAY_CITIES: usize = 10;

/// HIGH-risk counts for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRisk {
    pub location: String,
    pub high_risk_count: usize,
    pub total_cases: usize,
    /// One decimal
    pub high_risk_percentage: f64,
}

/// Mean timings of HIGH-risk cases in one city (one decimal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityDelays {
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "High_Risk_Count")]
    pub high_risk_count: usize,
    #[serde(rename = "Avg_Response_Time_min")]
    pub avg_response_time_min: Option<f64>,
    #[serde(rename = "Avg_Turnout_Time_min")]
    pub avg_turnout_time_min: Option<f64>,
    #[serde(rename = "Avg_On_Scene_Time_min")]
    pub avg_on_scene_time_min: Option<f64>,
    #[serde(rename = "Avg_Call_Cycle_Time_min")]
    pub avg_call_cycle_time_min: Option<f64>,
}

/// Location breakdown of a labeled incident set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskByLocation {
    pub total_cases: usize,
    pub high_risk_cases: usize,
    pub by_city: Vec<LocationRisk>,
    pub by_county: Vec<LocationRisk>,
    pub delays_by_city: Vec<CityDelays>,
}

impl RiskByLocation {
    /// Share of HIGH cases in the whole set (one decimal)
    pub fn high_risk_percentage(&self) -> f64 {
        if self.total_cases == 0 {
            0.0
        } else {
            round_to(self.high_risk_cases as f64 / self.total_cases as f64 * 100.0, 1)
        }
    }
}

fn summarize<'a>(
    incidents: &'a [Incident],
    location: fn(&'a Incident) -> Option<&'a str>,
    limit: Option<usize>,
) -> Vec<LocationRisk> {
    let mut totals: BTreeMap<&str, usize> = BTreeMap::new();
    let mut high: BTreeMap<&str, usize> = BTreeMap::new();
    for incident in incidents {
        if let Some(name) = location(incident) {
            *totals.entry(name).or_insert(0) += 1;
            if incident.risk_label() == Some(RiskLabel::High) {
                *high.entry(name).or_insert(0) += 1;
            }
        }
    }

    let mut rows: Vec<LocationRisk> = high
        .into_iter()
        .map(|(name, count)| {
            let total = totals.get(name).copied().unwrap_or(count);
            LocationRisk {
                location: name.to_string(),
                high_risk_count: count,
                total_cases: total,
                high_risk_percentage: round_to(count as f64 / total as f64 * 100.0, 1),
            }
        })
        .collect();
    // Stable sort keeps alphabetical order among equal counts
    rows.sort_by(|a, b| b.high_risk_count.cmp(&a.high_risk_count));
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows
}

/// HIGH-risk counts by city (top 15) and county, plus delays in the top 10 cities
pub fn analyze_risk_by_location(incidents: &[Incident]) -> RiskByLocation {
    let by_city = summarize(incidents, |i| i.city.as_deref(), Some(TOP_CITIES));
    let by_county = summarize(incidents, |i| i.county.as_deref(), None);

    let delays_by_city = by_city
        .iter()
        .take(TOP_DELAY_CITIES)
        .map(|row| {
            let cases: Vec<&Incident> = incidents
                .iter()
                .filter(|i| {
                    i.risk_label() == Some(RiskLabel::High)
                        && i.city.as_deref() == Some(row.location.as_str())
                })
                .collect();
            let avg = |f: fn(&Incident) -> Option<f64>| {
                let values: Vec<f64> = cases.iter().filter_map(|i| f(i)).collect();
                mean(&values).map(|m| round_to(m, 1))
            };
            CityDelays {
                city: row.location.clone(),
                high_risk_count: cases.len(),
                avg_response_time_min: avg(|i| i.timings.response_min),
                avg_turnout_time_min: avg(|i| i.timings.turnout_min),
                avg_on_scene_time_min: avg(|i| i.timings.on_scene_min),
                avg_call_cycle_time_min: avg(|i| i.timings.call_cycle_min),
            }
        })
        .collect();

    RiskByLocation {
        total_cases: incidents.len(),
        high_risk_cases: incidents
            .iter()
            .filter(|i| i.risk_label() == Some(RiskLabel::High))
            .count(),
        by_city,
        by_county,
        delays_by_city,
    }
}

/// Write a location table with `<Kind>,High_Risk_Count,Total_Cases_in_<Kind>,High_Risk_Percentage`
pub fn write_location_csv<W: Write>(writer: W, kind: &str, rows: &[LocationRisk]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        kind.to_string(),
        "High_Risk_Count".to_string(),
        format!("Total_Cases_in_{}", kind),
        "High_Risk_Percentage".to_string(),
    ])?;
    for row in rows {
        csv_writer.write_record([
            row.location.clone(),
            row.high_risk_count.to_string(),
            row.total_cases.to_string(),
            format!("{:.1}", row.high_risk_percentage),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write the per-city delay table
pub fn write_delays_csv<W: Write>(writer: W, rows: &[CityDelays]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timings;

    fn case(city: &str, county: &str, label: RiskLabel, response: f64) -> Incident {
        let mut incident = Incident::new(format!("{}-{}", city, response))
            .with_location(county, city)
            .with_timings(Timings {
                response_min: Some(response),
                ..Default::default()
            });
        incident.assign_label(label).unwrap();
        incident
    }

    fn dataset() -> Vec<Incident> {
        vec![
            case("Raleigh", "Wake", RiskLabel::High, 6.0),
            case("Raleigh", "Wake", RiskLabel::High, 9.0),
            case("Raleigh", "Wake", RiskLabel::Low, 5.0),
            case("Cary", "Wake", RiskLabel::High, 7.25),
            case("Cary", "Wake", RiskLabel::Medium, 4.0),
            case("Cary", "Wake", RiskLabel::Medium, 4.5),
            case("Durham", "Durham", RiskLabel::Low, 8.0),
        ]
    }

    #[test]
    fn test_by_city() {
        let summary = analyze_risk_by_location(&dataset());

        assert_eq!(summary.total_cases, 7);
        assert_eq!(summary.high_risk_cases, 3);
        assert_eq!(summary.high_risk_percentage(), 42.9);

        assert_eq!(summary.by_city.len(), 2);
        assert_eq!(summary.by_city[0].location, "Raleigh");
        assert_eq!(summary.by_city[0].high_risk_count, 2);
        assert_eq!(summary.by_city[0].total_cases, 3);
        assert_eq!(summary.by_city[0].high_risk_percentage, 66.7);
        assert_eq!(summary.by_city[1].location, "Cary");
        assert_eq!(summary.by_city[1].high_risk_percentage, 33.3);
    }

    #[test]
    fn test_by_county_and_delays() {
        let summary = analyze_risk_by_location(&dataset());

        assert_eq!(summary.by_county.len(), 1);
        assert_eq!(summary.by_county[0].location, "Wake");
        assert_eq!(summary.by_county[0].total_cases, 6);
        assert_eq!(summary.by_county[0].high_risk_percentage, 50.0);

        let raleigh = &summary.delays_by_city[0];
        assert_eq!(raleigh.high_risk_count, 2);
        assert_eq!(raleigh.avg_response_time_min, Some(7.5));
        assert_eq!(raleigh.avg_turnout_time_min, None);
    }

    #[test]
    fn test_location_csv() {
        let summary = analyze_risk_by_location(&dataset());
        let mut buffer = Vec::new();
        write_location_csv(&mut buffer, "City", &summary.by_city).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "City,High_Risk_Count,Total_Cases_in_City,High_Risk_Percentage"
        );
        assert_eq!(lines[1], "Raleigh,2,3,66.7");
    }

    #[test]
    fn test_delays_csv_header() {
        let summary = analyze_risk_by_location(&dataset());
        let mut buffer = Vec::new();
        write_delays_csv(&mut buffer, &summary.delays_by_city).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("City,High_Risk_Count,Avg_Response_Time_min,"));
    }
}
