//! Operational-efficiency KPIs over loaded incidents

use crate::analytics::statistics::{mean, round_to, Percentiles};
use crate::models::Incident;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Response-time target used for the SLA percentage (minutes)
pub const SLA_RESPONSE_MINUTES: f64 = 8.0;

/// Headline efficiency numbers; every field is `None` for an empty input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyKpis {
    pub avg_response_time: Option<f64>,
    pub p90_response_time: Option<f64>,
    pub avg_on_scene_time: Option<f64>,
    pub avg_total_cycle_time: Option<f64>,
    pub calls_per_day: Option<f64>,
    /// `HH:00`
    pub busiest_hour: Option<String>,
    pub busiest_city: Option<String>,
    pub avg_turnout_time: Option<f64>,
    pub sla_8_min_pct: Option<f64>,
}

/// Most frequent key; ties go to the smallest key
fn most_common<K: Ord + Clone>(counts: &BTreeMap<K, usize>) -> Option<K> {
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(k, _)| k.clone())
}

fn rounded(value: Option<f64>) -> Option<f64> {
    value.map(|v| round_to(v, 2))
}

/// Compute KPIs, rounded to two decimals
pub fn compute_kpis(incidents: &[Incident]) -> EfficiencyKpis {
    if incidents.is_empty() {
        return EfficiencyKpis::default();
    }

    let collect = |f: fn(&Incident) -> Option<f64>| incidents.iter().filter_map(f).collect::<Vec<_>>();
    let response = collect(|i| i.timings.response_min);
    let on_scene = collect(|i| i.timings.on_scene_min);
    let cycle = collect(|i| i.timings.call_cycle_min);
    let turnout = collect(|i| i.timings.turnout_min);

    let mut per_day: HashMap<chrono::NaiveDate, usize> = HashMap::new();
    let mut per_hour: BTreeMap<u32, usize> = BTreeMap::new();
    for received in incidents.iter().filter_map(|i| i.call_received_at) {
        *per_day.entry(received.date()).or_insert(0) += 1;
        *per_hour.entry(received.hour()).or_insert(0) += 1;
    }
    let calls_per_day = if per_day.is_empty() {
        None
    } else {
        Some(per_day.values().sum::<usize>() as f64 / per_day.len() as f64)
    };

    let mut per_city: BTreeMap<&str, usize> = BTreeMap::new();
    for city in incidents.iter().filter_map(|i| i.city.as_deref()) {
        *per_city.entry(city).or_insert(0) += 1;
    }

    let sla = if response.is_empty() {
        None
    } else {
        let within = response.iter().filter(|&&r| r <= SLA_RESPONSE_MINUTES).count();
        Some(within as f64 / response.len() as f64 * 100.0)
    };

    EfficiencyKpis {
        avg_response_time: rounded(mean(&response)),
        p90_response_time: rounded(Percentiles::from_data(response.clone()).map(|p| p.p90)),
        avg_on_scene_time: rounded(mean(&on_scene)),
        avg_total_cycle_time: rounded(mean(&cycle)),
        calls_per_day: rounded(calls_per_day),
        busiest_hour: most_common(&per_hour).map(|h| format!("{:02}:00", h)),
        busiest_city: most_common(&per_city).map(str::to_string),
        avg_turnout_time: rounded(mean(&turnout)),
        sla_8_min_pct: rounded(sla),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timings;
    use chrono::NaiveDateTime;

    fn call(id: &str, city: &str, received: &str, response: f64) -> Incident {
        let mut incident = Incident::new(id)
            .with_location("Wake", city)
            .with_timings(Timings {
                response_min: Some(response),
                turnout_min: Some(1.0),
                call_cycle_min: Some(40.0),
                on_scene_min: Some(15.0),
            });
        incident.call_received_at =
            Some(NaiveDateTime::parse_from_str(received, "%Y-%m-%d %H:%M:%S").unwrap());
        incident
    }

    #[test]
    fn test_empty_input_gives_no_values() {
        assert_eq!(compute_kpis(&[]), EfficiencyKpis::default());
    }

    #[test]
    fn test_kpis() {
        let incidents = vec![
            call("1", "Raleigh", "2023-01-01 09:05:00", 6.0),
            call("2", "Raleigh", "2023-01-01 09:45:00", 10.0),
            call("3", "Cary", "2023-01-02 17:00:00", 8.0),
            call("4", "Durham", "2023-01-02 22:10:00", 12.0),
        ];
        let kpis = compute_kpis(&incidents);

        assert_eq!(kpis.avg_response_time, Some(9.0));
        assert_eq!(kpis.p90_response_time, Some(11.4));
        assert_eq!(kpis.avg_on_scene_time, Some(15.0));
        assert_eq!(kpis.avg_total_cycle_time, Some(40.0));
        assert_eq!(kpis.avg_turnout_time, Some(1.0));
        assert_eq!(kpis.calls_per_day, Some(2.0));
        assert_eq!(kpis.busiest_hour.as_deref(), Some("09:00"));
        assert_eq!(kpis.busiest_city.as_deref(), Some("Raleigh"));
        assert_eq!(kpis.sla_8_min_pct, Some(50.0));
    }

    #[test]
    fn test_missing_timestamps() {
        let incidents = vec![Incident::new("x").with_timings(Timings {
            response_min: Some(7.0),
            ..Default::default()
        })];
        let kpis = compute_kpis(&incidents);

        assert_eq!(kpis.calls_per_day, None);
        assert_eq!(kpis.busiest_hour, None);
        assert_eq!(kpis.busiest_city, None);
        assert_eq!(kpis.avg_on_scene_time, None);
        assert_eq!(kpis.sla_8_min_pct, Some(100.0));
    }
}
