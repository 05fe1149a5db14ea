//! Statistical helpers shared by the KPI and location summaries

/// Response-time percentiles
#[derive(Debug, Clone, PartialEq)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
}

impl Percentiles {
    /// Calculate percentiles from a dataset; `None` when empty
    pub fn from_data(mut data: Vec<f64>) -> Option<Self> {
        if data.is_empty() {
            return None;
        }

        data.sort_by(f64::total_cmp);

        Some(Self {
            p50: percentile(&data, 50.0),
            p90: percentile(&data, 90.0),
            p95: percentile(&data, 95.0),
        })
    }
}

/// Arithmetic mean; `None` when empty
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        None
    } else {
        Some(data.iter().sum::<f64>() / data.len() as f64)
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Linear-interpolated percentile of sorted data
pub fn percentile(sorted_data: &[f64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        sorted_data[lower]
    } else {
        let weight = index - lower as f64;
        sorted_data[lower] * (1.0 - weight) + sorted_data[upper] * weight
    }
}
