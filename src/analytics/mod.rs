//! Descriptive analytics over incident sets
//!
//! - **Efficiency KPIs**: response, turnout, on-scene and call-cycle times,
//!   call volume and 8-minute response compliance
//! - **Risk by location**: HIGH-risk counts and delays by city and county,
//!   computed from a labeled set such as a persisted test split

pub mod efficiency;
pub mod location;
pub mod statistics;

pub use efficiency::{compute_kpis, EfficiencyKpis, SLA_RESPONSE_MINUTES};
pub use location::{
    analyze_risk_by_location, write_delays_csv, write_location_csv, CityDelays, LocationRisk,
    RiskByLocation,
};
pub use statistics::{mean, percentile, round_to, Percentiles};
