//! EMS incident risk scoring.
//!
//! Groups incident narratives into clusters, labels each cluster LOW, MEDIUM
//! or HIGH from a generated summary, and trains a gradient-boosted classifier
//! that predicts the label for an individual incident.

pub mod analytics;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod ml;
pub mod models;
pub mod pipeline;

pub use error::{AppError, Result};
