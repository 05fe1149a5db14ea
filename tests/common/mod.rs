//! Shared fixtures for the integration tests
//!
//! Synthetic incidents in three narrative groups, and deterministic
//! text generators standing in for the HTTP summarizer.

#![allow(dead_code)]

use async_trait::async_trait;
use ems_risk::config::PipelineConfig;
use ems_risk::error::{AppError, Result};
use ems_risk::llm::{ClusterSummarizer, TextGenerator};
use ems_risk::models::{Incident, Timings};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Answers from the impressions found in the prompt
#[derive(Default)]
pub struct KeywordGenerator {
    calls: AtomicUsize,
}

impl KeywordGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for KeywordGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = if prompt.contains("Cardiac Arrest") {
            "Unresponsive patients in cardiac arrest with airway management. Risk: HIGH."
        } else if prompt.contains("Ankle Sprain") {
            "Minor extremity injuries with short scene times. Risk: LOW."
        } else {
            "Patients are stable and most require transport for evaluation."
        };
        Ok(format!("  {}\n", text))
    }

    fn name(&self) -> &str {
        "keyword-stub"
    }
}

/// Returns an empty body for every prompt
pub struct SilentGenerator;

#[async_trait]
impl TextGenerator for SilentGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(String::new())
    }

    fn name(&self) -> &str {
        "silent-stub"
    }
}

/// Fails every call, as the HTTP client does once retries run out
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(AppError::Collaborator {
            collaborator: "failing-stub".to_string(),
            message: "connection refused".to_string(),
        })
    }

    fn name(&self) -> &str {
        "failing-stub"
    }
}

pub fn summarizer(generator: impl TextGenerator + 'static) -> ClusterSummarizer {
    ClusterSummarizer::new(Arc::new(generator))
}

fn timings(response: f64, on_scene: f64) -> Timings {
    Timings {
        response_min: Some(response),
        turnout_min: Some(1.0 + response / 10.0),
        call_cycle_min: Some(response + on_scene + 20.0),
        on_scene_min: Some(on_scene),
    }
}

pub fn cardiac_arrest(n: usize) -> Incident {
    Incident::new(format!("CA-{:03}", n))
        .with_impression("Cardiac Arrest")
        .with_protocol("Cardiac Arrest Resuscitation")
        .with_age(55.0 + (n % 10) as f64)
        .with_gender(if n % 2 == 0 { "Male" } else { "Female" })
        .with_location("Wake", if n % 3 == 0 { "Raleigh" } else { "Cary" })
        .with_timings(timings(6.0 + (n % 5) as f64, 25.0))
}

pub fn ankle_sprain(n: usize) -> Incident {
    Incident::new(format!("AS-{:03}", n))
        .with_impression("Ankle Sprain")
        .with_protocol("General Assessment")
        .with_age(25.0 + (n % 10) as f64)
        .with_gender(if n % 2 == 0 { "Female" } else { "Male" })
        .with_location("Durham", "Durham")
        .with_timings(timings(9.0 + (n % 4) as f64, 10.0))
}

pub fn chest_pain(n: usize) -> Incident {
    Incident::new(format!("CP-{:03}", n))
        .with_impression("Chest Pain")
        .with_protocol("General Assessment")
        .with_age(40.0 + (n % 20) as f64)
        .with_gender(if n % 3 == 0 { "Male" } else { "Female" })
        .with_location("Orange", "Chapel Hill")
        .with_timings(timings(7.0 + (n % 6) as f64, 18.0))
}

/// 40 chest pains, 30 ankle sprains, 30 cardiac arrests, interleaved.
/// Chest pain and ankle sprain share a protocol.
pub fn three_group_incidents() -> Vec<Incident> {
    let mut incidents = Vec::with_capacity(100);
    for n in 0..40 {
        incidents.push(chest_pain(n));
        if n < 30 {
            incidents.push(ankle_sprain(n));
            incidents.push(cardiac_arrest(n));
        }
    }
    incidents
}

/// Small, fast configuration writing under `output_dir`
pub fn test_config(output_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        output_dir: output_dir.to_path_buf(),
        n_clusters: 3,
        samples_per_cluster: 50,
        kmeans_n_init: 5,
        boosting_rounds: 20,
        learning_rate: 0.1,
        max_depth: 3,
        min_samples_leaf: 1,
        ..PipelineConfig::default()
    }
}
