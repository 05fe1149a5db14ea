//! Text-generation collaborator
//!
//! The pipeline only needs prompt-in, text-out with explicit failure. The
//! [`TextGenerator`] trait is that seam; [`OllamaClient`] is the HTTP
//! implementation and tests substitute deterministic stubs.

pub mod client;
pub mod summarizer;

pub use client::{extract_text, OllamaClient, RetryPolicy, TextGenerator};
pub use summarizer::{build_prompt, ClusterSummarizer};
