//! End-to-end risk-scoring run.
//!
//! Stages run once, in order: feature building, clustering, cluster
//! labeling, stratified split, feature encoding and classification. Each
//! run writes its fitted artifacts and reports into a fresh directory.

pub mod artifacts;
pub mod report;
pub mod runner;
pub mod state;

pub use artifacts::{names, ArtifactStore};
pub use report::RunReport;
pub use runner::Pipeline;
pub use state::PipelineState;
