//! Themix agent: configuration, the analysis orchestrator and run reports.

pub mod agent;
pub mod config;
pub mod report;

pub use agent::{AnalysisRequest, EnrichmentAgent};
pub use config::Config;
