//! themix-common — Shared types, errors, and helpers used across all Themix crates.

pub mod error;
pub mod models;
pub mod normalise;
pub mod retry;
pub mod sandbox;

pub use error::{Result, ThemixError};
pub use models::{
    AggregatedEntry, AggregatedResult, AnalysisResult, EnrichmentTerm, EnrichmentTool, GeneList,
    LiteratureRecord, SourceSpec, Theme,
};
