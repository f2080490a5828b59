//! themix-enrichment — Enrichment source clients and result aggregation.
//!
//! - Source clients (Enrichr, g:Profiler, ToppFun) behind the common
//!   `EnrichmentSource` trait
//! - Cross-source aggregation into a deterministic, cross-referenced
//!   term collection

pub mod aggregate;
pub mod sources;

pub use aggregate::aggregate;
pub use sources::EnrichmentSource;
