//! Enrichment source clients.

pub mod enrichr;
pub mod gprofiler;
pub mod toppfun;

use async_trait::async_trait;
use themix_common::error::Result;
use themix_common::models::{EnrichmentTerm, EnrichmentTool, GeneList, SourceSpec};
use themix_common::ThemixError;

pub use enrichr::EnrichrClient;
pub use gprofiler::GProfilerClient;
pub use toppfun::ToppFunClient;

/// Common interface for all enrichment source clients.
///
/// Capabilities differ per service: a client that cannot honour a supplied
/// background set or a ranked list degrades to the service default instead
/// of failing.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    fn tool(&self) -> EnrichmentTool;

    /// Run the enrichment analysis and return normalized term records for
    /// the configured sub-databases.
    async fn fetch(
        &self,
        genes: &GeneList,
        background: &[String],
        ranked: bool,
    ) -> Result<Vec<EnrichmentTerm>>;
}

/// Validate requested source specs against a client's supported table.
/// Unknown canonical names are a configuration error caught at construction.
pub(crate) fn validate_specs(
    tool: EnrichmentTool,
    requested: Vec<SourceSpec>,
    supported: &[(&str, &str)],
) -> Result<Vec<SourceSpec>> {
    for spec in &requested {
        if !supported.iter().any(|(name, _)| *name == spec.name) {
            return Err(ThemixError::Config(format!(
                "unsupported {} source '{}' (supported: {})",
                tool,
                spec.name,
                supported
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
    }
    Ok(requested)
}

/// Extract a stable term id from a display name. Enrichr embeds accessions
/// in the name, e.g. "Cell Cycle (GO:0007049)"; when no accession is
/// present the case-folded name itself is the id, so unaccessioned terms
/// can still cross-reference by name.
pub(crate) fn term_id_from_name(name: &str) -> String {
    if let (Some(start), true) = (name.rfind('('), name.ends_with(')')) {
        let candidate = &name[start + 1..name.len() - 1];
        if candidate.contains(':') && !candidate.contains(' ') {
            return candidate.to_ascii_uppercase();
        }
    }
    name.trim().to_ascii_lowercase()
}
