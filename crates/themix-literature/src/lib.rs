//! themix-literature — PubMed literature search.
//!
//! One query per gene plus one broader all-genes query, filled round-robin
//! so every gene is represented before any gene gets a second paper.

pub mod fill;
pub mod highlight;
pub mod pubmed;

use async_trait::async_trait;
use themix_common::error::Result;
use themix_common::models::{GeneList, LiteratureRecord};

pub use pubmed::PubMedClient;

/// Common interface for literature search backends.
#[async_trait]
pub trait LiteratureSearch: Send + Sync {
    /// Search for papers related to the gene list. `search_terms` narrow the
    /// queries (MeSH filters); `email` is the contact identifier NCBI asks
    /// for and must be non-empty.
    async fn search(
        &self,
        genes: &GeneList,
        email: &str,
        search_terms: &[String],
        papers_per_gene: usize,
        max_papers: usize,
    ) -> Result<Vec<LiteratureRecord>>;
}
