//! ToppFun enrichment client.
//!
//! Endpoints used:
//!   lookup: https://toppgene.cchmc.org/API/lookup  (symbol → Entrez id)
//!   enrich: https://toppgene.cchmc.org/API/enrich
//!
//! The public API takes neither a background set nor a ranked list; both are
//! silently dropped and the service default applies.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use themix_common::error::{FetchKind, Result, ThemixError};
use themix_common::models::{EnrichmentTerm, EnrichmentTool, GeneList, SourceSpec};
use themix_common::normalise::normalise_symbols;
use themix_common::retry::{with_retry, RetryConfig};
use themix_common::sandbox::SandboxClient;

use super::{term_id_from_name, validate_specs, EnrichmentSource};

const LOOKUP_URL: &str = "https://toppgene.cchmc.org/API/lookup";
const ENRICH_URL: &str = "https://toppgene.cchmc.org/API/enrich";

/// ToppFun annotation categories with their report labels.
const SUPPORTED_CATEGORIES: &[(&str, &str)] = &[
    ("GeneOntologyMolecularFunction", "GO:MF"),
    ("GeneOntologyBiologicalProcess", "GO:BP"),
    ("GeneOntologyCellularComponent", "GO:CC"),
    ("HumanPheno", "HP"),
    ("MousePheno", "MP"),
    ("Domain", "DOMAIN"),
    ("Pathway", "PATHWAY"),
    ("Pubmed", "PUBMED"),
    ("Interaction", "PPI"),
    ("Cytoband", "CYTOBAND"),
    ("TFBS", "TFBS"),
    ("GeneFamily", "GENE_FAM"),
    ("Coexpression", "COEXP"),
    ("CoexpressionAtlas", "COEXP_ATLAS"),
    ("ToppCell", "CELL"),
    ("Computational", "COMP"),
    ("MicroRNA", "MIRNA"),
    ("Drug", "DRUG"),
    ("Disease", "DISEASE"),
];

/// Categories queried when the caller does not narrow the selection.
const DEFAULT_CATEGORIES: &[&str] = &[
    "GeneOntologyBiologicalProcess",
    "GeneOntologyMolecularFunction",
    "GeneOntologyCellularComponent",
    "TFBS",
    "ToppCell",
];

pub struct ToppFunClient {
    client: SandboxClient,
    retry: RetryConfig,
    sources: Vec<SourceSpec>,
}

impl ToppFunClient {
    pub fn new() -> Result<Self> {
        let sources = SUPPORTED_CATEGORIES
            .iter()
            .filter(|(name, _)| DEFAULT_CATEGORIES.contains(name))
            .map(|(name, label)| SourceSpec::new(*name, *label))
            .collect();
        Self::with_sources(sources)
    }

    pub fn with_sources(sources: Vec<SourceSpec>) -> Result<Self> {
        let sources = validate_specs(EnrichmentTool::ToppFun, sources, SUPPORTED_CATEGORIES)?;
        Ok(Self {
            client: SandboxClient::new()?,
            retry: RetryConfig::default(),
            sources,
        })
    }

    fn fetch_err(&self, kind: FetchKind, message: impl Into<String>) -> ThemixError {
        ThemixError::Fetch {
            tool: EnrichmentTool::ToppFun,
            kind,
            message: message.into(),
        }
    }

    /// Convert gene symbols to Entrez ids via the ToppGene lookup endpoint.
    #[instrument(skip(self, genes))]
    async fn lookup_entrez_ids(&self, genes: &GeneList) -> Result<Vec<i64>> {
        let resp: Value = self
            .client
            .post(LOOKUP_URL)?
            .json(&json!({ "Symbols": genes.symbols() }))
            .send()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::ToppFun, e))?
            .error_for_status()
            .map_err(|e| ThemixError::fetch(EnrichmentTool::ToppFun, e))?
            .json()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::ToppFun, e))?;

        let ids: Vec<i64> = resp["Genes"]
            .as_array()
            .ok_or_else(|| self.fetch_err(FetchKind::Malformed, "lookup response missing Genes"))?
            .iter()
            .filter_map(|g| g["Entrez"].as_i64())
            .collect();

        if ids.is_empty() {
            return Err(self.fetch_err(FetchKind::Empty, "no Entrez ids for provided genes"));
        }
        debug!(n_ids = ids.len(), "ToppGene lookup done");
        Ok(ids)
    }

    async fn run_enrichment(&self, entrez_ids: &[i64]) -> Result<Vec<Value>> {
        let resp: Value = self
            .client
            .post(ENRICH_URL)?
            .json(&json!({ "Genes": entrez_ids }))
            .send()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::ToppFun, e))?
            .error_for_status()
            .map_err(|e| ThemixError::fetch(EnrichmentTool::ToppFun, e))?
            .json()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::ToppFun, e))?;

        resp["Annotations"]
            .as_array()
            .cloned()
            .ok_or_else(|| self.fetch_err(FetchKind::Malformed, "enrich response missing Annotations"))
    }
}

#[async_trait]
impl EnrichmentSource for ToppFunClient {
    fn tool(&self) -> EnrichmentTool {
        EnrichmentTool::ToppFun
    }

    #[instrument(skip(self, genes, background), fields(n_genes = genes.len()))]
    async fn fetch(
        &self,
        genes: &GeneList,
        background: &[String],
        ranked: bool,
    ) -> Result<Vec<EnrichmentTerm>> {
        if !background.is_empty() {
            debug!("ToppFun API takes no background set; using the service default");
        }
        if ranked {
            debug!("ToppFun has no ranked mode; treating the list as unordered");
        }

        let entrez_ids = with_retry(&self.retry, || self.lookup_entrez_ids(genes)).await?;
        let annotations = with_retry(&self.retry, || self.run_enrichment(&entrez_ids)).await?;

        let labels: Vec<(&str, &str)> = self
            .sources
            .iter()
            .map(|s| (s.name.as_str(), s.label.as_str()))
            .collect();
        let terms: Vec<EnrichmentTerm> = annotations
            .iter()
            .filter_map(|a| parse_annotation(a, &labels))
            .collect();

        debug!(n_terms = terms.len(), "ToppFun enrichment done");

        if terms.is_empty() {
            return Err(self.fetch_err(FetchKind::Empty, "no terms in configured categories"));
        }
        Ok(terms)
    }
}

/// One ToppFun annotation object. Categories outside the configured
/// selection are dropped here.
fn parse_annotation(a: &Value, labels: &[(&str, &str)]) -> Option<EnrichmentTerm> {
    let category = a["Category"].as_str()?;
    let label = labels.iter().find(|(name, _)| *name == category)?.1;

    let name = a["Name"].as_str()?.to_string();
    let p_value = a["PValue"].as_f64()?;
    let adjusted_p_value = a["QValueFDRBH"].as_f64().unwrap_or(p_value);

    let id = a["ID"].as_str().map(str::trim).unwrap_or("");
    let term_id = if id.is_empty() {
        term_id_from_name(&name)
    } else {
        id.to_ascii_uppercase()
    };

    let overlapping_genes = normalise_symbols(
        a["Genes"]
            .as_array()
            .map(|genes| {
                genes
                    .iter()
                    .filter_map(|g| g["Symbol"].as_str())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default(),
    )
    .into_iter()
    .collect();

    Some(EnrichmentTerm {
        term_id,
        term_name: name,
        tool: EnrichmentTool::ToppFun,
        source_label: label.to_string(),
        p_value,
        adjusted_p_value,
        overlapping_genes,
        combined_score: None,
    })
}
