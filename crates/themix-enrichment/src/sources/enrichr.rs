//! Enrichr enrichment client.
//!
//! Endpoints used:
//!   addList / enrich:                  https://maayanlab.cloud/Enrichr
//!   addbackground / backgroundenrich:  https://maayanlab.cloud/speedrichr/api
//!
//! Background gene sets go through the speedrichr endpoints; ranked input is
//! not supported by the service and is silently ignored.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use themix_common::error::{FetchKind, Result, ThemixError};
use themix_common::models::{EnrichmentTerm, EnrichmentTool, GeneList, SourceSpec};
use themix_common::normalise::normalise_symbols;
use themix_common::retry::{with_retry, RetryConfig};
use themix_common::sandbox::SandboxClient;

use super::{term_id_from_name, validate_specs, EnrichmentSource};

const BASE_URL: &str = "https://maayanlab.cloud/Enrichr";
const BACKGROUND_BASE_URL: &str = "https://maayanlab.cloud/speedrichr/api";

/// Gene-set libraries this client knows, with their report labels.
const SUPPORTED_LIBRARIES: &[(&str, &str)] = &[
    ("GO_Biological_Process_2025", "GO:BP"),
    ("GO_Molecular_Function_2025", "GO:MF"),
    ("GO_Cellular_Component_2025", "GO:CC"),
    ("KEGG_2021_Human", "KEGG"),
    ("MSigDB_Hallmark_2020", "MSIGDB"),
    ("Reactome_Pathways_2024", "REACTOME"),
    ("TRANSFAC_and_JASPAR_PWMs", "TRANSFAC"),
    ("Allen_Brain_Atlas_10x_scRNA_2021", "ALLEN"),
    ("GTEx_Tissue_Expression_Up", "GTEX"),
];

pub struct EnrichrClient {
    client: SandboxClient,
    retry: RetryConfig,
    sources: Vec<SourceSpec>,
}

impl EnrichrClient {
    /// Client over the full default library set.
    pub fn new() -> Result<Self> {
        let sources = SUPPORTED_LIBRARIES
            .iter()
            .map(|(name, label)| SourceSpec::new(*name, *label))
            .collect();
        Self::with_sources(sources)
    }

    /// Client over an explicit library selection; unknown library names are
    /// rejected here rather than at query time.
    pub fn with_sources(sources: Vec<SourceSpec>) -> Result<Self> {
        let sources = validate_specs(EnrichmentTool::Enrichr, sources, SUPPORTED_LIBRARIES)?;
        Ok(Self {
            client: SandboxClient::new()?,
            retry: RetryConfig::default(),
            sources,
        })
    }

    fn fetch_err(&self, kind: FetchKind, message: impl Into<String>) -> ThemixError {
        ThemixError::Fetch {
            tool: EnrichmentTool::Enrichr,
            kind,
            message: message.into(),
        }
    }

    /// Upload the gene list; returns the Enrichr user list id.
    #[instrument(skip(self, genes))]
    async fn upload_gene_list(&self, genes: &GeneList, with_background: bool) -> Result<String> {
        let base = if with_background { BACKGROUND_BASE_URL } else { BASE_URL };
        let form = reqwest::multipart::Form::new()
            .text("list", genes.join("\n"))
            .text("description", "themix gene list");

        let resp: Value = self
            .client
            .post(&format!("{base}/addList"))?
            .multipart(form)
            .send()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::Enrichr, e))?
            .error_for_status()
            .map_err(|e| ThemixError::fetch(EnrichmentTool::Enrichr, e))?
            .json()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::Enrichr, e))?;

        match &resp["userListId"] {
            Value::Null => Err(self.fetch_err(FetchKind::Malformed, "addList response missing userListId")),
            id => Ok(trim_id(id)),
        }
    }

    /// Upload the background gene list; returns the speedrichr background id.
    #[instrument(skip(self, background))]
    async fn upload_background(&self, background: &[String]) -> Result<String> {
        let resp: Value = self
            .client
            .post(&format!("{BACKGROUND_BASE_URL}/addbackground"))?
            .form(&[("background", background.join("\n"))])
            .send()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::Enrichr, e))?
            .error_for_status()
            .map_err(|e| ThemixError::fetch(EnrichmentTool::Enrichr, e))?
            .json()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::Enrichr, e))?;

        match &resp["backgroundid"] {
            Value::Null => Err(self.fetch_err(
                FetchKind::Malformed,
                "addbackground response missing backgroundid",
            )),
            id => Ok(trim_id(id)),
        }
    }

    /// Run enrichment for one library and return its raw result rows.
    async fn run_enrichment(&self, user_list_id: &str, library: &str) -> Result<Vec<Value>> {
        let resp: Value = self
            .client
            .get(&format!("{BASE_URL}/enrich"))?
            .query(&[("userListId", user_list_id), ("backgroundType", library)])
            .send()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::Enrichr, e))?
            .error_for_status()
            .map_err(|e| ThemixError::fetch(EnrichmentTool::Enrichr, e))?
            .json()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::Enrichr, e))?;

        resp[library]
            .as_array()
            .cloned()
            .ok_or_else(|| self.fetch_err(FetchKind::Malformed, format!("no '{library}' key in enrich response")))
    }

    /// Run enrichment for one library against an uploaded background.
    async fn run_background_enrichment(
        &self,
        user_list_id: &str,
        background_id: &str,
        library: &str,
    ) -> Result<Vec<Value>> {
        let resp: Value = self
            .client
            .post(&format!("{BACKGROUND_BASE_URL}/backgroundenrich"))?
            .form(&[
                ("userListId", user_list_id),
                ("backgroundid", background_id),
                ("backgroundType", library),
            ])
            .send()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::Enrichr, e))?
            .error_for_status()
            .map_err(|e| ThemixError::fetch(EnrichmentTool::Enrichr, e))?
            .json()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::Enrichr, e))?;

        resp[library]
            .as_array()
            .cloned()
            .ok_or_else(|| self.fetch_err(FetchKind::Malformed, format!("no '{library}' key in backgroundenrich response")))
    }
}

#[async_trait]
impl EnrichmentSource for EnrichrClient {
    fn tool(&self) -> EnrichmentTool {
        EnrichmentTool::Enrichr
    }

    #[instrument(skip(self, genes, background), fields(n_genes = genes.len()))]
    async fn fetch(
        &self,
        genes: &GeneList,
        background: &[String],
        ranked: bool,
    ) -> Result<Vec<EnrichmentTerm>> {
        if ranked {
            debug!("Enrichr has no ranked mode; treating the list as unordered");
        }
        let with_background = !background.is_empty();

        let user_list_id =
            with_retry(&self.retry, || self.upload_gene_list(genes, with_background)).await?;
        let background_id = if with_background {
            Some(with_retry(&self.retry, || self.upload_background(background)).await?)
        } else {
            None
        };

        let mut terms = Vec::new();
        for spec in &self.sources {
            let rows = match &background_id {
                Some(bg) => {
                    with_retry(&self.retry, || {
                        self.run_background_enrichment(&user_list_id, bg, &spec.name)
                    })
                    .await
                }
                None => {
                    with_retry(&self.retry, || self.run_enrichment(&user_list_id, &spec.name))
                        .await
                }
            };
            match rows {
                Ok(rows) => {
                    let parsed: Vec<EnrichmentTerm> = rows
                        .iter()
                        .filter_map(|row| parse_enrichr_row(row, &spec.label))
                        .collect();
                    debug!(library = %spec.name, n_terms = parsed.len(), "Enrichr library done");
                    terms.extend(parsed);
                }
                Err(e) => {
                    // One failing library does not abort the others.
                    warn!(library = %spec.name, error = %e, "Skipping Enrichr library");
                }
            }
        }

        if terms.is_empty() {
            return Err(self.fetch_err(FetchKind::Empty, "no terms from any configured library"));
        }
        Ok(terms)
    }
}

/// Enrichr ids arrive as bare numbers or strings depending on endpoint.
fn trim_id(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Enrichr row format:
/// `[rank, term name, p-value, odds ratio, combined score, genes, adjusted p-value, …]`
fn parse_enrichr_row(row: &Value, label: &str) -> Option<EnrichmentTerm> {
    let row = row.as_array()?;
    let name = row.get(1)?.as_str()?.to_string();
    let p_value = row.get(2)?.as_f64()?;
    let odds_ratio = row.get(3).and_then(Value::as_f64);
    let combined_score = row.get(4).and_then(Value::as_f64).or(odds_ratio);
    let genes = row.get(5)?.as_array()?;
    let adjusted_p_value = row.get(6)?.as_f64()?;

    let overlapping_genes =
        normalise_symbols(genes.iter().filter_map(Value::as_str)).into_iter().collect();

    Some(EnrichmentTerm {
        term_id: term_id_from_name(&name),
        term_name: name,
        tool: EnrichmentTool::Enrichr,
        source_label: label.to_string(),
        p_value,
        adjusted_p_value,
        overlapping_genes,
        combined_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_enrichr_row() {
        let row = json!([
            1,
            "Cell Cycle (GO:0007049)",
            1.2e-8,
            14.2,
            262.1,
            ["Top2a", "CCNB1"],
            3.4e-6,
            0.0,
            0.0
        ]);
        let term = parse_enrichr_row(&row, "GO:BP").unwrap();
        assert_eq!(term.term_id, "GO:0007049");
        assert_eq!(term.term_name, "Cell Cycle (GO:0007049)");
        assert_eq!(term.source_label, "GO:BP");
        assert_eq!(term.adjusted_p_value, 3.4e-6);
        assert_eq!(term.combined_score, Some(262.1));
        assert!(term.overlapping_genes.contains("TOP2A"));
        assert!(term.overlapping_genes.contains("CCNB1"));
    }

    #[test]
    fn test_parse_enrichr_row_rejects_short_rows() {
        assert!(parse_enrichr_row(&json!([1, "Truncated"]), "GO:BP").is_none());
        assert!(parse_enrichr_row(&json!("not a row"), "GO:BP").is_none());
    }

    #[test]
    fn test_with_sources_rejects_typo() {
        let err = EnrichrClient::with_sources(vec![SourceSpec::new("KEGG_2021_Humann", "KEGG")])
            .err()
            .unwrap();
        assert!(err.to_string().contains("unsupported enrichr source"));
    }

    #[test]
    fn test_default_sources_cover_go() {
        let client = EnrichrClient::new().unwrap();
        assert!(client.sources.iter().any(|s| s.label == "GO:BP"));
        assert!(client.sources.iter().any(|s| s.label == "KEGG"));
    }
}
