//! g:Profiler g:GOSt client.
//!
//! Endpoint: https://biit.cs.ut.ee/gprofiler/api/gost/profile/
//!
//! The only client that honours both a ranked query (`ordered`) and a custom
//! background (`domain_scope = custom`). Reported p-values are already
//! multiple-testing corrected.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use themix_common::error::{FetchKind, Result, ThemixError};
use themix_common::models::{EnrichmentTerm, EnrichmentTool, GeneList, SourceSpec};
use themix_common::retry::{with_retry, RetryConfig};
use themix_common::sandbox::SandboxClient;

use super::{validate_specs, EnrichmentSource};

const GOST_URL: &str = "https://biit.cs.ut.ee/gprofiler/api/gost/profile/";

/// g:GOSt source codes with their report labels.
const SUPPORTED_SOURCES: &[(&str, &str)] = &[
    ("GO:BP", "GO:BP"),
    ("GO:MF", "GO:MF"),
    ("GO:CC", "GO:CC"),
    ("KEGG", "KEGG"),
    ("REAC", "REACTOME"),
    ("TF", "TF"),
    ("CORUM", "CORUM"),
    ("HP", "HP"),
    ("HPA", "HPA"),
    ("WP", "WP"),
    ("MIRNA", "MIRNA"),
];

/// Sources queried when the caller does not narrow the selection.
const DEFAULT_SOURCES: &[&str] = &["GO:BP", "GO:MF", "GO:CC", "KEGG", "TF"];

pub struct GProfilerClient {
    client: SandboxClient,
    retry: RetryConfig,
    sources: Vec<SourceSpec>,
    organism: String,
}

impl GProfilerClient {
    pub fn new() -> Result<Self> {
        let sources = SUPPORTED_SOURCES
            .iter()
            .filter(|(name, _)| DEFAULT_SOURCES.contains(name))
            .map(|(name, label)| SourceSpec::new(*name, *label))
            .collect();
        Self::with_sources(sources)
    }

    pub fn with_sources(sources: Vec<SourceSpec>) -> Result<Self> {
        let sources = validate_specs(EnrichmentTool::GProfiler, sources, SUPPORTED_SOURCES)?;
        Ok(Self {
            client: SandboxClient::new()?,
            retry: RetryConfig::default(),
            sources,
            organism: "hsapiens".to_string(),
        })
    }

    async fn profile(&self, genes: &GeneList, background: &[String], ranked: bool) -> Result<Value> {
        let mut body = json!({
            "organism": self.organism,
            "query": genes.symbols(),
            "sources": self.sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "ordered": ranked,
            "no_evidences": false,
        });
        if !background.is_empty() {
            body["domain_scope"] = json!("custom");
            body["background"] = json!(background);
        }

        self.client
            .post(GOST_URL)?
            .json(&body)
            .send()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::GProfiler, e))?
            .error_for_status()
            .map_err(|e| ThemixError::fetch(EnrichmentTool::GProfiler, e))?
            .json()
            .await
            .map_err(|e| ThemixError::fetch(EnrichmentTool::GProfiler, e))
    }
}

#[async_trait]
impl EnrichmentSource for GProfilerClient {
    fn tool(&self) -> EnrichmentTool {
        EnrichmentTool::GProfiler
    }

    #[instrument(skip(self, genes, background), fields(n_genes = genes.len()))]
    async fn fetch(
        &self,
        genes: &GeneList,
        background: &[String],
        ranked: bool,
    ) -> Result<Vec<EnrichmentTerm>> {
        let resp = with_retry(&self.retry, || self.profile(genes, background, ranked)).await?;

        let results = resp["result"].as_array().ok_or_else(|| ThemixError::Fetch {
            tool: EnrichmentTool::GProfiler,
            kind: FetchKind::Malformed,
            message: "gost response missing 'result' array".to_string(),
        })?;

        let labels: Vec<(&str, &str)> = self
            .sources
            .iter()
            .map(|s| (s.name.as_str(), s.label.as_str()))
            .collect();
        let terms: Vec<EnrichmentTerm> = results
            .iter()
            .filter_map(|r| parse_gost_result(r, genes.symbols(), &labels))
            .collect();

        debug!(n_terms = terms.len(), "g:Profiler query done");

        if terms.is_empty() {
            return Err(ThemixError::Fetch {
                tool: EnrichmentTool::GProfiler,
                kind: FetchKind::Empty,
                message: "no significant terms returned".to_string(),
            });
        }
        Ok(terms)
    }
}

/// One g:GOSt result object. `intersections` is parallel to the query gene
/// list; a non-empty evidence array marks the gene as overlapping the term.
fn parse_gost_result(
    r: &Value,
    query_genes: &[String],
    labels: &[(&str, &str)],
) -> Option<EnrichmentTerm> {
    let source = r["source"].as_str()?;
    let label = labels.iter().find(|(name, _)| *name == source)?.1;

    let native = r["native"].as_str()?;
    let name = r["name"].as_str()?.to_string();
    let p_value = r["p_value"].as_f64()?;

    let overlapping_genes = match r["intersections"].as_array() {
        Some(evidence) => query_genes
            .iter()
            .zip(evidence.iter())
            .filter(|(_, ev)| ev.as_array().is_some_and(|a| !a.is_empty()))
            .map(|(gene, _)| gene.clone())
            .collect(),
        None => Default::default(),
    };

    Some(EnrichmentTerm {
        term_id: native.to_ascii_uppercase(),
        term_name: name,
        tool: EnrichmentTool::GProfiler,
        source_label: label.to_string(),
        // g:SCS-corrected; the service does not expose the raw p-value.
        p_value,
        adjusted_p_value: p_value,
        overlapping_genes,
        combined_score: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<(&'static str, &'static str)> {
        vec![("GO:BP", "GO:BP"), ("KEGG", "KEGG")]
    }

    #[test]
    fn test_parse_gost_result_maps_intersections() {
        let genes = vec!["TOP2A".to_string(), "CCNB1".to_string(), "MKI67".to_string()];
        let r = json!({
            "source": "GO:BP",
            "native": "GO:0007049",
            "name": "cell cycle",
            "p_value": 2.5e-9,
            "intersections": [["IDA"], [], ["IEA", "IBA"]]
        });
        let term = parse_gost_result(&r, &genes, &labels()).unwrap();
        assert_eq!(term.term_id, "GO:0007049");
        assert_eq!(term.adjusted_p_value, 2.5e-9);
        assert!(term.overlapping_genes.contains("TOP2A"));
        assert!(!term.overlapping_genes.contains("CCNB1"));
        assert!(term.overlapping_genes.contains("MKI67"));
    }

    #[test]
    fn test_parse_gost_result_skips_unconfigured_source() {
        let r = json!({
            "source": "HPA",
            "native": "HPA:012345",
            "name": "liver tissue",
            "p_value": 0.01,
            "intersections": []
        });
        assert!(parse_gost_result(&r, &[], &labels()).is_none());
    }

    #[test]
    fn test_with_sources_rejects_unknown_code() {
        let err = GProfilerClient::with_sources(vec![SourceSpec::new("GO:XX", "GO:XX")])
            .err()
            .unwrap();
        assert!(err.to_string().contains("unsupported gprofiler source"));
    }
}
