//! Domain models for the enrichment theming pipeline.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThemixError};
use crate::normalise::normalise_symbol;

/// Which enrichment tool produced a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentTool {
    Enrichr,
    GProfiler,
    ToppFun,
}

impl EnrichmentTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentTool::Enrichr => "enrichr",
            EnrichmentTool::GProfiler => "gprofiler",
            EnrichmentTool::ToppFun => "toppfun",
        }
    }
}

impl std::fmt::Display for EnrichmentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One enabled sub-database of an enrichment tool: the tool's canonical
/// library name plus the short label used in reports (e.g. "GO:BP").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub label: String,
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self { name: name.into(), label: label.into() }
    }
}

/// An ordered, case-normalised gene symbol list. Order carries
/// differential-expression meaning when the caller marks the list as ranked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneList(Vec<String>);

impl GeneList {
    /// Normalises every symbol and rejects empty input.
    pub fn new(symbols: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        let genes: Vec<String> = symbols
            .into_iter()
            .map(|s| normalise_symbol(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        if genes.is_empty() {
            return Err(ThemixError::Config("gene list cannot be empty".to_string()));
        }
        Ok(Self(genes))
    }

    pub fn symbols(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn join(&self, sep: &str) -> String {
        self.0.join(sep)
    }
}

/// One enriched term reported by a single tool. Immutable after creation;
/// identity for cross-referencing is `(term_id, tool)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentTerm {
    pub term_id: String,
    pub term_name: String,
    pub tool: EnrichmentTool,
    pub source_label: String,
    pub p_value: f64,
    pub adjusted_p_value: f64,
    pub overlapping_genes: BTreeSet<String>,
    pub combined_score: Option<f64>,
}

/// One paper returned by the literature search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteratureRecord {
    pub pmid: String,
    pub title: String,
    /// The gene (or the broad all-genes query) that found this paper.
    pub context: String,
    pub year: Option<String>,
    pub abstract_snippet: Option<String>,
    /// Query genes mentioned in the title, abstract or full text.
    pub matched_genes: Vec<String>,
    /// Up to three gene-mentioning paragraphs from the PMC full text, when
    /// the paper is open access.
    #[serde(default)]
    pub gene_mentions: Vec<String>,
}

/// One term id merged across tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedEntry {
    pub term_id: String,
    /// One `EnrichmentTerm` per tool that reported this id.
    pub terms: Vec<EnrichmentTerm>,
    /// Number of distinct tools that reported this id.
    pub cross_references: usize,
    /// Union of overlapping genes across tools.
    pub genes: BTreeSet<String>,
    pub best_adjusted_p: f64,
}

impl AggregatedEntry {
    /// The most descriptive name across tools (the longest one).
    pub fn display_name(&self) -> &str {
        self.terms
            .iter()
            .map(|t| t.term_name.as_str())
            .max_by_key(|n| n.len())
            .unwrap_or("")
    }
}

/// Merged enrichment results, keyed by term id. Built exactly once per run
/// by the aggregator; read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "SerializedAggregated")]
pub struct AggregatedResult {
    entries: Vec<AggregatedEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

/// Deserialization shape: only the entries are persisted, the id index is
/// rebuilt on the way in.
#[derive(Deserialize)]
struct SerializedAggregated {
    entries: Vec<AggregatedEntry>,
}

impl From<SerializedAggregated> for AggregatedResult {
    fn from(raw: SerializedAggregated) -> Self {
        AggregatedResult::from_entries(raw.entries)
    }
}

impl AggregatedResult {
    /// Entries must already be in their final deterministic order.
    pub fn from_entries(entries: Vec<AggregatedEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.term_id.clone(), i))
            .collect();
        Self { entries, index }
    }

    pub fn contains(&self, term_id: &str) -> bool {
        self.index.contains_key(term_id)
    }

    pub fn get(&self, term_id: &str) -> Option<&AggregatedEntry> {
        self.index.get(term_id).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &AggregatedEntry> {
        self.entries.iter()
    }

    /// The first `n` entries in aggregate order.
    pub fn top(&self, n: usize) -> &[AggregatedEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A functional theme identified by the synthesizer. `term_ids` reference
/// only ids present in the run's `AggregatedResult`; `paper_ids` reference
/// only fetched PMIDs. Both are validated before construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub description: String,
    pub term_ids: Vec<String>,
    pub paper_ids: Vec<String>,
    pub genes: BTreeSet<String>,
}

/// Terminal artifact of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub themes: Vec<Theme>,
    pub summary: String,
}
