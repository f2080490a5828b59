//! Cross-source result aggregation.
//!
//! Each tool's term list is truncated to its top `terms_per_source` entries,
//! then merged by term id. The output order is deterministic:
//! (cross-reference count desc, best adjusted p-value asc, term id asc).

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use themix_common::models::{AggregatedEntry, AggregatedResult, EnrichmentTerm, EnrichmentTool};

/// Merge the three source result lists into one cross-referenced collection.
pub fn aggregate(
    enrichr: Vec<EnrichmentTerm>,
    toppfun: Vec<EnrichmentTerm>,
    gprofiler: Vec<EnrichmentTerm>,
    terms_per_source: usize,
) -> AggregatedResult {
    let mut merged: BTreeMap<String, (Vec<EnrichmentTerm>, BTreeSet<EnrichmentTool>)> =
        BTreeMap::new();

    for source_terms in [enrichr, toppfun, gprofiler] {
        for term in truncate_top(source_terms, terms_per_source) {
            let entry = merged.entry(term.term_id.clone()).or_default();
            entry.1.insert(term.tool);
            entry.0.push(term);
        }
    }

    let mut entries: Vec<AggregatedEntry> = merged
        .into_iter()
        .map(|(term_id, (terms, tools))| {
            let genes = terms
                .iter()
                .flat_map(|t| t.overlapping_genes.iter().cloned())
                .collect();
            let best_adjusted_p = terms
                .iter()
                .map(|t| t.adjusted_p_value)
                .fold(f64::INFINITY, f64::min);
            AggregatedEntry {
                term_id,
                cross_references: tools.len(),
                genes,
                best_adjusted_p,
                terms,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.cross_references
            .cmp(&a.cross_references)
            .then_with(|| a.best_adjusted_p.total_cmp(&b.best_adjusted_p))
            .then_with(|| a.term_id.cmp(&b.term_id))
    });

    AggregatedResult::from_entries(entries)
}

/// Top `n` terms of one source: adjusted p-value ascending, ties broken by
/// combined score descending, then term id for determinism.
fn truncate_top(mut terms: Vec<EnrichmentTerm>, n: usize) -> Vec<EnrichmentTerm> {
    terms.sort_by(|a, b| {
        a.adjusted_p_value
            .total_cmp(&b.adjusted_p_value)
            .then_with(|| cmp_score_desc(a.combined_score, b.combined_score))
            .then_with(|| a.term_id.cmp(&b.term_id))
    });
    terms.truncate(n);
    terms
}

fn cmp_score_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    // Missing scores sort after any present score.
    b.unwrap_or(f64::NEG_INFINITY)
        .total_cmp(&a.unwrap_or(f64::NEG_INFINITY))
}
