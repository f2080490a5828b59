//! Round-robin combination of per-gene result lists.

use std::collections::HashSet;

use themix_common::models::LiteratureRecord;

/// Combine per-gene paper lists so every gene is represented before any gene
/// contributes a second paper, then top up from the broad all-genes query.
/// Duplicates (the same PMID found through different queries) are dropped,
/// and the result is truncated to `max_papers`.
pub fn round_robin_fill(
    per_gene: Vec<Vec<LiteratureRecord>>,
    broad: Vec<LiteratureRecord>,
    max_papers: usize,
) -> Vec<LiteratureRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    let deepest = per_gene.iter().map(Vec::len).max().unwrap_or(0);
    'fill: for depth in 0..deepest {
        for gene_papers in &per_gene {
            if let Some(record) = gene_papers.get(depth) {
                if seen.insert(record.pmid.clone()) {
                    out.push(record.clone());
                    if out.len() == max_papers {
                        break 'fill;
                    }
                }
            }
        }
    }

    for record in broad {
        if out.len() == max_papers {
            break;
        }
        if seen.insert(record.pmid.clone()) {
            out.push(record);
        }
    }

    out
}
