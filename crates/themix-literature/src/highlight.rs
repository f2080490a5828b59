//! Gene mention matching in titles and abstracts.

use regex::Regex;

/// Query genes mentioned in `text`, matched case-insensitively on word
/// boundaries so "TOP2A" matches "Top2a" but not "STOP2A".
pub fn matched_genes(text: &str, genes: &[String]) -> Vec<String> {
    genes
        .iter()
        .filter(|gene| gene_pattern(gene).map(|re| re.is_match(text)).unwrap_or(false))
        .cloned()
        .collect()
}

/// Wrap every mention of a query gene in `**`, markdown-style, preserving
/// the casing found in the text.
pub fn highlight(text: &str, genes: &[String]) -> String {
    let mut out = text.to_string();
    for gene in genes {
        if let Some(re) = gene_pattern(gene) {
            out = re.replace_all(&out, "**$0**").into_owned();
        }
    }
    out
}

fn gene_pattern(gene: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(gene))).ok()
}
