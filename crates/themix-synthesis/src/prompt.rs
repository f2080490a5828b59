//! Structured prompt construction for theme synthesis.
//!
//! Terms are referenced by their stable term ids; the model is asked to
//! return those ids (and literature PMIDs) verbatim so its answer can be
//! validated against the aggregated collection.

use themix_common::models::{AggregatedResult, GeneList, LiteratureRecord};

use crate::backend::Message;

const SYSTEM_PROMPT: &str = "You are an expert in bioinformatics, immunology, and oncology \
     specializing in gene enrichment analysis.";

/// Build the message list for a synthesis run. `prompt_terms` caps how many
/// aggregated entries are shown to the model.
pub fn build_messages(
    aggregated: &AggregatedResult,
    literature: &[LiteratureRecord],
    genes: &GeneList,
    ranked: bool,
    context: &str,
    prompt_terms: usize,
) -> Vec<Message> {
    let ranked_note = if ranked {
        ", ranked by differential expression."
    } else {
        "."
    };
    let ranked_focus = if ranked {
        "You should focus on themes that involve genes towards the top of the list.\n"
    } else {
        ""
    };

    let instructions = format!(
        "You will be given a list of genes that characterize a group of cells{ranked_note}\n\
         Your goal is to determine the biological processes and pathways that are enriched in \
         these genes, using enrichment results from Enrichr, ToppFun and g:Profiler plus PubMed \
         literature.\n\
         \n\
         Arrange the enrichment terms into functional themes. {ranked_focus}\
         Feel free to leave out terms that do not fit any theme. Include literature papers in \
         themes where they fit, and close with a final Literature Findings theme.\n\
         \n\
         Respond with a single JSON object:\n\
         {{\n\
           \"themes\": [\n\
             {{\n\
               \"theme\": \"name of the theme\",\n\
               \"description\": \"what this theme does and why you identified it\",\n\
               \"term_ids\": [\"term ids copied exactly from the enrichment results\"],\n\
               \"paper_ids\": [\"PMIDs copied exactly from the literature results\"],\n\
               \"genes\": [\"gene symbols driving this theme\"]\n\
             }}\n\
           ],\n\
           \"summary\": \"high level overview of what these cells are enriched for\"\n\
         }}\n\
         \n\
         Guidelines:\n\
         * Focus on biological meaning rather than technical categories\n\
         * Prioritize themes with strong support across multiple tools\n\
         * Only use term_ids and PMIDs that appear in the provided results"
    );

    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(instructions),
        Message::user(format!("Context: {}", if context.is_empty() { "None" } else { context })),
        Message::user(format!("Genes: {}", genes.join(";"))),
        Message::user(format!(
            "Enrichment results:\n{}",
            format_terms(aggregated, prompt_terms)
        )),
        Message::user(format!("Literature results:\n{}", format_literature(literature))),
    ]
}

fn format_terms(aggregated: &AggregatedResult, prompt_terms: usize) -> String {
    let mut lines = Vec::new();
    for entry in aggregated.top(prompt_terms) {
        let tools: Vec<&str> = entry.terms.iter().map(|t| t.tool.as_str()).collect();
        let genes: Vec<&str> = entry.genes.iter().map(String::as_str).collect();
        lines.push(format!(
            "- {} | {} | tools: {} | adj_p: {:.2e} | genes: {}",
            entry.term_id,
            entry.display_name(),
            tools.join(","),
            entry.best_adjusted_p,
            genes.join(" ")
        ));
    }
    if lines.is_empty() {
        "(none)".to_string()
    } else {
        lines.join("\n")
    }
}

fn format_literature(literature: &[LiteratureRecord]) -> String {
    if literature.is_empty() {
        return "(none)".to_string();
    }
    literature
        .iter()
        .map(|r| {
            let snippet = r.abstract_snippet.as_deref().unwrap_or("");
            let mut line = format!(
                "- PMID:{} ({}) | {} | genes: {} | {}",
                r.pmid,
                r.year.as_deref().unwrap_or("n.d."),
                r.title,
                r.matched_genes.join(" "),
                snippet
            );
            for mention in &r.gene_mentions {
                line.push_str("\n  full text: ");
                line.push_str(mention);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
