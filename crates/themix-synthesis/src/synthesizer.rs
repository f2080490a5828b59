//! Theme synthesis: one model call, validated into `AnalysisResult`.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use themix_common::error::{Result, ThemixError};
use themix_common::models::{AggregatedResult, AnalysisResult, GeneList, LiteratureRecord, Theme};
use themix_common::normalise::normalise_symbols;

use crate::backend::{LlmBackend, LlmRequest};
use crate::prompt::build_messages;
use crate::schema::parse_response;

pub struct ThemeSynthesizer {
    backend: Arc<dyn LlmBackend>,
    /// How many aggregated entries the prompt shows the model.
    prompt_terms: usize,
    temperature: f32,
}

impl ThemeSynthesizer {
    pub fn new(backend: Arc<dyn LlmBackend>, prompt_terms: usize) -> Self {
        Self {
            backend,
            prompt_terms,
            temperature: 0.1,
        }
    }

    /// Group the aggregated terms and literature into functional themes.
    /// Sends exactly one request; a malformed or out-of-collection answer is
    /// a fatal synthesis error (no re-prompt).
    #[instrument(skip_all, fields(model = self.backend.model_id(), n_terms = aggregated.len()))]
    pub async fn synthesize(
        &self,
        aggregated: &AggregatedResult,
        literature: &[LiteratureRecord],
        genes: &GeneList,
        ranked: bool,
        context: &str,
    ) -> Result<AnalysisResult> {
        let messages = build_messages(aggregated, literature, genes, ranked, context, self.prompt_terms);
        let request = LlmRequest {
            messages,
            model: None,
            max_tokens: None,
            temperature: Some(self.temperature),
            json_mode: true,
        };

        let response = self
            .backend
            .complete(request)
            .await
            .map_err(|e| ThemixError::Synthesis(format!("model call failed: {e}")))?;
        debug!(
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            "Synthesis response received"
        );

        let parsed = parse_response(&response.content)?;
        let known_pmids: HashSet<&str> = literature.iter().map(|r| r.pmid.as_str()).collect();

        let mut themes = Vec::with_capacity(parsed.themes.len());
        for raw in parsed.themes {
            for term_id in &raw.term_ids {
                if !aggregated.contains(term_id) {
                    return Err(ThemixError::Synthesis(format!(
                        "theme '{}' references unknown term id '{}'",
                        raw.theme, term_id
                    )));
                }
            }
            for pmid in &raw.paper_ids {
                if !known_pmids.contains(normalise_pmid(pmid)) {
                    return Err(ThemixError::Synthesis(format!(
                        "theme '{}' references unknown paper id '{}'",
                        raw.theme, pmid
                    )));
                }
            }
            themes.push(Theme {
                name: raw.theme,
                description: raw.description,
                term_ids: raw.term_ids,
                paper_ids: raw
                    .paper_ids
                    .iter()
                    .map(|p| normalise_pmid(p).to_string())
                    .collect(),
                genes: normalise_symbols(&raw.genes).into_iter().collect(),
            });
        }

        Ok(AnalysisResult {
            themes,
            summary: parsed.summary,
        })
    }
}

/// Models sometimes echo PMIDs with the "PMID:" prefix the prompt uses.
fn normalise_pmid(raw: &str) -> &str {
    raw.trim().trim_start_matches("PMID:").trim()
}
