//! Analysis orchestrator.
//!
//! Runs the three enrichment sources plus the literature search concurrently,
//! aggregates the surviving results, hands them to the theme synthesizer and
//! persists the run artifacts.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{info, instrument, warn};

use themix_common::models::{AnalysisResult, EnrichmentTerm, GeneList, LiteratureRecord};
use themix_common::normalise::normalise_symbols;
use themix_common::{Result, ThemixError};
use themix_enrichment::aggregate::aggregate;
use themix_enrichment::sources::enrichr::EnrichrClient;
use themix_enrichment::sources::gprofiler::GProfilerClient;
use themix_enrichment::sources::toppfun::ToppFunClient;
use themix_enrichment::EnrichmentSource;
use themix_literature::{LiteratureSearch, PubMedClient};
use themix_synthesis::{LlmBackend, OpenAiBackend, OpenAiCompatibleBackend, ThemeSynthesizer};

use crate::config::Config;
use crate::report;

// ── Request ─────────────────────────────────────────────────────────────────

/// One analysis run. Only `genes` and `email` are required; the rest default
/// to an unranked-agnostic, save-everything run.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub genes: Vec<String>,
    /// Contact email forwarded to NCBI E-utilities.
    pub email: String,
    /// Optional custom background set. Empty means tool-default background.
    pub background_genes: Vec<String>,
    /// Whether `genes` is ordered by importance.
    pub ranked: bool,
    /// Extra MeSH terms to scope the literature search.
    pub search_terms: Vec<String>,
    /// Free-text experimental context passed to the model.
    pub context: String,
    pub save_results: bool,
    pub analysis_name: Option<String>,
}

impl AnalysisRequest {
    pub fn new(genes: Vec<String>, email: impl Into<String>) -> Self {
        Self {
            genes,
            email: email.into(),
            background_genes: Vec::new(),
            ranked: true,
            search_terms: Vec::new(),
            context: String::new(),
            save_results: true,
            analysis_name: None,
        }
    }
}

/// Replace filesystem-hostile characters so a user-supplied run name is safe
/// as a directory name.
pub fn sanitise_analysis_name(name: &str) -> String {
    let re = Regex::new(r##"[ \\/:*?"<>|'`~!@#$%^&()]"##).unwrap();
    re.replace_all(name.trim(), "_").into_owned()
}

// ── Agent ───────────────────────────────────────────────────────────────────

pub struct EnrichmentAgent {
    enrichr: Arc<dyn EnrichmentSource>,
    toppfun: Arc<dyn EnrichmentSource>,
    gprofiler: Arc<dyn EnrichmentSource>,
    literature: Arc<dyn LiteratureSearch>,
    synthesizer: ThemeSynthesizer,
    config: Config,
}

impl EnrichmentAgent {
    /// Build an agent with the production clients. Fails fast on a missing
    /// API key or an unknown source name in the config.
    pub fn new(config: Config) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let backend: Arc<dyn LlmBackend> = match &config.llm.base_url {
            Some(url) => Arc::new(OpenAiCompatibleBackend::new(
                url.clone(),
                config.llm.model.clone(),
                Some(api_key),
            )),
            None => Arc::new(OpenAiBackend::new(api_key, config.llm.model.clone())),
        };

        let enrichr: Arc<dyn EnrichmentSource> = if config.sources.enrichr.is_empty() {
            Arc::new(EnrichrClient::new()?)
        } else {
            let specs = config.sources.enrichr.iter().map(|e| e.to_spec()).collect();
            Arc::new(EnrichrClient::with_sources(specs)?)
        };
        let gprofiler: Arc<dyn EnrichmentSource> = if config.sources.gprofiler.is_empty() {
            Arc::new(GProfilerClient::new()?)
        } else {
            let specs = config.sources.gprofiler.iter().map(|e| e.to_spec()).collect();
            Arc::new(GProfilerClient::with_sources(specs)?)
        };
        let toppfun: Arc<dyn EnrichmentSource> = if config.sources.toppfun.is_empty() {
            Arc::new(ToppFunClient::new()?)
        } else {
            let specs = config.sources.toppfun.iter().map(|e| e.to_spec()).collect();
            Arc::new(ToppFunClient::with_sources(specs)?)
        };
        let literature: Arc<dyn LiteratureSearch> = Arc::new(PubMedClient::new()?);

        Ok(Self::with_components(
            config, enrichr, toppfun, gprofiler, literature, backend,
        ))
    }

    /// Assemble an agent from pre-built components.
    pub fn with_components(
        config: Config,
        enrichr: Arc<dyn EnrichmentSource>,
        toppfun: Arc<dyn EnrichmentSource>,
        gprofiler: Arc<dyn EnrichmentSource>,
        literature: Arc<dyn LiteratureSearch>,
        backend: Arc<dyn LlmBackend>,
    ) -> Self {
        let synthesizer = ThemeSynthesizer::new(backend, config.analysis.prompt_terms);
        Self {
            enrichr,
            toppfun,
            gprofiler,
            literature,
            synthesizer,
            config,
        }
    }

    /// Run the full pipeline: fetch, aggregate, synthesize, persist.
    ///
    /// A single failing source is logged and skipped; all three failing, or
    /// the fetch phase overrunning `run_timeout_secs`, aborts the run before
    /// any model call. Persistence failures never discard the in-memory
    /// result.
    #[instrument(skip_all, fields(n_genes = request.genes.len(), ranked = request.ranked))]
    pub async fn run_analysis(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        let genes = GeneList::new(&request.genes)?;
        if request.email.trim().is_empty() {
            return Err(ThemixError::Config(
                "a contact email is required for PubMed searches".to_string(),
            ));
        }
        let background = normalise_symbols(&request.background_genes);

        info!(genes = %genes.join(","), "Starting enrichment analysis");
        let analysis = &self.config.analysis;
        let fetch_all = async {
            tokio::join!(
                self.enrichr.fetch(&genes, &background, request.ranked),
                self.toppfun.fetch(&genes, &background, request.ranked),
                self.gprofiler.fetch(&genes, &background, request.ranked),
                self.literature.search(
                    &genes,
                    &request.email,
                    &request.search_terms,
                    analysis.papers_per_gene,
                    analysis.max_papers,
                ),
            )
        };
        let (enrichr_res, toppfun_res, gprofiler_res, literature_res) =
            tokio::time::timeout(Duration::from_secs(analysis.run_timeout_secs), fetch_all)
                .await
                .map_err(|_| {
                    ThemixError::AllSourcesFailed(format!(
                        "fetch phase exceeded {}s run timeout",
                        analysis.run_timeout_secs
                    ))
                })?;

        let mut failures: Vec<String> = Vec::new();
        let enrichr_terms = unwrap_source(enrichr_res, "enrichr", &mut failures);
        let toppfun_terms = unwrap_source(toppfun_res, "toppfun", &mut failures);
        let gprofiler_terms = unwrap_source(gprofiler_res, "gprofiler", &mut failures);
        if failures.len() == 3 {
            return Err(ThemixError::AllSourcesFailed(failures.join("; ")));
        }

        let literature: Vec<LiteratureRecord> = match literature_res {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Literature search failed; continuing without papers");
                Vec::new()
            }
        };

        info!(
            enrichr = enrichr_terms.len(),
            toppfun = toppfun_terms.len(),
            gprofiler = gprofiler_terms.len(),
            papers = literature.len(),
            "Fetch phase complete"
        );

        let aggregated = aggregate(
            enrichr_terms.clone(),
            toppfun_terms.clone(),
            gprofiler_terms.clone(),
            analysis.terms_per_source,
        );

        let result = self
            .synthesizer
            .synthesize(&aggregated, &literature, &genes, request.ranked, &request.context)
            .await?;

        if request.save_results {
            let artifacts = report::RunArtifacts {
                request: &request,
                genes: &genes,
                enrichr_terms: &enrichr_terms,
                toppfun_terms: &toppfun_terms,
                gprofiler_terms: &gprofiler_terms,
                literature: &literature,
                aggregated: &aggregated,
                result: &result,
            };
            match report::save_run(&self.config.results_dir, &artifacts) {
                Ok(dir) => info!(dir = %dir.display(), "Results saved"),
                Err(e) => {
                    warn!(error = %e, "Failed to persist results; returning in-memory result")
                }
            }
        }

        Ok(result)
    }
}

fn unwrap_source(
    res: Result<Vec<EnrichmentTerm>>,
    name: &str,
    failures: &mut Vec<String>,
) -> Vec<EnrichmentTerm> {
    match res {
        Ok(terms) => terms,
        Err(e) => {
            warn!(source = name, error = %e, "Enrichment source failed; excluding from aggregation");
            failures.push(format!("{name}: {e}"));
            Vec::new()
        }
    }
}
