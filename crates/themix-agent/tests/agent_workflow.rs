//! End-to-end workflow tests with in-memory sources, literature and model.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use themix_agent::config::Config;
use themix_agent::{AnalysisRequest, EnrichmentAgent};
use themix_common::models::{EnrichmentTerm, EnrichmentTool, GeneList, LiteratureRecord};
use themix_common::{Result, ThemixError};
use themix_enrichment::EnrichmentSource;
use themix_literature::LiteratureSearch;
use themix_synthesis::{LlmBackend, LlmError, LlmRequest, LlmResponse};

// ── Mocks ───────────────────────────────────────────────────────────────────

struct MockSource {
    tool: EnrichmentTool,
    terms: Vec<EnrichmentTerm>,
    fail: bool,
}

impl MockSource {
    fn ok(tool: EnrichmentTool, terms: Vec<EnrichmentTerm>) -> Arc<Self> {
        Arc::new(Self { tool, terms, fail: false })
    }

    fn failing(tool: EnrichmentTool) -> Arc<Self> {
        Arc::new(Self { tool, terms: Vec::new(), fail: true })
    }
}

#[async_trait]
impl EnrichmentSource for MockSource {
    fn tool(&self) -> EnrichmentTool {
        self.tool
    }

    async fn fetch(
        &self,
        _genes: &GeneList,
        _background: &[String],
        _ranked: bool,
    ) -> Result<Vec<EnrichmentTerm>> {
        if self.fail {
            return Err(ThemixError::Fetch {
                tool: self.tool,
                kind: themix_common::error::FetchKind::Status(503),
                message: "service unavailable".to_string(),
            });
        }
        Ok(self.terms.clone())
    }
}

/// A source that never answers within any sensible deadline.
struct StalledSource {
    tool: EnrichmentTool,
}

#[async_trait]
impl EnrichmentSource for StalledSource {
    fn tool(&self) -> EnrichmentTool {
        self.tool
    }

    async fn fetch(
        &self,
        _genes: &GeneList,
        _background: &[String],
        _ranked: bool,
    ) -> Result<Vec<EnrichmentTerm>> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

struct MockLiterature {
    records: Vec<LiteratureRecord>,
}

#[async_trait]
impl LiteratureSearch for MockLiterature {
    async fn search(
        &self,
        _genes: &GeneList,
        _email: &str,
        _search_terms: &[String],
        _papers_per_gene: usize,
        _max_papers: usize,
    ) -> Result<Vec<LiteratureRecord>> {
        Ok(self.records.clone())
    }
}

struct MockBackend {
    reply: String,
    calls: AtomicU32,
    last_request: Mutex<Option<LlmRequest>>,
}

impl MockBackend {
    fn new(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            calls: AtomicU32::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn last_prompt(&self) -> String {
        let guard = self.last_request.lock().unwrap();
        let req = guard.as_ref().expect("no model call recorded");
        req.messages
            .iter()
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, req: LlmRequest) -> std::result::Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(req);
        Ok(LlmResponse {
            content: self.reply.clone(),
            model: "mock".to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────────

fn term(tool: EnrichmentTool, id: &str, name: &str, adj_p: f64) -> EnrichmentTerm {
    EnrichmentTerm {
        term_id: id.to_string(),
        term_name: name.to_string(),
        tool,
        source_label: "GO:BP".to_string(),
        p_value: adj_p / 10.0,
        adjusted_p_value: adj_p,
        overlapping_genes: BTreeSet::from(["TOP2A".to_string(), "CCNB1".to_string()]),
        combined_score: None,
    }
}

fn paper(pmid: &str) -> LiteratureRecord {
    LiteratureRecord {
        pmid: pmid.to_string(),
        title: "TOP2A drives mitotic progression".to_string(),
        context: "TOP2A".to_string(),
        year: Some("2023".to_string()),
        abstract_snippet: Some("**TOP2A** is required for chromosome segregation.".to_string()),
        matched_genes: vec!["TOP2A".to_string()],
        gene_mentions: vec![],
    }
}

fn no_save_config() -> Config {
    Config::default()
}

fn request() -> AnalysisRequest {
    let mut req = AnalysisRequest::new(
        vec!["TOP2A".to_string(), "CCNB1".to_string(), "PLK1".to_string()],
        "user@example.org",
    );
    req.save_results = false;
    req
}

const THEMED_REPLY: &str = r#"{
  "themes": [
    {
      "theme": "Cell cycle control",
      "description": "Mitotic progression terms shared by all three tools.",
      "term_ids": ["GO:0007049"],
      "paper_ids": ["PMID:12345678"],
      "genes": ["TOP2A", "CCNB1"]
    }
  ],
  "summary": "The list is dominated by cell cycle machinery."
}"#;

// ── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cross_referenced_term_flows_into_theme() {
    let enrichr = MockSource::ok(
        EnrichmentTool::Enrichr,
        vec![
            term(EnrichmentTool::Enrichr, "GO:0007049", "Cell Cycle (GO:0007049)", 1e-8),
            term(EnrichmentTool::Enrichr, "GO:0000278", "Mitotic Cell Cycle (GO:0000278)", 1e-5),
        ],
    );
    let toppfun = MockSource::ok(
        EnrichmentTool::ToppFun,
        vec![term(EnrichmentTool::ToppFun, "GO:0007049", "cell cycle", 1e-7)],
    );
    let gprofiler = MockSource::ok(
        EnrichmentTool::GProfiler,
        vec![term(EnrichmentTool::GProfiler, "GO:0007049", "cell cycle", 1e-6)],
    );
    let literature = Arc::new(MockLiterature { records: vec![paper("12345678")] });
    let backend = MockBackend::new(THEMED_REPLY);

    let agent = EnrichmentAgent::with_components(
        no_save_config(),
        enrichr,
        toppfun,
        gprofiler,
        literature,
        backend.clone(),
    );

    let result = agent.run_analysis(request()).await.unwrap();

    assert_eq!(result.themes.len(), 1);
    assert_eq!(result.themes[0].term_ids, vec!["GO:0007049"]);
    assert_eq!(result.themes[0].paper_ids, vec!["12345678"]);
    assert_eq!(result.summary, "The list is dominated by cell cycle machinery.");

    // Exactly one model call, and the prompt shows the three-tool overlap.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    let prompt = backend.last_prompt();
    assert!(prompt.contains("GO:0007049"));
    assert!(prompt.contains("tools: enrichr,toppfun,gprofiler"));
    assert!(prompt.contains("PMID:12345678"));
}

#[tokio::test]
async fn test_single_source_failure_is_tolerated() {
    let enrichr = MockSource::failing(EnrichmentTool::Enrichr);
    let toppfun = MockSource::ok(
        EnrichmentTool::ToppFun,
        vec![term(EnrichmentTool::ToppFun, "GO:0007049", "cell cycle", 1e-7)],
    );
    let gprofiler = MockSource::ok(
        EnrichmentTool::GProfiler,
        vec![term(EnrichmentTool::GProfiler, "GO:0007049", "cell cycle", 1e-6)],
    );
    let literature = Arc::new(MockLiterature { records: vec![paper("12345678")] });
    let backend = MockBackend::new(THEMED_REPLY);

    let agent = EnrichmentAgent::with_components(
        no_save_config(),
        enrichr,
        toppfun,
        gprofiler,
        literature,
        backend.clone(),
    );

    let result = agent.run_analysis(request()).await.unwrap();
    assert_eq!(result.themes.len(), 1);
    assert!(backend.last_prompt().contains("tools: toppfun,gprofiler"));
}

#[tokio::test]
async fn test_all_sources_failing_aborts_before_synthesis() {
    let literature = Arc::new(MockLiterature { records: vec![paper("12345678")] });
    let backend = MockBackend::new(THEMED_REPLY);

    let agent = EnrichmentAgent::with_components(
        no_save_config(),
        MockSource::failing(EnrichmentTool::Enrichr),
        MockSource::failing(EnrichmentTool::ToppFun),
        MockSource::failing(EnrichmentTool::GProfiler),
        literature,
        backend.clone(),
    );

    let err = agent.run_analysis(request()).await.unwrap_err();
    assert!(matches!(err, ThemixError::AllSourcesFailed(_)));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_run_timeout_aborts_stalled_fetch_phase() {
    let mut config = Config::default();
    config.analysis.run_timeout_secs = 1;

    let literature = Arc::new(MockLiterature { records: vec![] });
    let backend = MockBackend::new(THEMED_REPLY);

    let agent = EnrichmentAgent::with_components(
        config,
        Arc::new(StalledSource { tool: EnrichmentTool::Enrichr }),
        MockSource::ok(
            EnrichmentTool::ToppFun,
            vec![term(EnrichmentTool::ToppFun, "GO:0007049", "cell cycle", 1e-7)],
        ),
        MockSource::ok(EnrichmentTool::GProfiler, vec![]),
        literature,
        backend.clone(),
    );

    let err = agent.run_analysis(request()).await.unwrap_err();
    assert!(matches!(err, ThemixError::AllSourcesFailed(_)));
    assert!(err.to_string().contains("run timeout"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_email_is_a_config_error() {
    let backend = MockBackend::new(THEMED_REPLY);
    let agent = EnrichmentAgent::with_components(
        no_save_config(),
        MockSource::ok(EnrichmentTool::Enrichr, vec![]),
        MockSource::ok(EnrichmentTool::ToppFun, vec![]),
        MockSource::ok(EnrichmentTool::GProfiler, vec![]),
        Arc::new(MockLiterature { records: vec![] }),
        backend.clone(),
    );

    let mut req = request();
    req.email = "  ".to_string();
    let err = agent.run_analysis(req).await.unwrap_err();
    assert!(matches!(err, ThemixError::Config(_)));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_persistence_failure_keeps_in_memory_result() {
    let blocker = tempfile::NamedTempFile::new().unwrap();
    let mut config = Config::default();
    // A file where the results directory should be makes create_dir_all fail.
    config.results_dir = blocker.path().to_string_lossy().into_owned();

    let enrichr = MockSource::ok(
        EnrichmentTool::Enrichr,
        vec![term(EnrichmentTool::Enrichr, "GO:0007049", "Cell Cycle (GO:0007049)", 1e-8)],
    );
    let literature = Arc::new(MockLiterature { records: vec![paper("12345678")] });
    let backend = MockBackend::new(THEMED_REPLY);

    let agent = EnrichmentAgent::with_components(
        config,
        enrichr,
        MockSource::ok(EnrichmentTool::ToppFun, vec![]),
        MockSource::ok(EnrichmentTool::GProfiler, vec![]),
        literature,
        backend,
    );

    let mut req = request();
    req.save_results = true;
    req.analysis_name = Some("blocked run".to_string());

    let result = agent.run_analysis(req).await.unwrap();
    assert_eq!(result.summary, "The list is dominated by cell cycle machinery.");
}

#[tokio::test]
async fn test_saved_run_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.results_dir = dir.path().to_string_lossy().into_owned();

    let enrichr = MockSource::ok(
        EnrichmentTool::Enrichr,
        vec![term(EnrichmentTool::Enrichr, "GO:0007049", "Cell Cycle (GO:0007049)", 1e-8)],
    );
    let literature = Arc::new(MockLiterature { records: vec![paper("12345678")] });
    let backend = MockBackend::new(THEMED_REPLY);

    let agent = EnrichmentAgent::with_components(
        config,
        enrichr,
        MockSource::ok(EnrichmentTool::ToppFun, vec![]),
        MockSource::ok(EnrichmentTool::GProfiler, vec![]),
        literature,
        backend,
    );

    let mut req = request();
    req.save_results = true;
    req.analysis_name = Some("cycle_run".to_string());

    agent.run_analysis(req).await.unwrap();

    let run_dir = dir.path().join("cycle_run");
    assert!(run_dir.join("cycle_run_input_params.json").exists());
    assert!(run_dir.join("cycle_run_enrichr_results.json").exists());
    assert!(run_dir.join("cycle_run_themed_results.json").exists());
    assert!(run_dir.join("cycle_run_literature_results.json").exists());
    assert!(run_dir.join("enrichment_analysis.xlsx").exists());

    let themed: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(run_dir.join("cycle_run_themed_results.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(themed["themes"][0]["term_ids"][0], "GO:0007049");
}
