//! Configuration loading for Themix.
//! Reads themix.toml from the current directory or path in THEMIX_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::Path;
use themix_common::{models::SourceSpec, ThemixError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

fn default_results_dir() -> String { "./results".to_string() }

// Manual impl so the Config::default() fallback path matches the serde
// field defaults, mirroring LlmConfig and AnalysisConfig.
impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            results_dir: default_results_dir(),
            analysis: AnalysisConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of an OpenAI-compatible endpoint; omit for the hosted OpenAI API.
    pub base_url: Option<String>,
}

fn default_model() -> String { "gpt-4.1-mini".to_string() }

// Manual impl so an absent [llm] table still gets the serde field defaults.
impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_terms_per_source")]
    pub terms_per_source: usize,
    #[serde(default = "default_papers_per_gene")]
    pub papers_per_gene: usize,
    #[serde(default = "default_max_papers")]
    pub max_papers: usize,
    #[serde(default = "default_prompt_terms")]
    pub prompt_terms: usize,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

fn default_terms_per_source()  -> usize { 15 }
fn default_papers_per_gene()   -> usize { 2 }
fn default_max_papers()        -> usize { 10 }
fn default_prompt_terms()      -> usize { 50 }
fn default_run_timeout_secs()  -> u64   { 300 }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            terms_per_source: default_terms_per_source(),
            papers_per_gene: default_papers_per_gene(),
            max_papers: default_max_papers(),
            prompt_terms: default_prompt_terms(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

/// Per-tool source selections. Empty lists fall back to each client's
/// built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub enrichr: Vec<SourceSpecEntry>,
    #[serde(default)]
    pub gprofiler: Vec<SourceSpecEntry>,
    #[serde(default)]
    pub toppfun: Vec<SourceSpecEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpecEntry {
    pub name: String,
    pub label: Option<String>,
}

impl SourceSpecEntry {
    pub fn to_spec(&self) -> SourceSpec {
        SourceSpec {
            name: self.name.clone(),
            label: self.label.clone().unwrap_or_else(|| self.name.clone()),
        }
    }
}

impl Config {
    /// Load configuration from themix.toml.
    /// Checks THEMIX_CONFIG env var first, then current directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("THEMIX_CONFIG")
            .unwrap_or_else(|_| "themix.toml".to_string());

        if !Path::new(&path).exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy themix.example.toml to themix.toml and edit it.",
                path
            );
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// The OpenAI API key, from themix.toml or THEMIX_OPENAI_API_KEY.
    pub fn resolve_api_key(&self) -> themix_common::Result<String> {
        let key = if self.llm.api_key.is_empty() {
            std::env::var("THEMIX_OPENAI_API_KEY").unwrap_or_default()
        } else {
            self.llm.api_key.clone()
        };
        if key.is_empty() {
            return Err(ThemixError::Config(
                "no LLM API key found (set llm.api_key or THEMIX_OPENAI_API_KEY)".to_string(),
            ));
        }
        Ok(key)
    }
}
