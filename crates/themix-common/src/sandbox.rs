use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use crate::error::ThemixError;

/// A sandbox-capped HTTP client that only allows requests to approved
/// domains. Every network call in the pipeline goes through this wrapper so
/// a misconfigured base URL cannot reach an arbitrary host.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a new SandboxClient with the default allowlist of the
    /// services this pipeline talks to.
    pub fn new() -> Result<Self, ThemixError> {
        let mut allowlist = HashSet::new();
        let domains = vec![
            "maayanlab.cloud",         // Enrichr + speedrichr
            "toppgene.cchmc.org",      // ToppFun / ToppGene
            "biit.cs.ut.ee",           // g:Profiler gost API
            "eutils.ncbi.nlm.nih.gov", // PubMed E-utilities
            "api.openai.com",          // Summarization model
            "localhost",               // OpenAI-compatible local endpoints
            "127.0.0.1",               // Localhost alt
        ];

        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ThemixError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Exact match or a subdomain of an allowed domain
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Exposes the inner `reqwest::Client` builder pattern safely for GET requests.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, ThemixError> {
        if !self.is_allowed(url) {
            return Err(ThemixError::Sandbox(url.to_string()));
        }
        Ok(self.client.get(url))
    }

    /// Exposes the inner `reqwest::Client` builder pattern safely for POST requests.
    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, ThemixError> {
        if !self.is_allowed(url) {
            return Err(ThemixError::Sandbox(url.to_string()));
        }
        Ok(self.client.post(url))
    }
}
