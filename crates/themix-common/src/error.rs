use thiserror::Error;

use crate::models::EnrichmentTool;

/// What went wrong on the wire. Carried inside `ThemixError::Fetch` so the
/// retry layer can decide transience without holding a live `reqwest::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Connection refused / DNS / TLS failure.
    Connect,
    /// Request or response deadline exceeded.
    Timeout,
    /// Non-success HTTP status.
    Status(u16),
    /// Body arrived but did not match the expected shape.
    Malformed,
    /// The service answered with zero results.
    Empty,
}

impl FetchKind {
    /// Transient failures are worth retrying; 4xx means the caller's input
    /// is presumed wrong and fails immediately (429 excepted).
    pub fn is_transient(&self) -> bool {
        match self {
            FetchKind::Connect | FetchKind::Timeout => true,
            FetchKind::Status(s) => *s == 429 || *s >= 500,
            FetchKind::Malformed | FetchKind::Empty => false,
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchKind::Timeout
        } else if let Some(status) = err.status() {
            FetchKind::Status(status.as_u16())
        } else if err.is_connect() || err.is_request() {
            FetchKind::Connect
        } else {
            FetchKind::Malformed
        }
    }
}

impl std::fmt::Display for FetchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchKind::Connect => write!(f, "connection failure"),
            FetchKind::Timeout => write!(f, "timeout"),
            FetchKind::Status(s) => write!(f, "HTTP status {s}"),
            FetchKind::Malformed => write!(f, "malformed response"),
            FetchKind::Empty => write!(f, "empty result set"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ThemixError {
    #[error("Configuration error: {0}")]
    Config(String),

    // Field is named `tool`, not `source`: thiserror treats a `source` field
    // as the std::error::Error cause chain.
    #[error("{tool} fetch failed ({kind}): {message}")]
    Fetch {
        tool: EnrichmentTool,
        kind: FetchKind,
        message: String,
    },

    #[error("Literature search failed ({kind}): {message}")]
    Literature { kind: FetchKind, message: String },

    #[error("All enrichment sources failed: {0}")]
    AllSourcesFailed(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("Sandbox policy rejected URL: {0}")]
    Sandbox(String),
}

impl ThemixError {
    /// Build a `Fetch` error out of a transport failure, classifying it for
    /// the retry layer.
    pub fn fetch(tool: EnrichmentTool, err: reqwest::Error) -> Self {
        ThemixError::Fetch {
            tool,
            kind: FetchKind::from_reqwest(&err),
            message: err.to_string(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ThemixError::Fetch { kind, .. } | ThemixError::Literature { kind, .. } => {
                kind.is_transient()
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ThemixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchKind::Timeout.is_transient());
        assert!(FetchKind::Connect.is_transient());
        assert!(FetchKind::Status(503).is_transient());
        assert!(FetchKind::Status(429).is_transient());
        assert!(!FetchKind::Status(400).is_transient());
        assert!(!FetchKind::Status(404).is_transient());
        assert!(!FetchKind::Malformed.is_transient());
        assert!(!FetchKind::Empty.is_transient());
    }

    #[test]
    fn test_fetch_error_names_tool() {
        let err = ThemixError::Fetch {
            tool: EnrichmentTool::Enrichr,
            kind: FetchKind::Status(502),
            message: "bad gateway".to_string(),
        };
        assert!(err.to_string().contains("enrichr"));
        assert!(err.is_transient());
        // The failing tool is display metadata, not a wrapped error cause.
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_config_error_is_not_transient() {
        assert!(!ThemixError::Config("missing key".into()).is_transient());
    }
}
