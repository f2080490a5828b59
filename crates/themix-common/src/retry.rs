//! Bounded retry with exponential backoff for transient fetch failures.
//!
//! Transient means timeout, connection failure, 429 or 5xx; 4xx returns
//! immediately since the caller's input is presumed wrong.

use std::future::Future;
use std::time::Duration;

use crate::error::ThemixError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
        }
    }
}

/// Execute an async operation, retrying on transient errors up to
/// `config.max_retries` extra attempts.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, ThemixError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ThemixError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !e.is_transient() || attempt == config.max_retries {
                    return Err(e);
                }
                let backoff_ms = compute_backoff(config, attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

fn compute_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    base.min(config.max_backoff_ms as f64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchKind;
    use crate::models::EnrichmentTool;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ThemixError {
        ThemixError::Fetch {
            tool: EnrichmentTool::Enrichr,
            kind: FetchKind::Status(503),
            message: "service unavailable".to_string(),
        }
    }

    fn permanent() -> ThemixError {
        ThemixError::Fetch {
            tool: EnrichmentTool::Enrichr,
            kind: FetchKind::Status(400),
            message: "bad request".to_string(),
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 4,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_config(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = with_retry(&fast_config(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(permanent()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = with_retry(&fast_config(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        assert!(result.is_err());
        // 1 initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
        };
        assert_eq!(compute_backoff(&config, 0), 500);
        assert_eq!(compute_backoff(&config, 1), 1_000);
        assert_eq!(compute_backoff(&config, 10), 5_000);
    }
}
