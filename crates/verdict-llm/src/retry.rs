use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use verdict_core::config::RetryConfig;
use verdict_core::error::Result;
use verdict_core::traits::TextGenerator;
use verdict_core::types::GenerationParams;

/// A generator that retries throttled or transiently failing requests with
/// exponential backoff.
pub struct RetryingGenerator {
    inner: Box<dyn TextGenerator>,
    retry_config: RetryConfig,
}

impl RetryingGenerator {
    pub fn new(inner: Box<dyn TextGenerator>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl TextGenerator for RetryingGenerator {
    fn model(&self) -> &str {
        self.inner.model()
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        params: GenerationParams,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;
            let mut attempt = 0;
            loop {
                match self.inner.generate(prompt, params).await {
                    Ok(text) => return Ok(text),
                    Err(e) if e.is_retryable_generation() && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            model = %self.inner.model(),
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying generation request"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use verdict_core::error::VerdictError;

    /// Fails with the given status `failures` times, then echoes the prompt.
    struct Flaky {
        failures: u32,
        status: u16,
        calls: Arc<AtomicU32>,
    }

    impl TextGenerator for Flaky {
        fn model(&self) -> &str {
            "flaky"
        }

        fn generate<'a>(
            &'a self,
            prompt: &'a str,
            _params: GenerationParams,
        ) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.failures {
                    Err(VerdictError::GenerationFailed {
                        model: "flaky".into(),
                        status: Some(self.status),
                        message: "nope".into(),
                    })
                } else {
                    Ok(format!("{} ok", prompt))
                }
            })
        }
    }

    fn config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let cfg = config(10);
        let d = calculate_backoff(20, &cfg);
        assert!(d <= Duration::from_millis(1200));
        let first = calculate_backoff(0, &cfg);
        assert!(first >= Duration::from_millis(80) && first <= Duration::from_millis(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let gen = RetryingGenerator::new(
            Box::new(Flaky { failures: 2, status: 503, calls: calls.clone() }),
            config(3),
        );
        let out = gen.generate("p", GenerationParams::default()).await.unwrap();
        assert_eq!(out, "p ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let gen = RetryingGenerator::new(
            Box::new(Flaky { failures: 100, status: 429, calls: calls.clone() }),
            config(2),
        );
        assert!(gen.generate("p", GenerationParams::default()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let gen = RetryingGenerator::new(
            Box::new(Flaky { failures: 100, status: 400, calls: calls.clone() }),
            config(5),
        );
        assert!(gen.generate("p", GenerationParams::default()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
