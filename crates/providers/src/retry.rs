//! Transport-level retries with exponential backoff.
//!
//! [`RetryChat`] wraps any [`Chat`] and retries `send_streaming` when the
//! backend fails with a retryable [`ProviderError`]. Errors inside an already
//! opened stream are passed through untouched.

use std::time::Duration;

use async_trait::async_trait;
use kubeinteract_config::RetryConfig;
use kubeinteract_core::error::ProviderError;
use kubeinteract_core::provider::{Chat, ChatStream, FunctionDefinition};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Backoff before retry number `attempt` (0-based), never above `max_backoff`.
fn calculate_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
    let exponential_delay =
        cfg.initial_backoff().as_secs_f64() * cfg.backoff_factor.powi(attempt as i32);

    let jittered_delay = if cfg.jitter {
        let jitter_factor = 0.5 + rand::random::<f64>();
        exponential_delay * jitter_factor
    } else {
        exponential_delay
    };

    Duration::from_secs_f64(jittered_delay.min(cfg.max_backoff().as_secs_f64()))
}

/// A [`Chat`] decorator that retries failed sends.
pub struct RetryChat {
    inner: Box<dyn Chat>,
    config: RetryConfig,
}

impl RetryChat {
    pub fn new(inner: Box<dyn Chat>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl Chat for RetryChat {
    fn set_function_definitions(
        &mut self,
        definitions: Vec<FunctionDefinition>,
    ) -> Result<(), ProviderError> {
        self.inner.set_function_definitions(definitions)
    }

    async fn send_streaming(
        &mut self,
        cancel: &CancellationToken,
        contents: Vec<String>,
    ) -> Result<ChatStream, ProviderError> {
        let mut attempt = 0;

        loop {
            let err = match self.inner.send_streaming(cancel, contents.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(err) => err,
            };
            attempt += 1;

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt >= self.config.max_attempts {
                warn!(
                    error = %err,
                    attempt,
                    max_attempts = self.config.max_attempts,
                    "Max retry attempts exhausted"
                );
                return Err(err);
            }

            let mut delay = calculate_delay(&self.config, attempt - 1);
            if let ProviderError::RateLimited { retry_after_secs } = err {
                delay = delay.max(Duration::from_secs(retry_after_secs));
            }

            warn!(
                error = %err,
                attempt,
                max_attempts = self.config.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Retrying after error"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeinteract_core::provider::{ChatResponse, stream_of};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with `error` for the first `failures` sends, then succeeds.
    struct FlakyChat {
        failures: u32,
        error: ProviderError,
        sends: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Chat for FlakyChat {
        fn set_function_definitions(
            &mut self,
            _definitions: Vec<FunctionDefinition>,
        ) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn send_streaming(
            &mut self,
            _cancel: &CancellationToken,
            _contents: Vec<String>,
        ) -> Result<ChatStream, ProviderError> {
            let n = self.sends.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(stream_of(vec![Ok(ChatResponse::text("ok"))]))
            }
        }
    }

    fn flaky(failures: u32, error: ProviderError) -> (RetryChat, Arc<AtomicU32>) {
        let sends = Arc::new(AtomicU32::new(0));
        let chat = FlakyChat {
            failures,
            error,
            sends: sends.clone(),
        };
        (RetryChat::new(Box::new(chat), RetryConfig::default()), sends)
    }

    #[test]
    fn delay_grows_and_caps_without_jitter() {
        let cfg = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(calculate_delay(&cfg, 0), Duration::from_secs(10));
        assert_eq!(calculate_delay(&cfg, 1), Duration::from_secs(20));
        assert_eq!(calculate_delay(&cfg, 2), Duration::from_secs(40));
        assert_eq!(calculate_delay(&cfg, 3), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let cfg = RetryConfig::default();
        for _ in 0..100 {
            let delay = calculate_delay(&cfg, 0).as_secs_f64();
            assert!((5.0..15.0).contains(&delay));

            // 80s before jitter: jitter may lower it but never past the cap
            let near_cap = calculate_delay(&cfg, 3).as_secs_f64();
            assert!((40.0..=60.0).contains(&near_cap), "{near_cap}");

            assert_eq!(calculate_delay(&cfg, 6), Duration::from_secs(60));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_error_then_success() {
        let (mut chat, sends) = flaky(2, ProviderError::Network("reset".into()));
        let result = chat
            .send_streaming(&CancellationToken::new(), vec!["hi".into()])
            .await;
        assert!(result.is_ok());
        assert_eq!(sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let (mut chat, sends) = flaky(10, ProviderError::Timeout("slow".into()));
        let err = chat
            .send_streaming(&CancellationToken::new(), vec!["hi".into()])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert_eq!(sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_fails_immediately() {
        let (mut chat, sends) = flaky(10, ProviderError::AuthenticationFailed("bad key".into()));
        let err = chat
            .send_streaming(&CancellationToken::new(), vec!["hi".into()])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_backoff() {
        let (mut chat, sends) = flaky(10, ProviderError::Network("down".into()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = chat
            .send_streaming(&cancel, vec!["hi".into()])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::Cancelled));
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }
}
