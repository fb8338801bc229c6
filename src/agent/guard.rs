use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{GenerationOptions, RateLimiter, TextGenerator};
use crate::config::GenerationConfig;

pub const GENERATION_BUCKET: &str = "generation";

/// Bounded access to the text generator.
///
/// Returns `None` when the generator errors, times out, or the call budget
/// is exhausted; callers substitute their fallback content.
pub struct GuardedGenerator {
    inner: Arc<dyn TextGenerator>,
    timeout: Duration,
    limiter: Mutex<RateLimiter>,
}

impl GuardedGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>, config: &GenerationConfig) -> Self {
        let limiter = RateLimiter::new().with_bucket(
            GENERATION_BUCKET,
            config.calls_per_minute,
            Duration::from_secs(60),
        );
        Self {
            inner,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            limiter: Mutex::new(limiter),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn generate(&self, purpose: &str, prompt: String, options: GenerationOptions) -> Option<String> {
        {
            let mut limiter = self.limiter.lock().await;
            if !limiter.check(GENERATION_BUCKET) {
                warn!(
                    "Generation budget exhausted, using fallback for {} (next call in {:?})",
                    purpose,
                    limiter.retry_after(GENERATION_BUCKET)
                );
                return None;
            }
        }

        match tokio::time::timeout(self.timeout, self.inner.generate(prompt, options)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                debug!("Generated {} chars for {}", text.len(), purpose);
                Some(text)
            }
            Ok(Ok(_)) => {
                warn!("Generator returned empty text for {}", purpose);
                None
            }
            Ok(Err(e)) => {
                warn!("Generator failed for {}: {:#}", purpose, e);
                None
            }
            Err(_) => {
                warn!("Generator timed out after {:?} for {}", self.timeout, purpose);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::OfflineGenerator;
    use async_trait::async_trait;

    struct SlowGenerator;

    #[async_trait]
    impl TextGenerator for SlowGenerator {
        async fn generate(&self, _prompt: String, _options: GenerationOptions) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".into())
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, prompt: String, _options: GenerationOptions) -> anyhow::Result<String> {
            Ok(prompt)
        }
    }

    #[tokio::test]
    async fn test_offline_yields_none() {
        let guard = GuardedGenerator::new(Arc::new(OfflineGenerator), &GenerationConfig::default());
        assert!(guard.generate("test", "p".into(), GenerationOptions::default()).await.is_none());
    }

    #[tokio::test]
    async fn test_timeout_yields_none() {
        let guard = GuardedGenerator::new(Arc::new(SlowGenerator), &GenerationConfig::default())
            .with_timeout(Duration::from_millis(20));
        assert!(guard.generate("test", "p".into(), GenerationOptions::default()).await.is_none());
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let config = GenerationConfig { calls_per_minute: 2, ..GenerationConfig::default() };
        let guard = GuardedGenerator::new(Arc::new(EchoGenerator), &config);
        let options = GenerationOptions::default();
        assert_eq!(guard.generate("t", "a".into(), options).await.as_deref(), Some("a"));
        assert_eq!(guard.generate("t", "b".into(), options).await.as_deref(), Some("b"));
        assert!(guard.generate("t", "c".into(), options).await.is_none());
    }
}
