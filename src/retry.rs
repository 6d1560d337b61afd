//! Bounded-retry wrapper around calls to the generative collaborator.
//!
//! Transient failures (timeouts, rate limits, transport) are retried with
//! exponential backoff and jitter; terminal failures (authentication,
//! configuration) fail immediately. After the retry budget is exhausted,
//! a provider-error signal carries the provider name and the last
//! underlying cause.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{CloneError, Result};
use crate::html::{ensure_document_shell, parse_model_response};
use crate::provider::LanguageModel;
use crate::scoring::similarity_score;
use crate::types::{DetectionResult, HtmlArtifact};

/// Similarity reported when there is no detection to compare against.
const UNSCORED_SIMILARITY: f32 = 75.0;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = max_retries + 1.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Deterministic component of the delay before retry attempt `k`:
    /// `base * 2^k`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_ms = if self.jitter.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64)
        };
        (self.backoff(attempt) + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Governs calls to the generative collaborator and turns raw responses
/// into well-formed HTML artifacts.
pub struct RetryController {
    provider: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(provider: Arc<dyn LanguageModel>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn provider(&self) -> &Arc<dyn LanguageModel> {
        &self.provider
    }

    /// Run one generation request to completion or terminal failure.
    ///
    /// On success the response is parsed for an HTML document and
    /// post-processed into a well-formed shell; the artifact's similarity
    /// is scored against `detection` when one is supplied.
    pub async fn generate(
        &self,
        prompt: &str,
        max_output: u32,
        detection: Option<&DetectionResult>,
    ) -> Result<HtmlArtifact> {
        let started = Instant::now();
        let completion = self
            .call_with_retries(|| self.provider.complete(prompt, max_output))
            .await?;

        let parsed = parse_model_response(&completion.text);
        let html_content = ensure_document_shell(&parsed.html);
        let similarity = detection
            .map(|d| similarity_score(d, &html_content))
            .unwrap_or(UNSCORED_SIMILARITY);

        Ok(HtmlArtifact {
            html_content,
            css_content: parsed.css,
            assets: Vec::new(),
            similarity_score: similarity,
            generation_time_ms: started.elapsed().as_millis() as u64,
            tokens_used: completion.usage,
        })
    }

    /// Run one image-comparison request under the same retry policy and
    /// return the raw analysis text.
    pub async fn compare_images(
        &self,
        image_a: &[u8],
        image_b: &[u8],
        instruction: &str,
    ) -> Result<String> {
        let completion = self
            .call_with_retries(|| self.provider.compare_images(image_a, image_b, instruction))
            .await?;
        Ok(completion.text)
    }

    async fn call_with_retries<F, Fut, T>(&self, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let provider = self.provider.provider_name().to_string();
        let mut last_cause = String::new();

        for attempt in 0..=self.policy.max_retries {
            match call().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(provider = %provider, attempt, "provider call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_with_jitter(attempt);
                    warn!(
                        provider = %provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient provider failure, retrying"
                    );
                    last_cause = err.to_string();
                    sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    last_cause = err.to_string();
                    break;
                }
                Err(err) => {
                    warn!(provider = %provider, error = %err, "terminal provider failure");
                    return Err(err);
                }
            }
        }

        Err(CloneError::Provider {
            provider,
            message: format!(
                "retries exhausted after {} attempts; last cause: {}",
                self.policy.max_retries + 1,
                last_cause
            ),
            transient: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Completion;
    use crate::types::TokenUsage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that fails `failures` times before succeeding, or always
    /// fails terminally when `terminal` is set.
    struct ScriptedProvider {
        failures: u32,
        terminal: bool,
        calls: AtomicU32,
        response: String,
    }

    impl ScriptedProvider {
        fn transient(failures: u32, response: &str) -> Self {
            Self {
                failures,
                terminal: false,
                calls: AtomicU32::new(0),
                response: response.to_string(),
            }
        }

        fn terminal() -> Self {
            Self {
                failures: u32::MAX,
                terminal: true,
                calls: AtomicU32::new(0),
                response: String::new(),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedProvider {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str, _max_output: u32) -> Result<Completion> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.terminal {
                return Err(CloneError::provider_terminal("scripted", "bad credentials"));
            }
            if call < self.failures {
                return Err(CloneError::provider_transient("scripted", "rate limited"));
            }
            Ok(Completion {
                text: self.response.clone(),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 20,
                },
            })
        }

        async fn compare_images(
            &self,
            _image_a: &[u8],
            _image_b: &[u8],
            _instruction: &str,
        ) -> Result<Completion> {
            self.complete("", 0).await
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn three_transient_failures_then_success_takes_four_attempts() {
        let provider = Arc::new(ScriptedProvider::transient(
            3,
            "```html\n<html><body>ok</body></html>\n```",
        ));
        let controller = RetryController::new(provider.clone(), fast_policy(3));

        let artifact = controller.generate("prompt", 4096, None).await.unwrap();
        assert_eq!(provider.calls(), 4);
        assert!(artifact.html_content.contains("ok"));
        assert!(artifact.html_content.starts_with("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn attempts_never_exceed_max_retries_plus_one() {
        let provider = Arc::new(ScriptedProvider::transient(u32::MAX - 1, ""));
        let controller = RetryController::new(provider.clone(), fast_policy(2));

        let err = controller.generate("prompt", 4096, None).await.unwrap_err();
        assert_eq!(provider.calls(), 3);
        match err {
            CloneError::Provider {
                provider, message, ..
            } => {
                assert_eq!(provider, "scripted");
                assert!(message.contains("rate limited"));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_failure_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::terminal());
        let controller = RetryController::new(provider.clone(), fast_policy(5));

        let err = controller.generate("prompt", 4096, None).await.unwrap_err();
        assert_eq!(provider.calls(), 1);
        assert!(!err.is_transient());
    }

    #[test]
    fn backoff_is_non_decreasing_until_cap() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            jitter: Duration::ZERO,
        };

        let mut previous = Duration::ZERO;
        for attempt in 0..10 {
            let delay = policy.backoff(attempt);
            assert!(delay >= previous, "delay shrank at attempt {attempt}");
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
        assert_eq!(policy.backoff(9), policy.max_delay);
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn artifact_scores_against_detection_when_present() {
        use crate::types::{ComponentType, DetectedComponent};
        use std::collections::HashMap;

        let detection = DetectionResult::new(
            "s1".into(),
            vec![DetectedComponent {
                component_type: ComponentType::Button,
                member_paths: vec!["/html/body/button[1]".into()],
                label: None,
                bounding_box: None,
                metadata: HashMap::new(),
            }],
            0,
        );

        let provider = Arc::new(ScriptedProvider::transient(
            0,
            "```html\n<html><body><button>Go</button></body></html>\n```",
        ));
        let controller = RetryController::new(provider, fast_policy(0));

        let artifact = controller
            .generate("prompt", 4096, Some(&detection))
            .await
            .unwrap();
        assert_eq!(artifact.similarity_score, 95.0);
    }
}
