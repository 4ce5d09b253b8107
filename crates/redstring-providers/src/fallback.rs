use std::time::Duration;

use crate::error::ProviderError;
use crate::provider::Provider;

const RETRY_SPACING: Duration = Duration::from_millis(800);

/// Result of a successful completion through the fallback ladder: the
/// text returned and the model that actually produced it (not
/// necessarily the one requested).
pub struct Completion {
    pub text: String,
    pub model: String,
}

/// Walks `ladder` (`[requested, ...explicitFallbacks, ...defaultFallbacks]`)
/// trying each model once, with one retry after a
/// transient failure spaced 800ms apart, before falling through to the
/// next model. Returns the first success, or the last error if every
/// model in the ladder is exhausted.
pub async fn call_with_fallback(
    provider: &dyn Provider,
    ladder: &[&str],
    system_prompt: &str,
    user_message: &str,
    api_key: &str,
) -> Result<Completion, ProviderError> {
    let mut last_error = None;

    for model in ladder {
        match provider.complete(system_prompt, user_message, model, api_key).await {
            Ok(text) => {
                return Ok(Completion {
                    text,
                    model: model.to_string(),
                })
            }
            Err(err) => {
                if err.is_transient() {
                    tokio::time::sleep(RETRY_SPACING).await;
                    match provider.complete(system_prompt, user_message, model, api_key).await {
                        Ok(text) => {
                            return Ok(Completion {
                                text,
                                model: model.to_string(),
                            })
                        }
                        Err(retry_err) => last_error = Some(retry_err),
                    }
                } else {
                    last_error = Some(err);
                }
            }
        }
    }

    Err(ProviderError::Exhausted(Box::new(
        last_error.unwrap_or_else(|| ProviderError::Transport {
            provider: provider.name().to_string(),
            message: "no models configured".to_string(),
        }),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeProvider {
        /// One scripted result per call, consumed in order.
        script: Mutex<Vec<Result<String, ProviderError>>>,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(script: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn complete(&self, _system_prompt: &str, _user_message: &str, _model: &str, _api_key: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                panic!("FakeProvider script exhausted");
            }
            script.remove(0)
        }
    }

    fn transient() -> ProviderError {
        ProviderError::Http {
            provider: "fake".to_string(),
            status: 503,
            body: String::new(),
        }
    }

    fn permanent() -> ProviderError {
        ProviderError::Http {
            provider: "fake".to_string(),
            status: 400,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_model_without_retry() {
        let provider = FakeProvider::new(vec![Ok("hello".to_string())]);
        let completion = call_with_fallback(&provider, &["model-a"], "sys", "hi", "key").await.unwrap();
        assert_eq!(completion.text, "hello");
        assert_eq!(completion.model, "model-a");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failure_once_then_falls_through() {
        let provider = FakeProvider::new(vec![Err(transient()), Err(transient()), Ok("recovered".to_string())]);
        let completion = call_with_fallback(&provider, &["model-a", "model-b"], "sys", "hi", "key").await.unwrap();
        assert_eq!(completion.model, "model-b");
        assert_eq!(completion.text, "recovered");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_skips_retry_and_falls_through_immediately() {
        let provider = FakeProvider::new(vec![Err(permanent()), Ok("ok".to_string())]);
        let completion = call_with_fallback(&provider, &["model-a", "model-b"], "sys", "hi", "key").await.unwrap();
        assert_eq!(completion.model, "model-b");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_ladder_and_returns_last_error() {
        let provider = FakeProvider::new(vec![Err(permanent()), Err(permanent())]);
        let result = call_with_fallback(&provider, &["model-a", "model-b"], "sys", "hi", "key").await;
        assert!(result.is_err());
    }
}
