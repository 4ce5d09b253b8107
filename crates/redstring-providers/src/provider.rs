use async_trait::async_trait;

use crate::error::ProviderError;

/// A single external model call. Implementations
/// talk to one vendor API; model selection happens above the trait, in
/// [`crate::call_with_fallback`].
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, system_prompt: &str, user_message: &str, model: &str, api_key: &str) -> Result<String, ProviderError>;
}

pub struct ReqwestProvider {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Provider for ReqwestProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, system_prompt: &str, user_message: &str, model: &str, api_key: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "model": model,
                "system": system_prompt,
                "messages": [{ "role": "user", "content": user_message }],
            }))
            .send()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: self.name.clone(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: self.name.clone(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .text()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: self.name.clone(),
                message: err.to_string(),
            })
    }
}
