use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {provider} returned status {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("provider {provider} request failed: {message}")]
    Transport { provider: String, message: String },
    #[error("no provider produced a result; last error: {0}")]
    Exhausted(Box<ProviderError>),
}

impl ProviderError {
    /// 429/408/>=500 plus timeout/network/rate-limit classifications are
    /// retried once per model before falling through.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http { status, .. } => *status == 429 || *status == 408 || *status >= 500,
            ProviderError::Transport { .. } => true,
            ProviderError::Exhausted(inner) => inner.is_transient(),
        }
    }
}
