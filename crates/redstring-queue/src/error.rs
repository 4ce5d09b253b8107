use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("unknown queue {0:?}")]
    UnknownQueue(String),
    #[error("lease {0} not found or already resolved")]
    UnknownLease(String),
}
