//! Partitioned, lease-based FIFO queues, one per named
//! queue (`goalQueue`, `taskQueue`, `patchQueue`, `reviewQueue`). Grounded
//! on the claim/fail-with-backoff/delete shape of a lease-based job queue,
//! adapted to a purely in-memory manager: this core only brokers work,
//! durable storage is an external collaborator.

mod error;
pub mod manager;

pub use error::QueueError;
pub use manager::{PullOptions, QueueManager, QueueName};

pub use redstring_types::{QueueItem, QueueMetrics, QueueStatus};
