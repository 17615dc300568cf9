//! Message queue persistence trait

use async_trait::async_trait;

use super::model::QueuedMessage;
use crate::support::errors::DomainResult;

/// MESSAGE_QUEUE table: an ordered log of unacknowledged Calls.
#[async_trait]
pub trait MessageQueueRepository: Send + Sync {
    /// Append a record; insertion order is replay order.
    async fn push(&self, message: &QueuedMessage) -> DomainResult<()>;

    /// Remove an acknowledged (or dropped) record.
    async fn delete(&self, unique_id: &str) -> DomainResult<()>;

    async fn update_attempts(&self, unique_id: &str, attempts: i32) -> DomainResult<()>;

    /// All records in insertion order, oldest first.
    async fn load_all(&self) -> DomainResult<Vec<QueuedMessage>>;

    async fn count_for_transaction(&self, transaction_id: &str) -> DomainResult<u64>;

    async fn clear(&self) -> DomainResult<()>;
}
