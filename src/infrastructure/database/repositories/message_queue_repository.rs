//! SeaORM implementation of MessageQueueRepository

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::debug;

use super::db_err;
use crate::domain::message_queue::{MessageQueueRepository, QueuePriority, QueuedMessage};
use crate::infrastructure::database::entities::message_queue;
use crate::support::errors::{DomainError, DomainResult};

pub struct SeaOrmMessageQueueRepository {
    db: DatabaseConnection,
}

impl SeaOrmMessageQueueRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn model_to_domain(m: message_queue::Model) -> DomainResult<QueuedMessage> {
    Ok(QueuedMessage {
        unique_id: m.unique_id,
        action: m.action,
        payload: serde_json::from_str(&m.payload)
            .map_err(|e| DomainError::Validation(format!("Corrupt queued payload: {}", e)))?,
        priority: QueuePriority::parse(&m.priority).unwrap_or(QueuePriority::Normal),
        attempts: m.attempts,
        first_enqueued_at: m.first_enqueued_at,
        transaction_id: m.transaction_id,
    })
}

// ── MessageQueueRepository impl ─────────────────────────────────

#[async_trait]
impl MessageQueueRepository for SeaOrmMessageQueueRepository {
    async fn push(&self, message: &QueuedMessage) -> DomainResult<()> {
        debug!(
            unique_id = message.unique_id.as_str(),
            action = message.action.as_str(),
            "Persisting queued message"
        );

        let payload = serde_json::to_string(&message.payload)
            .map_err(|e| DomainError::Validation(format!("Serialize payload: {}", e)))?;

        let model = message_queue::ActiveModel {
            id: Default::default(),
            unique_id: Set(message.unique_id.clone()),
            action: Set(message.action.clone()),
            payload: Set(payload),
            priority: Set(message.priority.as_str().to_string()),
            attempts: Set(message.attempts),
            first_enqueued_at: Set(message.first_enqueued_at),
            transaction_id: Set(message.transaction_id.clone()),
        };
        model.insert(&self.db).await.map_err(db_err)?;
        Ok(())
    }

    async fn delete(&self, unique_id: &str) -> DomainResult<()> {
        message_queue::Entity::delete_many()
            .filter(message_queue::Column::UniqueId.eq(unique_id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_attempts(&self, unique_id: &str, attempts: i32) -> DomainResult<()> {
        let Some(existing) = message_queue::Entity::find()
            .filter(message_queue::Column::UniqueId.eq(unique_id))
            .one(&self.db)
            .await
            .map_err(db_err)?
        else {
            return Ok(());
        };

        let mut active: message_queue::ActiveModel = existing.into();
        active.attempts = Set(attempts);
        active.update(&self.db).await.map_err(db_err)?;
        Ok(())
    }

    async fn load_all(&self) -> DomainResult<Vec<QueuedMessage>> {
        let models = message_queue::Entity::find()
            .order_by_asc(message_queue::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        models.into_iter().map(model_to_domain).collect()
    }

    async fn count_for_transaction(&self, transaction_id: &str) -> DomainResult<u64> {
        message_queue::Entity::find()
            .filter(message_queue::Column::TransactionId.eq(transaction_id))
            .count(&self.db)
            .await
            .map_err(db_err)
    }

    async fn clear(&self) -> DomainResult<()> {
        message_queue::Entity::delete_many()
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{init_database, DatabaseConfig};
    use serde_json::json;

    async fn repo() -> SeaOrmMessageQueueRepository {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        SeaOrmMessageQueueRepository::new(db)
    }

    #[tokio::test]
    async fn load_preserves_fifo_order() {
        let repo = repo().await;
        for i in 0..3 {
            let msg = QueuedMessage::new(
                format!("uid-{}", i),
                "TransactionEvent",
                json!({"seqNo": i}),
                Some("txn-1".to_string()),
            );
            repo.push(&msg).await.unwrap();
        }

        let loaded = repo.load_all().await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].unique_id, "uid-0");
        assert_eq!(loaded[2].unique_id, "uid-2");
        assert_eq!(loaded[0].priority, QueuePriority::Transactional);
    }

    #[tokio::test]
    async fn acked_record_is_removed() {
        let repo = repo().await;
        let msg = QueuedMessage::new("uid-1", "Heartbeat", json!({}), None);
        repo.push(&msg).await.unwrap();
        repo.delete("uid-1").await.unwrap();
        assert!(repo.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn attempts_are_persisted() {
        let repo = repo().await;
        let msg = QueuedMessage::new("uid-1", "BootNotification", json!({}), None);
        repo.push(&msg).await.unwrap();
        repo.update_attempts("uid-1", 2).await.unwrap();
        assert_eq!(repo.load_all().await.unwrap()[0].attempts, 2);
    }

    #[tokio::test]
    async fn counts_per_transaction() {
        let repo = repo().await;
        for (uid, tx) in [("a", Some("txn-1")), ("b", Some("txn-1")), ("c", None)] {
            let msg = QueuedMessage::new(
                uid,
                "TransactionEvent",
                json!({}),
                tx.map(|s| s.to_string()),
            );
            repo.push(&msg).await.unwrap();
        }
        assert_eq!(repo.count_for_transaction("txn-1").await.unwrap(), 2);
        assert_eq!(repo.count_for_transaction("txn-2").await.unwrap(), 0);
    }
}
