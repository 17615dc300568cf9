//! SeaORM implementation of AuthCacheRepository

use async_trait::async_trait;
use chrono::Utc;
use rust_ocpp::v2_0_1::datatypes::id_token_info_type::IdTokenInfoType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use tracing::debug;

use super::db_err;
use crate::domain::auth::{AuthCacheRepository, CachedIdToken};
use crate::infrastructure::database::entities::auth_cache;
use crate::support::errors::{DomainError, DomainResult};

pub struct SeaOrmAuthCacheRepository {
    db: DatabaseConnection,
}

impl SeaOrmAuthCacheRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn model_to_domain(m: auth_cache::Model) -> DomainResult<CachedIdToken> {
    let info: IdTokenInfoType = serde_json::from_str(&m.id_token_info)
        .map_err(|e| DomainError::Validation(format!("Corrupt IdTokenInfo: {}", e)))?;
    Ok(CachedIdToken {
        token_hash: m.id_token_hash,
        info,
        last_used: m.last_used,
    })
}

// ── AuthCacheRepository impl ────────────────────────────────────

#[async_trait]
impl AuthCacheRepository for SeaOrmAuthCacheRepository {
    async fn insert(&self, token_hash: &str, info: &IdTokenInfoType) -> DomainResult<()> {
        debug!(token_hash, "Caching authorization entry");

        let info_json = serde_json::to_string(info)
            .map_err(|e| DomainError::Validation(format!("Serialize IdTokenInfo: {}", e)))?;

        let existing = auth_cache::Entity::find_by_id(token_hash)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        let model = auth_cache::ActiveModel {
            id_token_hash: Set(token_hash.to_string()),
            id_token_info: Set(info_json),
            last_used: Set(Utc::now()),
        };

        if existing.is_some() {
            model.update(&self.db).await.map_err(db_err)?;
        } else {
            model.insert(&self.db).await.map_err(db_err)?;
        }
        Ok(())
    }

    async fn touch(&self, token_hash: &str) -> DomainResult<()> {
        let Some(existing) = auth_cache::Entity::find_by_id(token_hash)
            .one(&self.db)
            .await
            .map_err(db_err)?
        else {
            return Ok(());
        };

        let mut active: auth_cache::ActiveModel = existing.into();
        active.last_used = Set(Utc::now());
        active.update(&self.db).await.map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, token_hash: &str) -> DomainResult<Option<CachedIdToken>> {
        let model = auth_cache::Entity::find_by_id(token_hash)
            .one(&self.db)
            .await
            .map_err(db_err)?;
        model.map(model_to_domain).transpose()
    }

    async fn delete(&self, token_hash: &str) -> DomainResult<()> {
        auth_cache::Entity::delete_by_id(token_hash)
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_expired(&self, cache_lifetime_s: Option<u64>) -> DomainResult<u64> {
        let now = Utc::now();
        let models = auth_cache::Entity::find()
            .all(&self.db)
            .await
            .map_err(db_err)?;

        let mut removed = 0u64;
        for model in models {
            // Rows whose info no longer parses are expired by definition.
            let expired = match model_to_domain(model.clone()) {
                Ok(entry) => entry.is_expired(now, cache_lifetime_s),
                Err(_) => true,
            };
            if expired {
                auth_cache::Entity::delete_by_id(&model.id_token_hash)
                    .exec(&self.db)
                    .await
                    .map_err(db_err)?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "Expired auth cache entries deleted");
        }
        Ok(removed)
    }

    async fn delete_oldest(&self, n: u64) -> DomainResult<u64> {
        let victims = auth_cache::Entity::find()
            .order_by_asc(auth_cache::Column::LastUsed)
            .limit(n)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        let mut removed = 0u64;
        for victim in victims {
            auth_cache::Entity::delete_by_id(&victim.id_token_hash)
                .exec(&self.db)
                .await
                .map_err(db_err)?;
            removed += 1;
        }
        Ok(removed)
    }

    async fn clear(&self) -> DomainResult<()> {
        auth_cache::Entity::delete_many()
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn binary_size(&self) -> DomainResult<u64> {
        let models = auth_cache::Entity::find()
            .all(&self.db)
            .await
            .map_err(db_err)?;
        Ok(models
            .iter()
            .map(|m| (m.id_token_hash.len() + m.id_token_info.len()) as u64)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{init_database, DatabaseConfig};
    use rust_ocpp::v2_0_1::enumerations::authorization_status_enum_type::AuthorizationStatusEnumType;

    async fn repo() -> SeaOrmAuthCacheRepository {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        SeaOrmAuthCacheRepository::new(db)
    }

    fn accepted() -> IdTokenInfoType {
        IdTokenInfoType {
            status: AuthorizationStatusEnumType::Accepted,
            cache_expiry_date_time: None,
            charging_priority: None,
            language1: None,
            evse_id: None,
            language2: None,
            group_id_token: None,
            personal_message: None,
        }
    }

    #[tokio::test]
    async fn insert_get_delete() {
        let repo = repo().await;
        repo.insert("hash1", &accepted()).await.unwrap();

        let entry = repo.get("hash1").await.unwrap().unwrap();
        assert_eq!(entry.token_hash, "hash1");
        assert_eq!(entry.info.status, AuthorizationStatusEnumType::Accepted);

        repo.delete("hash1").await.unwrap();
        assert!(repo.get("hash1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_replaces_existing() {
        let repo = repo().await;
        repo.insert("hash1", &accepted()).await.unwrap();

        let mut blocked = accepted();
        blocked.status = AuthorizationStatusEnumType::Blocked;
        repo.insert("hash1", &blocked).await.unwrap();

        let entry = repo.get("hash1").await.unwrap().unwrap();
        assert_eq!(entry.info.status, AuthorizationStatusEnumType::Blocked);
    }

    #[tokio::test]
    async fn lifetime_expiry_keeps_fresh_entries() {
        let repo = repo().await;

        // token1 last used 20s ago, token2 10s ago; lifetime 15s.
        repo.insert("token1", &accepted()).await.unwrap();
        repo.insert("token2", &accepted()).await.unwrap();

        let old = Utc::now() - chrono::Duration::seconds(20);
        let newer = Utc::now() - chrono::Duration::seconds(10);
        for (hash, when) in [("token1", old), ("token2", newer)] {
            let model = auth_cache::Entity::find_by_id(hash)
                .one(&repo.db)
                .await
                .unwrap()
                .unwrap();
            let mut active: auth_cache::ActiveModel = model.into();
            active.last_used = Set(when);
            active.update(&repo.db).await.unwrap();
        }

        let removed = repo.delete_expired(Some(15)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get("token1").await.unwrap().is_none());
        assert!(repo.get("token2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_oldest_is_lru_ordered() {
        let repo = repo().await;
        for (i, hash) in ["a", "b", "c"].iter().enumerate() {
            repo.insert(hash, &accepted()).await.unwrap();
            let model = auth_cache::Entity::find_by_id(*hash)
                .one(&repo.db)
                .await
                .unwrap()
                .unwrap();
            let mut active: auth_cache::ActiveModel = model.into();
            active.last_used = Set(Utc::now() + chrono::Duration::seconds(i as i64));
            active.update(&repo.db).await.unwrap();
        }

        let removed = repo.delete_oldest(2).await.unwrap();
        assert_eq!(removed, 2);
        assert!(repo.get("a").await.unwrap().is_none());
        assert!(repo.get("b").await.unwrap().is_none());
        assert!(repo.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn binary_size_grows_with_entries() {
        let repo = repo().await;
        let empty = repo.binary_size().await.unwrap();
        repo.insert("hash1", &accepted()).await.unwrap();
        assert!(repo.binary_size().await.unwrap() > empty);
    }
}
