//! SeaORM implementation of AuthListRepository

use async_trait::async_trait;
use rust_ocpp::v2_0_1::datatypes::authorization_data::AuthorizationData;
use rust_ocpp::v2_0_1::datatypes::id_token_info_type::IdTokenInfoType;
use rust_ocpp::v2_0_1::datatypes::id_token_type::IdTokenType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, Set, TransactionTrait,
};
use tracing::debug;

use super::{db_err, enum_to_string};
use crate::domain::auth::AuthListRepository;
use crate::infrastructure::database::entities::{auth_list, auth_list_version};
use crate::support::errors::{DomainError, DomainResult};

pub struct SeaOrmAuthListRepository {
    db: DatabaseConnection,
}

impl SeaOrmAuthListRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn info_to_json(info: &IdTokenInfoType) -> DomainResult<String> {
    serde_json::to_string(info)
        .map_err(|e| DomainError::Validation(format!("Serialize IdTokenInfo: {}", e)))
}

fn info_from_json(s: &str) -> DomainResult<IdTokenInfoType> {
    serde_json::from_str(s)
        .map_err(|e| DomainError::Validation(format!("Corrupt IdTokenInfo: {}", e)))
}

async fn upsert_on<C: ConnectionTrait>(
    conn: &C,
    id_token: &IdTokenType,
    info: &IdTokenInfoType,
) -> DomainResult<()> {
    let token_type = enum_to_string(&id_token.kind);
    let existing = auth_list::Entity::find_by_id((id_token.id_token.clone(), token_type.clone()))
        .one(conn)
        .await
        .map_err(db_err)?;

    let model = auth_list::ActiveModel {
        id_token: Set(id_token.id_token.clone()),
        token_type: Set(token_type),
        id_token_info: Set(info_to_json(info)?),
    };

    if existing.is_some() {
        model.update(conn).await.map_err(db_err)?;
    } else {
        model.insert(conn).await.map_err(db_err)?;
    }
    Ok(())
}

async fn set_version_on<C: ConnectionTrait>(conn: &C, version: i32) -> DomainResult<()> {
    let existing = auth_list_version::Entity::find_by_id(0)
        .one(conn)
        .await
        .map_err(db_err)?;

    let model = auth_list_version::ActiveModel {
        id: Set(0),
        version: Set(version),
    };
    if existing.is_some() {
        model.update(conn).await.map_err(db_err)?;
    } else {
        model.insert(conn).await.map_err(db_err)?;
    }
    Ok(())
}

// ── AuthListRepository impl ─────────────────────────────────────

#[async_trait]
impl AuthListRepository for SeaOrmAuthListRepository {
    async fn version(&self) -> DomainResult<i32> {
        let row = auth_list_version::Entity::find_by_id(0)
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| r.version).unwrap_or(0))
    }

    async fn set_version(&self, version: i32) -> DomainResult<()> {
        set_version_on(&self.db, version).await
    }

    async fn upsert_entry(
        &self,
        id_token: &IdTokenType,
        info: &IdTokenInfoType,
    ) -> DomainResult<()> {
        upsert_on(&self.db, id_token, info).await
    }

    async fn delete_entry(&self, id_token: &IdTokenType) -> DomainResult<()> {
        auth_list::Entity::delete_by_id((
            id_token.id_token.clone(),
            enum_to_string(&id_token.kind),
        ))
        .exec(&self.db)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_entry(&self, id_token: &IdTokenType) -> DomainResult<Option<IdTokenInfoType>> {
        let row = auth_list::Entity::find_by_id((
            id_token.id_token.clone(),
            enum_to_string(&id_token.kind),
        ))
        .one(&self.db)
        .await
        .map_err(db_err)?;
        row.map(|r| info_from_json(&r.id_token_info)).transpose()
    }

    async fn apply_update(
        &self,
        version: i32,
        full: bool,
        entries: &[AuthorizationData],
    ) -> DomainResult<()> {
        debug!(version, full, count = entries.len(), "Applying local list update");

        let txn = self.db.begin().await.map_err(db_err)?;

        if full {
            auth_list::Entity::delete_many()
                .exec(&txn)
                .await
                .map_err(db_err)?;
        }

        for entry in entries {
            match &entry.id_token_info {
                Some(info) => upsert_on(&txn, &entry.id_token, info).await?,
                // Differential update without info means: remove the entry.
                None => {
                    auth_list::Entity::delete_many()
                        .filter(auth_list::Column::IdToken.eq(entry.id_token.id_token.clone()))
                        .filter(
                            auth_list::Column::TokenType.eq(enum_to_string(&entry.id_token.kind)),
                        )
                        .exec(&txn)
                        .await
                        .map_err(db_err)?;
                }
            }
        }

        set_version_on(&txn, version).await?;
        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn clear(&self) -> DomainResult<()> {
        let txn = self.db.begin().await.map_err(db_err)?;
        auth_list::Entity::delete_many()
            .exec(&txn)
            .await
            .map_err(db_err)?;
        set_version_on(&txn, 0).await?;
        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn count(&self) -> DomainResult<u64> {
        auth_list::Entity::find()
            .count(&self.db)
            .await
            .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{init_database, DatabaseConfig};
    use rust_ocpp::v2_0_1::enumerations::authorization_status_enum_type::AuthorizationStatusEnumType;
    use rust_ocpp::v2_0_1::enumerations::id_token_enum_type::IdTokenEnumType;

    async fn repo() -> SeaOrmAuthListRepository {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        SeaOrmAuthListRepository::new(db)
    }

    fn token(value: &str) -> IdTokenType {
        IdTokenType {
            id_token: value.to_string(),
            kind: IdTokenEnumType::ISO14443,
            additional_info: None,
        }
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
    async fn version_defaults_to_zero() {
        let repo = repo().await;
        assert_eq!(repo.version().await.unwrap(), 0);
        repo.set_version(7).await.unwrap();
        assert_eq!(repo.version().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn full_update_replaces_list() {
        let repo = repo().await;
        repo.upsert_entry(&token("OLD"), &accepted()).await.unwrap();

        let entries = vec![AuthorizationData {
            id_token: token("NEW"),
            id_token_info: Some(accepted()),
        }];
        repo.apply_update(3, true, &entries).await.unwrap();

        assert!(repo.get_entry(&token("OLD")).await.unwrap().is_none());
        assert!(repo.get_entry(&token("NEW")).await.unwrap().is_some());
        assert_eq!(repo.version().await.unwrap(), 3);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn differential_update_deletes_entries_without_info() {
        let repo = repo().await;
        repo.upsert_entry(&token("KEEP"), &accepted()).await.unwrap();
        repo.upsert_entry(&token("DROP"), &accepted()).await.unwrap();

        let entries = vec![AuthorizationData {
            id_token: token("DROP"),
            id_token_info: None,
        }];
        repo.apply_update(4, false, &entries).await.unwrap();

        assert!(repo.get_entry(&token("KEEP")).await.unwrap().is_some());
        assert!(repo.get_entry(&token("DROP")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_resets_version() {
        let repo = repo().await;
        repo.upsert_entry(&token("A"), &accepted()).await.unwrap();
        repo.set_version(9).await.unwrap();
        repo.clear().await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
        assert_eq!(repo.version().await.unwrap(), 0);
    }
}
