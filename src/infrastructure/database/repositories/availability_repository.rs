//! SeaORM implementation of AvailabilityRepository

use async_trait::async_trait;
use rust_ocpp::v2_0_1::enumerations::operational_status_enum_type::OperationalStatusEnumType;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tracing::debug;

use super::db_err;
use crate::domain::availability::{AvailabilityRepository, ComponentScope};
use crate::infrastructure::database::entities::availability;
use crate::support::errors::DomainResult;

pub struct SeaOrmAvailabilityRepository {
    db: DatabaseConnection,
}

impl SeaOrmAvailabilityRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn status_to_string(status: &OperationalStatusEnumType) -> String {
    match status {
        OperationalStatusEnumType::Operative => "Operative",
        OperationalStatusEnumType::Inoperative => "Inoperative",
    }
    .to_string()
}

fn string_to_status(s: &str) -> OperationalStatusEnumType {
    match s {
        "Inoperative" => OperationalStatusEnumType::Inoperative,
        _ => OperationalStatusEnumType::Operative,
    }
}

// ── AvailabilityRepository impl ─────────────────────────────────

#[async_trait]
impl AvailabilityRepository for SeaOrmAvailabilityRepository {
    async fn insert(
        &self,
        scope: ComponentScope,
        status: OperationalStatusEnumType,
        replace: bool,
    ) -> DomainResult<()> {
        let (evse_id, connector_id) = scope.ids();
        let existing = availability::Entity::find_by_id((evse_id, connector_id))
            .one(&self.db)
            .await
            .map_err(db_err)?;

        match existing {
            Some(_) if !replace => Ok(()),
            Some(_) => {
                debug!(evse_id, connector_id, status = ?status, "Replacing availability");
                let model = availability::ActiveModel {
                    evse_id: Set(evse_id),
                    connector_id: Set(connector_id),
                    status: Set(status_to_string(&status)),
                };
                model.update(&self.db).await.map_err(db_err)?;
                Ok(())
            }
            None => {
                let model = availability::ActiveModel {
                    evse_id: Set(evse_id),
                    connector_id: Set(connector_id),
                    status: Set(status_to_string(&status)),
                };
                model.insert(&self.db).await.map_err(db_err)?;
                Ok(())
            }
        }
    }

    async fn get(&self, scope: ComponentScope) -> DomainResult<OperationalStatusEnumType> {
        let (evse_id, connector_id) = scope.ids();
        let row = availability::Entity::find_by_id((evse_id, connector_id))
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(row
            .map(|r| string_to_status(&r.status))
            .unwrap_or(OperationalStatusEnumType::Operative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{init_database, DatabaseConfig};

    async fn repo() -> SeaOrmAvailabilityRepository {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        SeaOrmAvailabilityRepository::new(db)
    }

    #[tokio::test]
    async fn unset_scope_defaults_to_operative() {
        let repo = repo().await;
        let status = repo.get(ComponentScope::Connector(1, 1)).await.unwrap();
        assert_eq!(status, OperationalStatusEnumType::Operative);
    }

    #[tokio::test]
    async fn replace_overwrites() {
        let repo = repo().await;
        repo.insert(
            ComponentScope::Evse(1),
            OperationalStatusEnumType::Inoperative,
            true,
        )
        .await
        .unwrap();
        repo.insert(
            ComponentScope::Evse(1),
            OperationalStatusEnumType::Operative,
            true,
        )
        .await
        .unwrap();
        assert_eq!(
            repo.get(ComponentScope::Evse(1)).await.unwrap(),
            OperationalStatusEnumType::Operative
        );
    }

    #[tokio::test]
    async fn non_replace_keeps_persisted_default() {
        let repo = repo().await;
        repo.insert(
            ComponentScope::Station,
            OperationalStatusEnumType::Inoperative,
            true,
        )
        .await
        .unwrap();
        // Boot-time seed must not clobber the operator's default.
        repo.insert(
            ComponentScope::Station,
            OperationalStatusEnumType::Operative,
            false,
        )
        .await
        .unwrap();
        assert_eq!(
            repo.get(ComponentScope::Station).await.unwrap(),
            OperationalStatusEnumType::Inoperative
        );
    }
}
