//! SeaORM implementation of ChargingProfileRepository

use async_trait::async_trait;
use rust_ocpp::v2_0_1::enumerations::charging_profile_kind_enum_type::ChargingProfileKindEnumType;
use rust_ocpp::v2_0_1::enumerations::charging_profile_purpose_enum_type::ChargingProfilePurposeEnumType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::debug;

use super::{db_err, enum_from_string, enum_to_string};
use crate::domain::charging_profile::{
    ChargingProfileRepository, ClearProfileCriteria, StoredChargingProfile,
};
use crate::infrastructure::database::entities::charging_profile;
use crate::support::errors::{DomainError, DomainResult};

pub struct SeaOrmChargingProfileRepository {
    db: DatabaseConnection,
}

impl SeaOrmChargingProfileRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn model_to_domain(m: charging_profile::Model) -> DomainResult<StoredChargingProfile> {
    Ok(StoredChargingProfile {
        profile_id: m.profile_id,
        evse_id: m.evse_id,
        stack_level: m.stack_level,
        purpose: enum_from_string(&m.purpose)
            .unwrap_or(ChargingProfilePurposeEnumType::TxDefaultProfile),
        kind: enum_from_string(&m.kind).unwrap_or(ChargingProfileKindEnumType::Absolute),
        recurrency_kind: m.recurrency_kind.as_deref().and_then(enum_from_string),
        valid_from: m.valid_from,
        valid_to: m.valid_to,
        transaction_id: m.transaction_id,
        schedule: serde_json::from_str(&m.schedule_json)
            .map_err(|e| DomainError::Validation(format!("Corrupt schedule JSON: {}", e)))?,
        installed_at: m.installed_at,
    })
}

fn replaces_same_slot(purpose: &ChargingProfilePurposeEnumType) -> bool {
    matches!(
        purpose,
        ChargingProfilePurposeEnumType::TxDefaultProfile
            | ChargingProfilePurposeEnumType::ChargingStationMaxProfile
    )
}

// ── ChargingProfileRepository impl ─────────────────────────────

#[async_trait]
impl ChargingProfileRepository for SeaOrmChargingProfileRepository {
    async fn upsert(&self, profile: &StoredChargingProfile) -> DomainResult<()> {
        debug!(
            profile_id = profile.profile_id,
            evse_id = profile.evse_id,
            stack_level = profile.stack_level,
            purpose = ?profile.purpose,
            "Installing charging profile"
        );

        let schedule_json = serde_json::to_string(&profile.schedule)
            .map_err(|e| DomainError::Validation(format!("Serialize schedule: {}", e)))?;

        let txn = self.db.begin().await.map_err(db_err)?;

        // Same profile id always replaces.
        charging_profile::Entity::delete_many()
            .filter(charging_profile::Column::ProfileId.eq(profile.profile_id))
            .exec(&txn)
            .await
            .map_err(db_err)?;

        // TxDefault / ChargingStationMax additionally evict the previous
        // occupant of their (purpose, stack_level, evse) slot.
        if replaces_same_slot(&profile.purpose) {
            charging_profile::Entity::delete_many()
                .filter(charging_profile::Column::Purpose.eq(enum_to_string(&profile.purpose)))
                .filter(charging_profile::Column::StackLevel.eq(profile.stack_level))
                .filter(charging_profile::Column::EvseId.eq(profile.evse_id))
                .exec(&txn)
                .await
                .map_err(db_err)?;
        }

        let model = charging_profile::ActiveModel {
            id: Default::default(),
            profile_id: Set(profile.profile_id),
            evse_id: Set(profile.evse_id),
            stack_level: Set(profile.stack_level),
            purpose: Set(enum_to_string(&profile.purpose)),
            kind: Set(enum_to_string(&profile.kind)),
            recurrency_kind: Set(profile.recurrency_kind.as_ref().map(enum_to_string)),
            valid_from: Set(profile.valid_from),
            valid_to: Set(profile.valid_to),
            transaction_id: Set(profile.transaction_id.clone()),
            schedule_json: Set(schedule_json),
            installed_at: Set(profile.installed_at),
        };
        model.insert(&txn).await.map_err(db_err)?;

        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn list_for_evse(&self, evse_id: i32) -> DomainResult<Vec<StoredChargingProfile>> {
        let models = charging_profile::Entity::find()
            .filter(
                Condition::any()
                    .add(charging_profile::Column::EvseId.eq(evse_id))
                    .add(charging_profile::Column::EvseId.eq(0)),
            )
            .order_by_asc(charging_profile::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        models.into_iter().map(model_to_domain).collect()
    }

    async fn list_all(&self) -> DomainResult<Vec<StoredChargingProfile>> {
        let models = charging_profile::Entity::find()
            .order_by_asc(charging_profile::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        models.into_iter().map(model_to_domain).collect()
    }

    async fn clear_matching(&self, criteria: &ClearProfileCriteria) -> DomainResult<u64> {
        let mut query = charging_profile::Entity::delete_many();
        if let Some(profile_id) = criteria.profile_id {
            query = query.filter(charging_profile::Column::ProfileId.eq(profile_id));
        }
        if let Some(evse_id) = criteria.evse_id {
            query = query.filter(charging_profile::Column::EvseId.eq(evse_id));
        }
        if let Some(purpose) = &criteria.purpose {
            query = query.filter(charging_profile::Column::Purpose.eq(enum_to_string(purpose)));
        }
        if let Some(stack_level) = criteria.stack_level {
            query = query.filter(charging_profile::Column::StackLevel.eq(stack_level));
        }

        let result = query.exec(&self.db).await.map_err(db_err)?;
        Ok(result.rows_affected)
    }

    async fn delete_for_transaction(&self, transaction_id: &str) -> DomainResult<u64> {
        let result = charging_profile::Entity::delete_many()
            .filter(charging_profile::Column::TransactionId.eq(transaction_id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    async fn count(&self) -> DomainResult<u64> {
        charging_profile::Entity::find()
            .count(&self.db)
            .await
            .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::charging_profile::{ChargingScheduleSpec, SchedulePeriodSpec};
    use crate::infrastructure::database::{init_database, DatabaseConfig};
    use chrono::Utc;
    use rust_ocpp::v2_0_1::enumerations::charging_rate_unit_enum_type::ChargingRateUnitEnumType;

    async fn repo() -> SeaOrmChargingProfileRepository {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        SeaOrmChargingProfileRepository::new(db)
    }

    fn profile(profile_id: i32, evse_id: i32, stack_level: i32) -> StoredChargingProfile {
        StoredChargingProfile {
            profile_id,
            evse_id,
            stack_level,
            purpose: ChargingProfilePurposeEnumType::TxDefaultProfile,
            kind: ChargingProfileKindEnumType::Absolute,
            recurrency_kind: None,
            valid_from: None,
            valid_to: None,
            transaction_id: None,
            schedule: ChargingScheduleSpec {
                charging_rate_unit: ChargingRateUnitEnumType::W,
                duration: None,
                start_schedule: None,
                min_charging_rate: None,
                charging_schedule_period: vec![SchedulePeriodSpec {
                    start_period: 0,
                    limit: 11000.0,
                    number_phases: None,
                }],
            },
            installed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn same_slot_replaces_for_tx_default() {
        let repo = repo().await;
        repo.upsert(&profile(1, 1, 2)).await.unwrap();
        // Different profile id, same (purpose, stack, evse) slot.
        repo.upsert(&profile(2, 1, 2)).await.unwrap();

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].profile_id, 2);
    }

    #[tokio::test]
    async fn tx_profiles_may_share_slot() {
        let repo = repo().await;
        let mut a = profile(1, 1, 2);
        a.purpose = ChargingProfilePurposeEnumType::TxProfile;
        a.transaction_id = Some("txn-1".into());
        let mut b = profile(2, 1, 2);
        b.purpose = ChargingProfilePurposeEnumType::TxProfile;
        b.transaction_id = Some("txn-2".into());

        repo.upsert(&a).await.unwrap();
        repo.upsert(&b).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn list_for_evse_includes_station_wide() {
        let repo = repo().await;
        repo.upsert(&profile(1, 1, 0)).await.unwrap();
        repo.upsert(&profile(2, 2, 0)).await.unwrap();
        let mut station = profile(3, 0, 1);
        station.purpose = ChargingProfilePurposeEnumType::ChargingStationMaxProfile;
        repo.upsert(&station).await.unwrap();

        let for_evse_1 = repo.list_for_evse(1).await.unwrap();
        let ids: Vec<i32> = for_evse_1.iter().map(|p| p.profile_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn clear_matching_by_purpose_and_evse() {
        let repo = repo().await;
        repo.upsert(&profile(1, 1, 0)).await.unwrap();
        repo.upsert(&profile(2, 1, 1)).await.unwrap();
        repo.upsert(&profile(3, 2, 0)).await.unwrap();

        let removed = repo
            .clear_matching(&ClearProfileCriteria {
                profile_id: None,
                evse_id: Some(1),
                purpose: Some(ChargingProfilePurposeEnumType::TxDefaultProfile),
                stack_level: None,
            })
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn tx_profiles_die_with_their_transaction() {
        let repo = repo().await;
        let mut p = profile(9, 1, 3);
        p.purpose = ChargingProfilePurposeEnumType::TxProfile;
        p.transaction_id = Some("txn-9".into());
        repo.upsert(&p).await.unwrap();

        assert_eq!(repo.delete_for_transaction("txn-9").await.unwrap(), 1);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn schedule_roundtrips_through_json() {
        let repo = repo().await;
        repo.upsert(&profile(1, 1, 0)).await.unwrap();
        let restored = repo.list_all().await.unwrap().remove(0);
        assert_eq!(restored.schedule.charging_schedule_period.len(), 1);
        assert_eq!(restored.schedule.charging_schedule_period[0].limit, 11000.0);
    }
}
