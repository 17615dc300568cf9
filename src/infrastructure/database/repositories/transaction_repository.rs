//! SeaORM implementation of TransactionRepository

use async_trait::async_trait;
use chrono::Utc;
use rust_ocpp::v2_0_1::datatypes::id_token_type::IdTokenType;
use rust_ocpp::v2_0_1::datatypes::meter_value_type::MeterValueType;
use rust_ocpp::v2_0_1::enumerations::charging_state_enum_type::ChargingStateEnumType;
use rust_ocpp::v2_0_1::enumerations::reason_enum_type::ReasonEnumType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::debug;

use super::{db_err, enum_from_string, enum_to_string};
use crate::domain::transaction::{Transaction, TransactionRepository};
use crate::infrastructure::database::entities::{transaction, transaction_meter_value};
use crate::support::errors::{DomainError, DomainResult};

pub struct SeaOrmTransactionRepository {
    db: DatabaseConnection,
}

impl SeaOrmTransactionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn token_to_json(token: &Option<IdTokenType>) -> DomainResult<Option<String>> {
    token
        .as_ref()
        .map(|t| {
            serde_json::to_string(t)
                .map_err(|e| DomainError::Validation(format!("Serialize IdToken: {}", e)))
        })
        .transpose()
}

fn token_from_json(s: &Option<String>) -> Option<IdTokenType> {
    s.as_deref().and_then(|s| serde_json::from_str(s).ok())
}

fn model_to_domain(t: transaction::Model) -> Transaction {
    Transaction {
        transaction_id: t.transaction_id,
        evse_id: t.evse_id,
        connector_id: t.connector_id,
        start_time: t.start_time,
        seq_no: t.seq_no,
        charging_state: enum_from_string(&t.charging_state)
            .unwrap_or(ChargingStateEnumType::Idle),
        id_token: token_from_json(&t.id_token),
        group_id_token: token_from_json(&t.group_id_token),
        reservation_id: t.reservation_id,
        remote_start_id: t.remote_start_id,
        active_energy_import_start_value: t.start_energy_wh,
        stopped_reason: t.stopped_reason.as_deref().and_then(enum_from_string),
    }
}

// ── TransactionRepository impl ──────────────────────────────────

#[async_trait]
impl TransactionRepository for SeaOrmTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> DomainResult<()> {
        debug!(
            transaction_id = tx.transaction_id.as_str(),
            evse_id = tx.evse_id,
            "Persisting transaction"
        );

        let model = transaction::ActiveModel {
            transaction_id: Set(tx.transaction_id.clone()),
            evse_id: Set(tx.evse_id),
            connector_id: Set(tx.connector_id),
            start_time: Set(tx.start_time),
            seq_no: Set(tx.seq_no),
            charging_state: Set(enum_to_string(&tx.charging_state)),
            id_token: Set(token_to_json(&tx.id_token)?),
            group_id_token: Set(token_to_json(&tx.group_id_token)?),
            reservation_id: Set(tx.reservation_id),
            remote_start_id: Set(tx.remote_start_id),
            start_energy_wh: Set(tx.active_energy_import_start_value),
            stopped_reason: Set(tx.stopped_reason.as_ref().map(enum_to_string)),
        };
        model.insert(&self.db).await.map_err(db_err)?;
        Ok(())
    }

    async fn update_seq_no(&self, transaction_id: &str, seq_no: i32) -> DomainResult<()> {
        let active = transaction::ActiveModel {
            transaction_id: Set(transaction_id.to_string()),
            seq_no: Set(seq_no),
            ..Default::default()
        };
        active.update(&self.db).await.map_err(db_err)?;
        Ok(())
    }

    async fn update_charging_state(
        &self,
        transaction_id: &str,
        charging_state: ChargingStateEnumType,
    ) -> DomainResult<()> {
        let active = transaction::ActiveModel {
            transaction_id: Set(transaction_id.to_string()),
            charging_state: Set(enum_to_string(&charging_state)),
            ..Default::default()
        };
        active.update(&self.db).await.map_err(db_err)?;
        Ok(())
    }

    async fn update_stopped_reason(
        &self,
        transaction_id: &str,
        reason: ReasonEnumType,
    ) -> DomainResult<()> {
        let active = transaction::ActiveModel {
            transaction_id: Set(transaction_id.to_string()),
            stopped_reason: Set(Some(enum_to_string(&reason))),
            ..Default::default()
        };
        active.update(&self.db).await.map_err(db_err)?;
        Ok(())
    }

    async fn list_interrupted(&self) -> DomainResult<Vec<Transaction>> {
        let models = transaction::Entity::find()
            .order_by_asc(transaction::Column::StartTime)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        Ok(models.into_iter().map(model_to_domain).collect())
    }

    async fn delete(&self, transaction_id: &str) -> DomainResult<()> {
        transaction::Entity::delete_by_id(transaction_id)
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn append_meter_sample(
        &self,
        transaction_id: &str,
        meter_value: &MeterValueType,
    ) -> DomainResult<()> {
        let payload = serde_json::to_string(meter_value)
            .map_err(|e| DomainError::Validation(format!("Serialize MeterValue: {}", e)))?;

        let model = transaction_meter_value::ActiveModel {
            id: Default::default(),
            transaction_id: Set(transaction_id.to_string()),
            payload: Set(payload),
            created_at: Set(Utc::now()),
        };
        model.insert(&self.db).await.map_err(db_err)?;
        Ok(())
    }

    async fn list_meter_samples(
        &self,
        transaction_id: &str,
    ) -> DomainResult<Vec<MeterValueType>> {
        let rows = transaction_meter_value::Entity::find()
            .filter(transaction_meter_value::Column::TransactionId.eq(transaction_id))
            .order_by_asc(transaction_meter_value::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .map(|r| {
                serde_json::from_str(&r.payload)
                    .map_err(|e| DomainError::Validation(format!("Corrupt MeterValue: {}", e)))
            })
            .collect()
    }

    async fn clear_meter_samples(&self, transaction_id: &str) -> DomainResult<()> {
        transaction_meter_value::Entity::delete_many()
            .filter(transaction_meter_value::Column::TransactionId.eq(transaction_id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
