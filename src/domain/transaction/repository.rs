//! Transaction persistence trait

use async_trait::async_trait;
use rust_ocpp::v2_0_1::datatypes::meter_value_type::MeterValueType;
use rust_ocpp::v2_0_1::enumerations::charging_state_enum_type::ChargingStateEnumType;
use rust_ocpp::v2_0_1::enumerations::reason_enum_type::ReasonEnumType;

use super::model::Transaction;
use crate::support::errors::DomainResult;

/// TRANSACTIONS + TRANSACTION_METER_VALUES tables.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> DomainResult<()>;

    /// Persist the sequence counter. Called from `get_seq_no` before
    /// the corresponding event is enqueued.
    async fn update_seq_no(&self, transaction_id: &str, seq_no: i32) -> DomainResult<()>;

    async fn update_charging_state(
        &self,
        transaction_id: &str,
        charging_state: ChargingStateEnumType,
    ) -> DomainResult<()>;

    async fn update_stopped_reason(
        &self,
        transaction_id: &str,
        reason: ReasonEnumType,
    ) -> DomainResult<()>;

    /// Transactions still present at startup: they were interrupted by
    /// a crash or power loss and must be replayed.
    async fn list_interrupted(&self) -> DomainResult<Vec<Transaction>>;

    /// Remove a transaction once its Ended event is acknowledged.
    async fn delete(&self, transaction_id: &str) -> DomainResult<()>;

    // Meter samples

    async fn append_meter_sample(
        &self,
        transaction_id: &str,
        meter_value: &MeterValueType,
    ) -> DomainResult<()>;

    async fn list_meter_samples(&self, transaction_id: &str)
        -> DomainResult<Vec<MeterValueType>>;

    async fn clear_meter_samples(&self, transaction_id: &str) -> DomainResult<()>;
}
