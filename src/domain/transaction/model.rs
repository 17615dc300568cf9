//! Transaction domain entity

use chrono::{DateTime, Utc};
use rust_ocpp::v2_0_1::datatypes::id_token_type::IdTokenType;
use rust_ocpp::v2_0_1::datatypes::transaction_type::TransactionType;
use rust_ocpp::v2_0_1::enumerations::charging_state_enum_type::ChargingStateEnumType;
use rust_ocpp::v2_0_1::enumerations::reason_enum_type::ReasonEnumType;

/// A charging transaction bound to one EVSE.
///
/// `seq_no` is the next sequence number to emit; it is persisted before
/// the matching TransactionEvent is enqueued, so a crash can duplicate
/// at most one number at the CSMS (which deduplicates) and never skips.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// CSMS-unique opaque id.
    pub transaction_id: String,
    pub evse_id: i32,
    pub connector_id: i32,
    pub start_time: DateTime<Utc>,
    pub seq_no: i32,
    pub charging_state: ChargingStateEnumType,
    pub id_token: Option<IdTokenType>,
    pub group_id_token: Option<IdTokenType>,
    pub reservation_id: Option<i32>,
    pub remote_start_id: Option<i32>,
    /// Energy.Active.Import.Register reading at transaction start (Wh).
    pub active_energy_import_start_value: Option<f64>,
    /// Set once the transaction has ended.
    pub stopped_reason: Option<ReasonEnumType>,
}

impl Transaction {
    /// The wire-shape transaction info carried in TransactionEvent.
    pub fn to_transaction_type(&self) -> TransactionType {
        TransactionType {
            transaction_id: self.transaction_id.clone(),
            charging_state: Some(self.charging_state.clone()),
            time_spent_charging: None,
            stopped_reason: self.stopped_reason.clone(),
            remote_start_id: self.remote_start_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_carries_state_and_reason() {
        let tx = Transaction {
            transaction_id: "txn-42".into(),
            evse_id: 1,
            connector_id: 1,
            start_time: Utc::now(),
            seq_no: 3,
            charging_state: ChargingStateEnumType::Charging,
            id_token: None,
            group_id_token: None,
            reservation_id: None,
            remote_start_id: Some(9),
            active_energy_import_start_value: Some(100.0),
            stopped_reason: Some(ReasonEnumType::EVDisconnected),
        };
        let wire = tx.to_transaction_type();
        assert_eq!(wire.transaction_id, "txn-42");
        assert_eq!(wire.charging_state, Some(ChargingStateEnumType::Charging));
        assert_eq!(wire.stopped_reason, Some(ReasonEnumType::EVDisconnected));
        assert_eq!(wire.remote_start_id, Some(9));
    }
}
