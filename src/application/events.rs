//! Protocol-task event types
//!
//! Everything the protocol task reacts to arrives as a value on a
//! channel: hardware driver notifications, link events (via the
//! transport channel), and timer firings. No component stores a
//! callback into another.

use chrono::{DateTime, Utc};
use rust_ocpp::v2_0_1::datatypes::id_token_type::IdTokenType;
use rust_ocpp::v2_0_1::datatypes::meter_value_type::MeterValueType;
use rust_ocpp::v2_0_1::enumerations::authorization_status_enum_type::AuthorizationStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::charging_state_enum_type::ChargingStateEnumType;
use rust_ocpp::v2_0_1::enumerations::reason_enum_type::ReasonEnumType;
use tokio::sync::oneshot;

/// Identifies a timer routed through the protocol loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerId {
    Heartbeat,
    /// Re-send BootNotification after a Pending/Rejected interval.
    BootRetry,
    /// Clock-aligned MeterValues for the whole station.
    AlignedMeterValues,
    /// Transaction-relative sampling for one EVSE.
    SampledMeterValues { evse_id: i32 },
    /// Reconnect attempt; stale generations are ignored.
    Reconnect { generation: u64 },
    /// In-flight Call response deadline.
    CallTimeout { unique_id: String },
}

/// Notifications from the physical hardware driver.
#[derive(Debug)]
pub enum HardwareEvent {
    SessionStarted {
        evse_id: i32,
        connector_id: i32,
    },
    TransactionStarted {
        evse_id: i32,
        connector_id: i32,
        id_token: IdTokenType,
        timestamp: DateTime<Utc>,
        meter_start_wh: Option<f64>,
        reservation_id: Option<i32>,
        remote_start_id: Option<i32>,
    },
    MeterValue {
        evse_id: i32,
        meter_value: MeterValueType,
    },
    ChargingStateChanged {
        evse_id: i32,
        state: ChargingStateEnumType,
    },
    TransactionFinished {
        evse_id: i32,
        timestamp: DateTime<Utc>,
        meter_stop_wh: Option<f64>,
        reason: ReasonEnumType,
        id_token: Option<IdTokenType>,
    },
    SessionFinished {
        evse_id: i32,
        connector_id: i32,
    },
    NetworkDisconnected {
        configuration_slot: Option<i32>,
        interface: Option<String>,
    },
}

/// Everything the external API can ask of the protocol task.
#[derive(Debug)]
pub enum StationEvent {
    Hardware(HardwareEvent),
    /// Validate a token (cache, local list, then CSMS); the answer is
    /// delivered on the oneshot.
    Authorize {
        id_token: IdTokenType,
        respond_to: oneshot::Sender<AuthorizationStatusEnumType>,
    },
    /// Drain and shut down.
    Stop,
}
