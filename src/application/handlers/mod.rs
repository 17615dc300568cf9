//! Inbound call handlers
//!
//! One module per CSMS-initiated action. Every handler validates the
//! payload, mutates state through the facade, and returns the
//! CallResult payload (or the CallError to send instead).

pub mod handle_change_availability;
pub mod handle_clear_cache;
pub mod handle_clear_charging_profile;
pub mod handle_clear_variable_monitoring;
pub mod handle_data_transfer;
pub mod handle_get_base_report;
pub mod handle_get_charging_profiles;
pub mod handle_get_composite_schedule;
pub mod handle_get_local_list_version;
pub mod handle_get_log;
pub mod handle_get_monitoring_report;
pub mod handle_get_report;
pub mod handle_get_transaction_status;
pub mod handle_get_variables;
pub mod handle_request_start_transaction;
pub mod handle_request_stop_transaction;
pub mod handle_reset;
pub mod handle_send_local_list;
pub mod handle_set_charging_profile;
pub mod handle_set_variable_monitoring;
pub mod handle_set_variables;
pub mod handle_trigger_message;
pub mod handle_unlock_connector;
pub mod handle_update_firmware;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::application::charge_point::ChargePoint;
use crate::support::ocpp_frame::OcppErrorCode;

/// CallResult payload, or the CallError code + description to reply.
pub type HandlerResult = Result<Value, (OcppErrorCode, String)>;

pub(crate) fn parse_request<T: DeserializeOwned>(
    payload: &Value,
) -> Result<T, (OcppErrorCode, String)> {
    serde_json::from_value(payload.clone())
        .map_err(|e| (OcppErrorCode::FormationViolation, e.to_string()))
}

pub(crate) fn to_response<T: Serialize>(response: &T) -> HandlerResult {
    serde_json::to_value(response).map_err(|e| (OcppErrorCode::InternalError, e.to_string()))
}

/// Route an inbound Call by action name.
pub async fn dispatch(cp: &mut ChargePoint, action: &str, payload: &Value) -> HandlerResult {
    match action {
        "ChangeAvailability" => {
            handle_change_availability::handle_change_availability(cp, payload).await
        }
        "ClearCache" => handle_clear_cache::handle_clear_cache(cp, payload).await,
        "ClearChargingProfile" => {
            handle_clear_charging_profile::handle_clear_charging_profile(cp, payload).await
        }
        "ClearVariableMonitoring" => {
            handle_clear_variable_monitoring::handle_clear_variable_monitoring(cp, payload).await
        }
        "DataTransfer" => handle_data_transfer::handle_data_transfer(cp, payload).await,
        "GetBaseReport" => handle_get_base_report::handle_get_base_report(cp, payload).await,
        "GetChargingProfiles" => {
            handle_get_charging_profiles::handle_get_charging_profiles(cp, payload).await
        }
        "GetCompositeSchedule" => {
            handle_get_composite_schedule::handle_get_composite_schedule(cp, payload).await
        }
        "GetLocalListVersion" => {
            handle_get_local_list_version::handle_get_local_list_version(cp, payload).await
        }
        "GetLog" => handle_get_log::handle_get_log(cp, payload).await,
        "GetMonitoringReport" => {
            handle_get_monitoring_report::handle_get_monitoring_report(cp, payload).await
        }
        "GetReport" => handle_get_report::handle_get_report(cp, payload).await,
        "GetTransactionStatus" => {
            handle_get_transaction_status::handle_get_transaction_status(cp, payload).await
        }
        "GetVariables" => handle_get_variables::handle_get_variables(cp, payload).await,
        "RequestStartTransaction" => {
            handle_request_start_transaction::handle_request_start_transaction(cp, payload).await
        }
        "RequestStopTransaction" => {
            handle_request_stop_transaction::handle_request_stop_transaction(cp, payload).await
        }
        "Reset" => handle_reset::handle_reset(cp, payload).await,
        "SendLocalList" => handle_send_local_list::handle_send_local_list(cp, payload).await,
        "SetChargingProfile" => {
            handle_set_charging_profile::handle_set_charging_profile(cp, payload).await
        }
        "SetVariableMonitoring" => {
            handle_set_variable_monitoring::handle_set_variable_monitoring(cp, payload).await
        }
        "SetVariables" => handle_set_variables::handle_set_variables(cp, payload).await,
        "TriggerMessage" => handle_trigger_message::handle_trigger_message(cp, payload).await,
        "UnlockConnector" => handle_unlock_connector::handle_unlock_connector(cp, payload).await,
        "UpdateFirmware" => handle_update_firmware::handle_update_firmware(cp, payload).await,
        other => Err((
            OcppErrorCode::NotImplemented,
            format!("Action '{}' is not implemented", other),
        )),
    }
}
