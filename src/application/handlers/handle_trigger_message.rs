//! TriggerMessage handler

use rust_ocpp::v2_0_1::enumerations::message_trigger_enum_type::MessageTriggerEnumType;
use rust_ocpp::v2_0_1::messages::trigger_message::TriggerMessageRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;

pub async fn handle_trigger_message(cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let req: TriggerMessageRequest = parse_request(payload)?;
    info!(requested = ?req.requested_message, evse = ?req.evse, "TriggerMessage");

    match req.requested_message {
        MessageTriggerEnumType::Heartbeat => {
            cp.enqueue_call("Heartbeat", json!({}), None, None).await;
            Ok(json!({ "status": "Accepted" }))
        }
        MessageTriggerEnumType::StatusNotification => {
            match req.evse.as_ref() {
                Some(evse) => {
                    let evse_id = evse.id;
                    let connector_id = evse.connector_id.unwrap_or(1);
                    let status = cp.effective_connector_status(evse_id, connector_id).await;
                    cp.status_notification_req(evse_id, connector_id, status).await;
                }
                None => cp.notify_all_connector_status().await,
            }
            Ok(json!({ "status": "Accepted" }))
        }
        MessageTriggerEnumType::MeterValues => {
            // Nothing buffered outside a transaction; the next sampled
            // tick carries fresh values.
            Ok(json!({ "status": "Accepted" }))
        }
        MessageTriggerEnumType::BootNotification => {
            // Only legal while not yet accepted.
            if cp.registration_status
                == rust_ocpp::v2_0_1::enumerations::registration_status_enum_type::RegistrationStatusEnumType::Accepted
            {
                Ok(json!({ "status": "Rejected" }))
            } else {
                cp.timers.arm(
                    crate::application::events::TimerId::BootRetry,
                    std::time::Duration::ZERO,
                );
                Ok(json!({ "status": "Accepted" }))
            }
        }
        MessageTriggerEnumType::TransactionEvent => Ok(json!({ "status": "Accepted" })),
        _ => Ok(json!({ "status": "NotImplemented" })),
    }
}
