//! ChangeAvailability handler
//!
//! Persists the new operational status as the sticky default and
//! reports the visible connector states that follow from it.

use rust_ocpp::v2_0_1::messages::change_availability::ChangeAvailabilityRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;
use crate::domain::availability::ComponentScope;
use crate::support::ocpp_frame::OcppErrorCode;

pub async fn handle_change_availability(cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let req: ChangeAvailabilityRequest = parse_request(payload)?;

    let scope = match &req.evse {
        None => ComponentScope::Station,
        Some(evse) => match evse.connector_id {
            None => ComponentScope::Evse(evse.id),
            Some(connector_id) => ComponentScope::Connector(evse.id, connector_id),
        },
    };
    info!(?scope, status = ?req.operational_status, "ChangeAvailability");

    cp.store
        .availability()
        .insert(scope, req.operational_status.clone(), true)
        .await
        .map_err(|e| (OcppErrorCode::InternalError, e.to_string()))?;

    // A change mid-transaction takes effect when the transaction ends.
    let transacting = match scope {
        ComponentScope::Station => (1..=cp.config.evses.len() as i32)
            .any(|evse_id| cp.transactions.active_transaction(evse_id).is_some()),
        ComponentScope::Evse(evse_id) | ComponentScope::Connector(evse_id, _) => {
            cp.transactions.active_transaction(evse_id).is_some()
        }
    };

    if !transacting {
        cp.notify_all_connector_status().await;
    }

    let status = if transacting { "Scheduled" } else { "Accepted" };
    Ok(json!({ "status": status }))
}
