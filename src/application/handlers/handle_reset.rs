//! Reset handler

use rust_ocpp::v2_0_1::messages::reset::ResetRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;

pub async fn handle_reset(cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let req: ResetRequest = parse_request(payload)?;
    info!(kind = ?req.request_type, evse_id = ?req.evse_id, "Reset requested");

    if !(cp.callbacks.is_reset_allowed)(&req.request_type) {
        return Ok(json!({ "status": "Rejected" }));
    }

    // A reset during a running transaction is scheduled, not refused:
    // the driver performs it once the transaction winds down.
    let transacting = (1..=cp.config.evses.len() as i32)
        .any(|evse_id| cp.transactions.active_transaction(evse_id).is_some());

    (cp.callbacks.reset_requested)(req.request_type);

    let status = if transacting { "Scheduled" } else { "Accepted" };
    Ok(json!({ "status": status }))
}
