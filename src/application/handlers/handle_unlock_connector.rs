//! UnlockConnector handler

use rust_ocpp::v2_0_1::messages::unlock_connector::UnlockConnectorRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;

pub async fn handle_unlock_connector(cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let req: UnlockConnectorRequest = parse_request(payload)?;
    info!(evse_id = req.evse_id, connector_id = req.connector_id, "UnlockConnector");

    // Unlocking while a transaction is authorized on the EVSE is the
    // driver's call to refuse; the core only rejects unknown EVSEs.
    if req.evse_id < 1 || req.evse_id > cp.config.evses.len() as i32 {
        return Ok(json!({ "status": "UnknownConnector" }));
    }

    let status = (cp.callbacks.unlock_connector)(req.evse_id, req.connector_id);
    Ok(json!({ "status": status }))
}
