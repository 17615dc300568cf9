//! GetLog handler
//!
//! Log upload is not wired to a collector on this firmware; the
//! request is acknowledged as rejected so the CSMS does not wait.

use rust_ocpp::v2_0_1::messages::get_log::GetLogRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;

pub async fn handle_get_log(_cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let req: GetLogRequest = parse_request(payload)?;
    info!(request_id = req.request_id, "GetLog (not supported)");
    Ok(json!({
        "status": "Rejected",
        "statusInfo": { "reasonCode": "NotSupported" },
    }))
}
