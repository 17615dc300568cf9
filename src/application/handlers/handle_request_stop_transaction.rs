//! RequestStopTransaction handler

use rust_ocpp::v2_0_1::messages::request_stop_transaction::RequestStopTransactionRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;

pub async fn handle_request_stop_transaction(
    cp: &mut ChargePoint,
    payload: &Value,
) -> HandlerResult {
    let req: RequestStopTransactionRequest = parse_request(payload)?;
    info!(transaction_id = req.transaction_id.as_str(), "RequestStopTransaction");

    if cp
        .transactions
        .evse_of_transaction(&req.transaction_id)
        .is_none()
    {
        return Ok(json!({ "status": "Rejected" }));
    }

    let status = (cp.callbacks.remote_stop)(&req.transaction_id);
    Ok(json!({ "status": status }))
}
