//! ClearVariableMonitoring handler

use rust_ocpp::v2_0_1::messages::clear_variable_monitoring::ClearVariableMonitoringRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;

pub async fn handle_clear_variable_monitoring(
    cp: &mut ChargePoint,
    payload: &Value,
) -> HandlerResult {
    let req: ClearVariableMonitoringRequest = parse_request(payload)?;
    info!(ids = ?req.id, "ClearVariableMonitoring");

    let mut results = Vec::new();
    for id in &req.id {
        let status = match cp.device_model.clear_variable_monitor(*id).await {
            Ok(true) => "Accepted",
            Ok(false) => "NotFound",
            Err(_) => "Rejected",
        };
        results.push(json!({ "id": id, "status": status }));
    }

    Ok(json!({ "clearMonitoringResult": results }))
}
