//! GetBaseReport handler
//!
//! Acknowledges the request and follows up with a NotifyReport
//! carrying the full device model in one page.

use rust_ocpp::v2_0_1::messages::get_base_report::GetBaseReportRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;

pub async fn handle_get_base_report(cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let req: GetBaseReportRequest = parse_request(payload)?;
    info!(request_id = req.request_id, report_base = ?req.report_base, "GetBaseReport");

    notify_report_req(cp, req.request_id, None).await;
    Ok(json!({ "status": "Accepted" }))
}

/// Build and enqueue a NotifyReport; `component_filter` limits the
/// dump to the named components (GetReport).
pub(crate) async fn notify_report_req(
    cp: &mut ChargePoint,
    request_id: i32,
    component_filter: Option<Vec<String>>,
) {
    let attributes = match cp.device_model.get_device_model().await {
        Ok(attributes) => attributes,
        Err(e) => {
            tracing::error!(error = %e, "Device model dump failed");
            return;
        }
    };

    let report_data: Vec<Value> = attributes
        .iter()
        .filter(|a| match &component_filter {
            Some(filter) => filter.iter().any(|c| c == &a.selector.component),
            None => true,
        })
        .map(|a| {
            json!({
                "component": a.selector.component_type(),
                "variable": a.selector.variable_type(),
                "variableAttribute": [{
                    "type": a.selector.attribute,
                    "value": a.value,
                    "mutability": a.mutability,
                }],
                "variableCharacteristics": {
                    "dataType": a.data_type,
                    "unit": a.unit,
                    "supportsMonitoring": true,
                },
            })
        })
        .collect();

    let payload = json!({
        "requestId": request_id,
        "generatedAt": chrono::Utc::now(),
        "reportData": report_data,
        "tbc": false,
        "seqNo": 0,
    });
    cp.enqueue_call("NotifyReport", payload, None, None).await;
}
