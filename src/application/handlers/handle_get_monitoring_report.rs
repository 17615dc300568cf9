//! GetMonitoringReport handler
//!
//! Acknowledges and follows up with a NotifyMonitoringReport carrying
//! the installed monitors matching the criteria.

use serde_json::{json, Value};
use tracing::info;

use super::HandlerResult;
use crate::application::charge_point::ChargePoint;
use crate::domain::variable::MonitorCriteria;
use crate::support::ocpp_frame::OcppErrorCode;

pub async fn handle_get_monitoring_report(
    cp: &mut ChargePoint,
    payload: &Value,
) -> HandlerResult {
    let Some(request_id) = payload["requestId"].as_i64() else {
        return Err((
            OcppErrorCode::FormationViolation,
            "requestId is required".to_string(),
        ));
    };
    info!(request_id, "GetMonitoringReport");

    // Only the first componentVariable entry narrows the report; a
    // missing filter dumps everything.
    let criteria = match payload["componentVariable"].as_array().and_then(|a| a.first()) {
        Some(cv) => MonitorCriteria {
            component: cv["component"]["name"].as_str().map(str::to_string),
            variable: cv["variable"]["name"].as_str().map(str::to_string),
        },
        None => MonitorCriteria::default(),
    };

    let monitors = cp
        .device_model
        .get_monitoring_data(&criteria)
        .await
        .map_err(|e| (OcppErrorCode::InternalError, e.to_string()))?;

    if monitors.is_empty() {
        return Ok(json!({ "status": "Rejected", "statusInfo": { "reasonCode": "NoMonitors" } }));
    }

    let monitor_data: Vec<Value> = monitors
        .iter()
        .map(|m| {
            json!({
                "component": { "name": m.component },
                "variable": { "name": m.variable },
                "variableMonitoring": [{
                    "id": m.id,
                    "transaction": m.transaction,
                    "value": m.value,
                    "type": m.kind,
                    "severity": m.severity,
                }],
            })
        })
        .collect();

    let report = json!({
        "requestId": request_id,
        "generatedAt": chrono::Utc::now(),
        "monitor": monitor_data,
        "tbc": false,
        "seqNo": 0,
    });
    cp.enqueue_call("NotifyMonitoringReport", report, None, None).await;

    Ok(json!({ "status": "Accepted" }))
}
