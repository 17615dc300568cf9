//! SetVariableMonitoring handler

use rust_decimal::prelude::ToPrimitive;
use rust_ocpp::v2_0_1::messages::set_variable_monitoring::SetVariableMonitoringRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;
use crate::domain::variable::{VariableMonitor, VariableSelector};
use crate::support::ocpp_frame::OcppErrorCode;

pub async fn handle_set_variable_monitoring(
    cp: &mut ChargePoint,
    payload: &Value,
) -> HandlerResult {
    let req: SetVariableMonitoringRequest = parse_request(payload)?;
    if req.set_monitoring_data.is_empty() {
        return Err((
            OcppErrorCode::OccurrenceConstraintViolation,
            "setMonitoringData must not be empty".to_string(),
        ));
    }
    info!(count = req.set_monitoring_data.len(), "SetVariableMonitoring");

    let mut results = Vec::new();
    for data in &req.set_monitoring_data {
        let selector = VariableSelector::from_wire(&data.component, &data.variable, None);
        let known = cp
            .device_model
            .get_variable_attribute(&selector)
            .await
            .map_err(|e| (OcppErrorCode::InternalError, e.to_string()))?
            .is_some();

        let (status, id) = if !known {
            ("UnknownVariable", data.id)
        } else {
            let monitor = VariableMonitor {
                id: data.id.unwrap_or(0),
                component: data.component.name.clone(),
                variable: data.variable.name.clone(),
                kind: data.kind.clone(),
                value: data.value.to_f64().unwrap_or(0.0),
                severity: data.severity as i32,
                transaction: data.transaction.unwrap_or(false),
            };
            match cp.device_model.set_monitoring_data(&monitor, data.id).await {
                Ok(id) => ("Accepted", Some(id)),
                Err(_) => ("Rejected", data.id),
            }
        };

        let mut result = json!({
            "status": status,
            "type": data.kind,
            "severity": data.severity,
            "component": data.component,
            "variable": data.variable,
        });
        if let Some(id) = id {
            result["id"] = json!(id);
        }
        results.push(result);
    }

    Ok(json!({ "setMonitoringResult": results }))
}
