//! SetVariables handler

use rust_ocpp::v2_0_1::messages::set_variables::SetVariablesRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;
use crate::application::device_model::{SetRejection, SetSource};
use crate::domain::variable::VariableSelector;
use crate::support::ocpp_frame::OcppErrorCode;

pub async fn handle_set_variables(cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let req: SetVariablesRequest = parse_request(payload)?;
    if req.set_variable_data.is_empty() {
        return Err((
            OcppErrorCode::OccurrenceConstraintViolation,
            "setVariableData must not be empty".to_string(),
        ));
    }

    info!(count = req.set_variable_data.len(), "SetVariables");

    let mut results = Vec::new();
    for data in &req.set_variable_data {
        let selector =
            VariableSelector::from_wire(&data.component, &data.variable, data.attribute_type.clone());
        let verdict = cp
            .device_model
            .set_variable_attribute_value(&selector, &data.attribute_value, SetSource::Csms)
            .await
            .map_err(|e| (OcppErrorCode::InternalError, e.to_string()))?;

        let (status, reason) = match verdict {
            Ok(()) => ("Accepted", None),
            Err(SetRejection::UnknownVariable) => ("UnknownVariable", None),
            Err(SetRejection::ReadOnly) => ("Rejected", Some("Variable is read-only".to_string())),
            Err(SetRejection::InvalidValue(v)) => {
                ("Rejected", Some(format!("Value '{}' violates the data type", v)))
            }
            Err(SetRejection::NotInValuesList(v)) => {
                ("Rejected", Some(format!("Value '{}' is not in the values list", v)))
            }
        };

        let mut result = json!({
            "attributeStatus": status,
            "component": data.component,
            "variable": data.variable,
        });
        if let Some(attribute) = &data.attribute_type {
            result["attributeType"] = json!(attribute);
        }
        if let Some(reason) = reason {
            result["attributeStatusInfo"] = json!({ "reasonCode": "InvalidValue", "additionalInfo": reason });
        }
        results.push(result);
    }

    Ok(json!({ "setVariableResult": results }))
}
