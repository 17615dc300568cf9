//! GetVariables handler

use rust_ocpp::v2_0_1::messages::get_variables::GetVariablesRequest;
use serde_json::{json, Value};

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;
use crate::domain::variable::VariableSelector;
use crate::support::ocpp_frame::OcppErrorCode;

pub async fn handle_get_variables(cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let req: GetVariablesRequest = parse_request(payload)?;
    if req.get_variable_data.is_empty() {
        return Err((
            OcppErrorCode::OccurrenceConstraintViolation,
            "getVariableData must not be empty".to_string(),
        ));
    }

    let mut results = Vec::new();
    for data in &req.get_variable_data {
        let selector =
            VariableSelector::from_wire(&data.component, &data.variable, data.attribute_type.clone());
        let attribute = cp
            .device_model
            .get_variable_attribute(&selector)
            .await
            .map_err(|e| (OcppErrorCode::InternalError, e.to_string()))?;

        let mut result = match attribute {
            Some(attribute) => {
                let mut entry = json!({
                    "attributeStatus": "Accepted",
                    "component": data.component,
                    "variable": data.variable,
                });
                if let Some(value) = attribute.value {
                    entry["attributeValue"] = json!(value);
                }
                entry
            }
            None => json!({
                "attributeStatus": "UnknownVariable",
                "component": data.component,
                "variable": data.variable,
            }),
        };
        if let Some(attribute_type) = &data.attribute_type {
            result["attributeType"] = json!(attribute_type);
        }
        results.push(result);
    }

    Ok(json!({ "getVariableResult": results }))
}
