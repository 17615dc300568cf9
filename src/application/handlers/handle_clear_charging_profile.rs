//! ClearChargingProfile handler

use rust_ocpp::v2_0_1::messages::clear_charging_profile::ClearChargingProfileRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;
use crate::domain::charging_profile::ClearProfileCriteria;
use crate::support::ocpp_frame::OcppErrorCode;

pub async fn handle_clear_charging_profile(
    cp: &mut ChargePoint,
    payload: &Value,
) -> HandlerResult {
    let req: ClearChargingProfileRequest = parse_request(payload)?;

    let criteria = ClearProfileCriteria {
        profile_id: req.charging_profile_id,
        evse_id: req
            .charging_profile_criteria
            .as_ref()
            .and_then(|c| c.evse_id),
        purpose: req
            .charging_profile_criteria
            .as_ref()
            .and_then(|c| c.charging_profile_purpose.clone()),
        stack_level: req
            .charging_profile_criteria
            .as_ref()
            .and_then(|c| c.stack_level),
    };
    info!(?criteria, "ClearChargingProfile");

    let removed = cp
        .store
        .charging_profiles()
        .clear_matching(&criteria)
        .await
        .map_err(|e| (OcppErrorCode::InternalError, e.to_string()))?;

    let status = if removed > 0 { "Accepted" } else { "Unknown" };
    Ok(json!({ "status": status }))
}
