//! GetChargingProfiles handler
//!
//! Acknowledges and follows up with ReportChargingProfiles carrying
//! the installed profiles that match the criteria.

use rust_ocpp::v2_0_1::messages::get_charging_profiles::GetChargingProfilesRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;
use crate::domain::charging_profile::StoredChargingProfile;
use crate::support::ocpp_frame::OcppErrorCode;

pub async fn handle_get_charging_profiles(
    cp: &mut ChargePoint,
    payload: &Value,
) -> HandlerResult {
    let req: GetChargingProfilesRequest = parse_request(payload)?;
    info!(request_id = req.request_id, evse_id = ?req.evse_id, "GetChargingProfiles");

    let all = cp
        .store
        .charging_profiles()
        .list_all()
        .await
        .map_err(|e| (OcppErrorCode::InternalError, e.to_string()))?;

    let criteria = &req.charging_profile;
    let matching: Vec<StoredChargingProfile> = all
        .into_iter()
        .filter(|p| match req.evse_id {
            Some(evse_id) => p.evse_id == evse_id,
            None => true,
        })
        .filter(|p| match &criteria.charging_profile_purpose {
            Some(purpose) => &p.purpose == purpose,
            None => true,
        })
        .filter(|p| match criteria.stack_level {
            Some(stack_level) => p.stack_level == stack_level,
            None => true,
        })
        .filter(|p| match &criteria.charging_profile_id {
            Some(ids) => ids.contains(&p.profile_id),
            None => true,
        })
        .collect();

    if matching.is_empty() {
        return Ok(json!({ "status": "NoProfiles" }));
    }

    // Report per EVSE, as the wire format requires one evseId per page.
    let mut evse_ids: Vec<i32> = matching.iter().map(|p| p.evse_id).collect();
    evse_ids.sort_unstable();
    evse_ids.dedup();

    for (idx, evse_id) in evse_ids.iter().enumerate() {
        let page: Vec<Value> = matching
            .iter()
            .filter(|p| p.evse_id == *evse_id)
            .map(wire_from_stored)
            .collect();
        let tbc = idx + 1 < evse_ids.len();
        let payload = json!({
            "requestId": req.request_id,
            "chargingLimitSource": "CSO",
            "evseId": evse_id,
            "chargingProfile": page,
            "tbc": tbc,
        });
        cp.enqueue_call("ReportChargingProfiles", payload, None, None).await;
    }

    Ok(json!({ "status": "Accepted" }))
}

/// Rebuild the wire ChargingProfile object from a stored profile.
fn wire_from_stored(profile: &StoredChargingProfile) -> Value {
    let mut wire = json!({
        "id": profile.profile_id,
        "stackLevel": profile.stack_level,
        "chargingProfilePurpose": profile.purpose,
        "chargingProfileKind": profile.kind,
        "chargingSchedule": [profile.schedule],
    });
    if let Some(recurrency) = &profile.recurrency_kind {
        wire["recurrencyKind"] = json!(recurrency);
    }
    if let Some(valid_from) = &profile.valid_from {
        wire["validFrom"] = json!(valid_from);
    }
    if let Some(valid_to) = &profile.valid_to {
        wire["validTo"] = json!(valid_to);
    }
    if let Some(transaction_id) = &profile.transaction_id {
        wire["transactionId"] = json!(transaction_id);
    }
    wire
}
