//! SetChargingProfile handler

use chrono::{DateTime, Utc};
use rust_ocpp::v2_0_1::enumerations::charging_profile_kind_enum_type::ChargingProfileKindEnumType;
use rust_ocpp::v2_0_1::enumerations::charging_profile_purpose_enum_type::ChargingProfilePurposeEnumType;
use rust_ocpp::v2_0_1::enumerations::recurrency_kind_enum_type::RecurrencyKindEnumType;
use serde_json::{json, Value};
use tracing::info;

use super::HandlerResult;
use crate::application::charge_point::ChargePoint;
use crate::domain::charging_profile::{ChargingScheduleSpec, StoredChargingProfile};
use crate::support::ocpp_frame::OcppErrorCode;

pub async fn handle_set_charging_profile(cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let Some(evse_id) = payload["evseId"].as_i64() else {
        return Err((
            OcppErrorCode::FormationViolation,
            "evseId is required".to_string(),
        ));
    };
    let profile = &payload["chargingProfile"];
    if profile.is_null() {
        return Err((
            OcppErrorCode::FormationViolation,
            "chargingProfile is required".to_string(),
        ));
    }

    let stored = match stored_from_wire(profile, evse_id as i32) {
        Ok(stored) => stored,
        Err(reason) => {
            return Ok(json!({
                "status": "Rejected",
                "statusInfo": { "reasonCode": "InvalidProfile", "additionalInfo": reason },
            }))
        }
    };

    info!(
        profile_id = stored.profile_id,
        evse_id = stored.evse_id,
        stack_level = stored.stack_level,
        purpose = ?stored.purpose,
        "SetChargingProfile"
    );

    // The stack level cap comes from the device model.
    let max_stack = cp
        .device_model
        .integer_of("SmartChargingCtrlr", "ProfileStackLevel")
        .await
        .ok()
        .flatten()
        .unwrap_or(i64::MAX);
    if (stored.stack_level as i64) > max_stack {
        return Ok(json!({
            "status": "Rejected",
            "statusInfo": { "reasonCode": "InvalidStackLevel" },
        }));
    }

    // Capacity: stack levels × connectors, plus one station-wide slot.
    // Installs that replace an occupant never grow the table.
    let capacity = max_stack
        .saturating_mul(cp.config.connector_total() as i64)
        .saturating_add(1);
    let existing = cp
        .store
        .charging_profiles()
        .list_all()
        .await
        .map_err(|e| (OcppErrorCode::InternalError, e.to_string()))?;
    let replaces = existing.iter().any(|p| {
        p.profile_id == stored.profile_id
            || (matches!(
                stored.purpose,
                ChargingProfilePurposeEnumType::TxDefaultProfile
                    | ChargingProfilePurposeEnumType::ChargingStationMaxProfile
            ) && p.purpose == stored.purpose
                && p.stack_level == stored.stack_level
                && p.evse_id == stored.evse_id)
    });
    if !replaces && existing.len() as i64 >= capacity {
        return Ok(json!({
            "status": "Rejected",
            "statusInfo": { "reasonCode": "TooManyProfiles" },
        }));
    }

    // A TxProfile must name a transaction that is live on this EVSE.
    if stored.purpose == ChargingProfilePurposeEnumType::TxProfile {
        let bound = stored.transaction_id.as_deref().map_or(false, |tx_id| {
            cp.transactions.evse_of_transaction(tx_id) == Some(stored.evse_id)
        });
        if !bound {
            return Ok(json!({
                "status": "Rejected",
                "statusInfo": { "reasonCode": "TxNotFound" },
            }));
        }
    }

    cp.store
        .charging_profiles()
        .upsert(&stored)
        .await
        .map_err(|e| (OcppErrorCode::InternalError, e.to_string()))?;

    Ok(json!({ "status": "Accepted" }))
}

/// Parse a wire ChargingProfile object into the stored form. Only the
/// first charging schedule is used; multi-schedule profiles are a
/// capability this station does not announce.
pub(crate) fn stored_from_wire(
    profile: &Value,
    evse_id: i32,
) -> Result<StoredChargingProfile, String> {
    let profile_id = profile["id"]
        .as_i64()
        .ok_or_else(|| "chargingProfile.id is required".to_string())? as i32;
    let stack_level = profile["stackLevel"]
        .as_i64()
        .ok_or_else(|| "stackLevel is required".to_string())? as i32;

    let purpose: ChargingProfilePurposeEnumType =
        serde_json::from_value(profile["chargingProfilePurpose"].clone())
            .map_err(|_| "unknown chargingProfilePurpose".to_string())?;
    let kind: ChargingProfileKindEnumType =
        serde_json::from_value(profile["chargingProfileKind"].clone())
            .map_err(|_| "unknown chargingProfileKind".to_string())?;
    let recurrency_kind: Option<RecurrencyKindEnumType> = match profile.get("recurrencyKind") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            serde_json::from_value(v.clone()).map_err(|_| "unknown recurrencyKind".to_string())?,
        ),
    };

    let parse_instant = |key: &str| -> Result<Option<DateTime<Utc>>, String> {
        match profile.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|_| format!("{} is not a timestamp", key)),
        }
    };
    let valid_from = parse_instant("validFrom")?;
    let valid_to = parse_instant("validTo")?;

    let transaction_id = profile["transactionId"].as_str().map(str::to_string);

    let schedules = profile["chargingSchedule"]
        .as_array()
        .cloned()
        .or_else(|| {
            // Tolerate a bare object where the array is expected.
            profile
                .get("chargingSchedule")
                .filter(|v| v.is_object())
                .map(|v| vec![v.clone()])
        })
        .unwrap_or_default();
    let first = schedules
        .first()
        .ok_or_else(|| "chargingSchedule must not be empty".to_string())?;
    let schedule: ChargingScheduleSpec = serde_json::from_value(first.clone())
        .map_err(|e| format!("invalid chargingSchedule: {}", e))?;

    let stored = StoredChargingProfile {
        profile_id,
        evse_id,
        stack_level,
        purpose,
        kind,
        recurrency_kind,
        valid_from,
        valid_to,
        transaction_id,
        schedule,
        installed_at: Utc::now(),
    };
    stored.validate().map_err(|e| e.to_string())?;
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_wire_profile() {
        let wire = json!({
            "id": 11,
            "stackLevel": 2,
            "chargingProfilePurpose": "TxDefaultProfile",
            "chargingProfileKind": "Recurring",
            "recurrencyKind": "Daily",
            "chargingSchedule": [{
                "chargingRateUnit": "A",
                "startSchedule": "2024-01-01T08:00:00Z",
                "chargingSchedulePeriod": [
                    { "startPeriod": 0, "limit": 32.0 },
                    { "startPeriod": 36000, "limit": 7.0 }
                ]
            }]
        });

        let stored = stored_from_wire(&wire, 1).unwrap();
        assert_eq!(stored.profile_id, 11);
        assert_eq!(stored.evse_id, 1);
        assert_eq!(stored.recurrency_kind, Some(RecurrencyKindEnumType::Daily));
        assert_eq!(stored.schedule.charging_schedule_period.len(), 2);
    }

    #[test]
    fn rejects_empty_schedule() {
        let wire = json!({
            "id": 11,
            "stackLevel": 2,
            "chargingProfilePurpose": "TxDefaultProfile",
            "chargingProfileKind": "Absolute",
            "chargingSchedule": []
        });
        assert!(stored_from_wire(&wire, 1).is_err());
    }

    #[test]
    fn rejects_unknown_purpose() {
        let wire = json!({
            "id": 11,
            "stackLevel": 2,
            "chargingProfilePurpose": "VendorSpecial",
            "chargingProfileKind": "Absolute",
            "chargingSchedule": [{
                "chargingRateUnit": "W",
                "chargingSchedulePeriod": [{ "startPeriod": 0, "limit": 11000.0 }]
            }]
        });
        assert!(stored_from_wire(&wire, 1).is_err());
    }
}
