//! GetCompositeSchedule handler

use chrono::{Duration as ChronoDuration, Utc};
use rust_ocpp::v2_0_1::messages::get_composite_schedule::GetCompositeScheduleRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;
use crate::application::smart_charging::{
    ActiveTransactionRef, CompositeRequest, SmartChargingComposer,
};
use crate::support::ocpp_frame::OcppErrorCode;

pub async fn handle_get_composite_schedule(
    cp: &mut ChargePoint,
    payload: &Value,
) -> HandlerResult {
    let req: GetCompositeScheduleRequest = parse_request(payload)?;
    info!(
        evse_id = req.evse_id,
        duration = req.duration,
        unit = ?req.charging_rate_unit,
        "GetCompositeSchedule"
    );

    if req.duration <= 0 {
        return Err((
            OcppErrorCode::PropertyConstraintViolation,
            "duration must be positive".to_string(),
        ));
    }

    let profiles = cp
        .store
        .charging_profiles()
        .list_for_evse(req.evse_id)
        .await
        .map_err(|e| (OcppErrorCode::InternalError, e.to_string()))?;

    let active_tx = cp
        .transactions
        .active_transaction(req.evse_id)
        .map(|tx| ActiveTransactionRef {
            transaction_id: tx.transaction_id.clone(),
            start_time: tx.start_time,
        });

    let start = Utc::now();
    let request = CompositeRequest {
        start,
        end: start + ChronoDuration::seconds(req.duration as i64),
        evse_id: req.evse_id,
        unit: req.charging_rate_unit.clone(),
    };
    let composite =
        SmartChargingComposer::composite_schedule(&profiles, active_tx.as_ref(), &request);

    Ok(json!({
        "status": "Accepted",
        "schedule": {
            "evseId": req.evse_id,
            "duration": composite.duration_s,
            "scheduleStart": composite.start_schedule,
            "chargingRateUnit": composite.rate_unit,
            "chargingSchedulePeriod": composite.periods,
        },
    }))
}
