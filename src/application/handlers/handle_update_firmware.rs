//! UpdateFirmware handler
//!
//! The download and install mechanics live in the hardware driver;
//! the core validates, relays, and reports the first status.

use rust_ocpp::v2_0_1::messages::update_firmware::UpdateFirmwareRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;

pub async fn handle_update_firmware(cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let req: UpdateFirmwareRequest = parse_request(payload)?;
    info!(
        request_id = req.request_id,
        location = req.firmware.location.as_str(),
        "UpdateFirmware"
    );

    (cp.callbacks.update_firmware)(&req.firmware);

    let status_payload = json!({
        "status": "Downloading",
        "requestId": req.request_id,
    });
    cp.enqueue_call("FirmwareStatusNotification", status_payload, None, None)
        .await;

    Ok(json!({ "status": "Accepted" }))
}
