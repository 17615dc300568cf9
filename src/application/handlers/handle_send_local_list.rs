//! SendLocalList handler

use rust_ocpp::v2_0_1::enumerations::update_enum_type::UpdateEnumType;
use rust_ocpp::v2_0_1::messages::send_local_list::SendLocalListRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;
use crate::support::ocpp_frame::OcppErrorCode;

pub async fn handle_send_local_list(cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let req: SendLocalListRequest = parse_request(payload)?;
    let entries = req.local_authorization_list.unwrap_or_default();
    info!(
        version = req.version_number,
        update_type = ?req.update_type,
        entries = entries.len(),
        "SendLocalList"
    );

    let auth_list = cp.store.auth_list();
    let current = auth_list
        .version()
        .await
        .map_err(|e| (OcppErrorCode::InternalError, e.to_string()))?;

    let full = match req.update_type {
        UpdateEnumType::Full => true,
        UpdateEnumType::Differential => {
            // A differential that does not advance the version is stale.
            if req.version_number <= current {
                return Ok(json!({
                    "status": "VersionMismatch",
                    "statusInfo": {
                        "reasonCode": "StaleVersion",
                        "additionalInfo": format!("have version {}", current),
                    },
                }));
            }
            false
        }
    };

    match auth_list.apply_update(req.version_number, full, &entries).await {
        Ok(()) => Ok(json!({ "status": "Accepted" })),
        Err(e) => {
            tracing::error!(error = %e, "Local list update failed");
            Ok(json!({ "status": "Failed" }))
        }
    }
}
