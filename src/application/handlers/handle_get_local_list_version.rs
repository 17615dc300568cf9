//! GetLocalListVersion handler

use serde_json::{json, Value};

use super::HandlerResult;
use crate::application::charge_point::ChargePoint;
use crate::support::ocpp_frame::OcppErrorCode;

pub async fn handle_get_local_list_version(
    cp: &mut ChargePoint,
    _payload: &Value,
) -> HandlerResult {
    let version = cp
        .store
        .auth_list()
        .version()
        .await
        .map_err(|e| (OcppErrorCode::InternalError, e.to_string()))?;
    Ok(json!({ "versionNumber": version }))
}
