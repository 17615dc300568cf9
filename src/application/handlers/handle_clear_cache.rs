//! ClearCache handler

use serde_json::{json, Value};
use tracing::info;

use super::HandlerResult;
use crate::application::charge_point::ChargePoint;

pub async fn handle_clear_cache(cp: &mut ChargePoint, _payload: &Value) -> HandlerResult {
    info!("ClearCache");
    match cp.store.auth_cache().clear().await {
        Ok(()) => Ok(json!({ "status": "Accepted" })),
        Err(e) => {
            tracing::error!(error = %e, "Auth cache clear failed");
            Ok(json!({ "status": "Rejected" }))
        }
    }
}
