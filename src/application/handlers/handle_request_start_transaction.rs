//! RequestStartTransaction handler
//!
//! The decision is the hardware driver's: the core only relays it and
//! reports the outcome. The transaction itself starts when the driver
//! calls `on_transaction_started`.

use rust_ocpp::v2_0_1::enumerations::request_start_stop_status_enum_type::RequestStartStopStatusEnumType;
use rust_ocpp::v2_0_1::messages::request_start_transaction::RequestStartTransactionRequest;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;

pub async fn handle_request_start_transaction(
    cp: &mut ChargePoint,
    payload: &Value,
) -> HandlerResult {
    let req: RequestStartTransactionRequest = parse_request(payload)?;
    info!(
        remote_start_id = req.remote_start_id,
        evse_id = ?req.evse_id,
        id_token = req.id_token.id_token.as_str(),
        "RequestStartTransaction"
    );

    let status = (cp.callbacks.remote_start)(&req);
    let accepted = status == RequestStartStopStatusEnumType::Accepted;

    if accepted {
        // An attached TxProfile is installed up front so it already
        // binds when the transaction appears.
        if let Some(profile) = &req.charging_profile {
            if let Ok(payload) = serde_json::to_value(profile) {
                let stored = crate::application::handlers::handle_set_charging_profile::stored_from_wire(
                    &payload,
                    req.evse_id.unwrap_or(0),
                );
                match stored {
                    Ok(stored) => {
                        if let Err(e) = cp.store.charging_profiles().upsert(&stored).await {
                            tracing::warn!(error = %e, "Could not install remote-start profile");
                        }
                    }
                    Err(reason) => tracing::warn!(reason, "Remote-start profile rejected"),
                }
            }
        }
    }

    Ok(json!({ "status": status }))
}
