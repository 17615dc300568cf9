//! DataTransfer handler
//!
//! No vendor extensions are implemented; everything is answered with
//! UnknownVendorId rather than dropped.

use rust_ocpp::v2_0_1::messages::datatransfer::DataTransferRequest;
use serde_json::{json, Value};
use tracing::debug;

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;

pub async fn handle_data_transfer(_cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let req: DataTransferRequest = parse_request(payload)?;
    debug!(vendor_id = req.vendor_id.as_str(), "DataTransfer");
    Ok(json!({ "status": "UnknownVendorId" }))
}
