//! GetReport handler

use rust_ocpp::v2_0_1::messages::get_report::GetReportRequest;
use serde_json::{json, Value};
use tracing::info;

use super::handle_get_base_report::notify_report_req;
use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;

pub async fn handle_get_report(cp: &mut ChargePoint, payload: &Value) -> HandlerResult {
    let req: GetReportRequest = parse_request(payload)?;
    info!(request_id = req.request_id, "GetReport");

    // Restrict to the requested components where given.
    let component_filter = req.component_variable.as_ref().map(|pairs| {
        pairs
            .iter()
            .map(|cv| cv.component.name.clone())
            .collect::<Vec<_>>()
    });

    notify_report_req(cp, req.request_id, component_filter).await;
    Ok(json!({ "status": "Accepted" }))
}
