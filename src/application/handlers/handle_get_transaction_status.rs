//! GetTransactionStatus handler

use rust_ocpp::v2_0_1::messages::get_transaction_status::GetTransactionStatusRequest;
use serde_json::{json, Value};

use super::{parse_request, HandlerResult};
use crate::application::charge_point::ChargePoint;

pub async fn handle_get_transaction_status(
    cp: &mut ChargePoint,
    payload: &Value,
) -> HandlerResult {
    let req: GetTransactionStatusRequest = parse_request(payload)?;

    let ongoing = req.transaction_id.as_deref().map(|tx_id| {
        cp.transactions.evse_of_transaction(tx_id).is_some()
            && !cp.transactions.is_awaiting_ack(tx_id)
    });
    let messages_in_queue = cp.queue.messages_in_queue(req.transaction_id.as_deref());

    let mut response = json!({ "messagesInQueue": messages_in_queue });
    if let Some(ongoing) = ongoing {
        response["ongoingIndicator"] = json!(ongoing);
    }
    Ok(response)
}
