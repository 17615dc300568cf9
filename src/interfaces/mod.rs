//! Delivery mechanisms: the WebSocket transport toward the CSMS.

pub mod ws;
