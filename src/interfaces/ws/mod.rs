//! OCPP-J WebSocket client transport
//!
//! `link` owns exactly one socket; `connectivity` owns the link
//! lifecycle across prioritized network connection profiles.

pub mod connectivity;
pub mod link;
pub mod options;

pub use connectivity::ConnectivityManager;
pub use link::{CloseReason, ConnectionFailure, LinkEvent, LinkState, WebSocketLink};
pub use options::{endpoint_url, ConnectionOptions};

/// The only subprotocol this client speaks.
pub const OCPP_SUBPROTOCOL: &str = "ocpp2.0.1";
