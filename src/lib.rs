//! # Texnouz Station
//!
//! OCPP 2.0.1 charging station client: the long-lived stateful core
//! connecting a physical station (EVSEs and connectors) to a CSMS over
//! a persistent WebSocket.
//!
//! ## Architecture
//!
//! - **support**: Cross-cutting utilities (OCPP-J framing, errors,
//!   backoff policy, shutdown)
//! - **domain**: Entities, value objects, repository traits
//! - **application**: The protocol task: message queue, device model,
//!   smart charging, transactions, facade, and inbound-call handlers
//! - **infrastructure**: Persistent store (SQLite via SeaORM)
//! - **interfaces**: The WebSocket transport toward the CSMS
//! - **config**: Station configuration (JSON document)

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod support;

// Re-export commonly used types at crate root
pub use application::{Callbacks, ChargePoint, SmartChargingComposer, StationHandle};
pub use config::{default_config_path, StationConfig};
pub use infrastructure::{init_database, DatabaseConfig, SeaOrmStore};
pub use support::errors::{DomainError, InfraError, StationError};
pub use support::ocpp_frame::{OcppErrorCode, OcppFrame};
