//! Use-case orchestration: the protocol task and its collaborators.

pub mod charge_point;
pub mod device_model;
pub mod events;
pub mod handlers;
pub mod queue;
pub mod smart_charging;
pub mod timers;
pub mod transactions;

pub use charge_point::{Callbacks, ChargePoint, StationHandle};
pub use device_model::DeviceModel;
pub use events::{HardwareEvent, StationEvent, TimerId};
pub use queue::{CallOutcome, MessageQueue, QueueConfig};
pub use smart_charging::SmartChargingComposer;
pub use transactions::TransactionManager;
