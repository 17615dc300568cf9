//! Core domain entities, value objects, and repository traits.
//!
//! Repository traits are implemented by `infrastructure::database`;
//! the application layer depends only on the traits.

pub mod auth;
pub mod availability;
pub mod charging_profile;
pub mod message_queue;
pub mod transaction;
pub mod variable;

pub use crate::support::errors::{DomainError, DomainResult};

pub use auth::{id_token_hash, AuthCacheRepository, AuthListRepository, CachedIdToken};
pub use availability::{AvailabilityRepository, ComponentScope};
pub use charging_profile::{
    ChargingProfileRepository, ChargingScheduleSpec, ClearProfileCriteria, SchedulePeriodSpec,
    StoredChargingProfile,
};
pub use message_queue::{MessageQueueRepository, QueuePriority, QueuedMessage};
pub use transaction::{Transaction, TransactionRepository};
pub use variable::{
    DeviceModelRepository, MonitorCriteria, VariableAttribute, VariableMonitor, VariableSelector,
};
