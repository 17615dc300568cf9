//! SeaORM repository implementations

pub mod auth_cache_repository;
pub mod auth_list_repository;
pub mod availability_repository;
pub mod charging_profile_repository;
pub mod device_model_repository;
pub mod message_queue_repository;
pub mod transaction_repository;

pub use auth_cache_repository::SeaOrmAuthCacheRepository;
pub use auth_list_repository::SeaOrmAuthListRepository;
pub use availability_repository::SeaOrmAvailabilityRepository;
pub use charging_profile_repository::SeaOrmChargingProfileRepository;
pub use device_model_repository::SeaOrmDeviceModelRepository;
pub use message_queue_repository::SeaOrmMessageQueueRepository;
pub use transaction_repository::SeaOrmTransactionRepository;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::{
    AuthCacheRepository, AuthListRepository, AvailabilityRepository, ChargingProfileRepository,
    DeviceModelRepository, MessageQueueRepository, TransactionRepository,
};
use crate::support::errors::DomainError;

// ── Shared helpers ─────────────────────────────────────────────

/// Wire name of a unit enum (rust-ocpp enums serialize as bare strings).
pub(crate) fn enum_to_string<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

pub(crate) fn enum_from_string<T: DeserializeOwned>(s: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}

pub(crate) fn db_err(e: sea_orm::DbErr) -> DomainError {
    DomainError::Validation(format!("Database error: {}", e))
}

// ── Store handle ───────────────────────────────────────────────

/// Bundles one repository of each kind over a shared connection.
#[derive(Clone)]
pub struct SeaOrmStore {
    auth_cache: Arc<SeaOrmAuthCacheRepository>,
    auth_list: Arc<SeaOrmAuthListRepository>,
    availability: Arc<SeaOrmAvailabilityRepository>,
    charging_profiles: Arc<SeaOrmChargingProfileRepository>,
    device_model: Arc<SeaOrmDeviceModelRepository>,
    message_queue: Arc<SeaOrmMessageQueueRepository>,
    transactions: Arc<SeaOrmTransactionRepository>,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            auth_cache: Arc::new(SeaOrmAuthCacheRepository::new(db.clone())),
            auth_list: Arc::new(SeaOrmAuthListRepository::new(db.clone())),
            availability: Arc::new(SeaOrmAvailabilityRepository::new(db.clone())),
            charging_profiles: Arc::new(SeaOrmChargingProfileRepository::new(db.clone())),
            device_model: Arc::new(SeaOrmDeviceModelRepository::new(db.clone())),
            message_queue: Arc::new(SeaOrmMessageQueueRepository::new(db.clone())),
            transactions: Arc::new(SeaOrmTransactionRepository::new(db)),
        }
    }

    pub fn auth_cache(&self) -> Arc<dyn AuthCacheRepository> {
        self.auth_cache.clone()
    }

    pub fn auth_list(&self) -> Arc<dyn AuthListRepository> {
        self.auth_list.clone()
    }

    pub fn availability(&self) -> Arc<dyn AvailabilityRepository> {
        self.availability.clone()
    }

    pub fn charging_profiles(&self) -> Arc<dyn ChargingProfileRepository> {
        self.charging_profiles.clone()
    }

    pub fn device_model(&self) -> Arc<dyn DeviceModelRepository> {
        self.device_model.clone()
    }

    pub fn message_queue(&self) -> Arc<dyn MessageQueueRepository> {
        self.message_queue.clone()
    }

    pub fn transactions(&self) -> Arc<dyn TransactionRepository> {
        self.transactions.clone()
    }
}
