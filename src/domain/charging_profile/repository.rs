//! Charging profile persistence trait

use async_trait::async_trait;
use rust_ocpp::v2_0_1::enumerations::charging_profile_purpose_enum_type::ChargingProfilePurposeEnumType;

use super::model::StoredChargingProfile;
use crate::support::errors::DomainResult;

/// Matching rules for ClearChargingProfile.
#[derive(Debug, Clone, Default)]
pub struct ClearProfileCriteria {
    pub profile_id: Option<i32>,
    pub evse_id: Option<i32>,
    pub purpose: Option<ChargingProfilePurposeEnumType>,
    pub stack_level: Option<i32>,
}

/// CHARGING_PROFILES storage.
#[async_trait]
pub trait ChargingProfileRepository: Send + Sync {
    /// Install a profile. Same `profile_id` replaces; for TxDefault and
    /// ChargingStationMax purposes, a matching `(purpose, stack_level,
    /// evse_id)` tuple also replaces the previous occupant.
    async fn upsert(&self, profile: &StoredChargingProfile) -> DomainResult<()>;

    /// Profiles applicable to an EVSE: its own plus station-wide rows.
    async fn list_for_evse(&self, evse_id: i32) -> DomainResult<Vec<StoredChargingProfile>>;

    async fn list_all(&self) -> DomainResult<Vec<StoredChargingProfile>>;

    /// Remove profiles matching the criteria; returns how many went.
    async fn clear_matching(&self, criteria: &ClearProfileCriteria) -> DomainResult<u64>;

    /// Drop TxProfile rows bound to a finished transaction.
    async fn delete_for_transaction(&self, transaction_id: &str) -> DomainResult<u64>;

    async fn count(&self) -> DomainResult<u64>;
}
