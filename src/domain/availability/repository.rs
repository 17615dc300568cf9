//! Operational status persistence trait

use async_trait::async_trait;
use rust_ocpp::v2_0_1::enumerations::operational_status_enum_type::OperationalStatusEnumType;

use super::model::ComponentScope;
use crate::support::errors::DomainResult;

/// AVAILABILITY table.
///
/// With `replace = true` the call overwrites any persisted default
/// (ChangeAvailability from the CSMS); with `replace = false` it only
/// lands where no row exists yet, so a boot-time seed never clobbers
/// an operator-set status.
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    async fn insert(
        &self,
        scope: ComponentScope,
        status: OperationalStatusEnumType,
        replace: bool,
    ) -> DomainResult<()>;

    /// Effective status for the scope; `Operative` when never persisted.
    async fn get(&self, scope: ComponentScope) -> DomainResult<OperationalStatusEnumType>;
}
