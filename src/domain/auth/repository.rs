//! Authorization cache and local authorization list persistence traits

use async_trait::async_trait;
use rust_ocpp::v2_0_1::datatypes::authorization_data::AuthorizationData;
use rust_ocpp::v2_0_1::datatypes::id_token_info_type::IdTokenInfoType;
use rust_ocpp::v2_0_1::datatypes::id_token_type::IdTokenType;

use super::model::CachedIdToken;
use crate::support::errors::DomainResult;

/// AUTH_CACHE table: tokens learned from CSMS answers, LRU-tracked.
#[async_trait]
pub trait AuthCacheRepository: Send + Sync {
    /// Insert or replace the entry for `token_hash`.
    async fn insert(&self, token_hash: &str, info: &IdTokenInfoType) -> DomainResult<()>;

    /// Bump the last-used timestamp of an entry, if present.
    async fn touch(&self, token_hash: &str) -> DomainResult<()>;

    async fn get(&self, token_hash: &str) -> DomainResult<Option<CachedIdToken>>;

    async fn delete(&self, token_hash: &str) -> DomainResult<()>;

    /// Remove entries past their own expiry or the given lifetime.
    async fn delete_expired(&self, cache_lifetime_s: Option<u64>) -> DomainResult<u64>;

    /// Remove up to `n` entries starting with the least recently used.
    async fn delete_oldest(&self, n: u64) -> DomainResult<u64>;

    async fn clear(&self) -> DomainResult<()>;

    /// Approximate byte size of the stored cache.
    async fn binary_size(&self) -> DomainResult<u64>;
}

/// AUTH_LIST + AUTH_LIST_VERSION tables: CSMS-managed local list.
#[async_trait]
pub trait AuthListRepository: Send + Sync {
    async fn version(&self) -> DomainResult<i32>;

    async fn set_version(&self, version: i32) -> DomainResult<()>;

    async fn upsert_entry(
        &self,
        id_token: &IdTokenType,
        info: &IdTokenInfoType,
    ) -> DomainResult<()>;

    async fn delete_entry(&self, id_token: &IdTokenType) -> DomainResult<()>;

    async fn get_entry(&self, id_token: &IdTokenType) -> DomainResult<Option<IdTokenInfoType>>;

    /// Apply a SendLocalList update atomically: entries without info are
    /// deletions (differential update), entries with info are upserts,
    /// and the version is stored with them.
    async fn apply_update(
        &self,
        version: i32,
        full: bool,
        entries: &[AuthorizationData],
    ) -> DomainResult<()>;

    async fn clear(&self) -> DomainResult<()>;

    async fn count(&self) -> DomainResult<u64>;
}
