//! Authorization cache entry

use chrono::{DateTime, Utc};
use rust_ocpp::v2_0_1::datatypes::id_token_info_type::IdTokenInfoType;
use rust_ocpp::v2_0_1::datatypes::id_token_type::IdTokenType;
use sha2::{Digest, Sha256};

/// One cached authorization answer, keyed by a hash of the id token.
///
/// The raw token never touches the store; only its hash does, so a
/// stolen database file does not leak usable RFID identifiers.
#[derive(Debug, Clone)]
pub struct CachedIdToken {
    pub token_hash: String,
    pub info: IdTokenInfoType,
    pub last_used: DateTime<Utc>,
}

impl CachedIdToken {
    /// Whether the entry has passed its own cacheExpiryDateTime or the
    /// station-wide cache lifetime, whichever comes first.
    pub fn is_expired(&self, now: DateTime<Utc>, cache_lifetime_s: Option<u64>) -> bool {
        if let Some(expiry) = self.info.cache_expiry_date_time {
            if expiry <= now {
                return true;
            }
        }
        if let Some(lifetime) = cache_lifetime_s {
            let age = now.signed_duration_since(self.last_used).num_seconds();
            if age >= 0 && age as u64 >= lifetime {
                return true;
            }
        }
        false
    }
}

/// Hash of an id token used as the cache key. Tokens of different
/// types with the same value must not collide.
pub fn id_token_hash(token: &IdTokenType) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{:?}", token.kind).as_bytes());
    hasher.update(b":");
    hasher.update(token.id_token.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_ocpp::v2_0_1::enumerations::authorization_status_enum_type::AuthorizationStatusEnumType;
    use rust_ocpp::v2_0_1::enumerations::id_token_enum_type::IdTokenEnumType;

    fn token(value: &str, kind: IdTokenEnumType) -> IdTokenType {
        IdTokenType {
            id_token: value.to_string(),
            kind,
            additional_info: None,
        }
    }

    fn entry(last_used: DateTime<Utc>, expiry: Option<DateTime<Utc>>) -> CachedIdToken {
        CachedIdToken {
            token_hash: "abc".into(),
            info: IdTokenInfoType {
                status: AuthorizationStatusEnumType::Accepted,
                cache_expiry_date_time: expiry,
                charging_priority: None,
                language1: None,
                evse_id: None,
                language2: None,
                group_id_token: None,
                personal_message: None,
            },
            last_used,
        }
    }

    #[test]
    fn hash_distinguishes_token_types() {
        let a = id_token_hash(&token("TAG01", IdTokenEnumType::ISO14443));
        let b = id_token_hash(&token("TAG01", IdTokenEnumType::Central));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable() {
        let t = token("TAG01", IdTokenEnumType::ISO14443);
        assert_eq!(id_token_hash(&t), id_token_hash(&t));
    }

    #[test]
    fn expires_by_lifetime() {
        let now = Utc::now();
        let e = entry(now - chrono::Duration::seconds(20), None);
        assert!(e.is_expired(now, Some(15)));
        assert!(!e.is_expired(now, Some(30)));
        assert!(!e.is_expired(now, None));
    }

    #[test]
    fn expires_by_own_expiry_date() {
        let now = Utc::now();
        let e = entry(now, Some(now - chrono::Duration::seconds(1)));
        assert!(e.is_expired(now, None));
    }
}
