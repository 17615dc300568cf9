//! Connection options derived from a network connection profile

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::config::{NetworkConfig, NetworkConnectionProfile};
use crate::support::errors::StationError;

/// Everything one connection attempt needs.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Final endpoint including the charge point identity path segment.
    pub endpoint: Url,
    pub security_profile: u8,
    pub basic_auth: Option<(String, String)>,
    /// None disables application-level pings.
    pub ping_interval: Option<Duration>,
    pub pong_timeout: Duration,
    pub trust_anchor_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
}

impl ConnectionOptions {
    pub fn from_profile(
        profile: &NetworkConnectionProfile,
        network: &NetworkConfig,
        charge_point_id: &str,
    ) -> Result<Self, StationError> {
        let endpoint = endpoint_url(&profile.csms_url, profile.security_profile, charge_point_id)
            .map_err(StationError::Config)?;

        let basic_auth = match (&profile.basic_auth_user, &profile.basic_auth_password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            (Some(user), None) => Some((user.clone(), String::new())),
            _ => None,
        };

        Ok(Self {
            endpoint,
            security_profile: profile.security_profile,
            basic_auth,
            ping_interval: match network.ping_interval_s {
                0 => None,
                s => Some(Duration::from_secs(s)),
            },
            pong_timeout: Duration::from_secs(network.pong_timeout_s),
            trust_anchor_path: profile.trust_anchor_path.clone(),
            client_cert_path: profile.client_cert_path.clone(),
            client_key_path: profile.client_key_path.clone(),
        })
    }

    pub fn is_tls(&self) -> bool {
        self.endpoint.scheme() == "wss"
    }
}

/// Build the CSMS endpoint URL for a profile.
///
/// The configured URI may carry a `ws://`/`wss://` scheme or none at
/// all; whatever is there is stripped and the scheme is re-derived from
/// the security profile (1 = plain, 2/3 = TLS). The charge point
/// identity becomes the last path segment.
pub fn endpoint_url(
    raw: &str,
    security_profile: u8,
    charge_point_id: &str,
) -> Result<Url, String> {
    let stripped = raw
        .strip_prefix("ws://")
        .or_else(|| raw.strip_prefix("wss://"))
        .unwrap_or(raw);

    let scheme = if security_profile >= 2 { "wss" } else { "ws" };
    let mut url = Url::parse(&format!("{}://{}", scheme, stripped))
        .map_err(|e| format!("Invalid CSMS URL '{}': {}", raw, e))?;

    url.path_segments_mut()
        .map_err(|_| format!("CSMS URL '{}' cannot carry a path", raw))?
        .pop_if_empty()
        .push(charge_point_id);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_follows_security_profile() {
        let plain = endpoint_url("csms.example.com/ocpp", 1, "cp001").unwrap();
        assert_eq!(plain.as_str(), "ws://csms.example.com/ocpp/cp001");

        let tls = endpoint_url("csms.example.com/ocpp", 2, "cp001").unwrap();
        assert_eq!(tls.as_str(), "wss://csms.example.com/ocpp/cp001");
    }

    #[test]
    fn configured_scheme_is_stripped_first() {
        // A ws:// prefix in the profile must not defeat TLS selection.
        let url = endpoint_url("ws://csms.example.com/ocpp", 3, "cp001").unwrap();
        assert_eq!(url.scheme(), "wss");

        let url = endpoint_url("wss://csms.example.com/ocpp", 1, "cp001").unwrap();
        assert_eq!(url.scheme(), "ws");
    }

    #[test]
    fn port_and_base_path_survive() {
        let url = endpoint_url("csms.example.com:9220/base/path", 1, "cp 1").unwrap();
        assert_eq!(url.port(), Some(9220));
        // The identity is percent-encoded as a path segment.
        assert!(url.path().starts_with("/base/path/"));
        assert!(url.path().ends_with("cp%201"));
    }

    #[test]
    fn trailing_slash_does_not_double() {
        let url = endpoint_url("csms.example.com/ocpp/", 1, "cp001").unwrap();
        assert_eq!(url.path(), "/ocpp/cp001");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(endpoint_url("://", 1, "cp001").is_err());
    }
}
