//! Configuration module
//!
//! JSON-based station configuration with auto-creation and defaults.
//! A missing required network profile is fatal at startup; the station
//! never runs on a guessed CSMS endpoint.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root station configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Station identity reported in BootNotification
    #[serde(default)]
    pub station: StationIdentity,

    /// EVSE topology: element `i` describes EVSE id `i + 1`
    #[serde(default = "default_evses")]
    pub evses: Vec<EvseConfig>,

    /// Networking: connection profiles and websocket behaviour
    #[serde(default)]
    pub network: NetworkConfig,

    /// Outbound message queue behaviour
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Heartbeat and meter-value cadence
    #[serde(default)]
    pub metering: MeteringConfig,

    /// Authorization cache settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Persistent store settings
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Graceful shutdown drain window (seconds)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_s: u64,
}

/// Identity fields sent to the CSMS at boot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationIdentity {
    /// Charge point identity appended to the CSMS URL path
    #[serde(default = "default_charge_point_id")]
    pub charge_point_id: String,

    #[serde(default = "default_vendor")]
    pub vendor: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub serial_number: Option<String>,

    #[serde(default)]
    pub firmware_version: Option<String>,
}

/// One EVSE and its connector count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvseConfig {
    /// Number of physical connectors, ids starting at 1
    #[serde(default = "default_connector_count")]
    pub connectors: u32,
}

/// Networking section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Connection profiles tried in `configuration_slot` order
    #[serde(default = "default_profiles")]
    pub profiles: Vec<NetworkConnectionProfile>,

    /// Application-level ping cadence; 0 disables pings
    #[serde(default = "default_ping_interval")]
    pub ping_interval_s: u64,

    /// Close the link when no pong arrives within this window
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_s: u64,

    /// When true, a closed link is reported upward and never redialed
    #[serde(default)]
    pub disable_automatic_reconnects: bool,

    /// Within-profile retry backoff
    #[serde(default)]
    pub retry: RetrySettings,
}

/// A single prioritized route to the CSMS.
///
/// `csms_url` may be given with or without a `ws://`/`wss://` scheme;
/// the scheme is derived from `security_profile` when connecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConnectionProfile {
    pub configuration_slot: i32,

    pub csms_url: String,

    /// OCPP security profile: 1 = basic+plain, 2 = basic+TLS, 3 = cert+TLS
    #[serde(default = "default_security_profile")]
    pub security_profile: u8,

    /// Network interface this profile depends on (e.g. "eth0")
    #[serde(default)]
    pub interface: Option<String>,

    #[serde(default)]
    pub basic_auth_user: Option<String>,

    #[serde(default)]
    pub basic_auth_password: Option<String>,

    /// PEM bundle of trust anchors for the CSMS certificate chain
    #[serde(default)]
    pub trust_anchor_path: Option<PathBuf>,

    /// Client certificate + key for security profile 3
    #[serde(default)]
    pub client_cert_path: Option<PathBuf>,

    #[serde(default)]
    pub client_key_path: Option<PathBuf>,
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_initial_retry")]
    pub initial_retry_s: u64,

    #[serde(default = "default_max_retry")]
    pub max_retry_s: u64,

    /// Attempts on one profile before advancing to the next slot
    #[serde(default = "default_backoff_max_attempts")]
    pub max_attempts_per_profile: u32,

    /// Extra delay inserted after every profile has been tried once
    #[serde(default = "default_profile_cycle_delay")]
    pub profile_cycle_delay_s: u64,
}

/// Message queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Response deadline for an in-flight Call
    #[serde(default = "default_message_timeout")]
    pub message_timeout_s: u64,

    /// Transmission attempts before a Call is dropped as timed out
    #[serde(default = "default_message_attempts")]
    pub message_max_attempts: u32,
}

/// Heartbeat and meter sampling cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeteringConfig {
    /// Fallback heartbeat cadence until the CSMS dictates one
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_s: u64,

    /// Clock-aligned MeterValues cadence (0 disables)
    #[serde(default = "default_aligned_interval")]
    pub aligned_data_interval_s: u64,

    /// Transaction-relative sampling cadence (0 disables)
    #[serde(default = "default_sampled_interval")]
    pub sampled_data_interval_s: u64,
}

/// Authorization cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Unused cache entries expire after this many seconds
    #[serde(default = "default_auth_cache_lifetime")]
    pub cache_lifetime_s: u64,

    /// Soft cap on the cache table size; LRU-evicted beyond it
    #[serde(default = "default_auth_cache_bytes")]
    pub cache_max_bytes: u64,
}

/// Persistent store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" (human-readable) or "json" (structured)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// ── Default value helpers ──────────────────────────────────────

fn default_charge_point_id() -> String {
    "cp001".into()
}
fn default_vendor() -> String {
    "Texnouz".into()
}
fn default_model() -> String {
    "TX-AC22".into()
}
fn default_connector_count() -> u32 {
    1
}
fn default_evses() -> Vec<EvseConfig> {
    vec![EvseConfig {
        connectors: default_connector_count(),
    }]
}
fn default_profiles() -> Vec<NetworkConnectionProfile> {
    vec![NetworkConnectionProfile {
        configuration_slot: 0,
        csms_url: "localhost:9000/ocpp".into(),
        security_profile: default_security_profile(),
        interface: None,
        basic_auth_user: Some(default_charge_point_id()),
        basic_auth_password: None,
        trust_anchor_path: None,
        client_cert_path: None,
        client_key_path: None,
    }]
}
fn default_security_profile() -> u8 {
    1
}
fn default_ping_interval() -> u64 {
    30
}
fn default_pong_timeout() -> u64 {
    10
}
fn default_initial_retry() -> u64 {
    1
}
fn default_max_retry() -> u64 {
    120
}
fn default_backoff_max_attempts() -> u32 {
    5
}
fn default_profile_cycle_delay() -> u64 {
    30
}
fn default_message_timeout() -> u64 {
    30
}
fn default_message_attempts() -> u32 {
    3
}
fn default_heartbeat_interval() -> u64 {
    300
}
fn default_aligned_interval() -> u64 {
    900
}
fn default_sampled_interval() -> u64 {
    60
}
fn default_auth_cache_lifetime() -> u64 {
    86_400
}
fn default_auth_cache_bytes() -> u64 {
    1_048_576
}
fn default_db_path() -> String {
    "./station.db".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_shutdown_grace() -> u64 {
    10
}

// ── Trait implementations ──────────────────────────────────────

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station: StationIdentity::default(),
            evses: default_evses(),
            network: NetworkConfig::default(),
            messaging: MessagingConfig::default(),
            metering: MeteringConfig::default(),
            auth: AuthConfig::default(),
            database: DatabaseSettings::default(),
            logging: LoggingConfig::default(),
            shutdown_grace_s: default_shutdown_grace(),
        }
    }
}

impl Default for StationIdentity {
    fn default() -> Self {
        Self {
            charge_point_id: default_charge_point_id(),
            vendor: default_vendor(),
            model: default_model(),
            serial_number: None,
            firmware_version: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
            ping_interval_s: default_ping_interval(),
            pong_timeout_s: default_pong_timeout(),
            disable_automatic_reconnects: false,
            retry: RetrySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_retry_s: default_initial_retry(),
            max_retry_s: default_max_retry(),
            max_attempts_per_profile: default_backoff_max_attempts(),
            profile_cycle_delay_s: default_profile_cycle_delay(),
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            message_timeout_s: default_message_timeout(),
            message_max_attempts: default_message_attempts(),
        }
    }
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_s: default_heartbeat_interval(),
            aligned_data_interval_s: default_aligned_interval(),
            sampled_data_interval_s: default_sampled_interval(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cache_lifetime_s: default_auth_cache_lifetime(),
            cache_max_bytes: default_auth_cache_bytes(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// ── Convenience converters ─────────────────────────────────────

impl DatabaseSettings {
    /// Build the SeaORM-compatible connection URL
    pub fn connection_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path)
    }
}

impl StationConfig {
    /// Total connector count across all EVSEs.
    pub fn connector_total(&self) -> u32 {
        self.evses.iter().map(|e| e.connectors).sum()
    }
}

// ── File I/O ───────────────────────────────────────────────────

/// Default configuration file location
pub fn default_config_path() -> PathBuf {
    PathBuf::from("./station.json")
}

impl StationConfig {
    /// Load configuration from a JSON file.
    /// If the file doesn't exist, creates one with defaults.
    /// Environment variables override file values (highest priority).
    pub fn load(path: &Path) -> Result<Self, String> {
        let mut cfg: StationConfig = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
            serde_json::from_str(&content)
                .map_err(|e| format!("Invalid JSON in {}: {}", path.display(), e))?
        } else {
            let cfg = StationConfig::default();
            cfg.save(path)?;
            cfg
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply environment variable overrides for sensitive or
    /// deployment-specific values.
    ///
    /// Supported variables:
    /// - `STATION_CHARGE_POINT_ID` → `station.charge_point_id`
    /// - `STATION_BASIC_AUTH_PASSWORD` → every profile's `basic_auth_password`
    /// - `STATION_DB_PATH` → `database.path`
    /// - `STATION_LOG_LEVEL` → `logging.level`
    /// - `STATION_LOG_FORMAT` → `logging.format`
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("STATION_CHARGE_POINT_ID") {
            self.station.charge_point_id = v;
        }
        if let Ok(v) = std::env::var("STATION_BASIC_AUTH_PASSWORD") {
            for profile in &mut self.network.profiles {
                profile.basic_auth_password = Some(v.clone());
            }
        }
        if let Ok(v) = std::env::var("STATION_DB_PATH") {
            self.database.path = v;
        }
        if let Ok(v) = std::env::var("STATION_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("STATION_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Validate the configuration for common mistakes.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.station.charge_point_id.is_empty() {
            errors.push("station.charge_point_id must not be empty".to_string());
        }

        if self.evses.is_empty() {
            errors.push("at least one EVSE must be configured".to_string());
        }
        for (idx, evse) in self.evses.iter().enumerate() {
            if evse.connectors == 0 {
                errors.push(format!("EVSE {} must have at least one connector", idx + 1));
            }
        }

        if self.network.profiles.is_empty() {
            errors.push("at least one network connection profile is required".to_string());
        }
        for profile in &self.network.profiles {
            if profile.csms_url.is_empty() {
                errors.push(format!(
                    "profile in slot {} has an empty csms_url",
                    profile.configuration_slot
                ));
            }
            if !(1..=3).contains(&profile.security_profile) {
                errors.push(format!(
                    "profile in slot {}: security_profile {} is not in 1..=3",
                    profile.configuration_slot, profile.security_profile
                ));
            }
            if profile.security_profile <= 2 && profile.basic_auth_user.is_none() {
                errors.push(format!(
                    "profile in slot {}: security profile {} requires basic auth credentials",
                    profile.configuration_slot, profile.security_profile
                ));
            }
            if profile.security_profile == 3
                && (profile.client_cert_path.is_none() || profile.client_key_path.is_none())
            {
                errors.push(format!(
                    "profile in slot {}: security profile 3 requires a client certificate and key",
                    profile.configuration_slot
                ));
            }
        }
        {
            let mut slots: Vec<i32> = self
                .network
                .profiles
                .iter()
                .map(|p| p.configuration_slot)
                .collect();
            slots.sort_unstable();
            slots.dedup();
            if slots.len() != self.network.profiles.len() {
                errors.push("network profile configuration_slot values must be unique".to_string());
            }
        }

        if self.network.retry.initial_retry_s == 0 {
            errors.push("retry.initial_retry_s must be at least 1".to_string());
        }
        if self.network.retry.max_retry_s < self.network.retry.initial_retry_s {
            errors.push(format!(
                "retry.max_retry_s ({}) must not be below initial_retry_s ({})",
                self.network.retry.max_retry_s, self.network.retry.initial_retry_s
            ));
        }
        if self.network.retry.max_attempts_per_profile == 0 {
            errors.push("retry.max_attempts_per_profile must be at least 1".to_string());
        }

        if self.messaging.message_timeout_s == 0 {
            errors.push("messaging.message_timeout_s must be at least 1".to_string());
        }
        if self.messaging.message_max_attempts == 0 {
            errors.push("messaging.message_max_attempts must be at least 1".to_string());
        }

        if self.metering.heartbeat_interval_s < 10 {
            errors.push(format!(
                "metering.heartbeat_interval_s ({}) must be at least 10",
                self.metering.heartbeat_interval_s
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "Invalid log level '{}'. Valid: {:?}",
                self.logging.level, valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            errors.push(format!(
                "Invalid log format '{}'. Valid: {:?}",
                self.logging.format, valid_formats
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "Configuration validation failed:\n  • {}",
                errors.join("\n  • ")
            ))
        }
    }

    /// Persist current configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Cannot create dirs {}: {}", parent.display(), e))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Serialization error: {}", e))?;
        std::fs::write(path, content)
            .map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn with_basic_auth(mut cfg: StationConfig) -> StationConfig {
        for p in &mut cfg.network.profiles {
            p.basic_auth_user = Some("cp001".into());
            p.basic_auth_password = Some("hunter2hunter2".into());
        }
        cfg
    }

    #[test]
    fn default_config_validates() {
        let cfg = StationConfig::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_basic_auth_is_error() {
        let mut cfg = StationConfig::default();
        cfg.network.profiles[0].basic_auth_user = None;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("requires basic auth"));
    }

    #[test]
    fn empty_profiles_is_error() {
        let mut cfg = with_basic_auth(StationConfig::default());
        cfg.network.profiles.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("network connection profile"));
    }

    #[test]
    fn duplicate_slots_is_error() {
        let mut cfg = with_basic_auth(StationConfig::default());
        let mut extra = cfg.network.profiles[0].clone();
        extra.csms_url = "backup.example.com/ocpp".into();
        cfg.network.profiles.push(extra);
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("must be unique"));
    }

    #[test]
    fn security_profile_out_of_range() {
        let mut cfg = with_basic_auth(StationConfig::default());
        cfg.network.profiles[0].security_profile = 4;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("not in 1..=3"));
    }

    #[test]
    fn profile_three_requires_client_cert() {
        let mut cfg = with_basic_auth(StationConfig::default());
        cfg.network.profiles[0].security_profile = 3;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("client certificate"));
    }

    #[test]
    fn zero_connectors_is_error() {
        let mut cfg = with_basic_auth(StationConfig::default());
        cfg.evses[0].connectors = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("at least one connector"));
    }

    #[test]
    fn max_retry_below_initial_is_error() {
        let mut cfg = with_basic_auth(StationConfig::default());
        cfg.network.retry.initial_retry_s = 60;
        cfg.network.retry.max_retry_s = 30;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("max_retry_s"));
    }

    #[test]
    fn invalid_log_level() {
        let mut cfg = with_basic_auth(StationConfig::default());
        cfg.logging.level = "verbose".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("Invalid log level"));
    }

    #[test]
    fn connector_total_sums_evses() {
        let mut cfg = StationConfig::default();
        cfg.evses = vec![EvseConfig { connectors: 2 }, EvseConfig { connectors: 1 }];
        assert_eq!(cfg.connector_total(), 3);
    }

    #[test]
    fn connection_url_is_sqlite() {
        let cfg = DatabaseSettings::default();
        assert!(cfg.connection_url().starts_with("sqlite://"));
    }

    #[test]
    fn save_and_reload() {
        let dir = std::env::temp_dir().join("station_test_config");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("station.json");

        let cfg = with_basic_auth(StationConfig::default());
        cfg.save(&path).unwrap();
        assert!(path.exists());

        let loaded = StationConfig::load(&path).unwrap();
        assert_eq!(loaded.station.charge_point_id, cfg.station.charge_point_id);
        assert_eq!(loaded.network.profiles.len(), cfg.network.profiles.len());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn multiple_validation_errors() {
        let mut cfg = with_basic_auth(StationConfig::default());
        cfg.station.charge_point_id = String::new();
        cfg.metering.heartbeat_interval_s = 1;
        cfg.logging.format = "xml".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("•"));
        assert!(err.contains("charge_point_id"));
        assert!(err.contains("heartbeat_interval_s"));
        assert!(err.contains("Invalid log format"));
    }
}
