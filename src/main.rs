//! Texnouz Station binary
//!
//! OCPP 2.0.1 charging station client. Reads configuration from a JSON
//! file (./station.json or $STATION_CONFIG), opens the station store,
//! and runs the protocol task until SIGTERM/SIGINT.

use tracing::{error, info};

use texnouz_station::application::{Callbacks, ChargePoint};
use texnouz_station::config::{default_config_path, StationConfig};
use texnouz_station::infrastructure::{init_database, DatabaseConfig, SeaOrmStore};
use texnouz_station::support::shutdown::listen_for_shutdown_signals;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Load configuration ─────────────────────────────────────
    let config_path = std::env::var("STATION_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let config = match StationConfig::load(&config_path) {
        Ok(config) => {
            init_logging(&config.logging.level, &config.logging.format);
            info!("Configuration loaded from {}", config_path.display());
            config
        }
        Err(e) => {
            init_logging("info", "text");
            // A broken configuration is fatal: a charging station must
            // not guess which CSMS to talk to.
            error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    info!(
        charge_point_id = config.station.charge_point_id.as_str(),
        "Starting Texnouz Station..."
    );

    // ── Persistent store ───────────────────────────────────────
    let db_config = DatabaseConfig::sqlite(&config.database.path);
    let db = match init_database(&db_config).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open station store: {}", e);
            return Err(e.into());
        }
    };
    let store = SeaOrmStore::new(db);

    // ── Protocol task ──────────────────────────────────────────
    let charge_point = ChargePoint::new(config, store, Callbacks::default())?;
    let shutdown = charge_point.shutdown_signal();

    tokio::spawn(listen_for_shutdown_signals(shutdown));

    charge_point.run().await?;
    info!("Bye");
    Ok(())
}

fn init_logging(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
