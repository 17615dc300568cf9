//! Persistent store: SQLite via SeaORM
//!
//! One database file per station. Migrations are forward-only and
//! numbered; opening a database whose migration history contains
//! versions this binary does not know is refused (a downgraded binary
//! must not write into a newer schema).

pub mod entities;
pub mod migrator;
pub mod repositories;

pub use repositories::SeaOrmStore;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::support::errors::InfraError;
use migrator::Migrator;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://./station.db?mode=rwc")
    pub url: String,
}

impl DatabaseConfig {
    /// Create config for a SQLite file
    pub fn sqlite(path: &str) -> Self {
        Self {
            url: format!("sqlite://{}?mode=rwc", path),
        }
    }

    /// In-memory database for tests
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
        }
    }
}

/// Connect, verify the on-disk schema is not newer than this binary,
/// then apply pending migrations.
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, InfraError> {
    info!("Connecting to database: {}", config.url);

    let mut opts = ConnectOptions::new(&config.url);
    opts.sqlx_logging(false); // We use tracing instead

    let db = Database::connect(opts).await.map_err(InfraError::Database)?;

    ensure_schema_supported(&db).await?;

    info!("Running database migrations...");
    Migrator::up(&db, None).await.map_err(InfraError::Database)?;
    info!("Database ready");
    Ok(db)
}

/// Refuse to open a store whose migration history contains versions
/// unknown to this binary.
pub async fn ensure_schema_supported(db: &DatabaseConnection) -> Result<(), InfraError> {
    let known: Vec<String> = Migrator::migrations()
        .iter()
        .map(|m| m.name().to_string())
        .collect();

    let backend = db.get_database_backend();
    let rows = match db
        .query_all(Statement::from_string(
            backend,
            "SELECT version FROM seaql_migrations ORDER BY version".to_string(),
        ))
        .await
    {
        Ok(rows) => rows,
        // Fresh database: the bookkeeping table does not exist yet.
        Err(_) => return Ok(()),
    };

    for row in rows {
        let applied: String = row
            .try_get("", "version")
            .map_err(InfraError::Database)?;
        if !known.contains(&applied) {
            return Err(InfraError::SchemaTooNew {
                on_disk: applied,
                supported: known.last().cloned().unwrap_or_default(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_database_migrates() {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        // Second guard pass over a fully migrated store succeeds.
        ensure_schema_supported(&db).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_migration_version_is_refused() {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        let backend = db.get_database_backend();
        db.execute(Statement::from_string(
            backend,
            "INSERT INTO seaql_migrations (version, applied_at) VALUES ('m20990101_000099_from_the_future', 0)"
                .to_string(),
        ))
        .await
        .unwrap();

        let err = ensure_schema_supported(&db).await.unwrap_err();
        assert!(matches!(err, InfraError::SchemaTooNew { .. }));
    }
}
