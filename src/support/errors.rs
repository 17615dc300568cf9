use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("EVSE {0} has no active transaction")]
    NoActiveTransaction(i32),

    #[error("CSMS is not reachable")]
    Offline,

    #[error("No response from CSMS for {0}")]
    CallTimeout(String),
}

impl DomainError {
    /// Whether this error is likely transient (e.g. DB connection lost)
    /// and the operation may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            // DB errors mapped from repositories contain "Database error:" prefix
            DomainError::Validation(msg) => msg.starts_with("Database error:"),
            DomainError::Offline | DomainError::CallTimeout(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Schema version {on_disk} is newer than this binary supports ({supported})")]
    SchemaTooNew { on_disk: String, supported: String },
}

#[derive(Debug, Error)]
pub enum StationError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error("Configuration: {0}")]
    Config(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
pub type StationResult<T> = Result<T, StationError>;
