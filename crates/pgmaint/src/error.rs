use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = MaintenanceError> = std::result::Result<T, E>;

/// Broad failure class, used to pick the operator-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input detected before any SQL runs.
    Config,
    /// The database could not be reached at startup.
    Connection,
    /// A batch failed to begin, execute or commit.
    Database,
}

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("invalid table spec {spec:?}: {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("{0} is required")]
    MissingSetting(&'static str),

    #[error("invalid {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("failed to connect to database")]
    Connect(#[source] sqlx::Error),

    #[error("database ping failed")]
    Ping(#[source] sqlx::Error),

    #[error("database did not answer ping within {0:?}")]
    PingTimeout(Duration),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("failed to begin transaction")]
    Begin(#[source] sqlx::Error),

    #[error("failed to delete from {table} by {column}")]
    Query {
        table: String,
        column: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to commit batch for {table}")]
    Commit {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("cleanup of {table} aborted after {committed} committed rows")]
    Table {
        table: String,
        committed: u64,
        #[source]
        source: Box<MaintenanceError>,
    },
}

impl MaintenanceError {
    pub fn invalid_spec(spec: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSpec { .. } | Self::MissingSetting(_) | Self::InvalidSetting { .. } => {
                ErrorKind::Config
            }
            Self::Connect(_) | Self::Ping(_) | Self::PingTimeout(_) => ErrorKind::Connection,
            Self::Timeout { .. } | Self::Begin(_) | Self::Query { .. } | Self::Commit { .. } => {
                ErrorKind::Database
            }
            Self::Table { source, .. } => source.kind(),
        }
    }
}
