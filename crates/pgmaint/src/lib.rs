//! Deletes aged rows from PostgreSQL tables in bounded, independently
//! committed batches.

pub mod cleanup;
pub mod db;
pub mod error;
pub mod ident;
pub mod spec;

pub use cleanup::{Cleaner, CleanupConfig, RunReport, TableReport};
pub use db::{ConnectOptions, Session, SslMode, Target};
pub use error::{ErrorKind, MaintenanceError, Result};
pub use spec::TableSpec;
