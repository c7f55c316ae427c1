use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{PgPool, Postgres};
use tokio::time::Instant;

use crate::cleanup::statement::DeleteStatement;
use crate::error::{MaintenanceError, Result};

const APPLICATION_NAME: &str = "pg-maintenance";

// Longer budgets are capped here; the same horizon tokio uses for "never".
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// statement_timeout is an int4 of milliseconds.
const MAX_STATEMENT_TIMEOUT_MS: u128 = i32::MAX as u128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disable,
    #[default]
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    fn to_pg(self) -> PgSslMode {
        match self {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyCa => PgSslMode::VerifyCa,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

impl FromStr for SslMode {
    type Err = MaintenanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(MaintenanceError::InvalidSetting {
                name: "ssl mode",
                reason: format!(
                    "unsupported value {other:?}, expected one of disable, require, verify-ca, verify-full"
                ),
            }),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the database lives and how to reach it.
#[derive(Clone)]
pub enum Target {
    Url(String),
    Parts {
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
        ssl_mode: SslMode,
    },
}

// Credentials never reach the logs.
impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Url(_) => f.write_str("Url(<redacted>)"),
            Target::Parts {
                host,
                port,
                database,
                username,
                ssl_mode,
                ..
            } => f
                .debug_struct("Parts")
                .field("host", host)
                .field("port", port)
                .field("database", database)
                .field("username", username)
                .field("ssl_mode", ssl_mode)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub target: Target,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl ConnectOptions {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            max_connections: 4,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    fn pg_options(&self) -> Result<PgConnectOptions> {
        let opts = match &self.target {
            Target::Url(url) => {
                PgConnectOptions::from_str(url).map_err(|e| MaintenanceError::InvalidSetting {
                    name: "database url",
                    reason: e.to_string(),
                })?
            }
            Target::Parts {
                host,
                port,
                database,
                username,
                password,
                ssl_mode,
            } => PgConnectOptions::new()
                .host(host)
                .port(*port)
                .database(database)
                .username(username)
                .password(password)
                .ssl_mode(ssl_mode.to_pg()),
        };
        Ok(opts.application_name(APPLICATION_NAME))
    }
}

/// Per-operation cancellation point. A zero timeout disables it entirely.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
    budget: Duration,
}

impl Deadline {
    pub fn none() -> Self {
        Self {
            at: None,
            budget: Duration::ZERO,
        }
    }

    pub fn after(timeout: Duration) -> Self {
        if timeout.is_zero() {
            return Self::none();
        }
        Self {
            at: Some(Instant::now() + timeout.min(FAR_FUTURE)),
            budget: timeout,
        }
    }

    pub fn is_set(&self) -> bool {
        self.at.is_some()
    }

    /// Milliseconds left for the server-side `statement_timeout`: never zero
    /// (zero means "no limit" to Postgres) and never above its int4 range.
    fn remaining_millis(&self) -> Option<u128> {
        self.at.map(|at| {
            at.saturating_duration_since(Instant::now())
                .as_millis()
                .clamp(1, MAX_STATEMENT_TIMEOUT_MS)
        })
    }

    /// Await `fut`, giving up once the deadline passes.
    pub async fn bound<F, T>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        match self.at {
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| MaintenanceError::Timeout {
                    operation,
                    after: self.budget,
                }),
            None => Ok(fut.await),
        }
    }
}

/// The single live pool used for a whole run.
#[derive(Clone)]
pub struct Session {
    pool: PgPool,
}

impl Session {
    pub async fn connect(opts: &ConnectOptions) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections.clamp(1, 32))
            .acquire_timeout(opts.acquire_timeout)
            .connect_with(opts.pg_options()?)
            .await
            .map_err(MaintenanceError::Connect)?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self, timeout: Duration) -> Result<()> {
        let pinged = Deadline::after(timeout)
            .bound("ping", sqlx::query("SELECT 1").execute(&self.pool))
            .await;
        match pinged {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(MaintenanceError::Ping(e)),
            Err(_) => Err(MaintenanceError::PingTimeout(timeout)),
        }
    }

    /// Open a transaction whose statements must finish before `deadline`.
    pub async fn begin(&self, deadline: Deadline) -> Result<Transaction> {
        let mut inner = deadline
            .bound("begin", self.pool.begin())
            .await?
            .map_err(MaintenanceError::Begin)?;

        // Server-side guard so an overrunning DELETE is cancelled by Postgres too.
        if let Some(ms) = deadline.remaining_millis() {
            deadline
                .bound(
                    "begin",
                    sqlx::query("SELECT set_config('statement_timeout', $1, true)")
                        .bind(ms.to_string())
                        .execute(&mut *inner),
                )
                .await?
                .map_err(MaintenanceError::Begin)?;
        }

        Ok(Transaction { inner, deadline })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub struct Transaction {
    inner: sqlx::Transaction<'static, Postgres>,
    deadline: Deadline,
}

impl Transaction {
    pub async fn execute(
        &mut self,
        statement: &DeleteStatement,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let mut query = sqlx::query(statement.sql()).bind(cutoff);
        if let Some(limit) = statement.limit() {
            query = query.bind(limit);
        }

        let done = self
            .deadline
            .bound("delete", query.execute(&mut *self.inner))
            .await?
            .map_err(|source| MaintenanceError::Query {
                table: statement.table().to_string(),
                column: statement.column().to_string(),
                source,
            })?;

        Ok(done.rows_affected())
    }

    pub async fn commit(self, table: &str) -> Result<()> {
        let deadline = self.deadline;
        deadline
            .bound("commit", self.inner.commit())
            .await?
            .map_err(|source| MaintenanceError::Commit {
                table: table.to_string(),
                source,
            })
    }

    /// Best effort: we are already failing, so a rollback error is only logged.
    pub async fn rollback(self) {
        if let Err(e) = self.inner.rollback().await {
            tracing::warn!(error = %e, "rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssl_mode_accepts_known_values() {
        for mode in ["disable", "require", "verify-ca", "verify-full"] {
            let parsed: SslMode = mode.parse().unwrap();
            assert_eq!(parsed.as_str(), mode);
        }
        assert_eq!("REQUIRE".parse::<SslMode>().unwrap(), SslMode::Require);
        assert!("verify-cy".parse::<SslMode>().is_err());
        assert!("prefer".parse::<SslMode>().is_err());
    }

    #[test]
    fn debug_output_hides_credentials() {
        let target = Target::Parts {
            host: "db".into(),
            port: 5432,
            database: "app".into(),
            username: "maint".into(),
            password: "hunter2".into(),
            ssl_mode: SslMode::Require,
        };
        let shown = format!("{target:?}");
        assert!(!shown.contains("hunter2"), "{shown}");
        assert!(shown.contains("maint"), "{shown}");

        let url = Target::Url("postgres://u:hunter2@db/app".into());
        assert!(!format!("{url:?}").contains("hunter2"));
    }

    #[test]
    fn bad_url_is_a_setting_error() {
        let opts = ConnectOptions::new(Target::Url("not a url".into()));
        assert!(matches!(
            opts.pg_options(),
            Err(MaintenanceError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        assert!(!Deadline::after(Duration::ZERO).is_set());
        assert!(Deadline::after(Duration::from_secs(1)).is_set());
        assert_eq!(Deadline::none().remaining_millis(), None);
    }

    #[tokio::test]
    async fn huge_timeout_is_capped_instead_of_overflowing() {
        let deadline = Deadline::after(Duration::from_secs(u64::MAX));
        assert!(deadline.is_set());

        let out = deadline.bound("delete", async { 3 }).await.unwrap();
        assert_eq!(out, 3);
    }

    #[test]
    fn server_statement_timeout_stays_in_int4_range() {
        let thirty_days = Deadline::after(Duration::from_secs(30 * 86_400));
        assert_eq!(thirty_days.remaining_millis(), Some(i32::MAX as u128));

        let huge = Deadline::after(Duration::from_secs(u64::MAX));
        assert_eq!(huge.remaining_millis(), Some(i32::MAX as u128));

        let short = Deadline::after(Duration::from_secs(5)).remaining_millis().unwrap();
        assert!(short > 4_000 && short <= 5_000, "{short}");
    }

    #[tokio::test]
    async fn unset_deadline_never_cancels() {
        let out = Deadline::after(Duration::ZERO)
            .bound("delete", async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                7
            })
            .await
            .unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn expired_deadline_cancels() {
        let err = Deadline::after(Duration::from_millis(10))
            .bound("delete", tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MaintenanceError::Timeout {
                operation: "delete",
                ..
            }
        ));
    }
}
