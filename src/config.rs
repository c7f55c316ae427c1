use std::time::Duration;

use clap::Parser;
use pgmaint::{CleanupConfig, ConnectOptions, MaintenanceError, SslMode, TableSpec, Target};

/// Deletes rows older than a retention window from PostgreSQL tables.
#[derive(Parser, Debug)]
#[command(name = "pg-maintenance", version, about, long_about = None)]
pub struct Args {
    /// Database host
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    pub host: String,

    /// Database port
    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    pub port: u16,

    /// Database name
    #[arg(long = "dbname", env = "DB_NAME")]
    pub db_name: Option<String>,

    /// SSL mode: disable, require, verify-ca or verify-full
    #[arg(long, env = "DB_SSL_MODE", default_value = "require")]
    pub ssl_mode: String,

    #[arg(long, env = "DB_USERNAME", hide_env_values = true)]
    pub db_username: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Full connection URL; replaces host, port, name, credentials and SSL mode
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Table(s) in table[:timestamp_column=created_at[:days=0]] format
    #[arg(long = "table", env = "TABLES", value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Rows deleted per transaction, 0 deletes everything in one go
    #[arg(long = "batch", env = "BATCH_SIZE", default_value_t = 0)]
    pub batch_size: u32,

    /// Single db operation timeout (e.g. 60s, 500ms, 5m), 0 disables it
    #[arg(long, env = "OPERATION_TIMEOUT", default_value = "60s", value_parser = parse_duration)]
    pub timeout: Duration,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 4)]
    pub max_connections: u32,

    #[arg(long, env = "DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 10)]
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub connect: ConnectOptions,
    pub tables: Vec<TableSpec>,
    pub cleanup: CleanupConfig,
}

impl Config {
    /// Validate everything up front; nothing here touches the network.
    pub fn from_args(args: Args) -> Result<Self, MaintenanceError> {
        if args.tables.is_empty() {
            return Err(MaintenanceError::MissingSetting("at least one --table"));
        }
        // Validated exactly as given: blanks and stray whitespace are errors.
        let tables = TableSpec::parse_all(&args.tables)?;

        let target = match args.database_url.filter(|s| !s.trim().is_empty()) {
            Some(url) => Target::Url(url),
            None => Target::Parts {
                host: args.host,
                port: args.port,
                database: required(args.db_name, "--dbname (DB_NAME)")?,
                username: required(args.db_username, "DB_USERNAME")?,
                password: required(args.db_password, "DB_PASSWORD")?,
                ssl_mode: args.ssl_mode.parse::<SslMode>()?,
            },
        };

        let mut connect = ConnectOptions::new(target);
        connect.max_connections = args.max_connections.clamp(1, 32);
        connect.acquire_timeout = Duration::from_secs(args.acquire_timeout_secs.clamp(1, 60));

        Ok(Self {
            connect,
            tables,
            cleanup: CleanupConfig {
                batch_size: args.batch_size,
                timeout: args.timeout,
            },
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, MaintenanceError> {
    value
        .filter(|s| !s.trim().is_empty())
        .ok_or(MaintenanceError::MissingSetting(name))
}

/// `60s`, `500ms`, `5m`, `1h`, or bare seconds. `0` disables the timeout.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (value, unit) = s.split_at(split);

    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration {s:?}, expected e.g. 60s"))?;

    match unit {
        "" | "s" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" => secs(value, 60, s),
        "h" => secs(value, 3600, s),
        other => Err(format!("unknown duration unit {other:?}, use ms, s, m or h")),
    }
}

fn secs(value: u64, unit: u64, raw: &str) -> Result<Duration, String> {
    value
        .checked_mul(unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration {raw:?} is out of range"))
}
