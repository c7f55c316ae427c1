mod config;

use std::time::Duration;

use clap::Parser;
use pgmaint::{Cleaner, ErrorKind, Session};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const PING_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = match config::Config::from_args(config::Args::parse()) {
        Ok(cfg) => cfg,
        Err(e) => return Err(fatal(e)),
    };

    info!(
        tables = cfg.tables.len(),
        batch_size = cfg.cleanup.batch_size,
        timeout = ?cfg.cleanup.timeout,
        "pg-maintenance starting"
    );

    let session = match Session::connect(&cfg.connect).await {
        Ok(session) => session,
        Err(e) => return Err(fatal(e)),
    };
    if let Err(e) = session.ping(PING_TIMEOUT).await {
        session.close().await;
        return Err(fatal(e));
    }
    info!("connected to the database");

    // One notion of "now" for every table in this run.
    let now = chrono::Local::now();
    let cleaner = Cleaner::new(session, cfg.cleanup);
    let outcome = cleaner.run(&cfg.tables, &now).await;
    cleaner.into_executor().close().await;

    match outcome {
        Ok(report) => {
            info!(
                tables = report.tables.len(),
                deleted = report.total_deleted(),
                "maintenance finished"
            );
            Ok(())
        }
        Err(e) => Err(fatal(e)),
    }
}

fn fatal(e: pgmaint::MaintenanceError) -> anyhow::Error {
    let stage = match e.kind() {
        ErrorKind::Config => "configuration error",
        ErrorKind::Connection => "database unreachable",
        ErrorKind::Database => "cleanup failed",
    };
    let err = anyhow::Error::new(e).context(stage);
    error!("{err:#}");
    err
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
