use std::time::Duration;

use chrono::{DateTime, TimeZone};
use tracing::info;

use crate::cleanup::batch::{cutoff_days, BatchExecutor, DeletionJob, TableReport};
use crate::error::{MaintenanceError, Result};
use crate::spec::TableSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupConfig {
    /// Rows per transaction; 0 deletes everything qualifying at once.
    pub batch_size: u32,
    /// Deadline for each batch transaction; zero disables it.
    pub timeout: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            batch_size: 0,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub tables: Vec<TableReport>,
}

impl RunReport {
    pub fn total_deleted(&self) -> u64 {
        self.tables.iter().map(|t| t.total_deleted).sum()
    }
}

/// Runs the deletion loop over every table, one after another.
pub struct Cleaner<E> {
    executor: E,
    config: CleanupConfig,
}

impl<E: BatchExecutor> Cleaner<E> {
    pub fn new(executor: E, config: CleanupConfig) -> Self {
        Self { executor, config }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Clean `specs` in order against the single `now` of this run.
    ///
    /// Stops at the first failing table; later tables are left untouched.
    pub async fn run<Tz: TimeZone>(
        &self,
        specs: &[TableSpec],
        now: &DateTime<Tz>,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();

        for spec in specs {
            let cutoff = cutoff_days(now, spec.retention_days()).ok_or_else(|| {
                MaintenanceError::invalid_spec(
                    &spec.to_string(),
                    "retention window is out of the supported date range",
                )
            })?;

            let job = DeletionJob::new(spec, self.config.batch_size, cutoff);
            match job.run(&self.executor, self.config.timeout).await {
                Ok(table) => {
                    info!(
                        table = %table.table,
                        deleted = table.total_deleted,
                        batches = table.batches,
                        "table done"
                    );
                    report.tables.push(table);
                }
                Err(e) => {
                    if !report.tables.is_empty() {
                        info!(
                            completed = report.tables.len(),
                            deleted = report.total_deleted(),
                            "tables completed before the failure"
                        );
                    }
                    return Err(e);
                }
            }
        }

        Ok(report)
    }
}
