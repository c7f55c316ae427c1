use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, TimeDelta, TimeZone, Utc};
use tracing::{info, warn};

use crate::cleanup::statement::DeleteStatement;
use crate::db::{Deadline, Session};
use crate::error::{MaintenanceError, Result};
use crate::spec::TableSpec;

/// Runs one batch: a single transaction that either commits and reports the
/// rows it deleted, or rolls back and fails.
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn delete_batch(
        &self,
        statement: &DeleteStatement,
        cutoff: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<u64>;
}

#[async_trait]
impl BatchExecutor for Session {
    async fn delete_batch(
        &self,
        statement: &DeleteStatement,
        cutoff: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<u64> {
        let mut tx = self.begin(Deadline::after(timeout)).await?;

        match tx.execute(statement, cutoff).await {
            Ok(rows) => {
                tx.commit(statement.table()).await?;
                Ok(rows)
            }
            Err(e) => {
                tx.rollback().await;
                Err(e)
            }
        }
    }
}

/// "now - N days" on the calendar of `now`'s time zone, so a DST switch in
/// between does not shift the cutoff by an hour.
///
/// Falls back to fixed 24h days when the local result does not exist;
/// `None` only when the result is outside the representable range.
pub fn cutoff_days<Tz: TimeZone>(now: &DateTime<Tz>, days: u32) -> Option<DateTime<Utc>> {
    now.clone()
        .checked_sub_days(Days::new(u64::from(days)))
        .or_else(|| {
            TimeDelta::try_days(i64::from(days)).and_then(|d| now.clone().checked_sub_signed(d))
        })
        .map(|cutoff| cutoff.with_timezone(&Utc))
}

/// Outcome of a finished table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub column: String,
    pub cutoff: DateTime<Utc>,
    /// Committed transactions that deleted at least one row.
    pub batches: u64,
    /// Every committed transaction, including a trailing empty one.
    pub transactions: u64,
    pub total_deleted: u64,
}

/// Per-table state of a deletion run; built fresh for each table.
#[derive(Debug)]
pub struct DeletionJob {
    statement: DeleteStatement,
    cutoff: DateTime<Utc>,
    retention_days: u32,
    batch_size: u32,
    batches: u64,
    transactions: u64,
    total_deleted: u64,
}

impl DeletionJob {
    pub fn new(spec: &TableSpec, batch_size: u32, cutoff: DateTime<Utc>) -> Self {
        Self {
            statement: DeleteStatement::new(spec, batch_size),
            cutoff,
            retention_days: spec.retention_days(),
            batch_size,
            batches: 0,
            transactions: 0,
            total_deleted: 0,
        }
    }

    /// Delete batches until none qualify, or once when unbounded.
    ///
    /// A failure keeps every batch committed before it; the error reports
    /// how many rows those batches removed.
    pub async fn run<E>(mut self, executor: &E, timeout: Duration) -> Result<TableReport>
    where
        E: BatchExecutor + ?Sized,
    {
        let table = self.statement.table().to_string();

        info!(
            table = %table,
            column = %self.statement.column(),
            retention_days = self.retention_days,
            cutoff = %self.cutoff,
            batch_size = self.batch_size,
            "cleaning up table"
        );
        if self.retention_days == 0 && self.batch_size == 0 {
            warn!(
                table = %table,
                "retention is 0 days and batching is off: every row with a past timestamp is deleted in one transaction"
            );
        }

        loop {
            let deleted = match executor
                .delete_batch(&self.statement, self.cutoff, timeout)
                .await
            {
                Ok(n) => n,
                Err(source) => {
                    return Err(MaintenanceError::Table {
                        table,
                        committed: self.total_deleted,
                        source: Box::new(source),
                    })
                }
            };

            self.transactions += 1;
            if deleted == 0 {
                info!(table = %table, total = self.total_deleted, "no more rows to delete");
                break;
            }

            self.batches += 1;
            self.total_deleted += deleted;
            info!(
                table = %table,
                batch = self.batches,
                deleted,
                total = self.total_deleted,
                "deleted batch"
            );

            if self.batch_size == 0 {
                break;
            }
        }

        Ok(TableReport {
            table,
            column: self.statement.column().to_string(),
            cutoff: self.cutoff,
            batches: self.batches,
            transactions: self.transactions,
            total_deleted: self.total_deleted,
        })
    }
}
