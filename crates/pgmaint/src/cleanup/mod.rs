pub mod batch;
pub mod driver;
pub mod statement;

pub use batch::{cutoff_days, BatchExecutor, DeletionJob, TableReport};
pub use driver::{Cleaner, CleanupConfig, RunReport};
pub use statement::DeleteStatement;
