//! Queue module: retry policy and job store implementations.

mod memory;
mod retry;
mod sqlite;

pub use memory::InMemoryJobStore;
pub use retry::{DEFAULT_BACKOFF_BASE, RetryPolicy};
pub use sqlite::SqliteJobStore;
