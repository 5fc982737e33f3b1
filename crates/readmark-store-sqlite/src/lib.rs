//! SQLite backend for readmark.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.
//!
//! Besides the `readings` table the store hosts minimal `items` and `readers`
//! tables: the set queries join items against readings, and reader rows carry
//! the per-item-type watermark columns.

mod encode;
mod predicate;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_BATCH_SIZE, SqliteStore};
