//! Error type for `readmark-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] readmark_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("reader not found: {0}")]
  ReaderNotFound(uuid::Uuid),

  #[error("item not found: {0}")]
  ItemNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
