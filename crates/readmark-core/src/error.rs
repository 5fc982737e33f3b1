//! Error types for `readmark-core`.

use thiserror::Error;

use crate::{item::ItemType, reading::ReadingKey};

#[derive(Debug, Error)]
pub enum Error {
  #[error("item type is not registered as readable: {0}")]
  UnknownItemType(ItemType),

  #[error("item type registered twice: {0}")]
  DuplicateItemType(ItemType),

  #[error("invalid watermark field name: {0:?}")]
  InvalidWatermarkField(String),

  #[error("watermark field {0:?} is configured for more than one item type")]
  SharedWatermarkField(String),

  /// The insert for `key` lost a uniqueness race on every allowed attempt.
  #[error("reading {0} still conflicts after retrying")]
  DuplicateReading(ReadingKey),

  #[error("unknown reading state: {0:?}")]
  UnknownReadingState(String),

  #[error("unknown scope: {0:?}")]
  UnknownScope(String),

  #[error("unknown item order: {0:?}")]
  UnknownItemOrder(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
