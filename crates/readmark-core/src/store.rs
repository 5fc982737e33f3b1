//! The `ReadingStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `readmark-store-sqlite`).
//! Callers depend on this abstraction, not on any concrete backend.

use std::{fmt, future::Future, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  item::{Item, ItemType, Readable},
  reader::Reader,
  reading::{Prefetched, Reading, ReadingKey, ReadingState},
  reconcile::{Scope, TimestampField},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Ordering of the underlying item collection. Scope filters keep it intact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemOrder {
  #[default]
  CreatedAsc,
  CreatedDesc,
  UpdatedDesc,
}

impl ItemOrder {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::CreatedAsc => "created-asc",
      Self::CreatedDesc => "created-desc",
      Self::UpdatedDesc => "updated-desc",
    }
  }
}

impl fmt::Display for ItemOrder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ItemOrder {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    [Self::CreatedAsc, Self::CreatedDesc, Self::UpdatedDesc]
      .into_iter()
      .find(|order| order.as_str() == s)
      .ok_or_else(|| Error::UnknownItemOrder(s.to_owned()))
  }
}

/// Parameters for [`ReadingStore::scope`].
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
  pub order:  ItemOrder,
  /// `None` returns every matching item.
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

// ─── Bulk outcome ────────────────────────────────────────────────────────────

/// Which path a bulk mark took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum BulkOutcome {
  /// Readings were dropped and the reader's watermark set to `at` (or
  /// cleared, for unread-all).
  Watermarked {
    at:      Option<DateTime<Utc>>,
    removed: usize,
  },
  /// No watermark is configured; each pending item was marked on its own.
  Individually { marked: usize },
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a reading store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait ReadingStore: Send + Sync {
  type Error: std::error::Error + From<Error> + Send + Sync + 'static;

  // ── Readings ──────────────────────────────────────────────────────────

  /// The reading for `key`, if one exists. Absence is not an error.
  fn find_reading<'a>(
    &'a self,
    key: &'a ReadingKey,
  ) -> impl Future<Output = Result<Option<Reading>, Self::Error>> + Send + 'a;

  /// Every explicit reading of `item`, across all readers.
  fn readings_for<'a, R: Readable + Sync>(
    &'a self,
    item: &'a R,
  ) -> impl Future<Output = Result<Vec<Reading>, Self::Error>> + Send + 'a;

  /// Readers holding an explicit `read` reading of `item`.
  fn readers_of<'a, R: Readable + Sync>(
    &'a self,
    item: &'a R,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + 'a;

  // ── Single-item marks ─────────────────────────────────────────────────

  /// Record `reader`'s explicit `state` for `item`, creating the reading if
  /// needed. `updated_at` always advances to now, even when `state` is
  /// unchanged.
  fn mark<'a, R: Readable + Sync>(
    &'a self,
    item: &'a R,
    reader: &'a Reader,
    state: ReadingState,
  ) -> impl Future<Output = Result<Reading, Self::Error>> + Send + 'a;

  fn mark_read<'a, R: Readable + Sync>(
    &'a self,
    item: &'a R,
    reader: &'a Reader,
  ) -> impl Future<Output = Result<Reading, Self::Error>> + Send + 'a {
    self.mark(item, reader, ReadingState::Read)
  }

  fn mark_unread<'a, R: Readable + Sync>(
    &'a self,
    item: &'a R,
    reader: &'a Reader,
  ) -> impl Future<Output = Result<Reading, Self::Error>> + Send + 'a {
    self.mark(item, reader, ReadingState::Unread)
  }

  // ── Bulk marks ────────────────────────────────────────────────────────

  /// Mark every item of `item_type` as `state` for `reader`.
  ///
  /// Uses the watermark shortcut when the type has a watermark field and
  /// updates `reader` in place to match; otherwise marks each pending item.
  fn mark_all<'a>(
    &'a self,
    item_type: &'a ItemType,
    reader: &'a mut Reader,
    state: ReadingState,
  ) -> impl Future<Output = Result<BulkOutcome, Self::Error>> + Send + 'a;

  fn mark_all_read<'a>(
    &'a self,
    item_type: &'a ItemType,
    reader: &'a mut Reader,
  ) -> impl Future<Output = Result<BulkOutcome, Self::Error>> + Send + 'a {
    self.mark_all(item_type, reader, ReadingState::Read)
  }

  fn mark_all_unread<'a>(
    &'a self,
    item_type: &'a ItemType,
    reader: &'a mut Reader,
  ) -> impl Future<Output = Result<BulkOutcome, Self::Error>> + Send + 'a {
    self.mark_all(item_type, reader, ReadingState::Unread)
  }

  // ── Set queries ───────────────────────────────────────────────────────

  /// Items of `item_type` in `scope` for `reader`, in `query` order.
  fn scope<'a>(
    &'a self,
    scope: Scope,
    item_type: &'a ItemType,
    reader: &'a Reader,
    query: &'a ItemQuery,
  ) -> impl Future<Output = Result<Vec<Item>, Self::Error>> + Send + 'a;

  fn read_by<'a>(
    &'a self,
    item_type: &'a ItemType,
    reader: &'a Reader,
    query: &'a ItemQuery,
  ) -> impl Future<Output = Result<Vec<Item>, Self::Error>> + Send + 'a {
    self.scope(Scope::ReadBy, item_type, reader, query)
  }

  fn unread_by<'a>(
    &'a self,
    item_type: &'a ItemType,
    reader: &'a Reader,
    query: &'a ItemQuery,
  ) -> impl Future<Output = Result<Vec<Item>, Self::Error>> + Send + 'a {
    self.scope(Scope::UnreadBy, item_type, reader, query)
  }

  fn latest_update_read_by<'a>(
    &'a self,
    item_type: &'a ItemType,
    reader: &'a Reader,
    query: &'a ItemQuery,
  ) -> impl Future<Output = Result<Vec<Item>, Self::Error>> + Send + 'a {
    self.scope(Scope::LatestUpdateReadBy, item_type, reader, query)
  }

  fn latest_update_unread_by<'a>(
    &'a self,
    item_type: &'a ItemType,
    reader: &'a Reader,
    query: &'a ItemQuery,
  ) -> impl Future<Output = Result<Vec<Item>, Self::Error>> + Send + 'a {
    self.scope(Scope::LatestUpdateUnreadBy, item_type, reader, query)
  }

  // ── Single-item queries ───────────────────────────────────────────────

  /// Is `item` read by `reader` when judged by `field`?
  ///
  /// Uses the item's prefetched reading when it has one (or knows it has
  /// none); otherwise asks the store.
  fn is_read_as_of<'a, R: Readable + Sync>(
    &'a self,
    item: &'a R,
    reader: &'a Reader,
    field: TimestampField,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn is_read_by<'a, R: Readable + Sync>(
    &'a self,
    item: &'a R,
    reader: &'a Reader,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a {
    self.is_read_as_of(item, reader, TimestampField::CreatedAt)
  }

  fn is_latest_update_read_by<'a, R: Readable + Sync>(
    &'a self,
    item: &'a R,
    reader: &'a Reader,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a {
    self.is_read_as_of(item, reader, TimestampField::UpdatedAt)
  }

  /// Read at least once, but edited since the last read.
  fn is_updated_since_read<'a, R: Readable + Sync>(
    &'a self,
    item: &'a R,
    reader: &'a Reader,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a {
    async move {
      Ok(
        self.is_read_by(item, reader).await?
          && !self.is_latest_update_read_by(item, reader).await?,
      )
    }
  }

  // ── Prefetch ──────────────────────────────────────────────────────────

  /// Attach `reader`'s reading (or an explicit absence) to every item in one
  /// lookup per item type, so the single-item queries need no further reads.
  fn prefetch_readings<'a, T: Readable + Send + 'a>(
    &'a self,
    items: Vec<T>,
    reader: &'a Reader,
  ) -> impl Future<Output = Result<Vec<Prefetched<T>>, Self::Error>> + Send + 'a;
}
