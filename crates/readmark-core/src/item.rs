//! Readable items: the host-owned entities whose read state is tracked.
//!
//! The core never writes to an item. It only needs the item's identity, its
//! type discriminator and its two timestamps.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reading::CachedReading;

// ─── ItemType ────────────────────────────────────────────────────────────────

/// Stable discriminator for a class of readable items (e.g. `"comment"`).
///
/// Readings of every item class share one table; this tag is what tells them
/// apart. Variants of one item class should share the base class's tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemType(String);

impl ItemType {
  pub fn new(tag: impl Into<String>) -> Self { Self(tag.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ItemType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for ItemType {
  fn from(tag: &str) -> Self { Self::new(tag) }
}

impl From<String> for ItemType {
  fn from(tag: String) -> Self { Self(tag) }
}

// ─── Readable ────────────────────────────────────────────────────────────────

pub(crate) static NOT_FETCHED: CachedReading = CachedReading::NotFetched;

/// Anything whose read state can be asked about.
pub trait Readable {
  fn item_id(&self) -> Uuid;
  fn item_type(&self) -> &ItemType;
  fn created_at(&self) -> DateTime<Utc>;
  fn updated_at(&self) -> DateTime<Utc>;

  /// The slot a prefetch for `reader_id` attached to this item, if any.
  fn cached_reading(&self, _reader_id: Uuid) -> &CachedReading { &NOT_FETCHED }
}

// ─── Item ────────────────────────────────────────────────────────────────────

/// A plain readable item as stored by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
  pub item_id:    Uuid,
  pub item_type:  ItemType,
  pub created_at: DateTime<Utc>,
  /// Advances whenever the item's content is edited.
  pub updated_at: DateTime<Utc>,
}

impl Readable for Item {
  fn item_id(&self) -> Uuid { self.item_id }

  fn item_type(&self) -> &ItemType { &self.item_type }

  fn created_at(&self) -> DateTime<Utc> { self.created_at }

  fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
}
