//! Readings: one reader's explicit read/unread mark on one item.
//!
//! At most one reading exists per [`ReadingKey`]. A reading is created on the
//! first explicit mark, overwritten in place by every later mark, and removed
//! wholesale when a read-all or unread-all watermark supersedes it.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  item::{ItemType, NOT_FETCHED, Readable},
};

// ─── State ───────────────────────────────────────────────────────────────────

/// The explicit state recorded by a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingState {
  Read,
  Unread,
}

impl ReadingState {
  /// The value stored in the `state` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Read => "read",
      Self::Unread => "unread",
    }
  }
}

impl fmt::Display for ReadingState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ReadingState {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "read" => Ok(Self::Read),
      "unread" => Ok(Self::Unread),
      other => Err(Error::UnknownReadingState(other.to_owned())),
    }
  }
}

// ─── Key ─────────────────────────────────────────────────────────────────────

/// The uniqueness key of a reading.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadingKey {
  pub reader_id: Uuid,
  pub item_id:   Uuid,
  pub item_type: ItemType,
}

impl ReadingKey {
  /// The key for `reader_id`'s reading of `item`.
  pub fn for_item<R: Readable + ?Sized>(reader_id: Uuid, item: &R) -> Self {
    Self {
      reader_id,
      item_id: item.item_id(),
      item_type: item.item_type().clone(),
    }
  }
}

impl fmt::Display for ReadingKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.reader_id, self.item_type, self.item_id)
  }
}

// ─── Reading ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
  pub reader_id:  Uuid,
  pub item_id:    Uuid,
  pub item_type:  ItemType,
  pub state:      ReadingState,
  pub created_at: DateTime<Utc>,
  /// Time of the most recent explicit mark, overwritten on every transition
  /// (including a re-read that leaves `state` unchanged).
  pub updated_at: DateTime<Utc>,
}

impl Reading {
  pub fn key(&self) -> ReadingKey {
    ReadingKey {
      reader_id: self.reader_id,
      item_id:   self.item_id,
      item_type: self.item_type.clone(),
    }
  }

  pub fn is_read(&self) -> bool { self.state == ReadingState::Read }
}

// ─── Prefetch cache ──────────────────────────────────────────────────────────

/// The per-item slot filled by a prefetch.
///
/// `Absent` and `NotFetched` are distinct: the former means the
/// store was asked and had no reading, the latter that nobody asked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CachedReading {
  #[default]
  NotFetched,
  Present(Reading),
  Absent,
}

/// An item carrying the reading slot filled for it by a prefetch.
///
/// The slot only answers for the reader it was fetched for; asking on behalf
/// of anyone else reports [`CachedReading::NotFetched`].
#[derive(Debug, Clone)]
pub struct Prefetched<T> {
  pub item:      T,
  pub reader_id: Uuid,
  pub reading:   CachedReading,
}

impl<T> Prefetched<T> {
  pub fn into_inner(self) -> T { self.item }
}

impl<T: Readable> Readable for Prefetched<T> {
  fn item_id(&self) -> Uuid { self.item.item_id() }

  fn item_type(&self) -> &ItemType { self.item.item_type() }

  fn created_at(&self) -> DateTime<Utc> { self.item.created_at() }

  fn updated_at(&self) -> DateTime<Utc> { self.item.updated_at() }

  fn cached_reading(&self, reader_id: Uuid) -> &CachedReading {
    if reader_id == self.reader_id { &self.reading } else { &NOT_FETCHED }
  }
}

// ─── Write outcome ───────────────────────────────────────────────────────────

/// Result of a single attempt to persist a mark.
///
/// Backing-store failures are carried by the surrounding `Result`; only the
/// uniqueness race gets its own variant so it can be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
  Created(Reading),
  Updated(Reading),
  /// Another writer created the reading between our lookup and our insert.
  Conflict,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn state_round_trips_through_column_text() {
    for state in [ReadingState::Read, ReadingState::Unread] {
      assert_eq!(state.as_str().parse::<ReadingState>().unwrap(), state);
    }
  }

  #[test]
  fn unknown_state_is_rejected() {
    let err = "skimmed".parse::<ReadingState>().unwrap_err();
    assert!(matches!(err, Error::UnknownReadingState(s) if s == "skimmed"));
  }

  #[test]
  fn state_serializes_lowercase() {
    let json = serde_json::to_string(&ReadingState::Unread).unwrap();
    assert_eq!(json, "\"unread\"");
  }

  #[test]
  fn prefetched_slot_only_answers_for_its_reader() {
    use chrono::Utc;

    use crate::item::Item;

    let now = Utc::now();
    let item = Item {
      item_id:    Uuid::new_v4(),
      item_type:  ItemType::from("comment"),
      created_at: now,
      updated_at: now,
    };
    let owner = Uuid::new_v4();
    let prefetched = Prefetched { item, reader_id: owner, reading: CachedReading::Absent };

    assert_eq!(prefetched.cached_reading(owner), &CachedReading::Absent);
    assert_eq!(prefetched.cached_reading(Uuid::new_v4()), &CachedReading::NotFetched);
  }

  #[test]
  fn cached_reading_defaults_to_not_fetched() {
    assert_eq!(CachedReading::default(), CachedReading::NotFetched);
    assert_ne!(CachedReading::NotFetched, CachedReading::Absent);
  }
}
