//! Reconciliation of explicit readings, watermarks and item timestamps.
//!
//! This is the scalar form of the read-state rules. Storage backends express
//! the same rules as query predicates; both must agree for every input.
//!
//! For an item timestamp `ts`, an optional reading `r` and an optional
//! watermark `w`:
//!
//! | reading           | read iff              |
//! |-------------------|-----------------------|
//! | `r.state = read`  | `ts <= r.updated_at`  |
//! | `r.state = unread`| never                 |
//! | none              | `w` set and `ts <= w` |
//!
//! An existing reading always takes precedence over the watermark. Unread is
//! the exact negation of read. Ties favour read.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  Error,
  item::Readable,
  reading::{CachedReading, Reading, ReadingState},
};

// ─── TimestampField ──────────────────────────────────────────────────────────

/// Which item timestamp a read question is asked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampField {
  /// "Has this item ever been seen?"
  CreatedAt,
  /// "Has the current version of this item been seen?"
  UpdatedAt,
}

impl TimestampField {
  pub fn of<R: Readable + ?Sized>(self, item: &R) -> DateTime<Utc> {
    match self {
      Self::CreatedAt => item.created_at(),
      Self::UpdatedAt => item.updated_at(),
    }
  }

  /// The item column holding this timestamp.
  pub fn column(self) -> &'static str {
    match self {
      Self::CreatedAt => "created_at",
      Self::UpdatedAt => "updated_at",
    }
  }
}

// ─── Scope ───────────────────────────────────────────────────────────────────

/// One of the four set-membership questions. `ReadBy`/`UnreadBy` and
/// `LatestUpdateReadBy`/`LatestUpdateUnreadBy` partition every item set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
  ReadBy,
  UnreadBy,
  LatestUpdateReadBy,
  LatestUpdateUnreadBy,
}

impl Scope {
  pub const ALL: [Scope; 4] = [
    Scope::ReadBy,
    Scope::UnreadBy,
    Scope::LatestUpdateReadBy,
    Scope::LatestUpdateUnreadBy,
  ];

  pub fn field(self) -> TimestampField {
    match self {
      Self::ReadBy | Self::UnreadBy => TimestampField::CreatedAt,
      Self::LatestUpdateReadBy | Self::LatestUpdateUnreadBy => TimestampField::UpdatedAt,
    }
  }

  /// Whether members of this scope are the read ones.
  pub fn wants_read(self) -> bool { matches!(self, Self::ReadBy | Self::LatestUpdateReadBy) }

  /// The scope holding exactly the items this one excludes.
  pub fn complement(self) -> Self {
    match self {
      Self::ReadBy => Self::UnreadBy,
      Self::UnreadBy => Self::ReadBy,
      Self::LatestUpdateReadBy => Self::LatestUpdateUnreadBy,
      Self::LatestUpdateUnreadBy => Self::LatestUpdateReadBy,
    }
  }

  /// The scope whose members a bulk mark to `state` has to visit: the items
  /// not already in `state`.
  pub fn pending(state: ReadingState) -> Self {
    match state {
      ReadingState::Read => Self::UnreadBy,
      ReadingState::Unread => Self::ReadBy,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::ReadBy => "read",
      Self::UnreadBy => "unread",
      Self::LatestUpdateReadBy => "latest-update-read",
      Self::LatestUpdateUnreadBy => "latest-update-unread",
    }
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Scope {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Scope::ALL
      .into_iter()
      .find(|scope| scope.as_str() == s)
      .ok_or_else(|| Error::UnknownScope(s.to_owned()))
  }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Is an item stamped `ts` read, given its reading and the reader's watermark?
pub fn is_read_at(
  ts: DateTime<Utc>,
  reading: Option<&Reading>,
  watermark: Option<DateTime<Utc>>,
) -> bool {
  match reading {
    Some(r) => r.state == ReadingState::Read && ts <= r.updated_at,
    None => watermark.is_some_and(|w| ts <= w),
  }
}

pub fn is_read<R: Readable + ?Sized>(
  item: &R,
  field: TimestampField,
  reading: Option<&Reading>,
  watermark: Option<DateTime<Utc>>,
) -> bool {
  is_read_at(field.of(item), reading, watermark)
}

pub fn in_scope<R: Readable + ?Sized>(
  item: &R,
  scope: Scope,
  reading: Option<&Reading>,
  watermark: Option<DateTime<Utc>>,
) -> bool {
  is_read(item, scope.field(), reading, watermark) == scope.wants_read()
}

// ─── Lookup precedence ───────────────────────────────────────────────────────

/// What a prefetch slot says about an item's reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
  /// The slot was filled; `None` means the store had no reading.
  Known(Option<&'a Reading>),
  /// Nobody looked; the store must be asked.
  Unknown,
}

pub fn lookup(slot: &CachedReading) -> Lookup<'_> {
  match slot {
    CachedReading::Present(reading) => Lookup::Known(Some(reading)),
    CachedReading::Absent => Lookup::Known(None),
    CachedReading::NotFetched => Lookup::Unknown,
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// All scalar answers for one item and reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadStatus {
  pub read:               bool,
  pub latest_update_read: bool,
}

impl ReadStatus {
  pub fn evaluate<R: Readable + ?Sized>(
    item: &R,
    reading: Option<&Reading>,
    watermark: Option<DateTime<Utc>>,
  ) -> Self {
    Self {
      read:               is_read(item, TimestampField::CreatedAt, reading, watermark),
      latest_update_read: is_read(item, TimestampField::UpdatedAt, reading, watermark),
    }
  }

  /// Read at least once, but edited since.
  pub fn updated(self) -> bool { self.read && !self.latest_update_read }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use uuid::Uuid;

  use super::*;
  use crate::item::{Item, ItemType};

  fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
  }

  fn item(created: i64, updated: i64) -> Item {
    Item {
      item_id:    Uuid::new_v4(),
      item_type:  ItemType::from("comment"),
      created_at: t(created),
      updated_at: t(updated),
    }
  }

  fn reading(item: &Item, state: ReadingState, at: i64) -> Reading {
    Reading {
      reader_id: Uuid::new_v4(),
      item_id: item.item_id,
      item_type: item.item_type.clone(),
      state,
      created_at: t(at),
      updated_at: t(at),
    }
  }

  #[test]
  fn nothing_known_is_unread() {
    let i = item(0, 0);
    let status = ReadStatus::evaluate(&i, None, None);
    assert!(!status.read);
    assert!(!status.latest_update_read);
    assert!(!status.updated());
  }

  #[test]
  fn watermark_covers_items_at_or_before_it() {
    let i = item(0, 10);
    assert!(is_read(&i, TimestampField::CreatedAt, None, Some(t(5))));
    assert!(!is_read(&i, TimestampField::UpdatedAt, None, Some(t(5))));
    assert!(is_read(&i, TimestampField::UpdatedAt, None, Some(t(10))));
    assert!(!is_read(&i, TimestampField::CreatedAt, None, Some(t(-1))));
  }

  #[test]
  fn read_reading_compares_against_its_timestamp() {
    let i = item(0, 10);
    let r = reading(&i, ReadingState::Read, 5);
    let status = ReadStatus::evaluate(&i, Some(&r), None);
    assert!(status.read);
    assert!(!status.latest_update_read);
    assert!(status.updated());
  }

  #[test]
  fn unread_reading_is_unread_whatever_the_watermark() {
    let i = item(0, 0);
    let r = reading(&i, ReadingState::Unread, 5);
    assert!(!is_read(&i, TimestampField::CreatedAt, Some(&r), Some(t(100))));
    assert!(!is_read(&i, TimestampField::UpdatedAt, Some(&r), Some(t(100))));
  }

  #[test]
  fn reading_takes_precedence_over_watermark() {
    let i = item(0, 20);
    let r = reading(&i, ReadingState::Read, 10);
    // Watermark would cover the edit, but the explicit reading predates it.
    assert!(!is_read(&i, TimestampField::UpdatedAt, Some(&r), Some(t(30))));
  }

  #[test]
  fn ties_favour_read() {
    let i = item(7, 7);
    let r = reading(&i, ReadingState::Read, 7);
    assert!(is_read(&i, TimestampField::UpdatedAt, Some(&r), None));
    assert!(is_read(&i, TimestampField::UpdatedAt, None, Some(t(7))));
  }

  #[test]
  fn scopes_partition_every_input() {
    let i = item(0, 10);
    let readings = [
      None,
      Some(reading(&i, ReadingState::Read, 5)),
      Some(reading(&i, ReadingState::Read, 15)),
      Some(reading(&i, ReadingState::Unread, 5)),
    ];
    let watermarks = [None, Some(t(-5)), Some(t(5)), Some(t(15))];

    for r in &readings {
      for w in watermarks {
        for scope in Scope::ALL {
          assert_ne!(
            in_scope(&i, scope, r.as_ref(), w),
            in_scope(&i, scope.complement(), r.as_ref(), w),
            "{scope} and its complement overlap for {r:?} / {w:?}"
          );
        }
      }
    }
  }

  #[test]
  fn scope_names_parse() {
    for scope in Scope::ALL {
      assert_eq!(scope.as_str().parse::<Scope>().unwrap(), scope);
    }
    assert!(matches!("seen".parse::<Scope>(), Err(Error::UnknownScope(_))));
  }

  #[test]
  fn pending_scope_is_the_complement_of_the_target() {
    assert_eq!(Scope::pending(ReadingState::Read), Scope::UnreadBy);
    assert_eq!(Scope::pending(ReadingState::Unread), Scope::ReadBy);
  }

  #[test]
  fn lookup_distinguishes_absent_from_not_fetched() {
    let i = item(0, 0);
    let r = reading(&i, ReadingState::Read, 1);
    assert_eq!(lookup(&CachedReading::NotFetched), Lookup::Unknown);
    assert_eq!(lookup(&CachedReading::Absent), Lookup::Known(None));
    assert_eq!(lookup(&CachedReading::Present(r.clone())), Lookup::Known(Some(&r)));
  }
}
