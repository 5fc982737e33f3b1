//! Encoding and decoding helpers between readmark domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with microsecond
//! precision (`2024-01-01T00:00:00.000000Z`), so SQL string comparison orders
//! them chronologically. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use readmark_core::{
  item::{Item, ItemType},
  reader::{Reader, WatermarkField},
  reading::{Reading, ReadingState},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── ReadingState ─────────────────────────────────────────────────────────────

pub fn decode_state(s: &str) -> Result<ReadingState> { Ok(s.parse()?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawReading::from_row`].
pub const READING_COLUMNS: &str =
  "reader_id, item_id, item_type, state, created_at, updated_at";

/// Raw strings read directly from a `readings` row.
pub struct RawReading {
  pub reader_id:  String,
  pub item_id:    String,
  pub item_type:  String,
  pub state:      String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawReading {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      reader_id:  row.get(0)?,
      item_id:    row.get(1)?,
      item_type:  row.get(2)?,
      state:      row.get(3)?,
      created_at: row.get(4)?,
      updated_at: row.get(5)?,
    })
  }

  pub fn into_reading(self) -> Result<Reading> {
    Ok(Reading {
      reader_id:  decode_uuid(&self.reader_id)?,
      item_id:    decode_uuid(&self.item_id)?,
      item_type:  ItemType::new(self.item_type),
      state:      decode_state(&self.state)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawItem::from_row`], qualified for the `i` alias.
pub const ITEM_COLUMNS: &str = "i.item_id, i.item_type, i.created_at, i.updated_at";

/// Raw strings read directly from an `items` row.
pub struct RawItem {
  pub item_id:    String,
  pub item_type:  String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawItem {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      item_id:    row.get(0)?,
      item_type:  row.get(1)?,
      created_at: row.get(2)?,
      updated_at: row.get(3)?,
    })
  }

  pub fn into_item(self) -> Result<Item> {
    Ok(Item {
      item_id:    decode_uuid(&self.item_id)?,
      item_type:  ItemType::new(self.item_type),
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `readers` row; `watermarks` follows the
/// order of the field list the row was selected with.
pub struct RawReader {
  pub reader_id:  String,
  pub created_at: String,
  pub watermarks: Vec<Option<String>>,
}

impl RawReader {
  pub fn from_row(row: &rusqlite::Row<'_>, fields: usize) -> rusqlite::Result<Self> {
    let watermarks = (0..fields)
      .map(|idx| row.get(idx + 2))
      .collect::<rusqlite::Result<Vec<Option<String>>>>()?;
    Ok(Self {
      reader_id: row.get(0)?,
      created_at: row.get(1)?,
      watermarks,
    })
  }

  pub fn into_reader(self, fields: &[WatermarkField]) -> Result<Reader> {
    let mut reader = Reader::new(decode_uuid(&self.reader_id)?, decode_dt(&self.created_at)?);
    for (field, raw) in fields.iter().zip(self.watermarks) {
      let at = raw.as_deref().map(decode_dt).transpose()?;
      reader.set_watermark(field, at);
    }
    Ok(reader)
  }
}

/// `SELECT` list for a reader row with the given watermark columns.
pub fn reader_columns(fields: &[WatermarkField]) -> String {
  let mut columns = String::from("reader_id, created_at");
  for field in fields {
    columns.push_str(&format!(", \"{field}\""));
  }
  columns
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  #[test]
  fn timestamps_sort_as_text() {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap();
    let stamps = [
      base,
      base + Duration::microseconds(1),
      base + Duration::milliseconds(500),
      base + Duration::seconds(1),
    ];
    for pair in stamps.windows(2) {
      assert!(encode_dt(pair[0]) < encode_dt(pair[1]));
    }
    assert_eq!(encode_dt(base), "2024-01-01T00:00:05.000000Z");
  }

  #[test]
  fn timestamps_round_trip_at_micro_precision() {
    let at = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap() + Duration::microseconds(123_456);
    assert_eq!(decode_dt(&encode_dt(at)).unwrap(), at);
  }

  #[test]
  fn reader_columns_quote_watermarks() {
    let fields = [WatermarkField::new("comments_read_at").unwrap()];
    assert_eq!(reader_columns(&fields), "reader_id, created_at, \"comments_read_at\"");
    assert_eq!(reader_columns(&[]), "reader_id, created_at");
  }
}
