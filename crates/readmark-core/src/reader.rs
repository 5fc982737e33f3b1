//! Readers and their per-item-type "all read at" watermarks.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, config::ReadableConfig};

// ─── WatermarkField ──────────────────────────────────────────────────────────

/// Columns of the reader record that cannot double as a watermark.
const RESERVED: &[&str] = &["reader_id", "created_at"];

/// Name of the reader column holding one item type's watermark.
///
/// Validated on construction (`[a-z_][a-z0-9_]*`, at most 63 bytes, not a
/// reserved column) so backends can splice it into DDL and DML as a quoted
/// identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WatermarkField(String);

impl WatermarkField {
  pub fn new(name: impl Into<String>) -> Result<Self> {
    let name = name.into();
    let mut chars = name.chars();
    let valid_head = chars
      .next()
      .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_tail =
      chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !valid_head || !valid_tail || name.len() > 63 || RESERVED.contains(&name.as_str()) {
      return Err(Error::InvalidWatermarkField(name));
    }
    Ok(Self(name))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for WatermarkField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for WatermarkField {
  type Error = Error;

  fn try_from(name: String) -> Result<Self> { Self::new(name) }
}

impl From<WatermarkField> for String {
  fn from(field: WatermarkField) -> Self { field.0 }
}

// ─── Reader ──────────────────────────────────────────────────────────────────

/// A reader as loaded from the backing store, watermarks included.
///
/// Watermarks live on the reader so the scalar queries can consult them
/// without another lookup. Bulk operations update the in-memory copy in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reader {
  pub reader_id:  Uuid,
  pub created_at: DateTime<Utc>,
  /// Only set watermarks are present.
  #[serde(default)]
  pub watermarks: BTreeMap<WatermarkField, DateTime<Utc>>,
}

impl Reader {
  pub fn new(reader_id: Uuid, created_at: DateTime<Utc>) -> Self {
    Self { reader_id, created_at, watermarks: BTreeMap::new() }
  }

  /// The watermark covering `config`'s item type, if it has a watermark field
  /// and that field is set.
  pub fn watermark(&self, config: &ReadableConfig) -> Option<DateTime<Utc>> {
    config
      .watermark
      .as_ref()
      .and_then(|field| self.watermarks.get(field).copied())
  }

  pub fn set_watermark(&mut self, field: &WatermarkField, at: Option<DateTime<Utc>>) {
    match at {
      Some(at) => {
        self.watermarks.insert(field.clone(), at);
      }
      None => {
        self.watermarks.remove(field);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn accepts_plain_column_names() {
    for name in ["comments_read_at", "_x", "posts2_read_at"] {
      assert_eq!(WatermarkField::new(name).unwrap().as_str(), name);
    }
  }

  #[test]
  fn rejects_names_that_are_not_safe_identifiers() {
    for name in ["", "2fast", "Comments", "read-at", "a b", "x\"; DROP", "reader_id", "created_at"] {
      assert!(
        matches!(WatermarkField::new(name), Err(Error::InvalidWatermarkField(_))),
        "{name:?} should be rejected"
      );
    }
    assert!(WatermarkField::new("a".repeat(64)).is_err());
  }

  #[test]
  fn deserialization_validates() {
    let ok: WatermarkField = serde_json::from_str("\"comments_read_at\"").unwrap();
    assert_eq!(ok.as_str(), "comments_read_at");
    assert!(serde_json::from_str::<WatermarkField>("\"Bad Name\"").is_err());
  }

  #[test]
  fn watermark_follows_config() {
    let field = WatermarkField::new("comments_read_at").unwrap();
    let with = ReadableConfig::new("comment").with_watermark(field.clone());
    let without = ReadableConfig::new("comment");
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

    let mut reader = Reader::new(Uuid::new_v4(), at);
    assert_eq!(reader.watermark(&with), None);

    reader.set_watermark(&field, Some(at));
    assert_eq!(reader.watermark(&with), Some(at));
    assert_eq!(reader.watermark(&without), None);

    reader.set_watermark(&field, None);
    assert_eq!(reader.watermark(&with), None);
    assert!(reader.watermarks.is_empty());
  }
}
