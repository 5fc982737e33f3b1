//! Per-item-type readable configuration.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, item::ItemType, reader::WatermarkField};

/// How one item type participates in read tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadableConfig {
  pub item_type: ItemType,
  /// Reader column holding this type's "all read at" watermark. Without one,
  /// bulk marking falls back to marking items individually and an item with no
  /// reading is always unread.
  #[serde(default, rename = "watermark_field")]
  pub watermark: Option<WatermarkField>,
}

impl ReadableConfig {
  pub fn new(item_type: impl Into<ItemType>) -> Self {
    Self { item_type: item_type.into(), watermark: None }
  }

  pub fn with_watermark(mut self, field: WatermarkField) -> Self {
    self.watermark = Some(field);
    self
  }
}

/// The set of item types a store tracks, keyed by discriminator.
#[derive(Debug, Clone, Default)]
pub struct Registry {
  readables: BTreeMap<ItemType, ReadableConfig>,
}

impl Registry {
  /// Build a registry, rejecting duplicate item types and watermark fields
  /// shared between types.
  pub fn new(configs: impl IntoIterator<Item = ReadableConfig>) -> Result<Self> {
    let mut readables = BTreeMap::new();
    let mut fields = BTreeSet::new();

    for config in configs {
      if let Some(field) = &config.watermark
        && !fields.insert(field.clone())
      {
        return Err(Error::SharedWatermarkField(field.as_str().to_owned()));
      }
      if readables.contains_key(&config.item_type) {
        return Err(Error::DuplicateItemType(config.item_type));
      }
      readables.insert(config.item_type.clone(), config);
    }

    Ok(Self { readables })
  }

  pub fn get(&self, item_type: &ItemType) -> Result<&ReadableConfig> {
    self
      .readables
      .get(item_type)
      .ok_or_else(|| Error::UnknownItemType(item_type.clone()))
  }

  pub fn iter(&self) -> impl Iterator<Item = &ReadableConfig> { self.readables.values() }

  /// Every configured watermark field, in a stable order.
  pub fn watermark_fields(&self) -> impl Iterator<Item = &WatermarkField> {
    self.iter().filter_map(|c| c.watermark.as_ref())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn field(name: &str) -> WatermarkField { WatermarkField::new(name).unwrap() }

  #[test]
  fn looks_up_registered_types() {
    let registry = Registry::new([
      ReadableConfig::new("comment").with_watermark(field("comments_read_at")),
      ReadableConfig::new("post"),
    ])
    .unwrap();

    let comment = registry.get(&ItemType::from("comment")).unwrap();
    assert_eq!(comment.watermark, Some(field("comments_read_at")));
    assert!(registry.get(&ItemType::from("post")).unwrap().watermark.is_none());
    assert_eq!(registry.watermark_fields().count(), 1);
  }

  #[test]
  fn unknown_type_is_an_error() {
    let registry = Registry::new([ReadableConfig::new("comment")]).unwrap();
    let err = registry.get(&ItemType::from("photo")).unwrap_err();
    assert!(matches!(err, Error::UnknownItemType(t) if t.as_str() == "photo"));
  }

  #[test]
  fn rejects_duplicate_types() {
    let err =
      Registry::new([ReadableConfig::new("comment"), ReadableConfig::new("comment")]).unwrap_err();
    assert!(matches!(err, Error::DuplicateItemType(_)));
  }

  #[test]
  fn rejects_shared_watermark_fields() {
    let err = Registry::new([
      ReadableConfig::new("comment").with_watermark(field("seen_at")),
      ReadableConfig::new("post").with_watermark(field("seen_at")),
    ])
    .unwrap_err();
    assert!(matches!(err, Error::SharedWatermarkField(f) if f == "seen_at"));
  }

  #[test]
  fn deserializes_from_config_shape() {
    let config: ReadableConfig = serde_json::from_str(
      r#"{"item_type":"comment","watermark_field":"comments_read_at"}"#,
    )
    .unwrap();
    assert_eq!(config.item_type, ItemType::from("comment"));
    assert_eq!(config.watermark, Some(field("comments_read_at")));

    let bare: ReadableConfig = serde_json::from_str(r#"{"item_type":"post"}"#).unwrap();
    assert!(bare.watermark.is_none());
  }
}
