//! `readmark.toml` and its `READMARK_*` environment overrides.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use readmark_core::config::{ReadableConfig, Registry};
use readmark_store_sqlite::DEFAULT_BATCH_SIZE;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  /// Page size for bulk marks on types without a watermark.
  #[serde(default = "default_batch_size")]
  pub batch_size: usize,
  #[serde(default)]
  pub readables:  Vec<ReadableConfig>,
}

fn default_store_path() -> PathBuf { PathBuf::from("readmark.db") }

fn default_batch_size() -> usize { DEFAULT_BATCH_SIZE }

impl Settings {
  /// Layer the optional config file under the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let source = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("READMARK")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?;

    source
      .try_deserialize()
      .context("failed to deserialise settings")
  }

  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }

  pub fn registry(&self) -> anyhow::Result<Registry> {
    Registry::new(self.readables.iter().cloned()).context("invalid readables")
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use readmark_core::item::ItemType;

  use super::*;

  fn parse(toml: &str) -> Result<Settings, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()?
      .try_deserialize()
  }

  #[test]
  fn full_file() {
    let settings = parse(
      r#"
        store_path = "/var/lib/readmark.db"
        batch_size = 50

        [[readables]]
        item_type       = "comment"
        watermark_field = "comments_read_at"

        [[readables]]
        item_type = "post"
      "#,
    )
    .unwrap();

    assert_eq!(settings.store_path(), PathBuf::from("/var/lib/readmark.db"));
    assert_eq!(settings.batch_size, 50);

    let registry = settings.registry().unwrap();
    let comment = registry.get(&ItemType::new("comment")).unwrap();
    assert_eq!(comment.watermark.as_ref().map(|f| f.as_str()), Some("comments_read_at"));
    assert!(registry.get(&ItemType::new("post")).unwrap().watermark.is_none());
  }

  #[test]
  fn empty_file_uses_defaults() {
    let settings = parse("").unwrap();
    assert_eq!(settings.store_path, PathBuf::from("readmark.db"));
    assert_eq!(settings.batch_size, DEFAULT_BATCH_SIZE);
    assert!(settings.readables.is_empty());
  }

  #[test]
  fn invalid_watermark_field_is_rejected() {
    let result = parse(
      r#"
        [[readables]]
        item_type       = "comment"
        watermark_field = "Robert'); DROP TABLE readers;--"
      "#,
    );
    assert!(result.is_err());
  }

  #[test]
  fn shared_watermark_field_is_rejected() {
    let settings = parse(
      r#"
        [[readables]]
        item_type       = "comment"
        watermark_field = "seen_at"

        [[readables]]
        item_type       = "post"
        watermark_field = "seen_at"
      "#,
    )
    .unwrap();
    assert!(settings.registry().is_err());
  }

  #[test]
  fn tilde_is_expanded() {
    let Ok(home) = std::env::var("HOME") else { return };
    let expanded = expand_tilde(Path::new("~/readmark.db"));
    assert_eq!(expanded, PathBuf::from(home).join("readmark.db"));
    assert_eq!(expand_tilde(Path::new("/abs.db")), PathBuf::from("/abs.db"));
  }
}
