//! Subcommands. Each one runs against an open store and yields the JSON it
//! prints.

use anyhow::Context as _;
use clap::Subcommand;
use readmark_core::{
  item::{Item, ItemType},
  reader::Reader,
  reading::ReadingState,
  reconcile::{ReadStatus, Scope},
  store::{ItemOrder, ItemQuery, ReadingStore},
};
use readmark_store_sqlite::{Error, SqliteStore};
use serde_json::{Value, json};
use uuid::Uuid;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Create, show or delete readers.
  #[command(subcommand)]
  Reader(ReaderCommand),

  /// Create, edit or delete items.
  #[command(subcommand)]
  Item(ItemCommand),

  /// Mark one item `read` or `unread` for a reader.
  Mark {
    state:  ReadingState,
    reader: Uuid,
    item:   Uuid,
  },

  /// Mark every item of a type `read` or `unread` for a reader.
  MarkAll {
    state:     ReadingState,
    reader:    Uuid,
    item_type: ItemType,
  },

  /// List the items of a type in a scope: `read`, `unread`,
  /// `latest-update-read` or `latest-update-unread`.
  List {
    scope:     Scope,
    reader:    Uuid,
    item_type: ItemType,
    #[arg(long)]
    limit:     Option<usize>,
    #[arg(long)]
    offset:    Option<usize>,
    /// `created-asc`, `created-desc` or `updated-desc`.
    #[arg(long, default_value = "created-asc")]
    order:     ItemOrder,
  },

  /// Show whether a reader has read an item and its latest update.
  Status { reader: Uuid, item: Uuid },

  /// List the readers holding an explicit read of an item.
  ReadersOf { item: Uuid },
}

#[derive(Subcommand, Debug)]
pub enum ReaderCommand {
  Add,
  Show { id: Uuid },
  Delete { id: Uuid },
}

#[derive(Subcommand, Debug)]
pub enum ItemCommand {
  Add { item_type: ItemType },
  /// Record an edit.
  Touch { id: Uuid },
  Delete { id: Uuid },
}

impl Command {
  pub async fn run(self, store: &SqliteStore) -> anyhow::Result<Value> {
    let value = match self {
      Self::Reader(ReaderCommand::Add) => json!(store.add_reader().await?),
      Self::Reader(ReaderCommand::Show { id }) => json!(load_reader(store, id).await?),
      Self::Reader(ReaderCommand::Delete { id }) => {
        json!({ "deleted": store.delete_reader(id).await? })
      }

      Self::Item(ItemCommand::Add { item_type }) => {
        store.registry().get(&item_type)?;
        json!(store.put_item(item_type).await?)
      }
      Self::Item(ItemCommand::Touch { id }) => json!(store.touch_item(id).await?),
      Self::Item(ItemCommand::Delete { id }) => {
        json!({ "deleted": store.delete_item(id).await? })
      }

      Self::Mark { state, reader, item } => {
        let reader = load_reader(store, reader).await?;
        let item = load_item(store, item).await?;
        json!(store.mark(&item, &reader, state).await?)
      }

      Self::MarkAll { state, reader, item_type } => {
        let mut reader = load_reader(store, reader).await?;
        let outcome = store.mark_all(&item_type, &mut reader, state).await?;
        json!({ "outcome": outcome, "reader": reader })
      }

      Self::List { scope, reader, item_type, limit, offset, order } => {
        let reader = load_reader(store, reader).await?;
        let query = ItemQuery { order, limit, offset };
        json!(store.scope(scope, &item_type, &reader, &query).await?)
      }

      Self::Status { reader, item } => {
        let reader = load_reader(store, reader).await?;
        let item = load_item(store, item).await?;

        let prefetched = store
          .prefetch_readings(vec![item], &reader)
          .await?
          .pop()
          .context("prefetch returned no items")?;

        let status = ReadStatus {
          read:               store.is_read_by(&prefetched, &reader).await?,
          latest_update_read: store.is_latest_update_read_by(&prefetched, &reader).await?,
        };
        json!({
          "item": prefetched.item,
          "read": status.read,
          "latest_update_read": status.latest_update_read,
          "updated": status.updated(),
        })
      }

      Self::ReadersOf { item } => {
        let item = load_item(store, item).await?;
        json!(store.readers_of(&item).await?)
      }
    };
    Ok(value)
  }
}

async fn load_reader(store: &SqliteStore, id: Uuid) -> anyhow::Result<Reader> {
  Ok(store.get_reader(id).await?.ok_or(Error::ReaderNotFound(id))?)
}

async fn load_item(store: &SqliteStore, id: Uuid) -> anyhow::Result<Item> {
  Ok(store.get_item(id).await?.ok_or(Error::ItemNotFound(id))?)
}
