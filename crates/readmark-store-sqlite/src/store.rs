//! [`SqliteStore`]: the SQLite implementation of [`ReadingStore`].

use std::{
  collections::{BTreeMap, HashMap},
  path::Path,
  sync::Arc,
};

use chrono::{DateTime, Utc};
use readmark_core::{
  clock::{Clock, SystemClock},
  config::Registry,
  item::{Item, ItemType, Readable},
  reader::{Reader, WatermarkField},
  reading::{CachedReading, Prefetched, Reading, ReadingKey, ReadingState, SaveOutcome},
  reconcile::{self, Lookup, Scope, TimestampField},
  retry::save_with_retry,
  store::{BulkOutcome, ItemQuery, ReadingStore},
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    ITEM_COLUMNS, READING_COLUMNS, RawItem, RawReader, RawReading, decode_uuid, encode_dt,
    encode_uuid, reader_columns,
  },
  predicate,
  schema::{READER_COLUMNS_QUERY, SCHEMA, watermark_column_ddl},
};

/// Page size for bulk marks that have to visit items one by one.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Ids bound into a single `IN (...)` list when prefetching.
const MAX_IN_LIST: usize = 500;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A readmark store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:       tokio_rusqlite::Connection,
  registry:   Arc<Registry>,
  clock:      Arc<dyn Clock>,
  batch_size: usize,
}

impl SqliteStore {
  /// Open (or create) a store at `path` tracking the item types in
  /// `registry`, and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, registry: Registry) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, registry).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory(registry: Registry) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, registry).await
  }

  async fn init(conn: tokio_rusqlite::Connection, registry: Registry) -> Result<Self> {
    let store = Self {
      conn,
      registry: Arc::new(registry),
      clock: Arc::new(SystemClock),
      batch_size: DEFAULT_BATCH_SIZE,
    };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the clock used for every timestamp the store writes.
  pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
    self.clock = Arc::new(clock);
    self
  }

  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size.max(1);
    self
  }

  pub fn registry(&self) -> &Registry { &self.registry }

  async fn init_schema(&self) -> Result<()> {
    let fields = self.watermark_fields();

    self
      .conn
      .call(move |conn| {
        conn.execute_batch(SCHEMA)?;

        let existing = {
          let mut stmt = conn.prepare(READER_COLUMNS_QUERY)?;
          let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          names
        };

        for field in fields {
          if !existing.iter().any(|name| name == field.as_str()) {
            conn.execute_batch(&watermark_column_ddl(&field))?;
          }
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  fn watermark_fields(&self) -> Vec<WatermarkField> {
    self.registry.watermark_fields().cloned().collect()
  }

  // ── Readers ───────────────────────────────────────────────────────────────

  /// Create and persist a reader with no watermarks set.
  pub async fn add_reader(&self) -> Result<Reader> {
    let reader = Reader::new(Uuid::new_v4(), self.clock.now());

    let id_str = encode_uuid(reader.reader_id);
    let at_str = encode_dt(reader.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO readers (reader_id, created_at) VALUES (?1, ?2)",
          rusqlite::params![id_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(reader)
  }

  /// Retrieve a reader and its watermarks. Returns `None` if not found.
  pub async fn get_reader(&self, id: Uuid) -> Result<Option<Reader>> {
    let fields = self.watermark_fields();
    let sql = format!(
      "SELECT {} FROM readers WHERE reader_id = ?1",
      reader_columns(&fields)
    );
    let id_str = encode_uuid(id);
    let count = fields.len();

    let raw: Option<RawReader> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], |row| {
              RawReader::from_row(row, count)
            })
            .optional()?,
        )
      })
      .await?;

    raw.map(|r| r.into_reader(&fields)).transpose()
  }

  /// Delete a reader and every reading it owns. Returns `false` if the reader
  /// did not exist.
  pub async fn delete_reader(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM readings WHERE reader_id = ?1", rusqlite::params![id_str])?;
        let deleted =
          tx.execute("DELETE FROM readers WHERE reader_id = ?1", rusqlite::params![id_str])?;
        tx.commit()?;
        Ok(deleted > 0)
      })
      .await?;

    tracing::debug!(reader_id = %id, deleted, "deleted reader");
    Ok(deleted)
  }

  // ── Items ─────────────────────────────────────────────────────────────────

  /// Create and persist a new item of `item_type`.
  pub async fn put_item(&self, item_type: ItemType) -> Result<Item> {
    self.put_item_with_id(Uuid::new_v4(), item_type).await
  }

  /// Create and persist an item with a caller-supplied UUID. Returns an error
  /// if the UUID is already taken.
  pub async fn put_item_with_id(&self, id: Uuid, item_type: ItemType) -> Result<Item> {
    let now = self.clock.now();
    let item = Item { item_id: id, item_type, created_at: now, updated_at: now };

    let id_str   = encode_uuid(item.item_id);
    let type_str = item.item_type.as_str().to_owned();
    let at_str   = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO items (item_id, item_type, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?3)",
          rusqlite::params![id_str, type_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(item)
  }

  /// Record an edit: advance the item's `updated_at` to now.
  pub async fn touch_item(&self, id: Uuid) -> Result<Item> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(self.clock.now());

    let raw: Option<RawItem> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "UPDATE items SET updated_at = ?1 WHERE item_id = ?2
               RETURNING item_id, item_type, created_at, updated_at",
              rusqlite::params![at_str, id_str],
              RawItem::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.ok_or(Error::ItemNotFound(id))?.into_item()
  }

  /// Retrieve an item by UUID. Returns `None` if not found.
  pub async fn get_item(&self, id: Uuid) -> Result<Option<Item>> {
    let id_str = encode_uuid(id);
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items i WHERE i.item_id = ?1");

    let raw: Option<RawItem> = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&sql, rusqlite::params![id_str], RawItem::from_row).optional()?)
      })
      .await?;

    raw.map(RawItem::into_item).transpose()
  }

  /// Every item of `item_type`, unfiltered, in `query` order.
  pub async fn list_items(&self, item_type: &ItemType, query: &ItemQuery) -> Result<Vec<Item>> {
    let sql = format!(
      "SELECT {ITEM_COLUMNS} FROM items i WHERE i.item_type = ?1 {} LIMIT ?2 OFFSET ?3",
      predicate::order_by(query.order)
    );
    let type_str = item_type.as_str().to_owned();
    let (limit, offset) = limit_offset(query);

    let raws = self
      .conn
      .call(move |conn| {
        Ok(query_items(conn, &sql, rusqlite::params![type_str, limit, offset])?)
      })
      .await?;

    raws.into_iter().map(RawItem::into_item).collect()
  }

  /// Delete an item and every reading of it. Returns `false` if the item did
  /// not exist.
  pub async fn delete_item(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM readings
           WHERE item_id = ?1
             AND item_type = (SELECT item_type FROM items WHERE item_id = ?1)",
          rusqlite::params![id_str],
        )?;
        let deleted =
          tx.execute("DELETE FROM items WHERE item_id = ?1", rusqlite::params![id_str])?;
        tx.commit()?;
        Ok(deleted > 0)
      })
      .await?;

    tracing::debug!(item_id = %id, deleted, "deleted item");
    Ok(deleted)
  }

  // ── Reading writes ────────────────────────────────────────────────────────

  /// One find-or-create attempt for `key`. An insert that loses a uniqueness
  /// race reports [`SaveOutcome::Conflict`].
  pub(crate) async fn save_attempt(
    &self,
    key: &ReadingKey,
    state: ReadingState,
  ) -> Result<SaveOutcome> {
    let now = self.clock.now();

    if let Some(mut reading) = self.find_reading(key).await? {
      reading.state = state;
      reading.updated_at = now;
      if self.update_reading(&reading).await? {
        return Ok(SaveOutcome::Updated(reading));
      }
      // Removed since we looked (e.g. by a bulk mark); create it afresh.
    }

    self
      .insert_reading(Reading {
        reader_id: key.reader_id,
        item_id: key.item_id,
        item_type: key.item_type.clone(),
        state,
        created_at: now,
        updated_at: now,
      })
      .await
  }

  /// Overwrite state and `updated_at`. Returns `false` if the row is gone.
  async fn update_reading(&self, reading: &Reading) -> Result<bool> {
    let reader_str = encode_uuid(reading.reader_id);
    let item_str   = encode_uuid(reading.item_id);
    let type_str   = reading.item_type.as_str().to_owned();
    let state_str  = reading.state.as_str();
    let at_str     = encode_dt(reading.updated_at);

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE readings SET state = ?1, updated_at = ?2
           WHERE reader_id = ?3 AND item_id = ?4 AND item_type = ?5",
          rusqlite::params![state_str, at_str, reader_str, item_str, type_str],
        )?)
      })
      .await?;

    Ok(updated > 0)
  }

  pub(crate) async fn insert_reading(&self, reading: Reading) -> Result<SaveOutcome> {
    let reader_str = encode_uuid(reading.reader_id);
    let item_str   = encode_uuid(reading.item_id);
    let type_str   = reading.item_type.as_str().to_owned();
    let state_str  = reading.state.as_str();
    let created    = encode_dt(reading.created_at);
    let updated    = encode_dt(reading.updated_at);

    let inserted = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          &format!("INSERT INTO readings ({READING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
          rusqlite::params![reader_str, item_str, type_str, state_str, created, updated],
        );
        match result {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if inserted {
      Ok(SaveOutcome::Created(reading))
    } else {
      tracing::debug!(key = %reading.key(), "reading insert hit uniqueness constraint");
      Ok(SaveOutcome::Conflict)
    }
  }

  // ── Bulk paths ────────────────────────────────────────────────────────────

  /// Fast path: drop the now-redundant readings and move the watermark, in
  /// one transaction.
  ///
  /// Read-all only drops readings at or before the new watermark, so an
  /// explicit mark made after that instant keeps precedence.
  async fn apply_watermark(
    &self,
    item_type: &ItemType,
    reader_id: Uuid,
    field: &WatermarkField,
    state: ReadingState,
  ) -> Result<(Option<DateTime<Utc>>, usize)> {
    let at = match state {
      ReadingState::Read => Some(self.clock.now()),
      ReadingState::Unread => None,
    };

    let at_str     = at.map(encode_dt);
    let reader_str = encode_uuid(reader_id);
    let type_str   = item_type.as_str().to_owned();
    let update_sql = format!("UPDATE readers SET \"{field}\" = ?1 WHERE reader_id = ?2");

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let removed = match &at_str {
          // Readings marked after `at` stay, so replaying read-all at an
          // earlier instant cannot undo a later explicit unread.
          Some(at) => tx.execute(
            "DELETE FROM readings
             WHERE reader_id = ?1 AND item_type = ?2 AND updated_at <= ?3",
            rusqlite::params![reader_str, type_str, at],
          )?,
          None => tx.execute(
            "DELETE FROM readings WHERE reader_id = ?1 AND item_type = ?2",
            rusqlite::params![reader_str, type_str],
          )?,
        };

        // Dropping the transaction without committing rolls the delete back.
        if tx.execute(&update_sql, rusqlite::params![at_str, reader_str])? == 0 {
          return Ok(None);
        }

        tx.commit()?;
        Ok(Some(removed))
      })
      .await?
      .ok_or(Error::ReaderNotFound(reader_id))?;

    Ok((at, removed))
  }

  /// Fallback path: walk the items not yet in `state`, a page at a time, and
  /// mark each one.
  async fn mark_each(
    &self,
    item_type: &ItemType,
    reader: &Reader,
    state: ReadingState,
  ) -> Result<usize> {
    let pending = Scope::pending(state);
    let mut after = String::new();
    let mut marked = 0;

    loop {
      let page = self.scope_page(pending, item_type, reader, &after).await?;
      for item in &page {
        self.mark(item, reader, state).await?;
      }
      marked += page.len();

      match page.last() {
        Some(last) if page.len() == self.batch_size => after = encode_uuid(last.item_id),
        _ => break,
      }
    }

    Ok(marked)
  }

  /// One keyset page of `scope`, starting after item id `after`.
  async fn scope_page(
    &self,
    scope: Scope,
    item_type: &ItemType,
    reader: &Reader,
    after: &str,
  ) -> Result<Vec<Item>> {
    let watermark  = reader.watermark(self.registry.get(item_type)?).map(encode_dt);
    let sql        = predicate::scope_sql(scope, predicate::KEYSET_TAIL);
    let reader_str = encode_uuid(reader.reader_id);
    let type_str   = item_type.as_str().to_owned();
    let after      = after.to_owned();
    let limit      = self.batch_size as i64;

    let raws = self
      .conn
      .call(move |conn| {
        Ok(query_items(
          conn,
          &sql,
          rusqlite::params![reader_str, watermark, type_str, after, limit],
        )?)
      })
      .await?;

    raws.into_iter().map(RawItem::into_item).collect()
  }

  /// Readings of `reader` among `ids`, all of `item_type`.
  async fn readings_among(
    &self,
    reader_id: Uuid,
    item_type: &ItemType,
    ids: &[Uuid],
  ) -> Result<Vec<Reading>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }

    let placeholders = (0..ids.len())
      .map(|n| format!("?{}", n + 3))
      .collect::<Vec<_>>()
      .join(", ");
    let sql = format!(
      "SELECT {READING_COLUMNS} FROM readings
       WHERE reader_id = ?1 AND item_type = ?2 AND item_id IN ({placeholders})"
    );

    let mut params = vec![encode_uuid(reader_id), item_type.as_str().to_owned()];
    params.extend(ids.iter().copied().map(encode_uuid));

    let raws: Vec<RawReading> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawReading::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReading::into_reading).collect()
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(err, _)
      if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

fn limit_offset(query: &ItemQuery) -> (i64, i64) {
  let limit = query.limit.map_or(-1, |l| l as i64);
  let offset = query.offset.unwrap_or(0) as i64;
  (limit, offset)
}

fn query_items(
  conn: &rusqlite::Connection,
  sql: &str,
  params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<RawItem>> {
  let mut stmt = conn.prepare(sql)?;
  let rows = stmt
    .query_map(params, RawItem::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

// ─── ReadingStore impl ───────────────────────────────────────────────────────

impl ReadingStore for SqliteStore {
  type Error = Error;

  // ── Readings ──────────────────────────────────────────────────────────────

  async fn find_reading<'a>(&'a self, key: &'a ReadingKey) -> Result<Option<Reading>> {
    let reader_str = encode_uuid(key.reader_id);
    let item_str   = encode_uuid(key.item_id);
    let type_str   = key.item_type.as_str().to_owned();
    let sql = format!(
      "SELECT {READING_COLUMNS} FROM readings
       WHERE reader_id = ?1 AND item_id = ?2 AND item_type = ?3"
    );

    let raw: Option<RawReading> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![reader_str, item_str, type_str],
              RawReading::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawReading::into_reading).transpose()
  }

  async fn readings_for<'a, R: Readable + Sync>(&'a self, item: &'a R) -> Result<Vec<Reading>> {
    let item_str = encode_uuid(item.item_id());
    let type_str = item.item_type().as_str().to_owned();
    let sql = format!(
      "SELECT {READING_COLUMNS} FROM readings
       WHERE item_type = ?1 AND item_id = ?2
       ORDER BY updated_at ASC"
    );

    let raws: Vec<RawReading> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![type_str, item_str], RawReading::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReading::into_reading).collect()
  }

  async fn readers_of<'a, R: Readable + Sync>(&'a self, item: &'a R) -> Result<Vec<Uuid>> {
    let item_str = encode_uuid(item.item_id());
    let type_str = item.item_type().as_str().to_owned();

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT reader_id FROM readings
           WHERE item_type = ?1 AND item_id = ?2 AND state = 'read'
           ORDER BY updated_at ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![type_str, item_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  // ── Single-item marks ─────────────────────────────────────────────────────

  async fn mark<'a, R: Readable + Sync>(
    &'a self,
    item: &'a R,
    reader: &'a Reader,
    state: ReadingState,
  ) -> Result<Reading> {
    self.registry.get(item.item_type())?;
    let key = ReadingKey::for_item(reader.reader_id, item);

    let reading = save_with_retry(&key, || self.save_attempt(&key, state)).await?;

    tracing::debug!(%key, %state, at = %reading.updated_at, "marked reading");
    Ok(reading)
  }

  // ── Bulk marks ────────────────────────────────────────────────────────────

  async fn mark_all<'a>(
    &'a self,
    item_type: &'a ItemType,
    reader: &'a mut Reader,
    state: ReadingState,
  ) -> Result<BulkOutcome> {
    let config = self.registry.get(item_type)?;

    let outcome = match &config.watermark {
      Some(field) => {
        let (at, removed) =
          self.apply_watermark(item_type, reader.reader_id, field, state).await?;
        reader.set_watermark(field, at);
        BulkOutcome::Watermarked { at, removed }
      }
      None => BulkOutcome::Individually {
        marked: self.mark_each(item_type, reader, state).await?,
      },
    };

    tracing::info!(
      reader_id = %reader.reader_id,
      %item_type,
      %state,
      ?outcome,
      "bulk mark applied"
    );
    Ok(outcome)
  }

  // ── Set queries ───────────────────────────────────────────────────────────

  async fn scope<'a>(
    &'a self,
    scope: Scope,
    item_type: &'a ItemType,
    reader: &'a Reader,
    query: &'a ItemQuery,
  ) -> Result<Vec<Item>> {
    let watermark  = reader.watermark(self.registry.get(item_type)?).map(encode_dt);
    let sql        = predicate::scope_sql(scope, &predicate::ordered_tail(query.order));
    let reader_str = encode_uuid(reader.reader_id);
    let type_str   = item_type.as_str().to_owned();
    let (limit, offset) = limit_offset(query);

    let raws = self
      .conn
      .call(move |conn| {
        Ok(query_items(
          conn,
          &sql,
          rusqlite::params![reader_str, watermark, type_str, limit, offset],
        )?)
      })
      .await?;

    raws.into_iter().map(RawItem::into_item).collect()
  }

  // ── Single-item queries ───────────────────────────────────────────────────

  async fn is_read_as_of<'a, R: Readable + Sync>(
    &'a self,
    item: &'a R,
    reader: &'a Reader,
    field: TimestampField,
  ) -> Result<bool> {
    let watermark = reader.watermark(self.registry.get(item.item_type())?);

    let fetched = match reconcile::lookup(item.cached_reading(reader.reader_id)) {
      Lookup::Known(reading) => {
        return Ok(reconcile::is_read(item, field, reading, watermark));
      }
      Lookup::Unknown => {
        self
          .find_reading(&ReadingKey::for_item(reader.reader_id, item))
          .await?
      }
    };

    Ok(reconcile::is_read(item, field, fetched.as_ref(), watermark))
  }

  // ── Prefetch ──────────────────────────────────────────────────────────────

  async fn prefetch_readings<'a, T: Readable + Send + 'a>(
    &'a self,
    items: Vec<T>,
    reader: &'a Reader,
  ) -> Result<Vec<Prefetched<T>>> {
    let mut ids_by_type: BTreeMap<ItemType, Vec<Uuid>> = BTreeMap::new();
    for item in &items {
      ids_by_type
        .entry(item.item_type().clone())
        .or_default()
        .push(item.item_id());
    }

    let mut found: HashMap<(ItemType, Uuid), Reading> = HashMap::new();
    for (item_type, ids) in ids_by_type {
      for chunk in ids.chunks(MAX_IN_LIST) {
        for reading in self.readings_among(reader.reader_id, &item_type, chunk).await? {
          found.insert((reading.item_type.clone(), reading.item_id), reading);
        }
      }
    }

    tracing::debug!(
      reader_id = %reader.reader_id,
      items = items.len(),
      found = found.len(),
      "prefetched readings"
    );

    Ok(
      items
        .into_iter()
        .map(|item| {
          let reading = match found.get(&(item.item_type().clone(), item.item_id())) {
            Some(reading) => CachedReading::Present(reading.clone()),
            None => CachedReading::Absent,
          };
          Prefetched { item, reader_id: reader.reader_id, reading }
        })
        .collect(),
    )
  }
}
