//! SQL schema for the readmark SQLite store.
//!
//! Executed once at connection startup. Watermark columns on `readers` are
//! not part of the static DDL; they are added per configured item type by
//! [`watermark_column_ddl`].

use readmark_core::reader::WatermarkField;

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Host-owned entities. The store only reads their timestamps.
CREATE TABLE IF NOT EXISTS items (
    item_id     TEXT PRIMARY KEY,
    item_type   TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS readers (
    reader_id   TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL
    -- one nullable TEXT watermark column per configured item type
);

-- One explicit mark per (reader, item, item type).
CREATE TABLE IF NOT EXISTS readings (
    reader_id   TEXT NOT NULL,
    item_id     TEXT NOT NULL,
    item_type   TEXT NOT NULL,   -- discriminator shared with items.item_type
    state       TEXT NOT NULL DEFAULT 'read' CHECK (state IN ('read', 'unread')),
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,   -- last explicit transition
    UNIQUE (reader_id, item_id, item_type)
);

CREATE INDEX IF NOT EXISTS items_type_created_idx ON items(item_type, created_at);
CREATE INDEX IF NOT EXISTS readings_join_idx      ON readings(item_type, item_id, reader_id);

PRAGMA user_version = 1;
";

/// Lists the columns currently present on `readers`.
pub const READER_COLUMNS_QUERY: &str = "SELECT name FROM pragma_table_info('readers')";

pub fn watermark_column_ddl(field: &WatermarkField) -> String {
  format!("ALTER TABLE readers ADD COLUMN \"{field}\" TEXT")
}
