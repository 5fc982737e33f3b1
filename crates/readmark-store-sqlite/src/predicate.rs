//! The reconciliation rules of `readmark_core::reconcile`, as SQL.
//!
//! Every scope query joins items (`i`) to the asking reader's readings (`r`)
//! and binds its parameters in a fixed order:
//!
//! | param | value |
//! |-------|-------|
//! | `?1`  | reader id |
//! | `?2`  | reader's watermark for the item type, or NULL |
//! | `?3`  | item type |
//! | `?4`, `?5` | tail-specific (paging) |

use readmark_core::{
  reconcile::{Scope, TimestampField},
  store::ItemOrder,
};

use crate::encode::ITEM_COLUMNS;

/// `READ(ts)`. Never evaluates to NULL, so `NOT READ(ts)` is its exact
/// complement: `IS` keeps the reading branch false when the join found no row.
pub fn read_condition(field: TimestampField) -> String {
  let ts = field.column();
  format!(
    "((r.state IS NULL AND ?2 IS NOT NULL AND i.{ts} <= ?2) \
      OR (r.state IS 'read' AND i.{ts} <= r.updated_at))"
  )
}

pub fn scope_condition(scope: Scope) -> String {
  let read = read_condition(scope.field());
  if scope.wants_read() { read } else { format!("NOT {read}") }
}

/// The full scope query; `tail` follows the `WHERE` clause and may start with
/// further `AND` conditions.
pub fn scope_sql(scope: Scope, tail: &str) -> String {
  format!(
    "SELECT {ITEM_COLUMNS}
     FROM items i
     LEFT JOIN readings r
       ON r.item_type = i.item_type
      AND r.item_id   = i.item_id
      AND r.reader_id = ?1
     WHERE i.item_type = ?3
       AND {condition}
     {tail}",
    condition = scope_condition(scope),
  )
}

pub fn order_by(order: ItemOrder) -> &'static str {
  match order {
    ItemOrder::CreatedAsc => "ORDER BY i.created_at ASC, i.item_id ASC",
    ItemOrder::CreatedDesc => "ORDER BY i.created_at DESC, i.item_id DESC",
    ItemOrder::UpdatedDesc => "ORDER BY i.updated_at DESC, i.item_id DESC",
  }
}

/// Caller-ordered page: `?4` limit (-1 for none), `?5` offset.
pub fn ordered_tail(order: ItemOrder) -> String {
  format!("{} LIMIT ?4 OFFSET ?5", order_by(order))
}

/// Keyset page over `item_id`: `?4` exclusive lower bound, `?5` page size.
/// Rows leaving the scope between pages cannot cause skips.
pub const KEYSET_TAIL: &str = "AND i.item_id > ?4 ORDER BY i.item_id ASC LIMIT ?5";

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::SCHEMA;

  const READER: &str = "reader";

  fn at(secs: u32) -> String { format!("2024-01-01T00:00:{secs:02}.000000Z") }

  /// `fresh` and `late` have no reading; `read` and `unread` have one each,
  /// written after the items were created.
  fn seeded() -> rusqlite::Connection {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    for (id, created) in [("fresh", 1), ("read", 1), ("unread", 1), ("late", 5)] {
      conn
        .execute(
          "INSERT INTO items (item_id, item_type, created_at, updated_at)
           VALUES (?1, 'post', ?2, ?2)",
          rusqlite::params![id, at(created)],
        )
        .unwrap();
    }
    for (id, state) in [("read", "read"), ("unread", "unread")] {
      conn
        .execute(
          "INSERT INTO readings (reader_id, item_id, item_type, state, created_at, updated_at)
           VALUES (?1, ?2, 'post', ?3, ?4, ?4)",
          rusqlite::params![READER, id, state, at(2)],
        )
        .unwrap();
    }
    conn
  }

  fn select(conn: &rusqlite::Connection, scope: Scope, watermark: Option<&str>) -> Vec<String> {
    let sql = scope_sql(scope, &ordered_tail(ItemOrder::CreatedAsc));
    let mut stmt = conn.prepare(&sql).unwrap();
    stmt
      .query_map(rusqlite::params![READER, watermark, "post", -1, 0], |row| row.get(0))
      .unwrap()
      .collect::<rusqlite::Result<Vec<String>>>()
      .unwrap()
  }

  #[test]
  fn every_row_lands_in_exactly_one_scope() {
    let conn = seeded();
    let ids = ["fresh", "read", "unread", "late"];

    for (watermark, expected_read) in [
      (None, vec!["read"]),
      (Some(at(3)), vec!["fresh", "read"]),
    ] {
      for scope in [Scope::ReadBy, Scope::LatestUpdateReadBy] {
        let inside = select(&conn, scope, watermark.as_deref());
        let outside = select(&conn, scope.complement(), watermark.as_deref());

        assert_eq!(inside, expected_read, "{scope} with watermark {watermark:?}");
        for id in ids {
          let hits = inside.iter().chain(&outside).filter(|s| s.as_str() == id).count();
          assert_eq!(hits, 1, "{id} under {scope} with watermark {watermark:?}");
        }
      }
    }
  }

  #[test]
  fn unread_is_negated_read() {
    let read = scope_condition(Scope::ReadBy);
    assert_eq!(scope_condition(Scope::UnreadBy), format!("NOT {read}"));
    assert!(read.contains("i.created_at"));
    assert!(scope_condition(Scope::LatestUpdateUnreadBy).contains("i.updated_at"));
  }

  #[test]
  fn scope_sql_places_tail_after_filter() {
    let sql = scope_sql(Scope::UnreadBy, KEYSET_TAIL);
    let filter = sql.find("WHERE i.item_type = ?3").unwrap();
    let tail = sql.find("AND i.item_id > ?4").unwrap();
    assert!(filter < tail);
  }
}
