//! Row-level access to `items_active` / `items_archived`.
//!
//! Every write goes through [`store_item`], which applies the placement rule:
//! an item whose effective status changed collection is deleted from one table
//! and inserted into the other on the same connection. Callers run it inside a
//! transaction so a crash cannot leave a listing in neither table.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params, types::Type};
use std::collections::HashSet;
use std::str::FromStr;

use crate::model::item::{Collection, Item, ItemKind, Location, Price, Status, StatusPair};

/// Column list shared by both item tables, in [`row_to_item`] order.
pub const ITEM_COLUMNS: &str = "item_id, kind, title, md, html, price_value, price_currency, \
     price_base, lat, lon, st, ste, prev_st_json, del_reason, del_by, edit_count, \
     last_edit_ts_us, files_json, user_id, section_id, ts_us, autoclose_at_us, ip, \
     barter_info, delivery, is_new";

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_col<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

/// Map a row selected with [`ITEM_COLUMNS`] into an [`Item`].
///
/// # Errors
///
/// Returns a conversion error for unknown enum spellings or malformed JSON.
pub fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    let price = match (
        row.get::<_, Option<f64>>(5)?,
        row.get::<_, Option<String>>(6)?,
    ) {
        (Some(value), Some(currency)) => Some(Price { value, currency }),
        _ => None,
    };
    let location = match (row.get::<_, Option<f64>>(8)?, row.get::<_, Option<f64>>(9)?) {
        (Some(lat), Some(lon)) => Some(Location { lat, lon }),
        _ => None,
    };
    let ste = row
        .get::<_, Option<String>>(11)?
        .map(|raw| Status::from_str(&raw).map_err(|e| conversion_error(11, e)))
        .transpose()?;
    let prev_st = row
        .get::<_, Option<String>>(12)?
        .map(|raw| serde_json::from_str::<StatusPair>(&raw).map_err(|e| conversion_error(12, e)))
        .transpose()?;
    let files_raw: String = row.get(17)?;
    let files: Vec<String> =
        serde_json::from_str(&files_raw).map_err(|e| conversion_error(17, e))?;

    Ok(Item {
        id: row.get(0)?,
        kind: parse_col::<ItemKind>(row, 1)?,
        title: row.get(2)?,
        md: row.get(3)?,
        html: row.get(4)?,
        price,
        price_base: row.get(7)?,
        location,
        st: parse_col::<Status>(row, 10)?,
        ste,
        prev_st,
        del_reason: row.get(13)?,
        del_by: row.get(14)?,
        edit_count: row.get(15)?,
        last_edit_ts: row.get(16)?,
        files,
        user: row.get(18)?,
        section: row.get(19)?,
        ts: row.get(20)?,
        autoclose_at: row.get(21)?,
        ip: row.get(22)?,
        barter_info: row.get(23)?,
        delivery: row.get::<_, i64>(24)? != 0,
        is_new: row.get::<_, i64>(25)? != 0,
    })
}

/// Insert `item` into `collection`'s table.
///
/// # Errors
///
/// Returns an error if the insert fails (including the cross-table guard).
pub fn insert_item(conn: &Connection, collection: Collection, item: &Item) -> Result<()> {
    let sql = format!(
        "INSERT INTO {} ({ITEM_COLUMNS}) VALUES \
         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, \
          ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
        collection.table_name()
    );
    let prev_st = item
        .prev_st
        .map(|p| serde_json::to_string(&p))
        .transpose()
        .context("serialize prev_st")?;
    let files = serde_json::to_string(&item.files).context("serialize files")?;

    let mut stmt = conn.prepare_cached(&sql).context("prepare item insert")?;
    stmt.execute(params![
        item.id,
        item.kind.as_str(),
        item.title,
        item.md,
        item.html,
        item.price.as_ref().map(|p| p.value),
        item.price.as_ref().map(|p| p.currency.as_str()),
        item.price_base,
        item.location.map(|l| l.lat),
        item.location.map(|l| l.lon),
        item.st.as_str(),
        item.ste.map(Status::as_str),
        prev_st,
        item.del_reason,
        item.del_by,
        item.edit_count,
        item.last_edit_ts,
        files,
        item.user,
        item.section,
        item.ts,
        item.autoclose_at,
        item.ip,
        item.barter_info,
        i64::from(item.delivery),
        i64::from(item.is_new),
    ])
    .with_context(|| format!("insert item {} into {}", item.id, collection.table_name()))?;
    Ok(())
}

/// Remove the row for `item_id` from `collection`. Returns whether a row existed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_row(conn: &Connection, collection: Collection, item_id: &str) -> Result<bool> {
    let sql = format!("DELETE FROM {} WHERE item_id = ?1", collection.table_name());
    let n = conn
        .prepare_cached(&sql)
        .context("prepare item delete")?
        .execute([item_id])
        .with_context(|| format!("delete item {item_id} from {}", collection.table_name()))?;
    Ok(n > 0)
}

/// Persist `item`, currently stored in `from`, applying the placement rule.
///
/// Returns the collection the item lives in afterwards.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn store_item(conn: &Connection, item: &Item, from: Collection) -> Result<Collection> {
    let to = item.collection();
    delete_row(conn, from, &item.id)?;
    insert_item(conn, to, item)?;
    if from != to {
        tracing::debug!(
            item_id = %item.id,
            from = from.as_str(),
            to = to.as_str(),
            "relocated item"
        );
    }
    Ok(to)
}

/// Look up an item in either table.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn find_item(conn: &Connection, item_id: &str) -> Result<Option<(Item, Collection)>> {
    for collection in [Collection::Active, Collection::Archived] {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM {} WHERE item_id = ?1",
            collection.table_name()
        );
        let found = conn
            .prepare_cached(&sql)
            .context("prepare find_item")?
            .query_row([item_id], row_to_item)
            .optional()
            .with_context(|| format!("find_item '{item_id}'"))?;
        if let Some(item) = found {
            return Ok(Some((item, collection)));
        }
    }
    Ok(None)
}

/// Load items by id from either table, in request order, skipping unknown
/// and duplicate ids.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn load_items(conn: &Connection, ids: &[String]) -> Result<Vec<(Item, Collection)>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        if let Some(found) = find_item(conn, id)? {
            out.push(found);
        }
    }
    Ok(out)
}

/// Whether `item_id` exists in either table.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn item_exists(conn: &Connection, item_id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM items_active WHERE item_id = ?1)
             OR EXISTS(SELECT 1 FROM items_archived WHERE item_id = ?1)",
        [item_id],
        |row| row.get(0),
    )
    .with_context(|| format!("item_exists '{item_id}'"))
}

/// Write `edit_count` / `last_edit_ts` wherever the item lives.
///
/// # Errors
///
/// Returns an error if an update fails.
pub fn set_edit_stats(conn: &Connection, item_id: &str, edit_count: i64, last_edit_ts: i64) -> Result<()> {
    for collection in [Collection::Active, Collection::Archived] {
        let sql = format!(
            "UPDATE {} SET edit_count = ?2, last_edit_ts_us = ?3 WHERE item_id = ?1",
            collection.table_name()
        );
        conn.prepare_cached(&sql)
            .context("prepare edit stats update")?
            .execute(params![item_id, edit_count, last_edit_ts])
            .with_context(|| format!("update edit stats for {item_id}"))?;
    }
    Ok(())
}

/// Ids (with placement) of items matching a raw `WHERE` fragment on both tables.
///
/// `predicate` must only reference item columns; it is never built from user
/// input.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn ids_where(
    conn: &Connection,
    predicate: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT item_id FROM items_active WHERE {predicate} \
         UNION ALL SELECT item_id FROM items_archived WHERE {predicate} \
         ORDER BY item_id"
    );
    let mut stmt = conn.prepare(&sql).context("prepare ids_where")?;
    let rows = stmt
        .query_map(params, |row| row.get::<_, String>(0))
        .context("execute ids_where")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("read ids_where row")?);
    }
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::testing::sample_item;
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn insert_then_find_roundtrips_all_fields() {
        let conn = open_in_memory().expect("store");
        let mut item = sample_item(&conn, "mk-aaaaaaaaaa", "bikes");
        item.prev_st = Some(StatusPair::new(Status::Hb, Some(Status::Open)));
        insert_item(&conn, Collection::Active, &item).expect("insert");

        let (found, collection) = find_item(&conn, "mk-aaaaaaaaaa")
            .expect("query")
            .expect("present");
        assert_eq!(collection, Collection::Active);
        assert_eq!(found, item);
    }

    #[test]
    fn store_item_relocates_on_placement_change() {
        let conn = open_in_memory().expect("store");
        let mut item = sample_item(&conn, "mk-bbbbbbbbbb", "bikes");
        insert_item(&conn, Collection::Active, &item).expect("insert");

        item.st = Status::Closed;
        let to = store_item(&conn, &item, Collection::Active).expect("store");
        assert_eq!(to, Collection::Archived);

        let active: i64 = conn
            .query_row("SELECT COUNT(*) FROM items_active", [], |r| r.get(0))
            .expect("count");
        let archived: i64 = conn
            .query_row("SELECT COUNT(*) FROM items_archived", [], |r| r.get(0))
            .expect("count");
        assert_eq!((active, archived), (0, 1));
    }

    #[test]
    fn load_items_skips_unknown_and_duplicates() {
        let conn = open_in_memory().expect("store");
        let item = sample_item(&conn, "mk-cccccccccc", "bikes");
        insert_item(&conn, Collection::Active, &item).expect("insert");

        let ids = vec![
            "mk-cccccccccc".to_string(),
            "mk-missing000".to_string(),
            "mk-cccccccccc".to_string(),
        ];
        let loaded = load_items(&conn, &ids).expect("load");
        assert_eq!(loaded.len(), 1);
        assert!(item_exists(&conn, "mk-cccccccccc").expect("exists"));
        assert!(!item_exists(&conn, "mk-missing000").expect("exists"));
    }

    #[test]
    fn edit_stats_follow_the_item() {
        let conn = open_in_memory().expect("store");
        let item = sample_item(&conn, "mk-dddddddddd", "bikes");
        insert_item(&conn, Collection::Archived, &item).expect("insert");
        set_edit_stats(&conn, "mk-dddddddddd", 3, 42).expect("stats");
        let (found, _) = find_item(&conn, "mk-dddddddddd")
            .expect("query")
            .expect("present");
        assert_eq!(found.edit_count, 3);
        assert_eq!(found.last_edit_ts, Some(42));
    }
}
