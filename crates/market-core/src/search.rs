//! Full-text listing search over FTS5 with structured filters.
//!
//! Only active listings are indexed. Rows carry an `hb` flag so hellbanned
//! listings match for their author and for viewers allowed to see them.
//! The index is refreshed by the `search_index_update` job, so it may lag
//! the item tables briefly.

use anyhow::{Context, Result};
use rusqlite::{Connection, params, params_from_iter, types::ToSql};
use serde::Serialize;

use crate::db::items::{ITEM_COLUMNS, row_to_item};
use crate::model::actor::Actor;
use crate::model::item::{Item, ItemKind, Location};

/// Refresh index rows for `ids`. Returns how many were (re)indexed.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub fn reindex(conn: &Connection, ids: &[String]) -> Result<usize> {
    let mut indexed = 0;
    for id in ids {
        conn.prepare_cached("DELETE FROM items_fts WHERE item_id = ?1")
            .context("prepare fts delete")?
            .execute([id])
            .with_context(|| format!("drop fts row for {id}"))?;
        indexed += conn
            .prepare_cached(
                "INSERT INTO items_fts (title, md, item_id, hb)
                 SELECT title, md, item_id, st = 'HB' FROM items_active WHERE item_id = ?1",
            )
            .context("prepare fts insert")?
            .execute([id])
            .with_context(|| format!("index {id}"))?;
    }
    tracing::debug!(requested = ids.len(), indexed, "search index updated");
    Ok(indexed)
}

/// Drop and rebuild the whole index from `items_active`.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub fn rebuild(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM items_fts", [])
        .context("clear fts index")?;
    let n = conn
        .execute(
            "INSERT INTO items_fts (title, md, item_id, hb)
             SELECT title, md, item_id, st = 'HB' FROM items_active",
            [],
        )
        .context("populate fts index")?;
    tracing::info!(indexed = n, "search index rebuilt");
    Ok(n)
}

/// Search request. Every set field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Free text; words are matched as separate terms.
    pub text: Option<String>,
    pub kind: Option<ItemKind>,
    /// Allowed sections (already expanded to subtrees); empty means all.
    pub sections: Vec<String>,
    /// Inclusive bounds on `price_base`.
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    /// Center point and radius in kilometres.
    pub near: Option<(Location, f64)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// One ranked result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub item: Item,
    /// BM25 score; lower is better. Zero when no text was given.
    pub rank: f64,
    pub distance_km: Option<f64>,
}

/// Turn free text into an FTS5 query of quoted terms.
#[must_use]
pub fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// Run `query` for `viewer`.
///
/// # Errors
///
/// Returns an error if the SQL query fails.
pub fn search(conn: &Connection, query: &SearchQuery, viewer: &Actor) -> Result<Vec<SearchHit>> {
    let columns = ITEM_COLUMNS
        .split(',')
        .map(|c| format!("a.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");

    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    let text = query.text.as_deref().and_then(fts_query);
    let (from, rank) = if let Some(ref text) = text {
        values.push(Box::new(text.clone()));
        conditions.push(format!("items_fts MATCH ?{}", values.len()));
        values.push(Box::new(viewer.user.clone()));
        conditions.push(format!(
            "(items_fts.hb = 0 OR a.user_id = ?{} OR {})",
            values.len(),
            i64::from(viewer.permissions.see_hellbanned)
        ));
        (
            "items_fts INNER JOIN items_active a ON a.item_id = items_fts.item_id",
            "bm25(items_fts, 3.0, 1.0)",
        )
    } else {
        values.push(Box::new(viewer.user.clone()));
        conditions.push(format!(
            "(a.st <> 'HB' OR a.user_id = ?{} OR {})",
            values.len(),
            i64::from(viewer.permissions.see_hellbanned)
        ));
        ("items_active a", "0.0")
    };

    if let Some(kind) = query.kind {
        values.push(Box::new(kind.as_str()));
        conditions.push(format!("a.kind = ?{}", values.len()));
    }
    if !query.sections.is_empty() {
        let mut placeholders = Vec::new();
        for section in &query.sections {
            values.push(Box::new(section.clone()));
            placeholders.push(format!("?{}", values.len()));
        }
        conditions.push(format!("a.section_id IN ({})", placeholders.join(", ")));
    }
    if let Some(min) = query.price_min {
        values.push(Box::new(min));
        conditions.push(format!("a.price_base >= ?{}", values.len()));
    }
    if let Some(max) = query.price_max {
        values.push(Box::new(max));
        conditions.push(format!("a.price_base <= ?{}", values.len()));
    }

    let order = if text.is_some() {
        "ORDER BY score ASC, a.ts_us DESC"
    } else {
        "ORDER BY a.ts_us DESC, a.item_id ASC"
    };
    // Geo filtering happens after SQL, so pagination does too in that case.
    let paging = match (query.near, query.limit) {
        (None, Some(limit)) => format!(" LIMIT {limit} OFFSET {}", query.offset),
        (None, None) if query.offset > 0 => format!(" LIMIT -1 OFFSET {}", query.offset),
        _ => String::new(),
    };

    let sql = format!(
        "SELECT {columns}, {rank} AS score FROM {from} WHERE {} {order}{paging}",
        conditions.join(" AND ")
    );
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("prepare search query: {sql}"))?;
    let refs: Vec<&dyn ToSql> = values.iter().map(AsRef::as_ref).collect();
    let rank_idx = ITEM_COLUMNS.split(',').count();
    let rows = stmt
        .query_map(params_from_iter(refs), |row| {
            Ok((row_to_item(row)?, row.get::<_, f64>(rank_idx)?))
        })
        .context("execute search query")?;

    let mut hits = Vec::new();
    for row in rows {
        let (item, rank) = row.context("read search row")?;
        let distance_km = match (query.near, item.location) {
            (Some((center, _)), Some(at)) => Some(center.distance_km(at)),
            _ => None,
        };
        if let Some((_, radius)) = query.near {
            if distance_km.is_none_or(|d| d > radius) {
                continue;
            }
        }
        hits.push(SearchHit {
            item,
            rank,
            distance_km,
        });
    }

    if query.near.is_some() {
        let limit = query.limit.unwrap_or(usize::MAX);
        hits = hits.into_iter().skip(query.offset).take(limit).collect();
    }

    Ok(hits)
}

/// Whether the FTS table exists.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn index_available(conn: &Connection) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'items_fts')",
        params![],
        |row| row.get(0),
    )
    .context("check fts table")
}

/// Number of index rows flagged as hellbanned.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn indexed_hb_count(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM items_fts WHERE hb = 1",
        [],
        |row| row.get(0),
    )
    .context("count hellbanned fts rows")
}
