//! Listing queries over both item tables with the viewer's visibility filter.
//!
//! Visibility is pushed into SQL so that pagination counts only rows the
//! viewer may see.

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params_from_iter, types::ToSql};
use std::fmt;
use std::str::FromStr;

use super::items::{ITEM_COLUMNS, row_to_item};
use crate::model::actor::Actor;
use crate::model::item::{Collection, Item, ItemKind};

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// Order of listing results. Ties break on id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// By creation time, latest first.
    #[default]
    Newest,
    Oldest,
    /// Cheapest first by reference-currency price; unpriced last.
    PriceAsc,
    PriceDesc,
}

impl SortOrder {
    const fn sql_clause(self) -> &'static str {
        match self {
            Self::Newest => "ORDER BY ts_us DESC, item_id ASC",
            Self::Oldest => "ORDER BY ts_us ASC, item_id ASC",
            Self::PriceAsc => "ORDER BY price_base IS NULL, price_base ASC, item_id ASC",
            Self::PriceDesc => "ORDER BY price_base IS NULL, price_base DESC, item_id ASC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
        })
    }
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" | "recent" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "price_asc" | "price-asc" | "cheapest" => Ok(Self::PriceAsc),
            "price_desc" | "price-desc" => Ok(Self::PriceDesc),
            other => {
                bail!("unknown sort order '{other}': expected one of newest, oldest, price_asc, price_desc")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Filter criteria for item listings, combined with AND semantics.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Restrict to these sections; empty means every section.
    pub sections: Vec<String>,
    pub kind: Option<ItemKind>,
    /// Restrict to one table; `None` reads both.
    pub collection: Option<Collection>,
    /// Restrict to one author.
    pub user: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort: SortOrder,
}

struct WhereClause {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
}

fn build_where(filter: &ItemFilter, viewer: &Actor) -> WhereClause {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    params.push(Box::new(viewer.user.clone()));
    let viewer_idx = params.len();
    let see_hb = viewer.permissions.see_hellbanned;
    let hb_visible = format!("(user_id = ?{viewer_idx} OR {})", i64::from(see_hb));
    conditions.push(format!(
        "(st IN ('OPEN', 'CLOSED') \
          OR (st = 'HB' AND {hb_visible}) \
          OR (st = 'DELETED' AND {see_deleted} \
              AND (COALESCE(json_extract(prev_st_json, '$.st'), '') <> 'HB' OR {hb_visible})) \
          OR (st = 'DELETED_HARD' AND {delete_hard}))",
        see_deleted = i64::from(viewer.permissions.see_deleted),
        delete_hard = i64::from(viewer.permissions.delete_hard),
    ));

    if !filter.sections.is_empty() {
        let mut placeholders = Vec::with_capacity(filter.sections.len());
        for section in &filter.sections {
            params.push(Box::new(section.clone()));
            placeholders.push(format!("?{}", params.len()));
        }
        conditions.push(format!("section_id IN ({})", placeholders.join(", ")));
    }

    if let Some(kind) = filter.kind {
        params.push(Box::new(kind.as_str()));
        conditions.push(format!("kind = ?{}", params.len()));
    }

    if let Some(ref user) = filter.user {
        params.push(Box::new(user.clone()));
        conditions.push(format!("user_id = ?{}", params.len()));
    }

    WhereClause {
        sql: conditions.join(" AND "),
        params,
    }
}

fn union_source(filter: &ItemFilter, columns: &str, where_sql: &str) -> String {
    let tables: &[Collection] = match filter.collection {
        Some(Collection::Active) => &[Collection::Active],
        Some(Collection::Archived) => &[Collection::Archived],
        None => &[Collection::Active, Collection::Archived],
    };
    tables
        .iter()
        .map(|c| format!("SELECT {columns} FROM {} WHERE {where_sql}", c.table_name()))
        .collect::<Vec<_>>()
        .join(" UNION ALL ")
}

/// List items visible to `viewer` that match `filter`.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_items(conn: &Connection, filter: &ItemFilter, viewer: &Actor) -> Result<Vec<Item>> {
    let clause = build_where(filter, viewer);
    let source = union_source(filter, ITEM_COLUMNS, &clause.sql);

    // SQLite treats a negative LIMIT as unbounded.
    let limit = filter.limit.map_or(-1, i64::from);
    let offset = filter.offset.unwrap_or(0);
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM ({source}) {} LIMIT {limit} OFFSET {offset}",
        filter.sort.sql_clause()
    );

    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("prepare listing query: {sql}"))?;
    let bound: Vec<&dyn ToSql> = clause.params.iter().map(AsRef::as_ref).collect();
    stmt.query_map(params_from_iter(bound), row_to_item)
        .context("run listing query")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("read listing row")
}

/// Count items visible to `viewer` that match `filter`, ignoring pagination.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_items(conn: &Connection, filter: &ItemFilter, viewer: &Actor) -> Result<u64> {
    let clause = build_where(filter, viewer);
    let source = union_source(filter, "item_id", &clause.sql);
    let sql = format!("SELECT COUNT(*) FROM ({source})");
    let bound: Vec<&dyn ToSql> = clause.params.iter().map(AsRef::as_ref).collect();
    let count: i64 = conn
        .query_row(&sql, params_from_iter(bound), |row| row.get(0))
        .context("run listing count")?;
    Ok(u64::try_from(count).unwrap_or(0))
}
