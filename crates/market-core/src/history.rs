//! Per-item edit history with grace-period squashing.
//!
//! Each row stores the tracked fields of an item *before* a remembered edit.
//! Rapid edits by the same actor collapse into the earliest "before" state,
//! and an edit that restores that state removes the row altogether.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::db::items::{find_item, set_edit_stats};
use crate::model::actor::{Actor, Role};
use crate::model::item::{Item, ItemKind, Location, Price, Status};

/// Grace period used when no config is available.
pub const DEFAULT_GRACE_US: i64 = 5 * 60 * 1_000_000;

/// The tracked subset of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub title: String,
    pub md: String,
    pub price: Option<Price>,
    pub section: String,
    pub location: Option<Location>,
    pub files: Vec<String>,
    pub barter_info: Option<String>,
    pub delivery: bool,
    pub is_new: bool,
    pub st: Status,
    pub ste: Option<Status>,
    pub del_reason: Option<String>,
}

impl Snapshot {
    #[must_use]
    pub fn of(item: &Item) -> Self {
        Self {
            title: item.title.clone(),
            md: item.md.clone(),
            price: item.price.clone(),
            section: item.section.clone(),
            location: item.location,
            files: item.files.clone(),
            barter_info: item.barter_info.clone(),
            delivery: item.delivery,
            is_new: item.is_new,
            st: item.st,
            ste: item.ste,
            del_reason: item.del_reason.clone(),
        }
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("serialize history snapshot")
    }
}

/// One stored history row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub item_id: String,
    pub kind: ItemKind,
    pub user: String,
    pub role: Role,
    pub ip: Option<String>,
    pub ts: i64,
    #[serde(skip)]
    snapshot_json: String,
    pub snapshot: Snapshot,
}

/// An edit to record: the item before and after.
#[derive(Debug, Clone)]
pub struct ItemChange {
    pub old: Item,
    pub new: Item,
}

impl ItemChange {
    #[must_use]
    pub const fn new(old: Item, new: Item) -> Self {
        Self { old, new }
    }
}

/// What [`append`] did with a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    /// Pairs whose tracked fields did not change.
    pub unchanged: usize,
    pub inserted: usize,
    /// Folded into an existing entry from the same actor.
    pub merged: usize,
    /// Prior entry removed because the edit restored its state.
    pub reverted: usize,
    /// Early self-edits after creation that leave no trace.
    pub suppressed: usize,
}

/// A history entry together with the state that replaced it.
#[derive(Debug, Clone, Serialize)]
pub struct Revision {
    #[serde(flatten)]
    pub entry: HistoryEntry,
    pub after: Snapshot,
}

const ENTRY_COLUMNS: &str = "history_id, item_id, kind, user_id, role, ip, ts_us, snapshot_json";

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let to_err = |idx: usize, err: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err)
    };
    let kind: String = row.get(2)?;
    let role: String = row.get(4)?;
    let snapshot_json: String = row.get(7)?;
    let snapshot =
        serde_json::from_str::<Snapshot>(&snapshot_json).map_err(|e| to_err(7, Box::new(e)))?;
    Ok(HistoryEntry {
        id: row.get(0)?,
        item_id: row.get(1)?,
        kind: ItemKind::from_str(&kind).map_err(|e| to_err(2, Box::new(e)))?,
        user: row.get(3)?,
        role: Role::from_str(&role).map_err(|e| to_err(4, Box::new(e)))?,
        ip: row.get(5)?,
        ts: row.get(6)?,
        snapshot_json,
        snapshot,
    })
}

/// Most recent history entry for `item_id`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn latest_entry(conn: &Connection, item_id: &str) -> Result<Option<HistoryEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM item_history WHERE item_id = ?1 \
         ORDER BY history_id DESC LIMIT 1"
    );
    conn.prepare_cached(&sql)
        .context("prepare latest history entry")?
        .query_row([item_id], row_to_entry)
        .optional()
        .with_context(|| format!("latest history entry for {item_id}"))
}

/// Record a batch of edits made by `actor` at `now`.
///
/// Runs on the caller's connection; callers wrap it in the same transaction
/// as the item writes. Edit counters are refreshed for every item whose
/// tracked fields changed, so it must run after the items are stored.
///
/// # Errors
///
/// Returns an error if any query fails.
pub fn append(
    conn: &Connection,
    changes: &[ItemChange],
    actor: &Actor,
    now: i64,
    grace_us: i64,
) -> Result<AppendOutcome> {
    let mut outcome = AppendOutcome::default();

    for change in changes {
        let item_id = change.new.id.as_str();
        let old_json = Snapshot::of(&change.old).to_json()?;
        let new_json = Snapshot::of(&change.new).to_json()?;

        if old_json == new_json {
            outcome.unchanged += 1;
            continue;
        }

        let prior = latest_entry(conn, item_id)?;

        match prior {
            Some(prior)
                if prior.user == actor.user
                    && prior.role == actor.role
                    && now - prior.ts < grace_us =>
            {
                if prior.snapshot_json == new_json {
                    conn.execute("DELETE FROM item_history WHERE history_id = ?1", [prior.id])
                        .with_context(|| format!("drop reverted history entry {}", prior.id))?;
                    outcome.reverted += 1;
                } else {
                    outcome.merged += 1;
                }
            }
            None if actor.role == Role::User
                && actor.user == change.new.user
                && now - change.new.ts < grace_us =>
            {
                outcome.suppressed += 1;
            }
            _ => {
                conn.execute(
                    "INSERT INTO item_history (item_id, kind, user_id, role, ip, ts_us, snapshot_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        item_id,
                        change.new.kind.as_str(),
                        actor.user,
                        actor.role.as_str(),
                        actor.ip,
                        now,
                        old_json,
                    ],
                )
                .with_context(|| format!("insert history entry for {item_id}"))?;
                outcome.inserted += 1;
            }
        }

        let edit_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM item_history WHERE item_id = ?1",
                [item_id],
                |row| row.get(0),
            )
            .with_context(|| format!("count history for {item_id}"))?;
        set_edit_stats(conn, item_id, edit_count, now)?;
    }

    tracing::debug!(
        user = %actor.user,
        role = %actor.role,
        inserted = outcome.inserted,
        merged = outcome.merged,
        reverted = outcome.reverted,
        suppressed = outcome.suppressed,
        unchanged = outcome.unchanged,
        "history appended"
    );

    Ok(outcome)
}

/// History of `item_id`, oldest first, each entry paired with the state that
/// followed it.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn list_history(conn: &Connection, item_id: &str) -> Result<Vec<Revision>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM item_history WHERE item_id = ?1 ORDER BY history_id ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare list_history")?;
    let rows = stmt
        .query_map([item_id], row_to_entry)
        .with_context(|| format!("list history for {item_id}"))?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.context("read history row")?);
    }

    let current = find_item(conn, item_id)?.map(|(item, _)| Snapshot::of(&item));

    let mut revisions = Vec::with_capacity(entries.len());
    let mut iter = entries.into_iter().peekable();
    while let Some(entry) = iter.next() {
        let after = match iter.peek() {
            Some(next) => next.snapshot.clone(),
            None => match current.clone() {
                Some(snapshot) => snapshot,
                None => entry.snapshot.clone(),
            },
        };
        revisions.push(Revision { entry, after });
    }
    Ok(revisions)
}
