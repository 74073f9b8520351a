//! Derived listing counters.
//!
//! Section counts split by kind and table; the `_hb` variants include
//! hellbanned listings. User counts cover every non-deleted listing by an
//! author. Deleted listings are never counted.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::model::item::ItemKind;
use crate::model::section::SectionCounts;

/// Recompute `section_counts` for each section. Unknown sections are skipped.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn recompute_sections(conn: &Connection, sections: &[String], now: i64) -> Result<usize> {
    let mut updated = 0;
    for section in sections {
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sections WHERE section_id = ?1)",
                [section],
                |row| row.get(0),
            )
            .with_context(|| format!("check section '{section}'"))?;
        if !exists {
            tracing::debug!(section_id = %section, "skipping counters for removed section");
            continue;
        }

        for kind in [ItemKind::Offer, ItemKind::Wish] {
            let counts = compute_section_counts(conn, section, kind)?;
            conn.execute(
                "INSERT INTO section_counts
                     (section_id, kind, active, archived, active_hb, archived_hb, updated_at_us)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (section_id, kind) DO UPDATE SET
                     active = excluded.active,
                     archived = excluded.archived,
                     active_hb = excluded.active_hb,
                     archived_hb = excluded.archived_hb,
                     updated_at_us = excluded.updated_at_us",
                params![
                    section,
                    kind.as_str(),
                    counts.active,
                    counts.archived,
                    counts.active_hb,
                    counts.archived_hb,
                    now
                ],
            )
            .with_context(|| format!("store counters for '{section}'"))?;
        }
        updated += 1;
    }
    Ok(updated)
}

fn compute_section_counts(conn: &Connection, section: &str, kind: ItemKind) -> Result<SectionCounts> {
    let (active, active_hb): (i64, i64) = conn
        .query_row(
            "SELECT COALESCE(SUM(st = 'OPEN'), 0), COUNT(*)
             FROM items_active WHERE section_id = ?1 AND kind = ?2",
            params![section, kind.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .context("count active items")?;
    let (archived, archived_hb): (i64, i64) = conn
        .query_row(
            "SELECT COALESCE(SUM(st = 'CLOSED'), 0), COALESCE(SUM(st IN ('CLOSED', 'HB')), 0)
             FROM items_archived WHERE section_id = ?1 AND kind = ?2",
            params![section, kind.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .context("count archived items")?;
    Ok(SectionCounts {
        active,
        archived,
        active_hb,
        archived_hb,
    })
}

/// Cached counts for one section and kind; zero when never computed.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn section_counts(conn: &Connection, section: &str, kind: ItemKind) -> Result<SectionCounts> {
    let found = conn
        .query_row(
            "SELECT active, archived, active_hb, archived_hb
             FROM section_counts WHERE section_id = ?1 AND kind = ?2",
            params![section, kind.as_str()],
            |row| {
                Ok(SectionCounts {
                    active: row.get(0)?,
                    archived: row.get(1)?,
                    active_hb: row.get(2)?,
                    archived_hb: row.get(3)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("read counters for '{section}'"))?;
    Ok(found.unwrap_or_default())
}

/// Listings created by one author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserItemCount {
    pub user: String,
    /// Excluding hellbanned listings.
    pub value: i64,
    /// Including hellbanned listings.
    pub value_hb: i64,
}

/// Recompute `user_item_counts` for each author.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn recompute_users(conn: &Connection, users: &[String], now: i64) -> Result<usize> {
    for user in users {
        let (value, value_hb): (i64, i64) = conn
            .query_row(
                "SELECT COALESCE(SUM(st <> 'HB'), 0), COUNT(*) FROM (
                     SELECT st FROM items_active WHERE user_id = ?1
                     UNION ALL
                     SELECT st FROM items_archived WHERE user_id = ?1
                 ) WHERE st NOT IN ('DELETED', 'DELETED_HARD')",
                [user],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .with_context(|| format!("count items for user '{user}'"))?;
        conn.execute(
            "INSERT INTO user_item_counts (user_id, value, value_hb, updated_at_us)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id) DO UPDATE SET
                 value = excluded.value,
                 value_hb = excluded.value_hb,
                 updated_at_us = excluded.updated_at_us",
            params![user, value, value_hb, now],
        )
        .with_context(|| format!("store counters for user '{user}'"))?;
    }
    Ok(users.len())
}

/// Cached counts for `user`; zero when never computed.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn user_counts(conn: &Connection, user: &str) -> Result<UserItemCount> {
    let found = conn
        .query_row(
            "SELECT value, value_hb FROM user_item_counts WHERE user_id = ?1",
            [user],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()
        .with_context(|| format!("read counters for user '{user}'"))?;
    let (value, value_hb) = found.unwrap_or_default();
    Ok(UserItemCount {
        user: user.to_string(),
        value,
        value_hb,
    })
}
