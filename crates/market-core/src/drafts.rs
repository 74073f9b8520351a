//! Per-user drafts of listings not yet submitted.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::model::item::{ItemKind, Location, Price};

/// Partially filled listing form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Draft {
    pub kind: ItemKind,
    pub title: String,
    pub md: String,
    pub price: Option<Price>,
    pub section: Option<String>,
    pub location: Option<Location>,
    /// Uploaded attachment ids not yet bound to a listing.
    pub files: Vec<String>,
    pub barter_info: Option<String>,
    pub delivery: bool,
    pub is_new: bool,
}

impl Default for Draft {
    fn default() -> Self {
        Self {
            kind: ItemKind::Offer,
            title: String::new(),
            md: String::new(),
            price: None,
            section: None,
            location: None,
            files: Vec::new(),
            barter_info: None,
            delivery: false,
            is_new: false,
        }
    }
}

/// A draft with its last save time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDraft {
    pub draft: Draft,
    pub updated_at: i64,
}

/// Save (or replace) `user`'s draft.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_draft(conn: &Connection, user: &str, draft: &Draft, now: i64) -> Result<()> {
    let json = serde_json::to_string(draft).context("serialize draft")?;
    conn.execute(
        "INSERT INTO drafts (user_id, draft_json, updated_at_us) VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id) DO UPDATE SET draft_json = excluded.draft_json,
             updated_at_us = excluded.updated_at_us",
        params![user, json, now],
    )
    .with_context(|| format!("save draft for '{user}'"))?;
    Ok(())
}

/// Load `user`'s draft. Drafts older than `ttl_us` are removed and reported
/// as absent.
///
/// # Errors
///
/// Returns an error if a query fails or the stored draft is unreadable.
pub fn load_draft(conn: &Connection, user: &str, now: i64, ttl_us: i64) -> Result<Option<StoredDraft>> {
    let row = conn
        .query_row(
            "SELECT draft_json, updated_at_us FROM drafts WHERE user_id = ?1",
            [user],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()
        .with_context(|| format!("load draft for '{user}'"))?;

    let Some((json, updated_at)) = row else {
        return Ok(None);
    };
    if now - updated_at >= ttl_us {
        delete_draft(conn, user)?;
        tracing::debug!(user = %user, "expired draft discarded");
        return Ok(None);
    }
    let draft = serde_json::from_str(&json).with_context(|| format!("parse draft for '{user}'"))?;
    Ok(Some(StoredDraft { draft, updated_at }))
}

/// Remove `user`'s draft. Returns whether one existed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_draft(conn: &Connection, user: &str) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM drafts WHERE user_id = ?1", [user])
        .with_context(|| format!("delete draft for '{user}'"))?;
    Ok(n > 0)
}

/// Remove every draft older than `ttl_us`.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn purge_expired(conn: &Connection, now: i64, ttl_us: i64) -> Result<usize> {
    conn.execute(
        "DELETE FROM drafts WHERE updated_at_us <= ?1",
        [now - ttl_us],
    )
    .context("purge expired drafts")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::DAY_US;

    fn draft() -> Draft {
        Draft {
            kind: ItemKind::Wish,
            title: "Looking for a tandem".to_string(),
            section: Some("bikes".to_string()),
            files: vec!["upload-1".to_string()],
            ..Draft::default()
        }
    }

    #[test]
    fn save_load_replace_delete() {
        let conn = open_in_memory().expect("store");
        assert!(load_draft(&conn, "alice", 0, DAY_US).expect("load").is_none());

        save_draft(&conn, "alice", &draft(), 10).expect("save");
        let loaded = load_draft(&conn, "alice", 20, DAY_US).expect("load").expect("present");
        assert_eq!(loaded.draft, draft());
        assert_eq!(loaded.updated_at, 10);

        let mut edited = draft();
        edited.title = "Looking for a tandem, any size".to_string();
        save_draft(&conn, "alice", &edited, 30).expect("save");
        let loaded = load_draft(&conn, "alice", 40, DAY_US).expect("load").expect("present");
        assert_eq!(loaded.draft.title, edited.title);

        assert!(delete_draft(&conn, "alice").expect("delete"));
        assert!(!delete_draft(&conn, "alice").expect("delete"));
    }

    #[test]
    fn expired_drafts_disappear() {
        let conn = open_in_memory().expect("store");
        save_draft(&conn, "alice", &draft(), 0).expect("save");
        save_draft(&conn, "bob", &draft(), 5 * DAY_US).expect("save");

        assert!(load_draft(&conn, "alice", 7 * DAY_US, 7 * DAY_US).expect("load").is_none());
        assert_eq!(purge_expired(&conn, 12 * DAY_US, 7 * DAY_US).expect("purge"), 1);
        assert!(load_draft(&conn, "bob", 12 * DAY_US, 7 * DAY_US).expect("load").is_none());
    }
}
