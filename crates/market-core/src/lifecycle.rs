//! Status transitions and the active/archived placement they drive.
//!
//! The transition functions are pure: they mutate an [`Item`] in memory and
//! report whether the item was eligible. [`apply_many`] runs one transition
//! over a batch inside a single transaction, relocating rows by the
//! placement rule, appending history and scheduling the derived-data jobs.
//!
//! | transition | from (effective)        | to                           |
//! |------------|-------------------------|------------------------------|
//! | close      | OPEN                    | CLOSED (`ste` for HB items)  |
//! | open       | CLOSED, within expiry   | OPEN (`ste` for HB items)    |
//! | delete     | not deleted / soft→hard | DELETED / DELETED_HARD       |
//! | undelete   | DELETED / DELETED_HARD  | `prev_st`, CLOSED if expired |

use anyhow::Context;
use rusqlite::Connection;
use serde::Serialize;
use std::fmt;

use crate::config::MarketConfig;
use crate::db;
use crate::db::items::{load_items, store_item};
use crate::error::{MarketError, MarketResult};
use crate::history::{self, AppendOutcome, ItemChange};
use crate::jobs::{self, Fanout};
use crate::model::actor::Actor;
use crate::model::item::{Item, Status, StatusPair};

/// Message of the client error raised when a batch changes nothing.
pub const NO_ITEMS_CHANGED: &str = "no items changed";

/// Message raised when every candidate was refused for being too old.
pub const TOO_OLD_TO_REOPEN: &str = "listing is too old to be reopened";

/// Why a transition did not apply to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The item's current status does not admit the transition.
    Ineligible,
    /// The item is past its expiry window and cannot be reopened.
    Expired,
}

// ---------------------------------------------------------------------------
// Pure transitions
// ---------------------------------------------------------------------------

/// Close an effectively-open item.
///
/// # Errors
///
/// [`Rejection::Ineligible`] unless the item is effectively OPEN.
pub fn close(item: &mut Item) -> Result<(), Rejection> {
    if item.st.is_deleted() || item.effective_status() != Status::Open {
        return Err(Rejection::Ineligible);
    }
    if item.is_hellbanned() {
        item.ste = Some(Status::Closed);
    } else {
        item.st = Status::Closed;
    }
    Ok(())
}

/// Reopen a closed item and restore its original autoclose deadline.
///
/// # Errors
///
/// - [`Rejection::Ineligible`] unless the item is effectively CLOSED.
/// - [`Rejection::Expired`] once `now - ts >= expire_us`.
pub fn open(item: &mut Item, now: i64, expire_us: i64) -> Result<(), Rejection> {
    if item.st.is_deleted() || item.effective_status() != Status::Closed {
        return Err(Rejection::Ineligible);
    }
    if now - item.ts >= expire_us {
        return Err(Rejection::Expired);
    }
    if item.is_hellbanned() {
        item.ste = Some(Status::Open);
    } else {
        item.st = Status::Open;
    }
    item.autoclose_at = item.ts + expire_us;
    Ok(())
}

/// Soft- or hard-delete an item, remembering its status in `prev_st`.
///
/// Hard-deleting a soft-deleted item keeps the original snapshot, and its
/// reason unless a new one is given.
///
/// # Errors
///
/// [`Rejection::Ineligible`] for hard-deleted items and for soft-deleting
/// an item that is already deleted.
pub fn delete(item: &mut Item, hard: bool, by: &str, reason: Option<&str>) -> Result<(), Rejection> {
    let hardening = item.st == Status::Deleted;
    match item.st {
        Status::DeletedHard => return Err(Rejection::Ineligible),
        Status::Deleted if !hard => return Err(Rejection::Ineligible),
        Status::Deleted => {}
        Status::Open | Status::Closed | Status::Hb => {
            item.prev_st = Some(item.status_pair());
            item.ste = None;
        }
    }
    item.st = if hard {
        Status::DeletedHard
    } else {
        Status::Deleted
    };
    item.del_by = Some(by.to_string());
    if let Some(reason) = reason {
        item.del_reason = Some(reason.to_string());
    } else if !hardening {
        item.del_reason = None;
    }
    Ok(())
}

/// Restore a deleted item from `prev_st`.
///
/// An item that would come back open after its expiry window settles to
/// CLOSED instead.
///
/// # Errors
///
/// [`Rejection::Ineligible`] unless the item is deleted with a snapshot.
pub fn undelete(item: &mut Item, now: i64, expire_us: i64) -> Result<(), Rejection> {
    if !item.st.is_deleted() {
        return Err(Rejection::Ineligible);
    }
    let Some(StatusPair { st, ste }) = item.prev_st else {
        return Err(Rejection::Ineligible);
    };
    item.st = st;
    item.ste = ste;
    item.prev_st = None;
    item.del_reason = None;
    item.del_by = None;

    if item.effective_status() == Status::Open && now - item.ts >= expire_us {
        if item.is_hellbanned() {
            item.ste = Some(Status::Closed);
        } else {
            item.st = Status::Closed;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// A status change applied by [`apply_many`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Close,
    Open,
    Delete { hard: bool, reason: Option<String> },
    Undelete,
}

impl Transition {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Open => "open",
            Self::Delete { hard: false, .. } => "delete",
            Self::Delete { hard: true, .. } => "delete_hard",
            Self::Undelete => "undelete",
        }
    }

    /// Whether `actor` may apply this transition to `item`.
    ///
    /// Undeleting needs the same flag as the deletion it reverses.
    #[must_use]
    pub fn permitted(&self, actor: &Actor, item: &Item) -> bool {
        match self {
            Self::Close | Self::Open => actor.can_close(item),
            Self::Delete { hard, .. } => actor.can_delete(*hard),
            Self::Undelete => match item.st {
                Status::Deleted => actor.can_delete(false),
                Status::DeletedHard => actor.can_delete(true),
                _ => false,
            },
        }
    }

    fn apply(&self, item: &mut Item, actor: &Actor, now: i64, expire_us: i64) -> Result<(), Rejection> {
        match self {
            Self::Close => close(item),
            Self::Open => open(item, now, expire_us),
            Self::Delete { hard, reason } => delete(item, *hard, &actor.user, reason.as_deref()),
            Self::Undelete => undelete(item, now, expire_us),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a successful batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Ids written, in request order.
    pub changed: Vec<String>,
    /// How many of them switched tables.
    pub relocated: usize,
    /// Requested ids left untouched (unknown, not permitted or ineligible).
    pub skipped: usize,
    pub history: AppendOutcome,
    pub fanout: Fanout,
}

/// Apply `transition` to every eligible item among `ids`.
///
/// Items the actor cannot see or may not change, and items the transition
/// does not apply to, are skipped without error.
///
/// # Errors
///
/// - [`MarketError::Client`] with [`NO_ITEMS_CHANGED`] when nothing is
///   eligible, or [`TOO_OLD_TO_REOPEN`] when every eligible candidate had
///   expired.
/// - Database failures; the transaction is rolled back.
pub fn apply_many(
    conn: &mut Connection,
    config: &MarketConfig,
    actor: &Actor,
    ids: &[String],
    transition: &Transition,
    now: i64,
) -> MarketResult<BatchOutcome> {
    let expire_us = config.items.expire_us();
    let tx = db::write_tx(conn)?;

    let mut pending = Vec::new();
    let mut expired = 0usize;
    for (item, from) in load_items(&tx, ids)? {
        if !actor.can_see(&item) || !transition.permitted(actor, &item) {
            continue;
        }
        let mut next = item.clone();
        match transition.apply(&mut next, actor, now, expire_us) {
            Ok(()) => pending.push((ItemChange::new(item, next), from)),
            Err(Rejection::Expired) => expired += 1,
            Err(Rejection::Ineligible) => {}
        }
    }

    if pending.is_empty() {
        let message = if expired > 0 {
            TOO_OLD_TO_REOPEN
        } else {
            NO_ITEMS_CHANGED
        };
        tracing::debug!(transition = %transition, requested = ids.len(), "batch left nothing to change");
        return Err(MarketError::Client(message.to_string()));
    }

    let mut outcome = BatchOutcome::default();
    let mut changes = Vec::with_capacity(pending.len());
    for (change, from) in pending {
        let to = store_item(&tx, &change.new, from)?;
        if to != from {
            outcome.relocated += 1;
        }
        outcome.changed.push(change.new.id.clone());
        outcome.fanout.touch(&change.new);
        changes.push(change);
    }
    outcome.skipped = ids.len().saturating_sub(outcome.changed.len());
    outcome.history = history::append(&tx, &changes, actor, now, config.history.grace_us())?;
    jobs::enqueue_fanout(&tx, &outcome.fanout, now)?;
    tx.commit()?;

    tracing::info!(
        transition = %transition,
        user = %actor.user,
        role = %actor.role,
        changed = outcome.changed.len(),
        relocated = outcome.relocated,
        skipped = outcome.skipped,
        "batch applied"
    );
    Ok(outcome)
}

/// Close the listed items.
///
/// # Errors
///
/// See [`apply_many`].
pub fn close_many(
    conn: &mut Connection,
    config: &MarketConfig,
    actor: &Actor,
    ids: &[String],
    now: i64,
) -> MarketResult<BatchOutcome> {
    apply_many(conn, config, actor, ids, &Transition::Close, now)
}

/// Reopen the listed items.
///
/// # Errors
///
/// See [`apply_many`].
pub fn open_many(
    conn: &mut Connection,
    config: &MarketConfig,
    actor: &Actor,
    ids: &[String],
    now: i64,
) -> MarketResult<BatchOutcome> {
    apply_many(conn, config, actor, ids, &Transition::Open, now)
}

/// Delete the listed items, softly or for good.
///
/// # Errors
///
/// See [`apply_many`].
pub fn delete_many(
    conn: &mut Connection,
    config: &MarketConfig,
    actor: &Actor,
    ids: &[String],
    hard: bool,
    reason: Option<String>,
    now: i64,
) -> MarketResult<BatchOutcome> {
    apply_many(conn, config, actor, ids, &Transition::Delete { hard, reason }, now)
}

/// Restore the listed deleted items.
///
/// # Errors
///
/// See [`apply_many`].
pub fn undelete_many(
    conn: &mut Connection,
    config: &MarketConfig,
    actor: &Actor,
    ids: &[String],
    now: i64,
) -> MarketResult<BatchOutcome> {
    apply_many(conn, config, actor, ids, &Transition::Undelete, now)
}

/// Close every active item whose `autoclose_at` has passed, as the system
/// actor, one transaction per `jobs.chunk_size` ids.
///
/// # Errors
///
/// Returns an error if a query or write fails.
pub fn autoclose_expired(conn: &mut Connection, config: &MarketConfig, now: i64) -> anyhow::Result<usize> {
    let ids = due_for_autoclose(conn, now)?;
    if ids.is_empty() {
        return Ok(0);
    }

    let system = Actor::system();
    let mut closed = 0;
    for chunk in ids.chunks(config.jobs.chunk_size.max(1)) {
        match close_many(conn, config, &system, chunk, now) {
            Ok(outcome) => closed += outcome.changed.len(),
            // Rows can be closed by someone else between the scan and the batch.
            Err(MarketError::Client(_)) => {}
            Err(err) => return Err(err).context("autoclose batch"),
        }
    }
    tracing::info!(closed, due = ids.len(), "autoclose pass complete");
    Ok(closed)
}

fn due_for_autoclose(conn: &Connection, now: i64) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT item_id FROM items_active WHERE autoclose_at_us <= ?1 ORDER BY autoclose_at_us, item_id",
        )
        .context("prepare autoclose scan")?;
    let rows = stmt
        .query_map([now], |row| row.get::<_, String>(0))
        .context("execute autoclose scan")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("read autoclose row")?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::items::{find_item, insert_item, testing::sample_item};
    use crate::db::open_in_memory;
    use crate::jobs::list_jobs;
    use crate::model::actor::{Permissions, Role};
    use crate::model::item::Collection;
    use crate::DAY_US;

    const EXPIRE: i64 = 30 * DAY_US;

    fn item(st: Status, ste: Option<Status>) -> Item {
        let conn = open_in_memory().expect("store");
        let mut item = sample_item(&conn, "mk-l000000001", "bikes");
        item.st = st;
        item.ste = ste;
        item
    }

    fn moderator() -> Actor {
        Actor::new("mod", Role::Moderator, Permissions::all())
    }

    #[test]
    fn close_then_open_roundtrips_for_plain_and_hb() {
        for (st, ste) in [(Status::Open, None), (Status::Hb, Some(Status::Open))] {
            let mut it = item(st, ste);
            close(&mut it).expect("close");
            assert_eq!(it.effective_status(), Status::Closed);
            assert_eq!(it.is_hellbanned(), st == Status::Hb);
            open(&mut it, 2_000, EXPIRE).expect("open");
            assert_eq!((it.st, it.ste), (st, ste));
            assert_eq!(it.autoclose_at, it.ts + EXPIRE);
        }
    }

    #[test]
    fn open_refuses_expired_and_open_items() {
        let mut it = item(Status::Closed, None);
        let ts = it.ts;
        assert_eq!(open(&mut it, ts + EXPIRE, EXPIRE), Err(Rejection::Expired));
        assert_eq!(it.st, Status::Closed);

        let mut already = item(Status::Open, None);
        assert_eq!(open(&mut already, 2_000, EXPIRE), Err(Rejection::Ineligible));
        assert_eq!(close(&mut item(Status::Closed, None)), Err(Rejection::Ineligible));
    }

    #[test]
    fn delete_snapshots_and_undelete_restores() {
        let mut it = item(Status::Hb, Some(Status::Closed));
        delete(&mut it, false, "mod", Some("spam")).expect("delete");
        assert_eq!(it.st, Status::Deleted);
        assert_eq!(it.ste, None);
        assert_eq!(it.prev_st, Some(StatusPair::new(Status::Hb, Some(Status::Closed))));
        assert_eq!(it.del_reason.as_deref(), Some("spam"));

        assert_eq!(delete(&mut it, false, "mod", None), Err(Rejection::Ineligible));
        delete(&mut it, true, "mod", None).expect("harden");
        assert_eq!(it.st, Status::DeletedHard);
        assert_eq!(it.del_reason.as_deref(), Some("spam"));
        assert_eq!(it.prev_st, Some(StatusPair::new(Status::Hb, Some(Status::Closed))));
        assert_eq!(delete(&mut it, true, "mod", None), Err(Rejection::Ineligible));

        undelete(&mut it, 2_000, EXPIRE).expect("undelete");
        assert_eq!((it.st, it.ste), (Status::Hb, Some(Status::Closed)));
        assert!(it.prev_st.is_none() && it.del_by.is_none() && it.del_reason.is_none());
    }

    #[test]
    fn undelete_past_expiry_settles_closed() {
        let mut it = item(Status::Open, None);
        delete(&mut it, false, "mod", None).expect("delete");
        let ts = it.ts;
        undelete(&mut it, ts + EXPIRE, EXPIRE).expect("undelete");
        assert_eq!(it.st, Status::Closed);

        let mut hb = item(Status::Hb, Some(Status::Open));
        delete(&mut hb, false, "mod", None).expect("delete");
        let ts = hb.ts;
        undelete(&mut hb, ts + EXPIRE, EXPIRE).expect("undelete");
        assert_eq!((hb.st, hb.ste), (Status::Hb, Some(Status::Closed)));

        assert_eq!(undelete(&mut item(Status::Open, None), 0, EXPIRE), Err(Rejection::Ineligible));
    }

    #[test]
    fn close_many_relocates_and_schedules_jobs() {
        let mut conn = open_in_memory().expect("store");
        let a = sample_item(&conn, "mk-l000000001", "bikes");
        let mut b = sample_item(&conn, "mk-l000000002", "cars");
        b.st = Status::Closed;
        insert_item(&conn, Collection::Active, &a).expect("insert");
        insert_item(&conn, Collection::Archived, &b).expect("insert");

        let ids = vec![a.id.clone(), b.id.clone(), "mk-missing000".to_string()];
        let outcome =
            close_many(&mut conn, &MarketConfig::default(), &moderator(), &ids, 5_000).expect("close");
        assert_eq!(outcome.changed, vec![a.id.clone()]);
        assert_eq!(outcome.relocated, 1);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.history.inserted, 1);

        let (stored, collection) = find_item(&conn, &a.id).expect("query").expect("present");
        assert_eq!(collection, Collection::Archived);
        assert_eq!(stored.st, Status::Closed);
        assert_eq!(stored.edit_count, 1);
        assert_eq!(list_jobs(&conn).expect("jobs").len(), 3);
    }

    #[test]
    fn batches_skip_items_outside_the_actor_scope() {
        let mut conn = open_in_memory().expect("store");
        let a = sample_item(&conn, "mk-l000000001", "bikes");
        insert_item(&conn, Collection::Active, &a).expect("insert");
        let config = MarketConfig::default();

        let stranger = Actor::new("bob", Role::User, Permissions::default());
        let err = close_many(&mut conn, &config, &stranger, &[a.id.clone()], 5_000)
            .expect_err("not permitted");
        assert!(matches!(err, MarketError::Client(ref m) if m == NO_ITEMS_CHANGED));

        let owner = Actor::new("alice", Role::User, Permissions::default());
        let err = delete_many(&mut conn, &config, &owner, &[a.id.clone()], false, None, 5_000)
            .expect_err("no delete flag");
        assert!(matches!(err, MarketError::Client(_)));

        let mut soft_only = Permissions::all();
        soft_only.delete_hard = false;
        let soft = Actor::new("mod", Role::Moderator, soft_only);
        delete_many(&mut conn, &config, &soft, &[a.id.clone()], true, None, 5_000)
            .expect_err("no hard-delete flag");
        delete_many(&mut conn, &config, &soft, &[a.id.clone()], false, None, 5_000).expect("soft");
        let (stored, _) = find_item(&conn, &a.id).expect("query").expect("present");
        assert_eq!(stored.del_by.as_deref(), Some("mod"));
    }

    #[test]
    fn open_many_reports_expiry() {
        let mut conn = open_in_memory().expect("store");
        let mut a = sample_item(&conn, "mk-l000000001", "bikes");
        a.st = Status::Closed;
        insert_item(&conn, Collection::Archived, &a).expect("insert");

        let err = open_many(
            &mut conn,
            &MarketConfig::default(),
            &moderator(),
            &[a.id.clone()],
            a.ts + EXPIRE,
        )
        .expect_err("expired");
        assert!(matches!(err, MarketError::Client(ref m) if m == TOO_OLD_TO_REOPEN));
    }

    #[test]
    fn autoclose_closes_only_due_items() {
        let mut conn = open_in_memory().expect("store");
        let mut due = sample_item(&conn, "mk-l000000001", "bikes");
        due.autoclose_at = 10_000;
        let mut later = sample_item(&conn, "mk-l000000002", "bikes");
        later.autoclose_at = 90_000;
        insert_item(&conn, Collection::Active, &due).expect("insert");
        insert_item(&conn, Collection::Active, &later).expect("insert");

        let closed =
            autoclose_expired(&mut conn, &MarketConfig::default(), 20_000).expect("autoclose");
        assert_eq!(closed, 1);
        let (_, collection) = find_item(&conn, &due.id).expect("query").expect("present");
        assert_eq!(collection, Collection::Archived);
        let (_, collection) = find_item(&conn, &later.id).expect("query").expect("present");
        assert_eq!(collection, Collection::Active);

        assert_eq!(
            autoclose_expired(&mut conn, &MarketConfig::default(), 20_000).expect("again"),
            0
        );
    }
}
