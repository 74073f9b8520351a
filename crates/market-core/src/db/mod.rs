//! SQLite store: file layout, connection settings and schema upgrades.
//!
//! File-backed stores run in WAL mode with a busy timeout so that several
//! `mkt` processes can share one database. Foreign keys are always on so a
//! listing cannot point at a missing section.

pub mod items;
pub mod migrations;
pub mod query;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::{path::Path, time::Duration};

/// Directory holding the store and config, relative to the market root.
pub const STORE_DIR: &str = ".market";

/// Database file name inside [`STORE_DIR`].
pub const DB_FILE: &str = "market.db";

/// How long a writer waits for another process's lock.
pub const LOCK_WAIT: Duration = Duration::from_secs(5);

const FILE_PRAGMAS: &str = "PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;";

/// Open (or create) the store at `path` and bring its schema up to date.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the database
/// cannot be opened, configured or migrated.
pub fn open_store(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create store directory {}", dir.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open store database {}", path.display()))?;
    conn.execute_batch(FILE_PRAGMAS)
        .context("apply store pragmas")?;
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .context("switch to WAL")?;
    conn.busy_timeout(LOCK_WAIT).context("set busy timeout")?;

    let version = migrations::migrate(&mut conn).context("apply store migrations")?;
    tracing::debug!(path = %path.display(), version, journal = %mode, "market store opened");
    Ok(conn)
}

/// Start a write transaction that takes the store's write lock up front.
///
/// A deferred transaction that reads before it writes fails with
/// `SQLITE_BUSY` when another process committed in between, without waiting
/// on the busy timeout.
///
/// # Errors
///
/// Returns the lock error once [`LOCK_WAIT`] has elapsed.
pub fn write_tx(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

/// In-memory store with the full schema, for tests and dry runs.
///
/// # Errors
///
/// Returns an error if migrations fail.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory store")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .context("enable foreign keys")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pragma<T: rusqlite::types::FromSql>(conn: &Connection, name: &str) -> T {
        conn.pragma_query_value(None, name, |row| row.get(0))
            .unwrap_or_else(|err| panic!("read pragma {name}: {err}"))
    }

    #[test]
    fn file_store_is_shared_safely() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_store(&dir.path().join(STORE_DIR).join(DB_FILE)).expect("open");

        assert!(pragma::<String>(&conn, "journal_mode").eq_ignore_ascii_case("wal"));
        assert_eq!(pragma::<i64>(&conn, "foreign_keys"), 1);
        assert_eq!(
            u128::try_from(pragma::<i64>(&conn, "busy_timeout")).expect("positive"),
            LOCK_WAIT.as_millis()
        );
        assert_eq!(
            migrations::current_schema_version(&conn).expect("version"),
            migrations::LATEST_SCHEMA_VERSION
        );
    }

    #[test]
    fn reopening_keeps_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DB_FILE);
        {
            let conn = open_store(&path).expect("create");
            conn.execute(
                "INSERT INTO sections (section_id, title, created_at_us) VALUES ('bikes', 'Bikes', 0)",
                [],
            )
            .expect("insert section");
        }
        let conn = open_store(&path).expect("reopen");
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM sections", [], |row| row.get(0))
            .expect("count");
        assert_eq!(rows, 1);
    }

    #[test]
    fn write_tx_waits_for_a_concurrent_writer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DB_FILE);
        let mut first = open_store(&path).expect("first");
        let mut second = open_store(&path).expect("second");
        second.busy_timeout(Duration::from_millis(50)).expect("short wait");

        let tx = write_tx(&mut first).expect("first writer");
        let count: i64 = tx
            .query_row("SELECT COUNT(*) FROM sections", [], |row| row.get(0))
            .expect("read");
        assert_eq!(count, 0);

        assert!(matches!(
            write_tx(&mut second),
            Err(err) if err.sqlite_error_code() == Some(rusqlite::ErrorCode::DatabaseBusy)
        ));

        tx.execute(
            "INSERT INTO sections (section_id, title, created_at_us) VALUES ('cars', 'Cars', 0)",
            [],
        )
        .expect("write after read");
        tx.commit().expect("commit");

        let tx = write_tx(&mut second).expect("lock released");
        tx.execute(
            "INSERT INTO sections (section_id, title, created_at_us) VALUES ('bikes', 'Bikes', 0)",
            [],
        )
        .expect("second write");
        tx.commit().expect("commit");
    }

    #[test]
    fn listings_need_an_existing_section() {
        let conn = open_in_memory().expect("store");
        let item = items::testing::sample_item(&conn, "mk-fk00000001", "bikes");
        conn.execute("DELETE FROM sections", []).expect("clear sections");
        assert!(items::insert_item(&conn, crate::model::item::Collection::Active, &item).is_err());
    }
}
