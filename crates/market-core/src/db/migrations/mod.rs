//! Versioned schema upgrades for the market store.
//!
//! The applied version lives in `PRAGMA user_version` and is mirrored into
//! `store_meta.schema_version` for tooling that only reads tables.

use super::schema;
use rusqlite::{Connection, types::Type};

/// One forward-only schema step.
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Migration] = &[
    Migration {
        version: 1,
        name: "listings, sections, history, jobs",
        sql: schema::MIGRATION_V1_SQL,
    },
    Migration {
        version: 2,
        name: "full-text index",
        sql: schema::MIGRATION_V2_SQL,
    },
];

/// Schema version this build writes.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

/// Version recorded in `PRAGMA user_version`.
///
/// # Errors
///
/// Fails if the pragma cannot be read or holds a negative value.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let raw: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(err)))
}

/// Bring the store up to [`LATEST_SCHEMA_VERSION`]. Each step commits on its
/// own, so an interrupted upgrade resumes from the last finished step.
///
/// # Errors
///
/// Returns the first failing step's error; earlier steps stay applied.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let start = current_schema_version(conn)?;
    let mut applied = start;

    for step in STEPS.iter().filter(|step| step.version > start) {
        let tx = conn.transaction()?;
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", i64::from(step.version))?;
        tx.execute(
            "UPDATE store_meta SET schema_version = ?1 WHERE id = 1",
            [i64::from(step.version)],
        )?;
        tx.commit()?;
        tracing::debug!(version = step.version, name = step.name, "market schema upgraded");
        applied = step.version;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has(conn: &Connection, kind: &str, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = ?1 AND name = ?2",
            [kind, name],
            |row| row.get(0),
        )
        .expect("query sqlite_master")
    }

    #[test]
    fn steps_are_ordered_and_end_at_latest() {
        assert!(STEPS.windows(2).all(|w| w[0].version < w[1].version));
        assert_eq!(STEPS.last().map(|s| s.version), Some(LATEST_SCHEMA_VERSION));
    }

    #[test]
    fn fresh_store_gets_every_table() {
        let mut conn = Connection::open_in_memory().expect("open");
        assert_eq!(migrate(&mut conn).expect("migrate"), LATEST_SCHEMA_VERSION);

        for table in [
            "sections",
            "section_counts",
            "items_active",
            "items_archived",
            "item_history",
            "drafts",
            "currency_rates",
            "user_item_counts",
            "market_jobs",
            "store_meta",
            "items_fts",
        ] {
            assert!(has(&conn, "table", table), "missing table {table}");
        }
        for index in schema::REQUIRED_INDEXES {
            assert!(has(&conn, "index", index), "missing index {index}");
        }
    }

    #[test]
    fn rerunning_is_a_no_op() {
        let mut conn = Connection::open_in_memory().expect("open");
        migrate(&mut conn).expect("first run");
        assert_eq!(migrate(&mut conn).expect("second run"), LATEST_SCHEMA_VERSION);

        let (rows, mirrored): (i64, i64) = conn
            .query_row("SELECT COUNT(*), MAX(schema_version) FROM store_meta", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .expect("store_meta");
        assert_eq!(rows, 1);
        assert_eq!(mirrored, i64::from(LATEST_SCHEMA_VERSION));
    }

    #[test]
    fn v1_store_gains_the_search_index() {
        let mut conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(schema::MIGRATION_V1_SQL).expect("v1");
        conn.pragma_update(None, "user_version", 1_i64).expect("version");
        assert!(!has(&conn, "table", "items_fts"));

        assert_eq!(migrate(&mut conn).expect("migrate"), LATEST_SCHEMA_VERSION);
        assert!(has(&conn, "table", "items_fts"));
    }
}
