//! Canonical SQLite schema for the market store.
//!
//! - `items_active` / `items_archived` share one column layout; the placement
//!   rule decides which table holds a listing
//! - `item_history` keeps "before" snapshots, squashed per actor
//! - `sections` + `section_counts` hold the tree and its derived counters
//! - `market_jobs` is the deferred side-effect queue
//! - `store_meta` tracks the schema version

/// Migration v1: core tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS sections (
    section_id TEXT PRIMARY KEY CHECK (length(trim(section_id)) > 0),
    parent_id TEXT REFERENCES sections(section_id),
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    display_order INTEGER NOT NULL DEFAULT 0,
    is_category INTEGER NOT NULL DEFAULT 0 CHECK (is_category IN (0, 1)),
    allow_offers INTEGER NOT NULL DEFAULT 1 CHECK (allow_offers IN (0, 1)),
    allow_wishes INTEGER NOT NULL DEFAULT 1 CHECK (allow_wishes IN (0, 1)),
    links_json TEXT NOT NULL DEFAULT '[]',
    created_at_us INTEGER NOT NULL,
    CHECK (parent_id IS NULL OR parent_id <> section_id)
);

CREATE TABLE IF NOT EXISTS section_counts (
    section_id TEXT NOT NULL REFERENCES sections(section_id) ON DELETE CASCADE,
    kind TEXT NOT NULL CHECK (kind IN ('offer', 'wish')),
    active INTEGER NOT NULL DEFAULT 0,
    archived INTEGER NOT NULL DEFAULT 0,
    active_hb INTEGER NOT NULL DEFAULT 0,
    archived_hb INTEGER NOT NULL DEFAULT 0,
    updated_at_us INTEGER NOT NULL,
    PRIMARY KEY (section_id, kind)
);

CREATE TABLE IF NOT EXISTS items_active (
    item_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('offer', 'wish')),
    title TEXT NOT NULL,
    md TEXT NOT NULL DEFAULT '',
    html TEXT NOT NULL DEFAULT '',
    price_value REAL,
    price_currency TEXT,
    price_base REAL,
    lat REAL,
    lon REAL,
    st TEXT NOT NULL CHECK (st IN ('OPEN', 'CLOSED', 'HB', 'DELETED', 'DELETED_HARD')),
    ste TEXT CHECK (ste IS NULL OR ste IN ('OPEN', 'CLOSED')),
    prev_st_json TEXT,
    del_reason TEXT,
    del_by TEXT,
    edit_count INTEGER NOT NULL DEFAULT 0,
    last_edit_ts_us INTEGER,
    files_json TEXT NOT NULL DEFAULT '[]',
    user_id TEXT NOT NULL,
    section_id TEXT NOT NULL REFERENCES sections(section_id),
    ts_us INTEGER NOT NULL,
    autoclose_at_us INTEGER NOT NULL,
    ip TEXT,
    barter_info TEXT,
    delivery INTEGER NOT NULL DEFAULT 0 CHECK (delivery IN (0, 1)),
    is_new INTEGER NOT NULL DEFAULT 0 CHECK (is_new IN (0, 1)),
    CHECK (item_id LIKE 'mk-%')
);

CREATE TABLE IF NOT EXISTS items_archived (
    item_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('offer', 'wish')),
    title TEXT NOT NULL,
    md TEXT NOT NULL DEFAULT '',
    html TEXT NOT NULL DEFAULT '',
    price_value REAL,
    price_currency TEXT,
    price_base REAL,
    lat REAL,
    lon REAL,
    st TEXT NOT NULL CHECK (st IN ('OPEN', 'CLOSED', 'HB', 'DELETED', 'DELETED_HARD')),
    ste TEXT CHECK (ste IS NULL OR ste IN ('OPEN', 'CLOSED')),
    prev_st_json TEXT,
    del_reason TEXT,
    del_by TEXT,
    edit_count INTEGER NOT NULL DEFAULT 0,
    last_edit_ts_us INTEGER,
    files_json TEXT NOT NULL DEFAULT '[]',
    user_id TEXT NOT NULL,
    section_id TEXT NOT NULL REFERENCES sections(section_id),
    ts_us INTEGER NOT NULL,
    autoclose_at_us INTEGER NOT NULL,
    ip TEXT,
    barter_info TEXT,
    delivery INTEGER NOT NULL DEFAULT 0 CHECK (delivery IN (0, 1)),
    is_new INTEGER NOT NULL DEFAULT 0 CHECK (is_new IN (0, 1)),
    CHECK (item_id LIKE 'mk-%')
);

CREATE TRIGGER IF NOT EXISTS items_active_exclusive
BEFORE INSERT ON items_active
WHEN EXISTS (SELECT 1 FROM items_archived WHERE item_id = new.item_id)
BEGIN
    SELECT RAISE(ABORT, 'item already present in items_archived');
END;

CREATE TRIGGER IF NOT EXISTS items_archived_exclusive
BEFORE INSERT ON items_archived
WHEN EXISTS (SELECT 1 FROM items_active WHERE item_id = new.item_id)
BEGIN
    SELECT RAISE(ABORT, 'item already present in items_active');
END;

CREATE TABLE IF NOT EXISTS item_history (
    history_id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('offer', 'wish')),
    user_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('USER', 'MODERATOR', 'TASK')),
    ip TEXT,
    ts_us INTEGER NOT NULL,
    snapshot_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS drafts (
    user_id TEXT PRIMARY KEY,
    draft_json TEXT NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS currency_rates (
    currency TEXT PRIMARY KEY CHECK (length(currency) = 3),
    rate REAL NOT NULL CHECK (rate > 0),
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_item_counts (
    user_id TEXT PRIMARY KEY,
    value INTEGER NOT NULL DEFAULT 0,
    value_hb INTEGER NOT NULL DEFAULT 0,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS market_jobs (
    job_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    run_at_us INTEGER NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at_us INTEGER NOT NULL,
    UNIQUE (name, payload_json)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us)
VALUES (1, 1, CAST(strftime('%s', 'now') AS INTEGER) * 1000000);
";

/// Migration v2: read-path indexes and the FTS5 search table.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_items_active_section_ts
    ON items_active(section_id, ts_us DESC);

CREATE INDEX IF NOT EXISTS idx_items_archived_section_ts
    ON items_archived(section_id, ts_us DESC);

CREATE INDEX IF NOT EXISTS idx_items_active_user
    ON items_active(user_id);

CREATE INDEX IF NOT EXISTS idx_items_archived_user
    ON items_archived(user_id);

CREATE INDEX IF NOT EXISTS idx_items_active_autoclose
    ON items_active(autoclose_at_us);

CREATE INDEX IF NOT EXISTS idx_items_active_currency
    ON items_active(price_currency);

CREATE INDEX IF NOT EXISTS idx_items_archived_currency
    ON items_archived(price_currency);

CREATE INDEX IF NOT EXISTS idx_item_history_item
    ON item_history(item_id, history_id DESC);

CREATE INDEX IF NOT EXISTS idx_sections_parent_order
    ON sections(parent_id, display_order);

CREATE INDEX IF NOT EXISTS idx_market_jobs_run_at
    ON market_jobs(run_at_us, job_id);

CREATE VIRTUAL TABLE IF NOT EXISTS items_fts USING fts5(
    title,
    md,
    item_id UNINDEXED,
    hb UNINDEXED,
    tokenize='porter unicode61',
    prefix='2 3'
);

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
";

/// Indexes expected by list/search/job query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_items_active_section_ts",
    "idx_items_archived_section_ts",
    "idx_items_active_user",
    "idx_items_archived_user",
    "idx_items_active_autoclose",
    "idx_items_active_currency",
    "idx_items_archived_currency",
    "idx_item_history_item",
    "idx_sections_parent_order",
    "idx_market_jobs_run_at",
];
