//! market-core library.
//!
//! Listings (offers and wishes) live in one of two SQLite tables: active for
//! effectively-open items, archived for everything else. The [`lifecycle`]
//! engine moves them between the two, [`history`] keeps a squashed edit log,
//! and [`sections`] caches the category tree.
//!
//! # Conventions
//!
//! - **Errors**: domain operations return [`error::MarketError`]; store
//!   helpers use `anyhow::Result` with context.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).
//! - **Time**: wall-clock timestamps are microseconds since the Unix epoch.

pub mod config;
pub mod counters;
pub mod currency;
pub mod db;
pub mod drafts;
pub mod error;
pub mod history;
pub mod items;
pub mod jobs;
pub mod lifecycle;
pub mod markup;
pub mod model;
pub mod search;
pub mod sections;

/// Current wall-clock time in microseconds since the Unix epoch.
#[must_use]
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Microseconds in one day.
pub const DAY_US: i64 = 24 * 60 * 60 * 1_000_000;
