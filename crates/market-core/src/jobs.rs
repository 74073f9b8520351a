//! Deferred side effects stored in `market_jobs`.
//!
//! Mutating operations enqueue tasks inside their own transaction. The CLI
//! drains the queue after each command unless `--defer-jobs` is given, and
//! `mkt jobs run` drains it explicitly. Tasks are idempotent, so at-least-once
//! delivery is fine. Identical pending tasks coalesce on `(name, payload)`.
//!
//! A failing task is logged, its attempt counter bumped and its `run_at`
//! postponed; after `jobs.max_attempts` failures it is dropped.

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::MarketConfig;
use crate::{counters, currency, db, lifecycle, search};

/// A queued unit of background work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    /// Refresh FTS rows for these items.
    SearchIndexUpdate { ids: Vec<String> },
    /// Recompute cached counts for these sections.
    SectionCounters { sections: Vec<String> },
    /// Recompute per-author listing counts.
    UserCounters { users: Vec<String> },
    /// Recompute `price_base` for listings priced in these currencies.
    CurrencyPropagate { currencies: Vec<String> },
    /// Close active listings whose `autoclose_at` has passed.
    Autoclose,
}

impl Task {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SearchIndexUpdate { .. } => "search_index_update",
            Self::SectionCounters { .. } => "section_counters",
            Self::UserCounters { .. } => "user_counters",
            Self::CurrencyPropagate { .. } => "currency_propagate",
            Self::Autoclose => "autoclose",
        }
    }

    /// Sorted, deduplicated payload so equal work coalesces.
    fn normalized(&self) -> Self {
        fn norm(values: &[String]) -> Vec<String> {
            values
                .iter()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        }
        match self {
            Self::SearchIndexUpdate { ids } => Self::SearchIndexUpdate { ids: norm(ids) },
            Self::SectionCounters { sections } => Self::SectionCounters {
                sections: norm(sections),
            },
            Self::UserCounters { users } => Self::UserCounters { users: norm(users) },
            Self::CurrencyPropagate { currencies } => Self::CurrencyPropagate {
                currencies: norm(currencies),
            },
            Self::Autoclose => Self::Autoclose,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::SearchIndexUpdate { ids } => ids.is_empty(),
            Self::SectionCounters { sections } => sections.is_empty(),
            Self::UserCounters { users } => users.is_empty(),
            Self::CurrencyPropagate { currencies } => currencies.is_empty(),
            Self::Autoclose => false,
        }
    }
}

/// Side effects of a mutating operation, fanned out into tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Fanout {
    pub items: BTreeSet<String>,
    pub sections: BTreeSet<String>,
    pub users: BTreeSet<String>,
}

impl Fanout {
    pub fn touch(&mut self, item: &crate::model::item::Item) {
        self.items.insert(item.id.clone());
        self.sections.insert(item.section.clone());
        self.users.insert(item.user.clone());
    }

    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        vec![
            Task::SearchIndexUpdate {
                ids: self.items.iter().cloned().collect(),
            },
            Task::SectionCounters {
                sections: self.sections.iter().cloned().collect(),
            },
            Task::UserCounters {
                users: self.users.iter().cloned().collect(),
            },
        ]
    }
}

/// Queue `task` to run at `run_at`. Returns `false` when an identical task
/// was already pending or the task has nothing to do.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn enqueue(conn: &Connection, task: &Task, run_at: i64) -> Result<bool> {
    let task = task.normalized();
    if task.is_empty() {
        return Ok(false);
    }
    let payload = serde_json::to_string(&task).context("serialize job payload")?;
    let inserted = conn
        .prepare_cached(
            "INSERT INTO market_jobs (name, payload_json, run_at_us, created_at_us)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (name, payload_json) DO NOTHING",
        )
        .context("prepare job insert")?
        .execute(params![task.name(), payload, run_at])
        .with_context(|| format!("enqueue {}", task.name()))?;
    if inserted > 0 {
        tracing::debug!(task = task.name(), "job enqueued");
    }
    Ok(inserted > 0)
}

/// Enqueue every task of `fanout`.
///
/// # Errors
///
/// Returns an error if an insert fails.
pub fn enqueue_fanout(conn: &Connection, fanout: &Fanout, now: i64) -> Result<()> {
    for task in fanout.tasks() {
        enqueue(conn, &task, now)?;
    }
    Ok(())
}

/// A row of the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRow {
    pub id: i64,
    pub name: String,
    pub payload: String,
    pub run_at: i64,
    pub attempts: i64,
    pub last_error: Option<String>,
}

/// Every queued job, in execution order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_jobs(conn: &Connection) -> Result<Vec<JobRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT job_id, name, payload_json, run_at_us, attempts, last_error
             FROM market_jobs ORDER BY run_at_us, job_id",
        )
        .context("prepare list_jobs")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(JobRow {
                id: row.get(0)?,
                name: row.get(1)?,
                payload: row.get(2)?,
                run_at: row.get(3)?,
                attempts: row.get(4)?,
                last_error: row.get(5)?,
            })
        })
        .context("execute list_jobs")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("read job row")?);
    }
    Ok(out)
}

/// Counters from one [`run_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub succeeded: usize,
    pub failed: usize,
    pub dropped: usize,
}

/// Execute every job due at `now`.
///
/// Task failures never propagate: they are logged and the job is
/// rescheduled. Only queue bookkeeping failures are returned.
///
/// # Errors
///
/// Returns an error if the queue itself cannot be read or updated.
pub fn run_pending(conn: &mut Connection, config: &MarketConfig, now: i64) -> Result<RunReport> {
    let due: Vec<JobRow> = list_jobs(conn)?
        .into_iter()
        .filter(|job| job.run_at <= now)
        .collect();

    let mut report = RunReport::default();
    for job in due {
        let outcome = serde_json::from_str::<Task>(&job.payload)
            .with_context(|| format!("decode payload of job {}", job.id))
            .and_then(|task| execute(conn, config, &task, now));

        match outcome {
            Ok(()) => {
                conn.execute("DELETE FROM market_jobs WHERE job_id = ?1", [job.id])
                    .context("remove finished job")?;
                report.succeeded += 1;
                tracing::debug!(job_id = job.id, task = %job.name, "job finished");
            }
            Err(err) => {
                let attempts = job.attempts + 1;
                if attempts >= config.jobs.max_attempts {
                    conn.execute("DELETE FROM market_jobs WHERE job_id = ?1", [job.id])
                        .context("drop exhausted job")?;
                    report.dropped += 1;
                    tracing::error!(
                        job_id = job.id,
                        task = %job.name,
                        attempts,
                        error = %format!("{err:#}"),
                        "job dropped after repeated failures"
                    );
                } else {
                    let run_at =
                        now.saturating_add(config.jobs.retry_delay_secs.saturating_mul(1_000_000));
                    conn.execute(
                        "UPDATE market_jobs SET attempts = ?2, run_at_us = ?3, last_error = ?4
                         WHERE job_id = ?1",
                        params![job.id, attempts, run_at, format!("{err:#}")],
                    )
                    .context("postpone failed job")?;
                    report.failed += 1;
                    tracing::warn!(
                        job_id = job.id,
                        task = %job.name,
                        attempts,
                        error = %format!("{err:#}"),
                        "job failed; postponed"
                    );
                }
            }
        }
    }

    if report != RunReport::default() {
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            dropped = report.dropped,
            "job queue pass complete"
        );
    }
    Ok(report)
}

fn in_chunks<F>(conn: &mut Connection, values: &[String], chunk_size: usize, mut f: F) -> Result<()>
where
    F: FnMut(&Connection, &[String]) -> Result<usize>,
{
    for chunk in values.chunks(chunk_size.max(1)) {
        let tx = db::write_tx(conn).context("begin job chunk")?;
        f(&*tx, chunk)?;
        tx.commit().context("commit job chunk")?;
    }
    Ok(())
}

/// Run one task to completion.
///
/// # Errors
///
/// Returns the task's failure.
pub fn execute(conn: &mut Connection, config: &MarketConfig, task: &Task, now: i64) -> Result<()> {
    let chunk = config.jobs.chunk_size;
    match task {
        Task::SearchIndexUpdate { ids } => in_chunks(conn, ids, chunk, search::reindex),
        Task::SectionCounters { sections } => in_chunks(conn, sections, chunk, |c, s| {
            counters::recompute_sections(c, s, now)
        }),
        Task::UserCounters { users } => in_chunks(conn, users, chunk, |c, u| {
            counters::recompute_users(c, u, now)
        }),
        Task::CurrencyPropagate { currencies } => in_chunks(conn, currencies, chunk, |c, cur| {
            currency::propagate(c, cur, &config.currency.reference)
        }),
        Task::Autoclose => lifecycle::autoclose_expired(conn, config, now).map(|_| ()),
    }
}
