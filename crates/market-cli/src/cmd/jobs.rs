use anyhow::Result;
use clap::{Args, Subcommand};
use market_core::DAY_US;
use market_core::jobs::{self, Task};
use market_core::{drafts, lifecycle, search};
use serde::Serialize;
use std::io::Write;

use crate::context::MarketContext;
use crate::output::{format_ts, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct JobsArgs {
    #[command(subcommand)]
    pub command: JobsCommand,
}

#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// Run every due job.
    Run {
        /// Also queue an autoclose pass before running.
        #[arg(long)]
        autoclose: bool,
    },
    /// Print the queue.
    List,
    /// Rebuild the search index from the active table.
    Reindex,
    /// Close expired listings now.
    Autoclose,
    /// Delete drafts older than `drafts.ttl_days`.
    PurgeDrafts,
}

#[derive(Debug, Serialize)]
struct CountReport {
    action: &'static str,
    count: usize,
}

/// Execute `mkt jobs`.
///
/// # Errors
///
/// Returns store errors. Individual job failures are logged and reported in
/// the run summary instead.
pub fn run_jobs(args: &JobsArgs, ctx: &mut MarketContext) -> Result<()> {
    match args.command {
        JobsCommand::Run { autoclose } => {
            if autoclose {
                jobs::enqueue(&ctx.conn, &Task::Autoclose, ctx.now)?;
            }
            let report = jobs::run_pending(&mut ctx.conn, &ctx.config, ctx.now)?;
            render(ctx.output, &report, |r, w| {
                pretty_kv(w, "Succeeded", r.succeeded.to_string())?;
                pretty_kv(w, "Failed", r.failed.to_string())?;
                pretty_kv(w, "Dropped", r.dropped.to_string())
            })
        }
        JobsCommand::List => {
            let queue = jobs::list_jobs(&ctx.conn)?;
            render(ctx.output, &queue, |queue, w| {
                pretty_section(w, &format!("{} queued jobs", queue.len()))?;
                for job in queue {
                    writeln!(
                        w,
                        "{}\t{}\t{}\t{}\t{}",
                        job.id,
                        job.name,
                        format_ts(job.run_at),
                        job.attempts,
                        job.last_error.as_deref().unwrap_or("-")
                    )?;
                }
                Ok(())
            })
        }
        JobsCommand::Reindex => {
            let count = search::rebuild(&ctx.conn)?;
            render_count(ctx, "Reindexed", count)
        }
        JobsCommand::Autoclose => {
            let count = lifecycle::autoclose_expired(&mut ctx.conn, &ctx.config, ctx.now)?;
            render_count(ctx, "Closed", count)
        }
        JobsCommand::PurgeDrafts => {
            let ttl = ctx.config.drafts.ttl_days * DAY_US;
            let count = drafts::purge_expired(&ctx.conn, ctx.now, ttl)?;
            tracing::info!(purged = count, "expired drafts purged");
            render_count(ctx, "Purged", count)
        }
    }
}

fn render_count(ctx: &MarketContext, action: &'static str, count: usize) -> Result<()> {
    render(ctx.output, &CountReport { action, count }, |r, w| {
        pretty_kv(w, r.action, r.count.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(subcommand)]
        command: JobsCommand,
    }

    #[test]
    fn parses_subcommands() {
        assert!(matches!(
            Wrapper::parse_from(["test", "run", "--autoclose"]).command,
            JobsCommand::Run { autoclose: true }
        ));
        assert!(matches!(Wrapper::parse_from(["test", "list"]).command, JobsCommand::List));
        assert!(matches!(Wrapper::parse_from(["test", "purge-drafts"]).command, JobsCommand::PurgeDrafts));
    }
}
