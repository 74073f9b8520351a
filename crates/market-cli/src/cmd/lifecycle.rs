//! `mkt close`, `mkt open`, `mkt delete` and `mkt undelete`.
//!
//! Each takes one or more ids. Ids the actor cannot see, may not touch, or
//! that are already in the target state are skipped; the command fails only
//! when nothing at all changed.

use anyhow::Result;
use clap::Args;
use market_core::lifecycle::{self, BatchOutcome};
use std::io::Write;

use crate::context::MarketContext;
use crate::output::{pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Listing ids.
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Listing ids.
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,

    /// Hide the listing from moderators too.
    #[arg(long)]
    pub hard: bool,

    /// Shown to the author.
    #[arg(long)]
    pub reason: Option<String>,
}

fn render_outcome(ctx: &MarketContext, verb: &str, outcome: &BatchOutcome) -> Result<()> {
    render_mode(
        ctx.output,
        outcome,
        |o, w| {
            for id in &o.changed {
                writeln!(w, "{id}")?;
            }
            Ok(())
        },
        |o, w| {
            pretty_kv(w, verb, o.changed.join(", "))?;
            if o.skipped > 0 {
                pretty_kv(w, "Skipped", o.skipped.to_string())?;
            }
            Ok(())
        },
    )
}

/// Execute `mkt close`.
///
/// # Errors
///
/// Returns a client error when no listing could be closed.
pub fn run_close(args: &BatchArgs, ctx: &mut MarketContext) -> Result<()> {
    ctx.require_user()?;
    let outcome = lifecycle::close_many(&mut ctx.conn, &ctx.config, &ctx.actor, &args.ids, ctx.now)?;
    render_outcome(ctx, "Closed", &outcome)
}

/// Execute `mkt open`.
///
/// # Errors
///
/// Returns a client error when no listing could be reopened, including when
/// every candidate is too old.
pub fn run_open(args: &BatchArgs, ctx: &mut MarketContext) -> Result<()> {
    ctx.require_user()?;
    let outcome = lifecycle::open_many(&mut ctx.conn, &ctx.config, &ctx.actor, &args.ids, ctx.now)?;
    render_outcome(ctx, "Reopened", &outcome)
}

/// Execute `mkt delete`.
///
/// # Errors
///
/// Returns a client error when nothing was deleted.
pub fn run_delete(args: &DeleteArgs, ctx: &mut MarketContext) -> Result<()> {
    ctx.require_user()?;
    let outcome = lifecycle::delete_many(
        &mut ctx.conn,
        &ctx.config,
        &ctx.actor,
        &args.ids,
        args.hard,
        args.reason.clone(),
        ctx.now,
    )?;
    render_outcome(ctx, "Deleted", &outcome)
}

/// Execute `mkt undelete`.
///
/// # Errors
///
/// Returns a client error when nothing was restored.
pub fn run_undelete(args: &BatchArgs, ctx: &mut MarketContext) -> Result<()> {
    ctx.require_user()?;
    let outcome = lifecycle::undelete_many(&mut ctx.conn, &ctx.config, &ctx.actor, &args.ids, ctx.now)?;
    render_outcome(ctx, "Restored", &outcome)
}
