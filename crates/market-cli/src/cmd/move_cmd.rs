use anyhow::Result;
use clap::Args;
use market_core::items::move_many;
use std::io::Write;

use crate::context::MarketContext;
use crate::output::{pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Listing ids.
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,

    /// Target section.
    #[arg(long)]
    pub to: String,
}

/// Execute `mkt move`.
///
/// # Errors
///
/// Returns forbidden without moderator rights, not-found or bad-request for
/// unusable targets, and a client error when nothing moved.
pub fn run_move(args: &MoveArgs, ctx: &mut MarketContext) -> Result<()> {
    ctx.require_user()?;
    let tree = ctx.tree()?;
    let outcome = move_many(
        &mut ctx.conn,
        &ctx.config,
        &tree,
        &ctx.actor,
        &args.ids,
        &args.to,
        ctx.now,
    )?;
    let to = &args.to;
    render_mode(
        ctx.output,
        &outcome,
        |o, w| {
            for id in &o.changed {
                writeln!(w, "{id}\t{to}")?;
            }
            Ok(())
        },
        |o, w| {
            pretty_kv(w, "Moved", o.changed.join(", "))?;
            pretty_kv(w, "To", to)?;
            if o.skipped > 0 {
                pretty_kv(w, "Skipped", o.skipped.to_string())?;
            }
            Ok(())
        },
    )
}
