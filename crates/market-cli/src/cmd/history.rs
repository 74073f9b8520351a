use anyhow::Result;
use clap::Args;
use market_core::error::MarketError;
use market_core::history::{Snapshot, list_history};
use market_core::items::get_visible;
use market_core::model::item::{Status, StatusPair};
use std::io::Write;

use crate::context::MarketContext;
use crate::output::{format_ts, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Listing id.
    pub id: String,
}

fn mask_hellban(snapshot: &mut Snapshot) {
    if snapshot.st == Status::Hb {
        snapshot.st = StatusPair::new(snapshot.st, snapshot.ste).effective();
        snapshot.ste = None;
    }
}

/// Execute `mkt history`: every recorded edit, oldest first, with the state
/// before and after.
///
/// # Errors
///
/// Returns not-found for invisible listings and forbidden unless the actor
/// is the author or may edit any listing.
pub fn run_history(args: &HistoryArgs, ctx: &MarketContext) -> Result<()> {
    let tree = ctx.tree()?;
    let item = get_visible(&ctx.conn, &tree, &ctx.actor, &args.id, None)?;
    if !ctx.actor.owns(&item) && !ctx.actor.permissions.edit_any {
        return Err(MarketError::Forbidden(format!("cannot view the history of {}", item.id)).into());
    }
    let mut revisions = list_history(&ctx.conn, &item.id)?;
    if !ctx.actor.permissions.see_hellbanned {
        for rev in &mut revisions {
            mask_hellban(&mut rev.entry.snapshot);
            mask_hellban(&mut rev.after);
            rev.entry.ip = None;
        }
    }

    render_mode(
        ctx.output,
        &revisions,
        |revs, w| {
            for rev in revs {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    rev.entry.ts, rev.entry.user, rev.entry.role, rev.entry.snapshot.title
                )?;
            }
            Ok(())
        },
        |revs, w| {
            pretty_section(w, &format!("History of {} ({} entries)", args.id, revs.len()))?;
            for rev in revs {
                writeln!(w, "{}  {} ({})", format_ts(rev.entry.ts), rev.entry.user, rev.entry.role)?;
                if rev.entry.snapshot.title != rev.after.title {
                    writeln!(w, "    title: {:?} -> {:?}", rev.entry.snapshot.title, rev.after.title)?;
                }
                if rev.entry.snapshot.section != rev.after.section {
                    writeln!(w, "    section: {} -> {}", rev.entry.snapshot.section, rev.after.section)?;
                }
                if rev.entry.snapshot.st != rev.after.st {
                    writeln!(w, "    status: {} -> {}", rev.entry.snapshot.st, rev.after.st)?;
                }
                if rev.entry.snapshot.md != rev.after.md {
                    writeln!(w, "    body changed")?;
                }
            }
            Ok(())
        },
    )
}
