use anyhow::Result;
use clap::Args;
use market_core::items::{canonical_path, get_visible};
use market_core::model::item::Item;
use serde::Serialize;
use std::io::Write;

use crate::context::MarketContext;
use crate::output::{as_seen_by, item_block, item_row, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Listing id.
    pub id: String,

    /// Section the listing was addressed under; a mismatch reports the
    /// canonical path instead.
    #[arg(long)]
    pub section: Option<String>,
}

#[derive(Debug, Serialize)]
struct ShowView {
    #[serde(flatten)]
    item: Item,
    path: String,
}

/// Execute `mkt show`.
///
/// # Errors
///
/// Returns not-found for missing or hidden listings and a redirect error
/// when `--section` does not match.
pub fn run_show(args: &ShowArgs, ctx: &MarketContext) -> Result<()> {
    let tree = ctx.tree()?;
    let item = get_visible(&ctx.conn, &tree, &ctx.actor, &args.id, args.section.as_deref())?;
    let view = ShowView {
        path: canonical_path(&tree, &item),
        item: as_seen_by(&item, &ctx.actor),
    };
    let viewer = &ctx.actor;
    render_mode(
        ctx.output,
        &view,
        |v, w| {
            item_row(w, &v.item, viewer)?;
            writeln!(w, "{}", v.path)
        },
        |v, w| item_block(w, &v.item, viewer, &v.path),
    )
}
