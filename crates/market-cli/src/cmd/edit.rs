use anyhow::Result;
use clap::Args;
use market_core::error::MarketError;
use market_core::items::{ItemPatch, canonical_path, edit_item};
use market_core::model::item::Price;
use std::io::Write;

use super::parse_location;
use crate::context::MarketContext;
use crate::output::{as_seen_by, item_block, render_mode};

#[derive(Args, Debug, Default)]
pub struct EditArgs {
    /// Listing id.
    pub id: String,

    #[arg(long, short)]
    pub title: Option<String>,

    /// Markdown body.
    #[arg(long, short)]
    pub body: Option<String>,

    #[arg(long, conflicts_with = "no_price")]
    pub price: Option<f64>,

    /// Currency of `--price`; defaults to the reference currency.
    #[arg(long, requires = "price")]
    pub currency: Option<String>,

    /// Remove the price.
    #[arg(long)]
    pub no_price: bool,

    #[arg(long, value_name = "LAT,LON", conflicts_with = "no_location")]
    pub location: Option<String>,

    #[arg(long)]
    pub no_location: bool,

    /// Replace the attachments (repeatable).
    #[arg(long = "file", value_name = "FILE_ID")]
    pub files: Vec<String>,

    #[arg(long, conflicts_with = "no_barter")]
    pub barter: Option<String>,

    #[arg(long)]
    pub no_barter: bool,

    #[arg(long)]
    pub delivery: Option<bool>,

    #[arg(long = "new")]
    pub is_new: Option<bool>,
}

impl EditArgs {
    fn patch(&self, reference: &str) -> Result<ItemPatch> {
        let price = if self.no_price {
            Some(None)
        } else {
            self.price.map(|value| {
                Some(Price {
                    value,
                    currency: self.currency.clone().unwrap_or_else(|| reference.to_string()),
                })
            })
        };
        let location = if self.no_location {
            Some(None)
        } else {
            self.location.as_deref().map(parse_location).transpose()?.map(Some)
        };
        let barter_info = if self.no_barter {
            Some(None)
        } else {
            self.barter.clone().map(Some)
        };
        Ok(ItemPatch {
            title: self.title.clone(),
            md: self.body.clone(),
            price,
            location,
            files: (!self.files.is_empty()).then(|| self.files.clone()),
            barter_info,
            delivery: self.delivery,
            is_new: self.is_new,
        })
    }
}

/// Execute `mkt edit`.
///
/// # Errors
///
/// Returns an error when no field is given, and propagates validation,
/// permission and store errors from the edit.
pub fn run_edit(args: &EditArgs, ctx: &mut MarketContext) -> Result<()> {
    ctx.require_user()?;
    let patch = args.patch(&ctx.config.currency.reference)?;
    if patch.is_empty() {
        return Err(MarketError::Client("Nothing to change".to_string()).into());
    }
    let item = edit_item(&mut ctx.conn, &ctx.config, &ctx.actor, &args.id, patch, ctx.now)?;
    let tree = ctx.tree()?;
    let path = canonical_path(&tree, &item);
    let seen = as_seen_by(&item, &ctx.actor);
    let viewer = &ctx.actor;
    render_mode(
        ctx.output,
        &seen,
        |item, w| writeln!(w, "{}\t{}", item.id, item.edit_count),
        |item, w| item_block(w, item, viewer, &path),
    )
}
