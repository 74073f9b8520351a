use anyhow::Result;
use clap::Args;
use market_core::DAY_US;
use market_core::drafts::{self, Draft};
use market_core::error::MarketError;
use market_core::items::{NewItem, canonical_path, create_item};
use market_core::model::item::ItemKind;
use std::io::Write;

use super::{parse_location, price_from};
use crate::context::MarketContext;
use crate::output::{item_block, pretty_kv, render_mode};

/// Listing fields shared by `mkt create` and `mkt draft save`.
#[derive(Args, Debug, Clone, Default)]
pub struct ListingFields {
    /// Section to post in.
    #[arg(long, short)]
    pub section: Option<String>,

    #[arg(long, short)]
    pub title: Option<String>,

    /// Markdown body.
    #[arg(long, short)]
    pub body: Option<String>,

    #[arg(long)]
    pub price: Option<f64>,

    /// Price currency; defaults to the reference currency.
    #[arg(long)]
    pub currency: Option<String>,

    /// Location as `lat,lon`.
    #[arg(long, value_name = "LAT,LON")]
    pub location: Option<String>,

    /// Attachment id (repeatable).
    #[arg(long = "file", value_name = "FILE_ID")]
    pub files: Vec<String>,

    /// What the author would take in exchange.
    #[arg(long)]
    pub barter: Option<String>,

    /// Offer ships to the buyer.
    #[arg(long)]
    pub delivery: bool,

    /// Offer is unused.
    #[arg(long = "new")]
    pub is_new: bool,
}

impl ListingFields {
    /// Overlay the given flags onto `draft`.
    pub fn apply_to(&self, draft: &mut Draft, reference: &str) -> Result<()> {
        if let Some(ref section) = self.section {
            draft.section = Some(section.clone());
        }
        if let Some(ref title) = self.title {
            draft.title.clone_from(title);
        }
        if let Some(ref body) = self.body {
            draft.md.clone_from(body);
        }
        if let Some(price) = price_from(self.price, self.currency.as_deref(), reference) {
            draft.price = Some(price);
        }
        if let Some(ref raw) = self.location {
            draft.location = Some(parse_location(raw)?);
        }
        if !self.files.is_empty() {
            draft.files.clone_from(&self.files);
        }
        if let Some(ref barter) = self.barter {
            draft.barter_info = Some(barter.clone());
        }
        draft.delivery |= self.delivery;
        draft.is_new |= self.is_new;
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// `offer` or `wish`.
    pub kind: ItemKind,

    #[command(flatten)]
    pub fields: ListingFields,

    /// Start from the saved draft; flags override its fields.
    #[arg(long)]
    pub from_draft: bool,
}

/// Execute `mkt create`.
///
/// # Errors
///
/// Returns validation, permission and store errors from listing creation.
pub fn run_create(args: &CreateArgs, ctx: &mut MarketContext) -> Result<()> {
    ctx.require_user()?;
    let reference = ctx.config.currency.reference.clone();

    let mut draft = if args.from_draft {
        let ttl = ctx.config.drafts.ttl_days * DAY_US;
        match drafts::load_draft(&ctx.conn, &ctx.actor.user, ctx.now, ttl)? {
            Some(stored) => stored.draft,
            None => return Err(MarketError::Client("No saved draft".to_string()).into()),
        }
    } else {
        Draft::default()
    };
    draft.kind = args.kind;
    args.fields.apply_to(&mut draft, &reference)?;

    let new = NewItem::try_from(draft)?;
    let tree = ctx.tree()?;
    let item = create_item(&mut ctx.conn, &ctx.config, &tree, &ctx.actor, new, ctx.now)?;
    if args.from_draft {
        drafts::delete_draft(&ctx.conn, &ctx.actor.user)?;
    }

    let path = canonical_path(&tree, &item);
    let actor = &ctx.actor;
    render_mode(
        ctx.output,
        &item,
        |item, w| {
            writeln!(w, "{}\t{path}", item.id)
        },
        |item, w| {
            pretty_kv(w, "Created", &item.id)?;
            item_block(w, item, actor, &path)
        },
    )
}
