use anyhow::Result;
use clap::{Args, ValueEnum};
use market_core::db::query::{ItemFilter, SortOrder, count_items, list_items};
use market_core::error::MarketError;
use market_core::items::{Page, SectionListing, list_section};
use market_core::model::item::{Collection, ItemKind};
use std::io::Write;

use crate::context::MarketContext;
use crate::output::{as_seen_by, item_row, pretty_section, render_mode};

/// Which table to read.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StateFilter {
    /// Open listings only.
    #[default]
    Open,
    /// Closed and deleted listings.
    Archived,
    All,
}

impl StateFilter {
    const fn collection(self) -> Option<Collection> {
        match self {
            Self::Open => Some(Collection::Active),
            Self::Archived => Some(Collection::Archived),
            Self::All => None,
        }
    }
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Section to list, including its subsections.
    #[arg(long, short)]
    pub section: Option<String>,

    /// `offer` or `wish`.
    #[arg(long, short)]
    pub kind: Option<ItemKind>,

    #[arg(long, value_enum, default_value_t)]
    pub state: StateFilter,

    /// Only listings by this author.
    #[arg(long)]
    pub author: Option<String>,

    /// newest, oldest, price_asc or price_desc.
    #[arg(long, default_value = "newest")]
    pub sort: SortOrder,

    #[arg(long, short = 'n')]
    pub limit: Option<u32>,

    #[arg(long)]
    pub offset: Option<u32>,
}

/// Execute `mkt list`.
///
/// # Errors
///
/// Returns not-found for unknown sections and store errors.
pub fn run_list(args: &ListArgs, ctx: &MarketContext) -> Result<()> {
    let collection = args.state.collection();
    let mut page = match args.section {
        Some(ref section) if args.author.is_none() => {
            let tree = ctx.tree()?;
            let listing = SectionListing {
                kind: args.kind,
                collection,
                sort: args.sort,
                limit: args.limit,
                offset: args.offset,
            };
            list_section(&ctx.conn, &tree, &ctx.actor, section, &listing)?
        }
        _ => {
            let sections = match args.section {
                Some(ref section) => {
                    let ids = ctx.tree()?.subtree_ids(section);
                    if ids.is_empty() {
                        return Err(MarketError::not_found("section", section.clone()).into());
                    }
                    ids
                }
                None => Vec::new(),
            };
            let filter = ItemFilter {
                sections,
                kind: args.kind,
                collection,
                user: args.author.clone(),
                limit: args.limit,
                offset: args.offset,
                sort: args.sort,
            };
            Page {
                items: list_items(&ctx.conn, &filter, &ctx.actor)?,
                total: count_items(&ctx.conn, &filter, &ctx.actor)?,
            }
        }
    };
    page.items = page.items.iter().map(|item| as_seen_by(item, &ctx.actor)).collect();

    let viewer = &ctx.actor;
    render_mode(
        ctx.output,
        &page,
        |page, w| {
            for item in &page.items {
                item_row(w, item, viewer)?;
            }
            Ok(())
        },
        |page, w| {
            pretty_section(w, &format!("{} of {} listings", page.items.len(), page.total))?;
            for item in &page.items {
                item_row(w, item, viewer)?;
            }
            if page.items.is_empty() {
                writeln!(w, "(none)")?;
            }
            Ok(())
        },
    )
}
