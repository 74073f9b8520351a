//! `mkt draft`: one unfinished listing per user, kept for `drafts.ttl_days`.

use anyhow::Result;
use clap::{Args, Subcommand};
use market_core::DAY_US;
use market_core::drafts::{self, Draft};
use market_core::error::MarketError;
use market_core::model::item::ItemKind;

use super::create::ListingFields;
use crate::context::MarketContext;
use crate::output::{format_ts, pretty_kv, render};

#[derive(Args, Debug)]
pub struct DraftArgs {
    #[command(subcommand)]
    pub command: DraftCommand,
}

#[derive(Subcommand, Debug)]
pub enum DraftCommand {
    /// Save fields into the draft, keeping ones not given.
    Save {
        /// `offer` or `wish`; defaults to the draft's current kind.
        #[arg(long)]
        kind: Option<ItemKind>,

        #[command(flatten)]
        fields: ListingFields,
    },
    /// Print the saved draft.
    Show,
    /// Discard the saved draft.
    Clear,
}

/// Execute `mkt draft`.
///
/// # Errors
///
/// Returns a client error when there is no draft to show, plus store errors.
pub fn run_draft(args: &DraftArgs, ctx: &MarketContext) -> Result<()> {
    ctx.require_user()?;
    let user = ctx.actor.user.as_str();
    let ttl = ctx.config.drafts.ttl_days * DAY_US;

    match &args.command {
        DraftCommand::Save { kind, fields } => {
            let mut draft = drafts::load_draft(&ctx.conn, user, ctx.now, ttl)?
                .map(|stored| stored.draft)
                .unwrap_or_default();
            if let Some(kind) = *kind {
                draft.kind = kind;
            }
            fields.apply_to(&mut draft, &ctx.config.currency.reference)?;
            drafts::save_draft(&ctx.conn, user, &draft, ctx.now)?;
            tracing::debug!(user = %user, "draft saved");
            render(ctx.output, &draft, |d, w| {
                pretty_kv(w, "Saved", if d.title.is_empty() { "(untitled)" } else { d.title.as_str() })
            })
        }
        DraftCommand::Show => {
            let Some(stored) = drafts::load_draft(&ctx.conn, user, ctx.now, ttl)? else {
                return Err(MarketError::Client("No saved draft".to_string()).into());
            };
            render(ctx.output, &stored, |s, w| write_draft(w, &s.draft, s.updated_at))
        }
        DraftCommand::Clear => {
            let existed = drafts::delete_draft(&ctx.conn, user)?;
            render(ctx.output, &serde_json::json!({ "cleared": existed }), |_, w| {
                pretty_kv(w, "Cleared", if existed { "yes" } else { "nothing saved" })
            })
        }
    }
}

fn write_draft(w: &mut dyn std::io::Write, draft: &Draft, updated_at: i64) -> std::io::Result<()> {
    pretty_kv(w, "Kind", draft.kind.as_str())?;
    pretty_kv(w, "Title", &draft.title)?;
    pretty_kv(w, "Section", draft.section.as_deref().unwrap_or("-"))?;
    if let Some(ref price) = draft.price {
        pretty_kv(w, "Price", format!("{:.2} {}", price.value, price.currency))?;
    }
    if !draft.files.is_empty() {
        pretty_kv(w, "Files", draft.files.join(", "))?;
    }
    pretty_kv(w, "Saved at", format_ts(updated_at))?;
    if !draft.md.is_empty() {
        writeln!(w)?;
        writeln!(w, "{}", draft.md)?;
    }
    Ok(())
}
