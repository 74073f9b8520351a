use anyhow::Result;
use clap::Args;
use market_core::error::{ErrorCode, MarketError};
use market_core::model::item::ItemKind;
use market_core::search::{self, SearchQuery};
use std::io::Write;

use super::parse_location;
use crate::context::MarketContext;
use crate::output::{CliFailure, as_seen_by, format_price, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Words to match in titles and bodies.
    pub terms: Vec<String>,

    #[arg(long, short)]
    pub kind: Option<ItemKind>,

    /// Restrict to a section and its subsections.
    #[arg(long, short)]
    pub section: Option<String>,

    /// Lowest price in the reference currency.
    #[arg(long)]
    pub min_price: Option<f64>,

    /// Highest price in the reference currency.
    #[arg(long)]
    pub max_price: Option<f64>,

    /// Center point as `lat,lon`.
    #[arg(long, value_name = "LAT,LON")]
    pub near: Option<String>,

    /// Search radius in kilometres around `--near`.
    #[arg(long, default_value_t = 25.0, requires = "near")]
    pub radius: f64,

    #[arg(long, short = 'n', default_value_t = 20)]
    pub limit: usize,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

impl SearchArgs {
    fn query(&self, sections: Vec<String>) -> Result<SearchQuery> {
        let text = self.terms.join(" ");
        let near = match self.near {
            Some(ref raw) => Some((parse_location(raw)?, self.radius)),
            None => None,
        };
        Ok(SearchQuery {
            text: (!text.trim().is_empty()).then_some(text),
            kind: self.kind,
            sections,
            price_min: self.min_price,
            price_max: self.max_price,
            near,
            limit: Some(self.limit),
            offset: self.offset,
        })
    }
}

/// Execute `mkt search`.
///
/// # Errors
///
/// Returns not-found for unknown sections and `FtsIndexMissing` when the
/// index table is absent.
pub fn run_search(args: &SearchArgs, ctx: &MarketContext) -> Result<()> {
    if !search::index_available(&ctx.conn)? {
        return Err(CliFailure::new(ErrorCode::FtsIndexMissing, "search index table is missing").into());
    }
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
    let query = args.query(sections)?;
    let mut hits = search::search(&ctx.conn, &query, &ctx.actor)?;
    for hit in &mut hits {
        hit.item = as_seen_by(&hit.item, &ctx.actor);
    }
    tracing::debug!(hits = hits.len(), text = ?query.text, "search finished");

    render_mode(
        ctx.output,
        &hits,
        |hits, w| {
            for hit in hits {
                writeln!(w, "{}\t{}\t{}\t{}", hit.item.id, hit.item.kind, format_price(&hit.item), hit.item.title)?;
            }
            Ok(())
        },
        |hits, w| {
            pretty_section(w, &format!("{} results", hits.len()))?;
            for hit in hits {
                let distance = hit.distance_km.map_or_else(String::new, |d| format!("  ({d:.1} km)"));
                writeln!(
                    w,
                    "{:<14} {:<6} {:>14}  {}{distance}",
                    hit.item.id,
                    hit.item.kind.as_str(),
                    format_price(&hit.item),
                    hit.item.title
                )?;
            }
            Ok(())
        },
    )
}
