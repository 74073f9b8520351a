use anyhow::Result;
use clap::{Args, Subcommand};
use market_core::currency;
use market_core::error::MarketError;
use market_core::model::actor::Role;
use serde::Serialize;
use std::io::Write;

use super::parse_rate;
use crate::context::MarketContext;
use crate::output::{format_ts, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct RatesArgs {
    #[command(subcommand)]
    pub command: RatesCommand,
}

#[derive(Subcommand, Debug)]
pub enum RatesCommand {
    /// Store exchange rates as reference-currency units per unit.
    Set {
        /// `CODE=rate` pairs, e.g. `EUR=1.08`.
        #[arg(required = true, value_name = "CODE=RATE", value_parser = parse_rate)]
        rates: Vec<(String, f64)>,
    },
    /// Print the stored rates.
    List,
}

#[derive(Debug, Serialize)]
struct RatesView {
    reference: String,
    rates: Vec<currency::CurrencyRate>,
}

/// Execute `mkt rates`.
///
/// # Errors
///
/// Returns forbidden for non-moderators setting rates, and client errors for
/// malformed codes or rates.
pub fn run_rates(args: &RatesArgs, ctx: &mut MarketContext) -> Result<()> {
    match &args.command {
        RatesCommand::Set { rates } => {
            ctx.require_user()?;
            if ctx.actor.role != Role::Moderator {
                return Err(MarketError::Forbidden("setting rates requires the moderator role".into()).into());
            }
            let changed = currency::set_rates(&mut ctx.conn, rates, ctx.now)?;
            render(ctx.output, &serde_json::json!({ "changed": changed }), |_, w| {
                if changed.is_empty() {
                    pretty_kv(w, "Changed", "none")
                } else {
                    pretty_kv(w, "Changed", changed.join(", "))
                }
            })
        }
        RatesCommand::List => {
            let view = RatesView {
                reference: ctx.config.currency.reference.clone(),
                rates: currency::list_rates(&ctx.conn)?,
            };
            render(ctx.output, &view, |v, w| {
                pretty_section(w, &format!("Rates to {}", v.reference))?;
                for rate in &v.rates {
                    writeln!(w, "{}\t{}\t{}", rate.currency, rate.rate, format_ts(rate.updated_at))?;
                }
                Ok(())
            })
        }
    }
}
