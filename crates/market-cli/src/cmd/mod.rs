pub mod completions;
pub mod create;
pub mod draft;
pub mod edit;
pub mod history;
pub mod init;
pub mod jobs;
pub mod lifecycle;
pub mod list;
pub mod move_cmd;
pub mod rates;
pub mod search;
pub mod section;
pub mod show;

use anyhow::{Context as _, Result, bail};
use market_core::model::item::{Location, Price};

/// Parse `lat,lon` in degrees.
pub fn parse_location(raw: &str) -> Result<Location> {
    let Some((lat, lon)) = raw.split_once(',') else {
        bail!("expected 'lat,lon', got '{raw}'");
    };
    let lat: f64 = lat.trim().parse().with_context(|| format!("invalid latitude '{lat}'"))?;
    let lon: f64 = lon.trim().parse().with_context(|| format!("invalid longitude '{lon}'"))?;
    Ok(Location { lat, lon })
}

/// Combine `--price` and `--currency`; the currency defaults to `reference`.
pub fn price_from(value: Option<f64>, currency: Option<&str>, reference: &str) -> Option<Price> {
    value.map(|value| Price {
        value,
        currency: currency.unwrap_or(reference).to_string(),
    })
}

/// Parse `CODE=rate`.
pub fn parse_rate(raw: &str) -> Result<(String, f64)> {
    let Some((code, rate)) = raw.split_once('=') else {
        bail!("expected 'CODE=rate', got '{raw}'");
    };
    let rate: f64 = rate.trim().parse().with_context(|| format!("invalid rate '{rate}'"))?;
    Ok((code.trim().to_string(), rate))
}
