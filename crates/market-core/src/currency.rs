//! Exchange rates and reference-currency prices.
//!
//! A rate is the number of reference-currency units per one unit of the
//! currency. The reference currency itself always converts at 1.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::db;
use crate::error::{MarketError, MarketResult};
use crate::jobs::{self, Task};
use crate::model::item::Collection;

/// A stored exchange rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyRate {
    pub currency: String,
    pub rate: f64,
    pub updated_at: i64,
}

fn normalize_code(code: &str) -> MarketResult<String> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(MarketError::Client(format!("Invalid currency code '{code}'")))
    }
}

/// Store rates and schedule price propagation for the ones that changed.
///
/// Returns the currencies whose rate changed.
///
/// # Errors
///
/// - [`MarketError::Client`] for malformed codes or non-positive rates.
/// - Database failures.
pub fn set_rates(conn: &mut Connection, rates: &[(String, f64)], now: i64) -> MarketResult<Vec<String>> {
    let mut normalized = Vec::with_capacity(rates.len());
    for (code, rate) in rates {
        let code = normalize_code(code)?;
        if !rate.is_finite() || *rate <= 0.0 {
            return Err(MarketError::Client(format!(
                "Rate for {code} must be a positive number"
            )));
        }
        normalized.push((code, *rate));
    }

    let tx = db::write_tx(conn)?;
    let mut changed = Vec::new();
    for (code, rate) in normalized {
        let previous = stored_rate(&tx, &code)?;
        if previous.is_some_and(|p| (p - rate).abs() < f64::EPSILON) {
            continue;
        }
        tx.execute(
            "INSERT INTO currency_rates (currency, rate, updated_at_us) VALUES (?1, ?2, ?3)
             ON CONFLICT (currency) DO UPDATE SET rate = excluded.rate,
                 updated_at_us = excluded.updated_at_us",
            params![code, rate, now],
        )?;
        changed.push(code);
    }
    jobs::enqueue(
        &tx,
        &Task::CurrencyPropagate {
            currencies: changed.clone(),
        },
        now,
    )?;
    tx.commit()?;

    if !changed.is_empty() {
        tracing::info!(currencies = ?changed, "currency rates updated");
    }
    Ok(changed)
}

fn stored_rate(conn: &Connection, code: &str) -> Result<Option<f64>> {
    conn.query_row(
        "SELECT rate FROM currency_rates WHERE currency = ?1",
        [code],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("read rate for {code}"))
}

/// All stored rates, by currency code.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_rates(conn: &Connection) -> Result<Vec<CurrencyRate>> {
    let mut stmt = conn
        .prepare("SELECT currency, rate, updated_at_us FROM currency_rates ORDER BY currency")
        .context("prepare list_rates")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CurrencyRate {
                currency: row.get(0)?,
                rate: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })
        .context("execute list_rates")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("read rate row")?);
    }
    Ok(out)
}

/// Rate of `currency` against `reference`; `None` if unknown.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn rate_for(conn: &Connection, currency: &str, reference: &str) -> Result<Option<f64>> {
    if currency.eq_ignore_ascii_case(reference) {
        return Ok(Some(1.0));
    }
    stored_rate(conn, &currency.to_ascii_uppercase())
}

/// Whether listings may be priced in `currency`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn is_known(conn: &Connection, currency: &str, reference: &str) -> Result<bool> {
    Ok(rate_for(conn, currency, reference)?.is_some())
}

/// Convert `value` in `from` into the reference currency.
///
/// # Errors
///
/// - [`MarketError::Client`] for unknown currencies.
/// - Database failures.
pub fn convert(conn: &Connection, value: f64, from: &str, reference: &str) -> MarketResult<f64> {
    match rate_for(conn, from, reference)? {
        Some(rate) => Ok(value * rate),
        None => Err(MarketError::Client(format!("Unknown currency '{from}'"))),
    }
}

/// Recompute `price_base` for every listing priced in `currencies`.
///
/// Currencies without a rate leave their listings untouched.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub fn propagate(conn: &Connection, currencies: &[String], reference: &str) -> Result<usize> {
    let mut updated = 0;
    for code in currencies {
        let Some(rate) = rate_for(conn, code, reference)? else {
            tracing::warn!(currency = %code, "no rate stored; skipping propagation");
            continue;
        };
        for collection in [Collection::Active, Collection::Archived] {
            let sql = format!(
                "UPDATE {} SET price_base = price_value * ?2
                 WHERE price_currency = ?1 AND price_value IS NOT NULL",
                collection.table_name()
            );
            updated += conn
                .execute(&sql, params![code, rate])
                .with_context(|| format!("propagate {code} into {}", collection.table_name()))?;
        }
    }
    tracing::debug!(currencies = ?currencies, updated, "price_base propagated");
    Ok(updated)
}
