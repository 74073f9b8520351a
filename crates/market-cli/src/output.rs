//! Output layer shared by every `mkt` subcommand.
//!
//! Each handler receives an [`OutputMode`]: pretty output for people, compact
//! tab-separated rows for scripts and pipes, or stable JSON.
//!
//! The mode comes from, in order of precedence:
//! 1. `--json`
//! 2. `MARKET_FORMAT` env var (`pretty` | `text` | `json`)
//! 3. `output` in the user config
//! 4. Pretty on a TTY, text when piped
//!
//! The resolution itself lives in `market_core::config::resolve_config`.

use market_core::error::{ErrorCode, MarketError};
use market_core::model::actor::Actor;
use market_core::model::item::{Item, Status};
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};

/// Column width of the `----` rule under pretty headings.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Dashed rule spanning [`PRETTY_RULE_WIDTH`].
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Heading line with a rule beneath it.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// `Key:        value`, keys padded to one column.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

/// How a command prints its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Pretty,
    Text,
    Json,
}

impl OutputMode {
    /// Map a resolved mode name; unknown names fall back to text.
    pub fn from_resolved(name: &str) -> Self {
        match name {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Text,
        }
    }

    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Print `value` to stdout: serialized in JSON mode, through `human_fn`
/// otherwise.
pub fn render<T: Serialize + ?Sized>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// Render with distinct text and pretty renderers.
pub fn render_mode<T: Serialize + ?Sized>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// `2026-03-01 14:05` in UTC, or the raw value if out of range.
pub fn format_ts(ts_us: i64) -> String {
    chrono::DateTime::from_timestamp_micros(ts_us)
        .map_or_else(|| ts_us.to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string())
}

pub fn format_price(item: &Item) -> String {
    item.price
        .as_ref()
        .map_or_else(|| "-".to_string(), |p| format!("{:.2} {}", p.value, p.currency))
}

/// Copy of `item` as `viewer` should receive it. Hellbanned listings carry
/// their effective status and the author address is withheld unless the
/// viewer moderates hellbanned content.
pub fn as_seen_by(item: &Item, viewer: &Actor) -> Item {
    let mut seen = item.clone();
    if !viewer.permissions.see_hellbanned {
        if item.st == Status::Hb {
            seen.st = item.effective_status();
            seen.ste = None;
        }
        seen.ip = None;
    }
    seen
}

/// Tab-separated listing row: id, kind, status, price, section, title.
pub fn item_row(w: &mut dyn Write, item: &Item, viewer: &Actor) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}\t{}\t{}\t{}",
        item.id,
        item.kind,
        viewer.visible_status(item),
        format_price(item),
        item.section,
        item.title
    )
}

/// Full pretty rendering of one listing.
pub fn item_block(w: &mut dyn Write, item: &Item, viewer: &Actor, path: &str) -> io::Result<()> {
    pretty_section(w, &format!("{} [{}]", item.title, item.id))?;
    pretty_kv(w, "Kind", item.kind.as_str())?;
    pretty_kv(w, "Status", viewer.visible_status(item).as_str())?;
    pretty_kv(w, "Section", path)?;
    pretty_kv(w, "Price", format_price(item))?;
    if let Some(base) = item.price_base {
        pretty_kv(w, "Base price", format!("{base:.2}"))?;
    }
    if let Some(loc) = item.location {
        pretty_kv(w, "Location", format!("{:.4}, {:.4}", loc.lat, loc.lon))?;
    }
    if let Some(ref barter) = item.barter_info {
        pretty_kv(w, "Barter", barter)?;
    }
    if item.delivery {
        pretty_kv(w, "Delivery", "yes")?;
    }
    if item.is_new {
        pretty_kv(w, "Condition", "new")?;
    }
    pretty_kv(w, "Author", &item.user)?;
    pretty_kv(w, "Posted", format_ts(item.ts))?;
    pretty_kv(w, "Autoclose", format_ts(item.autoclose_at))?;
    if item.edit_count > 0 {
        pretty_kv(w, "Edits", item.edit_count.to_string())?;
    }
    if let Some(ref by) = item.del_by {
        let reason = item.del_reason.as_deref().unwrap_or("no reason given");
        pretty_kv(w, "Deleted", format!("by {by} ({reason})"))?;
    }
    if !item.files.is_empty() {
        pretty_kv(w, "Files", item.files.join(", "))?;
    }
    if !item.md.is_empty() {
        writeln!(w)?;
        writeln!(w, "{}", item.md)?;
    }
    writeln!(w)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A CLI-level failure carrying a stable code.
#[derive(Debug)]
pub struct CliFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl CliFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliFailure {}

/// Error shape printed to stderr.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    /// Stable `E####` code.
    pub error_code: String,
    /// Response class: `NOT_FOUND`, `FORBIDDEN`, `CLIENT_ERROR`, ...
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl CliError {
    fn coded(code: ErrorCode, message: String) -> Self {
        Self {
            message,
            error_code: code.code().to_string(),
            status: code.host_code().to_string(),
            suggestion: code.hint().map(str::to_string),
        }
    }
}

impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        if let Some(market) = err.downcast_ref::<MarketError>() {
            return Self::coded(market.code(), market.to_string());
        }
        if let Some(failure) = err.downcast_ref::<CliFailure>() {
            return Self::coded(failure.code, failure.message.clone());
        }
        if let Some(store) = err.downcast_ref::<rusqlite::Error>() {
            return Self::coded(ErrorCode::for_store(store), format!("{err:#}"));
        }
        Self::coded(ErrorCode::InternalUnexpected, format!("{err:#}"))
    }
}

/// Print a failure to stderr, wrapped in `{"error": ...}` in JSON mode.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            writeln!(out, "error[{}]: {}", error.error_code, error.message)?;
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}
