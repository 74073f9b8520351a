use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use crate::markup::MarkupOptions;
use crate::model::actor::{Permissions, Role};

/// Project-level settings read from `.market/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(default)]
    pub items: ItemsConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub sections: SectionsConfig,
    #[serde(default)]
    pub currency: CurrencyConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub drafts: DraftsConfig,
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsConfig {
    /// Listings older than this can no longer be reopened.
    #[serde(default = "default_expire_days")]
    pub expire_days: i64,
    #[serde(default = "default_title_min_length")]
    pub title_min_length: usize,
    #[serde(default = "default_title_max_length")]
    pub title_max_length: usize,
    /// Minimum offer price, in the listing's own currency.
    #[serde(default = "default_price_min")]
    pub price_min: f64,
}

impl Default for ItemsConfig {
    fn default() -> Self {
        Self {
            expire_days: default_expire_days(),
            title_min_length: default_title_min_length(),
            title_max_length: default_title_max_length(),
            price_min: default_price_min(),
        }
    }
}

impl ItemsConfig {
    #[must_use]
    pub const fn expire_us(&self) -> i64 {
        self.expire_days * crate::DAY_US
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

impl HistoryConfig {
    #[must_use]
    pub const fn grace_us(&self) -> i64 {
        self.grace_period_secs * 1_000_000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionsConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for SectionsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl SectionsConfig {
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyConfig {
    /// Currency that `price_base` is expressed in.
    #[serde(default = "default_reference_currency")]
    pub reference: String,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            reference: default_reference_currency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: i64,
    /// Jobs failing this many times are dropped from the queue.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            retry_delay_secs: default_retry_delay_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftsConfig {
    #[serde(default = "default_draft_ttl_days")]
    pub ttl_days: i64,
}

impl Default for DraftsConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_draft_ttl_days(),
        }
    }
}

/// Settings attached to one role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub markup: MarkupOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesConfig {
    #[serde(default)]
    pub user: RoleConfig,
    #[serde(default = "default_moderator")]
    pub moderator: RoleConfig,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            user: RoleConfig::default(),
            moderator: default_moderator(),
        }
    }
}

impl RolesConfig {
    /// Permission set for `role`. Background tasks get every flag.
    #[must_use]
    pub const fn permissions(&self, role: Role) -> Permissions {
        match role {
            Role::User => self.user.permissions,
            Role::Moderator => self.moderator.permissions,
            Role::Task => Permissions::all(),
        }
    }

    #[must_use]
    pub fn markup(&self, role: Role) -> MarkupOptions {
        match role {
            Role::User => self.user.markup.clone(),
            Role::Moderator | Role::Task => self.moderator.markup.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: MarketConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Parse the TOML file at `path`, or `T::default()` when it does not exist.
fn read_toml_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            toml::from_str(&content).with_context(|| format!("parse {}", path.display()))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

/// Load `.market/config.toml` under `root`; a missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(root: &Path) -> Result<MarketConfig> {
    read_toml_or_default(&root.join(".market").join("config.toml"))
}

/// Load `market/config.toml` from the platform config directory.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    dirs::config_dir().map_or_else(
        || Ok(UserConfig::default()),
        |dir| read_toml_or_default(&dir.join("market").join("config.toml")),
    )
}

/// Merge project config, user config and output flags.
///
/// # Errors
///
/// Propagates config load failures.
pub fn resolve_config(root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(root)?;
    let user = load_user_config()?;
    let resolved_output = resolve_output(
        cli_json,
        env::var("MARKET_FORMAT").ok().as_deref(),
        user.output.as_deref(),
        std::io::stdout().is_terminal(),
    );
    tracing::debug!(output = resolved_output, "config resolved");

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output: resolved_output.to_string(),
    })
}

/// Canonical output mode name for a user-supplied one.
fn output_mode_name(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some("json"),
        "pretty" | "human" => Some("pretty"),
        "text" | "table" | "plain" => Some("text"),
        _ => None,
    }
}

fn resolve_output(
    cli_json: bool,
    env_format: Option<&str>,
    user_output: Option<&str>,
    is_tty: bool,
) -> &'static str {
    if cli_json {
        return "json";
    }
    [env_format, user_output]
        .into_iter()
        .flatten()
        .find_map(output_mode_name)
        .unwrap_or(if is_tty { "pretty" } else { "text" })
}

const fn default_expire_days() -> i64 {
    30
}

const fn default_title_min_length() -> usize {
    10
}

const fn default_title_max_length() -> usize {
    200
}

const fn default_price_min() -> f64 {
    1.0
}

const fn default_grace_period_secs() -> i64 {
    300
}

const fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_reference_currency() -> String {
    "USD".to_string()
}

const fn default_chunk_size() -> usize {
    100
}

const fn default_retry_delay_secs() -> i64 {
    60
}

const fn default_max_attempts() -> i64 {
    5
}

const fn default_draft_ttl_days() -> i64 {
    7
}

fn default_moderator() -> RoleConfig {
    RoleConfig {
        permissions: Permissions {
            delete_hard: false,
            ..Permissions::all()
        },
        markup: MarkupOptions::full(),
    }
}
