use anyhow::{Context as _, Result};
use clap::Args;
use market_core::db::{self, STORE_DIR};
use serde::Serialize;
use std::path::Path;

use crate::context::store_path;
use crate::output::{OutputMode, pretty_kv, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the config template even if `.market/` already exists.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[items]\n\
    expire_days = 30\n\
    title_min_length = 10\n\
    title_max_length = 200\n\
    price_min = 1.0\n\
    \n\
    [history]\n\
    grace_period_secs = 300\n\
    \n\
    [currency]\n\
    reference = \"USD\"\n\
    \n\
    [jobs]\n\
    chunk_size = 100\n\
    \n\
    [drafts]\n\
    ttl_days = 7\n";

const GITIGNORE: &str = "market.db\nmarket.db-wal\nmarket.db-shm\n";

#[derive(Debug, Serialize)]
struct InitReport {
    store: String,
    config_written: bool,
}

/// Execute `mkt init`:
///
/// ```text
/// .market/
///   config.toml   (project config template)
///   .gitignore    (database files)
///   market.db     (SQLite store, migrated)
/// ```
///
/// # Errors
///
/// Returns an error if `.market/` already exists and `--force` is not set,
/// or if any filesystem or store operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let market_dir = project_root.join(STORE_DIR);
    if market_dir.exists() && !args.force {
        anyhow::bail!(".market/ already exists. Use `mkt init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&market_dir)
        .with_context(|| format!("Failed to create {}", market_dir.display()))?;

    let config_path = market_dir.join("config.toml");
    let config_written = args.force || !config_path.exists();
    if config_written {
        std::fs::write(&config_path, CONFIG_TOML)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }
    std::fs::write(market_dir.join(".gitignore"), GITIGNORE).context("Failed to write .gitignore")?;

    let path = store_path(project_root);
    db::open_store(&path)?;
    tracing::info!(store = %path.display(), "market store initialized");

    let report = InitReport {
        store: path.display().to_string(),
        config_written,
    };
    render(output, &report, |r, w| {
        pretty_kv(w, "Store", &r.store)?;
        pretty_kv(w, "Config", if r.config_written { "written" } else { "kept" })
    })
}
