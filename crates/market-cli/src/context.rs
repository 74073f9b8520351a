//! Per-invocation state shared by the command handlers.

use anyhow::{Context, Result};
use clap::Args;
use market_core::config::{EffectiveConfig, MarketConfig};
use market_core::db::{self, DB_FILE, STORE_DIR};
use market_core::error::ErrorCode;
use market_core::jobs;
use market_core::model::actor::{Actor, Role};
use market_core::sections::{SectionTree, SectionTreeCache};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::output::{CliFailure, OutputMode};

/// Identity and scheduling flags accepted by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Acting user id.
    #[arg(long, global = true, env = "MARKET_USER")]
    pub user: Option<String>,

    /// Role the user acts under (user, moderator).
    #[arg(long, global = true, env = "MARKET_ROLE")]
    pub role: Option<Role>,

    /// Client address recorded in history.
    #[arg(long, global = true)]
    pub ip: Option<String>,

    /// Treat the acting user as hellbanned.
    #[arg(long, global = true)]
    pub hellbanned: bool,

    /// Leave background jobs queued instead of running them after the command.
    #[arg(long, global = true, env = "MARKET_DEFER_JOBS")]
    pub defer_jobs: bool,

    /// Clock override in microseconds since the epoch.
    #[arg(long, global = true, env = "MARKET_NOW_US", hide = true)]
    pub now: Option<i64>,
}

/// Path of the SQLite store under `root`.
pub fn store_path(root: &Path) -> PathBuf {
    root.join(STORE_DIR).join(DB_FILE)
}

/// An open store plus the resolved actor and settings.
pub struct MarketContext {
    pub root: PathBuf,
    pub conn: Connection,
    pub config: MarketConfig,
    pub actor: Actor,
    pub output: OutputMode,
    pub now: i64,
    defer_jobs: bool,
    sections: SectionTreeCache,
}

impl MarketContext {
    /// Open the store under `root`.
    ///
    /// # Errors
    ///
    /// Fails with `NotInitialized` when `mkt init` has not been run, or if
    /// the store cannot be opened.
    pub fn open(root: &Path, session: &SessionArgs, effective: &EffectiveConfig) -> Result<Self> {
        let path = store_path(root);
        if !path.exists() {
            return Err(CliFailure::new(
                ErrorCode::NotInitialized,
                format!("no market store at {}", path.display()),
            )
            .into());
        }
        let conn = db::open_store(&path)
            .with_context(|| format!("open market store {}", path.display()))?;

        let config = effective.project.clone();
        let role = session.role.unwrap_or(Role::User);
        let mut actor = Actor::new(
            session.user.clone().unwrap_or_default(),
            role,
            config.roles.permissions(role),
        );
        actor.ip.clone_from(&session.ip);
        actor.hellbanned = session.hellbanned;

        let sections = SectionTreeCache::new(config.sections.cache_ttl());
        Ok(Self {
            root: root.to_path_buf(),
            conn,
            output: OutputMode::from_resolved(&effective.resolved_output),
            now: session.now.unwrap_or_else(market_core::now_us),
            defer_jobs: session.defer_jobs,
            actor,
            config,
            sections,
        })
    }

    /// Current section tree, cached for the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree has to be reloaded and the read fails.
    pub fn tree(&self) -> Result<Arc<SectionTree>> {
        self.sections.get(&self.conn)
    }

    pub fn invalidate_sections(&self) {
        self.sections.invalidate();
    }

    /// Mutating commands need a named user.
    ///
    /// # Errors
    ///
    /// Returns a client error when no user was given.
    pub fn require_user(&self) -> Result<()> {
        if self.actor.user.trim().is_empty() {
            return Err(CliFailure::new(
                ErrorCode::ClientError,
                "this command needs an acting user: pass --user or set MARKET_USER",
            )
            .into());
        }
        Ok(())
    }

    /// Run jobs queued by the command unless they were deferred.
    ///
    /// # Errors
    ///
    /// Returns an error if the job queue cannot be read or updated.
    pub fn finish(mut self) -> Result<()> {
        if self.defer_jobs {
            return Ok(());
        }
        let report = jobs::run_pending(&mut self.conn, &self.config, self.now)?;
        if report.failed > 0 || report.dropped > 0 {
            tracing::warn!(
                failed = report.failed,
                dropped = report.dropped,
                "some background jobs did not complete"
            );
        } else if report.succeeded > 0 {
            tracing::debug!(succeeded = report.succeeded, "background jobs complete");
        }
        Ok(())
    }
}
