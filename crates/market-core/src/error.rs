use rusqlite::ErrorCode as SqliteCode;
use std::fmt;

/// Machine-readable error codes for scripts and moderation tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    NotFound,
    Forbidden,
    ClientError,
    BadRequest,
    Redirect,
    CorruptStore,
    LockContention,
    FtsIndexMissing,
    InternalUnexpected,
}

impl ErrorCode {
    /// `E####` identifier; never reused once published.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::NotFound => "E2001",
            Self::Forbidden => "E2002",
            Self::ClientError => "E2003",
            Self::BadRequest => "E2004",
            Self::Redirect => "E2005",
            Self::CorruptStore => "E3001",
            Self::LockContention => "E5002",
            Self::FtsIndexMissing => "E6001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Response class understood by forum front-ends.
    #[must_use]
    pub const fn host_code(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::ClientError => "CLIENT_ERROR",
            Self::BadRequest => "BAD_REQUEST",
            Self::Redirect => "REDIRECT",
            Self::NotInitialized
            | Self::ConfigParseError
            | Self::CorruptStore
            | Self::LockContention
            | Self::FtsIndexMissing
            | Self::InternalUnexpected => "INTERNAL",
        }
    }

    /// One-line description of the failure class.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Market store not initialized",
            Self::ConfigParseError => "Invalid configuration file",
            Self::NotFound => "Not found",
            Self::Forbidden => "Permission denied",
            Self::ClientError => "Request rejected",
            Self::BadRequest => "Operation not possible",
            Self::Redirect => "Resource lives at another address",
            Self::CorruptStore => "Corrupt SQLite store",
            Self::LockContention => "Store busy",
            Self::FtsIndexMissing => "Search index table missing",
            Self::InternalUnexpected => "Unexpected internal failure",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `mkt init` to create the market store."),
            Self::ConfigParseError => Some("Fix syntax in .market/config.toml and retry."),
            Self::NotFound | Self::ClientError | Self::Redirect => None,
            Self::Forbidden => Some("Check the role permissions in .market/config.toml."),
            Self::BadRequest => Some("Pick a section that accepts listings, not a category."),
            Self::CorruptStore => Some("Restore .market/market.db from a backup."),
            Self::LockContention => Some("Retry once the other `mkt` process has finished writing."),
            Self::FtsIndexMissing => Some("Run `mkt jobs reindex` to rebuild the search index."),
            Self::InternalUnexpected => Some("Rerun with MARKET_LOG=debug and include the log in a bug report."),
        }
    }
}

impl ErrorCode {
    /// Classify a SQLite failure. Only busy and corrupt stores get their own
    /// codes; constraint and I/O failures are unexpected.
    #[must_use]
    pub const fn for_store(err: &rusqlite::Error) -> Self {
        let rusqlite::Error::SqliteFailure(failure, _) = err else {
            return Self::InternalUnexpected;
        };
        match failure.code {
            SqliteCode::DatabaseBusy | SqliteCode::DatabaseLocked => Self::LockContention,
            SqliteCode::DatabaseCorrupt | SqliteCode::NotADatabase => Self::CorruptStore,
            _ => Self::InternalUnexpected,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error returned by market operations.
///
/// The first five variants mirror the response classes a forum front-end
/// knows how to render; the rest are infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    /// Missing document, or one the actor is not allowed to see.
    #[error("{what} not found: '{id}'")]
    NotFound { what: &'static str, id: String },

    /// Permission check failed.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Validation failure with a user-facing message.
    #[error("{0}")]
    Client(String),

    /// Structurally impossible operation.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Canonical address correction.
    #[error("moved to {0}")]
    Redirect(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MarketError {
    #[must_use]
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::Client(_) => ErrorCode::ClientError,
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::Redirect(_) => ErrorCode::Redirect,
            Self::Db(err) => ErrorCode::for_store(err),
            Self::Internal(_) => ErrorCode::InternalUnexpected,
        }
    }
}

/// Shorthand for results of market operations.
pub type MarketResult<T> = Result<T, MarketError>;
