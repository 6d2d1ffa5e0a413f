//! Error taxonomy for the traceability core.
//!
//! Every operation surfaces one of a small set of inspectable error kinds;
//! nothing is caught-and-ignored. The outbox additionally needs to know
//! whether a flush failure is worth retrying, so each kind carries a
//! terminal/transient classification.

use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unauthenticated,
    InvalidArgument,
    VtiNotFound,
    PermissionDenied,
    ConfigParseError,
    StorageFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Unauthenticated => "E1001",
            Self::InvalidArgument => "E1002",
            Self::VtiNotFound => "E2001",
            Self::PermissionDenied => "E2002",
            Self::ConfigParseError => "E3001",
            Self::StorageFailed => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Unauthenticated => "No verified caller identity",
            Self::InvalidArgument => "Missing or malformed required field",
            Self::VtiNotFound => "VTI or field not found",
            Self::PermissionDenied => "Caller not entitled to act on this VTI",
            Self::ConfigParseError => "Config file parse error",
            Self::StorageFailed => "Event store read/write failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::Unauthenticated => Some("Pass --actor or set LOAM_ACTOR."),
            Self::InvalidArgument => Some("Check the required payload fields for this event type."),
            Self::VtiNotFound => None,
            Self::PermissionDenied => Some("Ask the field owner to grant access."),
            Self::ConfigParseError => Some("Fix syntax in config.toml and retry."),
            Self::StorageFailed => Some("Check disk space and write permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by the recorder, registry, history assembler, and outbox.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// No caller identity was supplied.
    #[error("unauthenticated: no caller identity")]
    Unauthenticated,

    /// A required field is missing or malformed, or the event type is unknown.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced VTI or field does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller is not entitled to act on this field/VTI. Enforced by an
    /// external authorization collaborator; the core only carries the kind.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The config file exists but could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// The underlying store failed.
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Anything else that should never happen in normal operation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TraceError {
    /// The machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthenticated => ErrorCode::Unauthenticated,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::NotFound(_) => ErrorCode::VtiNotFound,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::Config(_) => ErrorCode::ConfigParseError,
            Self::Storage(_) => ErrorCode::StorageFailed,
            Self::Internal(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Whether retrying the same request can ever succeed.
    ///
    /// Terminal errors make the outbox drop the action with a warning;
    /// transient ones leave it queued for the next flush cycle. `NotFound`
    /// is transient: an out-of-order flush may succeed once the VTI's
    /// creating event lands.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated
                | Self::InvalidArgument(_)
                | Self::PermissionDenied(_)
                | Self::Config(_)
        )
    }
}
