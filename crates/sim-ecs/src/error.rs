//! Shared error taxonomy for the simulation-hosting platform.
//!
//! Every crate in the workspace maps its failures onto [`ErrorKind`] so that
//! the HTTP surface (`bins/node-agentd`, `bins/control-planed`) can translate
//! any error into a uniform envelope and status code without each binary
//! re-deriving the mapping.

use thiserror::Error;

/// The closed set of error kinds surfaced by the platform, with their HTTP
/// status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad username/password at login.
    InvalidCredentials,
    /// User account disabled.
    UserDisabled,
    /// Bearer token missing, malformed, tampered, or expired.
    InvalidToken,
    /// Caller authenticated but lacks the endpoint's required scope.
    Forbidden,
    /// Module attempted to access a component it has no grant for.
    PermissionDenied,
    /// Referenced resource does not exist.
    NotFound,
    /// Operation is illegal in the current lifecycle state.
    InvalidState,
    /// Malformed input: schema mismatch, missing field, cyclic role, etc.
    Validation,
    /// Uniqueness violation: duplicate name, colliding command, etc.
    Conflict,
    /// A bounded queue rejected an enqueue because it is full.
    QueueFull,
    /// A rate limiter rejected the request.
    RateLimited,
    /// An operation exceeded its deadline.
    Timeout,
    /// The proxy subsystem is administratively disabled.
    ProxyDisabled,
    /// The proxy reached the upstream but the upstream call failed.
    ProxyUpstream,
    /// A dependent subsystem (e.g. persistence) is not configured/available.
    UpstreamUnavailable,
    /// Anything else: a captured panic, an invariant violation.
    Internal,
}

impl ErrorKind {
    /// The HTTP status code this kind maps to.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidCredentials | Self::InvalidToken => 401,
            Self::UserDisabled | Self::Forbidden | Self::PermissionDenied => 403,
            Self::NotFound => 404,
            Self::InvalidState | Self::Conflict => 409,
            Self::Validation => 400,
            Self::QueueFull | Self::RateLimited => 429,
            Self::Timeout => 504,
            Self::ProxyDisabled | Self::UpstreamUnavailable => 503,
            Self::ProxyUpstream => 502,
            Self::Internal => 500,
        }
    }

    /// The machine-readable name used in the JSON error envelope.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::UserDisabled => "USER_DISABLED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Forbidden => "FORBIDDEN",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidState => "INVALID_STATE",
            Self::Validation => "VALIDATION",
            Self::Conflict => "CONFLICT",
            Self::QueueFull => "QUEUE_FULL",
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::ProxyDisabled => "PROXY_DISABLED",
            Self::ProxyUpstream => "PROXY_UPSTREAM",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }
}

/// A uniform, user-facing platform error: an [`ErrorKind`] plus a message.
#[derive(Debug, Error, Clone)]
#[error("{kind:?}: {message}")]
pub struct PlatformError {
    /// The error kind, used to derive HTTP status and the envelope `code`.
    pub kind: ErrorKind,
    /// Human-readable detail, safe to return to the caller.
    pub message: String,
}

impl PlatformError {
    /// Build a new platform error from a kind and a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`ErrorKind::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for [`ErrorKind::InvalidState`].
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    /// Shorthand for [`ErrorKind::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Shorthand for [`ErrorKind::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Shorthand for [`ErrorKind::PermissionDenied`].
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }
}

/// Convenience result alias used throughout the platform crates.
pub type PlatformResult<T> = Result<T, PlatformError>;
