use crate::types::IdentityId;
use std::fmt;
use thiserror::Error;

/// Back-end storage error type.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Security subsystem that raised a [`Error::Security`] failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// Identity lookup and credential checks.
    Authentication,
    /// Grant storage and permission checks.
    Authorization,
    /// Repository-level security (asset and report storage).
    Repository,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Repository => "repository",
        })
    }
}

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Back-end store error wrapper.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
    /// Invalid identifier input.
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// Invalid resource path or type.
    #[error("invalid resource: {0}")]
    InvalidResource(String),
    /// The provider does not implement the requested operation.
    #[error("unsupported operation: {operation}")]
    Unsupported { operation: &'static str },
    /// Generic security failure.
    #[error("{subsystem} security error: {message}")]
    Security { subsystem: Subsystem, message: String },
    /// The user must reset their password before authenticating again.
    #[error("password reset required for {user}")]
    PasswordReset { user: IdentityId },
    /// Role or group inheritance cycle detected.
    #[error("inheritance cycle detected at {identity}")]
    RoleCycleDetected { identity: IdentityId },
    /// Role or group inheritance depth exceeded.
    #[error("inheritance depth exceeded at {identity}; max depth {max_depth}")]
    RoleDepthExceeded {
        identity: IdentityId,
        max_depth: usize,
    },
    /// No factory registered under the configured name.
    #[error("no {kind} registered as {name:?}")]
    UnknownImplementation { kind: &'static str, name: String },
    /// A provider was dropped while something still referenced it.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(&'static str),
    /// Configuration document could not be decoded.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Creates an authentication failure.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Security {
            subsystem: Subsystem::Authentication,
            message: message.into(),
        }
    }

    /// Creates an authorization failure.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Security {
            subsystem: Subsystem::Authorization,
            message: message.into(),
        }
    }

    /// Creates a repository security failure.
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Security {
            subsystem: Subsystem::Repository,
            message: message.into(),
        }
    }

    /// Returns true when the provider does not support the operation.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Returns true when the caller must force a password reset.
    pub fn is_password_reset(&self) -> bool {
        matches!(self, Self::PasswordReset { .. })
    }

    /// Returns the subsystem for security failures.
    pub fn subsystem(&self) -> Option<Subsystem> {
        match self {
            Self::Security { subsystem, .. } => Some(*subsystem),
            _ => None,
        }
    }
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}
