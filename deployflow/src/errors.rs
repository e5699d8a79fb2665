//! Error types for deployflow.
//!
//! Errors are split by the collaborator that produced them. Each one can be
//! classified as transient or permanent, and that classification decides
//! whether the poller keeps observing and whether a retry policy tries again.

use std::time::Duration;
use thiserror::Error;

/// Whether an error may go away on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The operation may succeed if attempted again later.
    Transient,
    /// Retrying cannot help; abort immediately.
    Permanent,
}

impl ErrorClass {
    /// Returns true for [`ErrorClass::Transient`].
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// The main error type for deployflow operations.
#[derive(Debug, Clone, Error)]
pub enum DeployflowError {
    /// The object store rejected or failed a request.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A resource descriptor was missing a required identifier.
    #[error("{0}")]
    Descriptor(#[from] DescriptorError),

    /// The verification API call failed.
    #[error("{0}")]
    Verification(#[from] VerificationError),

    /// Configuration could not be loaded or was invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A sequencer or stage definition was invalid.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A write-once context value was written twice.
    #[error("{0}")]
    DataConflict(#[from] DataConflictError),

    /// The run was cancelled.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl DeployflowError {
    /// Classifies the error for retry and polling decisions.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Store(e) => e.class(),
            Self::Verification(e) => e.class(),
            Self::Descriptor(_)
            | Self::Config(_)
            | Self::Validation(_)
            | Self::DataConflict(_)
            | Self::Cancelled(_) => ErrorClass::Permanent,
        }
    }

    /// Returns true if the error is transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class().is_transient()
    }
}

/// Errors raised by an [`ObjectStore`](crate::store::ObjectStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The object does not exist (yet).
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Object kind.
        kind: String,
        /// Namespaced name of the object.
        name: String,
    },

    /// The API server could not be reached or is not serving the resource yet.
    #[error("object store unavailable: {0}")]
    Unavailable(String),

    /// An object with the same name already exists.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Object kind.
        kind: String,
        /// Namespaced name of the object.
        name: String,
    },

    /// The request was refused (invalid object, forbidden).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The returned object could not be decoded.
    #[error("malformed object: {0}")]
    Malformed(String),

    /// The underlying command failed for an unrecognised reason.
    #[error("command failed: {0}")]
    Command(String),
}

impl StoreError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Classifies the error.
    ///
    /// Unknown command failures count as transient so a poll keeps observing.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } | Self::Unavailable(_) | Self::Command(_) => {
                ErrorClass::Transient
            }
            Self::AlreadyExists { .. } | Self::Rejected(_) | Self::Malformed(_) => {
                ErrorClass::Permanent
            }
        }
    }
}

/// Raised when a descriptor is missing a required identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// A required field was not set or was blank.
    #[error("{kind} descriptor is missing required field '{field}'")]
    MissingField {
        /// The object kind being described.
        kind: &'static str,
        /// The missing field.
        field: &'static str,
    },

    /// Fields were set that contradict each other.
    #[error("{kind} descriptor is inconsistent: {reason}")]
    Inconsistent {
        /// The object kind being described.
        kind: &'static str,
        /// Why the combination is rejected.
        reason: String,
    },
}

/// Errors from the verification API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// The service could not be reached.
    #[error("verification request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("verification rejected with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The client was misconfigured.
    #[error("invalid verification request: {0}")]
    InvalidRequest(String),
}

impl VerificationError {
    /// Classifies the error. Server-side failures are transient.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Transport(_) => ErrorClass::Transient,
            Self::Status { status, .. } if *status >= 500 => ErrorClass::Transient,
            Self::Status { .. } | Self::InvalidRequest(_) => ErrorClass::Permanent,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config '{path}': {reason}")]
    Read {
        /// Path of the file.
        path: String,
        /// IO error message.
        reason: String,
    },

    /// The config file could not be parsed.
    #[error("failed to parse config '{path}': {reason}")]
    Parse {
        /// Path of the file.
        path: String,
        /// Parser error message.
        reason: String,
    },

    /// A value is out of range.
    #[error("invalid config value for '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Raised when a sequencer or stage definition is invalid.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Raised when writing to an existing key in a write-once bag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("data conflict: key '{key}' already exists")]
pub struct DataConflictError {
    /// The conflicting key.
    pub key: String,
}

impl DataConflictError {
    /// Creates a new data conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Why a stage did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageFailure {
    /// The stage action failed, possibly after retries.
    #[error("action failed after {attempts} attempt(s): {error}")]
    Action {
        /// Number of action invocations made.
        attempts: usize,
        /// The last error observed.
        error: String,
    },

    /// The stage did not finish within its timeout.
    #[error("timed out after {waited:?}{}", last_observation.as_ref().map(|o| format!(" (last observation: {o})")).unwrap_or_default())]
    TimedOut {
        /// How long the stage waited.
        waited: Duration,
        /// The last value or error seen, for diagnostics.
        last_observation: Option<String>,
    },

    /// A non-retryable error occurred while observing readiness.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// The run was cancelled or its global deadline passed.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl StageFailure {
    /// Returns a short machine-readable label for the failure.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Action { .. } => "action",
            Self::TimedOut { .. } => "timed_out",
            Self::Permanent(_) => "permanent",
            Self::Cancelled(_) => "cancelled",
        }
    }

    /// Returns true for [`StageFailure::TimedOut`].
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}
