//! Error types and result alias for gantry.
//!
//! Every failure in the resolution-and-caching core is resolved into one of
//! these variants and handed back to the caller; nothing is retried
//! internally. The HTTP boundary maps variants to status codes.

use std::time::Duration;

/// The result type used throughout gantry.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving and serving artifacts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A target, run, artifact, or file is absent upstream or in the archive.
    #[error("not found: {message}")]
    NotFound {
        /// Description of what was missing.
        message: String,
    },

    /// The caller-supplied run reference is neither `latest` nor a run id.
    #[error("malformed run reference: {reference:?}")]
    MalformedRunReference {
        /// The reference as received.
        reference: String,
    },

    /// The per-target gate was not acquired within the configured deadline.
    #[error("target '{target}' is busy: gate not acquired within {waited:?}")]
    GateTimeout {
        /// The target whose gate was contended.
        target: String,
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// The upstream API failed in a way other than "not found".
    #[error("upstream error: {message}")]
    Upstream {
        /// Description of the upstream failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An archive entry would be written outside the extraction directory.
    #[error("archive entry escapes the extraction directory: {entry:?}")]
    SecurityViolation {
        /// The offending entry path as declared in the archive.
        entry: String,
    },

    /// Local I/O failed or the downloaded archive is corrupt.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a not-found error with the given message.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates an upstream error with the given message.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an upstream error with a source cause.
    #[must_use]
    pub fn upstream_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Upstream {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source cause.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
