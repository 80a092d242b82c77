//! Error types for sdb operations.

use thiserror::Error;

/// Result type alias using [`SdbError`].
pub type Result<T> = std::result::Result<T, SdbError>;

/// Errors that can occur while resolving profiles or talking to a backend.
///
/// Absence of a secret is not an error: `get` and `delete` report it with
/// `None` and `false`. Errors are reserved for configuration problems and
/// backend failures.
#[derive(Debug, Error)]
pub enum SdbError {
    /// A required field is missing from the connection profile.
    #[error("No key {0} in the profile")]
    MissingProfileKey(String),

    /// A profile field is present but unusable.
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    /// The URI names a profile that is not configured.
    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    /// The profile names a driver that is not registered.
    #[error("unknown driver: {0} (did you enable the '{0}' feature flag?)")]
    UnknownDriver(String),

    /// The sdb URI could not be parsed.
    #[error("invalid sdb uri: {0}")]
    InvalidUri(String),

    /// Secret name failed validation.
    #[error("invalid secret name: {0}")]
    InvalidSecretName(String),

    /// Secret or endpoint was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend rejected the credentials or the token.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Session has expired and must be re-established.
    #[error("session expired")]
    SessionExpired,

    /// Permission denied for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Backend answered with an unexpected HTTP status.
    #[error("backend returned {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The request never produced a response.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Backend operation failed with context.
    #[error("{backend}: {operation} {key}: {source}")]
    BackendOperation {
        /// Backend name
        backend: String,
        /// Operation name (get, set, delete, ...)
        operation: String,
        /// Secret name
        key: String,
        /// Underlying error
        #[source]
        source: Box<SdbError>,
    },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML profile file could not be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SdbError {
    /// Wraps an error with the backend, operation and key that produced it.
    ///
    /// # Example
    ///
    /// ```
    /// use barbican_sdb::SdbError;
    ///
    /// let err = SdbError::NotAuthenticated;
    /// let wrapped = SdbError::backend_op("barbican", "get", "user1", err);
    ///
    /// assert_eq!(wrapped.to_string(), "barbican: get user1: not authenticated");
    /// ```
    pub fn backend_op(
        backend: impl Into<String>,
        operation: impl Into<String>,
        key: impl Into<String>,
        err: SdbError,
    ) -> Self {
        Self::BackendOperation {
            backend: backend.into(),
            operation: operation.into(),
            key: key.into(),
            source: Box::new(err),
        }
    }

    /// Whether the backend rejected the session, so that a fresh login
    /// may succeed where the current token failed.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::NotAuthenticated | Self::SessionExpired => true,
            Self::BackendOperation { source, .. } => source.is_auth_failure(),
            _ => false,
        }
    }
}
