//! Error types for the load testing engine.
//!
//! Defines [`LoadTestError`] for fatal, pre-run configuration errors and
//! [`ErrorKind`] for per-iteration request failures that are recorded in
//! metrics rather than propagated.

/// Errors that occur during load test configuration parsing, validation, or file I/O.
///
/// Every variant is fatal and raised before any virtual user is spawned.
#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    /// TOML parse failure -- the config file contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// Semantic validation failure -- the config parsed successfully but
    /// contains invalid values (e.g., empty stage list, zero-duration stage).
    #[error("Config validation error: {message}")]
    ConfigValidation { message: String },

    /// File I/O failure -- the config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// A `${NAME}` placeholder in the URL template has no value.
    #[error("Unresolved URL template parameter '{name}' (pass --param {name}=VALUE or set the {name} environment variable)")]
    UnresolvedParam { name: String },

    /// The rendered URL template is not a valid absolute http(s) URL.
    #[error("Invalid target URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

impl LoadTestError {
    /// Shorthand for a [`LoadTestError::ConfigValidation`] error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }
}

/// Classification of a failed iteration.
///
/// Network failures never abort the run; each one is counted under its
/// [`ErrorKind::category`] by the metrics collector.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request exceeded the configured per-request timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS resolution, TCP connect, reset, TLS handshake).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The request target could not be built from the URL template.
    #[error("Invalid request target: {message}")]
    InvalidTarget { message: String },
}

impl ErrorKind {
    /// Returns `true` for transport-level failures (timeout or connection).
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection { .. })
    }

    /// Returns the error category as a static string for metrics classification.
    ///
    /// Categories: `"timeout"`, `"connection"`, `"invalid_target"`.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::InvalidTarget { .. } => "invalid_target",
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`ErrorKind`] variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::InvalidTarget {
                message: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}
