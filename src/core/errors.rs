//! TN-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, TnError>;

/// Top-level error type for the telemetry node core.
#[derive(Debug, Error)]
pub enum TnError {
    #[error("[TN-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[TN-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[TN-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[TN-2001] clock is not valid: {details}")]
    ClockInvalid { details: String },

    #[error("[TN-2002] storage unavailable for {path}: {details}")]
    StorageUnavailable { path: PathBuf, details: String },

    #[error("[TN-2003] storage format mismatch in {path}: {details}")]
    StorageFormatMismatch { path: PathBuf, details: String },

    #[error("[TN-3001] transport error delivering sample: {details}")]
    TransportError { details: String },

    #[error("[TN-3002] HTTP error delivering sample: status={status}")]
    HttpError { status: u16 },

    #[error("[TN-3003] timestamp sentinel rejected: {ts_us}")]
    TimestampSentinel { ts_us: u64 },

    #[error("[TN-4001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[TN-4002] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[TN-4900] runtime failure: {details}")]
    Runtime { details: String },
}

impl TnError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "TN-1001",
            Self::MissingConfig { .. } => "TN-1002",
            Self::ConfigParse { .. } => "TN-1003",
            Self::ClockInvalid { .. } => "TN-2001",
            Self::StorageUnavailable { .. } => "TN-2002",
            Self::StorageFormatMismatch { .. } => "TN-2003",
            Self::TransportError { .. } => "TN-3001",
            Self::HttpError { .. } => "TN-3002",
            Self::TimestampSentinel { .. } => "TN-3003",
            Self::Io { .. } => "TN-4001",
            Self::ChannelClosed { .. } => "TN-4002",
            Self::Runtime { .. } => "TN-4900",
        }
    }

    /// Whether retrying might resolve the failure. Per spec.md §7, no error
    /// is fatal to the process — this only informs caller backoff choices.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::StorageUnavailable { .. }
                | Self::TransportError { .. }
                | Self::HttpError { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for TnError {
    fn from(value: serde_json::Error) -> Self {
        Self::ConfigParse {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for TnError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
