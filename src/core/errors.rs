//! WG-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, WgError>;

/// Top-level error type for wakeguard.
#[derive(Debug, Error)]
pub enum WgError {
    #[error("[WG-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[WG-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[WG-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[WG-2001] signal source unavailable ({source_name}): {details}")]
    SourceUnavailable {
        source_name: String,
        details: String,
    },

    #[error("[WG-2002] transient signal read failure ({source_name}): {details}")]
    SignalRead {
        source_name: String,
        details: String,
    },

    #[error("[WG-2003] malformed observation at line {line}: {details}")]
    SignalFormat { line: usize, details: String },

    #[error("[WG-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[WG-3001] alarm playback failure: {details}")]
    Playback { details: String },

    #[error("[WG-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[WG-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[WG-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl WgError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "WG-1001",
            Self::MissingConfig { .. } => "WG-1002",
            Self::ConfigParse { .. } => "WG-1003",
            Self::SourceUnavailable { .. } => "WG-2001",
            Self::SignalRead { .. } => "WG-2002",
            Self::SignalFormat { .. } => "WG-2003",
            Self::Serialization { .. } => "WG-2101",
            Self::Playback { .. } => "WG-3001",
            Self::Io { .. } => "WG-3002",
            Self::ChannelClosed { .. } => "WG-3003",
            Self::Runtime { .. } => "WG-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// The monitor loop treats retryable read errors as skipped ticks and
    /// every other error as fatal to the loop.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SignalRead { .. }
                | Self::SignalFormat { .. }
                | Self::Playback { .. }
                | Self::Io { .. }
                | Self::ChannelClosed { .. }
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

impl From<serde_json::Error> for WgError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for WgError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
