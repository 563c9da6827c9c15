//! Error types for the HUD engine.
//!
//! Nothing in the engine propagates an error to the UI layer: every failure
//! is classified into one of the [`ErrorCode`] categories and folded into
//! observable state (connection status, the bounded error list, or a `None`
//! cached-data field). [`HudError`] is the internal currency between the
//! engine's components.

use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`HudError`].
pub type Result<T> = std::result::Result<T, HudError>;

/// Classification codes surfaced to the UI alongside error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A stream line was not a decodable event
    EventParseFailed,
    /// Event decoded but its schema version is newer than this build knows
    SchemaVersionMismatch,
    /// Connection-level I/O failure on the event stream
    StreamIoError,
    /// Transcript file missing or unreadable
    TranscriptReadError,
    /// A cached file reader failed to read or parse its file
    ConfigReadError,
}

impl ErrorCode {
    /// Wire/display name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventParseFailed => "event_parse_failed",
            Self::SchemaVersionMismatch => "schema_version_mismatch",
            Self::StreamIoError => "stream_io_error",
            Self::TranscriptReadError => "transcript_read_error",
            Self::ConfigReadError => "config_read_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for all HUD engine operations.
#[derive(Debug, Error)]
pub enum HudError {
    /// A stream line failed to decode into an event
    #[error("event parse failed: {message}")]
    EventParse { message: String },

    /// Event carried a schema version newer than this build supports
    #[error("event schema version {found} is newer than supported {supported}")]
    SchemaVersion { found: u32, supported: u32 },

    /// I/O failure on the event stream
    #[error("stream I/O error on {path}")]
    StreamIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transcript file could not be read
    #[error("transcript read failed: {path}: {message}")]
    TranscriptRead { path: PathBuf, message: String },

    /// A cached file reader could not read or parse its file
    #[error("config read failed: {path}: {message}")]
    ConfigRead { path: PathBuf, message: String },

    /// Directory creation failed (logging setup)
    #[error("failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File watcher initialization failed
    #[error("failed to initialize file watcher: {message}")]
    WatcherInit { message: String },

    /// Internal error (bug in the engine)
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl HudError {
    /// Create an event parse error.
    pub fn event_parse(message: impl Into<String>) -> Self {
        Self::EventParse {
            message: message.into(),
        }
    }

    /// Create a stream I/O error.
    pub fn stream_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StreamIo {
            path: path.into(),
            source,
        }
    }

    /// Create a transcript read error.
    pub fn transcript_read(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::TranscriptRead {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a config read error.
    pub fn config_read(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigRead {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The taxonomy code this error surfaces under, if it is user-visible.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::EventParse { .. } => Some(ErrorCode::EventParseFailed),
            Self::SchemaVersion { .. } => Some(ErrorCode::SchemaVersionMismatch),
            Self::StreamIo { .. } => Some(ErrorCode::StreamIoError),
            Self::TranscriptRead { .. } => Some(ErrorCode::TranscriptReadError),
            Self::ConfigRead { .. } => Some(ErrorCode::ConfigReadError),
            _ => None,
        }
    }

    /// Returns true if the failure leaves prior state usable (retried later).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EventParse { .. }
                | Self::SchemaVersion { .. }
                | Self::TranscriptRead { .. }
                | Self::ConfigRead { .. }
        )
    }
}
