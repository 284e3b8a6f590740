//! Error types for talkback

use std::io;
use thiserror::Error;

/// Main error type for talkback
#[derive(Error, Debug)]
pub enum TalkbackError {
    /// Capture or synthesis capability is missing entirely
    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Transient device trouble (no speech, missing microphone, ...)
    #[error("Device error: {0}")]
    Device(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification used when surfacing errors to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    CapabilityUnavailable,
    PermissionDenied,
    TransientDevice,
    Network,
    DecodeFailure,
    Internal,
}

impl TalkbackError {
    /// Which bucket of the error taxonomy this error belongs to
    pub fn class(&self) -> ErrorClass {
        match self {
            TalkbackError::NotSupported(_) => ErrorClass::CapabilityUnavailable,
            TalkbackError::PermissionDenied(_) => ErrorClass::PermissionDenied,
            TalkbackError::Device(_) => ErrorClass::TransientDevice,
            TalkbackError::Network(_) => ErrorClass::Network,
            TalkbackError::Decode(_) => ErrorClass::DecodeFailure,
            _ => ErrorClass::Internal,
        }
    }

    /// Text forwarded to the UI in `speech_error` / `tts_error`
    ///
    /// Taxonomy variants carry a message that is already user-facing.
    pub fn user_message(&self) -> String {
        match self {
            TalkbackError::NotSupported(msg)
            | TalkbackError::PermissionDenied(msg)
            | TalkbackError::Device(msg)
            | TalkbackError::Network(msg)
            | TalkbackError::Decode(msg)
            | TalkbackError::Other(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for talkback operations
pub type Result<T> = std::result::Result<T, TalkbackError>;

impl From<String> for TalkbackError {
    fn from(s: String) -> Self {
        TalkbackError::Other(s)
    }
}

impl From<&str> for TalkbackError {
    fn from(s: &str) -> Self {
        TalkbackError::Other(s.to_string())
    }
}
