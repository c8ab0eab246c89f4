//! Error types for playback and recording sessions.

use std::error::Error;
use std::fmt;

use rewind_core::{CodecError, IdentityError};
use rewind_storage::StorageError;

use crate::config::ConfigError;

/// Errors raised by the sequencer, reconciliation and sessions.
///
/// Soft failures during playback (a missing prefab, a dangling parent,
/// one object failing to apply its state) are logged and skipped; they
/// never surface here.
#[derive(Debug)]
pub enum PlaybackError {
    /// The storage target failed.
    Storage(StorageError),
    /// The identity registry could not produce a unique identity.
    Identity(IdentityError),
    /// Building a snapshot entry failed.
    Codec(CodecError),
    /// The session is not in a state that allows this call.
    InvalidState {
        /// What was attempted and why it was refused.
        reason: String,
    },
    /// Session configuration is invalid.
    Config(ConfigError),
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Identity(e) => write!(f, "identity: {e}"),
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::InvalidState { reason } => write!(f, "invalid state: {reason}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl Error for PlaybackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Identity(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::InvalidState { .. } => None,
        }
    }
}

impl From<StorageError> for PlaybackError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<IdentityError> for PlaybackError {
    fn from(e: IdentityError) -> Self {
        Self::Identity(e)
    }
}

impl From<CodecError> for PlaybackError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<ConfigError> for PlaybackError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Failure reported by a [`ReplayBehaviour`](crate::behaviour::ReplayBehaviour)
/// callback. The session logs it and carries on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BehaviourError {
    message: String,
}

impl BehaviourError {
    /// An error with a description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BehaviourError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for BehaviourError {}
