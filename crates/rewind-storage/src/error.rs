//! Error types for storage targets.

use std::error::Error;
use std::fmt;
use std::io;
use std::time::Duration;

use rewind_core::CodecError;

use crate::config::ConfigError;

/// Errors raised by storage targets and the file worker.
#[derive(Debug)]
pub enum StorageError {
    /// Encoding or decoding recorded data failed.
    Codec(CodecError),
    /// A file operation failed.
    Io(io::Error),
    /// The call is not allowed in the target's current state (channel
    /// changes while recording, removing the last channel, ...).
    InvalidOperation {
        /// What was attempted and why it was refused.
        reason: String,
    },
    /// The target was not prepared for this operation (recording before
    /// `PrepareWrite`, reading a file before `PrepareRead`).
    NotPrepared {
        /// The operation that was called.
        operation: &'static str,
    },
    /// The file worker has stopped; no further tasks can run.
    WorkerStopped,
    /// A blocking task did not finish within the configured timeout.
    TaskTimeout {
        /// Name of the task.
        task: &'static str,
        /// How long the caller waited.
        waited: Duration,
    },
    /// The chunk table has no entry for this id.
    ChunkNotFound {
        /// The requested chunk id.
        chunk_id: u32,
    },
    /// Target configuration is invalid.
    Config(ConfigError),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidOperation { reason } => write!(f, "invalid operation: {reason}"),
            Self::NotPrepared { operation } => {
                write!(f, "target not prepared for {operation}")
            }
            Self::WorkerStopped => write!(f, "file worker has stopped"),
            Self::TaskTimeout { task, waited } => {
                write!(f, "task {task} did not complete within {waited:?}")
            }
            Self::ChunkNotFound { chunk_id } => {
                write!(f, "chunk {chunk_id} is not in the chunk table")
            }
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Codec(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for StorageError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ConfigError> for StorageError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
