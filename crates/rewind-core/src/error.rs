//! Error types for the Rewind core.
//!
//! Split by subsystem: [`CodecError`] covers everything that reads or
//! writes bytes (state buffers, snapshot framing, file records) and
//! [`IdentityError`] covers the identity registry.

use std::error::Error;
use std::fmt;
use std::io;

/// Errors raised while encoding or decoding binary data.
#[derive(Debug)]
pub enum CodecError {
    /// A read asked for more bytes than remain after the cursor.
    ReadPastEnd {
        /// Bytes the read needed.
        requested: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },
    /// A length-prefixed string was not valid UTF-8.
    InvalidUtf8,
    /// A payload does not fit in its length prefix.
    PayloadTooLarge {
        /// Length of the payload in bytes.
        len: usize,
        /// Largest length the prefix can carry.
        max: usize,
    },
    /// A file or blob did not start with the expected magic number.
    InvalidMagic {
        /// The value found where the magic number should be.
        found: i32,
    },
    /// Structurally invalid data (negative counts, bad flags, ...).
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// An I/O error from an underlying reader or writer.
    Io(io::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadPastEnd {
                requested,
                remaining,
            } => write!(
                f,
                "read past end of buffer: requested {requested} bytes, {remaining} remaining"
            ),
            Self::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload of {len} bytes exceeds the limit of {max}")
            }
            Self::InvalidMagic { found } => {
                write!(f, "invalid magic number {found:#06x}")
            }
            Self::Malformed { detail } => write!(f, "malformed data: {detail}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors from the identity registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityError {
    /// No unused identity was found within the retry budget. The pool
    /// is exhausted or the registry is misconfigured; the operation
    /// that needed the identity must be aborted.
    Exhausted {
        /// Number of random draws attempted.
        attempts: u32,
    },
    /// A specific identity was reserved while another live object
    /// already holds it.
    AlreadyRegistered {
        /// The contested identity value.
        identity: i16,
    },
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { attempts } => write!(
                f,
                "could not generate a unique object identity after {attempts} attempts"
            ),
            Self::AlreadyRegistered { identity } => {
                write!(f, "object identity {identity} is already registered")
            }
        }
    }
}

impl Error for IdentityError {}
