//! Core types for the Rewind state recording and replay engine.
//!
//! This is the leaf crate of the workspace. It defines the data model
//! every other crate moves around, plus its binary encoding:
//!
//! - [`ObjectIdentity`] and [`IdentityRegistry`]: compact 16-bit handles
//!   that correlate an object across snapshots
//! - [`StateBuffer`]: the opaque per-object payload
//! - [`Snapshot`]: the whole observed world at one instant
//! - [`InitialData`] / [`InitialDataBuffer`]: spawn facts used to
//!   recreate objects that appeared mid-recording
//! - [`codec`] and [`compress`]: little-endian primitives and the gzip
//!   envelope

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod codec;
pub mod compress;
pub mod error;
pub mod id;
pub mod initial;
pub mod snapshot;

pub use buffer::StateBuffer;
pub use compress::Compression;
pub use error::{CodecError, IdentityError};
pub use id::{IdentityRegistry, ObjectIdentity};
pub use initial::{InitialData, InitialDataBuffer, InitialDataFlags, SubIdentities};
pub use snapshot::Snapshot;
