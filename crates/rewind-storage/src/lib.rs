//! Storage targets for Rewind recordings.
//!
//! A recording is an ordered run of [`Snapshot`](rewind_core::Snapshot)s
//! plus the spawn facts needed to recreate objects that appeared part
//! way through. Every backend implements [`StorageTarget`]:
//!
//! - [`MemoryTarget`]: one in-memory track with an optional rolling
//!   window, exportable as a byte blob
//! - [`MultichannelMemoryTarget`]: several memory tracks, one active
//! - [`FileTarget`]: chunked replay files written and read by a
//!   background worker
//!
//! # Lifecycle
//!
//! ```text
//! PrepareWrite → record_snapshot* → Commit → PrepareRead → restore_snapshot*
//! ```
//!
//! `Commit` rebases every timestamp so the recording starts at zero.
//! `Discard` drops everything and is valid in any state.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod file;
pub mod memory;
pub mod multichannel;
pub mod target;
pub mod track;

pub use config::{ConfigError, FileTargetConfig, MemoryTargetConfig, MultichannelConfig};
pub use error::StorageError;
pub use file::FileTarget;
pub use memory::MemoryTarget;
pub use multichannel::MultichannelMemoryTarget;
pub use target::{StorageTarget, TargetTask};
pub use track::SnapshotTrack;
