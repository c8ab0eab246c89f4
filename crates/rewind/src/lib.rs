//! Rewind: state recording and deterministic replay for real-time
//! simulations.
//!
//! This is the facade crate that re-exports the public API of the Rewind
//! sub-crates. Most users only need `rewind` as a dependency.
//!
//! # Quick start
//!
//! ```rust
//! use rewind::prelude::*;
//!
//! struct Lamp {
//!     id: ObjectIdentity,
//!     lit: bool,
//! }
//!
//! impl ReplayBehaviour for Lamp {}
//!
//! impl ReplayObject for Lamp {
//!     fn identity(&self) -> ObjectIdentity {
//!         self.id
//!     }
//!     fn set_identity(&mut self, id: ObjectIdentity) {
//!         self.id = id;
//!     }
//!     fn record_state(&mut self, state: &mut StateBuffer) -> Result<(), CodecError> {
//!         state.write_bool(self.lit);
//!         Ok(())
//!     }
//!     fn restore_state(&mut self, state: &mut StateBuffer) -> Result<(), CodecError> {
//!         self.lit = state.read_bool()?;
//!         Ok(())
//!     }
//! }
//!
//! let config = SessionConfig {
//!     end_behaviour: EndBehaviour::EndPlayback,
//!     ..SessionConfig::default()
//! };
//! let mut session = ReplaySession::new(
//!     MemoryTarget::default(),
//!     Box::new(PrefabRegistry::new()),
//!     config,
//! )
//! .unwrap();
//! session
//!     .register(Box::new(Lamp { id: ObjectIdentity::UNASSIGNED, lit: false }))
//!     .unwrap();
//!
//! session.begin_recording("hall").unwrap();
//! for _ in 0..32 {
//!     session.update_recording(1.0 / 60.0).unwrap();
//! }
//! session.stop_recording().unwrap();
//!
//! session.begin_playback().unwrap();
//! while session.update_playback(1.0 / 60.0).unwrap() != SequenceResult::End {}
//! assert!(!session.is_replaying());
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `rewind-core` | State buffers, snapshots, identities, spawn records |
//! | [`storage`] | `rewind-storage` | Memory, multichannel and chunked file targets |
//! | [`playback`] | `rewind-playback` | Sessions, sequencing and frame reconciliation |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Wire types and codecs (`rewind-core`).
///
/// [`types::StateBuffer`] carries per-object state, [`types::Snapshot`]
/// holds one recorded frame, and [`types::IdentityRegistry`] hands out
/// the compact identities that key both.
pub use rewind_core as types;

/// Storage targets (`rewind-storage`).
///
/// Every backend implements [`storage::StorageTarget`]. Pick
/// [`storage::MemoryTarget`] for short recordings,
/// [`storage::MultichannelMemoryTarget`] for several independent ones,
/// and [`storage::FileTarget`] for long recordings streamed to disk.
pub use rewind_storage as storage;

/// Recording and playback drivers (`rewind-playback`).
///
/// [`playback::ReplaySession`] is the usual entry point. Hosts implement
/// [`playback::ReplayObject`] for recorded objects and
/// [`playback::Instantiator`] to create prefabs during playback.
pub use rewind_playback as playback;

/// Common imports for typical Rewind usage.
///
/// ```rust
/// use rewind::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use rewind_core::{
        CodecError, Compression, IdentityRegistry, InitialData, InitialDataBuffer,
        ObjectIdentity, Snapshot, StateBuffer,
    };

    // Storage
    pub use rewind_storage::{
        FileTarget, FileTargetConfig, MemoryTarget, MemoryTargetConfig, MultichannelConfig,
        MultichannelMemoryTarget, StorageError, StorageTarget, TargetTask,
    };

    // Playback
    pub use rewind_playback::{
        BehaviourError, EndBehaviour, Instantiator, PlaybackError, PrefabRegistry,
        ReplayBehaviour, ReplayEvent, ReplayObject, ReplaySession, SeekOrigin, SequenceResult,
        SessionConfig,
    };
}
