//! Recording and playback on top of Rewind storage targets.
//!
//! - [`PlaybackSequencer`] walks a target frame by frame, forwards or
//!   backwards, and tracks the interpolation fraction between frames
//! - [`reconcile`](reconcile::reconcile) brings a live object set into
//!   line with one frame: despawn, spawn, reparent, apply
//! - [`ReplaySession`] drives both loops for a host: sampling live
//!   objects while recording, reconciling and dispatching
//!   [`ReplayBehaviour`] callbacks while replaying
//! - [`schema`] encodes typed field lists and blends them between
//!   frames
//!
//! Hosts plug in through [`ReplayObject`] (per-object state) and
//! [`Instantiator`] (prefab creation and destruction).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod behaviour;
pub mod config;
pub mod error;
pub mod object;
pub mod reconcile;
pub mod schema;
pub mod sequencer;
pub mod session;

pub use behaviour::{ReplayBehaviour, ReplayEvent};
pub use config::{ConfigError, SessionConfig};
pub use error::{BehaviourError, PlaybackError};
pub use object::{EntryPayload, Instantiator, ObjectSet, PrefabRegistry, ReplayObject};
pub use reconcile::{reconcile, ReconcileReport};
pub use schema::{FieldDescriptor, FieldKind, FieldValue, Interpolation};
pub use sequencer::{
    interpolation_fraction, EndBehaviour, PlaybackSequencer, SeekOrigin, SequenceResult,
};
pub use session::{ReplaySession, SessionState};
