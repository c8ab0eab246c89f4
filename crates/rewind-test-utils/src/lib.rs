//! Test utilities for Rewind development.
//!
//! Provides mock objects and an instantiator that write everything the
//! engine does to them into a shared [`OpLog`], so integration tests can
//! assert on ordering without reaching into the session's object set.

#![allow(missing_docs)]

pub mod fixtures;

use std::cell::RefCell;
use std::rc::Rc;

use rewind_core::{CodecError, InitialData, ObjectIdentity, StateBuffer};
use rewind_playback::{BehaviourError, Instantiator, ReplayBehaviour, ReplayEvent, ReplayObject};

pub use fixtures::{entry, entry_with_events, snapshot_at, snapshot_with};

/// One thing that happened to a mock object.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Instantiated { prefab: String },
    Destroyed { identity: ObjectIdentity },
    InitialData { identity: ObjectIdentity },
    Parented { identity: ObjectIdentity, parent: Option<ObjectIdentity> },
    Restored { identity: ObjectIdentity, bytes: Vec<u8> },
    Started { identity: ObjectIdentity },
    Ended { identity: ObjectIdentity },
    Reset { identity: ObjectIdentity },
    Event { identity: ObjectIdentity, event: u16 },
}

impl Op {
    /// The identity the op concerns, if it has one yet.
    pub fn identity(&self) -> Option<ObjectIdentity> {
        match self {
            Op::Instantiated { .. } => None,
            Op::Destroyed { identity }
            | Op::InitialData { identity }
            | Op::Parented { identity, .. }
            | Op::Restored { identity, .. }
            | Op::Started { identity }
            | Op::Ended { identity }
            | Op::Reset { identity }
            | Op::Event { identity, .. } => Some(*identity),
        }
    }
}

/// Shared, ordered record of ops across every mock in a test.
pub type OpLog = Rc<RefCell<Vec<Op>>>;

/// A fresh empty log.
pub fn op_log() -> OpLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Position of the first op matching `pred`, if any.
pub fn position(log: &OpLog, pred: impl Fn(&Op) -> bool) -> Option<usize> {
    log.borrow().iter().position(pred)
}

/// Mutable state of a [`MockObject`], shared with the test.
#[derive(Debug, Default)]
pub struct MockState {
    /// Bytes written on every sample. Empty means "unchanged".
    pub state: Vec<u8>,
    /// Events handed to the recorder on the next sample.
    pub pending_events: Vec<ReplayEvent>,
    /// Last bytes restored during playback.
    pub restored: Option<Vec<u8>>,
    /// Current parent.
    pub parent: Option<ObjectIdentity>,
    /// Last placement applied on spawn.
    pub initial: Option<InitialData>,
    /// Number of `on_replay_update` calls.
    pub updates: usize,
    /// Last update fraction.
    pub fraction: f32,
    /// Make every behaviour callback fail.
    pub fail_callbacks: bool,
}

pub type MockHandle = Rc<RefCell<MockState>>;

/// Configurable [`ReplayObject`] that logs what the engine does to it.
pub struct MockObject {
    identity: ObjectIdentity,
    prefab: Option<String>,
    shared: MockHandle,
    log: OpLog,
}

impl MockObject {
    /// A static scene object.
    pub fn new(log: &OpLog) -> Self {
        Self {
            identity: ObjectIdentity::UNASSIGNED,
            prefab: None,
            shared: MockHandle::default(),
            log: Rc::clone(log),
        }
    }

    /// A spawnable object created from `prefab`.
    pub fn spawnable(prefab: impl Into<String>, log: &OpLog) -> Self {
        Self {
            prefab: Some(prefab.into()),
            ..Self::new(log)
        }
    }

    /// Pre-assign an identity (registration still reserves it).
    pub fn with_identity(mut self, identity: ObjectIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Start with `bytes` as the recorded state.
    pub fn with_state(self, bytes: &[u8]) -> Self {
        self.shared.borrow_mut().state = bytes.to_vec();
        self
    }

    /// Handle for changing state and reading results after the object
    /// has been moved into a session.
    pub fn handle(&self) -> MockHandle {
        Rc::clone(&self.shared)
    }

    fn push(&self, op: Op) {
        self.log.borrow_mut().push(op);
    }

    fn callback(&self, op: Op) -> Result<(), BehaviourError> {
        self.push(op);
        if self.shared.borrow().fail_callbacks {
            return Err(BehaviourError::new("mock callback failure"));
        }
        Ok(())
    }
}

impl ReplayBehaviour for MockObject {
    fn on_replay_start(&mut self) -> Result<(), BehaviourError> {
        self.callback(Op::Started {
            identity: self.identity,
        })
    }

    fn on_replay_end(&mut self) -> Result<(), BehaviourError> {
        self.callback(Op::Ended {
            identity: self.identity,
        })
    }

    fn on_replay_reset(&mut self) -> Result<(), BehaviourError> {
        self.callback(Op::Reset {
            identity: self.identity,
        })
    }

    fn on_replay_update(&mut self, fraction: f32) -> Result<(), BehaviourError> {
        {
            let mut shared = self.shared.borrow_mut();
            shared.updates += 1;
            shared.fraction = fraction;
        }
        if self.shared.borrow().fail_callbacks {
            return Err(BehaviourError::new("mock callback failure"));
        }
        Ok(())
    }

    fn on_replay_event(&mut self, event: &ReplayEvent) -> Result<(), BehaviourError> {
        self.callback(Op::Event {
            identity: self.identity,
            event: event.id,
        })
    }
}

impl ReplayObject for MockObject {
    fn identity(&self) -> ObjectIdentity {
        self.identity
    }

    fn set_identity(&mut self, identity: ObjectIdentity) {
        self.identity = identity;
    }

    fn prefab_name(&self) -> Option<&str> {
        self.prefab.as_deref()
    }

    fn record_state(&mut self, state: &mut StateBuffer) -> Result<(), CodecError> {
        state.write_raw(&self.shared.borrow().state);
        Ok(())
    }

    fn restore_state(&mut self, state: &mut StateBuffer) -> Result<(), CodecError> {
        let bytes = state.read_raw(state.remaining())?.to_vec();
        self.push(Op::Restored {
            identity: self.identity,
            bytes: bytes.clone(),
        });
        self.shared.borrow_mut().restored = Some(bytes);
        Ok(())
    }

    fn apply_initial_data(&mut self, data: &InitialData) {
        self.push(Op::InitialData {
            identity: self.identity,
        });
        self.shared.borrow_mut().initial = Some(data.clone());
    }

    fn set_parent(&mut self, parent: Option<ObjectIdentity>) {
        self.push(Op::Parented {
            identity: self.identity,
            parent,
        });
        self.shared.borrow_mut().parent = parent;
    }

    fn drain_events(&mut self) -> Vec<ReplayEvent> {
        std::mem::take(&mut self.shared.borrow_mut().pending_events)
    }
}

/// [`Instantiator`] that builds [`MockObject`]s for a fixed set of
/// prefab names and logs creation and destruction.
pub struct MockInstantiator {
    prefabs: Vec<String>,
    log: OpLog,
    spawned: SpawnLog,
}

/// Objects a [`MockInstantiator`] created, with their prefab names.
pub type SpawnLog = Rc<RefCell<Vec<(String, MockHandle)>>>;

impl MockInstantiator {
    pub fn new(log: &OpLog) -> Self {
        Self {
            prefabs: Vec::new(),
            log: Rc::clone(log),
            spawned: SpawnLog::default(),
        }
    }

    /// Accept `name` as a prefab.
    pub fn with_prefab(mut self, name: impl Into<String>) -> Self {
        self.prefabs.push(name.into());
        self
    }

    /// Shared list of every object created, kept valid after the
    /// instantiator moves into a session.
    pub fn spawned(&self) -> SpawnLog {
        Rc::clone(&self.spawned)
    }
}

impl Instantiator for MockInstantiator {
    fn instantiate(&mut self, prefab_name: &str) -> Option<Box<dyn ReplayObject>> {
        if !self.prefabs.iter().any(|p| p == prefab_name) {
            return None;
        }
        self.log.borrow_mut().push(Op::Instantiated {
            prefab: prefab_name.to_owned(),
        });
        let object = MockObject::spawnable(prefab_name, &self.log);
        self.spawned
            .borrow_mut()
            .push((prefab_name.to_owned(), object.handle()));
        Some(Box::new(object))
    }

    fn destroy(&mut self, object: Box<dyn ReplayObject>) {
        self.log.borrow_mut().push(Op::Destroyed {
            identity: object.identity(),
        });
    }
}
