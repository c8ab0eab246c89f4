//! Host-side collaborators: recordable objects, prefab instantiation,
//! and the live object set.
//!
//! The core never interprets object state. Each object writes its own
//! payload while recording and reads it back during playback. The host
//! decides how prefabs are created and destroyed (pooling, for one).

use std::fmt;

use indexmap::IndexMap;
use rewind_core::{CodecError, InitialData, ObjectIdentity, StateBuffer};

use crate::behaviour::{ReplayBehaviour, ReplayEvent};

// ── ReplayObject ──────────────────────────────────────────────────

/// A live object that takes part in recording and playback.
pub trait ReplayObject: ReplayBehaviour {
    /// Identity currently held. [`ObjectIdentity::UNASSIGNED`] until the
    /// session registers the object.
    fn identity(&self) -> ObjectIdentity;

    /// Store the identity the registry assigned.
    fn set_identity(&mut self, identity: ObjectIdentity);

    /// Prefab this object was created from, if it can be spawned and
    /// despawned during playback. Static scene content returns `None`.
    fn prefab_name(&self) -> Option<&str> {
        None
    }

    /// Append this frame's state. Writing nothing means "unchanged".
    fn record_state(&mut self, state: &mut StateBuffer) -> Result<(), CodecError>;

    /// Read back a state written by [`record_state`](Self::record_state).
    fn restore_state(&mut self, state: &mut StateBuffer) -> Result<(), CodecError>;

    /// Placement to store when the object is spawned at `timestamp`.
    fn initial_data(&self, timestamp: f32) -> InitialData {
        InitialData::new(self.identity(), timestamp)
    }

    /// Take the placement recorded for a freshly recreated object.
    fn apply_initial_data(&mut self, _data: &InitialData) {}

    /// Attach to (or detach from) a parent object.
    fn set_parent(&mut self, _parent: Option<ObjectIdentity>) {}

    /// Events queued since the last sample. Drained by the recorder.
    fn drain_events(&mut self) -> Vec<ReplayEvent> {
        Vec::new()
    }
}

// ── Instantiation ─────────────────────────────────────────────────

/// Creates and destroys prefab instances during playback.
pub trait Instantiator {
    /// Create an instance of `prefab_name`, or `None` if no such prefab
    /// is registered.
    fn instantiate(&mut self, prefab_name: &str) -> Option<Box<dyn ReplayObject>>;

    /// Remove an instance the playback no longer needs.
    fn destroy(&mut self, object: Box<dyn ReplayObject>) {
        drop(object);
    }
}

type PrefabFactory = Box<dyn FnMut() -> Box<dyn ReplayObject>>;

/// Name-to-factory prefab table. Destroyed instances are dropped.
#[derive(Default)]
pub struct PrefabRegistry {
    factories: IndexMap<String, PrefabFactory>,
}

impl PrefabRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, replacing any earlier one.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl FnMut() -> Box<dyn ReplayObject> + 'static,
    ) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Whether `name` resolves to a prefab.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Number of registered prefabs.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no prefabs are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for PrefabRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefabRegistry")
            .field("prefabs", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Instantiator for PrefabRegistry {
    fn instantiate(&mut self, prefab_name: &str) -> Option<Box<dyn ReplayObject>> {
        self.factories.get_mut(prefab_name).map(|factory| factory())
    }
}

// ── ObjectSet ─────────────────────────────────────────────────────

/// Live objects keyed by identity, in registration order.
#[derive(Default)]
pub struct ObjectSet {
    objects: IndexMap<ObjectIdentity, Box<dyn ReplayObject>>,
}

impl ObjectSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object under its current identity, returning any object
    /// it displaced.
    pub fn insert(&mut self, object: Box<dyn ReplayObject>) -> Option<Box<dyn ReplayObject>> {
        self.objects.insert(object.identity(), object)
    }

    /// Remove and return the object holding `identity`.
    pub fn remove(&mut self, identity: ObjectIdentity) -> Option<Box<dyn ReplayObject>> {
        self.objects.shift_remove(&identity)
    }

    /// Whether an object holds `identity`.
    pub fn contains(&self, identity: ObjectIdentity) -> bool {
        self.objects.contains_key(&identity)
    }

    /// Shared access to one object.
    pub fn get(&self, identity: ObjectIdentity) -> Option<&dyn ReplayObject> {
        self.objects.get(&identity).map(|o| o.as_ref())
    }

    /// Exclusive access to one object.
    pub fn get_mut(&mut self, identity: ObjectIdentity) -> Option<&mut (dyn ReplayObject + 'static)> {
        self.objects.get_mut(&identity).map(|o| o.as_mut())
    }

    /// Identities in registration order.
    pub fn identities(&self) -> impl Iterator<Item = ObjectIdentity> + '_ {
        self.objects.keys().copied()
    }

    /// Objects in registration order.
    pub fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (ObjectIdentity, &mut (dyn ReplayObject + 'static))> + '_ {
        self.objects.iter_mut().map(|(id, o)| (*id, o.as_mut()))
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl fmt::Debug for ObjectSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.objects.keys()).finish()
    }
}

// ── EntryPayload ──────────────────────────────────────────────────

/// What a session stores per object in each snapshot.
///
/// ```text
/// prefab_name  string (empty for static objects)
/// state        i32-prefixed blob
/// event_count  i16
/// event_count × { event_id i16, payload i32-prefixed blob }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntryPayload {
    /// Prefab to instantiate if the object is missing during playback.
    pub prefab_name: String,
    /// The object's own state.
    pub state: StateBuffer,
    /// Events queued since the previous sample.
    pub events: Vec<ReplayEvent>,
}

impl EntryPayload {
    /// Whether there is nothing worth storing: a static object with no
    /// state and no events.
    ///
    /// Spawnable objects always count. A missing entry despawns them
    /// during playback.
    pub fn is_empty(&self) -> bool {
        self.prefab_name.is_empty() && self.state.is_empty() && self.events.is_empty()
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Result<StateBuffer, CodecError> {
        let mut out = StateBuffer::with_capacity(self.prefab_name.len() + self.state.len() + 12);
        out.write_str(&self.prefab_name)?;
        out.write_buffer(&self.state)?;
        let count = i16::try_from(self.events.len()).map_err(|_| CodecError::PayloadTooLarge {
            len: self.events.len(),
            max: i16::MAX as usize,
        })?;
        out.write_i16(count);
        for event in &self.events {
            // Event ids travel as their i16 bit pattern.
            out.write_i16(event.id as i16);
            out.write_buffer(&event.payload)?;
        }
        Ok(out)
    }

    /// Read only the prefab name from the head of an encoded entry.
    pub fn peek_prefab_name(buf: &mut StateBuffer) -> Result<String, CodecError> {
        buf.rewind();
        let name = buf.read_str();
        buf.rewind();
        name
    }

    /// Decode an entry from the cursor of `buf`.
    pub fn decode(buf: &mut StateBuffer) -> Result<Self, CodecError> {
        let prefab_name = buf.read_str()?;
        let state = buf.read_buffer()?;
        let count = buf.read_i16()?;
        if count < 0 {
            return Err(CodecError::Malformed {
                detail: format!("negative event count {count}"),
            });
        }
        let mut events = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = buf.read_i16()? as u16;
            let payload = buf.read_buffer()?;
            events.push(ReplayEvent { id, payload });
        }
        Ok(Self {
            prefab_name,
            state,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain(ObjectIdentity);

    impl ReplayBehaviour for Plain {}

    impl ReplayObject for Plain {
        fn identity(&self) -> ObjectIdentity {
            self.0
        }
        fn set_identity(&mut self, identity: ObjectIdentity) {
            self.0 = identity;
        }
        fn record_state(&mut self, _state: &mut StateBuffer) -> Result<(), CodecError> {
            Ok(())
        }
        fn restore_state(&mut self, _state: &mut StateBuffer) -> Result<(), CodecError> {
            Ok(())
        }
    }

    #[test]
    fn entry_roundtrip_with_events() {
        let mut state = StateBuffer::new();
        state.write_f32(1.5);
        let mut payload = StateBuffer::new();
        payload.write_bool(true);
        let entry = EntryPayload {
            prefab_name: "crate".into(),
            state,
            events: vec![ReplayEvent::new(3), ReplayEvent::with_payload(u16::MAX, payload)],
        };
        let mut encoded = entry.encode().unwrap();
        assert_eq!(EntryPayload::peek_prefab_name(&mut encoded).unwrap(), "crate");
        let back = EntryPayload::decode(&mut encoded).unwrap();
        assert_eq!(back.prefab_name, "crate");
        assert_eq!(back.state.as_bytes(), entry.state.as_bytes());
        assert_eq!(back.events.len(), 2);
        assert_eq!(back.events[1].id, u16::MAX);
        assert_eq!(back.events[1].payload.as_bytes(), &[1]);
    }

    #[test]
    fn spawnable_entry_is_never_empty() {
        let entry = EntryPayload {
            prefab_name: "crate".into(),
            ..Default::default()
        };
        assert!(!entry.is_empty());
        assert!(EntryPayload::default().is_empty());
        let with_event = EntryPayload {
            events: vec![ReplayEvent::new(1)],
            ..Default::default()
        };
        assert!(!with_event.is_empty());
    }

    #[test]
    fn prefab_registry_instantiates_by_name() {
        let mut prefabs = PrefabRegistry::new();
        prefabs.register("plain", || Box::new(Plain(ObjectIdentity::UNASSIGNED)));
        assert!(prefabs.contains("plain"));
        assert!(prefabs.instantiate("plain").is_some());
        assert!(prefabs.instantiate("missing").is_none());
    }

    #[test]
    fn object_set_keeps_registration_order() {
        let mut set = ObjectSet::new();
        for id in [5, 2, 9] {
            set.insert(Box::new(Plain(ObjectIdentity(id))));
        }
        let ids: Vec<i16> = set.identities().map(|i| i.0).collect();
        assert_eq!(ids, vec![5, 2, 9]);
        assert!(set.remove(ObjectIdentity(2)).is_some());
        assert_eq!(set.len(), 2);
        assert!(!set.contains(ObjectIdentity(2)));
    }
}
