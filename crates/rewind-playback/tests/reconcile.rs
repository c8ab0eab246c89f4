//! Integration test: reconciling a live object set against recorded
//! frames with mock objects that log every call they receive.

use rewind_core::{IdentityRegistry, InitialData, InitialDataBuffer, ObjectIdentity, StateBuffer};
use rewind_playback::{reconcile, ObjectSet, ReplayEvent};
use rewind_test_utils::{
    entry, entry_with_events, op_log, position, snapshot_with, MockInstantiator, MockObject, Op,
    OpLog,
};

const A: ObjectIdentity = ObjectIdentity(10);
const B: ObjectIdentity = ObjectIdentity(20);
const C: ObjectIdentity = ObjectIdentity(30);

/// Live: spawnable A and static B, both registered.
fn live(log: &OpLog) -> (ObjectSet, IdentityRegistry) {
    let mut objects = ObjectSet::new();
    let mut registry = IdentityRegistry::with_seed(1);
    registry.reserve(A).unwrap();
    registry.reserve(B).unwrap();
    objects.insert(Box::new(MockObject::spawnable("crate", log).with_identity(A)));
    objects.insert(Box::new(MockObject::new(log).with_identity(B)));
    (objects, registry)
}

#[test]
fn passes_run_despawn_spawn_reparent_apply() {
    let log = op_log();
    let (mut objects, mut registry) = live(&log);
    let mut instantiator = MockInstantiator::new(&log).with_prefab("crate");
    let mut spawns = InitialDataBuffer::new();
    spawns.record(InitialData::new(C, 0.0).with_parent(B));

    let frame = snapshot_with(1.0, &[(20, entry("", &[2])), (30, entry("crate", &[3]))]);
    let report = reconcile(&frame, &spawns, &mut objects, &mut registry, &mut instantiator);

    assert_eq!(report.despawned, vec![A]);
    assert_eq!(report.spawned, vec![C]);
    assert_eq!(report.reparented, vec![C]);
    assert_eq!(report.applied, vec![B, C]);
    assert!(report.skipped.is_empty());

    let destroyed = position(&log, |op| *op == Op::Destroyed { identity: A }).unwrap();
    let created = position(&log, |op| matches!(op, Op::Instantiated { prefab } if prefab == "crate"))
        .unwrap();
    let placed = position(&log, |op| *op == Op::InitialData { identity: C }).unwrap();
    let parented = position(&log, |op| {
        *op == Op::Parented {
            identity: C,
            parent: Some(B),
        }
    })
    .unwrap();
    let restored = position(&log, |op| {
        *op == Op::Restored {
            identity: C,
            bytes: vec![3],
        }
    })
    .unwrap();
    assert!(destroyed < created);
    assert!(created < placed && placed < parented && parented < restored);
    assert!(log.borrow().contains(&Op::Restored {
        identity: B,
        bytes: vec![2],
    }));

    assert!(!objects.contains(A));
    assert!(objects.contains(C));
    assert!(registry.is_registered(C));
    assert!(!registry.is_registered(A));
}

#[test]
fn static_objects_outside_frame_are_kept_untouched() {
    let log = op_log();
    let (mut objects, mut registry) = live(&log);
    let mut instantiator = MockInstantiator::new(&log).with_prefab("crate");

    let frame = snapshot_with(0.5, &[(10, entry("crate", &[1]))]);
    let report = reconcile(
        &frame,
        &InitialDataBuffer::new(),
        &mut objects,
        &mut registry,
        &mut instantiator,
    );

    assert!(report.despawned.is_empty());
    assert_eq!(report.applied, vec![A]);
    assert!(objects.contains(B));
    assert!(position(&log, |op| op.identity() == Some(B)).is_none());
}

#[test]
fn unknown_prefab_and_prefabless_entries_are_skipped() {
    let log = op_log();
    let (mut objects, mut registry) = live(&log);
    let mut instantiator = MockInstantiator::new(&log).with_prefab("crate");

    let frame = snapshot_with(
        0.0,
        &[
            (10, entry("crate", &[1])),
            (20, entry("", &[2])),
            (40, entry("ghost", &[4])),
            (50, entry("", &[5])),
        ],
    );
    let report = reconcile(
        &frame,
        &InitialDataBuffer::new(),
        &mut objects,
        &mut registry,
        &mut instantiator,
    );

    assert_eq!(report.skipped, vec![ObjectIdentity(40), ObjectIdentity(50)]);
    assert!(report.spawned.is_empty());
    assert_eq!(report.applied, vec![A, B]);
    assert!(position(&log, |op| matches!(op, Op::Instantiated { .. })).is_none());
    assert!(!registry.is_registered(ObjectIdentity(40)));
}

#[test]
fn dangling_parent_leaves_object_unparented() {
    let log = op_log();
    let (mut objects, mut registry) = live(&log);
    let mut instantiator = MockInstantiator::new(&log).with_prefab("crate");
    let mut spawns = InitialDataBuffer::new();
    spawns.record(InitialData::new(C, 0.0).with_parent(ObjectIdentity(99)));

    let frame = snapshot_with(
        0.0,
        &[(10, entry("crate", &[1])), (30, entry("crate", &[3]))],
    );
    let report = reconcile(&frame, &spawns, &mut objects, &mut registry, &mut instantiator);

    assert_eq!(report.spawned, vec![C]);
    assert!(report.reparented.is_empty());
    assert_eq!(report.applied, vec![A, C]);
    assert!(position(&log, |op| matches!(op, Op::Parented { .. })).is_none());
}

#[test]
fn parent_spawned_in_same_frame_is_found() {
    let log = op_log();
    let mut objects = ObjectSet::new();
    let mut registry = IdentityRegistry::with_seed(1);
    let mut instantiator = MockInstantiator::new(&log).with_prefab("crate");
    let mut spawns = InitialDataBuffer::new();
    // The child is listed before its parent in the frame.
    spawns.record(InitialData::new(ObjectIdentity(5), 0.0).with_parent(ObjectIdentity(6)));
    spawns.record(InitialData::new(ObjectIdentity(6), 0.0));

    let frame = snapshot_with(
        0.0,
        &[(5, entry("crate", &[5])), (6, entry("crate", &[6]))],
    );
    let report = reconcile(&frame, &spawns, &mut objects, &mut registry, &mut instantiator);

    assert_eq!(report.spawned, vec![ObjectIdentity(5), ObjectIdentity(6)]);
    assert_eq!(report.reparented, vec![ObjectIdentity(5)]);
    let spawned = instantiator.spawned();
    assert_eq!(spawned.borrow().len(), 2);
    assert_eq!(spawned.borrow()[0].1.borrow().parent, Some(ObjectIdentity(6)));
}

#[test]
fn events_are_reported_with_their_object() {
    let log = op_log();
    let (mut objects, mut registry) = live(&log);
    let mut instantiator = MockInstantiator::new(&log);

    let frame = snapshot_with(
        0.0,
        &[
            (10, entry("crate", &[])),
            (
                20,
                entry_with_events("", &[], vec![ReplayEvent::new(4), ReplayEvent::new(0xFFFF)]),
            ),
        ],
    );
    let report = reconcile(
        &frame,
        &InitialDataBuffer::new(),
        &mut objects,
        &mut registry,
        &mut instantiator,
    );

    let events: Vec<(ObjectIdentity, u16)> =
        report.events.iter().map(|(id, e)| (*id, e.id)).collect();
    assert_eq!(events, vec![(B, 4), (B, 0xFFFF)]);
    // Empty states leave both objects as they were.
    assert!(report.applied.is_empty());
    assert!(report.despawned.is_empty());
    assert!(position(&log, |op| matches!(op, Op::Restored { .. })).is_none());
}

#[test]
fn corrupt_entry_skips_only_that_object() {
    let log = op_log();
    let (mut objects, mut registry) = live(&log);
    let mut instantiator = MockInstantiator::new(&log);

    let frame = snapshot_with(
        0.0,
        &[
            (10, entry("crate", &[1])),
            (20, StateBuffer::from_bytes(vec![0xFF, 0xFF])),
        ],
    );
    let report = reconcile(
        &frame,
        &InitialDataBuffer::new(),
        &mut objects,
        &mut registry,
        &mut instantiator,
    );

    assert_eq!(report.applied, vec![A]);
    assert_eq!(report.skipped, vec![B]);
}
