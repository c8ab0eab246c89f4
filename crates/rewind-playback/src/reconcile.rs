//! Bringing the live object set into agreement with a recorded frame.
//!
//! Four passes, always in this order:
//!
//! 1. **Despawn**: spawnable objects the frame does not mention are
//!    destroyed. Static objects are left alone.
//! 2. **Spawn**: identities in the frame with no live object are
//!    instantiated from the prefab named at the head of their entry and
//!    placed using the nearest spawn record.
//! 3. **Reparent**: objects spawned in this pass are attached to their
//!    recorded parent, which may itself have just been spawned.
//! 4. **Apply**: every live object with an entry reads its state. Objects
//!    without one, or whose entry carries an empty state, keep their last
//!    state. Their events are still reported.
//!
//! Nothing here fails the frame. A missing prefab, a dangling parent or
//! an unreadable entry is logged and only that object is skipped.

use rewind_core::{IdentityRegistry, InitialDataBuffer, ObjectIdentity, Snapshot};
use tracing::{debug, warn};

use crate::behaviour::ReplayEvent;
use crate::object::{EntryPayload, Instantiator, ObjectSet, ReplayObject};

/// What one reconciliation did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileReport {
    /// Objects destroyed, in pass order.
    pub despawned: Vec<ObjectIdentity>,
    /// Objects created, in pass order.
    pub spawned: Vec<ObjectIdentity>,
    /// Spawned objects attached to a recorded parent.
    pub reparented: Vec<ObjectIdentity>,
    /// Objects that read a state from the frame.
    pub applied: Vec<ObjectIdentity>,
    /// Identities skipped with a warning.
    pub skipped: Vec<ObjectIdentity>,
    /// Events carried by the frame, in object order.
    pub events: Vec<(ObjectIdentity, ReplayEvent)>,
}

/// Reconcile `objects` against `frame`.
pub fn reconcile(
    frame: &Snapshot,
    initial_state: &InitialDataBuffer,
    objects: &mut ObjectSet,
    registry: &mut IdentityRegistry,
    instantiator: &mut dyn Instantiator,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    despawn(frame, objects, registry, instantiator, &mut report);
    let created = spawn(
        frame,
        initial_state,
        objects,
        registry,
        instantiator,
        &mut report,
    );
    reparent(&created, objects, &mut report);
    apply(frame, objects, &mut report);
    debug!(
        frame = frame.timestamp(),
        despawned = report.despawned.len(),
        spawned = report.spawned.len(),
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "frame reconciled"
    );
    report
}

fn despawn(
    frame: &Snapshot,
    objects: &mut ObjectSet,
    registry: &mut IdentityRegistry,
    instantiator: &mut dyn Instantiator,
    report: &mut ReconcileReport,
) {
    let doomed: Vec<ObjectIdentity> = objects
        .identities()
        .filter(|&id| !frame.contains(id))
        .filter(|&id| objects.get(id).is_some_and(|o| o.prefab_name().is_some()))
        .collect();
    for id in doomed {
        if let Some(object) = objects.remove(id) {
            registry.unregister(id);
            instantiator.destroy(object);
            report.despawned.push(id);
        }
    }
}

/// Returns each spawned identity with its recorded parent.
fn spawn(
    frame: &Snapshot,
    initial_state: &InitialDataBuffer,
    objects: &mut ObjectSet,
    registry: &mut IdentityRegistry,
    instantiator: &mut dyn Instantiator,
    report: &mut ReconcileReport,
) -> Vec<(ObjectIdentity, Option<ObjectIdentity>)> {
    let mut created = Vec::new();
    for (id, state) in frame.iter() {
        if objects.contains(id) {
            continue;
        }
        let mut head = state.clone();
        let prefab_name = match EntryPayload::peek_prefab_name(&mut head) {
            Ok(name) => name,
            Err(e) => {
                warn!(identity = %id, error = %e, "unreadable snapshot entry; skipping spawn");
                report.skipped.push(id);
                continue;
            }
        };
        if prefab_name.is_empty() {
            warn!(identity = %id, "recorded object is not live and has no prefab; skipping");
            report.skipped.push(id);
            continue;
        }
        let Some(mut object) = instantiator.instantiate(&prefab_name) else {
            warn!(identity = %id, prefab = %prefab_name, "prefab not registered; skipping spawn");
            report.skipped.push(id);
            continue;
        };
        if let Err(e) = registry.reserve(id) {
            warn!(identity = %id, error = %e, "cannot reserve recorded identity; skipping spawn");
            instantiator.destroy(object);
            report.skipped.push(id);
            continue;
        }
        object.set_identity(id);
        let parent = match initial_state.nearest(id, frame.timestamp()) {
            Some(data) => {
                object.apply_initial_data(data);
                data.parent
            }
            None => None,
        };
        objects.insert(object);
        report.spawned.push(id);
        created.push((id, parent));
    }
    created
}

fn reparent(
    created: &[(ObjectIdentity, Option<ObjectIdentity>)],
    objects: &mut ObjectSet,
    report: &mut ReconcileReport,
) {
    for &(id, parent) in created {
        let Some(parent) = parent else { continue };
        if !objects.contains(parent) {
            warn!(identity = %id, parent = %parent, "dangling parent reference; object stays unparented");
            continue;
        }
        if let Some(object) = objects.get_mut(id) {
            object.set_parent(Some(parent));
            report.reparented.push(id);
        }
    }
}

fn apply(frame: &Snapshot, objects: &mut ObjectSet, report: &mut ReconcileReport) {
    for (id, object) in objects.iter_mut() {
        let Some(mut raw) = frame.restore_state(id) else {
            continue;
        };
        let mut entry = match EntryPayload::decode(&mut raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(identity = %id, error = %e, "unreadable snapshot entry; state not applied");
                report.skipped.push(id);
                continue;
            }
        };
        if !entry.state.is_empty() {
            if let Err(e) = object.restore_state(&mut entry.state) {
                warn!(identity = %id, error = %e, "object failed to restore state");
                report.skipped.push(id);
                continue;
            }
            report.applied.push(id);
        }
        report
            .events
            .extend(entry.events.into_iter().map(|event| (id, event)));
    }
}
