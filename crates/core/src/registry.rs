//! The externally visible change-set registry.
//!
//! Consumers (a view, a merge tool) observe sets through snapshots and
//! through registered listeners. All mutation arrives from the engine's
//! delivery context as planned [`ChangeSetOp`]s, plus the external
//! [`remove`](ChangeSetRegistry::remove) call. Listeners are invoked in
//! registration order; a failing listener is logged and skipped so one
//! misbehaving consumer cannot break the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::grouper::ChangeSetOp;
use crate::models::{ChangeSet, SetOrigin};

// ---------------------------------------------------------------------------
// Events and listeners
// ---------------------------------------------------------------------------

/// A registry change, carrying a snapshot of the affected set.
#[derive(Debug, Clone)]
pub enum ChangeSetEvent {
    /// A set appeared (first assignment for its comment).
    SetAdded(ChangeSet),
    /// An existing set's membership changed.
    SetUpdated(ChangeSet),
    /// A set was removed.
    SetRemoved(ChangeSet),
}

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback interface for registry consumers.
pub trait ChangeSetListener: Send + Sync {
    fn on_event(&self, event: &ChangeSetEvent) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds the current change sets and fans events out to listeners.
///
/// At most one set with [`SetOrigin::Default`] exists at a time; it is
/// created lazily on first need and, once removed externally, re-created
/// lazily the next time an unassignable result arrives.
pub struct ChangeSetRegistry {
    sets: Mutex<Vec<ChangeSet>>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ChangeSetListener>)>>,
    next_listener: AtomicU64,
}

impl Default for ChangeSetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSetRegistry {
    pub fn new() -> Self {
        Self {
            sets: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// Snapshot of all sets in creation order.
    pub fn sets(&self) -> Vec<ChangeSet> {
        self.sets.lock().unwrap().clone()
    }

    /// Snapshot of the non-default set with exactly this comment.
    pub fn set_by_comment(&self, comment: &str) -> Option<ChangeSet> {
        self.sets
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.origin != SetOrigin::Default && s.comment == comment)
            .cloned()
    }

    /// Snapshot of the reserved unassigned set, if it currently exists.
    pub fn default_set(&self) -> Option<ChangeSet> {
        self.sets
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.origin == SetOrigin::Default)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.lock().unwrap().is_empty()
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register a listener. Listeners are notified in registration order.
    pub fn add_listener(&self, listener: Arc<dyn ChangeSetListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().unwrap().push((id, listener));
        id
    }

    /// Remove a listener. Returns false if the id is unknown.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    // -----------------------------------------------------------------------
    // External mutation
    // -----------------------------------------------------------------------

    /// Remove a set by id. Removing the default set clears the reserved
    /// slot; it will be re-created on next need.
    pub fn remove(&self, id: Uuid) -> Option<ChangeSet> {
        let removed = {
            let mut sets = self.sets.lock().unwrap();
            let index = sets.iter().position(|s| s.id == id)?;
            Some(sets.remove(index))
        };
        if let Some(set) = &removed {
            debug!(name = %set.name, "change set removed");
            self.fire(&[ChangeSetEvent::SetRemoved(set.clone())]);
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Delivery-side mutation
    // -----------------------------------------------------------------------

    /// Apply a batch of planned assignments. Called only from the engine's
    /// delivery context.
    pub(crate) fn apply(&self, ops: Vec<ChangeSetOp>) {
        let mut created: Vec<Uuid> = Vec::new();
        let mut touched: Vec<Uuid> = Vec::new();
        let events = {
            let mut sets = self.sets.lock().unwrap();
            for op in ops {
                match op {
                    ChangeSetOp::Assign { seed, result } => {
                        let existing = sets
                            .iter_mut()
                            .find(|s| s.origin != SetOrigin::Default && s.comment == seed.comment);
                        match existing {
                            Some(set) => {
                                set.add_member(result);
                                touched.push(set.id);
                            }
                            None => {
                                let mut set = ChangeSet::from_seed(&seed);
                                debug!(name = %set.name, "creating change set");
                                set.add_member(result);
                                created.push(set.id);
                                sets.push(set);
                            }
                        }
                    }
                    ChangeSetOp::AssignToDefault { result } => {
                        let existing = sets.iter_mut().find(|s| s.origin == SetOrigin::Default);
                        match existing {
                            Some(set) => {
                                set.add_member(result);
                                touched.push(set.id);
                            }
                            None => {
                                let mut set = ChangeSet::unassigned();
                                debug!("creating unassigned change set");
                                set.add_member(result);
                                created.push(set.id);
                                sets.push(set);
                            }
                        }
                    }
                }
            }
            snapshot_events(&sets, &created, &touched)
        };
        self.fire(&events);
    }

    /// Remove every set, firing one removal event per set. Called from the
    /// delivery context when the engine is reseeded.
    pub(crate) fn remove_all(&self) {
        let removed: Vec<ChangeSet> = {
            let mut sets = self.sets.lock().unwrap();
            sets.drain(..).collect()
        };
        if removed.is_empty() {
            return;
        }
        debug!(count = removed.len(), "clearing change sets");
        let events: Vec<ChangeSetEvent> =
            removed.into_iter().map(ChangeSetEvent::SetRemoved).collect();
        self.fire(&events);
    }

    fn fire(&self, events: &[ChangeSetEvent]) {
        let listeners: Vec<(ListenerId, Arc<dyn ChangeSetListener>)> =
            self.listeners.lock().unwrap().clone();
        for event in events {
            for (id, listener) in &listeners {
                if let Err(error) = listener.on_event(event) {
                    warn!(listener = id.0, %error, "change-set listener failed, continuing");
                }
            }
        }
    }
}

/// Final snapshots for this apply pass: added events for sets created here,
/// updated events for pre-existing sets that gained members, in first-touch
/// order.
fn snapshot_events(sets: &[ChangeSet], created: &[Uuid], touched: &[Uuid]) -> Vec<ChangeSetEvent> {
    let mut events = Vec::new();
    let mut seen: Vec<Uuid> = Vec::new();
    for id in created {
        if seen.contains(id) {
            continue;
        }
        seen.push(*id);
        if let Some(set) = sets.iter().find(|s| s.id == *id) {
            events.push(ChangeSetEvent::SetAdded(set.clone()));
        }
    }
    for id in touched {
        if seen.contains(id) {
            continue;
        }
        seen.push(*id);
        if let Some(set) = sets.iter().find(|s| s.id == *id) {
            events.push(ChangeSetEvent::SetUpdated(set.clone()));
        }
    }
    events
}
