//! Container relocation detection between consecutive placements.

use std::mem;

use crate::topology::Placement;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationEvent {
    pub container_id: String,
    pub from_host: String,
    pub to_host: String,
}

/// One event per container present in both maps whose host changed, ordered
/// by container id. Arrivals and removals produce nothing.
pub fn diff(previous: &Placement, current: &Placement) -> Vec<MigrationEvent> {
    current
        .iter()
        .filter_map(|(container_id, to_host)| {
            let from_host = previous.get(container_id)?;
            (from_host != to_host).then(|| MigrationEvent {
                container_id: container_id.clone(),
                from_host: from_host.clone(),
                to_host: to_host.clone(),
            })
        })
        .collect()
}

/// The placement the next comparison runs against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlacementState {
    placement: Placement,
}

impl PlacementState {
    pub fn new(placement: Placement) -> Self {
        Self { placement }
    }

    /// Compares `current` against this state and hands back the state for
    /// the following call.
    pub fn advance(self, current: &Placement) -> (Self, Vec<MigrationEvent>) {
        let events = diff(&self.placement, current);
        (Self::new(current.clone()), events)
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// `true` until the first placement has been observed.
    pub fn is_baseline(&self) -> bool {
        self.placement.is_empty()
    }
}

/// Owns the previous placement across snapshots. Calls must follow snapshot
/// order; replaying an older snapshot reports its moves backwards.
///
/// It observes the validated placement, so a container whose host was
/// dropped as dangling counts as absent for that snapshot and reappears
/// later as a new arrival rather than a move.
#[derive(Clone, Debug, Default)]
pub struct MigrationDiffTracker {
    state: PlacementState,
}

impl MigrationDiffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, current: &Placement) -> Vec<MigrationEvent> {
        let (next, events) = mem::take(&mut self.state).advance(current);
        self.state = next;
        events
    }

    pub fn state(&self) -> &PlacementState {
        &self.state
    }

    pub fn clear(&mut self) {
        self.state = PlacementState::default();
    }
}
