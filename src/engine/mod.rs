mod allocation;
mod error;
mod queries;
mod queue;
mod reconcile;
mod registry;
mod validate;

pub use error::EngineError;
pub use queue::WaitQueue;
pub use reconcile::{Issue, ReconcileReport};
pub use registry::BedRegistry;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::model::*;
use crate::notify::{NotifyHub, WAIT_QUEUE_CHANNEL};

/// Everything the engine decides over. Guarded as one unit so that
/// "find bed, assign, update queue" is indivisible.
#[derive(Debug, Default)]
pub(crate) struct WardState {
    pub(crate) registry: BedRegistry,
    pub(crate) queue: WaitQueue,
    /// Currently admitted patients by id.
    pub(crate) admitted: HashMap<PatientId, Patient>,
    /// Occupied bed → its single occupant.
    pub(crate) occupancy: HashMap<BedId, PatientId>,
    revision: u64,
    last_stamp: Ms,
}

impl WardState {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    /// Monotonic arrival stamp, never behind a previous one.
    fn stamp(&mut self) -> Ms {
        let now = now_ms().max(self.last_stamp);
        self.last_stamp = now;
        now
    }

    fn bed_event(&mut self, bed: &Bed) -> Event {
        Event::BedPut {
            revision: self.next_revision(),
            bed: bed.clone(),
        }
    }

    fn patient_event(&mut self, patient: &Patient) -> Event {
        Event::PatientPut {
            revision: self.next_revision(),
            patient: patient.clone(),
        }
    }

    fn census(&self) -> Census {
        Census {
            free: self.registry.count(BedStatus::Free),
            occupied: self.registry.count(BedStatus::Occupied),
            maintenance: self.registry.count(BedStatus::Maintenance),
            waiting: self.queue.size(),
            admitted: self.admitted.len(),
        }
    }
}

/// The authoritative bed/queue store. Share it as `Arc<Engine>`; every
/// mutation serializes on one write lock, queries take the read lock.
pub struct Engine {
    state: RwLock<WardState>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(notify: Arc<NotifyHub>) -> Self {
        Self::with_state(WardState::default(), notify)
    }

    pub(crate) fn with_state(state: WardState, notify: Arc<NotifyHub>) -> Self {
        Self {
            state: RwLock::new(state),
            notify,
        }
    }

    /// Fan decided events out to ward subscribers. Caller holds the write lock,
    /// so subscribers see events in decision order.
    fn publish(&self, state: &WardState, events: &[Event]) {
        for event in events {
            let channel = match event {
                Event::BedPut { bed, .. } => Some(bed.ward_number.as_str()),
                Event::PatientPut { patient, .. } => Some(
                    patient
                        .assigned_bed_id
                        .as_deref()
                        .and_then(|id| state.registry.get(id))
                        .map_or(WAIT_QUEUE_CHANNEL, |b| b.ward_number.as_str()),
                ),
                Event::Checkpoint { .. } => None,
            };
            if let Some(channel) = channel {
                self.notify.send(channel, event);
            }
        }
        crate::observability::record_census(&state.census());
    }
}
