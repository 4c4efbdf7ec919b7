use std::collections::{BTreeMap, HashMap};

use crate::model::*;

use super::EngineError;

/// Ordering key: arrival stamp, then insertion sequence for equal stamps.
type QueueKey = (Ms, u64);

/// Patients waiting for a bed, strictly FIFO by `requested_at`.
#[derive(Debug, Default)]
pub struct WaitQueue {
    order: BTreeMap<QueueKey, PatientId>,
    entries: HashMap<PatientId, (QueueKey, Patient)>,
    seq: u64,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert in `requested_at` order. Unstamped patients sort last.
    pub fn enqueue(&mut self, patient: Patient) -> Result<(), EngineError> {
        if self.entries.contains_key(&patient.patient_id) {
            return Err(EngineError::AlreadyQueued(patient.patient_id));
        }
        let key = (patient.requested_at.unwrap_or(Ms::MAX), self.seq);
        self.seq += 1;
        self.order.insert(key, patient.patient_id.clone());
        self.entries.insert(patient.patient_id.clone(), (key, patient));
        Ok(())
    }

    pub fn peek_front(&self) -> Option<&Patient> {
        let (_, id) = self.order.first_key_value()?;
        self.entries.get(id).map(|(_, p)| p)
    }

    pub fn dequeue_front(&mut self) -> Option<Patient> {
        let (_, id) = self.order.pop_first()?;
        self.entries.remove(&id).map(|(_, p)| p)
    }

    /// Remove a specific patient. `None` if absent.
    pub fn remove(&mut self, patient_id: &str) -> Option<Patient> {
        let (key, patient) = self.entries.remove(patient_id)?;
        self.order.remove(&key);
        Some(patient)
    }

    pub fn contains(&self, patient_id: &str) -> bool {
        self.entries.contains_key(patient_id)
    }

    pub fn get(&self, patient_id: &str) -> Option<&Patient> {
        self.entries.get(patient_id).map(|(_, p)| p)
    }

    /// Zero-based place in line.
    pub fn position(&self, patient_id: &str) -> Option<usize> {
        let (key, _) = self.entries.get(patient_id)?;
        Some(self.order.range(..*key).count())
    }

    pub fn size(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Waiting patients, front first.
    pub fn iter(&self) -> impl Iterator<Item = &Patient> {
        self.order
            .values()
            .filter_map(|id| self.entries.get(id).map(|(_, p)| p))
    }
}
