use std::collections::HashSet;

use crate::model::*;
use crate::store::StoreSnapshot;

use super::{Engine, EngineError, WardState};

impl WardState {
    pub(crate) fn snapshot(&self) -> StoreSnapshot {
        let mut patients: Vec<Patient> = self.admitted.values().cloned().collect();
        patients.sort_by(|a, b| {
            a.requested_at
                .cmp(&b.requested_at)
                .then_with(|| a.patient_id.cmp(&b.patient_id))
        });
        patients.extend(self.queue.iter().cloned());
        StoreSnapshot {
            revision: self.revision,
            beds: self.registry.list_all().to_vec(),
            patients,
        }
    }

    /// Verify the bed/patient/queue invariants. Returns the first violation found.
    pub(crate) fn check_invariants(&self) -> Result<(), EngineError> {
        fn violation(id: &str, reason: &'static str) -> EngineError {
            EngineError::BrokenInvariant {
                id: id.to_string(),
                reason,
            }
        }

        for bed in self.registry.list_all() {
            let occupant = self.occupancy.get(&bed.bed_id);
            match (bed.status, occupant) {
                (BedStatus::Occupied, None) => {
                    return Err(violation(&bed.bed_id, "occupied bed has no occupant"));
                }
                (BedStatus::Free | BedStatus::Maintenance, Some(_)) => {
                    return Err(violation(&bed.bed_id, "unoccupied bed has an occupant"));
                }
                _ => {}
            }
        }

        let mut seen_beds = HashSet::new();
        for (pid, patient) in &self.admitted {
            let bed_id = patient
                .assigned_bed_id
                .as_deref()
                .ok_or_else(|| violation(pid, "admitted patient has no bed"))?;
            if patient.status != PatientStatus::Admitted {
                return Err(violation(pid, "admitted patient has wrong status"));
            }
            if !seen_beds.insert(bed_id) {
                return Err(violation(bed_id, "bed assigned to two patients"));
            }
            if self.occupancy.get(bed_id) != Some(pid) {
                return Err(violation(pid, "patient and bed disagree on assignment"));
            }
            if self.queue.contains(pid) {
                return Err(violation(pid, "admitted patient is still queued"));
            }
        }
        if self.occupancy.len() != self.admitted.len() {
            return Err(violation("occupancy", "occupancy and admissions differ in size"));
        }

        let mut last: Option<Ms> = None;
        for patient in self.queue.iter() {
            if patient.status != PatientStatus::Waiting || patient.assigned_bed_id.is_some() {
                return Err(violation(&patient.patient_id, "queued patient is not waiting"));
            }
            let at = patient.requested_at.unwrap_or(Ms::MAX);
            if last.is_some_and(|prev| prev > at) {
                return Err(violation(&patient.patient_id, "queue out of arrival order"));
            }
            last = Some(at);
        }
        Ok(())
    }
}

impl Engine {
    pub async fn get_bed(&self, bed_id: &str) -> Option<Bed> {
        self.state.read().await.registry.get(bed_id).cloned()
    }

    pub async fn list_beds(&self) -> Vec<Bed> {
        self.state.read().await.registry.list_all().to_vec()
    }

    pub async fn search_beds(&self, criteria: &BedFilter) -> Vec<Bed> {
        let state = self.state.read().await;
        state.registry.filter(criteria).cloned().collect()
    }

    /// A waiting or admitted patient. Discharged patients are no longer tracked.
    pub async fn get_patient(&self, patient_id: &str) -> Option<Patient> {
        let state = self.state.read().await;
        state
            .admitted
            .get(patient_id)
            .or_else(|| state.queue.get(patient_id))
            .cloned()
    }

    pub async fn occupant(&self, bed_id: &str) -> Option<Patient> {
        let state = self.state.read().await;
        state
            .occupancy
            .get(bed_id)
            .and_then(|pid| state.admitted.get(pid))
            .cloned()
    }

    /// Waiting patients, front of the line first.
    pub async fn waiting(&self) -> Vec<Patient> {
        self.state.read().await.queue.iter().cloned().collect()
    }

    pub async fn queue_len(&self) -> usize {
        self.state.read().await.queue.size()
    }

    pub async fn queue_position(&self, patient_id: &str) -> Option<usize> {
        self.state.read().await.queue.position(patient_id)
    }

    pub async fn census(&self) -> Census {
        self.state.read().await.census()
    }

    pub async fn check_invariants(&self) -> Result<(), EngineError> {
        self.state.read().await.check_invariants()
    }

    /// Consistent copy of all tracked records, stamped with the current revision.
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.state.read().await.snapshot()
    }

    /// Highest revision handed out so far.
    pub async fn revision(&self) -> u64 {
        self.state.read().await.revision
    }
}
