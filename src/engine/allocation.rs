use tracing::{debug, info};

use crate::limits::*;
use crate::model::*;
use crate::observability::{
    ADMISSION_REQUESTS_TOTAL, AUTO_ALLOCATIONS_TOTAL, DISCHARGES_TOTAL,
};

use super::validate::{validate_bed, validate_patient};
use super::{Engine, EngineError, WardState};

// ── Decisions (caller holds the write lock) ──────────────────────
//
// Each decision validates everything that can fail before its first
// mutation, so an error leaves the state untouched.

impl WardState {
    /// Put `patient` into the free bed `bed_id`.
    fn seat(&mut self, bed_id: &str, patient: &mut Patient) -> Result<(), EngineError> {
        self.registry.mark_occupied(bed_id)?;
        patient.status = PatientStatus::Admitted;
        patient.assigned_bed_id = Some(bed_id.to_string());
        self.occupancy
            .insert(bed_id.to_string(), patient.patient_id.clone());
        self.admitted
            .insert(patient.patient_id.clone(), patient.clone());
        Ok(())
    }

    /// Offer a bed to the queue head. Beds that are not `FREE` are never offered.
    fn offer(&mut self, bed_id: &str, events: &mut Vec<Event>) -> Result<Option<Patient>, EngineError> {
        let bed = self
            .registry
            .get(bed_id)
            .ok_or_else(|| EngineError::NotFound(bed_id.to_string()))?;
        if bed.status != BedStatus::Free {
            return Ok(None);
        }
        let Some(mut patient) = self.queue.dequeue_front() else {
            return Ok(None);
        };
        self.seat(bed_id, &mut patient)?;
        events.push(self.patient_event(&patient));
        Ok(Some(patient))
    }

    fn final_bed(&mut self, bed_id: &str, events: &mut Vec<Event>) -> Result<Bed, EngineError> {
        let bed = self
            .registry
            .get(bed_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(bed_id.to_string()))?;
        events.push(self.bed_event(&bed));
        Ok(bed)
    }

    fn free_beds(&self) -> Vec<BedId> {
        self.registry
            .filter(&BedFilter::any().with_status(BedStatus::Free))
            .map(|b| b.bed_id.clone())
            .collect()
    }

    /// Seat the queue head in a free bed, as its own supply outcome.
    fn seat_waiting(&mut self, bed_id: &str) -> Result<Option<SupplyOutcome>, EngineError> {
        let mut events = Vec::new();
        let Some(patient) = self.offer(bed_id, &mut events)? else {
            return Ok(None);
        };
        let bed = self.final_bed(bed_id, &mut events)?;
        Ok(Some(SupplyOutcome {
            bed,
            previous_status: Some(BedStatus::Free),
            discharged: None,
            allocated_patient: Some(patient),
            events,
        }))
    }

    pub(crate) fn bed_available(&mut self, bed: Bed) -> Result<SupplyOutcome, EngineError> {
        validate_bed(&bed)?;
        if bed.status == BedStatus::Occupied {
            return Err(EngineError::InvalidTransition {
                id: bed.bed_id,
                reason: "a bed cannot become available as occupied",
            });
        }
        match self.registry.get(&bed.bed_id) {
            Some(existing) if existing.status == BedStatus::Occupied => {
                return Err(EngineError::InvalidTransition {
                    id: bed.bed_id,
                    reason: "bed is occupied; release it first",
                });
            }
            None if self.registry.len() >= MAX_BEDS => {
                return Err(EngineError::LimitExceeded("too many beds"));
            }
            _ => {}
        }

        let bed_id = bed.bed_id.clone();
        let previous_status = self.registry.upsert(bed).map(|b| b.status);
        let mut events = Vec::new();
        let allocated_patient = self.offer(&bed_id, &mut events)?;
        let bed = self.final_bed(&bed_id, &mut events)?;
        Ok(SupplyOutcome {
            bed,
            previous_status,
            discharged: None,
            allocated_patient,
            events,
        })
    }

    pub(crate) fn bed_released(&mut self, bed_id: &str) -> Result<SupplyOutcome, EngineError> {
        let previous = self
            .registry
            .get(bed_id)
            .map(|b| b.status)
            .ok_or_else(|| EngineError::NotFound(bed_id.to_string()))?;
        self.registry.mark_free(bed_id)?;

        let mut events = Vec::new();
        let discharged = self
            .occupancy
            .remove(bed_id)
            .and_then(|pid| self.admitted.remove(&pid))
            .map(|mut p| {
                p.status = PatientStatus::Discharged;
                p
            });
        if let Some(ref p) = discharged {
            events.push(self.patient_event(p));
        }

        let allocated_patient = self.offer(bed_id, &mut events)?;
        let bed = if previous == BedStatus::Free && events.is_empty() {
            // Already free with nobody waiting: no change, no revision.
            self.registry
                .get(bed_id)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(bed_id.to_string()))?
        } else {
            self.final_bed(bed_id, &mut events)?
        };
        Ok(SupplyOutcome {
            bed,
            previous_status: Some(previous),
            discharged,
            allocated_patient,
            events,
        })
    }

    pub(crate) fn admit(&mut self, mut patient: Patient, criteria: &BedFilter) -> Result<AdmissionOutcome, EngineError> {
        validate_patient(&patient)?;
        let id = patient.patient_id.clone();
        if patient.status == PatientStatus::Admitted || self.admitted.contains_key(&id) {
            return Err(EngineError::InvalidTransition {
                id,
                reason: "patient is already admitted",
            });
        }
        if self.queue.contains(&id) {
            return Err(EngineError::AlreadyQueued(id));
        }

        // Everyone already waiting is served first. The newcomer only gets a
        // bed if one is left over, preferring one that matches `criteria`.
        let free = self.free_beds();
        let waiting = self.queue.size();
        let own_bed = if free.len() > waiting {
            let search = BedFilter {
                status: Some(BedStatus::Free),
                ..criteria.clone()
            };
            self.registry
                .filter(&search)
                .next()
                .map(|b| b.bed_id.clone())
                .or_else(|| free.first().cloned())
        } else {
            None
        };
        if own_bed.is_none() && waiting - free.len() >= MAX_WAITING {
            return Err(EngineError::LimitExceeded("wait queue is full"));
        }

        patient.status = PatientStatus::Waiting;
        patient.assigned_bed_id = None;
        patient.requested_at = Some(self.stamp());

        let mut events = Vec::new();
        let mut seated_ahead = Vec::new();
        for bed_id in free.iter().filter(|b| Some(*b) != own_bed.as_ref()) {
            if self.queue.is_empty() {
                break;
            }
            if let Some(outcome) = self.seat_waiting(bed_id)? {
                events.extend(outcome.events.iter().cloned());
                seated_ahead.push(outcome);
            }
        }

        let bed = match own_bed {
            Some(bed_id) => {
                self.seat(&bed_id, &mut patient)?;
                events.push(self.patient_event(&patient));
                Some(self.final_bed(&bed_id, &mut events)?)
            }
            None => {
                self.queue.enqueue(patient.clone())?;
                events.push(self.patient_event(&patient));
                None
            }
        };
        Ok(AdmissionOutcome {
            patient,
            bed,
            seated_ahead,
            events,
        })
    }

    pub(crate) fn discharge(&mut self, patient_id: &str) -> Result<DischargeOutcome, EngineError> {
        if let Some(mut patient) = self.queue.remove(patient_id) {
            patient.status = PatientStatus::Discharged;
            let events = vec![self.patient_event(&patient)];
            return Ok(DischargeOutcome {
                patient,
                release: None,
                events,
            });
        }

        let bed_id = self
            .admitted
            .get(patient_id)
            .and_then(|p| p.assigned_bed_id.clone())
            .ok_or_else(|| EngineError::NotFound(patient_id.to_string()))?;
        let release = self.bed_released(&bed_id)?;
        let patient = release
            .discharged
            .clone()
            .ok_or_else(|| EngineError::NotFound(patient_id.to_string()))?;
        let events = release.events.clone();
        Ok(DischargeOutcome {
            patient,
            release: Some(release),
            events,
        })
    }

    pub(crate) fn rebalance(&mut self) -> Result<Vec<SupplyOutcome>, EngineError> {
        let mut outcomes = Vec::new();
        for bed_id in self.free_beds() {
            if self.queue.is_empty() {
                break;
            }
            if let Some(outcome) = self.seat_waiting(&bed_id)? {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }
}

// ── Public, lock-taking operations ───────────────────────────────

impl Engine {
    /// Supply event: a bed was added or became usable again. Upserts the bed
    /// and, if it is `FREE` and someone is waiting, seats the queue head.
    ///
    /// A bed supplied in `MAINTENANCE` is registered but never offered.
    pub async fn on_bed_available(&self, bed: Bed) -> Result<SupplyOutcome, EngineError> {
        let mut state = self.state.write().await;
        let outcome = state.bed_available(bed)?;
        self.publish(&state, &outcome.events);
        drop(state);

        if let Some(ref p) = outcome.allocated_patient {
            metrics::counter!(AUTO_ALLOCATIONS_TOTAL, "trigger" => "bed_available").increment(1);
            info!("waiting patient {} seated in bed {}", p.patient_id, outcome.bed.bed_id);
        } else {
            debug!("bed {} available as {}", outcome.bed.bed_id, outcome.bed.status);
        }
        Ok(outcome)
    }

    /// Supply event: the bed was emptied. Discharges its occupant, marks it
    /// `FREE`, then re-offers it to the queue head in the same step.
    pub async fn on_bed_released(&self, bed_id: &str) -> Result<SupplyOutcome, EngineError> {
        let mut state = self.state.write().await;
        let outcome = state.bed_released(bed_id)?;
        self.publish(&state, &outcome.events);
        drop(state);

        if outcome.discharged.is_some() {
            metrics::counter!(DISCHARGES_TOTAL).increment(1);
        }
        if let Some(ref p) = outcome.allocated_patient {
            metrics::counter!(AUTO_ALLOCATIONS_TOTAL, "trigger" => "bed_released").increment(1);
            info!("bed {bed_id} released and re-assigned to {}", p.patient_id);
        } else if outcome.events.is_empty() {
            debug!("bed {bed_id} was already free");
        } else {
            debug!("bed {bed_id} released and is now free");
        }
        Ok(outcome)
    }

    /// Demand event: stamp the patient with the current time, seat anyone
    /// already waiting in free beds, then give the patient a leftover free bed
    /// (the first matching `criteria`, else the first in registry order) or
    /// queue them.
    pub async fn request_admission(
        &self,
        patient: Patient,
        criteria: &BedFilter,
    ) -> Result<AdmissionOutcome, EngineError> {
        let mut state = self.state.write().await;
        let outcome = match state.admit(patient, criteria) {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::counter!(ADMISSION_REQUESTS_TOTAL, "outcome" => "rejected").increment(1);
                return Err(e);
            }
        };
        self.publish(&state, &outcome.events);
        drop(state);

        let label = if outcome.bed.is_some() { "admitted" } else { "queued" };
        metrics::counter!(ADMISSION_REQUESTS_TOTAL, "outcome" => label).increment(1);
        if !outcome.seated_ahead.is_empty() {
            metrics::counter!(AUTO_ALLOCATIONS_TOTAL, "trigger" => "admission")
                .increment(outcome.seated_ahead.len() as u64);
            info!(
                "admission of {} first seated {} waiting patient(s)",
                outcome.patient.patient_id,
                outcome.seated_ahead.len()
            );
        }
        debug!("admission request for {}: {label}", outcome.patient.patient_id);
        Ok(outcome)
    }

    /// Withdraw a waiting patient, or discharge an admitted one and re-offer their bed.
    pub async fn discharge(&self, patient_id: &str) -> Result<DischargeOutcome, EngineError> {
        let mut state = self.state.write().await;
        let outcome = state.discharge(patient_id)?;
        self.publish(&state, &outcome.events);
        drop(state);

        metrics::counter!(DISCHARGES_TOTAL).increment(1);
        if let Some(p) = outcome.release.as_ref().and_then(|r| r.allocated_patient.as_ref()) {
            metrics::counter!(AUTO_ALLOCATIONS_TOTAL, "trigger" => "discharge").increment(1);
            info!("discharge of {patient_id} freed a bed for {}", p.patient_id);
        }
        Ok(outcome)
    }

    /// Offer every free bed to the queue, in registry order, until one side runs out.
    pub async fn rebalance(&self) -> Result<Vec<SupplyOutcome>, EngineError> {
        let mut state = self.state.write().await;
        let outcomes = state.rebalance()?;
        for outcome in &outcomes {
            self.publish(&state, &outcome.events);
        }
        drop(state);

        if !outcomes.is_empty() {
            metrics::counter!(AUTO_ALLOCATIONS_TOTAL, "trigger" => "rebalance")
                .increment(outcomes.len() as u64);
            info!("rebalance seated {} waiting patient(s)", outcomes.len());
        }
        Ok(outcomes)
    }
}
