use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::RECONCILE_ISSUES_TOTAL;
use crate::store::StoreSnapshot;

use super::{Engine, EngineError, WardState};

/// A conflict found in the store of record. Each one is flagged, never
/// silently resolved; the loader keeps at most one assignment per bed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    /// Bed id appears more than once; the later record was kept.
    DuplicateBed { bed_id: BedId },
    /// Patient id appears more than once; the later record was kept.
    DuplicatePatient { patient_id: PatientId },
    /// Two admitted patients claim one bed. The earliest arrival kept it;
    /// the other was put back in the queue.
    SharedBed {
        bed_id: BedId,
        kept: PatientId,
        displaced: PatientId,
    },
    /// Admitted to a bed that does not exist. Re-queued.
    UnknownBed { patient_id: PatientId, bed_id: BedId },
    /// Admitted without a bed id. Re-queued.
    UnassignedAdmission { patient_id: PatientId },
    /// Admitted to a bed under maintenance. Re-queued.
    MaintenanceAssignment { patient_id: PatientId, bed_id: BedId },
    /// Bed stored as occupied but nobody holds it. Set free.
    OrphanedOccupancy { bed_id: BedId },
    /// Bed stored as free but held by an admitted patient. Set occupied.
    StatusMismatch { bed_id: BedId, patient_id: PatientId },
    /// Waiting patient still carried a bed id. Cleared.
    StaleAssignment { patient_id: PatientId, bed_id: BedId },
}

impl Issue {
    pub fn kind(&self) -> &'static str {
        match self {
            Issue::DuplicateBed { .. } => "duplicate_bed",
            Issue::DuplicatePatient { .. } => "duplicate_patient",
            Issue::SharedBed { .. } => "shared_bed",
            Issue::UnknownBed { .. } => "unknown_bed",
            Issue::UnassignedAdmission { .. } => "unassigned_admission",
            Issue::MaintenanceAssignment { .. } => "maintenance_assignment",
            Issue::OrphanedOccupancy { .. } => "orphaned_occupancy",
            Issue::StatusMismatch { .. } => "status_mismatch",
            Issue::StaleAssignment { .. } => "stale_assignment",
        }
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Issue::DuplicateBed { bed_id } => write!(f, "bed {bed_id} stored more than once"),
            Issue::DuplicatePatient { patient_id } => {
                write!(f, "patient {patient_id} stored more than once")
            }
            Issue::SharedBed { bed_id, kept, displaced } => write!(
                f,
                "bed {bed_id} claimed by {kept} and {displaced}; {displaced} re-queued"
            ),
            Issue::UnknownBed { patient_id, bed_id } => {
                write!(f, "patient {patient_id} admitted to unknown bed {bed_id}; re-queued")
            }
            Issue::UnassignedAdmission { patient_id } => {
                write!(f, "patient {patient_id} admitted without a bed; re-queued")
            }
            Issue::MaintenanceAssignment { patient_id, bed_id } => write!(
                f,
                "patient {patient_id} admitted to bed {bed_id} under maintenance; re-queued"
            ),
            Issue::OrphanedOccupancy { bed_id } => {
                write!(f, "bed {bed_id} occupied by nobody; set free")
            }
            Issue::StatusMismatch { bed_id, patient_id } => {
                write!(f, "bed {bed_id} stored free but held by {patient_id}; set occupied")
            }
            Issue::StaleAssignment { patient_id, bed_id } => {
                write!(f, "waiting patient {patient_id} still referenced bed {bed_id}; cleared")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub issues: Vec<Issue>,
    pub beds: usize,
    pub admitted: usize,
    pub waiting: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Escalate flagged records for operator review.
    pub fn ensure_clean(&self) -> Result<(), EngineError> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(EngineError::InvariantViolation(self.issues.clone()))
        }
    }
}

impl Engine {
    /// Rebuild an engine from the store of record. The returned engine
    /// satisfies every bed/patient/queue invariant; anything that had to be
    /// adjusted to get there is listed in the report.
    pub fn load(snapshot: StoreSnapshot, notify: Arc<NotifyHub>) -> (Self, ReconcileReport) {
        let (state, report) = WardState::reconcile(snapshot);
        for issue in &report.issues {
            warn!("reconcile: {issue}");
            metrics::counter!(RECONCILE_ISSUES_TOTAL, "kind" => issue.kind()).increment(1);
        }
        info!(
            "reconciled {} beds, {} admitted, {} waiting, {} issue(s)",
            report.beds,
            report.admitted,
            report.waiting,
            report.issues.len()
        );
        crate::observability::record_census(&state.census());
        (Self::with_state(state, notify), report)
    }
}

impl WardState {
    pub(crate) fn reconcile(snapshot: StoreSnapshot) -> (Self, ReconcileReport) {
        let mut state = WardState {
            revision: snapshot.revision,
            ..WardState::default()
        };
        let mut issues = Vec::new();

        for bed in snapshot.beds {
            let bed_id = bed.bed_id.clone();
            if state.registry.upsert(bed).is_some() {
                issues.push(Issue::DuplicateBed { bed_id });
            }
        }

        // Later duplicates win, and take the later position.
        let mut by_id: HashMap<PatientId, (usize, Patient)> = HashMap::new();
        for (pos, patient) in snapshot.patients.into_iter().enumerate() {
            let patient_id = patient.patient_id.clone();
            if by_id.insert(patient_id.clone(), (pos, patient)).is_some() {
                issues.push(Issue::DuplicatePatient { patient_id });
            }
        }
        let mut patients: Vec<(usize, Patient)> = by_id
            .into_values()
            .filter(|(_, p)| p.status != PatientStatus::Discharged)
            .collect();
        // Earliest arrival first, so it wins any contested bed.
        patients.sort_by_key(|(pos, p)| (p.requested_at.unwrap_or(Ms::MAX), *pos));

        state.last_stamp = patients
            .iter()
            .filter_map(|(_, p)| p.requested_at)
            .max()
            .unwrap_or(0);

        for (_, mut patient) in patients {
            if patient.requested_at.is_none() {
                patient.requested_at = Some(state.stamp());
            }
            match patient.status {
                PatientStatus::Admitted => state.restore_admission(patient, &mut issues),
                _ => {
                    if let Some(bed_id) = patient.assigned_bed_id.take() {
                        issues.push(Issue::StaleAssignment {
                            patient_id: patient.patient_id.clone(),
                            bed_id,
                        });
                    }
                    state.requeue(patient);
                }
            }
        }

        let orphaned: Vec<BedId> = state
            .registry
            .list_all()
            .iter()
            .filter(|b| b.status == BedStatus::Occupied && !state.occupancy.contains_key(&b.bed_id))
            .map(|b| b.bed_id.clone())
            .collect();
        for bed_id in orphaned {
            if state.registry.mark_free(&bed_id).is_ok() {
                issues.push(Issue::OrphanedOccupancy { bed_id });
            }
        }

        let report = ReconcileReport {
            issues,
            beds: state.registry.len(),
            admitted: state.admitted.len(),
            waiting: state.queue.size(),
        };
        (state, report)
    }

    fn restore_admission(&mut self, mut patient: Patient, issues: &mut Vec<Issue>) {
        let patient_id = patient.patient_id.clone();
        let Some(bed_id) = patient.assigned_bed_id.clone() else {
            issues.push(Issue::UnassignedAdmission { patient_id });
            self.requeue(patient);
            return;
        };
        let Some(bed) = self.registry.get(&bed_id).cloned() else {
            issues.push(Issue::UnknownBed { patient_id, bed_id });
            self.requeue(patient);
            return;
        };
        if bed.status == BedStatus::Maintenance {
            issues.push(Issue::MaintenanceAssignment { patient_id, bed_id });
            self.requeue(patient);
            return;
        }
        if let Some(kept) = self.occupancy.get(&bed_id) {
            issues.push(Issue::SharedBed {
                bed_id,
                kept: kept.clone(),
                displaced: patient_id,
            });
            self.requeue(patient);
            return;
        }

        if bed.status == BedStatus::Free {
            issues.push(Issue::StatusMismatch {
                bed_id: bed_id.clone(),
                patient_id: patient_id.clone(),
            });
        }
        self.registry.upsert(bed.with_status(BedStatus::Occupied));
        patient.status = PatientStatus::Admitted;
        self.occupancy.insert(bed_id, patient_id.clone());
        self.admitted.insert(patient_id, patient);
    }

    fn requeue(&mut self, mut patient: Patient) {
        patient.status = PatientStatus::Waiting;
        patient.assigned_bed_id = None;
        // Ids are unique by this point.
        let queued = self.queue.enqueue(patient);
        debug_assert!(queued.is_ok(), "requeued a duplicate patient id");
    }
}
