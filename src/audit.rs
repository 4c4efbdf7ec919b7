use serde::Serialize;
use ulid::Ulid;

use crate::model::*;

/// Actor recorded for decisions the engine makes on its own.
pub const SYSTEM_ACTOR: &str = "System";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    AddBed,
    AdmitPatient,
    DischargePatient,
    UpdateStatus,
    Other,
}

/// One activity-log line, ready for the service's audit sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Ulid,
    pub action: AuditAction,
    pub description: String,
    pub performed_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bed_id: Option<BedId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
    pub at: Ms,
}

impl AuditEntry {
    fn new(action: AuditAction, description: String, performed_by: &str) -> Self {
        Self {
            id: Ulid::new(),
            action,
            description,
            performed_by: performed_by.to_string(),
            bed_id: None,
            patient_id: None,
            at: now_ms(),
        }
    }

    fn bed(mut self, bed_id: &str) -> Self {
        self.bed_id = Some(bed_id.to_string());
        self
    }

    fn patient(mut self, patient_id: &str) -> Self {
        self.patient_id = Some(patient_id.to_string());
        self
    }
}

fn auto_admission(bed: &Bed, patient: &Patient, description: String) -> AuditEntry {
    AuditEntry::new(AuditAction::AdmitPatient, description, SYSTEM_ACTOR)
        .bed(&bed.bed_id)
        .patient(&patient.patient_id)
}

fn queue_admission(bed: &Bed, patient: &Patient) -> AuditEntry {
    auto_admission(
        bed,
        patient,
        format!(
            "Queue patient {} automatically admitted to {}",
            patient.display_name(),
            bed.bed_id
        ),
    )
}

/// Entries for `on_bed_available`: the bed itself (added, or an existing
/// bed updated), then any waiting patient the engine seated in it.
pub fn for_bed_available(outcome: &SupplyOutcome, actor: &str) -> Vec<AuditEntry> {
    let bed = &outcome.bed;
    let mut entries = Vec::new();
    match outcome.previous_status {
        None => entries.push(
            AuditEntry::new(
                AuditAction::AddBed,
                format!("Added new bed {} in ward {}", bed.bed_id, bed.ward_number),
                actor,
            )
            .bed(&bed.bed_id),
        ),
        Some(previous) => {
            // A seated patient means the bed was supplied as FREE.
            let supplied = if outcome.allocated_patient.is_some() {
                BedStatus::Free
            } else {
                bed.status
            };
            entries.push(
                AuditEntry::new(
                    AuditAction::UpdateStatus,
                    format!(
                        "Bed {} in ward {} changed from {previous} to {supplied}",
                        bed.bed_id, bed.ward_number
                    ),
                    actor,
                )
                .bed(&bed.bed_id),
            );
        }
    }
    if let Some(p) = &outcome.allocated_patient {
        entries.push(match outcome.previous_status {
            None => auto_admission(
                bed,
                p,
                format!(
                    "Waitlisted patient {} assigned to new bed {}",
                    p.display_name(),
                    bed.bed_id
                ),
            ),
            Some(_) => queue_admission(bed, p),
        });
    }
    entries
}

/// Entries for `on_bed_released` (and the release half of a discharge).
/// Releasing a bed that was already free records nothing.
pub fn for_bed_released(outcome: &SupplyOutcome, actor: &str) -> Vec<AuditEntry> {
    let bed = &outcome.bed;
    let mut entries = Vec::new();
    match &outcome.discharged {
        Some(p) => entries.push(
            AuditEntry::new(
                AuditAction::DischargePatient,
                format!("Discharged patient from bed {}", bed.bed_id),
                actor,
            )
            .bed(&bed.bed_id)
            .patient(&p.patient_id),
        ),
        None if outcome.previous_status != Some(BedStatus::Free) => entries.push(
            AuditEntry::new(
                AuditAction::UpdateStatus,
                format!("Bed {} marked {}", bed.bed_id, BedStatus::Free),
                actor,
            )
            .bed(&bed.bed_id),
        ),
        None => {}
    }
    if let Some(p) = &outcome.allocated_patient {
        entries.push(queue_admission(bed, p));
    }
    entries
}

/// Entries for `request_admission`: system seatings of earlier arrivals,
/// then the requesting patient.
pub fn for_admission(outcome: &AdmissionOutcome, actor: &str) -> Vec<AuditEntry> {
    let p = &outcome.patient;
    let entry = match &outcome.bed {
        Some(bed) => AuditEntry::new(
            AuditAction::AdmitPatient,
            format!("Admitted patient {} to bed {}", p.display_name(), bed.bed_id),
            actor,
        )
        .bed(&bed.bed_id),
        None => AuditEntry::new(
            AuditAction::Other,
            format!("Patient {} added to wait queue", p.display_name()),
            actor,
        ),
    };
    let mut entries = for_rebalance(&outcome.seated_ahead);
    entries.push(entry.patient(&p.patient_id));
    entries
}

pub fn for_discharge(outcome: &DischargeOutcome, actor: &str) -> Vec<AuditEntry> {
    match &outcome.release {
        Some(release) => for_bed_released(release, actor),
        None => vec![
            AuditEntry::new(
                AuditAction::Other,
                format!(
                    "Patient {} withdrawn from wait queue",
                    outcome.patient.display_name()
                ),
                actor,
            )
            .patient(&outcome.patient.patient_id),
        ],
    }
}

/// Rebalance seats patients on its own; every entry is the system's.
pub fn for_rebalance(outcomes: &[SupplyOutcome]) -> Vec<AuditEntry> {
    outcomes
        .iter()
        .filter_map(|o| o.allocated_patient.as_ref().map(|p| queue_admission(&o.bed, p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seated(name: &str, bed_id: &str) -> Patient {
        let mut p = Patient::new(format!("P-{name}")).with_name(name);
        p.status = PatientStatus::Admitted;
        p.assigned_bed_id = Some(bed_id.to_string());
        p
    }

    #[test]
    fn bed_added_with_waiting_patient() {
        let outcome = SupplyOutcome {
            bed: Bed::new("B-7", "3", "ICU").with_status(BedStatus::Occupied),
            previous_status: None,
            discharged: None,
            allocated_patient: Some(seated("Ada", "B-7")),
            events: vec![],
        };
        let entries = for_bed_available(&outcome, "nurse.kim");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, AuditAction::AddBed);
        assert_eq!(entries[0].description, "Added new bed B-7 in ward 3");
        assert_eq!(entries[0].performed_by, "nurse.kim");
        assert_eq!(entries[1].action, AuditAction::AdmitPatient);
        assert_eq!(
            entries[1].description,
            "Waitlisted patient Ada assigned to new bed B-7"
        );
        assert_eq!(entries[1].performed_by, SYSTEM_ACTOR);
        assert_eq!(entries[1].patient_id.as_deref(), Some("P-Ada"));
    }

    #[test]
    fn release_discharges_then_auto_admits() {
        let mut gone = seated("Bob", "B-1");
        gone.status = PatientStatus::Discharged;
        let outcome = SupplyOutcome {
            bed: Bed::new("B-1", "2", "General").with_status(BedStatus::Occupied),
            previous_status: Some(BedStatus::Occupied),
            discharged: Some(gone),
            allocated_patient: Some(seated("Cy", "B-1")),
            events: vec![],
        };
        let entries = for_bed_released(&outcome, "dr.ng");
        let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            [AuditAction::DischargePatient, AuditAction::AdmitPatient]
        );
        assert_eq!(entries[0].description, "Discharged patient from bed B-1");
        assert_eq!(
            entries[1].description,
            "Queue patient Cy automatically admitted to B-1"
        );
    }

    #[test]
    fn existing_bed_back_from_maintenance_is_status_update() {
        let outcome = SupplyOutcome {
            bed: Bed::new("B-2", "4", "General").with_status(BedStatus::Occupied),
            previous_status: Some(BedStatus::Maintenance),
            discharged: None,
            allocated_patient: Some(seated("Eve", "B-2")),
            events: vec![],
        };
        let entries = for_bed_available(&outcome, "nurse.kim");
        let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
        assert_eq!(actions, [AuditAction::UpdateStatus, AuditAction::AdmitPatient]);
        assert_eq!(
            entries[0].description,
            "Bed B-2 in ward 4 changed from MAINTENANCE to FREE"
        );
        assert_eq!(
            entries[1].description,
            "Queue patient Eve automatically admitted to B-2"
        );

        let parked = SupplyOutcome {
            bed: Bed::new("B-2", "4", "General").with_status(BedStatus::Maintenance),
            previous_status: Some(BedStatus::Free),
            discharged: None,
            allocated_patient: None,
            events: vec![],
        };
        let entries = for_bed_available(&parked, "nurse.kim");
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].description,
            "Bed B-2 in ward 4 changed from FREE to MAINTENANCE"
        );
    }

    #[test]
    fn releasing_free_bed_records_nothing() {
        let outcome = SupplyOutcome {
            bed: Bed::new("B-1", "2", "General"),
            previous_status: Some(BedStatus::Free),
            discharged: None,
            allocated_patient: None,
            events: vec![],
        };
        assert!(for_bed_released(&outcome, "dr.ng").is_empty());

        let cleared = SupplyOutcome {
            previous_status: Some(BedStatus::Occupied),
            ..outcome
        };
        let entries = for_bed_released(&cleared, "dr.ng");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::UpdateStatus);
    }

    #[test]
    fn queued_admission_is_other() {
        let outcome = AdmissionOutcome {
            patient: Patient::new("P-1").with_name("Dee"),
            bed: None,
            seated_ahead: vec![],
            events: vec![],
        };
        let entries = for_admission(&outcome, "clerk");
        assert_eq!(entries[0].action, AuditAction::Other);
        assert_eq!(entries[0].bed_id, None);
        assert_eq!(entries[0].patient_id.as_deref(), Some("P-1"));
    }

    #[test]
    fn admission_lists_earlier_arrivals_first() {
        let ahead = SupplyOutcome {
            bed: Bed::new("B-1", "1", "General").with_status(BedStatus::Occupied),
            previous_status: Some(BedStatus::Free),
            discharged: None,
            allocated_patient: Some(seated("Flo", "B-1")),
            events: vec![],
        };
        let outcome = AdmissionOutcome {
            patient: Patient::new("P-2").with_name("Gus"),
            bed: None,
            seated_ahead: vec![ahead],
            events: vec![],
        };
        let entries = for_admission(&outcome, "clerk");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].performed_by, SYSTEM_ACTOR);
        assert_eq!(entries[0].patient_id.as_deref(), Some("P-Flo"));
        assert_eq!(entries[1].performed_by, "clerk");
        assert_eq!(entries[1].description, "Patient Gus added to wait queue");
    }

    #[test]
    fn entries_are_stamped_with_wall_clock() {
        let before = now_ms();
        let entry = AuditEntry::new(AuditAction::Other, "x".into(), SYSTEM_ACTOR);
        assert!(entry.at >= before && entry.at <= now_ms());
        assert!(entry.at > 0);
    }

    #[test]
    fn serializes_with_store_names() {
        let entry = AuditEntry::new(AuditAction::DischargePatient, "x".into(), SYSTEM_ACTOR)
            .bed("B-1");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["action"], "DISCHARGE_PATIENT");
        assert_eq!(json["performedBy"], "System");
        assert_eq!(json["bedId"], "B-1");
        assert!(json.get("patientId").is_none());
    }
}
