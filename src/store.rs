use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::model::*;

/// Beds and non-discharged patients as held by the store of record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Latest engine revision reflected here. Zero for external exports.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub beds: Vec<Bed>,
    #[serde(default)]
    pub patients: Vec<Patient>,
}

impl StoreSnapshot {
    pub fn is_empty(&self) -> bool {
        self.beds.is_empty() && self.patients.is_empty()
    }

    /// Fold journal events into the state they describe.
    ///
    /// Highest revision wins per record, so out-of-order appends from
    /// concurrent committers resolve to the latest decision. Events after a
    /// checkpoint marker at or below its revision are already reflected and
    /// are skipped. Discharged patients are dropped.
    pub fn from_events(events: &[Event]) -> Self {
        let mut beds: HashMap<&str, (u64, usize, &Bed)> = HashMap::new();
        let mut patients: HashMap<&str, (u64, usize, &Patient)> = HashMap::new();
        let mut floor: Option<u64> = None;
        let mut revision = 0u64;

        for (pos, event) in events.iter().enumerate() {
            let rev = event.revision();
            revision = revision.max(rev);
            match event {
                Event::Checkpoint { revision } => {
                    floor = Some(floor.map_or(*revision, |f| f.max(*revision)))
                }
                _ if floor.is_some_and(|f| rev <= f) => {}
                Event::BedPut { bed, .. } => {
                    let slot = beds.entry(bed.bed_id.as_str()).or_insert((rev, pos, bed));
                    if rev >= slot.0 {
                        // Keep first-seen position for stable registry order.
                        *slot = (rev, slot.1, bed);
                    }
                }
                Event::PatientPut { patient, .. } => {
                    let slot = patients
                        .entry(patient.patient_id.as_str())
                        .or_insert((rev, pos, patient));
                    if rev >= slot.0 {
                        *slot = (rev, slot.1, patient);
                    }
                }
            }
        }

        let mut beds: Vec<_> = beds.into_values().collect();
        beds.sort_by_key(|(_, pos, _)| *pos);
        let mut patients: Vec<_> = patients
            .into_values()
            .filter(|(_, _, p)| p.status != PatientStatus::Discharged)
            .collect();
        patients.sort_by_key(|(_, pos, _)| *pos);

        Self {
            revision,
            beds: beds.into_iter().map(|(_, _, b)| b.clone()).collect(),
            patients: patients.into_iter().map(|(_, _, p)| p.clone()).collect(),
        }
    }

    /// Journal form: every record at `self.revision`, then a checkpoint marker.
    pub fn into_events(self) -> Vec<Event> {
        let revision = self.revision;
        let mut events: Vec<Event> = self
            .beds
            .into_iter()
            .map(|bed| Event::BedPut { revision, bed })
            .chain(
                self.patients
                    .into_iter()
                    .map(|patient| Event::PatientPut { revision, patient }),
            )
            .collect();
        events.push(Event::Checkpoint { revision });
        events
    }
}

/// Source of durable state read at startup. The surrounding service
/// implements this over its own database.
#[async_trait]
pub trait StoreOfRecord: Send + Sync {
    async fn load(&self) -> Result<StoreSnapshot, EngineError>;
}

/// A JSON export of the store of record: `{"beds": [...], "patients": [...]}`
/// with records in their stored camelCase form.
#[derive(Debug, Clone)]
pub struct JsonExport {
    path: PathBuf,
}

impl JsonExport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StoreOfRecord for JsonExport {
    async fn load(&self) -> Result<StoreSnapshot, EngineError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| EngineError::WalError(format!("{}: {e}", self.path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::WalError(format!("{}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bed_put(revision: u64, id: &str, status: BedStatus) -> Event {
        Event::BedPut {
            revision,
            bed: Bed::new(id, "1", "General").with_status(status),
        }
    }

    fn patient_put(revision: u64, id: &str, status: PatientStatus) -> Event {
        let mut patient = Patient::new(id);
        patient.status = status;
        Event::PatientPut { revision, patient }
    }

    #[test]
    fn latest_revision_wins_even_out_of_order() {
        let events = vec![
            bed_put(1, "A", BedStatus::Free),
            bed_put(3, "A", BedStatus::Free),
            bed_put(2, "A", BedStatus::Occupied), // late append of an older decision
        ];
        let snap = StoreSnapshot::from_events(&events);
        assert_eq!(snap.beds.len(), 1);
        assert_eq!(snap.beds[0].status, BedStatus::Free);
        assert_eq!(snap.revision, 3);
    }

    #[test]
    fn discharged_patients_are_dropped() {
        let events = vec![
            patient_put(1, "P1", PatientStatus::Waiting),
            patient_put(2, "P2", PatientStatus::Waiting),
            patient_put(3, "P1", PatientStatus::Discharged),
        ];
        let snap = StoreSnapshot::from_events(&events);
        let ids: Vec<_> = snap.patients.iter().map(|p| p.patient_id.as_str()).collect();
        assert_eq!(ids, ["P2"]);
    }

    #[test]
    fn records_keep_first_seen_order() {
        let events = vec![
            bed_put(1, "B", BedStatus::Free),
            bed_put(2, "A", BedStatus::Free),
            bed_put(3, "B", BedStatus::Occupied),
        ];
        let snap = StoreSnapshot::from_events(&events);
        let ids: Vec<_> = snap.beds.iter().map(|b| b.bed_id.as_str()).collect();
        assert_eq!(ids, ["B", "A"]);
    }

    #[test]
    fn checkpoint_shadows_stale_tail() {
        let mut events = StoreSnapshot {
            revision: 10,
            beds: vec![Bed::new("A", "1", "General")],
            patients: vec![],
        }
        .into_events();
        // A decision from before the checkpoint, appended after it.
        events.push(patient_put(9, "ghost", PatientStatus::Waiting));
        // A genuinely newer decision.
        events.push(bed_put(11, "A", BedStatus::Maintenance));

        let snap = StoreSnapshot::from_events(&events);
        assert!(snap.patients.is_empty());
        assert_eq!(snap.beds[0].status, BedStatus::Maintenance);
        assert_eq!(snap.revision, 11);
    }

    #[test]
    fn checkpoint_at_revision_zero_keeps_its_body() {
        let events = StoreSnapshot {
            revision: 0,
            beds: vec![Bed::new("A", "1", "General")],
            patients: vec![Patient::new("P1")],
        }
        .into_events();
        let snap = StoreSnapshot::from_events(&events);
        assert_eq!(snap.beds.len(), 1);
        assert_eq!(snap.patients.len(), 1);
    }

    #[test]
    fn empty_events() {
        let snap = StoreSnapshot::from_events(&[]);
        assert!(snap.is_empty());
        assert_eq!(snap.revision, 0);
    }

    #[tokio::test]
    async fn json_export_loads_store_records() {
        let dir = std::env::temp_dir().join("bedq_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("export.json");
        std::fs::write(
            &path,
            r#"{
                "beds": [
                    {"bedId": "B-1", "wardNumber": "3", "type": "ICU", "status": "OCCUPIED"},
                    {"bedId": "B-2", "wardNumber": "3", "type": "ICU", "status": "FREE"}
                ],
                "patients": [
                    {"patientId": "P-1", "name": "Ada", "status": "ADMITTED",
                     "assignedBedId": "B-1", "requestedAt": 1000}
                ]
            }"#,
        )
        .unwrap();

        let snap = JsonExport::new(&path).load().await.unwrap();
        assert_eq!(snap.revision, 0);
        assert_eq!(snap.beds.len(), 2);
        assert_eq!(snap.beds[0].status, BedStatus::Occupied);
        assert_eq!(snap.patients[0].assigned_bed_id.as_deref(), Some("B-1"));
        assert_eq!(snap.patients[0].requested_at, Some(1000));
    }

    #[tokio::test]
    async fn json_export_missing_file() {
        let result = JsonExport::new("/nonexistent/bedq/export.json").load().await;
        assert!(matches!(result, Err(EngineError::WalError(_))));
    }
}
