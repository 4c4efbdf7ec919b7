use serde::{Deserialize, Serialize};

/// Unix milliseconds.
pub type Ms = i64;

/// Wall clock in Unix milliseconds; 0 if the clock is before the epoch.
pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as Ms)
}

pub type BedId = String;
pub type PatientId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BedStatus {
    Free,
    Occupied,
    /// Out of service. Never auto-assigned.
    Maintenance,
}

impl BedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BedStatus::Free => "FREE",
            BedStatus::Occupied => "OCCUPIED",
            BedStatus::Maintenance => "MAINTENANCE",
        }
    }

    /// Parse the wire spelling (`FREE`, `OCCUPIED`, `MAINTENANCE`), case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FREE" => Some(BedStatus::Free),
            "OCCUPIED" => Some(BedStatus::Occupied),
            "MAINTENANCE" => Some(BedStatus::Maintenance),
            _ => None,
        }
    }
}

impl std::fmt::Display for BedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatientStatus {
    Waiting,
    Admitted,
    Discharged,
}

impl PatientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientStatus::Waiting => "WAITING",
            PatientStatus::Admitted => "ADMITTED",
            PatientStatus::Discharged => "DISCHARGED",
        }
    }
}

impl std::fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bed {
    pub bed_id: BedId,
    pub ward_number: String,
    #[serde(rename = "type")]
    pub bed_type: String,
    pub status: BedStatus,
}

impl Bed {
    /// A new bed starts out `FREE`.
    pub fn new(bed_id: impl Into<BedId>, ward_number: impl Into<String>, bed_type: impl Into<String>) -> Self {
        Self {
            bed_id: bed_id.into(),
            ward_number: ward_number.into(),
            bed_type: bed_type.into(),
            status: BedStatus::Free,
        }
    }

    pub fn with_status(mut self, status: BedStatus) -> Self {
        self.status = status;
        self
    }
}

/// The admission-relevant subset of a patient record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub patient_id: PatientId,
    #[serde(default)]
    pub name: Option<String>,
    pub status: PatientStatus,
    /// Set while admitted; kept as history once discharged.
    #[serde(default)]
    pub assigned_bed_id: Option<BedId>,
    /// Arrival stamp used for FIFO ordering.
    #[serde(default)]
    pub requested_at: Option<Ms>,
}

impl Patient {
    pub fn new(patient_id: impl Into<PatientId>) -> Self {
        Self {
            patient_id: patient_id.into(),
            name: None,
            status: PatientStatus::Waiting,
            assigned_bed_id: None,
            requested_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name for human-readable messages, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.patient_id)
    }
}

/// Linear-scan criteria. Every present field must match; absent fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedFilter {
    #[serde(default)]
    pub ward_number: Option<String>,
    #[serde(default, rename = "type")]
    pub bed_type: Option<String>,
    #[serde(default)]
    pub status: Option<BedStatus>,
}

impl BedFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn ward(ward_number: impl Into<String>) -> Self {
        Self {
            ward_number: Some(ward_number.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: BedStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, bed_type: impl Into<String>) -> Self {
        self.bed_type = Some(bed_type.into());
        self
    }

    pub fn matches(&self, bed: &Bed) -> bool {
        self.ward_number.as_ref().is_none_or(|w| *w == bed.ward_number)
            && self.bed_type.as_ref().is_none_or(|t| *t == bed.bed_type)
            && self.status.is_none_or(|s| s == bed.status)
    }
}

/// Journal record. Each carries the engine revision it was decided at;
/// replay keeps the highest revision per record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BedPut { revision: u64, bed: Bed },
    PatientPut { revision: u64, patient: Patient },
    /// Everything at or below `revision` is already reflected in the records before it.
    Checkpoint { revision: u64 },
}

impl Event {
    pub fn revision(&self) -> u64 {
        match self {
            Event::BedPut { revision, .. }
            | Event::PatientPut { revision, .. }
            | Event::Checkpoint { revision } => *revision,
        }
    }
}

// ── Operation outcomes ───────────────────────────────────────────

/// Result of a supply event (bed added or released).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyOutcome {
    /// The bed in its final state.
    pub bed: Bed,
    /// Status before this event; `None` when the bed was just registered.
    pub previous_status: Option<BedStatus>,
    /// Previous occupant, discharged by the release.
    pub discharged: Option<Patient>,
    /// Queue head that was seated in the bed, if any.
    pub allocated_patient: Option<Patient>,
    pub events: Vec<Event>,
}

/// Result of an admission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionOutcome {
    /// `ADMITTED` with a bed, or `WAITING` in the queue.
    pub patient: Patient,
    pub bed: Option<Bed>,
    /// Earlier arrivals seated in free beds before this patient was placed.
    pub seated_ahead: Vec<SupplyOutcome>,
    pub events: Vec<Event>,
}

/// Result of discharging a patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DischargeOutcome {
    pub patient: Patient,
    /// Present when the patient held a bed; the freed bed was re-offered.
    pub release: Option<SupplyOutcome>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Census {
    pub free: usize,
    pub occupied: usize,
    pub maintenance: usize,
    pub waiting: usize,
    pub admitted: usize,
}

impl Census {
    pub fn total_beds(&self) -> usize {
        self.free + self.occupied + self.maintenance
    }
}
