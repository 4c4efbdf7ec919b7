use std::collections::HashMap;

use crate::model::*;

use super::EngineError;

/// All beds, in first-insertion order. Overwrites keep their slot, so
/// iteration order (and therefore "first free bed") is stable across upserts.
#[derive(Debug, Default)]
pub struct BedRegistry {
    beds: Vec<Bed>,
    index: HashMap<BedId, usize>,
}

impl BedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.beds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beds.is_empty()
    }

    /// Insert or overwrite by id (last writer wins). Returns the previous record.
    pub fn upsert(&mut self, bed: Bed) -> Option<Bed> {
        match self.index.get(&bed.bed_id) {
            Some(&pos) => Some(std::mem::replace(&mut self.beds[pos], bed)),
            None => {
                self.index.insert(bed.bed_id.clone(), self.beds.len());
                self.beds.push(bed);
                None
            }
        }
    }

    pub fn get(&self, bed_id: &str) -> Option<&Bed> {
        self.index.get(bed_id).map(|&pos| &self.beds[pos])
    }

    pub fn list_all(&self) -> &[Bed] {
        &self.beds
    }

    /// Linear scan. A few thousand beds at most, so no secondary index.
    pub fn filter<'a>(&'a self, criteria: &'a BedFilter) -> impl Iterator<Item = &'a Bed> {
        self.beds.iter().filter(move |b| criteria.matches(b))
    }

    pub fn mark_occupied(&mut self, bed_id: &str) -> Result<&Bed, EngineError> {
        let bed = self.get_mut(bed_id)?;
        match bed.status {
            BedStatus::Free => {
                bed.status = BedStatus::Occupied;
                Ok(&*bed)
            }
            BedStatus::Occupied => Err(EngineError::InvalidTransition {
                id: bed_id.to_string(),
                reason: "bed is already occupied",
            }),
            BedStatus::Maintenance => Err(EngineError::InvalidTransition {
                id: bed_id.to_string(),
                reason: "bed is under maintenance",
            }),
        }
    }

    /// Idempotent on an already-free bed.
    pub fn mark_free(&mut self, bed_id: &str) -> Result<&Bed, EngineError> {
        let bed = self.get_mut(bed_id)?;
        if bed.status == BedStatus::Maintenance {
            return Err(EngineError::InvalidTransition {
                id: bed_id.to_string(),
                reason: "bed is under maintenance",
            });
        }
        bed.status = BedStatus::Free;
        Ok(&*bed)
    }

    pub fn count(&self, status: BedStatus) -> usize {
        self.beds.iter().filter(|b| b.status == status).count()
    }

    fn get_mut(&mut self, bed_id: &str) -> Result<&mut Bed, EngineError> {
        let pos = *self
            .index
            .get(bed_id)
            .ok_or_else(|| EngineError::NotFound(bed_id.to_string()))?;
        Ok(&mut self.beds[pos])
    }
}
