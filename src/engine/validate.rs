use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_id(id: &str) -> Result<(), EngineError> {
    if id.is_empty() {
        return Err(EngineError::LimitExceeded("empty id"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded("id too long"));
    }
    Ok(())
}

pub(crate) fn validate_bed(bed: &Bed) -> Result<(), EngineError> {
    validate_id(&bed.bed_id)?;
    if bed.ward_number.len() > MAX_LABEL_LEN {
        return Err(EngineError::LimitExceeded("ward number too long"));
    }
    if bed.bed_type.len() > MAX_LABEL_LEN {
        return Err(EngineError::LimitExceeded("bed type too long"));
    }
    Ok(())
}

pub(crate) fn validate_patient(patient: &Patient) -> Result<(), EngineError> {
    validate_id(&patient.patient_id)?;
    if let Some(ref n) = patient.name
        && n.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("patient name too long"));
        }
    Ok(())
}
