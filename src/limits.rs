/// Max beds tracked by one engine.
pub const MAX_BEDS: usize = 10_000;

/// Max patients waiting at once.
pub const MAX_WAITING: usize = 100_000;

/// Max length of a bed or patient id.
pub const MAX_ID_LEN: usize = 128;

/// Max length of a patient name.
pub const MAX_NAME_LEN: usize = 256;

/// Max length of a ward number or bed type.
pub const MAX_LABEL_LEN: usize = 64;
