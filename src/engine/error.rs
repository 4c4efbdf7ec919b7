use super::reconcile::Issue;

#[derive(Debug)]
pub enum EngineError {
    /// Bed or patient id absent from in-memory state.
    NotFound(String),
    InvalidTransition {
        id: String,
        reason: &'static str,
    },
    /// Duplicate enqueue. Benign: nothing changed.
    AlreadyQueued(String),
    /// Conflicting durable records found while reconciling.
    InvariantViolation(Vec<Issue>),
    /// In-memory state failed a consistency check.
    BrokenInvariant {
        id: String,
        reason: &'static str,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// True for errors that leave state exactly as requested (nothing to undo).
    pub fn is_benign(&self) -> bool {
        matches!(self, EngineError::AlreadyQueued(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::InvalidTransition { id, reason } => {
                write!(f, "invalid transition for {id}: {reason}")
            }
            EngineError::AlreadyQueued(id) => write!(f, "patient {id} is already queued"),
            EngineError::InvariantViolation(issues) => {
                write!(f, "{} invariant violation(s) in store of record", issues.len())?;
                for issue in issues {
                    write!(f, "; {issue}")?;
                }
                Ok(())
            }
            EngineError::BrokenInvariant { id, reason } => {
                write!(f, "broken invariant at {id}: {reason}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
