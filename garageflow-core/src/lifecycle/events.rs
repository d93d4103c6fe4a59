use serde::Serialize;
use uuid::Uuid;

use crate::models::JobStatus;

/// Change to the shadow board, broadcast to subscribers (the UI layer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoardEvent {
    /// A move was applied locally and is being persisted.
    Applied {
        tenant_id: Uuid,
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
        version: u64,
    },

    /// The persisted status now matches the board.
    Committed {
        tenant_id: Uuid,
        job_id: Uuid,
        status: JobStatus,
        version: u64,
    },

    /// Persisting failed and the board was restored.
    Reverted {
        tenant_id: Uuid,
        job_id: Uuid,
        attempted: JobStatus,
        restored: JobStatus,
        version: u64,
        reason: String,
    },

    /// A queued move was dropped because a newer move of the same job
    /// arrived before it reached the front of the queue.
    Superseded {
        tenant_id: Uuid,
        job_id: Uuid,
        status: JobStatus,
        version: u64,
    },
}

impl BoardEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            BoardEvent::Applied { job_id, .. }
            | BoardEvent::Committed { job_id, .. }
            | BoardEvent::Reverted { job_id, .. }
            | BoardEvent::Superseded { job_id, .. } => *job_id,
        }
    }
}
