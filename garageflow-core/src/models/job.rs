use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Job status enumeration, one column per status on the job board.
///
/// Jobs move forward through `Received -> Working -> Ready -> Completed`
/// and may step one column back, except out of `Completed` which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[sqlx(rename = "received")]
    Received,

    #[sqlx(rename = "working")]
    Working,

    #[sqlx(rename = "ready")]
    Ready,

    #[sqlx(rename = "completed")]
    Completed,
}

impl JobStatus {
    /// Every status, in board column order.
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Received,
        JobStatus::Working,
        JobStatus::Ready,
        JobStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Received => "received",
            JobStatus::Working => "working",
            JobStatus::Ready => "ready",
            JobStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(JobStatus::Received),
            "working" => Ok(JobStatus::Working),
            "ready" => Ok(JobStatus::Ready),
            "completed" => Ok(JobStatus::Completed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Job model representing a single vehicle-service engagement.
///
/// This struct maps to the `jobs` table. A job belongs to exactly one
/// tenant and one customer/vehicle pair.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    /// Unique identifier for the job
    pub id: Uuid,

    /// Garage (tenant) that owns this job
    pub tenant_id: Uuid,

    /// Customer who brought the vehicle in
    pub customer_id: Uuid,

    /// Vehicle being serviced
    pub vehicle_id: Uuid,

    /// Assigned mechanic, if any
    pub mechanic_id: Option<Uuid>,

    /// Current board column
    pub status: JobStatus,

    /// Customer complaint recorded at intake
    pub complaint: String,

    /// Free-text workshop notes
    pub notes: Option<String>,

    /// Timestamp when the job was created
    pub created_at: DateTime<Utc>,

    /// Timestamp when the job was last updated
    pub updated_at: DateTime<Utc>,
}

/// Job intake request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub mechanic_id: Option<Uuid>,
    pub complaint: String,
    pub notes: Option<String>,
}

impl Job {
    /// Builds a freshly received job for `tenant_id`.
    pub fn new(tenant_id: Uuid, input: CreateJob) -> Self {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            tenant_id,
            customer_id: input.customer_id,
            vehicle_id: input.vehicle_id,
            mechanic_id: input.mechanic_id,
            status: JobStatus::Received,
            complaint: input.complaint,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        }
    }
}
