//! Job DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::{JobId, JobKind};

/// Returned by every endpoint that starts a background job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStarted {
    pub job_id: JobId,
    pub kind: JobKind,
}
