use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Starting,
    Running,
    Terminated,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Starting => write!(f, "starting"),
            JobState::Running => write!(f, "running"),
            JobState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Metadata for one game-server process. The process itself is owned by its monitor task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: Uuid,
    pub workload_id: String,
    pub variant: u32,
    pub port: u16,
    pub pid: Option<u32>,
    pub state: JobState,
    /// Respawns that preceded this job in its lineage
    pub restarts: u32,
    pub started_at: DateTime<Utc>,
}

impl Job {
    pub fn new(workload_id: impl Into<String>, variant: u32, port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            workload_id: workload_id.into(),
            variant,
            port,
            pid: None,
            state: JobState::Starting,
            restarts: 0,
            started_at: Utc::now(),
        }
    }

    /// The job that replaces this one after a crash: same workload, build and port, fresh id.
    pub fn respawn(&self) -> Self {
        Self {
            restarts: self.restarts.saturating_add(1),
            ..Self::new(self.workload_id.clone(), self.variant, self.port)
        }
    }

    pub fn mark_running(&mut self, pid: Option<u32>) {
        self.pid = pid;
        self.state = JobState::Running;
        self.started_at = Utc::now();
    }

    pub fn mark_terminated(&mut self) {
        self.state = JobState::Terminated;
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id,
            workload_id: self.workload_id.clone(),
            port: self.port,
            variant: self.variant,
            pid: self.pid,
            restarts: self.restarts,
            started_at: self.started_at,
        }
    }
}

/// Entry returned by the active games listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    #[serde(rename = "jobId")]
    pub job_id: Uuid,
    #[serde(rename = "placeId")]
    pub workload_id: String,
    pub port: u16,
    #[serde(rename = "year")]
    pub variant: u32,
    pub pid: Option<u32>,
    pub restarts: u32,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
}
