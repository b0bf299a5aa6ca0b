use std::process::Stdio;
use std::sync::Arc;

use tokio::process::{Child, Command};

use crate::config::{BinarySpec, BinaryTable};
use crate::error::{ArbiterError, Result};
use crate::registry::Job;

/// A freshly spawned worker process.
#[derive(Debug)]
pub struct SpawnedWorker {
    pub child: Child,
    pub pid: Option<u32>,
}

/// Launches game-server binaries selected by year.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    binaries: Arc<BinaryTable>,
}

impl WorkerLauncher {
    pub fn new(binaries: BinaryTable) -> Self {
        Self {
            binaries: Arc::new(binaries),
        }
    }

    pub fn binaries(&self) -> &BinaryTable {
        &self.binaries
    }

    /// Spawn the binary for `job.variant`. Returns as soon as the OS has created the process.
    pub fn launch(&self, job: &Job) -> Result<SpawnedWorker> {
        let spec = self
            .binaries
            .get(job.variant)
            .ok_or(ArbiterError::InvalidVariant(job.variant))?;

        tracing::debug!(
            job_id = %job.id,
            path = %spec.path.display(),
            port = job.port,
            place_id = %job.workload_id,
            "Spawning game server"
        );

        let child = Command::new(&spec.path)
            .args(worker_args(spec, job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!(job_id = %job.id, path = %spec.path.display(), error = %e, "Spawn failed");
                ArbiterError::SpawnFailure {
                    variant: job.variant,
                    reason: e.to_string(),
                }
            })?;

        let pid = child.id();
        Ok(SpawnedWorker { child, pid })
    }
}

/// Command line passed to a worker: configured leading args, then port and place.
pub fn worker_args(spec: &BinarySpec, job: &Job) -> Vec<String> {
    let mut args = spec.args.clone();
    args.push(format!("--port={}", job.port));
    args.push(format!("--place={}", job.workload_id));
    args
}
