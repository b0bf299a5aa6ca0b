use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::registry::job::{Job, JobSummary};
use crate::registry::ports::PortAllocator;

/// Registry entry for a live worker.
///
/// The OS process is owned by the worker's monitor task; the handle can only ask it to stop.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub job: Job,
    kill: CancellationToken,
}

impl WorkerHandle {
    pub fn new(job: Job, kill: CancellationToken) -> Self {
        Self { job, kill }
    }

    /// Ask the monitor task to terminate the process. Idempotent.
    pub fn terminate(&self) {
        self.kill.cancel();
    }
}

/// A crashed job waiting out its respawn delay. Holds on to the job's port.
#[derive(Debug, Clone)]
pub struct PendingRespawn {
    pub job: Job,
    pub cancel: CancellationToken,
}

/// Authoritative record of running game servers.
///
/// Port allocation lives here too so that allocating a port and registering the job
/// that uses it happen under the same lock.
#[derive(Debug)]
pub struct Registry {
    workers: HashMap<Uuid, WorkerHandle>,
    pending: HashMap<Uuid, PendingRespawn>,
    ports: PortAllocator,
}

impl Registry {
    pub fn new(base_port: u16, port_capacity: u16) -> Self {
        Self {
            workers: HashMap::new(),
            pending: HashMap::new(),
            ports: PortAllocator::new(base_port, port_capacity),
        }
    }

    pub fn allocate_port(&mut self) -> Result<u16> {
        self.ports.allocate()
    }

    pub fn release_port(&mut self, port: u16) {
        if !self.ports.release(port) {
            tracing::warn!(port, "Released a port that was not allocated");
        }
    }

    pub fn allocated_ports(&self) -> usize {
        self.ports.allocated_count()
    }

    pub fn insert(&mut self, handle: WorkerHandle) {
        let job_id = handle.job.id;
        if self.workers.insert(job_id, handle).is_some() {
            // Ids are v4 UUIDs, so this means the caller re-registered the same job
            tracing::warn!(job_id = %job_id, "Job registered twice, previous entry replaced");
        }
    }

    /// Remove a worker. Missing entries are not an error.
    pub fn remove(&mut self, job_id: &Uuid) -> Option<WorkerHandle> {
        self.workers.remove(job_id)
    }

    /// Registered jobs, oldest first.
    pub fn snapshot(&self) -> Vec<JobSummary> {
        let mut jobs: Vec<JobSummary> = self.workers.values().map(|h| h.job.summary()).collect();
        jobs.sort_by_key(|j| j.started_at);
        jobs
    }

    pub fn add_pending(&mut self, pending: PendingRespawn) {
        self.pending.insert(pending.job.id, pending);
    }

    pub fn take_pending(&mut self, job_id: &Uuid) -> Option<PendingRespawn> {
        self.pending.remove(job_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn drain_pending(&mut self) -> Vec<PendingRespawn> {
        self.pending.drain().map(|(_, p)| p).collect()
    }

    pub fn drain_workers(&mut self) -> Vec<WorkerHandle> {
        self.workers.drain().map(|(_, h)| h).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArbiterError;

    fn registered(registry: &mut Registry, workload: &str) -> (Job, CancellationToken) {
        let port = registry.allocate_port().unwrap();
        let mut job = Job::new(workload, 2011, port);
        job.mark_running(Some(100));
        let kill = CancellationToken::new();
        registry.insert(WorkerHandle::new(job.clone(), kill.clone()));
        (job, kill)
    }

    #[test]
    fn insert_and_snapshot() {
        let mut registry = Registry::new(7000, 100);
        let (a, _) = registered(&mut registry, "42");
        let (b, _) = registered(&mut registry, "7");

        assert_eq!(registry.snapshot().len(), 2);
        assert_eq!(a.port, 7000);
        assert_eq!(b.port, 7001);

        let snap = registry.snapshot();
        let ids: Vec<Uuid> = snap.iter().map(|j| j.job_id).collect();
        assert!(ids.contains(&a.id));
        assert!(ids.contains(&b.id));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = Registry::new(7000, 100);
        let (job, _) = registered(&mut registry, "42");

        assert!(registry.remove(&job.id).is_some());
        assert!(registry.remove(&job.id).is_none());
        assert!(registry.snapshot().is_empty());
        // Port stays allocated until the owner releases it
        assert_eq!(registry.allocated_ports(), 1);
    }

    #[test]
    fn terminate_fires_kill_token() {
        let mut registry = Registry::new(7000, 100);
        let (job, kill) = registered(&mut registry, "42");

        let handle = registry.remove(&job.id).unwrap();
        assert!(!kill.is_cancelled());
        handle.terminate();
        handle.terminate();
        assert!(kill.is_cancelled());
    }

    #[test]
    fn pending_respawns_are_tracked_separately() {
        let mut registry = Registry::new(7000, 100);
        let (job, _) = registered(&mut registry, "42");
        registry.remove(&job.id);

        registry.add_pending(PendingRespawn {
            job: job.clone(),
            cancel: CancellationToken::new(),
        });
        assert_eq!(registry.pending_count(), 1);
        assert!(registry.snapshot().is_empty());

        let pending = registry.take_pending(&job.id).unwrap();
        assert_eq!(pending.job.port, job.port);
        assert!(registry.take_pending(&job.id).is_none());
    }

    #[test]
    fn allocation_fails_when_range_is_full() {
        let mut registry = Registry::new(7000, 1);
        registered(&mut registry, "42");
        assert!(matches!(
            registry.allocate_port(),
            Err(ArbiterError::PortsExhausted)
        ));
    }

    #[test]
    fn drain_workers_empties_registry() {
        let mut registry = Registry::new(7000, 100);
        registered(&mut registry, "42");
        registered(&mut registry, "7");

        let drained = registry.drain_workers();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }
}
