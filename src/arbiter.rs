use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::DropGuard;
use uuid::Uuid;

use crate::config::ArbiterConfig;
use crate::error::{ArbiterError, Result};
use crate::registry::{Job, JobSummary, Registry, SharedRegistry};
use crate::supervisor::Supervisor;
use crate::ticket::{self, Ticket};
use crate::worker::WorkerLauncher;

/// Channel towards running game servers for removing a player.
///
/// Implementations talk to the worker; the arbiter only forwards the request.
pub trait EvictionHook: Send + Sync {
    fn evict(&self, user_id: &str, workload_id: &str) -> Result<()>;
}

/// Records the eviction request and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyEviction;

impl EvictionHook for LogOnlyEviction {
    fn evict(&self, user_id: &str, workload_id: &str) -> Result<()> {
        tracing::info!(user_id, game_id = workload_id, "Evict player");
        Ok(())
    }
}

/// Result of a successful start.
#[derive(Debug, Clone, Serialize)]
pub struct StartedJob {
    #[serde(rename = "jobId")]
    pub job_id: Uuid,
    pub port: u16,
    pub ticket: Ticket,
}

/// Start, kill, list and evict on top of the registry and supervisor.
///
/// Dropping the service stops its supervisor loop and signals every worker it launched.
pub struct ArbiterService {
    registry: SharedRegistry,
    supervisor: Supervisor,
    eviction: Arc<dyn EvictionHook>,
    _close: DropGuard,
}

impl ArbiterService {
    /// Build the service and spawn its supervisor loop. Must be called inside a tokio runtime.
    pub fn new(config: &ArbiterConfig) -> Self {
        let registry = Arc::new(RwLock::new(Registry::new(
            config.base_port,
            config.port_capacity,
        )));
        let launcher = WorkerLauncher::new(config.binaries.clone());
        let (supervisor, events_rx) = Supervisor::new(
            registry.clone(),
            launcher,
            config.restart.clone(),
            config.stop_grace(),
        );

        tokio::spawn(supervisor.clone().run(events_rx));

        Self {
            registry,
            _close: supervisor.close_guard(),
            supervisor,
            eviction: Arc::new(LogOnlyEviction),
        }
    }

    pub fn with_eviction_hook(mut self, hook: Arc<dyn EvictionHook>) -> Self {
        self.eviction = hook;
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Launch a game server for `workload_id` using the build registered for `variant`.
    pub async fn start_game_server(
        &self,
        workload_id: impl Into<String>,
        variant: u32,
    ) -> Result<StartedJob> {
        if self.supervisor.launcher().binaries().get(variant).is_none() {
            return Err(ArbiterError::InvalidVariant(variant));
        }

        let job = {
            let mut registry = self.registry.write().await;
            let port = registry.allocate_port()?;
            match self
                .supervisor
                .launch(&mut registry, Job::new(workload_id, variant, port))
            {
                Ok(job) => job,
                Err(e) => {
                    registry.release_port(port);
                    return Err(e);
                }
            }
        };

        tracing::info!(
            job_id = %job.id,
            place_id = %job.workload_id,
            port = job.port,
            year = job.variant,
            pid = ?job.pid,
            "Started game server"
        );

        Ok(StartedJob {
            job_id: job.id,
            port: job.port,
            ticket: ticket::issue(&job.workload_id, job.port),
        })
    }

    /// Terminate a running game server, or cancel its pending restart.
    pub async fn kill_game_server(&self, job_id: Uuid) -> Result<()> {
        let mut registry = self.registry.write().await;

        if let Some(handle) = registry.remove(&job_id) {
            handle.terminate();
            tracing::info!(job_id = %job_id, port = handle.job.port, "Killed game server");
            return Ok(());
        }

        if let Some(pending) = registry.take_pending(&job_id) {
            pending.cancel.cancel();
            registry.release_port(pending.job.port);
            tracing::info!(job_id = %job_id, "Cancelled pending game server restart");
            return Ok(());
        }

        Err(ArbiterError::NotFound(job_id))
    }

    pub async fn list_active_games(&self) -> Vec<JobSummary> {
        self.registry.read().await.snapshot()
    }

    pub fn evict_player(&self, user_id: &str, workload_id: &str) -> Result<()> {
        self.eviction.evict(user_id, workload_id)
    }

    /// Cancel pending restarts, terminate every worker and wait up to `grace` for them to exit.
    pub async fn shutdown(&self, grace: Duration) {
        self.supervisor.begin_shutdown();

        let terminated = {
            let mut registry = self.registry.write().await;
            for pending in registry.drain_pending() {
                registry.release_port(pending.job.port);
            }
            let workers = registry.drain_workers();
            for handle in &workers {
                handle.terminate();
            }
            workers.len()
        };

        tracing::info!(count = terminated, "Terminating game servers");

        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            let registry = self.registry.read().await;
            if registry.is_empty() && registry.allocated_ports() == 0 {
                tracing::info!("All game servers stopped");
                return;
            }
            drop(registry);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        tracing::warn!("Shutdown grace period elapsed with game servers still exiting");
    }
}
