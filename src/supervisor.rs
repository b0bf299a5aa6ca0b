//! Crash handling and respawn.
//!
//! Every worker's monitor task sends one [`ExitEvent`] to the supervisor loop.
//! The loop removes the job from the registry and, if the supervisor was the one
//! to remove it, schedules a replacement after the configured delay.
//!
//! Whoever takes a job out of the registry owns the follow-up:
//! - an explicit kill or a shutdown removes it first, so no respawn happens and
//!   the supervisor only releases the port once the process is confirmed gone;
//! - a crash is removed by the supervisor, which keeps the port reserved for the
//!   replacement and records a [`PendingRespawn`] that kill and shutdown can cancel.
//!
//! Cancellation is a tree: `closed` stops the loop, `shutdown` below it stops
//! respawning, and every kill and respawn token hangs off `shutdown`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::RestartConfig;
use crate::error::Result;
use crate::registry::{Job, PendingRespawn, Registry, SharedRegistry, WorkerHandle};
use crate::worker::monitor::{self, ExitCause, ExitEvent};
use crate::worker::WorkerLauncher;

#[derive(Debug, Clone)]
pub struct Supervisor {
    registry: SharedRegistry,
    launcher: WorkerLauncher,
    restart: RestartConfig,
    stop_grace: Duration,
    events_tx: mpsc::UnboundedSender<ExitEvent>,
    closed: CancellationToken,
    shutdown: CancellationToken,
}

impl Supervisor {
    /// Returns the supervisor and the exit-event receiver to pass to [`Supervisor::run`].
    pub fn new(
        registry: SharedRegistry,
        launcher: WorkerLauncher,
        restart: RestartConfig,
        stop_grace: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ExitEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        let supervisor = Self {
            registry,
            launcher,
            restart,
            stop_grace,
            events_tx,
            shutdown: closed.child_token(),
            closed,
        };
        (supervisor, events_rx)
    }

    pub fn launcher(&self) -> &WorkerLauncher {
        &self.launcher
    }

    /// Spawn `job`, register it and start watching it.
    ///
    /// Takes the already locked registry so callers can allocate a port and launch
    /// under one lock. On error nothing is registered; the port is the caller's to release.
    pub fn launch(&self, registry: &mut Registry, mut job: Job) -> Result<Job> {
        let spawned = self.launcher.launch(&job)?;
        job.mark_running(spawned.pid);

        let kill = self.shutdown.child_token();
        registry.insert(WorkerHandle::new(job.clone(), kill.clone()));
        // Registered before watching: the exit handler needs the write lock we hold
        monitor::watch(
            job.clone(),
            spawned.child,
            kill,
            self.stop_grace,
            self.events_tx.clone(),
        );

        Ok(job)
    }

    /// Stop scheduling respawns, cancel the pending ones and signal every worker.
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Dropping the guard ends [`Supervisor::run`] and stops every worker.
    pub fn close_guard(&self) -> DropGuard {
        self.closed.clone().drop_guard()
    }

    /// Process exit events until closed.
    ///
    /// The supervisor keeps a sender for new workers, so the channel alone never
    /// ends the loop.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<ExitEvent>) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_exit(event).await,
                    None => break,
                },
                _ = self.closed.cancelled() => break,
            }
        }
        tracing::debug!("Supervisor loop stopped");
    }

    async fn handle_exit(&self, event: ExitEvent) {
        let job = event.job;
        match event.cause {
            ExitCause::Killed => tracing::info!(
                job_id = %job.id,
                exit_code = ?event.exit_code,
                signal = ?event.signal,
                "Game server stopped"
            ),
            ExitCause::Crashed => tracing::error!(
                job_id = %job.id,
                place_id = %job.workload_id,
                exit_code = ?event.exit_code,
                signal = ?event.signal,
                "Game server crashed"
            ),
        }

        let mut registry = self.registry.write().await;
        let removed_here = registry.remove(&job.id).is_some();

        if !removed_here || self.is_shutting_down() {
            registry.release_port(job.port);
            return;
        }

        if !self.restart.allows_restart(job.restarts) {
            tracing::warn!(
                job_id = %job.id,
                place_id = %job.workload_id,
                restarts = job.restarts,
                "Restart limit reached, not respawning"
            );
            registry.release_port(job.port);
            return;
        }

        let cancel = self.shutdown.child_token();
        registry.add_pending(PendingRespawn {
            job: job.clone(),
            cancel: cancel.clone(),
        });
        drop(registry);

        tracing::info!(
            job_id = %job.id,
            delay_ms = self.restart.respawn_delay_ms,
            "Scheduling game server restart"
        );

        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.respawn_after_delay(job, cancel).await;
        });
    }

    async fn respawn_after_delay(&self, previous: Job, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {
                // The canceller already released the port
                tracing::debug!(job_id = %previous.id, "Restart cancelled");
                return;
            }
            _ = tokio::time::sleep(self.restart.respawn_delay()) => {}
        }

        let mut registry = self.registry.write().await;
        let Some(pending) = registry.take_pending(&previous.id) else {
            return;
        };
        if pending.cancel.is_cancelled() {
            registry.release_port(pending.job.port);
            return;
        }

        tracing::info!(job_id = %previous.id, "Restarting game server");
        let replacement = previous.respawn();
        match self.launch(&mut registry, replacement) {
            Ok(job) => tracing::info!(
                previous_job_id = %previous.id,
                job_id = %job.id,
                place_id = %job.workload_id,
                port = job.port,
                restarts = job.restarts,
                "Game server restarted"
            ),
            Err(e) => {
                registry.release_port(previous.port);
                tracing::error!(
                    job_id = %previous.id,
                    place_id = %previous.workload_id,
                    error = %e,
                    "Failed to restart game server"
                );
            }
        }
    }
}
