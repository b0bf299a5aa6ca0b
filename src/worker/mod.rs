//! Game-server process management.
//!
//! - [`WorkerLauncher`]: picks the binary for a year and spawns it with
//!   `--port=<port> --place=<placeId>`
//! - [`monitor::watch`]: owns the spawned child, forwards its output to tracing,
//!   terminates it on request and reports an [`ExitEvent`] when it is gone
//!
//! Every spawned worker produces exactly one [`ExitEvent`], whether it crashed
//! or was killed.

pub mod launcher;
pub mod monitor;

pub use launcher::{SpawnedWorker, WorkerLauncher};
pub use monitor::{ExitCause, ExitEvent};
