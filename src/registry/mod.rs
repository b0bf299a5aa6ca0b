//! In-memory record of running game servers.
//!
//! - [`Job`]: metadata for one spawned worker
//! - [`PortAllocator`]: set-based game port assignment
//! - [`Registry`]: job id -> [`WorkerHandle`] map, the port pool and pending respawns
//!
//! The registry is shared as [`SharedRegistry`]. Every mutation and every port
//! allocation happens under its write lock.

pub mod job;
pub mod ports;
pub mod table;

use std::sync::Arc;
use tokio::sync::RwLock;

pub use job::{Job, JobState, JobSummary};
pub use ports::PortAllocator;
pub use table::{PendingRespawn, Registry, WorkerHandle};

pub type SharedRegistry = Arc<RwLock<Registry>>;
