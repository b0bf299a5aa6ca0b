pub mod api;
pub mod arbiter;
pub mod config;
pub mod error;
pub mod registry;
pub mod shutdown;
pub mod supervisor;
pub mod ticket;
pub mod worker;

pub use arbiter::{ArbiterService, EvictionHook, StartedJob};
pub use error::{ArbiterError, Result};
