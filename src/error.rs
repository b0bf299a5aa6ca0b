use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ArbiterError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid year: {0}")]
    InvalidVariant(u32),

    #[error("Server not found: {0}")]
    NotFound(Uuid),

    #[error("Failed to spawn game server for year {variant}: {reason}")]
    SpawnFailure { variant: u32, reason: String },

    #[error("No free game ports left")]
    PortsExhausted,

    #[error("{0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, ArbiterError>;
