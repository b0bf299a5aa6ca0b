//! Advisory lease records handed back from a successful start.
//!
//! A ticket only describes what was issued. Nothing checks it later; access
//! control is the auth header alone.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub ticket_id: Uuid,
    pub place_id: String,
    pub port: u16,
    /// Unix milliseconds
    pub issued_at: i64,
}

pub fn issue(workload_id: &str, port: u16) -> Ticket {
    Ticket {
        ticket_id: Uuid::new_v4(),
        place_id: workload_id.to_string(),
        port,
        issued_at: Utc::now().timestamp_millis(),
    }
}
