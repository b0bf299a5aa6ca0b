use std::collections::BTreeSet;

use crate::error::{ArbiterError, Result};

/// Hands out game ports from `[base, base + capacity)`, lowest free port first.
#[derive(Debug)]
pub struct PortAllocator {
    base: u16,
    capacity: u16,
    allocated: BTreeSet<u16>,
}

impl PortAllocator {
    pub fn new(base: u16, capacity: u16) -> Self {
        // Clamp so the range never runs past u16::MAX
        let room = u32::from(u16::MAX) - u32::from(base) + 1;
        let capacity = u32::from(capacity).min(room) as u16;
        Self {
            base,
            capacity,
            allocated: BTreeSet::new(),
        }
    }

    pub fn allocate(&mut self) -> Result<u16> {
        let port = (0..self.capacity)
            .map(|offset| self.base + offset)
            .find(|port| !self.allocated.contains(port))
            .ok_or(ArbiterError::PortsExhausted)?;
        self.allocated.insert(port);
        Ok(port)
    }

    /// Returns false if the port was not allocated.
    pub fn release(&mut self, port: u16) -> bool {
        self.allocated.remove(&port)
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }
}
