//! Process-wide administrative active/inactive toggle
//!
//! The flag is in-memory only and resets to active on restart. It is polled
//! at two checkpoints (start of submit, start of worker item processing) and
//! is deliberately not transactional: toggling it while a transaction is in
//! flight lets that transaction complete. That race is part of the contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared administrative toggle
///
/// Cloning shares the underlying flag, so a handle given to the HTTP layer
/// and the handles owned by the partition workers observe the same state.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    active: Arc<AtomicBool>,
}

impl ServiceStatus {
    /// Create a new toggle in the active state
    pub fn new() -> Self {
        ServiceStatus {
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the service active
    pub fn activate(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    /// Mark the service inactive
    ///
    /// New submits short-circuit with status 99 and workers skip items they
    /// dequeue afterwards; in-flight transactions still complete.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    /// Whether the service is currently active
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_active() {
        assert!(ServiceStatus::new().is_active());
    }

    #[test]
    fn test_toggle_round_trip() {
        let status = ServiceStatus::new();

        status.deactivate();
        assert!(!status.is_active());

        status.activate();
        assert!(status.is_active());
    }

    #[test]
    fn test_clones_share_state() {
        let status = ServiceStatus::new();
        let handle = status.clone();

        handle.deactivate();

        assert!(!status.is_active());
    }
}
