//! Deterministic account-to-queue partition mapping
//!
//! Every account number maps to exactly one partition, which names both the
//! broker queue (`queue_<n>`) and the in-process worker channel that
//! serializes all movements for the accounts routed to it. The mapping is
//! stable for the lifetime of a given queue count; changing the count is an
//! explicit administrative action, not a runtime concern of this component.

use crate::types::AccountNumber;
use tracing::debug;

/// Deterministic account-to-partition router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRouter {
    queue_count: i32,
}

impl PartitionRouter {
    /// Create a router over `queue_count` partitions
    ///
    /// A non-positive count routes every account to partition 1.
    pub fn new(queue_count: i32) -> Self {
        PartitionRouter { queue_count }
    }

    /// The configured queue count
    pub fn queue_count(&self) -> i32 {
        self.queue_count
    }

    /// The number of workers and queues actually needed (at least 1)
    pub fn worker_count(&self) -> i32 {
        self.queue_count.max(1)
    }

    /// The 1-based partition for an account number
    ///
    /// `partition(n) = n mod queue_count + 1` when the count is positive,
    /// otherwise 1.
    pub fn partition(&self, number: AccountNumber) -> i32 {
        if self.queue_count <= 0 {
            debug!(
                queue_count = self.queue_count,
                "non-positive queue count, routing to partition 1"
            );
            return 1;
        }

        (number % self.queue_count as i64) as i32 + 1
    }

    /// The broker queue name for a partition
    pub fn queue_name(&self, partition: i32) -> String {
        format!("queue_{}", partition)
    }

    /// The broker queue name for an account number
    pub fn queue_for(&self, number: AccountNumber) -> String {
        self.queue_name(self.partition(number))
    }

    /// Iterate the partitions this router spreads accounts over
    pub fn partitions(&self) -> impl Iterator<Item = i32> {
        1..=self.worker_count()
    }
}
