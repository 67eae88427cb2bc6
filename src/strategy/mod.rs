//! The command queue strategy: submit-path authorization plus partition
//! workers
//!
//! One strategy, two balance modes. [`BalanceMode::Deferred`] validates on
//! the submit path and leaves the balance mutation to the partition worker;
//! [`BalanceMode::Immediate`] mutates the balance inside a serializable
//! transaction on the submit path and leaves only row persistence and
//! settlement publishing to the worker. Everything else is shared: the
//! validation rules, the retry discipline, routing, and the settlement
//! envelope.

pub mod command_queue;
mod worker;

pub use command_queue::{BalanceMode, CommandQueueStrategy};
