//! In-memory implementations of the storage, broker and ledger seams
//!
//! These back the bundled CLI and the test suite. They keep the semantics
//! the command pipeline relies on (optimistic version tokens, a
//! serializable transaction scope, per-queue FIFO delivery, an
//! authoritative balance that can diverge from the local one) without a
//! relational store or a real broker.
//!
//! # Thread Safety
//!
//! All three are DashMap-based and safe to share behind `Arc` across the
//! submit path, the partition workers and the reconciliation consumers.

pub mod broker;
pub mod ledger;
pub mod store;

pub use broker::MemoryBroker;
pub use ledger::MemoryLedger;
pub use store::MemoryStore;
