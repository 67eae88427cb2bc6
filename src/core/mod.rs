//! Business logic components of the command pipeline
//!
//! - [`validation`] - pure authorization decision over a request and an
//!   account snapshot
//! - [`balance`] - movement-type arithmetic
//! - [`routing`] - deterministic account-to-queue partition mapping
//! - [`retry`] - bounded retry with randomized backoff for transient
//!   storage conflicts
//! - [`status`] - the process-wide administrative active/inactive toggle
//! - [`traits`] - the seams behind which storage, the message broker and
//!   the authoritative external ledger live

pub mod balance;
pub mod retry;
pub mod routing;
pub mod status;
pub mod traits;
pub mod validation;

pub use retry::{RetryError, RetryPolicy};
pub use routing::PartitionRouter;
pub use status::ServiceStatus;
pub use traits::{AccountStore, CommandStore, ExternalLedger, LedgerCall, LedgerOp, MessageBroker, RequestStore};
pub use validation::ValidationOutcome;
