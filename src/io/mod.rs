//! CSV input and output for the bundled CLI
//!
//! Movement requests and account seeds come in as headed CSV files; submit
//! outcomes go out as CSV on stdout. Serialization details stay here so the
//! pipeline types never know about file formats.

pub mod reader;
pub mod writer;

pub use reader::{read_account_seeds, read_requests, AccountSeed};
pub use writer::write_outcomes;
