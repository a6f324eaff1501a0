//! Utilities for testing the sink without a database.
//!
//! - [`session`] wraps a [`crate::session::Session`] to inject failures and latency and to
//!   observe concurrency.
//! - [`delivery`] provides delivery handles that record how each record was reported.
//! - [`builders`] shortens the construction of records, schemas and configurations.
//! - [`notify`] bounds waits on asynchronous conditions with a timeout.

pub mod builders;
pub mod delivery;
pub mod notify;
pub mod session;
