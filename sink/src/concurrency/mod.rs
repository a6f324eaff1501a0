//! Concurrency primitives of the execution pipeline.
//!
//! The [`budget::InFlightBudget`] is the only state the pipeline shares between records that
//! are processed concurrently. It is the single backpressure point: records wait for a unit
//! instead of being dropped or reordered.

pub mod budget;

pub use budget::{BudgetPermit, InFlightBudget};
