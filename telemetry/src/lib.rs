//! Tracing setup shared by sink binaries and tests.

pub mod tracing;
