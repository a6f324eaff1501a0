//! Parsers and formatters for temporal, numeric, boolean, binary, geometric and UUID values.
//!
//! Every function is a pure function of its input and a [`ConversionContext`].

pub mod binary;
pub mod bool;
pub mod context;
pub mod geo;
pub mod numeric;
pub mod temporal;
pub mod time_uuid;

pub use context::ConversionContext;
pub use temporal::Zone;
