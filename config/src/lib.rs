//! Configuration for the record sink.
//!
//! Holds the serde-deserializable settings of a sink instance, their validation rules, and the
//! hierarchical loader that merges configuration files with environment variable overrides.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
