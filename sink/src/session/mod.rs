//! Database session seam.
//!
//! The sink core never manages connections, retries or topology itself. It asks a [`Session`]
//! for table schemas when it starts and hands it bound statements to execute afterwards.

mod base;
pub mod memory;

pub use base::Session;
