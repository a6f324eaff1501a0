//! Writes records consumed from a message broker into Cassandra-compatible tables.
//!
//! Each record is mapped to one statement per destination table configured for its topic.
//! Field values are converted to the native column types by codecs built from the topic's
//! conversion settings, and statements run concurrently within a bounded in-flight budget.
//!
//! # Example
//!
//! ```rust,no_run
//! use config::shared::SinkConfig;
//! use sink::processor::SinkProcessor;
//! use sink::session::memory::MemorySession;
//!
//! # async fn run(config: SinkConfig, session: MemorySession) -> sink::error::SinkResult<()> {
//! let processor = SinkProcessor::start(config, session).await?;
//! // processor.put(records).await?;
//! processor.shutdown_and_wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod concurrency;
pub mod conversions;
pub mod error;
mod macros;
pub mod mapping;
pub mod processor;
pub mod session;
pub mod statement;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
