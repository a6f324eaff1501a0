//! Shared configuration types for sink instances.

mod base;
mod codec;
mod sink;
mod table;

pub use base::ValidationError;
pub use codec::{BinaryFormat, CodecConfig, GeometryFormat, RoundingMode, TimeUnit, UuidStrategy};
pub use sink::{IgnoreErrorsPolicy, SinkConfig, TopicConfig};
pub use table::{ConsistencyLevel, TableConfig};
