//! Record to statement mapping.
//!
//! A topic's [`FieldMapping`]s are validated against the destination table schemas once, when
//! the [`MappingResolver`] is built. Records are then mapped with codecs resolved per distinct
//! record schema and kept in a [`ShapeCache`].

mod cache;
mod field;
mod record;
mod resolver;

pub use cache::{ResolvedCodecs, ShapeCache, ShapeKey};
pub use field::{
    FieldMapping, FieldPath, FieldSource, MappingEntry, MappingTarget, TIMESTAMP_COLUMN,
    TTL_COLUMN, is_pseudo_column,
};
pub use record::{DeliveryHandle, RecordData, RecordHeader, RecordSchema, SinkRecord};
pub use resolver::{MappingResolver, TableMapper};
