//! Data model shared by codecs, the mapping resolver and statements.

mod cell;
mod column;
mod external;
mod geometry;

pub use cell::Cell;
pub use column::{ColumnType, IntegerType};
pub use external::{ExternalShape, ExternalValue};
pub use geometry::{LineString, Point, Polygon};
