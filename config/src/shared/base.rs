use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A field holds a value that violates its constraint.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    /// A sink must route at least one topic.
    #[error("Invalid sink config: no topics are configured")]
    NoTopics,
    /// Every configured topic must write to at least one table.
    #[error("Invalid topic config: topic `{0}` has no tables")]
    TopicWithoutTables(String),
    /// A topic routes twice to the same table.
    #[error("Invalid topic config: topic `{topic}` maps table `{table}` more than once")]
    DuplicateTable { topic: String, table: String },
}
