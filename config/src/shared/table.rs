use serde::{Deserialize, Serialize};

use crate::shared::{TimeUnit, ValidationError};

/// Consistency level requested for writes to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    LocalOne,
}

/// Destination table of a topic and the mapping of its columns to record fields.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TableConfig {
    pub keyspace: String,
    pub table: String,
    /// Comma-separated `column=field` entries, e.g. `id=key, amount=value.amount, ts=now()`.
    pub mapping: String,
    /// Table-level TTL applied when the mapping has no `__ttl` column, `-1` for none.
    #[serde(default = "default_ttl")]
    pub ttl: i64,
    #[serde(default = "default_ttl_time_unit")]
    pub ttl_time_unit: TimeUnit,
    #[serde(default = "default_timestamp_time_unit")]
    pub timestamp_time_unit: TimeUnit,
    #[serde(default = "default_consistency_level")]
    pub consistency_level: ConsistencyLevel,
    /// Whether null records and all-null rows become deletes.
    #[serde(default = "default_deletes_enabled")]
    pub deletes_enabled: bool,
    /// Whether null column values are left unset instead of written as nulls.
    #[serde(default = "default_null_to_unset")]
    pub null_to_unset: bool,
}

impl TableConfig {
    pub const DEFAULT_TTL: i64 = -1;
    pub const DEFAULT_TTL_TIME_UNIT: TimeUnit = TimeUnit::Seconds;
    pub const DEFAULT_TIMESTAMP_TIME_UNIT: TimeUnit = TimeUnit::Microseconds;
    pub const DEFAULT_CONSISTENCY_LEVEL: ConsistencyLevel = ConsistencyLevel::LocalOne;
    pub const DEFAULT_DELETES_ENABLED: bool = true;
    pub const DEFAULT_NULL_TO_UNSET: bool = true;

    /// Creates a table config with default write options.
    pub fn new(
        keyspace: impl Into<String>,
        table: impl Into<String>,
        mapping: impl Into<String>,
    ) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            mapping: mapping.into(),
            ttl: default_ttl(),
            ttl_time_unit: default_ttl_time_unit(),
            timestamp_time_unit: default_timestamp_time_unit(),
            consistency_level: default_consistency_level(),
            deletes_enabled: default_deletes_enabled(),
            null_to_unset: default_null_to_unset(),
        }
    }

    /// Returns `keyspace.table`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.keyspace, self.table)
    }

    /// Validates table configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("keyspace", &self.keyspace),
            ("table", &self.table),
            ("mapping", &self.mapping),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidFieldValue {
                    field: format!("tables.{field}"),
                    constraint: "must not be empty".to_string(),
                });
            }
        }

        if self.ttl < -1 {
            return Err(ValidationError::InvalidFieldValue {
                field: "tables.ttl".to_string(),
                constraint: "must be -1 or a non-negative duration".to_string(),
            });
        }

        Ok(())
    }
}

fn default_ttl() -> i64 {
    TableConfig::DEFAULT_TTL
}

fn default_ttl_time_unit() -> TimeUnit {
    TableConfig::DEFAULT_TTL_TIME_UNIT
}

fn default_timestamp_time_unit() -> TimeUnit {
    TableConfig::DEFAULT_TIMESTAMP_TIME_UNIT
}

fn default_consistency_level() -> ConsistencyLevel {
    TableConfig::DEFAULT_CONSISTENCY_LEVEL
}

fn default_deletes_enabled() -> bool {
    TableConfig::DEFAULT_DELETES_ENABLED
}

fn default_null_to_unset() -> bool {
    TableConfig::DEFAULT_NULL_TO_UNSET
}
