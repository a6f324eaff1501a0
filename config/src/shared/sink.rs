use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::{CodecConfig, TableConfig, ValidationError};

/// Which record failures are tolerated instead of failing the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreErrorsPolicy {
    /// No failure is tolerated.
    #[default]
    None,
    /// Mapping, conversion and execution failures are tolerated.
    All,
    /// Only failures of statements sent to the database are tolerated.
    Driver,
}

/// Codec settings and destination tables of one topic.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TopicConfig {
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

impl TopicConfig {
    pub fn validate(&self, topic: &str) -> Result<(), ValidationError> {
        if self.tables.is_empty() {
            return Err(ValidationError::TopicWithoutTables(topic.to_string()));
        }

        self.codec.validate()?;

        let mut seen = HashSet::new();
        for table in &self.tables {
            table.validate()?;

            if !seen.insert(table.qualified_name()) {
                return Err(ValidationError::DuplicateTable {
                    topic: topic.to_string(),
                    table: table.qualified_name(),
                });
            }
        }

        Ok(())
    }
}

/// Configuration of one sink instance.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SinkConfig {
    /// Name used in logs.
    #[serde(default = "default_name")]
    pub name: String,
    /// Ceiling of statements executing concurrently.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Time after which a statement execution is failed.
    #[serde(default = "default_query_execution_timeout_ms")]
    pub query_execution_timeout_ms: u64,
    #[serde(default)]
    pub ignore_errors: IgnoreErrorsPolicy,
    pub topics: BTreeMap<String, TopicConfig>,
}

impl SinkConfig {
    pub const DEFAULT_NAME: &'static str = "cassandra-sink";
    pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 500;
    pub const MAX_CONCURRENT_REQUESTS: usize = 1 << 20;
    pub const DEFAULT_QUERY_EXECUTION_TIMEOUT_MS: u64 = 30_000;

    /// Validates the sink and every topic it routes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_concurrent_requests == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "max_concurrent_requests".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.max_concurrent_requests > Self::MAX_CONCURRENT_REQUESTS {
            return Err(ValidationError::InvalidFieldValue {
                field: "max_concurrent_requests".to_string(),
                constraint: format!("must be at most {}", Self::MAX_CONCURRENT_REQUESTS),
            });
        }

        if self.query_execution_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "query_execution_timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.topics.is_empty() {
            return Err(ValidationError::NoTopics);
        }

        for (topic, config) in &self.topics {
            config.validate(topic)?;
        }

        Ok(())
    }
}

impl Config for SinkConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

fn default_name() -> String {
    SinkConfig::DEFAULT_NAME.to_string()
}

fn default_max_concurrent_requests() -> usize {
    SinkConfig::DEFAULT_MAX_CONCURRENT_REQUESTS
}

fn default_query_execution_timeout_ms() -> u64 {
    SinkConfig::DEFAULT_QUERY_EXECUTION_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_config(topics: BTreeMap<String, TopicConfig>) -> SinkConfig {
        SinkConfig {
            name: default_name(),
            max_concurrent_requests: default_max_concurrent_requests(),
            query_execution_timeout_ms: default_query_execution_timeout_ms(),
            ignore_errors: IgnoreErrorsPolicy::default(),
            topics,
        }
    }

    #[test]
    fn deserializes_nested_topics() {
        let config: SinkConfig = serde_json::from_str(
            r#"{
                "ignore_errors": "driver",
                "topics": {
                    "orders": {
                        "codec": {"locale": "fr_FR"},
                        "tables": [{"keyspace": "shop", "table": "orders", "mapping": "id=key"}]
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.ignore_errors, IgnoreErrorsPolicy::Driver);
        assert_eq!(config.max_concurrent_requests, 500);
        assert_eq!(config.topics["orders"].codec.locale, "fr_FR");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn topic_without_tables_is_invalid() {
        let config = sink_config(BTreeMap::from([(
            "orders".to_string(),
            TopicConfig {
                codec: CodecConfig::default(),
                tables: vec![],
            },
        )]));

        assert_eq!(
            config.validate(),
            Err(ValidationError::TopicWithoutTables("orders".to_string()))
        );
    }

    #[test]
    fn duplicate_tables_are_invalid() {
        let table = TableConfig::new("shop", "orders", "id=key");
        let config = sink_config(BTreeMap::from([(
            "orders".to_string(),
            TopicConfig {
                codec: CodecConfig::default(),
                tables: vec![table.clone(), table],
            },
        )]));

        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateTable { .. })
        ));
    }

    #[test]
    fn zero_concurrency_is_invalid() {
        let mut config = sink_config(BTreeMap::new());
        config.max_concurrent_requests = 0;

        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { field, .. }) if field == "max_concurrent_requests"
        ));
    }

    #[test]
    fn concurrency_above_the_ceiling_is_invalid() {
        let mut config = sink_config(BTreeMap::new());
        config.max_concurrent_requests = SinkConfig::MAX_CONCURRENT_REQUESTS + 1;

        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { field, .. }) if field == "max_concurrent_requests"
        ));

        config.max_concurrent_requests = usize::MAX;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { field, .. }) if field == "max_concurrent_requests"
        ));
    }
}
