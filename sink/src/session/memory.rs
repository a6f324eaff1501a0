use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SinkResult;
use crate::session::Session;
use crate::statement::{BoundStatement, TableSchema};

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<(String, String), TableSchema>,
    statements: Vec<BoundStatement>,
}

/// In-memory session for testing and development purposes.
///
/// [`MemorySession`] serves the table schemas it was given and records every statement it is
/// asked to execute instead of sending it anywhere. Executions always succeed.
///
/// # Examples
///
/// ```rust,no_run
/// use sink::session::memory::MemorySession;
/// use sink::statement::{ColumnKind, ColumnSchema, TableSchema};
/// use sink::types::ColumnType;
///
/// # #[tokio::main]
/// # async fn main() {
/// let session = MemorySession::new().with_table(TableSchema::new(
///     "shop",
///     "orders",
///     vec![ColumnSchema::new("id", ColumnType::Text, ColumnKind::PartitionKey)],
/// ));
///
/// // ... run a processor against a clone of the session ...
///
/// println!("executed {} statements", session.statements().await.len());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySession {
    /// Creates a session without tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table schema, replacing a previous schema of the same table.
    pub fn with_table(self, schema: TableSchema) -> Self {
        // The session is not shared yet, so the lock is uncontended.
        if let Ok(mut inner) = self.inner.try_lock() {
            inner
                .tables
                .insert((schema.keyspace.clone(), schema.name.clone()), schema);
        }
        self
    }

    pub async fn add_table(&self, schema: TableSchema) {
        let mut inner = self.inner.lock().await;
        inner
            .tables
            .insert((schema.keyspace.clone(), schema.name.clone()), schema);
    }

    /// Returns a copy of every statement executed so far, in execution order.
    pub async fn statements(&self) -> Vec<BoundStatement> {
        self.inner.lock().await.statements.clone()
    }

    /// Returns the statements executed against one `keyspace.table`.
    pub async fn statements_for(&self, table: &str) -> Vec<BoundStatement> {
        self.inner
            .lock()
            .await
            .statements
            .iter()
            .filter(|statement| statement.table == table)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.inner.lock().await.statements.clear();
    }
}

impl Session for MemorySession {
    fn name() -> &'static str {
        "memory"
    }

    async fn table_schema(&self, keyspace: &str, table: &str) -> SinkResult<Option<TableSchema>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tables
            .get(&(keyspace.to_string(), table.to_string()))
            .cloned())
    }

    async fn execute(&self, statement: BoundStatement) -> SinkResult<()> {
        debug!(table = %statement.table, statement = %statement.text, "executing statement");

        let mut inner = self.inner.lock().await;
        inner.statements.push(statement);

        Ok(())
    }
}
