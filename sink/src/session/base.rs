use std::future::Future;

use crate::error::SinkResult;
use crate::statement::{BoundStatement, TableSchema};

/// Client of the destination database.
///
/// Implementations wrap a driver session. Statement execution is asynchronous and may run
/// concurrently for as many statements as the sink's in-flight budget allows, so
/// implementations must be safe to share between tasks.
///
/// Execution errors should use the execution kinds of [`crate::error::ErrorKind`], such as
/// [`crate::error::ErrorKind::DestinationQueryFailed`], so that the error tolerance policy can
/// tell them apart from mapping and conversion failures.
pub trait Session: Send + Sync + 'static {
    /// Returns the name of the session, used in logs.
    fn name() -> &'static str;

    /// Returns the schema of a table, or [`None`] when the table does not exist.
    fn table_schema(
        &self,
        keyspace: &str,
        table: &str,
    ) -> impl Future<Output = SinkResult<Option<TableSchema>>> + Send;

    /// Executes one bound statement.
    fn execute(&self, statement: BoundStatement) -> impl Future<Output = SinkResult<()>> + Send;

    /// Releases the session when the sink shuts down.
    ///
    /// The default implementation is a no-op.
    fn shutdown(&self) -> impl Future<Output = SinkResult<()>> + Send {
        async { Ok(()) }
    }
}
