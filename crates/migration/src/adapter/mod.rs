//! Database adapters - the capability surface the engine drives
//!
//! An adapter owns exactly one connection for the lifetime of an invocation.
//! The engine awaits every call before issuing the next one.

mod postgres;
mod sqlite;

pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;

use async_trait::async_trait;

use crate::config::Environment;
use crate::dialect::Dialect;
use crate::error::MigrationResult;

/// One result row; every cell is fetched as nullable text
pub type Row = Vec<Option<String>>;

#[async_trait]
pub trait Adapter: Send {
    fn dialect(&self) -> Dialect;

    /// Whether DDL can be wrapped in a transaction
    fn has_transactions(&self) -> bool {
        self.dialect().supports_transactional_ddl()
    }

    /// Execute one or more statements, returning the affected row count
    async fn execute(&mut self, sql: &str) -> MigrationResult<u64>;

    async fn query(&mut self, sql: &str) -> MigrationResult<Vec<Row>>;

    async fn begin_transaction(&mut self) -> MigrationResult<()> {
        self.execute("BEGIN").await.map(|_| ())
    }

    async fn commit_transaction(&mut self) -> MigrationResult<()> {
        self.execute("COMMIT").await.map(|_| ())
    }

    async fn rollback_transaction(&mut self) -> MigrationResult<()> {
        self.execute("ROLLBACK").await.map(|_| ())
    }

    async fn has_table(&mut self, table: &str) -> MigrationResult<bool> {
        let sql = self.dialect().has_table_sql(table);
        let rows = self.query(&sql).await?;
        let count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(|cell| cell.as_deref())
            .and_then(|cell| cell.trim().parse::<i64>().ok())
            .unwrap_or(0);
        Ok(count > 0)
    }

    async fn disconnect(self: Box<Self>) -> MigrationResult<()>;
}

/// Open a connection for a resolved environment
pub async fn connect(environment: &Environment) -> MigrationResult<Box<dyn Adapter>> {
    tracing::debug!(
        environment = %environment.name,
        adapter = %environment.dialect,
        "Connecting to database"
    );

    let adapter: Box<dyn Adapter> = match environment.dialect {
        Dialect::Postgres => Box::new(PostgresAdapter::connect(environment).await?),
        Dialect::Sqlite => Box::new(SqliteAdapter::open(&environment.database).await?),
    };
    Ok(adapter)
}
