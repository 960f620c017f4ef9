use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Executor, Row as _};

use super::{Adapter, Row};
use crate::dialect::Dialect;
use crate::error::{MigrationError, MigrationResult};

/// SQLite adapter over a single exclusive connection
pub struct SqliteAdapter {
    connection: SqliteConnection,
}

impl SqliteAdapter {
    /// Open (and create if missing) the database file, or `:memory:`
    pub async fn open(database: &str) -> MigrationResult<Self> {
        let options = if database == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new()
                .filename(database)
                .create_if_missing(true)
        };

        let connection = options.connect().await.map_err(|e| {
            MigrationError::configuration(format!(
                "Failed to open SQLite database '{}': {}",
                database, e
            ))
        })?;

        Ok(Self { connection })
    }

    /// Private in-memory database, used by tests and embedding applications
    pub async fn in_memory() -> MigrationResult<Self> {
        Self::open(":memory:").await
    }
}

fn text_cells(row: &SqliteRow) -> MigrationResult<Row> {
    (0..row.len())
        .map(|index| row.try_get::<Option<String>, _>(index).map_err(Into::into))
        .collect()
}

#[async_trait]
impl Adapter for SqliteAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&mut self, sql: &str) -> MigrationResult<u64> {
        let result = (&mut self.connection).execute(sql).await?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str) -> MigrationResult<Vec<Row>> {
        let rows = (&mut self.connection).fetch_all(sql).await?;
        rows.iter().map(text_cells).collect()
    }

    async fn disconnect(self: Box<Self>) -> MigrationResult<()> {
        self.connection.close().await?;
        Ok(())
    }
}
