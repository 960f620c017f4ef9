use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{ConnectOptions, Connection, Executor, Row as _};

use super::{Adapter, Row};
use crate::config::Environment;
use crate::dialect::Dialect;
use crate::error::{MigrationError, MigrationResult};

/// PostgreSQL adapter over a single exclusive connection
pub struct PostgresAdapter {
    connection: PgConnection,
}

impl PostgresAdapter {
    pub async fn connect(environment: &Environment) -> MigrationResult<Self> {
        let mut options = PgConnectOptions::new()
            .host(environment.host.as_deref().unwrap_or("localhost"))
            .database(&environment.database);

        if let Some(port) = environment.port {
            options = options.port(port);
        }
        if let Some(user) = &environment.user {
            options = options.username(user);
        }
        if let Some(pass) = &environment.pass {
            options = options.password(pass);
        }

        let connection = options.connect().await.map_err(|e| {
            MigrationError::configuration(format!(
                "Failed to connect to database '{}': {}",
                environment.database, e
            ))
        })?;

        let mut adapter = Self { connection };
        for statement in session_settings(environment) {
            adapter.execute(&statement).await?;
        }
        Ok(adapter)
    }

    pub fn from_connection(connection: PgConnection) -> Self {
        Self { connection }
    }
}

/// Statements run once after connecting
fn session_settings(environment: &Environment) -> Vec<String> {
    let mut statements = Vec::new();
    if let Some(charset) = &environment.charset {
        statements.push(format!(
            "SET client_encoding TO {}",
            Dialect::quote_literal(charset)
        ));
    }
    if let Some(schema) = &environment.schema {
        statements.push(format!(
            "SET search_path TO {}",
            Dialect::Postgres.quote_identifier(schema)
        ));
    }
    statements
}

fn text_cells(row: &PgRow) -> MigrationResult<Row> {
    (0..row.len())
        .map(|index| row.try_get::<Option<String>, _>(index).map_err(Into::into))
        .collect()
}

#[async_trait]
impl Adapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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
