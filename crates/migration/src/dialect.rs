//! SQL dialects - turn recorded schema commands into executable statements

use std::fmt;

use serde_json::Value;
use sqlparser::dialect::{PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use crate::schema::{ColumnDefinition, ColumnType, Command, DefaultValue, IndexDefinition, TableDefinition};

/// Database flavours the engine can generate SQL for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

/// Table prefix and suffix applied to every table a unit touches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableNaming {
    pub prefix: String,
    pub suffix: String,
}

impl TableNaming {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn apply(&self, table: &str) -> String {
        format!("{}{}{}", self.prefix, table, self.suffix)
    }
}

impl Dialect {
    /// Parse an adapter name as written in the configuration file
    pub fn from_adapter_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "pgsql" | "postgres" | "postgresql" => Some(Dialect::Postgres),
            "sqlite" | "sqlite3" => Some(Dialect::Sqlite),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "pgsql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Both supported databases roll back DDL with the surrounding transaction
    pub fn supports_transactional_ddl(&self) -> bool {
        true
    }

    pub fn quote_identifier(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Render a JSON value as an SQL literal
    pub fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Number(number) => number.to_string(),
            Value::String(text) => Self::quote_literal(text),
            nested => Self::quote_literal(&nested.to_string()),
        }
    }

    pub fn column_type(&self, column_type: &ColumnType) -> String {
        match (self, column_type) {
            (Dialect::Postgres, ColumnType::Id) => "SERIAL PRIMARY KEY".to_string(),
            (Dialect::Sqlite, ColumnType::Id) => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            (_, ColumnType::SmallInteger) => "SMALLINT".to_string(),
            (_, ColumnType::Integer) => "INTEGER".to_string(),
            (_, ColumnType::BigInteger) => "BIGINT".to_string(),
            (_, ColumnType::String(Some(length))) => format!("VARCHAR({})", length),
            (_, ColumnType::String(None)) | (_, ColumnType::Text) => "TEXT".to_string(),
            (_, ColumnType::Boolean) => "BOOLEAN".to_string(),
            (_, ColumnType::Decimal { precision, scale }) => {
                format!("NUMERIC({}, {})", precision, scale)
            }
            (Dialect::Postgres, ColumnType::Float) => "DOUBLE PRECISION".to_string(),
            (Dialect::Sqlite, ColumnType::Float) => "REAL".to_string(),
            (_, ColumnType::Date) => "DATE".to_string(),
            (Dialect::Postgres, ColumnType::Timestamp) => "TIMESTAMP".to_string(),
            (Dialect::Sqlite, ColumnType::Timestamp) => "DATETIME".to_string(),
            (Dialect::Postgres, ColumnType::Json) => "JSONB".to_string(),
            (Dialect::Sqlite, ColumnType::Json) => "TEXT".to_string(),
            (Dialect::Postgres, ColumnType::Uuid) => "UUID".to_string(),
            (Dialect::Sqlite, ColumnType::Uuid) => "CHAR(36)".to_string(),
            (Dialect::Postgres, ColumnType::Binary) => "BYTEA".to_string(),
            (Dialect::Sqlite, ColumnType::Binary) => "BLOB".to_string(),
            (_, ColumnType::Custom(sql)) => sql.clone(),
        }
    }

    pub fn column_sql(&self, column: &ColumnDefinition) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.column_type(&column.column_type)
        );

        // the id type already carries its own constraints
        if column.column_type == ColumnType::Id {
            return sql;
        }

        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        match &column.default {
            Some(DefaultValue::Value(value)) => {
                sql.push_str(" DEFAULT ");
                sql.push_str(&self.literal(value));
            }
            Some(DefaultValue::Expression(expression)) => {
                sql.push_str(" DEFAULT ");
                sql.push_str(expression);
            }
            None => {}
        }
        if column.unique {
            sql.push_str(" UNIQUE");
        }
        sql
    }

    fn quoted_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn create_table_sql(&self, definition: &TableDefinition, naming: &TableNaming) -> Vec<String> {
        let mut parts: Vec<String> = definition
            .columns
            .iter()
            .map(|column| self.column_sql(column))
            .collect();

        if !definition.primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", self.quoted_list(&definition.primary_key)));
        }
        for columns in &definition.unique {
            parts.push(format!("UNIQUE ({})", self.quoted_list(columns)));
        }
        for foreign_key in &definition.foreign_keys {
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                self.quote_identifier(&foreign_key.column),
                self.quote_identifier(&naming.apply(&foreign_key.references_table)),
                self.quote_identifier(&foreign_key.references_column)
            ));
        }

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote_identifier(&naming.apply(&definition.name)),
            parts.join(",\n    ")
        )];

        for index in &definition.indexes {
            statements.push(self.create_index_sql(&definition.name, index, naming));
        }
        statements
    }

    fn create_index_sql(&self, table: &str, index: &IndexDefinition, naming: &TableNaming) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.resolved_name(table)),
            self.quote_identifier(&naming.apply(table)),
            self.quoted_list(&index.columns)
        )
    }

    /// Compile one command into the statements that perform it
    pub fn compile(&self, command: &Command, naming: &TableNaming) -> Vec<String> {
        let table = |name: &str| self.quote_identifier(&naming.apply(name));

        match command {
            Command::CreateTable(definition) => self.create_table_sql(definition, naming),
            Command::DropTable { table: name, .. } => vec![format!("DROP TABLE {}", table(name))],
            Command::RenameTable { from, to } => {
                vec![format!("ALTER TABLE {} RENAME TO {}", table(from), table(to))]
            }
            Command::AddColumn { table: name, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                table(name),
                self.column_sql(column)
            )],
            Command::DropColumn { table: name, column, .. } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                table(name),
                self.quote_identifier(column)
            )],
            Command::RenameColumn { table: name, from, to } => vec![format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                table(name),
                self.quote_identifier(from),
                self.quote_identifier(to)
            )],
            Command::AddIndex { table: name, index } => {
                vec![self.create_index_sql(name, index, naming)]
            }
            Command::DropIndex { name, .. } => {
                vec![format!("DROP INDEX {}", self.quote_identifier(name))]
            }
            Command::Insert { table: name, row } => {
                if row.is_empty() {
                    return vec![format!("INSERT INTO {} DEFAULT VALUES", table(name))];
                }
                let columns: Vec<String> = row.keys().map(|k| self.quote_identifier(k)).collect();
                let values: Vec<String> = row.values().map(|v| self.literal(v)).collect();
                vec![format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table(name),
                    columns.join(", "),
                    values.join(", ")
                )]
            }
            Command::Execute { sql, .. } => self.split_statements(sql),
        }
    }

    /// Probe returning a single text cell holding the number of matching tables
    pub fn has_table_sql(&self, table: &str) -> String {
        match self {
            Dialect::Postgres => format!(
                "SELECT CAST(COUNT(*) AS VARCHAR(20)) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = {}",
                Self::quote_literal(table)
            ),
            Dialect::Sqlite => format!(
                "SELECT CAST(COUNT(*) AS VARCHAR(20)) FROM sqlite_master \
                 WHERE type = 'table' AND name = {}",
                Self::quote_literal(table)
            ),
        }
    }

    /// Split an SQL section into individual statements.
    ///
    /// Sections the parser does not understand are executed as a single
    /// statement rather than guessed at.
    pub fn split_statements(&self, sql: &str) -> Vec<String> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let parsed = match self {
            Dialect::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, trimmed),
            Dialect::Sqlite => Parser::parse_sql(&SQLiteDialect {}, trimmed),
        };

        match parsed {
            Ok(statements) => statements.iter().map(|s| s.to_string()).collect(),
            Err(e) => {
                tracing::debug!("SQL parsing failed, executing section as one statement: {}", e);
                vec![trimmed.to_string()]
            }
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
