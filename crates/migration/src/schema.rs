//! Schema command log - what a migration or seed asks the database to do
//!
//! Units never talk to the connection directly. They record [`Command`]s on a
//! [`Schema`], and the engine decides whether those commands are executed,
//! printed (dry run), skipped (fake run) or inverted (rollback of a
//! reversible migration).

use serde_json::{Map, Value};

use crate::error::{MigrationError, MigrationResult};

/// Column data types understood by every dialect
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    /// Auto-increment integer primary key
    Id,
    SmallInteger,
    Integer,
    BigInteger,
    /// Variable length string, `None` for unbounded text
    String(Option<u32>),
    Text,
    Boolean,
    Decimal { precision: u8, scale: u8 },
    Float,
    Date,
    Timestamp,
    Json,
    Uuid,
    Binary,
    /// Passed through verbatim
    Custom(String),
}

/// Default value of a column
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A literal, rendered and quoted by the dialect
    Value(Value),
    /// A raw SQL expression such as `CURRENT_TIMESTAMP`
    Expression(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub unique: bool,
}

impl ColumnDefinition {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: true,
            default: None,
            unique: false,
        }
    }

    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    pub fn not_null(&mut self) -> &mut Self {
        self.nullable = false;
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    pub fn default_value(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_raw(&mut self, expression: &str) -> &mut Self {
        self.default = Some(DefaultValue::Expression(expression.to_string()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }

    /// Index name, derived from table and columns when none was given
    pub fn resolved_name(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("idx_{}_{}", table, self.columns.join("_")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    pub unique: Vec<Vec<String>>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            unique: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }
}

/// Table builder for CREATE TABLE commands
pub struct TableBuilder {
    definition: TableDefinition,
}

impl TableBuilder {
    pub fn new(table_name: &str) -> Self {
        Self {
            definition: TableDefinition::new(table_name),
        }
    }

    /// Add a column of any type
    pub fn column(&mut self, name: &str, column_type: ColumnType) -> &mut ColumnDefinition {
        self.definition
            .columns
            .push(ColumnDefinition::new(name, column_type));
        let last = self.definition.columns.len() - 1;
        &mut self.definition.columns[last]
    }

    /// Add an ID column (auto-increment primary key)
    pub fn id(&mut self, name: &str) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Id)
    }

    pub fn uuid(&mut self, name: &str) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Uuid)
    }

    pub fn string(&mut self, name: &str, length: Option<u32>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::String(length))
    }

    pub fn text(&mut self, name: &str) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Text)
    }

    pub fn integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Integer)
    }

    pub fn big_integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.column(name, ColumnType::BigInteger)
    }

    pub fn boolean(&mut self, name: &str) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Boolean)
    }

    pub fn decimal(&mut self, name: &str, precision: u8, scale: u8) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Decimal { precision, scale })
    }

    pub fn float(&mut self, name: &str) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Float)
    }

    pub fn date(&mut self, name: &str) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Date)
    }

    pub fn timestamp(&mut self, name: &str) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Timestamp)
    }

    pub fn json(&mut self, name: &str) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Json)
    }

    pub fn binary(&mut self, name: &str) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Binary)
    }

    /// Add created_at / updated_at columns
    pub fn timestamps(&mut self) -> &mut Self {
        self.timestamp("created_at")
            .not_null()
            .default_raw("CURRENT_TIMESTAMP");
        self.timestamp("updated_at")
            .not_null()
            .default_raw("CURRENT_TIMESTAMP");
        self
    }

    /// Add a primary key constraint
    pub fn primary_key(&mut self, columns: &[&str]) -> &mut Self {
        self.definition.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Add a unique constraint
    pub fn unique(&mut self, columns: &[&str]) -> &mut Self {
        self.definition
            .unique
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Add a foreign key constraint
    pub fn foreign_key(
        &mut self,
        column: &str,
        references_table: &str,
        references_column: &str,
    ) -> &mut Self {
        self.definition.foreign_keys.push(ForeignKey {
            column: column.to_string(),
            references_table: references_table.to_string(),
            references_column: references_column.to_string(),
        });
        self
    }

    /// Create a secondary index together with the table
    pub fn index(&mut self, columns: &[&str]) -> &mut Self {
        self.definition.indexes.push(IndexDefinition::new(columns));
        self
    }

    pub fn unique_index(&mut self, columns: &[&str]) -> &mut Self {
        let mut index = IndexDefinition::new(columns);
        index.unique = true;
        self.definition.indexes.push(index);
        self
    }

    pub fn build(self) -> TableDefinition {
        self.definition
    }
}

/// One recorded schema operation
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTable(TableDefinition),
    DropTable {
        table: String,
        /// Known definition, required to recreate the table on rollback
        definition: Option<TableDefinition>,
    },
    RenameTable {
        from: String,
        to: String,
    },
    AddColumn {
        table: String,
        column: ColumnDefinition,
    },
    DropColumn {
        table: String,
        column: String,
        definition: Option<ColumnDefinition>,
    },
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    AddIndex {
        table: String,
        index: IndexDefinition,
    },
    DropIndex {
        table: String,
        name: String,
        definition: Option<IndexDefinition>,
    },
    Insert {
        table: String,
        row: Map<String, Value>,
    },
    /// Raw SQL with an optional declared inverse
    Execute {
        sql: String,
        down: Option<String>,
    },
}

impl Command {
    /// The command that undoes this one, or `None` when it cannot be inverted
    pub fn inverse(&self) -> Option<Command> {
        match self {
            Command::CreateTable(definition) => Some(Command::DropTable {
                table: definition.name.clone(),
                definition: Some(definition.clone()),
            }),
            Command::DropTable { definition, .. } => {
                definition.clone().map(Command::CreateTable)
            }
            Command::RenameTable { from, to } => Some(Command::RenameTable {
                from: to.clone(),
                to: from.clone(),
            }),
            Command::AddColumn { table, column } => Some(Command::DropColumn {
                table: table.clone(),
                column: column.name.clone(),
                definition: Some(column.clone()),
            }),
            Command::DropColumn {
                table, definition, ..
            } => definition.clone().map(|column| Command::AddColumn {
                table: table.clone(),
                column,
            }),
            Command::RenameColumn { table, from, to } => Some(Command::RenameColumn {
                table: table.clone(),
                from: to.clone(),
                to: from.clone(),
            }),
            Command::AddIndex { table, index } => Some(Command::DropIndex {
                table: table.clone(),
                name: index.resolved_name(table),
                definition: Some(index.clone()),
            }),
            Command::DropIndex {
                table, definition, ..
            } => definition.clone().map(|index| Command::AddIndex {
                table: table.clone(),
                index,
            }),
            Command::Insert { .. } => None,
            Command::Execute { sql, down } => down.as_ref().map(|down| Command::Execute {
                sql: down.clone(),
                down: Some(sql.clone()),
            }),
        }
    }

    /// Short human description, used in logs and irreversibility errors
    pub fn describe(&self) -> String {
        match self {
            Command::CreateTable(definition) => format!("create table {}", definition.name),
            Command::DropTable { table, .. } => format!("drop table {}", table),
            Command::RenameTable { from, to } => format!("rename table {} to {}", from, to),
            Command::AddColumn { table, column } => {
                format!("add column {}.{}", table, column.name)
            }
            Command::DropColumn { table, column, .. } => {
                format!("drop column {}.{}", table, column)
            }
            Command::RenameColumn { table, from, to } => {
                format!("rename column {}.{} to {}", table, from, to)
            }
            Command::AddIndex { table, index } => {
                format!("add index {}", index.resolved_name(table))
            }
            Command::DropIndex { name, .. } => format!("drop index {}", name),
            Command::Insert { table, .. } => format!("insert into {}", table),
            Command::Execute { sql, .. } => {
                let first_line = sql.lines().next().unwrap_or_default().trim();
                format!("execute \"{}\"", first_line)
            }
        }
    }
}

/// Recording execution context handed to migrations and seeders
#[derive(Debug, Default)]
pub struct Schema {
    commands: Vec<Command>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new table
    pub fn create_table<F>(&mut self, table_name: &str, callback: F) -> &mut Self
    where
        F: FnOnce(&mut TableBuilder),
    {
        let mut table_builder = TableBuilder::new(table_name);
        callback(&mut table_builder);
        self.commands
            .push(Command::CreateTable(table_builder.build()));
        self
    }

    /// Drop a table; not reversible since its shape is unknown
    pub fn drop_table(&mut self, table_name: &str) -> &mut Self {
        self.commands.push(Command::DropTable {
            table: table_name.to_string(),
            definition: None,
        });
        self
    }

    /// Drop a table whose definition is restated so that it can be recreated
    pub fn drop_table_with<F>(&mut self, table_name: &str, callback: F) -> &mut Self
    where
        F: FnOnce(&mut TableBuilder),
    {
        let mut table_builder = TableBuilder::new(table_name);
        callback(&mut table_builder);
        self.commands.push(Command::DropTable {
            table: table_name.to_string(),
            definition: Some(table_builder.build()),
        });
        self
    }

    pub fn rename_table(&mut self, from: &str, to: &str) -> &mut Self {
        self.commands.push(Command::RenameTable {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    /// Add a column to an existing table
    pub fn add_column(&mut self, table_name: &str, column: ColumnDefinition) -> &mut Self {
        self.commands.push(Command::AddColumn {
            table: table_name.to_string(),
            column,
        });
        self
    }

    /// Drop a column; not reversible
    pub fn drop_column(&mut self, table_name: &str, column_name: &str) -> &mut Self {
        self.commands.push(Command::DropColumn {
            table: table_name.to_string(),
            column: column_name.to_string(),
            definition: None,
        });
        self
    }

    /// Drop a column whose definition is restated so that it can be re-added
    pub fn drop_column_with(&mut self, table_name: &str, column: ColumnDefinition) -> &mut Self {
        self.commands.push(Command::DropColumn {
            table: table_name.to_string(),
            column: column.name.clone(),
            definition: Some(column),
        });
        self
    }

    pub fn rename_column(&mut self, table_name: &str, from: &str, to: &str) -> &mut Self {
        self.commands.push(Command::RenameColumn {
            table: table_name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    /// Create an index
    pub fn add_index(
        &mut self,
        table_name: &str,
        column_names: &[&str],
        index_name: Option<&str>,
    ) -> &mut Self {
        let mut index = IndexDefinition::new(column_names);
        index.name = index_name.map(|n| n.to_string());
        self.commands.push(Command::AddIndex {
            table: table_name.to_string(),
            index,
        });
        self
    }

    pub fn add_unique_index(
        &mut self,
        table_name: &str,
        column_names: &[&str],
        index_name: Option<&str>,
    ) -> &mut Self {
        let mut index = IndexDefinition::new(column_names);
        index.name = index_name.map(|n| n.to_string());
        index.unique = true;
        self.commands.push(Command::AddIndex {
            table: table_name.to_string(),
            index,
        });
        self
    }

    /// Drop an index; not reversible
    pub fn drop_index(&mut self, table_name: &str, index_name: &str) -> &mut Self {
        self.commands.push(Command::DropIndex {
            table: table_name.to_string(),
            name: index_name.to_string(),
            definition: None,
        });
        self
    }

    /// Insert one row (a JSON object) or many rows (an array of objects)
    pub fn insert(&mut self, table_name: &str, rows: Value) -> MigrationResult<&mut Self> {
        let rows = match rows {
            Value::Object(row) => vec![row],
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(MigrationError::invalid_argument(format!(
                        "rows inserted into {} must be objects, got {}",
                        table_name, other
                    ))),
                })
                .collect::<MigrationResult<Vec<_>>>()?,
            other => {
                return Err(MigrationError::invalid_argument(format!(
                    "rows inserted into {} must be objects, got {}",
                    table_name, other
                )))
            }
        };

        for row in rows {
            self.commands.push(Command::Insert {
                table: table_name.to_string(),
                row,
            });
        }
        Ok(self)
    }

    /// Execute raw SQL; irreversible
    pub fn execute(&mut self, sql: &str) -> &mut Self {
        self.commands.push(Command::Execute {
            sql: sql.to_string(),
            down: None,
        });
        self
    }

    /// Execute raw SQL together with the SQL that undoes it
    pub fn execute_reversible(&mut self, up: &str, down: &str) -> &mut Self {
        self.commands.push(Command::Execute {
            sql: up.to_string(),
            down: Some(down.to_string()),
        });
        self
    }

    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
