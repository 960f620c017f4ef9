//! Version store - the tracking table recording applied migrations
//!
//! Every statement is built as plain SQL with inline literals so that the same
//! text can be executed or printed during a dry run. All selected columns are
//! cast to text so that adapters only have to return text cells.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::adapter::{Adapter, Row};
use crate::dialect::Dialect;
use crate::error::{MigrationError, MigrationResult};
use crate::version::{Version, VersionOrder};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MAX_NAME_LENGTH: usize = 100;

/// One applied migration as recorded in the tracking table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionLogEntry {
    pub version: Version,
    pub migration_name: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub breakpoint: bool,
}

impl VersionLogEntry {
    /// Start time as a `YYYYMMDDHHMMSS` number, for execution-order comparisons
    pub fn start_time_as_version(&self) -> Version {
        self.start_time
            .map(Version::from_datetime)
            .unwrap_or(Version::ZERO)
    }
}

/// SQL for one environment's tracking table
#[derive(Debug, Clone)]
pub struct VersionStore {
    table: String,
    order: VersionOrder,
}

impl VersionStore {
    pub fn new(table: impl Into<String>, order: VersionOrder) -> Self {
        Self {
            table: table.into(),
            order,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn order(&self) -> VersionOrder {
        self.order
    }

    fn quoted_table(&self, dialect: Dialect) -> String {
        dialect.quote_identifier(&self.table)
    }

    pub fn create_table_sql(&self, dialect: Dialect) -> String {
        format!(
            "CREATE TABLE {} (\n    \
             version BIGINT NOT NULL PRIMARY KEY,\n    \
             migration_name VARCHAR(100) NULL,\n    \
             start_time TIMESTAMP NULL,\n    \
             end_time TIMESTAMP NULL,\n    \
             breakpoint BOOLEAN NOT NULL DEFAULT FALSE\n)",
            self.quoted_table(dialect)
        )
    }

    pub fn select_sql(&self, dialect: Dialect) -> String {
        let order_by = match self.order {
            VersionOrder::Creation => "version ASC",
            VersionOrder::Execution => "start_time ASC, version ASC",
        };
        format!(
            "SELECT CAST(version AS VARCHAR(20)), migration_name, \
             CAST(start_time AS VARCHAR(32)), CAST(end_time AS VARCHAR(32)), \
             CASE WHEN breakpoint THEN '1' ELSE '0' END \
             FROM {} ORDER BY {}",
            self.quoted_table(dialect),
            order_by
        )
    }

    pub fn insert_sql(
        &self,
        dialect: Dialect,
        version: Version,
        name: &str,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> String {
        let name: String = name.chars().take(MAX_NAME_LENGTH).collect();
        format!(
            "INSERT INTO {} (version, migration_name, start_time, end_time, breakpoint) \
             VALUES ({}, {}, '{}', '{}', FALSE)",
            self.quoted_table(dialect),
            version,
            Dialect::quote_literal(&name),
            start_time.format(TIMESTAMP_FORMAT),
            end_time.format(TIMESTAMP_FORMAT)
        )
    }

    pub fn delete_sql(&self, dialect: Dialect, version: Version) -> String {
        format!(
            "DELETE FROM {} WHERE version = {}",
            self.quoted_table(dialect),
            version
        )
    }

    pub fn toggle_breakpoint_sql(&self, dialect: Dialect, version: Version) -> String {
        format!(
            "UPDATE {} SET breakpoint = NOT breakpoint WHERE version = {}",
            self.quoted_table(dialect),
            version
        )
    }

    pub fn set_breakpoint_sql(&self, dialect: Dialect, version: Version, state: bool) -> String {
        format!(
            "UPDATE {} SET breakpoint = {} WHERE version = {}",
            self.quoted_table(dialect),
            if state { "TRUE" } else { "FALSE" },
            version
        )
    }

    pub fn reset_breakpoints_sql(&self, dialect: Dialect) -> String {
        format!(
            "UPDATE {} SET breakpoint = FALSE WHERE breakpoint = TRUE",
            self.quoted_table(dialect)
        )
    }

    /// Read the version log, ordered per the configured version order
    pub async fn load(&self, adapter: &mut dyn Adapter) -> MigrationResult<Vec<VersionLogEntry>> {
        let sql = self.select_sql(adapter.dialect());
        let rows = adapter.query(&sql).await?;
        rows.iter().map(parse_row).collect()
    }
}

fn parse_row(row: &Row) -> MigrationResult<VersionLogEntry> {
    let cell = |index: usize| row.get(index).and_then(|c| c.as_deref());

    let version = cell(0)
        .ok_or_else(|| MigrationError::configuration("Tracking table row without a version"))?
        .parse::<Version>()?;

    Ok(VersionLogEntry {
        version,
        migration_name: cell(1).map(str::to_string),
        start_time: cell(2).and_then(parse_timestamp),
        end_time: cell(3).and_then(parse_timestamp),
        breakpoint: matches!(cell(4), Some("1") | Some("t") | Some("true")),
    })
}

/// Parse timestamps as rendered by either database's text cast
pub(crate) fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}
