//! Status reporting - catalog joined with the version log

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::{MigrationError, MigrationResult};
use crate::resolver::Catalog;
use crate::store::VersionLogEntry;
use crate::version::Version;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Up,
    Down,
    /// Applied in the database but absent from the catalog
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    pub status: MigrationStatus,
    pub version: Version,
    pub name: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub breakpoint: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub migrations: Vec<StatusEntry>,
    pub pending_count: usize,
    pub missing_count: usize,
    pub total_count: usize,
}

/// Rendering requested by `status --format`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for StatusFormat {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(StatusFormat::Text),
            "json" => Ok(StatusFormat::Json),
            other => Err(MigrationError::invalid_argument(format!(
                "Unknown status format '{}', expected text or json",
                other
            ))),
        }
    }
}

impl fmt::Display for StatusFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFormat::Text => f.write_str("text"),
            StatusFormat::Json => f.write_str("json"),
        }
    }
}

impl StatusReport {
    /// Join the catalog with the version log.
    ///
    /// The log is already ordered per the configured version order, so applied
    /// and missing entries keep that order; pending ones follow, ascending.
    pub fn build(catalog: &Catalog, log: &[VersionLogEntry]) -> Self {
        let mut migrations = Vec::with_capacity(catalog.len() + log.len());

        for applied in log {
            let entry = catalog.get(applied.version);
            migrations.push(StatusEntry {
                status: if entry.is_some() {
                    MigrationStatus::Up
                } else {
                    MigrationStatus::Missing
                },
                version: applied.version,
                name: entry
                    .map(|e| e.name.clone())
                    .or_else(|| applied.migration_name.clone()),
                start_time: applied.start_time,
                end_time: applied.end_time,
                breakpoint: applied.breakpoint,
            });
        }

        for entry in catalog.entries() {
            if log.iter().any(|applied| applied.version == entry.version) {
                continue;
            }
            migrations.push(StatusEntry {
                status: MigrationStatus::Down,
                version: entry.version,
                name: Some(entry.name.clone()),
                start_time: None,
                end_time: None,
                breakpoint: false,
            });
        }

        let count = |status: MigrationStatus| migrations.iter().filter(|m| m.status == status).count();
        let pending_count = count(MigrationStatus::Down);
        let missing_count = count(MigrationStatus::Missing);

        Self {
            total_count: migrations.len(),
            pending_count,
            missing_count,
            migrations,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    pub fn has_missing(&self) -> bool {
        self.missing_count > 0
    }

    /// Fixed-width table, one line per element
    pub fn render_text(&self) -> Vec<String> {
        if self.migrations.is_empty() {
            return vec!["There are no available migrations.".to_string()];
        }

        let mut lines = vec![
            String::new(),
            " Status  [Migration ID]  Started              Finished             Migration Name "
                .to_string(),
            "-".repeat(82),
        ];

        for migration in &self.migrations {
            let status = match migration.status {
                MigrationStatus::Down => "   down",
                MigrationStatus::Up | MigrationStatus::Missing => "     up",
            };
            let mut line = format!(
                "{}  {:>14}  {:>19}  {:>19}  {}",
                status,
                migration.version.as_i64(),
                format_time(migration.start_time),
                format_time(migration.end_time),
                migration.name.as_deref().unwrap_or_default()
            );
            if migration.status == MigrationStatus::Missing {
                line.push_str("  ** MISSING MIGRATION FILE **");
            }
            lines.push(line);

            if migration.breakpoint {
                lines.push("         BREAKPOINT SET".to_string());
            }
        }

        lines.push(String::new());
        lines
    }

    pub fn render_json(&self) -> MigrationResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render(&self, format: StatusFormat) -> MigrationResult<Vec<String>> {
        match format {
            StatusFormat::Text => Ok(self.render_text()),
            StatusFormat::Json => Ok(vec![self.render_json()?]),
        }
    }
}

fn format_time(time: Option<NaiveDateTime>) -> String {
    time.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}
