//! Seed units - one-off data loaders with no version tracking

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MigrationError, MigrationResult};
use crate::resolver::Source;
use crate::schema::Schema;

static DEPENDS_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^--\s*depends\s*:\s*(.*)$").expect("depends header regex")
});

/// A data-loading unit, run on demand
pub trait Seeder: Send + Sync {
    fn run(&self, schema: &mut Schema) -> MigrationResult<()>;

    /// Names of seeders that must run first
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Seeder backed by a `.sql` file.
///
/// Leading `-- depends: OtherSeeder, ...` lines declare dependencies.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlSeeder {
    pub sql: String,
    pub depends_on: Vec<String>,
}

impl SqlSeeder {
    pub fn parse(content: &str) -> Self {
        let depends_on = content
            .lines()
            .map(str::trim)
            .take_while(|line| line.is_empty() || line.starts_with("--"))
            .filter_map(|line| DEPENDS_HEADER.captures(line))
            .flat_map(|captures| {
                captures[1]
                    .split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect();

        Self {
            sql: content.trim().to_string(),
            depends_on,
        }
    }

    pub fn from_file(path: &Path) -> MigrationResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }
}

impl Seeder for SqlSeeder {
    fn run(&self, schema: &mut Schema) -> MigrationResult<()> {
        if !self.sql.is_empty() {
            schema.execute(&self.sql);
        }
        Ok(())
    }

    fn dependencies(&self) -> Vec<String> {
        self.depends_on.clone()
    }
}

/// A discovered seeder
#[derive(Clone)]
pub struct SeedEntry {
    pub name: String,
    pub source: Source,
    pub unit: Arc<dyn Seeder>,
}

impl fmt::Debug for SeedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedEntry")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

/// Order seeders by name, moving each after the seeders it depends on
pub fn order_seeds(entries: Vec<SeedEntry>) -> MigrationResult<Vec<SeedEntry>> {
    let by_name: BTreeMap<String, SeedEntry> = entries
        .into_iter()
        .map(|entry| (entry.name.clone(), entry))
        .collect();

    let mut ordered = Vec::with_capacity(by_name.len());
    let mut done = HashSet::new();
    let mut visiting = Vec::new();

    for name in by_name.keys() {
        visit(name, &by_name, &mut done, &mut visiting, &mut ordered)?;
    }
    Ok(ordered)
}

fn visit(
    name: &str,
    by_name: &BTreeMap<String, SeedEntry>,
    done: &mut HashSet<String>,
    visiting: &mut Vec<String>,
    ordered: &mut Vec<SeedEntry>,
) -> MigrationResult<()> {
    if done.contains(name) {
        return Ok(());
    }
    if visiting.iter().any(|v| v == name) {
        visiting.push(name.to_string());
        return Err(MigrationError::SeedDependency {
            seed: name.to_string(),
            message: format!("dependency cycle {}", visiting.join(" -> ")),
        });
    }

    let Some(entry) = by_name.get(name) else {
        return Err(MigrationError::SeedDependency {
            seed: visiting.last().cloned().unwrap_or_default(),
            message: format!("depends on unknown seed '{}'", name),
        });
    };

    visiting.push(name.to_string());
    for dependency in entry.unit.dependencies() {
        visit(&dependency, by_name, done, visiting, ordered)?;
    }
    visiting.pop();

    done.insert(name.to_string());
    ordered.push(entry.clone());
    Ok(())
}
