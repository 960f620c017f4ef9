//! Migration resolver - discovery, validation and ordering of units
//!
//! Migrations come from two places: `.sql` files found in the configured
//! paths, and code units registered explicitly on a [`Registry`]. Both are
//! named `<version>_<snake_case_name>` and end up in one ascending
//! [`Catalog`]. Resolution never touches the database.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MigrationError, MigrationResult};
use crate::migration::{Migration, Reversible, ReversibleMigration, SqlMigration};
use crate::seed::{order_seeds, SeedEntry, Seeder, SqlSeeder};
use crate::version::Version;

static MIGRATION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)_([a-z][a-z0-9]*(?:_[a-z0-9]+)*)$").expect("migration name regex")
});
static CLASS_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][a-z0-9]+)+$").expect("class name regex"));
static SEED_FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9]*)\.sql$").expect("seed file regex"));

type MigrationFactory = Box<dyn Fn() -> Arc<dyn Migration> + Send + Sync>;
type SeederFactory = Box<dyn Fn() -> Arc<dyn Seeder> + Send + Sync>;

/// Where a unit was defined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Registered,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Registered => f.write_str("<registered>"),
        }
    }
}

/// Explicit registration of code-defined migrations and seeders
#[derive(Default)]
pub struct Registry {
    migrations: Vec<(String, MigrationFactory)>,
    seeders: Vec<(String, SeederFactory)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration with explicit `up` and `down`
    pub fn migration<M, F>(mut self, id: &str, factory: F) -> Self
    where
        M: Migration + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.migrations.push((
            id.to_string(),
            Box::new(move || Arc::new(factory()) as Arc<dyn Migration>),
        ));
        self
    }

    /// Register a migration written as a single `change`
    pub fn reversible<M, F>(mut self, id: &str, factory: F) -> Self
    where
        M: ReversibleMigration + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.migrations.push((
            id.to_string(),
            Box::new(move || Arc::new(Reversible(factory())) as Arc<dyn Migration>),
        ));
        self
    }

    pub fn seeder<S, F>(mut self, name: &str, factory: F) -> Self
    where
        S: Seeder + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.seeders.push((
            name.to_string(),
            Box::new(move || Arc::new(factory()) as Arc<dyn Seeder>),
        ));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty() && self.seeders.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field(
                "migrations",
                &self.migrations.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .field(
                "seeders",
                &self.seeders.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// One resolved migration
#[derive(Clone)]
pub struct MigrationEntry {
    pub version: Version,
    /// CamelCase name derived from the snake case part of the identifier
    pub name: String,
    pub source: Source,
    pub unit: Arc<dyn Migration>,
}

impl fmt::Debug for MigrationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEntry")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

/// Validated migrations in ascending version order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<Version, MigrationEntry>,
}

impl Catalog {
    pub fn get(&self, version: Version) -> Option<&MigrationEntry> {
        self.entries.get(&version)
    }

    pub fn contains(&self, version: Version) -> bool {
        self.entries.contains_key(&version)
    }

    /// Entries in ascending version order
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &MigrationEntry> {
        self.entries.values()
    }

    pub fn versions(&self) -> impl DoubleEndedIterator<Item = Version> + '_ {
        self.entries.keys().copied()
    }

    pub fn latest(&self) -> Option<Version> {
        self.entries.keys().next_back().copied()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&MigrationEntry> {
        self.entries.values().find(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split `<version>_<snake_name>` into its version and CamelCase name
pub fn parse_migration_id(id: &str) -> MigrationResult<(Version, String)> {
    let captures = MIGRATION_NAME.captures(id).ok_or_else(|| {
        MigrationError::invalid_name(
            id,
            "expected <version>_<snake_case_name>, e.g. 20200101000000_create_users",
        )
    })?;

    let version = captures[1]
        .parse::<Version>()
        .map_err(|_| MigrationError::invalid_name(id, "version prefix is too long"))?;

    let class_name = to_camel_case(&captures[2]);
    if !CLASS_NAME.is_match(&class_name) {
        return Err(MigrationError::invalid_name(
            id,
            format!("'{}' is not a valid CamelCase name", class_name),
        ));
    }

    Ok((version, class_name))
}

fn to_camel_case(snake: &str) -> String {
    snake
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn has_wildcards(path: &str) -> bool {
    path.contains(|c: char| matches!(c, '*' | '?' | '['))
}

/// Expand configured paths into directories; any component may hold glob patterns
pub fn expand_paths(paths: &[PathBuf]) -> MigrationResult<Vec<PathBuf>> {
    let mut directories = Vec::new();

    for path in paths {
        let pattern = path.to_string_lossy();
        if !has_wildcards(&pattern) {
            directories.push(path.clone());
            continue;
        }

        let matches = glob::glob(&pattern).map_err(|e| {
            MigrationError::configuration(format!("Invalid path pattern '{}': {}", pattern, e))
        })?;

        let mut matched = Vec::new();
        for entry in matches {
            let entry = entry.map_err(|e| MigrationError::Io(e.into_error()))?;
            if entry.is_dir() {
                matched.push(entry);
            }
        }
        matched.sort();
        directories.extend(matched);
    }

    Ok(directories)
}

/// `.sql` files directly inside `directory`, sorted by path
fn sql_files(directory: &Path) -> MigrationResult<Vec<PathBuf>> {
    if !directory.is_dir() {
        tracing::debug!(path = %directory.display(), "Skipping missing directory");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Turns configured paths and a registry into catalogs
pub struct Resolver<'a> {
    registry: &'a Registry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Discover, validate and order all migrations
    pub fn migrations(&self, paths: &[PathBuf]) -> MigrationResult<Catalog> {
        let mut candidates: Vec<(String, Source)> = Vec::new();
        for directory in expand_paths(paths)? {
            for file in sql_files(&directory)? {
                let id = file
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                candidates.push((id, Source::File(file)));
            }
        }
        for (id, _) in &self.registry.migrations {
            candidates.push((id.clone(), Source::Registered));
        }

        let mut catalog = Catalog::default();
        let mut names: HashMap<String, Source> = HashMap::new();

        for (id, source) in candidates {
            let (version, name) = parse_migration_id(&id)?;

            if let Some(existing) = catalog.entries.get(&version) {
                return Err(MigrationError::DuplicateVersion {
                    version,
                    first: existing.source.to_string(),
                    second: source.to_string(),
                });
            }
            if let Some(existing) = names.get(&name) {
                return Err(MigrationError::DuplicateName {
                    name,
                    first: existing.to_string(),
                    second: source.to_string(),
                });
            }

            let unit: Arc<dyn Migration> = match &source {
                Source::File(path) => Arc::new(SqlMigration::from_file(path)?),
                Source::Registered => self.registered_migration(&id)?,
            };

            names.insert(name.clone(), source.clone());
            catalog.entries.insert(
                version,
                MigrationEntry {
                    version,
                    name,
                    source,
                    unit,
                },
            );
        }

        tracing::debug!(count = catalog.len(), "Resolved migrations");
        Ok(catalog)
    }

    fn registered_migration(&self, id: &str) -> MigrationResult<Arc<dyn Migration>> {
        self.registry
            .migrations
            .iter()
            .find(|(registered, _)| registered == id)
            .map(|(_, factory)| factory())
            .ok_or_else(|| MigrationError::invalid_name(id, "not registered"))
    }

    /// Discover seeders and order them by name and dependencies
    pub fn seeds(&self, paths: &[PathBuf]) -> MigrationResult<Vec<SeedEntry>> {
        let mut entries: Vec<SeedEntry> = Vec::new();
        let mut push = |entry: SeedEntry| -> MigrationResult<()> {
            if let Some(existing) = entries.iter().find(|e| e.name == entry.name) {
                return Err(MigrationError::DuplicateName {
                    name: entry.name.clone(),
                    first: existing.source.to_string(),
                    second: entry.source.to_string(),
                });
            }
            entries.push(entry);
            Ok(())
        };

        for directory in expand_paths(paths)? {
            for file in sql_files(&directory)? {
                let file_name = file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let name = SEED_FILE_NAME
                    .captures(&file_name)
                    .map(|captures| captures[1].to_string())
                    .ok_or_else(|| {
                        MigrationError::invalid_name(
                            &file_name,
                            "seed files must be named <CamelCaseName>.sql",
                        )
                    })?;
                push(SeedEntry {
                    name,
                    unit: Arc::new(SqlSeeder::from_file(&file)?),
                    source: Source::File(file),
                })?;
            }
        }

        for (name, factory) in &self.registry.seeders {
            push(SeedEntry {
                name: name.clone(),
                source: Source::Registered,
                unit: factory(),
            })?;
        }

        order_seeds(entries)
    }
}
