//! Configuration - the YAML file describing paths and environments
//!
//! The file is read once, `${VAR}` references are substituted from the
//! process environment, and the result is an immutable [`Config`] that the
//! manager shares behind an `Arc`.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::dialect::{Dialect, TableNaming};
use crate::error::{MigrationError, MigrationResult};
use crate::version::VersionOrder;

pub const DEFAULT_CONFIG_FILE: &str = "migration.yaml";

static ENV_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("env reference regex")
});

/// One path or a list of paths
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct PathList(pub Vec<PathBuf>);

impl From<OneOrMany> for PathList {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(path) => PathList(vec![path]),
            OneOrMany::Many(paths) => PathList(paths),
        }
    }
}

impl PathList {
    pub fn as_slice(&self) -> &[PathBuf] {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_migration_paths")]
    pub migrations: PathList,
    #[serde(default = "default_seed_paths")]
    pub seeds: PathList,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            migrations: default_migration_paths(),
            seeds: default_seed_paths(),
        }
    }
}

fn default_migration_paths() -> PathList {
    PathList(vec![PathBuf::from("database/migrations")])
}

fn default_seed_paths() -> PathList {
    PathList(vec![PathBuf::from("database/seeds")])
}

fn default_migration_table() -> String {
    "migrations".to_string()
}

fn default_true() -> bool {
    true
}

/// Connection profile as written in the file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub adapter: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table_prefix: Option<String>,
    #[serde(default)]
    pub table_suffix: Option<String>,
    #[serde(default)]
    pub migration_table: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentsConfig {
    #[serde(default = "default_migration_table")]
    pub default_migration_table: String,
    #[serde(default, alias = "default_database")]
    pub default_environment: Option<String>,
    #[serde(flatten)]
    pub profiles: BTreeMap<String, EnvironmentConfig>,
}

/// Immutable configuration for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    pub environments: EnvironmentsConfig,
    #[serde(default)]
    pub version_order: VersionOrder,
    #[serde(default = "default_true")]
    pub allow_out_of_order: bool,
    #[serde(default)]
    pub bootstrap: Option<PathBuf>,
}

/// A validated connection profile
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub name: String,
    pub dialect: Dialect,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Database name, or the file path for SQLite
    pub database: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub charset: Option<String>,
    /// PostgreSQL schema put first on the search path
    pub schema: Option<String>,
    pub naming: TableNaming,
    pub migration_table: String,
}

impl Config {
    /// Load the configuration file, resolving relative paths against its directory
    pub fn load(path: &Path) -> MigrationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::configuration(format!(
                "Could not read configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::from_yaml_str(&content, base_dir)
    }

    pub fn from_yaml_str(content: &str, base_dir: &Path) -> MigrationResult<Self> {
        let content = interpolate(content)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.resolve_paths(base_dir);
        Ok(config)
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |path: &PathBuf| {
            if path.is_absolute() {
                path.clone()
            } else {
                base_dir.join(path)
            }
        };

        self.paths.migrations.0 = self.paths.migrations.0.iter().map(resolve).collect();
        self.paths.seeds.0 = self.paths.seeds.0.iter().map(resolve).collect();
        self.bootstrap = self.bootstrap.as_ref().map(resolve);

        for profile in self.environments.profiles.values_mut() {
            let is_sqlite = profile
                .adapter
                .as_deref()
                .and_then(Dialect::from_adapter_name)
                == Some(Dialect::Sqlite);
            if !is_sqlite {
                continue;
            }
            if let Some(name) = &profile.name {
                if name != ":memory:" && Path::new(name).is_relative() {
                    profile.name = Some(base_dir.join(name).to_string_lossy().into_owned());
                }
            }
        }
    }

    pub fn migration_paths(&self) -> &[PathBuf] {
        self.paths.migrations.as_slice()
    }

    pub fn seed_paths(&self) -> &[PathBuf] {
        self.paths.seeds.as_slice()
    }

    pub fn default_environment(&self) -> Option<&str> {
        self.environments.default_environment.as_deref()
    }

    pub fn environment_names(&self) -> impl Iterator<Item = &str> {
        self.environments.profiles.keys().map(String::as_str)
    }

    pub fn has_environment(&self, name: &str) -> bool {
        self.environments.profiles.contains_key(name)
    }

    /// Pick the requested environment or fall back to the configured default
    pub fn environment_name(&self, requested: Option<&str>) -> MigrationResult<String> {
        requested
            .or_else(|| self.default_environment())
            .map(str::to_string)
            .ok_or_else(|| {
                MigrationError::configuration(
                    "No environment specified and no default_environment configured",
                )
            })
    }

    /// Validate and resolve a named connection profile
    pub fn environment(&self, name: &str) -> MigrationResult<Environment> {
        let profile = self.environments.profiles.get(name).ok_or_else(|| {
            MigrationError::configuration(format!(
                "The environment configuration for '{}' is missing",
                name
            ))
        })?;

        let adapter = profile.adapter.as_deref().ok_or_else(|| {
            MigrationError::configuration(format!(
                "Environment '{}' does not define an adapter",
                name
            ))
        })?;
        let dialect = Dialect::from_adapter_name(adapter).ok_or_else(|| {
            MigrationError::configuration(format!(
                "Invalid adapter '{}' for environment '{}'",
                adapter, name
            ))
        })?;

        let database = profile
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                MigrationError::configuration(format!(
                    "Environment '{}' does not define a database name",
                    name
                ))
            })?;

        let migration_table = profile
            .migration_table
            .clone()
            .unwrap_or_else(|| self.environments.default_migration_table.clone());
        if migration_table.trim().is_empty() {
            return Err(MigrationError::configuration(format!(
                "Environment '{}' has an empty migration table name",
                name
            )));
        }

        Ok(Environment {
            name: name.to_string(),
            dialect,
            host: profile.host.clone(),
            port: profile.port,
            database,
            user: profile.user.clone(),
            pass: profile.pass.clone(),
            charset: profile.charset.clone(),
            schema: profile.schema.clone().filter(|s| !s.trim().is_empty()),
            naming: TableNaming::new(
                profile.table_prefix.clone().unwrap_or_default(),
                profile.table_suffix.clone().unwrap_or_default(),
            ),
            migration_table,
        })
    }

    /// Configuration written by `migrate init`
    pub fn default_yaml() -> &'static str {
        DEFAULT_CONFIG_TEMPLATE
    }
}

/// Substitute `${VAR}` and `${VAR:-default}` references
pub fn interpolate(content: &str) -> MigrationResult<String> {
    let mut missing = None;
    let result = ENV_REFERENCE.replace_all(content, |captures: &Captures| {
        match (env::var(&captures[1]), captures.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                missing.get_or_insert_with(|| captures[1].to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(variable) => Err(MigrationError::configuration(format!(
            "Environment variable '{}' is not set and has no default",
            variable
        ))),
        None => Ok(result.into_owned()),
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"paths:
  migrations: database/migrations
  seeds: database/seeds

environments:
  default_migration_table: migrations
  default_environment: development

  development:
    adapter: sqlite
    name: database/development.sqlite3

  testing:
    adapter: sqlite
    name: ":memory:"

  production:
    adapter: pgsql
    host: ${DB_HOST:-localhost}
    port: 5432
    name: ${DB_NAME:-app}
    user: ${DB_USER:-app}
    pass: ${DB_PASSWORD:-}
    charset: utf8

version_order: creation
allow_out_of_order: true
"#;
