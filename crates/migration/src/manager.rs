//! Migration manager - the orchestrator behind every command
//!
//! The manager joins the resolved catalog with each environment's version
//! log and decides which units run, in which order and in which direction.
//! Steps are always executed one after another; a failed step aborts the
//! batch without undoing the steps that already completed.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::adapter::{self, Adapter};
use crate::config::Config;
use crate::error::{MigrationError, MigrationResult};
use crate::migration::Direction;
use crate::output::{ConsoleOutput, Output};
use crate::resolver::{expand_paths, Catalog, Registry, Resolver};
use crate::seed::SeedEntry;
use crate::session::Session;
use crate::status::{StatusFormat, StatusReport};
use crate::store::VersionLogEntry;
use crate::version::{Version, VersionOrder};

/// What a rollback should revert to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RollbackTarget {
    /// Undo the most recent migration
    #[default]
    Previous,
    /// Undo everything
    All,
    /// Keep this version and everything before it
    Version(Version),
    /// Keep the applied migration with this name and everything before it
    Name(String),
}

impl FromStr for RollbackTarget {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MigrationError::invalid_argument("Empty rollback target"));
        }
        if s.eq_ignore_ascii_case("all") || s == "0" {
            return Ok(RollbackTarget::All);
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s.parse().map(RollbackTarget::Version);
        }
        Ok(RollbackTarget::Name(s.to_string()))
    }
}

impl fmt::Display for RollbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackTarget::Previous => f.write_str("previous"),
            RollbackTarget::All => f.write_str("all"),
            RollbackTarget::Version(version) => write!(f, "{}", version),
            RollbackTarget::Name(name) => f.write_str(name),
        }
    }
}

/// Outcome of a rollback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    /// Versions reverted, most recent first
    pub reverted: Vec<Version>,
    /// Version whose breakpoint stopped the walk
    pub halted_at: Option<Version>,
    /// Versions left applied because of the breakpoint
    pub skipped: usize,
}

/// Which breakpoint operation to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointMode {
    Toggle,
    Set,
    Unset,
}

pub struct Manager {
    config: Arc<Config>,
    registry: Registry,
    output: Arc<dyn Output>,
    dry_run: bool,
    catalog: Option<Arc<Catalog>>,
    sessions: HashMap<String, Session>,
    attached: HashMap<String, Box<dyn Adapter>>,
}

impl Manager {
    pub fn new(config: Arc<Config>, registry: Registry) -> Self {
        Self {
            config,
            registry,
            output: Arc::new(ConsoleOutput),
            dry_run: false,
            catalog: None,
            sessions: HashMap::new(),
            attached: HashMap::new(),
        }
    }

    pub fn with_output(mut self, output: Arc<dyn Output>) -> Self {
        self.output = output;
        self
    }

    /// Print SQL instead of executing it
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Use an already connected adapter for an environment
    pub fn attach(mut self, environment: &str, adapter: Box<dyn Adapter>) -> Self {
        self.attached.insert(environment.to_string(), adapter);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// The resolved catalog, resolved once per manager
    pub fn catalog(&mut self) -> MigrationResult<Arc<Catalog>> {
        if let Some(catalog) = &self.catalog {
            return Ok(Arc::clone(catalog));
        }
        let catalog =
            Arc::new(Resolver::new(&self.registry).migrations(self.config.migration_paths())?);
        self.catalog = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    pub fn seeds(&self) -> MigrationResult<Vec<SeedEntry>> {
        Resolver::new(&self.registry).seeds(self.config.seed_paths())
    }

    async fn session(&mut self, environment: &str) -> MigrationResult<&mut Session> {
        if !self.sessions.contains_key(environment) {
            let resolved = self.config.environment(environment)?;
            let adapter = match self.attached.remove(environment) {
                Some(adapter) => adapter,
                None => adapter::connect(&resolved).await?,
            };
            let session = Session::open(
                resolved,
                adapter,
                &self.config,
                Arc::clone(&self.output),
                self.dry_run,
            )
            .await?;
            self.sessions.insert(environment.to_string(), session);
        }

        self.sessions.get_mut(environment).ok_or_else(|| {
            MigrationError::configuration(format!("Environment '{}' is not open", environment))
        })
    }

    /// Apply pending migrations up to and including `target` (default: latest)
    pub async fn migrate(
        &mut self,
        environment: &str,
        target: Option<Version>,
        fake: bool,
    ) -> MigrationResult<Vec<Version>> {
        let catalog = self.catalog()?;
        if let Some(target) = target {
            if !target.is_zero() && !catalog.contains(target) {
                return Err(MigrationError::unknown_target(
                    target,
                    "no migration with this version exists",
                ));
            }
        }

        let allow_out_of_order = self.config.allow_out_of_order;
        let output = Arc::clone(&self.output);
        let session = self.session(environment).await?;
        let log = session.versions().await?;

        let applied: HashSet<Version> = log.iter().map(|entry| entry.version).collect();
        let current = applied.iter().max().copied().unwrap_or(Version::ZERO);
        let target = target.or_else(|| catalog.latest()).unwrap_or(Version::ZERO);

        let mut pending = Vec::new();
        for entry in catalog.entries() {
            if entry.version > target {
                break;
            }
            if applied.contains(&entry.version) {
                continue;
            }
            if !allow_out_of_order && entry.version < current {
                warn!(
                    version = %entry.version,
                    current = %current,
                    "Skipping migration older than the current version"
                );
                output.writeln(&format!(
                    " ** {} {} skipped: older than current version {}",
                    entry.version, entry.name, current
                ));
                continue;
            }
            pending.push(entry);
        }

        if pending.is_empty() {
            output.writeln("No migrations to run");
            return Ok(Vec::new());
        }

        info!(environment, count = pending.len(), target = %target, "Migrating");
        let mut migrated = Vec::with_capacity(pending.len());
        for entry in pending {
            session.execute_migration(entry, Direction::Up, fake).await?;
            migrated.push(entry.version);
        }
        Ok(migrated)
    }

    /// Migrate to the latest version created at or before `datetime`
    pub async fn migrate_to_datetime(
        &mut self,
        environment: &str,
        datetime: NaiveDateTime,
        fake: bool,
    ) -> MigrationResult<Vec<Version>> {
        let limit = Version::from_datetime(datetime);
        let catalog = self.catalog()?;

        let target = catalog.versions().rev().find(|version| *version <= limit);
        match target {
            Some(target) => {
                self.output
                    .writeln(&format!("Migrating to version {}", target));
                self.migrate(environment, Some(target), fake).await
            }
            None => {
                self.output.writeln("No migrations to run");
                Ok(Vec::new())
            }
        }
    }

    /// Revert applied migrations, most recent first, down to `target`.
    ///
    /// With `target_must_match_version` the target must be a catalog version
    /// (or zero) and the walk stops there even when it was never applied;
    /// otherwise it stops at the first entry at or below the target, comparing
    /// start times instead of versions in execution order mode.
    pub async fn rollback(
        &mut self,
        environment: &str,
        target: RollbackTarget,
        force: bool,
        target_must_match_version: bool,
        fake: bool,
    ) -> MigrationResult<RollbackReport> {
        let catalog = self.catalog()?;
        let order = self.config.version_order;
        let output = Arc::clone(&self.output);
        let session = self.session(environment).await?;

        let mut executed: Vec<VersionLogEntry> = Vec::new();
        for entry in session.versions().await? {
            if catalog.contains(entry.version) {
                executed.push(entry);
            } else {
                warn!(version = %entry.version, "Applied migration is missing from the catalog");
                output.writeln(&format!(
                    " ** {} is missing from the catalog and will not be reverted",
                    entry.version
                ));
            }
        }

        let target = match target {
            RollbackTarget::All => Some(Version::ZERO),
            RollbackTarget::Version(version) => Some(version),
            RollbackTarget::Name(name) => Some(
                executed
                    .iter()
                    .find(|entry| entry.migration_name.as_deref() == Some(name.as_str()))
                    .map(|entry| entry.version)
                    .ok_or_else(|| {
                        MigrationError::unknown_target(&name, "no applied migration has this name")
                    })?,
            ),
            RollbackTarget::Previous => None,
        };

        let last = executed.last().map(|entry| entry.version);
        if last.is_none() || (target.is_some() && target == last) {
            output.writeln("No migrations to rollback");
            return Ok(RollbackReport::default());
        }

        let target = target.unwrap_or_else(|| {
            executed
                .len()
                .checked_sub(2)
                .map(|index| executed[index].version)
                .unwrap_or(Version::ZERO)
        });

        if target_must_match_version && !target.is_zero() && !catalog.contains(target) {
            return Err(MigrationError::unknown_target(
                target,
                "target version not found",
            ));
        }

        // an exact target that is applied in execution order is found by log
        // position; otherwise nothing at or below the target version is reverted
        let target_applied = executed.iter().any(|entry| entry.version == target);
        let reached = |entry: &VersionLogEntry| {
            if target_must_match_version {
                return match order {
                    VersionOrder::Execution if target_applied => entry.version == target,
                    _ => entry.version <= target,
                };
            }
            let position = match order {
                VersionOrder::Creation => entry.version,
                VersionOrder::Execution => entry.start_time_as_version(),
            };
            position <= target
        };

        let mut report = RollbackReport::default();
        let to_revert: Vec<&VersionLogEntry> =
            executed.iter().rev().take_while(|entry| !reached(*entry)).collect();

        for (index, applied) in to_revert.iter().enumerate() {
            if applied.breakpoint && !force {
                output.writeln("Breakpoint reached. Further rollbacks inhibited.");
                report.halted_at = Some(applied.version);
                report.skipped = to_revert.len() - index;
                break;
            }

            let Some(entry) = catalog.get(applied.version) else {
                continue;
            };
            session.execute_migration(entry, Direction::Down, fake).await?;
            report.reverted.push(applied.version);
        }

        if report.reverted.is_empty() && report.halted_at.is_none() {
            output.writeln("No migrations to rollback");
        }
        Ok(report)
    }

    /// Revert every applied migration
    pub async fn reset(
        &mut self,
        environment: &str,
        force: bool,
        fake: bool,
    ) -> MigrationResult<RollbackReport> {
        self.rollback(environment, RollbackTarget::All, force, true, fake)
            .await
    }

    /// Revert everything, then apply everything again
    pub async fn refresh(
        &mut self,
        environment: &str,
        force: bool,
        fake: bool,
    ) -> MigrationResult<(RollbackReport, Vec<Version>)> {
        let report = self.reset(environment, force, fake).await?;
        let migrated = self.migrate(environment, None, fake).await?;
        Ok((report, migrated))
    }

    /// Change the breakpoint flag of `version` (default: the last applied one)
    /// and return the resulting state
    pub async fn breakpoint(
        &mut self,
        environment: &str,
        version: Option<Version>,
        mode: BreakpointMode,
    ) -> MigrationResult<bool> {
        let catalog = self.catalog()?;
        let output = Arc::clone(&self.output);
        let session = self.session(environment).await?;
        let log = session.versions().await?;

        let applied = match version {
            Some(version) => log.iter().find(|entry| entry.version == version),
            None => log.last(),
        }
        .ok_or_else(|| match version {
            Some(version) => MigrationError::unknown_target(version, "not a valid version"),
            None => MigrationError::unknown_target("latest", "no migrations have been applied"),
        })?;

        let entry = catalog.get(applied.version).ok_or_else(|| {
            MigrationError::unknown_target(applied.version, "not a valid version")
        })?;

        let state = match mode {
            BreakpointMode::Toggle => {
                session.toggle_breakpoint(entry.version).await?;
                !applied.breakpoint
            }
            BreakpointMode::Set => {
                session.set_breakpoint(entry.version, true).await?;
                true
            }
            BreakpointMode::Unset => {
                session.set_breakpoint(entry.version, false).await?;
                false
            }
        };

        output.writeln(&format!(
            " Breakpoint {} for {} {}",
            if state { "set" } else { "cleared" },
            entry.version,
            entry.name
        ));
        Ok(state)
    }

    pub async fn toggle_breakpoint(
        &mut self,
        environment: &str,
        version: Option<Version>,
    ) -> MigrationResult<bool> {
        self.breakpoint(environment, version, BreakpointMode::Toggle)
            .await
    }

    pub async fn set_breakpoint(
        &mut self,
        environment: &str,
        version: Option<Version>,
    ) -> MigrationResult<bool> {
        self.breakpoint(environment, version, BreakpointMode::Set).await
    }

    pub async fn unset_breakpoint(
        &mut self,
        environment: &str,
        version: Option<Version>,
    ) -> MigrationResult<bool> {
        self.breakpoint(environment, version, BreakpointMode::Unset)
            .await
    }

    /// Clear every breakpoint, returning how many were set
    pub async fn remove_breakpoints(&mut self, environment: &str) -> MigrationResult<usize> {
        let output = Arc::clone(&self.output);
        let session = self.session(environment).await?;
        let count = session
            .versions()
            .await?
            .iter()
            .filter(|entry| entry.breakpoint)
            .count();

        session.reset_breakpoints().await?;
        output.writeln(&format!(" {} breakpoints cleared.", count));
        Ok(count)
    }

    pub async fn status(&mut self, environment: &str) -> MigrationResult<StatusReport> {
        let catalog = self.catalog()?;
        let session = self.session(environment).await?;
        let log = session.versions().await?;
        Ok(StatusReport::build(&catalog, &log))
    }

    /// Print the status report and return it
    pub async fn print_status(
        &mut self,
        environment: &str,
        format: StatusFormat,
    ) -> MigrationResult<StatusReport> {
        let report = self.status(environment).await?;
        for line in report.render(format)? {
            self.output.writeln(&line);
        }
        if report.has_missing() {
            warn!(
                environment,
                missing = report.missing_count,
                "Applied migrations are missing from the catalog"
            );
        }
        Ok(report)
    }

    /// Run one seeder by name, or every seeder in dependency order
    pub async fn seed(
        &mut self,
        environment: &str,
        name: Option<&str>,
    ) -> MigrationResult<Vec<String>> {
        let seeds = self.seeds()?;
        let selected: Vec<SeedEntry> = match name {
            Some(name) => {
                let entry = seeds
                    .into_iter()
                    .find(|entry| entry.name == name)
                    .ok_or_else(|| MigrationError::UnknownSeed {
                        name: name.to_string(),
                    })?;
                vec![entry]
            }
            None => seeds,
        };

        let session = self.session(environment).await?;
        let mut executed = Vec::with_capacity(selected.len());
        for entry in &selected {
            session.execute_seed(entry).await?;
            executed.push(entry.name.clone());
        }
        Ok(executed)
    }

    pub async fn seed_all(&mut self, environment: &str) -> MigrationResult<Vec<String>> {
        self.seed(environment, None).await
    }

    /// Check that the configured paths exist and, when given, that the
    /// environment resolves and accepts a connection
    pub async fn verify(&mut self, environment: Option<&str>) -> MigrationResult<()> {
        for (kind, paths) in [
            ("Migration", self.config.migration_paths()),
            ("Seed", self.config.seed_paths()),
        ] {
            let directories = expand_paths(paths)?;
            if directories.is_empty() {
                return Err(MigrationError::configuration(format!(
                    "{} paths do not match any directory",
                    kind
                )));
            }
            for directory in directories {
                if !directory.is_dir() {
                    return Err(MigrationError::configuration(format!(
                        "{} directory '{}' does not exist",
                        kind,
                        directory.display()
                    )));
                }
            }
        }

        self.catalog()?;
        self.seeds()?;

        if let Some(environment) = environment {
            self.session(environment).await?;
        }
        self.output.writeln("success!");
        Ok(())
    }

    /// Disconnect every open session
    pub async fn close(self) -> MigrationResult<()> {
        for (_, session) in self.sessions {
            session.close().await?;
        }
        for (_, adapter) in self.attached {
            adapter.disconnect().await?;
        }
        Ok(())
    }
}
