//! Session - one open environment: connection, tracking table and output
//!
//! Every write the engine issues goes through [`Session::write`], which either
//! executes it or, under a dry run, prints it.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::adapter::Adapter;
use crate::config::{Config, Environment};
use crate::dialect::Dialect;
use crate::error::{MigrationError, MigrationResult};
use crate::migration::{self, Direction, MigrationState};
use crate::output::Output;
use crate::resolver::MigrationEntry;
use crate::schema::Schema;
use crate::seed::SeedEntry;
use crate::store::{VersionLogEntry, VersionStore};
use crate::version::Version;

pub struct Session {
    environment: Environment,
    adapter: Box<dyn Adapter>,
    store: VersionStore,
    output: Arc<dyn Output>,
    dry_run: bool,
    table_exists: bool,
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl Session {
    /// Run the bootstrap script and make sure the tracking table exists
    pub async fn open(
        environment: Environment,
        adapter: Box<dyn Adapter>,
        config: &Config,
        output: Arc<dyn Output>,
        dry_run: bool,
    ) -> MigrationResult<Self> {
        let store = VersionStore::new(environment.migration_table.clone(), config.version_order);
        let mut session = Self {
            environment,
            adapter,
            store,
            output,
            dry_run,
            table_exists: false,
        };

        if let Some(bootstrap) = &config.bootstrap {
            session.run_bootstrap(bootstrap).await?;
        }
        session.ensure_version_table().await?;
        Ok(session)
    }

    async fn run_bootstrap(&mut self, path: &std::path::Path) -> MigrationResult<()> {
        if !path.is_file() {
            return Err(MigrationError::configuration(format!(
                "Bootstrap script '{}' does not exist",
                path.display()
            )));
        }
        debug!(path = %path.display(), "Running bootstrap script");
        let sql = std::fs::read_to_string(path)?;
        for statement in self.dialect().split_statements(&sql) {
            self.write(&statement).await?;
        }
        Ok(())
    }

    async fn ensure_version_table(&mut self) -> MigrationResult<()> {
        self.table_exists = self.adapter.has_table(self.store.table()).await?;
        if self.table_exists {
            return Ok(());
        }

        info!(
            environment = %self.environment.name,
            table = %self.store.table(),
            "Creating migration tracking table"
        );
        let sql = self.store.create_table_sql(self.dialect());
        self.write(&sql).await?;
        self.table_exists = !self.dry_run;
        Ok(())
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn dialect(&self) -> Dialect {
        self.adapter.dialect()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn output(&self) -> &Arc<dyn Output> {
        &self.output
    }

    /// Execute a statement, or print it under a dry run
    pub async fn write(&mut self, sql: &str) -> MigrationResult<()> {
        if self.dry_run {
            let sql = sql.trim_end();
            if sql.ends_with(';') {
                self.output.writeln(sql);
            } else {
                self.output.writeln(&format!("{};", sql));
            }
            return Ok(());
        }
        debug!(sql = %sql, "Executing");
        self.adapter.execute(sql).await?;
        Ok(())
    }

    /// The version log, ordered per the configured version order
    pub async fn versions(&mut self) -> MigrationResult<Vec<VersionLogEntry>> {
        if !self.table_exists {
            return Ok(Vec::new());
        }
        self.store.load(self.adapter.as_mut()).await
    }

    fn compile(&self, schema: &Schema) -> Vec<String> {
        let dialect = self.dialect();
        schema
            .commands()
            .iter()
            .flat_map(|command| dialect.compile(command, &self.environment.naming))
            .collect()
    }

    /// Run one migration in one direction, including its bookkeeping write
    pub async fn execute_migration(
        &mut self,
        entry: &MigrationEntry,
        direction: Direction,
        fake: bool,
    ) -> MigrationResult<()> {
        let wrap = |source: MigrationError| MigrationError::Execution {
            version: entry.version,
            name: entry.name.clone(),
            direction,
            source: Box::new(source),
        };

        // a fake step never consults the unit; an irreversible down fails here,
        // before any transaction is opened
        let statements = if fake {
            Vec::new()
        } else {
            let schema = migration::plan(entry.unit.as_ref(), direction).map_err(|e| match e {
                MigrationError::Irreversible { .. } => e.at_version(entry.version),
                other => wrap(other),
            })?;
            self.compile(&schema)
        };

        self.output.writeln(&format!(
            " == {} {}: {}",
            entry.version,
            entry.name,
            direction.verb()
        ));
        info!(
            environment = %self.environment.name,
            version = %entry.version,
            state = %MigrationState::running(direction),
            fake,
            "Executing migration"
        );

        let started = Instant::now();
        let start_time = now();
        let in_transaction = self.begin_step().await.map_err(wrap)?;
        let result = self
            .run_migration_step(entry, direction, &statements, start_time)
            .await;
        let result = self.finish_step(in_transaction, result).await;

        if let Err(e) = result {
            warn!(
                version = %entry.version,
                state = %MigrationState::Failed,
                error = %e,
                "Migration failed"
            );
            return Err(wrap(e));
        }

        info!(
            version = %entry.version,
            state = %MigrationState::finished(direction),
            "Migration finished"
        );
        self.output.writeln(&format!(
            " == {} {}: {} {:.4}s",
            entry.version,
            entry.name,
            direction.past_tense(),
            started.elapsed().as_secs_f64()
        ));
        Ok(())
    }

    /// Run one seeder; seeds leave no trace in the tracking table
    pub async fn execute_seed(&mut self, entry: &SeedEntry) -> MigrationResult<()> {
        let wrap = |source: MigrationError| MigrationError::SeedExecution {
            name: entry.name.clone(),
            source: Box::new(source),
        };

        let mut schema = Schema::new();
        entry.unit.run(&mut schema).map_err(wrap)?;
        let statements = self.compile(&schema);

        self.output.writeln(&format!(" == {}: seeding", entry.name));
        info!(environment = %self.environment.name, seed = %entry.name, "Executing seed");

        let started = Instant::now();
        let in_transaction = self.begin_step().await.map_err(wrap)?;
        let result = self.run_statements(&statements).await;
        self.finish_step(in_transaction, result).await.map_err(wrap)?;

        self.output.writeln(&format!(
            " == {}: seeded {:.4}s",
            entry.name,
            started.elapsed().as_secs_f64()
        ));
        Ok(())
    }

    async fn run_statements(&mut self, statements: &[String]) -> MigrationResult<()> {
        for statement in statements {
            self.write(statement).await?;
        }
        Ok(())
    }

    async fn run_migration_step(
        &mut self,
        entry: &MigrationEntry,
        direction: Direction,
        statements: &[String],
        start_time: NaiveDateTime,
    ) -> MigrationResult<()> {
        self.run_statements(statements).await?;
        let bookkeeping = match direction {
            Direction::Up => self.store.insert_sql(
                self.dialect(),
                entry.version,
                &entry.name,
                start_time,
                now(),
            ),
            Direction::Down => self.store.delete_sql(self.dialect(), entry.version),
        };
        self.write(&bookkeeping).await
    }

    /// Open a transaction for one step when the adapter supports transactional DDL
    async fn begin_step(&mut self) -> MigrationResult<bool> {
        if self.dry_run {
            return Ok(false);
        }
        if !self.adapter.has_transactions() {
            warn!(
                environment = %self.environment.name,
                "Adapter does not support transactional DDL, a failure may leave the step partially applied"
            );
            return Ok(false);
        }
        self.adapter.begin_transaction().await?;
        Ok(true)
    }

    /// Commit a successful step, roll back a failed one
    async fn finish_step(
        &mut self,
        in_transaction: bool,
        result: MigrationResult<()>,
    ) -> MigrationResult<()> {
        if !in_transaction {
            return result;
        }
        match result {
            Ok(()) => self.adapter.commit_transaction().await,
            Err(e) => {
                if let Err(rollback) = self.adapter.rollback_transaction().await {
                    warn!(error = %rollback, "Failed to roll back transaction");
                }
                Err(e)
            }
        }
    }

    pub async fn toggle_breakpoint(&mut self, version: Version) -> MigrationResult<()> {
        let sql = self.store.toggle_breakpoint_sql(self.dialect(), version);
        self.write(&sql).await
    }

    pub async fn set_breakpoint(&mut self, version: Version, state: bool) -> MigrationResult<()> {
        let sql = self.store.set_breakpoint_sql(self.dialect(), version, state);
        self.write(&sql).await
    }

    pub async fn reset_breakpoints(&mut self) -> MigrationResult<()> {
        let sql = self.store.reset_breakpoints_sql(self.dialect());
        self.write(&sql).await
    }

    pub async fn close(self) -> MigrationResult<()> {
        self.adapter.disconnect().await
    }
}
