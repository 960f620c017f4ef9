pub mod breakpoint;
pub mod init;
pub mod migrate;
pub mod seed;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use pin_migration::{
    Config, ConsoleOutput, Manager, MigrationError, MigrationResult, Output, Registry, Version,
};

/// Flags shared by the commands that change the database
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub fake: bool,
}

/// Loaded configuration plus a manager bound to one environment
pub struct Context {
    pub manager: Manager,
    pub environment: String,
    pub output: Arc<dyn Output>,
    started: Instant,
}

impl Context {
    /// Load the configuration, resolve the environment and print the preamble
    pub fn open(
        config_path: &Path,
        environment: Option<&str>,
        options: RunOptions,
    ) -> MigrationResult<Self> {
        Self::build(config_path, environment, options, true)
    }

    /// Same as [`Context::open`] without the preamble, for machine-readable output
    pub fn open_quiet(config_path: &Path, environment: Option<&str>) -> MigrationResult<Self> {
        Self::build(config_path, environment, RunOptions::default(), false)
    }

    fn build(
        config_path: &Path,
        environment: Option<&str>,
        options: RunOptions,
        preamble: bool,
    ) -> MigrationResult<Self> {
        let started = Instant::now();
        let config = Arc::new(Config::load(config_path)?);
        let environment = config.environment_name(environment)?;
        let output: Arc<dyn Output> = Arc::new(ConsoleOutput);

        if preamble {
            print_preamble(output.as_ref(), config_path, &config, &environment, options)?;
        }

        let manager = Manager::new(Arc::clone(&config), Registry::new())
            .with_output(Arc::clone(&output))
            .dry_run(options.dry_run);

        Ok(Self {
            manager,
            environment,
            output,
            started,
        })
    }

    /// Disconnect and print the elapsed time
    pub async fn finish(self) -> MigrationResult<()> {
        let elapsed = self.started.elapsed();
        self.manager.close().await?;
        self.output.writeln("");
        self.output
            .writeln(&format!("All Done. Took {:.4}s", elapsed.as_secs_f64()));
        Ok(())
    }

    pub async fn close(self) -> MigrationResult<()> {
        self.manager.close().await
    }
}

fn print_preamble(
    output: &dyn Output,
    config_path: &Path,
    config: &Config,
    environment: &str,
    options: RunOptions,
) -> MigrationResult<()> {
    output.writeln(&format!("using config file {}", config_path.display()));
    output.writeln("using migration paths ");
    for path in config.migration_paths() {
        output.writeln(&format!(" - {}", path.display()));
    }
    output.writeln("using seed paths ");
    for path in config.seed_paths() {
        output.writeln(&format!(" - {}", path.display()));
    }

    let resolved = config.environment(environment)?;
    output.writeln(&format!("using environment {}", resolved.name));
    output.writeln(&format!("using adapter {}", resolved.dialect));
    output.writeln(&format!("using database {}", resolved.database));
    if !resolved.naming.prefix.is_empty() {
        output.writeln(&format!("using table prefix {}", resolved.naming.prefix));
    }
    if !resolved.naming.suffix.is_empty() {
        output.writeln(&format!("using table suffix {}", resolved.naming.suffix));
    }
    if let Some(schema) = &resolved.schema {
        output.writeln(&format!("using schema {}", schema));
    }
    output.writeln(&format!(
        "ordering by {} time",
        config.version_order.as_str()
    ));

    if options.fake {
        output.writeln("warning performing fake migrations");
    }
    if options.dry_run {
        output.writeln("warning performing a dry run, SQL is printed and nothing is executed");
    }
    output.writeln("");
    Ok(())
}

/// Parse a `-d` date argument into the datetime it denotes
pub fn parse_date(date: &str) -> MigrationResult<NaiveDateTime> {
    Version::from_date_argument(date)?
        .to_datetime()
        .ok_or_else(|| MigrationError::invalid_argument(format!("Invalid date '{}'", date)))
}
