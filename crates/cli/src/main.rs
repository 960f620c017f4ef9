mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pin_migration::{MigrationError, StatusFormat, DEFAULT_CONFIG_FILE};

use commands::*;

#[derive(Parser)]
#[command(name = "pinmig")]
#[command(about = "Apply, revert and inspect versioned database migrations")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migration commands
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },

    /// Seed commands
    Seed {
        #[command(subcommand)]
        seed_command: SeedCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Apply pending migrations
    Run {
        /// Target environment
        #[arg(long, short)]
        environment: Option<String>,

        /// Migrate up to and including this version
        #[arg(long, short, conflicts_with = "date")]
        target: Option<String>,

        /// Migrate up to the latest version created before this date (YYYY[MM[DD[HH[II[SS]]]]])
        #[arg(long, short)]
        date: Option<String>,

        /// Print the SQL instead of executing it
        #[arg(long = "dry-run", short = 'x')]
        dry_run: bool,

        /// Only record the migrations as applied
        #[arg(long)]
        fake: bool,
    },

    /// Revert applied migrations
    Rollback {
        #[arg(long, short)]
        environment: Option<String>,

        /// Version or migration name to roll back to, or `all`
        #[arg(long, short, conflicts_with = "date")]
        target: Option<String>,

        /// Roll back everything applied after this date
        #[arg(long, short)]
        date: Option<String>,

        /// Ignore breakpoints
        #[arg(long, short)]
        force: bool,

        #[arg(long = "dry-run", short = 'x')]
        dry_run: bool,

        #[arg(long)]
        fake: bool,
    },

    /// Revert every applied migration
    Reset {
        #[arg(long, short)]
        environment: Option<String>,

        #[arg(long, short)]
        force: bool,

        #[arg(long = "dry-run", short = 'x')]
        dry_run: bool,

        #[arg(long)]
        fake: bool,
    },

    /// Revert every applied migration, then apply everything again
    Refresh {
        #[arg(long, short)]
        environment: Option<String>,

        #[arg(long, short)]
        force: bool,

        #[arg(long = "dry-run", short = 'x')]
        dry_run: bool,

        #[arg(long)]
        fake: bool,
    },

    /// Show which migrations are applied, pending or missing
    Status {
        #[arg(long, short)]
        environment: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: StatusFormat,
    },

    /// Manage rollback breakpoints
    Breakpoint {
        #[arg(long, short)]
        environment: Option<String>,

        /// Version to change (default: the last applied one)
        #[arg(long, short)]
        target: Option<String>,

        /// Set the breakpoint
        #[arg(long, short, conflicts_with_all = ["unset", "remove_all"])]
        set: bool,

        /// Clear the breakpoint
        #[arg(long, short, conflicts_with = "remove_all")]
        unset: bool,

        /// Clear every breakpoint
        #[arg(long = "remove-all", short = 'r')]
        remove_all: bool,
    },

    /// Check the configuration and, with an environment, the connection
    Test {
        #[arg(long, short)]
        environment: Option<String>,
    },

    /// Write a default configuration file
    Init,
}

#[derive(Subcommand)]
enum SeedCommands {
    /// Run seeders
    Run {
        #[arg(long, short)]
        environment: Option<String>,

        /// Seeder to run; repeat for several (default: all)
        #[arg(long = "seed", short = 's')]
        seeds: Vec<String>,
    },
}

async fn run(cli: Cli) -> Result<(), MigrationError> {
    let config_path = cli.config;

    match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Run {
                environment,
                target,
                date,
                dry_run,
                fake,
            } => {
                let options = RunOptions { dry_run, fake };
                migrate::run(&config_path, environment.as_deref(), target, date, options).await
            }
            MigrateCommands::Rollback {
                environment,
                target,
                date,
                force,
                dry_run,
                fake,
            } => {
                let options = RunOptions { dry_run, fake };
                migrate::rollback(
                    &config_path,
                    environment.as_deref(),
                    target,
                    date,
                    force,
                    options,
                )
                .await
            }
            MigrateCommands::Reset {
                environment,
                force,
                dry_run,
                fake,
            } => {
                let options = RunOptions { dry_run, fake };
                migrate::reset(&config_path, environment.as_deref(), force, options).await
            }
            MigrateCommands::Refresh {
                environment,
                force,
                dry_run,
                fake,
            } => {
                let options = RunOptions { dry_run, fake };
                migrate::refresh(&config_path, environment.as_deref(), force, options).await
            }
            MigrateCommands::Status {
                environment,
                format,
            } => migrate::status(&config_path, environment.as_deref(), format).await,
            MigrateCommands::Breakpoint {
                environment,
                target,
                set,
                unset,
                remove_all,
            } => {
                let action = breakpoint::Action::from_flags(set, unset, remove_all);
                breakpoint::run(&config_path, environment.as_deref(), target, action).await
            }
            MigrateCommands::Test { environment } => {
                migrate::test(&config_path, environment.as_deref()).await
            }
            MigrateCommands::Init => init::run(&config_path),
        },
        Commands::Seed { seed_command } => match seed_command {
            SeedCommands::Run { environment, seeds } => {
                seed::run(&config_path, environment.as_deref(), &seeds).await
            }
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose, cli.log_json) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("\n[{}]", error_kind(&e));
            eprintln!("  {}", e);
            ExitCode::FAILURE
        }
    }
}

fn error_kind(error: &MigrationError) -> &'static str {
    match error {
        MigrationError::Configuration { .. } => "ConfigurationError",
        MigrationError::InvalidName { .. } => "InvalidNameError",
        MigrationError::DuplicateVersion { .. } => "DuplicateVersionError",
        MigrationError::DuplicateName { .. } => "DuplicateNameError",
        MigrationError::UnknownTarget { .. } => "UnknownTargetError",
        MigrationError::UnknownSeed { .. } | MigrationError::SeedDependency { .. } => "SeedError",
        MigrationError::Irreversible { .. } => "IrreversibleMigrationError",
        MigrationError::Execution { .. } | MigrationError::SeedExecution { .. } => {
            "MigrationExecutionError"
        }
        MigrationError::InvalidArgument { .. } => "InvalidArgumentError",
        MigrationError::Database(_) => "DatabaseError",
        MigrationError::Io(_) | MigrationError::Yaml(_) | MigrationError::Json(_) => "Error",
    }
}
