use std::path::Path;
use std::sync::Arc;

use pin_migration::{
    Config, ConsoleOutput, Manager, MigrationResult, Output, Registry, RollbackTarget,
    StatusFormat, Version,
};

use super::{parse_date, Context, RunOptions};

pub async fn run(
    config_path: &Path,
    environment: Option<&str>,
    target: Option<String>,
    date: Option<String>,
    options: RunOptions,
) -> MigrationResult<()> {
    let mut context = Context::open(config_path, environment, options)?;
    let environment = context.environment.clone();

    match date {
        Some(date) => {
            let datetime = parse_date(&date)?;
            context
                .manager
                .migrate_to_datetime(&environment, datetime, options.fake)
                .await?;
        }
        None => {
            let target = target.map(|t| t.parse::<Version>()).transpose()?;
            context
                .manager
                .migrate(&environment, target, options.fake)
                .await?;
        }
    }

    context.finish().await
}

/// Resolve the rollback target and whether it must name an exact version
fn rollback_target(
    target: Option<String>,
    date: Option<String>,
) -> MigrationResult<(RollbackTarget, bool)> {
    if let Some(date) = date {
        let version = Version::from_date_argument(&date)?;
        return Ok((RollbackTarget::Version(version), false));
    }
    match target {
        Some(target) => Ok((target.parse()?, true)),
        None => Ok((RollbackTarget::Previous, true)),
    }
}

pub async fn rollback(
    config_path: &Path,
    environment: Option<&str>,
    target: Option<String>,
    date: Option<String>,
    force: bool,
    options: RunOptions,
) -> MigrationResult<()> {
    let (target, must_match) = rollback_target(target, date)?;
    let mut context = Context::open(config_path, environment, options)?;
    let environment = context.environment.clone();

    if target != RollbackTarget::Previous {
        context
            .output
            .writeln(&format!("Rolling back to {}", target));
    }
    context
        .manager
        .rollback(&environment, target, force, must_match, options.fake)
        .await?;

    context.finish().await
}

pub async fn reset(
    config_path: &Path,
    environment: Option<&str>,
    force: bool,
    options: RunOptions,
) -> MigrationResult<()> {
    let mut context = Context::open(config_path, environment, options)?;
    let environment = context.environment.clone();
    context
        .manager
        .reset(&environment, force, options.fake)
        .await?;
    context.finish().await
}

pub async fn refresh(
    config_path: &Path,
    environment: Option<&str>,
    force: bool,
    options: RunOptions,
) -> MigrationResult<()> {
    let mut context = Context::open(config_path, environment, options)?;
    let environment = context.environment.clone();
    context
        .manager
        .refresh(&environment, force, options.fake)
        .await?;
    context.finish().await
}

pub async fn status(
    config_path: &Path,
    environment: Option<&str>,
    format: StatusFormat,
) -> MigrationResult<()> {
    let mut context = match format {
        StatusFormat::Text => Context::open(config_path, environment, RunOptions::default())?,
        StatusFormat::Json => Context::open_quiet(config_path, environment)?,
    };
    let environment = context.environment.clone();
    context.manager.print_status(&environment, format).await?;
    context.close().await
}

/// Check paths and, when an environment is named, the connection
pub async fn test(config_path: &Path, environment: Option<&str>) -> MigrationResult<()> {
    let config = Arc::new(Config::load(config_path)?);
    let output: Arc<dyn Output> = Arc::new(ConsoleOutput);
    output.writeln(&format!("using config file {}", config_path.display()));
    if let Some(environment) = environment {
        output.writeln(&format!("validating environment {}", environment));
    }

    let mut manager = Manager::new(config, Registry::new()).with_output(output);
    manager.verify(environment).await?;
    manager.close().await
}
