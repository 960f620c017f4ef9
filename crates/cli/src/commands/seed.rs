use std::path::Path;

use pin_migration::MigrationResult;

use super::{Context, RunOptions};

/// Run the named seeders in the given order, or all of them
pub async fn run(
    config_path: &Path,
    environment: Option<&str>,
    seeds: &[String],
) -> MigrationResult<()> {
    let mut context = Context::open(config_path, environment, RunOptions::default())?;
    let environment = context.environment.clone();

    if seeds.is_empty() {
        context.manager.seed_all(&environment).await?;
    } else {
        for name in seeds {
            context.manager.seed(&environment, Some(name)).await?;
        }
    }

    context.finish().await
}
