use std::path::Path;

use pin_migration::{MigrationError, MigrationResult, Version};

use super::{Context, RunOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Toggle,
    Set,
    Unset,
    RemoveAll,
}

impl Action {
    pub fn from_flags(set: bool, unset: bool, remove_all: bool) -> Self {
        match (set, unset, remove_all) {
            (_, _, true) => Action::RemoveAll,
            (true, _, _) => Action::Set,
            (_, true, _) => Action::Unset,
            _ => Action::Toggle,
        }
    }
}

fn validate(target: Option<&str>, action: Action) -> MigrationResult<Option<Version>> {
    if action == Action::RemoveAll && target.is_some() {
        return Err(MigrationError::invalid_argument(
            "Cannot toggle a breakpoint and remove all breakpoints at the same time",
        ));
    }
    target.map(str::parse).transpose()
}

pub async fn run(
    config_path: &Path,
    environment: Option<&str>,
    target: Option<String>,
    action: Action,
) -> MigrationResult<()> {
    let version = validate(target.as_deref(), action)?;
    let mut context = Context::open(config_path, environment, RunOptions::default())?;
    let environment = context.environment.clone();

    match action {
        Action::RemoveAll => {
            context.manager.remove_breakpoints(&environment).await?;
        }
        Action::Set => {
            context.manager.set_breakpoint(&environment, version).await?;
        }
        Action::Unset => {
            context.manager.unset_breakpoint(&environment, version).await?;
        }
        Action::Toggle => {
            context.manager.toggle_breakpoint(&environment, version).await?;
        }
    }

    context.finish().await
}
