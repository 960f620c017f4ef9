use std::fs;
use std::path::Path;

use pin_migration::{Config, MigrationError, MigrationResult};

/// Write the default configuration file; never overwrites
pub fn run(config_path: &Path) -> MigrationResult<()> {
    if config_path.exists() {
        return Err(MigrationError::configuration(format!(
            "Config file '{}' already exists",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(config_path, Config::default_yaml())?;

    println!("created {}", config_path.display());
    Ok(())
}
