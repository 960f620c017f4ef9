//! Shared fixtures: a throwaway project directory with a SQLite database

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use pin_migration::{
    Adapter, BufferedOutput, Config, Manager, Registry, SqliteAdapter, Version,
};
use tempfile::TempDir;

pub const ENV: &str = "test";

pub struct Project {
    pub dir: TempDir,
    pub output: BufferedOutput,
    settings: String,
    profile: String,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("migrations")).unwrap();
        fs::create_dir_all(dir.path().join("seeds")).unwrap();
        Self {
            dir,
            output: BufferedOutput::new(),
            settings: String::new(),
            profile: String::new(),
        }
    }

    /// Extra top-level configuration lines
    pub fn with_settings(mut self, settings: &str) -> Self {
        self.settings = settings.to_string();
        self
    }

    /// Extra lines inside the test environment profile
    pub fn with_profile(mut self, profile: &str) -> Self {
        self.profile = profile
            .lines()
            .map(|line| format!("    {}\n", line))
            .collect();
        self
    }

    pub fn migration(&self, file: &str, content: &str) -> &Self {
        fs::write(self.dir.path().join("migrations").join(file), content).unwrap();
        self
    }

    pub fn remove_migration(&self, file: &str) {
        fs::remove_file(self.dir.path().join("migrations").join(file)).unwrap();
    }

    pub fn seed(&self, file: &str, content: &str) -> &Self {
        fs::write(self.dir.path().join("seeds").join(file), content).unwrap();
        self
    }

    pub fn file(&self, file: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(file);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn database(&self) -> PathBuf {
        self.dir.path().join("test.sqlite3")
    }

    pub fn config(&self) -> Arc<Config> {
        let yaml = format!(
            "paths:\n  \
               migrations: migrations\n  \
               seeds: seeds\n\
             environments:\n  \
               default_environment: test\n  \
               test:\n    \
                 adapter: sqlite\n    \
                 name: test.sqlite3\n\
             {}\
             {}\n",
            self.profile, self.settings
        );
        Arc::new(Config::from_yaml_str(&yaml, self.dir.path()).unwrap())
    }

    pub fn manager(&self) -> Manager {
        self.manager_with(Registry::new())
    }

    pub fn manager_with(&self, registry: Registry) -> Manager {
        Manager::new(self.config(), registry).with_output(Arc::new(self.output.clone()))
    }

    /// A second connection for looking at the database behind the manager's back
    pub async fn inspect(&self) -> SqliteAdapter {
        SqliteAdapter::open(&self.database().to_string_lossy())
            .await
            .unwrap()
    }
}

pub fn v(version: i64) -> Version {
    Version::new(version)
}

pub async fn has_table(adapter: &mut SqliteAdapter, table: &str) -> bool {
    adapter.has_table(table).await.unwrap()
}

pub async fn has_column(adapter: &mut SqliteAdapter, table: &str, column: &str) -> bool {
    let rows = adapter
        .query(&format!(
            "SELECT CAST(COUNT(*) AS VARCHAR(20)) FROM pragma_table_info('{}') WHERE name = '{}'",
            table, column
        ))
        .await
        .unwrap();
    rows[0][0].as_deref() == Some("1")
}

pub async fn count_rows(adapter: &mut SqliteAdapter, table: &str) -> i64 {
    let rows = adapter
        .query(&format!("SELECT CAST(COUNT(*) AS VARCHAR(20)) FROM \"{}\"", table))
        .await
        .unwrap();
    rows[0][0].as_deref().unwrap().parse().unwrap()
}

pub const CREATE_THINGS: &str = "-- up\n\
CREATE TABLE t (id INTEGER PRIMARY KEY);\n\
-- down\n\
DROP TABLE t;\n";

pub const ADD_COLUMN: &str = "-- up\n\
ALTER TABLE t ADD COLUMN c TEXT;\n\
-- down\n\
ALTER TABLE t DROP COLUMN c;\n";

pub fn create_table(table: &str) -> String {
    format!(
        "-- up\nCREATE TABLE {0} (id INTEGER PRIMARY KEY);\n-- down\nDROP TABLE {0};\n",
        table
    )
}
