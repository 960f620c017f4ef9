//! # pin-migration: versioned schema migrations
//!
//! Discovers migration units, tracks which versions an environment has
//! applied, and applies or reverts them one transaction at a time.
//! Supports breakpoints that guard rollbacks, fake runs that only update
//! bookkeeping, dry runs that print SQL instead of executing it, and seeders.

pub mod adapter;
pub mod config;
pub mod dialect;
pub mod error;
pub mod manager;
pub mod migration;
pub mod output;
pub mod resolver;
pub mod schema;
pub mod seed;
pub mod session;
pub mod status;
pub mod store;
pub mod version;

// Re-export the types most callers need
pub use adapter::{Adapter, PostgresAdapter, Row, SqliteAdapter};
pub use config::{Config, Environment, DEFAULT_CONFIG_FILE};
pub use dialect::{Dialect, TableNaming};
pub use error::{MigrationError, MigrationResult};
pub use manager::{BreakpointMode, Manager, RollbackReport, RollbackTarget};
pub use migration::{Direction, Migration, MigrationState, Reversible, ReversibleMigration, SqlMigration};
pub use output::{BufferedOutput, ConsoleOutput, Output};
pub use resolver::{Catalog, MigrationEntry, Registry, Resolver, Source};
pub use schema::{ColumnDefinition, ColumnType, Command, Schema, TableBuilder};
pub use seed::{SeedEntry, Seeder, SqlSeeder};
pub use status::{MigrationStatus, StatusEntry, StatusFormat, StatusReport};
pub use store::{VersionLogEntry, VersionStore};
pub use version::{Version, VersionOrder};
