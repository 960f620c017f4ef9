//! Error types for the migration engine
//!
//! A single error enum covers configuration, resolution, validation and
//! execution failures so that the command layer can print one diagnostic
//! and exit non-zero.

use thiserror::Error;

use crate::migration::Direction;
use crate::version::Version;

/// Result type alias for engine operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Missing or invalid environment, adapter or connection field
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A migration or seed file name does not follow the naming pattern
    #[error("Invalid migration name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Two catalog entries resolve to the same version
    #[error("Duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        version: Version,
        first: String,
        second: String,
    },

    /// Two catalog entries resolve to the same class-like name
    #[error("Duplicate migration name '{name}': '{first}' and '{second}'")]
    DuplicateName {
        name: String,
        first: String,
        second: String,
    },

    /// A rollback, migrate or breakpoint target that matches nothing known
    #[error("Unknown target '{target}': {reason}")]
    UnknownTarget { target: String, reason: String },

    /// A requested seeder does not exist
    #[error("The seed '{name}' does not exist")]
    UnknownSeed { name: String },

    /// Seeder dependencies cannot be satisfied
    #[error("Seed '{seed}' cannot be ordered: {message}")]
    SeedDependency { seed: String, message: String },

    /// A rollback was requested for a unit without an inverse
    #[error("Migration {version} cannot be reverted: {operation} has no inverse")]
    Irreversible { version: Version, operation: String },

    /// A unit failed while running against the database
    #[error("Migration {version} {name} failed while {direction}: {source}")]
    Execution {
        version: Version,
        name: String,
        direction: Direction,
        #[source]
        source: Box<MigrationError>,
    },

    /// A seeder failed while running against the database
    #[error("Seed '{name}' failed: {source}")]
    SeedExecution {
        name: String,
        #[source]
        source: Box<MigrationError>,
    },

    /// Malformed user input (dates, versions, flag combinations)
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrationError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new invalid name error
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new unknown target error
    pub fn unknown_target(target: impl ToString, reason: impl Into<String>) -> Self {
        Self::UnknownTarget {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a new invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an irreversibility error; the version is filled in by the caller
    /// that knows which unit was being planned.
    pub fn irreversible(operation: impl Into<String>) -> Self {
        Self::Irreversible {
            version: Version::ZERO,
            operation: operation.into(),
        }
    }

    /// Attach the originating version to an irreversibility error
    pub fn at_version(self, version: Version) -> Self {
        match self {
            Self::Irreversible { operation, .. } => Self::Irreversible { version, operation },
            other => other,
        }
    }

    /// Check if the error was raised before any database contact
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::InvalidName { .. }
                | Self::DuplicateVersion { .. }
                | Self::DuplicateName { .. }
                | Self::UnknownTarget { .. }
                | Self::UnknownSeed { .. }
                | Self::SeedDependency { .. }
                | Self::InvalidArgument { .. }
        )
    }

    /// The version a failure originated from, when known
    pub fn version(&self) -> Option<Version> {
        match self {
            Self::Execution { version, .. } | Self::Irreversible { version, .. } => Some(*version),
            Self::DuplicateVersion { version, .. } => Some(*version),
            _ => None,
        }
    }
}
