//! Migration units - the contract every catalog entry fulfills

use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MigrationError, MigrationResult};
use crate::schema::Schema;

/// Which way a unit is being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply the migration
    Up,
    /// Revert the migration
    Down,
}

impl Direction {
    /// Progress verb printed when a step starts
    pub fn verb(&self) -> &'static str {
        match self {
            Direction::Up => "migrating",
            Direction::Down => "reverting",
        }
    }

    /// Past tense printed when a step finishes
    pub fn past_tense(&self) -> &'static str {
        match self {
            Direction::Up => "migrated",
            Direction::Down => "reverted",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Lifecycle of one version during an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Applying,
    Applied,
    Reverting,
    Reverted,
    Failed,
}

impl MigrationState {
    pub fn running(direction: Direction) -> Self {
        match direction {
            Direction::Up => MigrationState::Applying,
            Direction::Down => MigrationState::Reverting,
        }
    }

    pub fn finished(direction: Direction) -> Self {
        match direction {
            Direction::Up => MigrationState::Applied,
            Direction::Down => MigrationState::Reverted,
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            MigrationState::Pending => "pending",
            MigrationState::Applying => "applying",
            MigrationState::Applied => "applied",
            MigrationState::Reverting => "reverting",
            MigrationState::Reverted => "reverted",
            MigrationState::Failed => "failed",
        };
        f.write_str(state)
    }
}

/// A versioned schema change with explicit forward and backward operations.
///
/// Units only record commands on the supplied [`Schema`]; the engine owns the
/// connection and decides how (and whether) the commands run.
pub trait Migration: Send + Sync {
    fn up(&self, schema: &mut Schema) -> MigrationResult<()>;

    fn down(&self, schema: &mut Schema) -> MigrationResult<()>;
}

/// A migration written once, in the forward direction only
pub trait ReversibleMigration: Send + Sync {
    fn change(&self, schema: &mut Schema) -> MigrationResult<()>;
}

/// Adapts a [`ReversibleMigration`] into a [`Migration`] whose `down` replays
/// the recorded commands inverted and in reverse order.
pub struct Reversible<M>(pub M);

impl<M: ReversibleMigration> Migration for Reversible<M> {
    fn up(&self, schema: &mut Schema) -> MigrationResult<()> {
        self.0.change(schema)
    }

    fn down(&self, schema: &mut Schema) -> MigrationResult<()> {
        let mut recorded = Schema::new();
        self.0.change(&mut recorded)?;

        for command in recorded.commands().iter().rev() {
            let inverse = command
                .inverse()
                .ok_or_else(|| MigrationError::irreversible(command.describe()))?;
            schema.push(inverse);
        }
        Ok(())
    }
}

/// Record what a unit would do in the given direction
pub fn plan(unit: &dyn Migration, direction: Direction) -> MigrationResult<Schema> {
    let mut schema = Schema::new();
    match direction {
        Direction::Up => unit.up(&mut schema)?,
        Direction::Down => unit.down(&mut schema)?,
    }
    Ok(schema)
}

static SECTION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^--\s*(up|down)(\s+migration)?\s*:?\s*$").expect("section marker regex")
});

/// Migration backed by a `.sql` file with `-- up` / `-- down` sections
#[derive(Debug, Clone, PartialEq)]
pub struct SqlMigration {
    pub up_sql: String,
    pub down_sql: Option<String>,
}

impl SqlMigration {
    pub fn parse(content: &str) -> Self {
        let mut up = Vec::new();
        let mut down = Vec::new();
        let mut section: Option<Direction> = None;

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(captures) = SECTION_MARKER.captures(trimmed) {
                section = if captures[1].eq_ignore_ascii_case("up") {
                    Some(Direction::Up)
                } else {
                    Some(Direction::Down)
                };
                continue;
            }

            // comments and blank lines carry no SQL
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }

            match section {
                Some(Direction::Up) => up.push(line),
                Some(Direction::Down) => down.push(line),
                None => {}
            }
        }

        let down_sql = down.join("\n").trim().to_string();
        Self {
            up_sql: up.join("\n").trim().to_string(),
            down_sql: (!down_sql.is_empty()).then_some(down_sql),
        }
    }

    pub fn from_file(path: &Path) -> MigrationResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }
}

impl Migration for SqlMigration {
    fn up(&self, schema: &mut Schema) -> MigrationResult<()> {
        if !self.up_sql.is_empty() {
            schema.execute(&self.up_sql);
        }
        Ok(())
    }

    fn down(&self, schema: &mut Schema) -> MigrationResult<()> {
        match &self.down_sql {
            Some(sql) => {
                schema.execute(sql);
                Ok(())
            }
            None => Err(MigrationError::irreversible("SQL file without a down section")),
        }
    }
}
