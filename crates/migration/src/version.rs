//! Migration versions and date targets
//!
//! A version is the timestamp-like numeric prefix of a migration's name
//! (`YYYYMMDDHHMMSS`). Versions order numerically, which for well-formed
//! timestamps is also chronological.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, MigrationResult};

const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";
const DATE_FORMAT_HINT: &str = "Invalid date. Format is YYYY[MM[DD[HH[II[SS]]]]].";

/// Unique identifier of one migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Sentinel meaning "before every migration"
    pub const ZERO: Version = Version(0);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Build the version a migration created at `datetime` would carry
    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        // fourteen digits always fit in an i64
        let digits = datetime.format(VERSION_FORMAT).to_string();
        Self(digits.parse().unwrap_or_default())
    }

    /// Interpret the version as a creation timestamp, if it is one
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&format!("{:014}", self.0), VERSION_FORMAT).ok()
    }

    /// Parse a `YYYY[MM[DD[HH[II[SS]]]]]` date argument into a version.
    ///
    /// Missing month and day default to `01`, missing time fields to `00`.
    pub fn from_date_argument(date: &str) -> MigrationResult<Self> {
        if date.is_empty() || !date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MigrationError::invalid_argument(DATE_FORMAT_HINT));
        }

        let padding = match date.len() {
            14 => "",
            12 => "00",
            10 => "0000",
            8 => "000000",
            6 => "01000000",
            4 => "0101000000",
            _ => return Err(MigrationError::invalid_argument(DATE_FORMAT_HINT)),
        };

        let target = format!("{}{}", date, padding);
        let datetime = NaiveDateTime::parse_from_str(&target, VERSION_FORMAT)
            .map_err(|_| MigrationError::invalid_argument(DATE_FORMAT_HINT))?;

        Ok(Self::from_datetime(datetime))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.len() > 18 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MigrationError::invalid_argument(format!(
                "'{}' is not a valid migration version",
                s
            )));
        }
        s.parse::<i64>()
            .map(Version)
            .map_err(|e| MigrationError::invalid_argument(format!("'{}': {}", s, e)))
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// How applied versions are ordered for rollback and status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOrder {
    /// Order by the version embedded in the migration name
    #[default]
    Creation,
    /// Order by the time each migration was applied
    Execution,
}

impl VersionOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionOrder::Creation => "creation",
            VersionOrder::Execution => "execution",
        }
    }
}

impl fmt::Display for VersionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
