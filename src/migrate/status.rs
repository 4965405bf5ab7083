use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::SeriesId;

/// Where a series is in its migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MigrationStatus {
    NotStarted = 0,
    InitialPassComplete = 1,
    NoData = 2,
    Skipped = 3,
    Migrated = 4,
    Error = 5,
}

impl MigrationStatus {
    /// No further periods will be attempted.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MigrationStatus::NoData | MigrationStatus::Skipped | MigrationStatus::Migrated
        )
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => MigrationStatus::NotStarted,
            1 => MigrationStatus::InitialPassComplete,
            2 => MigrationStatus::NoData,
            3 => MigrationStatus::Skipped,
            4 => MigrationStatus::Migrated,
            _ => MigrationStatus::Error,
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationStatus::NotStarted => "NOT_STARTED",
            MigrationStatus::InitialPassComplete => "INITIAL_PASS_COMPLETE",
            MigrationStatus::NoData => "NO_DATA",
            MigrationStatus::Skipped => "SKIPPED",
            MigrationStatus::Migrated => "MIGRATED",
            MigrationStatus::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Snapshot of one series' migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProgress {
    pub series_id: SeriesId,
    pub status: MigrationStatus,
    /// Everything before this timestamp has been copied.
    pub watermark: Option<i64>,
}
