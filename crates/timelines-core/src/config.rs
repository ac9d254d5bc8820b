use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{DateStamp, LoadSegmentField, TimelinesError};

const DEFAULT_HISTORY_FLOOR: &str = "2009:001:00:00:00.000";

/// Tunables for one reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Compute and report everything but issue no store writes.
    pub dry_run: bool,
    /// Permit edits before `history_floor` and bootstrapping empty tables.
    pub test_mode: bool,
    pub history_floor: Option<DateStamp>,
    /// Extra fields ignored when matching feed records against stored rows.
    pub compare_exclude: Vec<LoadSegmentField>,
    pub overlap_tolerance_minutes: i64,
    pub max_separation_hours: i64,
    pub short_timeline_minutes: i64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            test_mode: false,
            history_floor: DateStamp::parse(DEFAULT_HISTORY_FLOOR).ok(),
            compare_exclude: Vec::new(),
            overlap_tolerance_minutes: 15,
            max_separation_hours: 12,
            short_timeline_minutes: 60,
        }
    }
}

impl ReconcileConfig {
    /// Checks that every threshold is positive.
    ///
    /// # Errors
    /// Returns [`TimelinesError::Configuration`] naming the first bad field.
    pub fn validate(&self) -> Result<(), TimelinesError> {
        for (name, value) in [
            ("overlap_tolerance_minutes", self.overlap_tolerance_minutes),
            ("max_separation_hours", self.max_separation_hours),
            ("short_timeline_minutes", self.short_timeline_minutes),
        ] {
            if value < 0 {
                return Err(TimelinesError::Configuration(format!(
                    "{name} MUST be >= 0"
                )));
            }
        }

        if self.max_separation_hours == 0 {
            return Err(TimelinesError::Configuration(
                "max_separation_hours MUST be >= 1".to_string(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn overlap_tolerance(&self) -> Duration {
        Duration::minutes(self.overlap_tolerance_minutes)
    }

    #[must_use]
    pub fn max_separation(&self) -> Duration {
        Duration::hours(self.max_separation_hours)
    }

    #[must_use]
    pub fn short_timeline(&self) -> Duration {
        Duration::minutes(self.short_timeline_minutes)
    }
}
