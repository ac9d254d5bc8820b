use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::DateStamp;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    LoadSegments,
    Timelines,
}

impl Table {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadSegments => "load_segments",
            Self::Timelines => "timelines",
        }
    }
}

/// Non-fatal observation made during a pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PassWarning {
    /// An automatic delete would have removed a hand-fixed row; the row was kept.
    HandFixCollision {
        table: Table,
        id: i64,
        detail: String,
    },
    ShortTimeline {
        datestart: DateStamp,
        minutes: i64,
    },
    Overlap {
        scs: i64,
        earlier: String,
        later: String,
        minutes: i64,
    },
    Separation {
        earlier: String,
        later: String,
        hours: i64,
    },
    EmptyLoadTable,
    LoadsAfterRange {
        count: usize,
        after: DateStamp,
    },
    ReplanImport {
        load: String,
        dir: String,
    },
}

impl Display for PassWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HandFixCollision { table, id, detail } => write!(
                f,
                "updating {} across id {id} which is fixed_by_hand: {detail}",
                table.as_str()
            ),
            Self::ShortTimeline { datestart, minutes } => {
                write!(f, "short timeline at {datestart}, {minutes} minutes")
            }
            Self::Overlap {
                scs,
                earlier,
                later,
                minutes,
            } => write!(
                f,
                "same SCS {scs} loads {earlier} and {later} overlap by {minutes} minutes"
            ),
            Self::Separation {
                earlier,
                later,
                hours,
            } => write!(f, "loads {earlier} {later} separated by more than {hours} hours"),
            Self::EmptyLoadTable => f.write_str("load_segments table is empty"),
            Self::LoadsAfterRange { count, after } => {
                write!(f, "{count} loads exist in db after update range end {after}")
            }
            Self::ReplanImport { load, dir } => {
                write!(f, "{load} is replan/reopen, using {dir} dir for imported cmds")
            }
        }
    }
}

/// Warning collector scoped to a single reconciliation pass.
///
/// Every component receives the log explicitly; warnings are mirrored to
/// `tracing` as they are recorded and handed back to the caller through
/// [`PassLog::into_warnings`].
#[derive(Debug, Default)]
pub struct PassLog {
    warnings: Vec<PassWarning>,
}

impl PassLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, warning: PassWarning) {
        tracing::warn!(kind = warning_kind(&warning), "{warning}");
        self.warnings.push(warning);
    }

    #[must_use]
    pub fn warnings(&self) -> &[PassWarning] {
        &self.warnings
    }

    #[must_use]
    pub fn into_warnings(self) -> Vec<PassWarning> {
        self.warnings
    }
}

fn warning_kind(warning: &PassWarning) -> &'static str {
    match warning {
        PassWarning::HandFixCollision { .. } => "hand_fix_collision",
        PassWarning::ShortTimeline { .. } => "short_timeline",
        PassWarning::Overlap { .. } => "overlap",
        PassWarning::Separation { .. } => "separation",
        PassWarning::EmptyLoadTable => "empty_load_table",
        PassWarning::LoadsAfterRange { .. } => "loads_after_range",
        PassWarning::ReplanImport { .. } => "replan_import",
    }
}
