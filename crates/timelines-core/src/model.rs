use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::DateStamp;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct LoadSegmentId(pub i64);

impl Display for LoadSegmentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct TimelineId(pub i64);

impl Display for TimelineId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One scheduled command-load interval as delivered by the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadSegment {
    pub name: String,
    pub year: i32,
    pub datestart: DateStamp,
    pub datestop: DateStamp,
    pub scs: i64,
    pub fixed_by_hand: bool,
}

impl LoadSegment {
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.datestop.since(&self.datestart)
    }

    #[must_use]
    pub fn is_named(&self, name: &str, year: i32) -> bool {
        self.name == name && self.year == year
    }
}

impl Display for LoadSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.year, self.name)
    }
}

/// A load segment row as persisted, with its store-assigned identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredLoadSegment {
    pub id: LoadSegmentId,
    #[serde(flatten)]
    pub segment: LoadSegment,
}

/// Field selector used when comparing wanted and stored load segments.
///
/// Identity is not a field of [`LoadSegment`], so it never takes part in a
/// comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoadSegmentField {
    Name,
    Year,
    Datestart,
    Datestop,
    Scs,
    FixedByHand,
}

impl LoadSegmentField {
    pub const ALL: [Self; 6] = [
        Self::Name,
        Self::Year,
        Self::Datestart,
        Self::Datestop,
        Self::Scs,
        Self::FixedByHand,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "load_segment",
            Self::Year => "year",
            Self::Datestart => "datestart",
            Self::Datestop => "datestop",
            Self::Scs => "load_scs",
            Self::FixedByHand => "fixed_by_hand",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == value)
    }

    #[must_use]
    pub fn differs(self, lhs: &LoadSegment, rhs: &LoadSegment) -> bool {
        match self {
            Self::Name => lhs.name != rhs.name,
            Self::Year => lhs.year != rhs.year,
            Self::Datestart => lhs.datestart != rhs.datestart,
            Self::Datestop => lhs.datestop != rhs.datestop,
            Self::Scs => lhs.scs != rhs.scs,
            Self::FixedByHand => lhs.fixed_by_hand != rhs.fixed_by_hand,
        }
    }
}

/// A piece of a load segment's interval mapped onto a source directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timeline {
    pub load_segment_id: LoadSegmentId,
    pub dir: Option<String>,
    pub datestart: DateStamp,
    pub datestop: DateStamp,
    pub replan: bool,
    pub incomplete: bool,
}

impl Timeline {
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.datestop.since(&self.datestart)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredTimeline {
    pub id: TimelineId,
    pub fixed_by_hand: bool,
    #[serde(flatten)]
    pub timeline: Timeline,
}

/// Summary of an actually built command product (`tl_built_loads`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuiltLoad {
    pub file: String,
    pub year: i32,
    pub load_segment: String,
    pub first_cmd_time: DateStamp,
    pub last_cmd_time: DateStamp,
    pub sumfile_modtime: f64,
}

/// Processing summary for one built file (`tl_processing`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingRecord {
    pub year: i32,
    pub dir: String,
    pub file: String,
    #[serde(default)]
    pub replan: bool,
    #[serde(default)]
    pub bcf_cmd_count: i64,
    #[serde(default)]
    pub replan_cmds: Option<String>,
    #[serde(default)]
    pub processing_tstart: Option<DateStamp>,
    #[serde(default)]
    pub processing_tstop: Option<DateStamp>,
    #[serde(default)]
    pub sumfile_modtime: f64,
}

impl ProcessingRecord {
    /// A replan that actually imported commands from an earlier product.
    #[must_use]
    pub fn is_replan_insertion(&self) -> bool {
        self.replan && self.bcf_cmd_count > 0
    }
}

/// The provenance chain resolved for one load segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub built: BuiltLoad,
    pub processing: ProcessingRecord,
}
