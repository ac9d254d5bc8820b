use anyhow::Result;

use crate::{
    BuiltLoad, DateStamp, LoadSegmentId, ProcessingRecord, StoredLoadSegment, StoredTimeline,
    TimelineId,
};

/// Persisted `load_segments` / `timelines` tables plus the generated-command
/// rows that hang off timelines.
///
/// No triggers or foreign keys are assumed; dependent-row cleanup is done by
/// [`crate::invalidate_timeline`].
pub trait TimelineStore {
    /// Highest load segment id, or 0 for an empty table.
    #[allow(clippy::missing_errors_doc)]
    fn max_load_segment_id(&self) -> Result<i64>;

    #[allow(clippy::missing_errors_doc)]
    fn count_load_segments(&self) -> Result<usize>;

    /// Load segments with `datestart >= from`, ordered by `(datestart, scs)`.
    #[allow(clippy::missing_errors_doc)]
    fn load_segments_from(&self, from: &DateStamp) -> Result<Vec<StoredLoadSegment>>;

    #[allow(clippy::missing_errors_doc)]
    fn insert_load_segment(&mut self, load: &StoredLoadSegment) -> Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn delete_load_segment(&mut self, id: LoadSegmentId) -> Result<()>;

    /// Highest timeline id, or 0 for an empty table.
    #[allow(clippy::missing_errors_doc)]
    fn max_timeline_id(&self) -> Result<i64>;

    #[allow(clippy::missing_errors_doc)]
    fn timeline(&self, id: TimelineId) -> Result<Option<StoredTimeline>>;

    #[allow(clippy::missing_errors_doc)]
    fn timelines_for_load_segment(&self, id: LoadSegmentId) -> Result<Vec<StoredTimeline>>;

    /// Timelines with `datestop >= from`, ordered by `(datestart, load_segment_id)`.
    #[allow(clippy::missing_errors_doc)]
    fn timelines_ending_from(&self, from: &DateStamp) -> Result<Vec<StoredTimeline>>;

    /// Timelines with `datestart > after`, ordered by `datestart`.
    #[allow(clippy::missing_errors_doc)]
    fn timelines_starting_after(&self, after: &DateStamp) -> Result<Vec<StoredTimeline>>;

    #[allow(clippy::missing_errors_doc)]
    fn insert_timeline(&mut self, timeline: &StoredTimeline) -> Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn delete_timeline(&mut self, id: TimelineId) -> Result<()>;

    /// Removes `cmds` rows for a timeline together with their parameter rows.
    /// Returns the number of command rows removed.
    #[allow(clippy::missing_errors_doc)]
    fn delete_commands_for_timeline(&mut self, id: TimelineId) -> Result<usize>;
}

/// Read access to `tl_built_loads` / `tl_processing`, plus the corrective
/// writes a repair step may make to `tl_processing`.
pub trait ProvenanceStore {
    /// Newest (max `sumfile_modtime`) built load with exactly this name and year.
    #[allow(clippy::missing_errors_doc)]
    fn latest_built_load(&self, load_segment: &str, year: i32) -> Result<Option<BuiltLoad>>;

    /// Newest built load in `year` whose name contains `code`.
    #[allow(clippy::missing_errors_doc)]
    fn latest_built_load_containing(&self, code: &str, year: i32) -> Result<Option<BuiltLoad>>;

    #[allow(clippy::missing_errors_doc)]
    fn processing_for(&self, file: &str, sumfile_modtime: f64)
        -> Result<Option<ProcessingRecord>>;

    /// Processing records in `year` whose file matches `C<day>?<serial>.sum`,
    /// newest first.
    #[allow(clippy::missing_errors_doc)]
    fn processing_matching_code(
        &self,
        day: &str,
        serial: &str,
        year: i32,
    ) -> Result<Vec<ProcessingRecord>>;

    #[allow(clippy::missing_errors_doc)]
    fn delete_processing_for_dir(&mut self, dir: &str) -> Result<usize>;

    #[allow(clippy::missing_errors_doc)]
    fn insert_processing(&mut self, record: &ProcessingRecord) -> Result<()>;
}
