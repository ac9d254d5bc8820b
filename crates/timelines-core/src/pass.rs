use serde::Serialize;

use crate::{
    update_loads, update_timelines, LoadSegment, LoadSegmentId, PassLog, PassWarning,
    ProvenanceStore, ReconcileConfig, RepairHook, TimelineId, TimelineStore, TimelinesError,
};

/// Outcome of one reconciliation pass.
#[must_use]
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PassReport {
    pub dry_run: bool,
    pub load_segments_deleted: Vec<LoadSegmentId>,
    pub load_segments_protected: Vec<LoadSegmentId>,
    pub load_segments_inserted: Vec<LoadSegmentId>,
    pub timelines_deleted: Vec<TimelineId>,
    pub timelines_protected: Vec<TimelineId>,
    pub timelines_inserted: Vec<TimelineId>,
    pub commands_deleted: usize,
    pub warnings: Vec<PassWarning>,
}

impl PassReport {
    /// True when the pass changed (or would change) nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.load_segments_deleted.is_empty()
            && self.load_segments_inserted.is_empty()
            && self.timelines_deleted.is_empty()
            && self.timelines_inserted.is_empty()
    }
}

/// Runs one full reconciliation of `feed` against `store`.
///
/// Order: provenance repairs, feed repairs, load segment phase (cascading
/// into timelines before any load row is deleted), then the timeline phase
/// over every stored load from the feed's first `datestart`. Any fatal error
/// stops the pass where it is; the caller decides whether to roll back.
///
/// # Errors
/// Returns the first fatal [`TimelinesError`] raised by any phase.
pub fn run_pass<S, R>(
    store: &mut S,
    feed: Vec<LoadSegment>,
    repair: &R,
    config: &ReconcileConfig,
) -> Result<PassReport, TimelinesError>
where
    S: TimelineStore + ProvenanceStore,
    R: RepairHook + ?Sized,
{
    config.validate()?;
    let mut log = PassLog::new();
    if config.dry_run {
        tracing::info!("running in dry run mode");
    } else {
        repair.repair_provenance(store)?;
    }
    let feed = repair.repair_feed(feed)?;

    let max_timeline_id = store.max_timeline_id()?;
    if max_timeline_id == 0 && !config.test_mode {
        return Err(TimelinesError::Validation(
            "no timelines in database".to_string(),
        ));
    }

    let loads = update_loads(store, &feed, config, &mut log)?;

    // update_loads rejects an empty feed, so the first record exists here.
    let from = feed
        .first()
        .map(|load| load.datestart)
        .ok_or_else(|| TimelinesError::Validation("empty feed".to_string()))?;
    let stored_loads = store.load_segments_from(&from)?;
    let timelines = update_timelines(store, &stored_loads, max_timeline_id, config, &mut log)?;

    let report = PassReport {
        dry_run: config.dry_run,
        load_segments_deleted: loads.deleted,
        load_segments_protected: loads.protected,
        load_segments_inserted: loads.inserted.iter().map(|row| row.id).collect(),
        timelines_deleted: loads
            .invalidated
            .removed
            .into_iter()
            .chain(timelines.invalidated.removed)
            .collect(),
        timelines_protected: loads
            .invalidated
            .protected
            .into_iter()
            .chain(timelines.invalidated.protected)
            .collect(),
        timelines_inserted: timelines.inserted.iter().map(|row| row.id).collect(),
        commands_deleted: loads.invalidated.commands_removed
            + timelines.invalidated.commands_removed,
        warnings: log.into_warnings(),
    };
    tracing::info!(
        load_segments_deleted = report.load_segments_deleted.len(),
        load_segments_inserted = report.load_segments_inserted.len(),
        timelines_deleted = report.timelines_deleted.len(),
        timelines_inserted = report.timelines_inserted.len(),
        warnings = report.warnings.len(),
        dry_run = report.dry_run,
        "reconciliation pass complete"
    );
    Ok(report)
}
