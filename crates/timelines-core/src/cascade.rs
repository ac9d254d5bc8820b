use crate::{
    PassLog, PassWarning, StoredLoadSegment, StoredTimeline, Table, TimelineId, TimelineStore,
    TimelinesError,
};

/// What a cascade removed (or, in a dry run, would have removed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    pub removed: Vec<TimelineId>,
    /// Hand-fixed timelines left in place.
    pub protected: Vec<TimelineId>,
    pub commands_removed: usize,
}

impl Invalidation {
    fn absorb(&mut self, other: Self) {
        self.removed.extend(other.removed);
        self.protected.extend(other.protected);
        self.commands_removed += other.commands_removed;
    }
}

/// Clears one timeline: its generated commands first, then the row.
///
/// A hand-fixed timeline and its commands are left untouched and reported as
/// a [`PassWarning::HandFixCollision`]. An id with no row is a no-op.
///
/// # Errors
/// Returns [`TimelinesError::Store`] when the store fails.
pub fn invalidate_timeline<S: TimelineStore + ?Sized>(
    store: &mut S,
    id: TimelineId,
    log: &mut PassLog,
    dry_run: bool,
) -> Result<Invalidation, TimelinesError> {
    let Some(timeline) = store.timeline(id)? else {
        tracing::debug!(timeline_id = %id, "timeline already gone");
        return Ok(Invalidation::default());
    };
    clear(store, &timeline, log, dry_run)
}

/// # Errors
/// Returns [`TimelinesError::Store`] when the store fails.
pub fn invalidate_timelines<S: TimelineStore + ?Sized>(
    store: &mut S,
    ids: &[TimelineId],
    log: &mut PassLog,
    dry_run: bool,
) -> Result<Invalidation, TimelinesError> {
    let mut outcome = Invalidation::default();
    for id in ids {
        outcome.absorb(invalidate_timeline(store, *id, log, dry_run)?);
    }
    Ok(outcome)
}

/// Clears every timeline that references one of `loads`.
///
/// Must complete before the load segment rows themselves are deleted.
///
/// # Errors
/// Returns [`TimelinesError::Store`] when the store fails.
pub fn invalidate_for_load_segments<S: TimelineStore + ?Sized>(
    store: &mut S,
    loads: &[StoredLoadSegment],
    log: &mut PassLog,
    dry_run: bool,
) -> Result<Invalidation, TimelinesError> {
    let mut outcome = Invalidation::default();
    for load in loads {
        for timeline in store.timelines_for_load_segment(load.id)? {
            outcome.absorb(clear(store, &timeline, log, dry_run)?);
        }
    }
    Ok(outcome)
}

fn clear<S: TimelineStore + ?Sized>(
    store: &mut S,
    timeline: &StoredTimeline,
    log: &mut PassLog,
    dry_run: bool,
) -> Result<Invalidation, TimelinesError> {
    if timeline.fixed_by_hand {
        log.warn(PassWarning::HandFixCollision {
            table: Table::Timelines,
            id: timeline.id.0,
            detail: format!(
                "timeline at {} for load segment {} kept",
                timeline.timeline.datestart, timeline.timeline.load_segment_id
            ),
        });
        return Ok(Invalidation {
            protected: vec![timeline.id],
            ..Invalidation::default()
        });
    }

    tracing::debug!(
        timeline_id = %timeline.id,
        datestart = %timeline.timeline.datestart,
        dry_run,
        "clearing timeline"
    );
    let mut commands_removed = 0;
    if !dry_run {
        commands_removed = store.delete_commands_for_timeline(timeline.id)?;
        store.delete_timeline(timeline.id)?;
    }
    Ok(Invalidation {
        removed: vec![timeline.id],
        protected: Vec::new(),
        commands_removed,
    })
}
