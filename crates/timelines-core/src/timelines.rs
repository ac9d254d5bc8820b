use crate::derive::sort_pieces;
use crate::{
    derive_timelines, invalidate_timelines, Invalidation, PassLog, PassWarning, ProvenanceResolver,
    ProvenanceStore, ReconcileConfig, StoredLoadSegment, StoredTimeline, Timeline, TimelineId,
    TimelineStore, TimelinesError,
};

/// Changes applied (or planned, in a dry run) to `timelines`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineUpdate {
    /// Index of the first derived timeline not already satisfied by the store.
    pub divergence: usize,
    pub inserted: Vec<StoredTimeline>,
    pub invalidated: Invalidation,
}

/// Derives the timeline pieces of every load, ordered by
/// `(datestart, load_segment_id)`.
///
/// # Errors
/// Propagates provenance and derivation failures for the first load that
/// cannot be mapped.
pub fn derive_candidates<P: ProvenanceStore + ?Sized>(
    source: &P,
    loads: &[StoredLoadSegment],
    log: &mut PassLog,
) -> Result<Vec<Timeline>, TimelinesError> {
    let resolver = ProvenanceResolver::new(source);
    let mut candidates = Vec::with_capacity(loads.len());
    for load in loads {
        let provenance = resolver.resolve(&load.segment)?;
        candidates.extend(derive_timelines(load, &provenance, &resolver, log)?);
    }
    sort_pieces(&mut candidates);
    Ok(candidates)
}

/// Number of leading candidates already satisfied by `stored`.
///
/// A candidate is satisfied by any stored timeline with the same `datestart`
/// that ends no later than the candidate; timelines shortened outside this
/// process still count.
#[must_use]
pub fn matched_prefix(candidates: &[Timeline], stored: &[StoredTimeline]) -> usize {
    candidates
        .iter()
        .take_while(|candidate| {
            stored.iter().any(|row| {
                row.timeline.datestart == candidate.datestart
                    && row.timeline.datestop <= candidate.datestop
            })
        })
        .count()
}

/// Re-derives timelines for `loads` and replaces the stored chain from the
/// first unmatched piece onwards.
///
/// New rows take ids `max_existing_timeline_id + 1 + offset` and are never
/// hand-fixed. Stored hand-fixed timelines past the anchor are left alone.
///
/// # Errors
/// Propagates [`derive_candidates`] failures and store failures.
pub fn update_timelines<S: TimelineStore + ProvenanceStore + ?Sized>(
    store: &mut S,
    loads: &[StoredLoadSegment],
    max_existing_timeline_id: i64,
    config: &ReconcileConfig,
    log: &mut PassLog,
) -> Result<TimelineUpdate, TimelinesError> {
    let candidates = derive_candidates(&*store, loads, log)?;
    let (Some(first), Some(last)) = (candidates.first(), candidates.last()) else {
        tracing::info!("no loads to derive timelines from");
        return Ok(TimelineUpdate::default());
    };
    tracing::info!(
        from = %first.datestart,
        to = %last.datestop,
        count = candidates.len(),
        "updating timelines"
    );

    let stored = store.timelines_ending_from(&first.datestart)?;
    let divergence = matched_prefix(&candidates, &stored);
    let mut update = TimelineUpdate {
        divergence,
        ..TimelineUpdate::default()
    };
    let Some(pending) = candidates.get(divergence..).filter(|rest| !rest.is_empty()) else {
        tracing::info!("no timeline update required");
        return Ok(update);
    };

    let short = config.short_timeline();
    for candidate in pending {
        let duration = candidate.duration();
        if duration < short {
            log.warn(PassWarning::ShortTimeline {
                datestart: candidate.datestart,
                minutes: duration.whole_minutes(),
            });
        }
    }

    let defunct: Vec<TimelineId> = match divergence.checked_sub(1).and_then(|i| candidates.get(i)) {
        Some(anchor) => store.timelines_starting_after(&anchor.datestart)?,
        None => stored
            .into_iter()
            .filter(|row| row.timeline.datestart >= first.datestart)
            .collect(),
    }
    .into_iter()
    .filter(|row| !row.fixed_by_hand && row.timeline.datestart <= row.timeline.datestop)
    .map(|row| row.id)
    .collect();
    update.invalidated = invalidate_timelines(store, &defunct, log, config.dry_run)?;

    tracing::info!(
        from = divergence,
        to = candidates.len(),
        dry_run = config.dry_run,
        "inserting timelines"
    );
    for (offset, timeline) in (1..).zip(pending.iter().cloned()) {
        let row = StoredTimeline {
            id: TimelineId(max_existing_timeline_id + offset),
            fixed_by_hand: false,
            timeline,
        };
        tracing::debug!(
            id = %row.id,
            dir = row.timeline.dir.as_deref().unwrap_or("-"),
            datestart = %row.timeline.datestart,
            datestop = %row.timeline.datestop,
            "inserting timeline"
        );
        if !config.dry_run {
            store.insert_timeline(&row)?;
        }
        update.inserted.push(row);
    }

    Ok(update)
}
