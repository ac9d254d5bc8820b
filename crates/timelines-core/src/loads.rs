use std::collections::BTreeSet;

use crate::{
    check_load_overlap, find_changes, invalidate_for_load_segments, Invalidation, LoadSegment,
    LoadSegmentComparator, LoadSegmentField, LoadSegmentId, PassLog, PassWarning, ReconcileConfig,
    StoredLoadSegment, Table, TimelineStore, TimelinesError,
};

/// Changes applied (or planned, in a dry run) to `load_segments`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadUpdate {
    pub deleted: Vec<LoadSegmentId>,
    /// Rows that would have been deleted but are hand-fixed or carry a
    /// hand-fixed timeline.
    pub protected: Vec<LoadSegmentId>,
    pub inserted: Vec<StoredLoadSegment>,
    pub invalidated: Invalidation,
}

/// Brings the stored load segments from the feed's first `datestart`
/// onwards in line with `feed`.
///
/// `feed` must be ordered by `(datestart, scs)`. Dependent timelines of every
/// deleted row are cleared before the row itself; inserts take ids
/// `max(id) + 1 + offset`.
///
/// # Errors
/// Returns [`TimelinesError::Validation`] for a feed of fewer than two
/// records, a feed reaching before the history floor, or an empty table
/// outside test mode; [`TimelinesError::InconsistentAnchor`] when the stored
/// window cannot be anchored to the feed; [`TimelinesError::Store`] when the
/// store fails.
pub fn update_loads<S: TimelineStore + ?Sized>(
    store: &mut S,
    feed: &[LoadSegment],
    config: &ReconcileConfig,
    log: &mut PassLog,
) -> Result<LoadUpdate, TimelinesError> {
    let (Some(first), Some(last)) = (feed.first(), feed.last()) else {
        return Err(TimelinesError::Validation(
            "no load segments passed to load update".to_string(),
        ));
    };
    if feed.len() < 2 {
        return Err(TimelinesError::Validation(
            "only one load segment passed to load update".to_string(),
        ));
    }

    tracing::info!(
        from = %first.datestart,
        to = %last.datestop,
        count = feed.len(),
        "updating load segments"
    );

    if let Some(floor) = config.history_floor {
        if first.datestart < floor && !config.test_mode {
            return Err(TimelinesError::Validation(format!(
                "attempting to update loads before {floor}"
            )));
        }
    }

    let max_id = store.max_load_segment_id()?;
    if max_id == 0 && !config.test_mode {
        return Err(TimelinesError::Validation(
            "no load_segments in database".to_string(),
        ));
    }

    let comparator = LoadSegmentComparator::excluding(config.compare_exclude.iter().copied());
    // A protected row stands for the feed record it was fixed from.
    let pin = comparator.also_excluding(LoadSegmentField::FixedByHand);
    let window = store.load_segments_from(&first.datestart)?;

    let mut update = LoadUpdate::default();
    let mut protected = BTreeSet::new();
    let (to_delete, mut to_insert) = if window.is_empty() {
        if store.count_load_segments()? != 0 {
            return Err(TimelinesError::InconsistentAnchor(format!(
                "no overlap in database for load segment interval {} to {}",
                first.datestart, last.datestop
            )));
        }
        log.warn(PassWarning::EmptyLoadTable);
        (Vec::new(), feed.to_vec())
    } else {
        let mut compared = Vec::with_capacity(window.len());
        for mut row in window {
            if !is_protected(store, &row)? {
                compared.push(row);
                continue;
            }
            protected.insert(row.id);
            if feed.iter().any(|want| pin.matches(want, &row.segment)) {
                row.segment.fixed_by_hand = false;
                compared.push(row);
                continue;
            }
            log.warn(PassWarning::HandFixCollision {
                table: Table::LoadSegments,
                id: row.id.0,
                detail: format!(
                    "{} at {} is not in the feed and was kept",
                    row.segment, row.segment.datestart
                ),
            });
            update.protected.push(row.id);
        }

        if compared.is_empty() {
            tracing::info!("every stored load in range is protected, inserting whole feed");
            (Vec::new(), feed.to_vec())
        } else {
            let changes = find_changes(feed, &compared, &comparator)?;
            (changes.to_delete, changes.to_insert)
        }
    };

    let later = store.load_segments_from(&last.datestop)?;
    if !later.is_empty() {
        log.warn(PassWarning::LoadsAfterRange {
            count: later.len(),
            after: last.datestop,
        });
    }

    let mut deletable = Vec::with_capacity(to_delete.len());
    for row in to_delete {
        if !protected.contains(&row.id) && !is_protected(store, &row)? {
            deletable.push(row);
            continue;
        }
        log.warn(PassWarning::HandFixCollision {
            table: Table::LoadSegments,
            id: row.id.0,
            detail: format!("{} at {} kept", row.segment, row.segment.datestart),
        });
        if let Some(index) = to_insert
            .iter()
            .position(|want| pin.matches(want, &row.segment))
        {
            to_insert.remove(index);
        }
        update.protected.push(row.id);
    }

    if deletable.is_empty() && to_insert.is_empty() {
        tracing::info!("no load segment update required");
    }

    update.invalidated = invalidate_for_load_segments(store, &deletable, log, config.dry_run)?;
    for row in &deletable {
        tracing::info!(id = %row.id, load = %row.segment, dry_run = config.dry_run, "deleting load segment");
        if !config.dry_run {
            store.delete_load_segment(row.id)?;
        }
        update.deleted.push(row.id);
    }

    check_load_overlap(feed, config, log);

    for (offset, segment) in (1..).zip(to_insert) {
        let row = StoredLoadSegment {
            id: LoadSegmentId(max_id + offset),
            segment,
        };
        tracing::debug!(
            id = %row.id,
            load = %row.segment,
            datestart = %row.segment.datestart,
            datestop = %row.segment.datestop,
            scs = row.segment.scs,
            "inserting load segment"
        );
        if !config.dry_run {
            store.insert_load_segment(&row)?;
        }
        update.inserted.push(row);
    }

    Ok(update)
}

fn is_protected<S: TimelineStore + ?Sized>(
    store: &S,
    row: &StoredLoadSegment,
) -> Result<bool, TimelinesError> {
    if row.segment.fixed_by_hand {
        return Ok(true);
    }
    Ok(store
        .timelines_for_load_segment(row.id)?
        .iter()
        .any(|timeline| timeline.fixed_by_hand))
}
