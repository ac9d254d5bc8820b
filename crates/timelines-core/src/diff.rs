use std::collections::BTreeSet;

use crate::{LoadSegment, LoadSegmentField, StoredLoadSegment, TimelinesError};

/// Field-wise equality over load segments with a configurable exclusion set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSegmentComparator {
    exclude: BTreeSet<LoadSegmentField>,
}

impl LoadSegmentComparator {
    #[must_use]
    pub fn excluding(fields: impl IntoIterator<Item = LoadSegmentField>) -> Self {
        Self {
            exclude: fields.into_iter().collect(),
        }
    }

    /// This comparator with `field` excluded as well.
    #[must_use]
    pub fn also_excluding(&self, field: LoadSegmentField) -> Self {
        let mut exclude = self.exclude.clone();
        exclude.insert(field);
        Self { exclude }
    }

    /// First compared field on which the two records disagree.
    #[must_use]
    pub fn first_difference(
        &self,
        lhs: &LoadSegment,
        rhs: &LoadSegment,
    ) -> Option<LoadSegmentField> {
        LoadSegmentField::ALL
            .into_iter()
            .filter(|field| !self.exclude.contains(field))
            .find(|field| field.differs(lhs, rhs))
    }

    #[must_use]
    pub fn matches(&self, lhs: &LoadSegment, rhs: &LoadSegment) -> bool {
        self.first_difference(lhs, rhs).is_none()
    }
}

/// Delete / insert sets that bring a stored window in line with the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct LoadSegmentChanges {
    /// Index of the first wanted record that is not already stored.
    pub divergence: usize,
    pub to_delete: Vec<StoredLoadSegment>,
    pub to_insert: Vec<LoadSegment>,
}

impl LoadSegmentChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }
}

/// Walks `wanted` and `stored` in lock-step and splits both at the first
/// record that differs (or at the end of the shorter sequence).
///
/// Both sequences must start at the same record; everything before the
/// divergence point is kept, everything from it onwards is replaced.
///
/// # Errors
/// Returns [`TimelinesError::InconsistentAnchor`] when the sequences diverge
/// at index 0, including when either is empty.
pub fn find_changes(
    wanted: &[LoadSegment],
    stored: &[StoredLoadSegment],
    comparator: &LoadSegmentComparator,
) -> Result<LoadSegmentChanges, TimelinesError> {
    let mut divergence = 0;
    for (want, have) in wanted.iter().zip(stored) {
        if let Some(field) = comparator.first_difference(want, &have.segment) {
            tracing::info!(
                index = divergence,
                field = field.as_str(),
                wanted = %want,
                stored = %have.segment,
                stored_id = %have.id,
                "load segment mismatch"
            );
            break;
        }
        divergence += 1;
    }

    if divergence == 0 {
        let detail = match (wanted.first(), stored.first()) {
            (Some(want), Some(have)) => format!(
                "unexpected mismatch at first database entry in range: wanted {want} at {}, stored id {} {} at {}",
                want.datestart, have.id, have.segment, have.segment.datestart
            ),
            _ => format!(
                "cannot anchor {} wanted against {} stored load segments",
                wanted.len(),
                stored.len()
            ),
        };
        return Err(TimelinesError::InconsistentAnchor(detail));
    }

    Ok(LoadSegmentChanges {
        divergence,
        to_delete: stored.get(divergence..).unwrap_or_default().to_vec(),
        to_insert: wanted.get(divergence..).unwrap_or_default().to_vec(),
    })
}
