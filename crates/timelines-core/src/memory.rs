use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use crate::{
    BuiltLoad, DateStamp, LoadSegmentId, ProcessingRecord, ProvenanceStore, StoredLoadSegment,
    StoredTimeline, TimelineId, TimelineStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CommandRow {
    timeline_id: TimelineId,
    params: usize,
}

/// Map-backed store with the same ordering semantics as the SQLite store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    load_segments: BTreeMap<LoadSegmentId, StoredLoadSegment>,
    timelines: BTreeMap<TimelineId, StoredTimeline>,
    commands: BTreeMap<i64, CommandRow>,
    built_loads: Vec<BuiltLoad>,
    processing: Vec<ProcessingRecord>,
}

impl InMemoryStore {
    pub fn add_built_load(&mut self, built: BuiltLoad) {
        self.built_loads.push(built);
    }

    pub fn add_processing(&mut self, record: ProcessingRecord) {
        self.processing.push(record);
    }

    /// Adds a generated command row with `params` parameter rows; returns its id.
    pub fn add_command(&mut self, timeline_id: TimelineId, params: usize) -> i64 {
        let id = self.commands.keys().next_back().map_or(1, |last| last + 1);
        self.commands.insert(
            id,
            CommandRow {
                timeline_id,
                params,
            },
        );
        id
    }

    #[must_use]
    pub fn command_count(&self, timeline_id: TimelineId) -> usize {
        self.commands
            .values()
            .filter(|row| row.timeline_id == timeline_id)
            .count()
    }

    #[must_use]
    pub fn command_param_count(&self) -> usize {
        self.commands.values().map(|row| row.params).sum()
    }

    /// All load segments ordered by `(datestart, scs)`.
    #[must_use]
    pub fn load_segments(&self) -> Vec<StoredLoadSegment> {
        let mut rows: Vec<StoredLoadSegment> = self.load_segments.values().cloned().collect();
        rows.sort_by(|lhs, rhs| {
            (lhs.segment.datestart, lhs.segment.scs).cmp(&(rhs.segment.datestart, rhs.segment.scs))
        });
        rows
    }

    /// All timelines ordered by `(datestart, load_segment_id)`.
    #[must_use]
    pub fn timelines(&self) -> Vec<StoredTimeline> {
        let mut rows: Vec<StoredTimeline> = self.timelines.values().cloned().collect();
        sort_timelines(&mut rows);
        rows
    }

    #[must_use]
    pub fn processing_records(&self) -> &[ProcessingRecord] {
        &self.processing
    }
}

fn sort_timelines(rows: &mut [StoredTimeline]) {
    rows.sort_by(|lhs, rhs| {
        (lhs.timeline.datestart, lhs.timeline.load_segment_id)
            .cmp(&(rhs.timeline.datestart, rhs.timeline.load_segment_id))
    });
}

fn newest_first<T>(rows: &mut [T], modtime: impl Fn(&T) -> f64) {
    rows.sort_by(|lhs, rhs| modtime(rhs).total_cmp(&modtime(lhs)));
}

impl TimelineStore for InMemoryStore {
    fn max_load_segment_id(&self) -> Result<i64> {
        Ok(self.load_segments.keys().next_back().map_or(0, |id| id.0))
    }

    fn count_load_segments(&self) -> Result<usize> {
        Ok(self.load_segments.len())
    }

    fn load_segments_from(&self, from: &DateStamp) -> Result<Vec<StoredLoadSegment>> {
        Ok(self
            .load_segments()
            .into_iter()
            .filter(|row| row.segment.datestart >= *from)
            .collect())
    }

    fn insert_load_segment(&mut self, load: &StoredLoadSegment) -> Result<()> {
        if self.load_segments.contains_key(&load.id) {
            return Err(anyhow!("duplicate load segment id {}", load.id));
        }
        self.load_segments.insert(load.id, load.clone());
        Ok(())
    }

    fn delete_load_segment(&mut self, id: LoadSegmentId) -> Result<()> {
        self.load_segments.remove(&id);
        Ok(())
    }

    fn max_timeline_id(&self) -> Result<i64> {
        Ok(self.timelines.keys().next_back().map_or(0, |id| id.0))
    }

    fn timeline(&self, id: TimelineId) -> Result<Option<StoredTimeline>> {
        Ok(self.timelines.get(&id).cloned())
    }

    fn timelines_for_load_segment(&self, id: LoadSegmentId) -> Result<Vec<StoredTimeline>> {
        Ok(self
            .timelines()
            .into_iter()
            .filter(|row| row.timeline.load_segment_id == id)
            .collect())
    }

    fn timelines_ending_from(&self, from: &DateStamp) -> Result<Vec<StoredTimeline>> {
        Ok(self
            .timelines()
            .into_iter()
            .filter(|row| row.timeline.datestop >= *from)
            .collect())
    }

    fn timelines_starting_after(&self, after: &DateStamp) -> Result<Vec<StoredTimeline>> {
        Ok(self
            .timelines()
            .into_iter()
            .filter(|row| row.timeline.datestart > *after)
            .collect())
    }

    fn insert_timeline(&mut self, timeline: &StoredTimeline) -> Result<()> {
        if self.timelines.contains_key(&timeline.id) {
            return Err(anyhow!("duplicate timeline id {}", timeline.id));
        }
        self.timelines.insert(timeline.id, timeline.clone());
        Ok(())
    }

    fn delete_timeline(&mut self, id: TimelineId) -> Result<()> {
        self.timelines.remove(&id);
        Ok(())
    }

    fn delete_commands_for_timeline(&mut self, id: TimelineId) -> Result<usize> {
        let before = self.commands.len();
        self.commands.retain(|_, row| row.timeline_id != id);
        Ok(before - self.commands.len())
    }
}

impl ProvenanceStore for InMemoryStore {
    fn latest_built_load(&self, load_segment: &str, year: i32) -> Result<Option<BuiltLoad>> {
        let mut rows: Vec<BuiltLoad> = self
            .built_loads
            .iter()
            .filter(|row| row.load_segment == load_segment && row.year == year)
            .cloned()
            .collect();
        newest_first(&mut rows, |row| row.sumfile_modtime);
        Ok(rows.into_iter().next())
    }

    fn latest_built_load_containing(&self, code: &str, year: i32) -> Result<Option<BuiltLoad>> {
        let mut rows: Vec<BuiltLoad> = self
            .built_loads
            .iter()
            .filter(|row| row.load_segment.contains(code) && row.year == year)
            .cloned()
            .collect();
        newest_first(&mut rows, |row| row.sumfile_modtime);
        Ok(rows.into_iter().next())
    }

    fn processing_for(&self, file: &str, sumfile_modtime: f64) -> Result<Option<ProcessingRecord>> {
        #[allow(clippy::float_cmp)]
        let mut rows: Vec<ProcessingRecord> = self
            .processing
            .iter()
            .filter(|row| row.file == file && row.sumfile_modtime == sumfile_modtime)
            .cloned()
            .collect();
        rows.sort_by(|lhs, rhs| rhs.dir.cmp(&lhs.dir));
        Ok(rows.into_iter().next())
    }

    fn processing_matching_code(
        &self,
        day: &str,
        serial: &str,
        year: i32,
    ) -> Result<Vec<ProcessingRecord>> {
        let prefix = format!("C{day}");
        let suffix = format!("{serial}.sum");
        let mut rows: Vec<ProcessingRecord> = self
            .processing
            .iter()
            .filter(|row| {
                row.year == year
                    && row.file.len() >= prefix.len() + suffix.len()
                    && row.file.starts_with(&prefix)
                    && row.file.ends_with(&suffix)
            })
            .cloned()
            .collect();
        newest_first(&mut rows, |row| row.sumfile_modtime);
        Ok(rows)
    }

    fn delete_processing_for_dir(&mut self, dir: &str) -> Result<usize> {
        let before = self.processing.len();
        self.processing.retain(|row| row.dir != dir);
        Ok(before - self.processing.len())
    }

    fn insert_processing(&mut self, record: &ProcessingRecord) -> Result<()> {
        self.processing.push(record.clone());
        Ok(())
    }
}
