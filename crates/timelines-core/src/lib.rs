//! Reconciliation of command load segments and derivation of timelines.
//!
//! A pass takes a freshly delivered, ordered list of load segments, brings the
//! stored `load_segments` table in line with it, and then re-derives the
//! `timelines` that map each load onto the directory its commands came from.
//! Rows marked `fixed_by_hand` are never removed by a pass; collisions with
//! them surface as [`PassWarning::HandFixCollision`].
//!
//! Storage is abstracted behind [`TimelineStore`] and [`ProvenanceStore`];
//! [`InMemoryStore`] implements both for previews and tests.

mod cascade;
mod checks;
mod config;
mod datestamp;
mod derive;
mod diff;
mod error;
mod loads;
mod memory;
mod model;
mod pass;
mod provenance;
mod repair;
mod store;
mod timelines;
mod warnings;

pub use cascade::{
    invalidate_for_load_segments, invalidate_timeline, invalidate_timelines, Invalidation,
};
pub use checks::check_load_overlap;
pub use config::ReconcileConfig;
pub use datestamp::DateStamp;
pub use derive::derive_timelines;
pub use diff::{find_changes, LoadSegmentChanges, LoadSegmentComparator};
pub use error::TimelinesError;
pub use loads::{update_loads, LoadUpdate};
pub use memory::InMemoryStore;
pub use model::{
    BuiltLoad, LoadSegment, LoadSegmentField, LoadSegmentId, ProcessingRecord, Provenance,
    StoredLoadSegment, StoredTimeline, Timeline, TimelineId,
};
pub use pass::{run_pass, PassReport};
pub use provenance::ProvenanceResolver;
pub use repair::{LoadCorrection, NoRepairs, ProcessingOverride, RepairHook, RepairPlan};
pub use store::{ProvenanceStore, TimelineStore};
pub use timelines::{derive_candidates, matched_prefix, update_timelines, TimelineUpdate};
pub use warnings::{PassLog, PassWarning, Table};
