use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{DateStamp, LoadSegment, ProcessingRecord, ProvenanceStore, TimelinesError};

/// Known corrections applied before reconciliation.
///
/// Both steps must be deterministic and idempotent: running them twice on the
/// same input leaves the same feed and the same provenance tables.
pub trait RepairHook {
    /// Corrective writes to the provenance tables. Skipped in a dry run.
    ///
    /// # Errors
    /// Returns [`TimelinesError::Store`] when a write fails.
    fn repair_provenance(&self, store: &mut dyn ProvenanceStore) -> Result<(), TimelinesError>;

    /// Returns the corrected feed, still ordered by `(datestart, scs)`.
    ///
    /// # Errors
    /// Implementation specific.
    fn repair_feed(&self, feed: Vec<LoadSegment>) -> Result<Vec<LoadSegment>, TimelinesError>;
}

/// Applies no corrections.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRepairs;

impl RepairHook for NoRepairs {
    fn repair_provenance(&self, _store: &mut dyn ProvenanceStore) -> Result<(), TimelinesError> {
        Ok(())
    }

    fn repair_feed(&self, feed: Vec<LoadSegment>) -> Result<Vec<LoadSegment>, TimelinesError> {
        Ok(feed)
    }
}

/// One edit to the feed, matched on `(name, year)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LoadCorrection {
    /// Removes a load that was never run.
    Drop { name: String, year: i32 },
    /// Overrides individual fields of a load.
    Amend {
        name: String,
        year: i32,
        #[serde(default)]
        datestart: Option<DateStamp>,
        #[serde(default)]
        datestop: Option<DateStamp>,
        #[serde(default)]
        scs: Option<i64>,
        #[serde(default)]
        fixed_by_hand: Option<bool>,
    },
    /// Swaps a load for the one that actually ran.
    Replace {
        name: String,
        year: i32,
        with: LoadSegment,
    },
    /// Adds a load missing from the feed when the feed spans its start.
    InsertMissing { load: LoadSegment },
}

impl LoadCorrection {
    fn apply(&self, mut feed: Vec<LoadSegment>) -> Vec<LoadSegment> {
        match self {
            Self::Drop { name, year } => {
                feed.retain(|load| !load.is_named(name, *year));
            }
            Self::Amend {
                name,
                year,
                datestart,
                datestop,
                scs,
                fixed_by_hand,
            } => {
                for load in feed.iter_mut().filter(|load| load.is_named(name, *year)) {
                    if let Some(datestart) = datestart {
                        load.datestart = *datestart;
                    }
                    if let Some(datestop) = datestop {
                        load.datestop = *datestop;
                    }
                    if let Some(scs) = scs {
                        load.scs = *scs;
                    }
                    if let Some(fixed_by_hand) = fixed_by_hand {
                        load.fixed_by_hand = *fixed_by_hand;
                    }
                }
            }
            Self::Replace { name, year, with } => {
                let before = feed.len();
                feed.retain(|load| !load.is_named(name, *year));
                if feed.len() != before {
                    feed.push(with.clone());
                }
            }
            Self::InsertMissing { load } => {
                let spans = matches!(
                    (feed.first(), feed.last()),
                    (Some(first), Some(last))
                        if first.datestart <= load.datestart && last.datestart > load.datestart
                );
                if spans && !feed.iter().any(|have| have.is_named(&load.name, load.year)) {
                    feed.push(load.clone());
                }
            }
        }
        feed
    }

    fn validate(&self) -> Result<(), TimelinesError> {
        let load = match self {
            Self::Replace { with, .. } => with,
            Self::InsertMissing { load } => load,
            Self::Drop { .. } | Self::Amend { .. } => return Ok(()),
        };
        if load.datestart > load.datestop {
            return Err(TimelinesError::Configuration(format!(
                "repair load {load} starts after it stops"
            )));
        }
        Ok(())
    }
}

/// Corrective write to `tl_processing`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProcessingOverride {
    DeleteDir { dir: String },
    /// Replaces whatever the record's directory held before this plan ran.
    Insert { record: ProcessingRecord },
}

/// Declarative repair plan, loadable from YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepairPlan {
    pub processing: Vec<ProcessingOverride>,
    pub loads: Vec<LoadCorrection>,
}

impl RepairPlan {
    /// Corrections known to be needed for the historical feed.
    ///
    /// # Errors
    /// Never fails for the built-in dates; kept fallible because the dates
    /// go through [`DateStamp::parse`].
    pub fn historical() -> Result<Self, TimelinesError> {
        let load = |name: &str, year: i32, start: &str, stop: &str, scs: i64| {
            Ok::<_, TimelinesError>(LoadSegment {
                name: name.to_string(),
                year,
                datestart: DateStamp::parse(start)?,
                datestop: DateStamp::parse(stop)?,
                scs,
                fixed_by_hand: true,
            })
        };

        Ok(Self {
            processing: Vec::new(),
            loads: vec![
                LoadCorrection::Drop {
                    name: "CL304:0504".to_string(),
                    year: 2003,
                },
                LoadCorrection::Amend {
                    name: "CL352:1208".to_string(),
                    year: 2008,
                    datestart: None,
                    datestop: Some(DateStamp::parse("2008:353:05:00:00.000")?),
                    scs: None,
                    fixed_by_hand: Some(true),
                },
                LoadCorrection::Replace {
                    name: "CL110:1409".to_string(),
                    year: 2003,
                    with: load(
                        "CL110:1404",
                        2003,
                        "2003:110:14:07:09.439",
                        "2003:112:00:00:31.542",
                        130,
                    )?,
                },
                LoadCorrection::InsertMissing {
                    load: load(
                        "CL188:0402",
                        2009,
                        "2009:188:04:00:00.000",
                        "2009:188:20:57:33.571",
                        129,
                    )?,
                },
                LoadCorrection::InsertMissing {
                    load: load(
                        "CL103:2002",
                        2011,
                        "2011:103:20:40:00.000",
                        "2011:103:22:57:00.000",
                        129,
                    )?,
                },
            ],
        })
    }

    /// # Errors
    /// Returns [`TimelinesError::Configuration`] for a correction carrying an
    /// inverted interval or an override with an empty directory.
    pub fn validate(&self) -> Result<(), TimelinesError> {
        for correction in &self.loads {
            correction.validate()?;
        }
        for item in &self.processing {
            let dir = match item {
                ProcessingOverride::DeleteDir { dir } => dir,
                ProcessingOverride::Insert { record } => &record.dir,
            };
            if dir.trim().is_empty() {
                return Err(TimelinesError::Configuration(
                    "processing override dir MUST be non-empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl RepairHook for RepairPlan {
    fn repair_provenance(&self, store: &mut dyn ProvenanceStore) -> Result<(), TimelinesError> {
        let mut dirs = BTreeSet::new();
        for item in &self.processing {
            match item {
                ProcessingOverride::DeleteDir { dir } => dirs.insert(dir.as_str()),
                ProcessingOverride::Insert { record } => dirs.insert(record.dir.as_str()),
            };
        }
        for dir in dirs {
            let removed = store.delete_processing_for_dir(dir)?;
            tracing::info!(dir, removed, "cleared tl_processing rows");
        }
        for item in &self.processing {
            if let ProcessingOverride::Insert { record } = item {
                tracing::info!(dir = %record.dir, file = %record.file, "inserting tl_processing row");
                store.insert_processing(record)?;
            }
        }
        Ok(())
    }

    fn repair_feed(&self, feed: Vec<LoadSegment>) -> Result<Vec<LoadSegment>, TimelinesError> {
        self.validate()?;
        let mut feed = self
            .loads
            .iter()
            .fold(feed, |feed, correction| correction.apply(feed));
        feed.sort_by(|lhs, rhs| (lhs.datestart, lhs.scs).cmp(&(rhs.datestart, rhs.scs)));
        Ok(feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn load(name: &str, year: i32, start: &str, stop: &str) -> LoadSegment {
        LoadSegment {
            name: name.to_string(),
            year,
            datestart: must_ok(DateStamp::parse(start)),
            datestop: must_ok(DateStamp::parse(stop)),
            scs: 128,
            fixed_by_hand: false,
        }
    }

    fn names(feed: &[LoadSegment]) -> Vec<&str> {
        feed.iter().map(|load| load.name.as_str()).collect()
    }

    #[test]
    fn historical_plan_fixes_known_loads() {
        let plan = must_ok(RepairPlan::historical());
        let feed = vec![
            load("CL110:1409", 2003, "2003:110:14:00:00.000", "2003:112:00:00:00.000"),
            load("CL304:0504", 2003, "2003:304:05:00:00.000", "2003:305:00:00:00.000"),
            load("CL352:1208", 2008, "2008:352:12:00:00.000", "2008:359:00:00:00.000"),
        ];

        let repaired = must_ok(plan.repair_feed(feed));

        assert_eq!(names(&repaired), vec!["CL110:1404", "CL352:1208"]);
        assert_eq!(
            repaired[1].datestop.to_string(),
            "2008:353:05:00:00.000"
        );
        assert!(repaired.iter().all(|load| load.fixed_by_hand));
    }

    #[test]
    fn missing_load_is_inserted_only_inside_feed_span() {
        let plan = must_ok(RepairPlan::historical());
        let spanning = vec![
            load("CL101:0000", 2011, "2011:101:00:00:00.000", "2011:103:20:40:00.000"),
            load("CL103:2300", 2011, "2011:103:23:00:00.000", "2011:107:00:00:00.000"),
        ];
        let repaired = must_ok(plan.repair_feed(spanning));
        assert_eq!(names(&repaired), vec!["CL101:0000", "CL103:2002", "CL103:2300"]);

        let again = must_ok(plan.repair_feed(repaired.clone()));
        assert_eq!(again, repaired);

        let later = vec![
            load("CL110:0000", 2011, "2011:110:00:00:00.000", "2011:111:00:00:00.000"),
            load("CL111:0000", 2011, "2011:111:00:00:00.000", "2011:112:00:00:00.000"),
        ];
        assert_eq!(must_ok(plan.repair_feed(later.clone())), later);
    }

    #[test]
    fn yaml_plan_round_trips_through_hook() {
        let yaml = r#"
processing:
  - action: insert
    record:
      year: 2008
      dir: /2008/FEB1808/oflsb/
      file: C048_0802.sum
loads:
  - action: drop
    name: CL001:0000
    year: 2010
"#;
        let plan: RepairPlan = must_ok(serde_yaml::from_str(yaml));
        let mut store = InMemoryStore::default();
        must_ok(plan.repair_provenance(&mut store));
        must_ok(plan.repair_provenance(&mut store));
        assert_eq!(store.processing_records().len(), 1);
        assert_eq!(store.processing_records()[0].file, "C048_0802.sum");

        let feed = vec![
            load("CL001:0000", 2010, "2010:001:00:00:00.000", "2010:002:00:00:00.000"),
            load("CL002:0000", 2010, "2010:002:00:00:00.000", "2010:003:00:00:00.000"),
        ];
        assert_eq!(names(&must_ok(plan.repair_feed(feed))), vec!["CL002:0000"]);
    }

    #[test]
    fn inverted_interval_is_a_configuration_error() {
        let mut broken = load("CL001:0000", 2010, "2010:002:00:00:00.000", "2010:001:00:00:00.000");
        broken.fixed_by_hand = true;
        let plan = RepairPlan {
            processing: Vec::new(),
            loads: vec![LoadCorrection::InsertMissing { load: broken }],
        };
        assert!(matches!(
            plan.repair_feed(Vec::new()),
            Err(TimelinesError::Configuration(_))
        ));
    }
}
