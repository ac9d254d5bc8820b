use std::collections::BTreeMap;

use crate::{LoadSegment, PassLog, PassWarning, ReconcileConfig};

/// Logs data-quality warnings for a feed ordered by `(datestart, scs)`.
///
/// Consecutive records further apart than `max_separation_hours` warn
/// [`PassWarning::Separation`]; consecutive records on the same channel that
/// overlap by more than `overlap_tolerance_minutes` warn
/// [`PassWarning::Overlap`]. Nothing here is fatal.
pub fn check_load_overlap(feed: &[LoadSegment], config: &ReconcileConfig, log: &mut PassLog) {
    let max_separation = config.max_separation();
    for pair in feed.windows(2) {
        let [earlier, later] = pair else { continue };
        if later.datestart.since(&earlier.datestop) > max_separation {
            log.warn(PassWarning::Separation {
                earlier: earlier.to_string(),
                later: later.to_string(),
                hours: config.max_separation_hours,
            });
        }
    }

    let mut by_channel: BTreeMap<i64, Vec<&LoadSegment>> = BTreeMap::new();
    for load in feed {
        by_channel.entry(load.scs).or_default().push(load);
    }

    let tolerance = config.overlap_tolerance();
    for (scs, loads) in by_channel {
        for pair in loads.windows(2) {
            let [earlier, later] = pair else { continue };
            let overlap = earlier.datestop.since(&later.datestart);
            if overlap > tolerance {
                log.warn(PassWarning::Overlap {
                    scs,
                    earlier: earlier.to_string(),
                    later: later.to_string(),
                    minutes: overlap.whole_minutes(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DateStamp;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn load(name: &str, start: &str, stop: &str, scs: i64) -> LoadSegment {
        LoadSegment {
            name: name.to_string(),
            year: 2010,
            datestart: must_ok(DateStamp::parse(start)),
            datestop: must_ok(DateStamp::parse(stop)),
            scs,
            fixed_by_hand: false,
        }
    }

    #[test]
    fn back_to_back_loads_are_quiet() {
        let feed = vec![
            load("CL001:0000", "2010:001:00:00:00.000", "2010:002:00:00:00.000", 128),
            load("CL002:0000", "2010:002:00:00:00.000", "2010:003:00:00:00.000", 129),
            load("CL003:0000", "2010:003:00:00:00.000", "2010:004:00:00:00.000", 128),
        ];
        let mut log = PassLog::new();
        check_load_overlap(&feed, &ReconcileConfig::default(), &mut log);
        assert!(log.warnings().is_empty());
    }

    #[test]
    fn long_gap_warns_separation() {
        let feed = vec![
            load("CL001:0000", "2010:001:00:00:00.000", "2010:002:00:00:00.000", 128),
            load("CL003:0000", "2010:003:00:00:00.000", "2010:004:00:00:00.000", 129),
        ];
        let mut log = PassLog::new();
        check_load_overlap(&feed, &ReconcileConfig::default(), &mut log);
        assert!(matches!(
            log.warnings(),
            [PassWarning::Separation { hours: 12, .. }]
        ));
    }

    #[test]
    fn same_channel_overlap_beyond_tolerance_warns() {
        let feed = vec![
            load("CL001:0000", "2010:001:00:00:00.000", "2010:002:01:00:00.000", 128),
            load("CL002:0000", "2010:002:00:00:00.000", "2010:003:00:00:00.000", 128),
            load("CL002:0010", "2010:002:00:10:00.000", "2010:003:00:00:00.000", 130),
        ];
        let mut log = PassLog::new();
        check_load_overlap(&feed, &ReconcileConfig::default(), &mut log);
        assert!(matches!(
            log.warnings(),
            [PassWarning::Overlap { scs: 128, minutes: 60, .. }]
        ));
    }

    #[test]
    fn overlap_within_tolerance_is_quiet() {
        let feed = vec![
            load("CL001:0000", "2010:001:00:00:00.000", "2010:002:00:10:00.000", 128),
            load("CL002:0000", "2010:002:00:00:00.000", "2010:003:00:00:00.000", 128),
        ];
        let mut log = PassLog::new();
        check_load_overlap(&feed, &ReconcileConfig::default(), &mut log);
        assert!(log.warnings().is_empty());
    }
}
