use crate::{
    PassLog, PassWarning, Provenance, ProvenanceResolver, ProvenanceStore, StoredLoadSegment,
    Timeline, TimelinesError,
};

/// Maps one stored load segment onto its timeline piece(s).
///
/// An ordinary load yields one piece spanning the whole segment. A load hit
/// by a replan that imported commands yields one piece when the segment sits
/// inside the processing window, or two pieces split at `processing_tstart`
/// when the replan interrupted it: the head comes from the replan source
/// directory, the tail from the replan's own directory.
///
/// # Errors
/// Returns [`TimelinesError::Derivation`] when a replan has no source label or
/// processing window, or the segment ends after the window; propagates
/// [`TimelinesError::NotFound`] from the replan source lookup.
pub fn derive_timelines<P: ProvenanceStore + ?Sized>(
    load: &StoredLoadSegment,
    provenance: &Provenance,
    resolver: &ProvenanceResolver<'_, P>,
    log: &mut PassLog,
) -> Result<Vec<Timeline>, TimelinesError> {
    let segment = &load.segment;
    let Provenance { built, processing } = provenance;

    let template = Timeline {
        load_segment_id: load.id,
        dir: Some(processing.dir.clone()),
        datestart: segment.datestart,
        datestop: segment.datestop,
        replan: processing.replan,
        incomplete: true,
    };

    let mut pieces = Vec::with_capacity(2);
    if processing.is_replan_insertion() {
        let Some(replan_cmds) = processing.replan_cmds.as_deref() else {
            return Err(TimelinesError::Derivation(format!(
                "replan/reopen load {segment} without replan_cmds source load"
            )));
        };
        let (Some(tstart), Some(tstop)) = (processing.processing_tstart, processing.processing_tstop)
        else {
            return Err(TimelinesError::Derivation(format!(
                "replan/reopen load {segment} processed in {} has no processing window",
                processing.dir
            )));
        };

        if segment.datestart >= tstart && segment.datestop <= tstop {
            pieces.push(template);
        } else if segment.datestart < tstart && segment.datestop <= tstop {
            let source_dir = resolver.resolve_replan_dir(replan_cmds, segment.year)?;
            log.warn(PassWarning::ReplanImport {
                load: segment.to_string(),
                dir: source_dir.clone(),
            });
            pieces.push(Timeline {
                datestart: tstart,
                ..template.clone()
            });
            pieces.push(Timeline {
                dir: Some(source_dir),
                datestop: tstart,
                ..template
            });
        }
    } else {
        let complete =
            segment.datestart >= built.first_cmd_time && segment.datestop <= built.last_cmd_time;
        pieces.push(Timeline {
            incomplete: !complete,
            ..template
        });
    }

    if pieces.is_empty() {
        return Err(TimelinesError::Derivation(format!(
            "no timelines derived for load {segment} ({} to {}) against processing window in {}",
            segment.datestart, segment.datestop, processing.dir
        )));
    }

    sort_pieces(&mut pieces);
    Ok(pieces)
}

/// Orders timelines by `(datestart, load_segment_id)`.
pub(crate) fn sort_pieces(pieces: &mut [Timeline]) {
    pieces.sort_by(|lhs, rhs| {
        (lhs.datestart, lhs.load_segment_id).cmp(&(rhs.datestart, rhs.load_segment_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BuiltLoad, DateStamp, InMemoryStore, LoadSegment, LoadSegmentId, ProcessingRecord,
    };
    use proptest::prelude::*;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn stamp(text: &str) -> DateStamp {
        must_ok(DateStamp::parse(text))
    }

    fn at(day: u32, minutes: u32) -> DateStamp {
        stamp(&format!(
            "2011:{day:03}:{:02}:{:02}:00.000",
            minutes / 60,
            minutes % 60
        ))
    }

    fn load(datestart: DateStamp, datestop: DateStamp) -> StoredLoadSegment {
        StoredLoadSegment {
            id: LoadSegmentId(42),
            segment: LoadSegment {
                name: "CL103:2002".to_string(),
                year: 2011,
                datestart,
                datestop,
                scs: 129,
                fixed_by_hand: false,
            },
        }
    }

    fn provenance(first: DateStamp, last: DateStamp) -> Provenance {
        Provenance {
            built: BuiltLoad {
                file: "C103_2001.sum".to_string(),
                year: 2011,
                load_segment: "CL103:2002".to_string(),
                first_cmd_time: first,
                last_cmd_time: last,
                sumfile_modtime: 1.0,
            },
            processing: ProcessingRecord {
                year: 2011,
                dir: "/2011/APR1311/oflsa/".to_string(),
                file: "C103_2001.sum".to_string(),
                replan: false,
                bcf_cmd_count: 0,
                replan_cmds: None,
                processing_tstart: Some(at(103, 0)),
                processing_tstop: Some(at(110, 0)),
                sumfile_modtime: 1.0,
            },
        }
    }

    fn replanned(mut provenance: Provenance, tstart: DateStamp) -> Provenance {
        provenance.processing.replan = true;
        provenance.processing.bcf_cmd_count = 5;
        provenance.processing.replan_cmds = Some("C098:0801".to_string());
        provenance.processing.processing_tstart = Some(tstart);
        provenance
    }

    fn replan_source_store() -> InMemoryStore {
        let mut store = InMemoryStore::default();
        store.add_processing(ProcessingRecord {
            year: 2011,
            dir: "/2011/APR0811/oflsb/".to_string(),
            file: "C098_0801.sum".to_string(),
            replan: false,
            bcf_cmd_count: 0,
            replan_cmds: None,
            processing_tstart: None,
            processing_tstop: None,
            sumfile_modtime: 1.0,
        });
        store
    }

    #[test]
    fn ordinary_load_is_complete_only_inside_built_commands() {
        let store = InMemoryStore::default();
        let resolver = ProvenanceResolver::new(&store);
        let mut log = PassLog::new();
        let segment = load(at(104, 0), at(105, 0));

        let inside = must_ok(derive_timelines(
            &segment,
            &provenance(at(103, 0), at(106, 0)),
            &resolver,
            &mut log,
        ));
        assert_eq!(inside.len(), 1);
        assert!(!inside[0].incomplete);
        assert_eq!(inside[0].dir.as_deref(), Some("/2011/APR1311/oflsa/"));
        assert_eq!((inside[0].datestart, inside[0].datestop), (at(104, 0), at(105, 0)));

        let outside = must_ok(derive_timelines(
            &segment,
            &provenance(at(104, 60), at(106, 0)),
            &resolver,
            &mut log,
        ));
        assert_eq!(outside.len(), 1);
        assert!(outside[0].incomplete);
        assert!(log.warnings().is_empty());
    }

    #[test]
    fn replan_inside_processing_window_is_one_incomplete_piece() {
        let store = InMemoryStore::default();
        let mut log = PassLog::new();
        let pieces = must_ok(derive_timelines(
            &load(at(104, 0), at(105, 0)),
            &replanned(provenance(at(103, 0), at(106, 0)), at(103, 0)),
            &ProvenanceResolver::new(&store),
            &mut log,
        ));
        assert_eq!(pieces.len(), 1);
        assert!(pieces[0].incomplete);
        assert!(pieces[0].replan);
    }

    #[test]
    fn interrupted_load_splits_at_processing_start() {
        let store = replan_source_store();
        let mut log = PassLog::new();
        let tstart = at(103, 22 * 60);
        let pieces = must_ok(derive_timelines(
            &load(at(103, 20 * 60), at(104, 0)),
            &replanned(provenance(at(103, 0), at(106, 0)), tstart),
            &ProvenanceResolver::new(&store),
            &mut log,
        ));

        assert_eq!(pieces.len(), 2);
        assert_eq!((pieces[0].datestart, pieces[0].datestop), (at(103, 20 * 60), tstart));
        assert_eq!(pieces[0].dir.as_deref(), Some("/2011/APR0811/oflsb/"));
        assert_eq!((pieces[1].datestart, pieces[1].datestop), (tstart, at(104, 0)));
        assert_eq!(pieces[1].dir.as_deref(), Some("/2011/APR1311/oflsa/"));
        assert!(pieces.iter().all(|piece| piece.incomplete && piece.replan));
        assert!(matches!(
            log.warnings(),
            [PassWarning::ReplanImport { dir, .. }] if dir == "/2011/APR0811/oflsb/"
        ));
    }

    #[test]
    fn replan_without_source_label_is_fatal() {
        let store = InMemoryStore::default();
        let mut provenance = replanned(provenance(at(103, 0), at(106, 0)), at(103, 0));
        provenance.processing.replan_cmds = None;

        let result = derive_timelines(
            &load(at(104, 0), at(105, 0)),
            &provenance,
            &ProvenanceResolver::new(&store),
            &mut PassLog::new(),
        );
        assert!(matches!(result, Err(TimelinesError::Derivation(_))));
    }

    #[test]
    fn replan_ending_after_processing_window_derives_nothing() {
        let store = InMemoryStore::default();
        let result = derive_timelines(
            &load(at(104, 0), at(111, 0)),
            &replanned(provenance(at(103, 0), at(112, 0)), at(103, 0)),
            &ProvenanceResolver::new(&store),
            &mut PassLog::new(),
        );
        assert!(matches!(result, Err(TimelinesError::Derivation(_))));
    }

    #[test]
    fn missing_replan_source_is_not_found() {
        let store = InMemoryStore::default();
        let result = derive_timelines(
            &load(at(103, 20 * 60), at(104, 0)),
            &replanned(provenance(at(103, 0), at(106, 0)), at(103, 22 * 60)),
            &ProvenanceResolver::new(&store),
            &mut PassLog::new(),
        );
        assert!(matches!(result, Err(TimelinesError::NotFound { .. })));
    }

    proptest! {
        #[test]
        fn interrupted_pieces_partition_the_load(
            start in 0_u32..400,
            lead in 1_u32..400,
            tail in 0_u32..400,
        ) {
            let store = replan_source_store();
            let tstart = at(103, start + lead);
            let segment = load(at(103, start), at(103, start + lead + tail));
            let pieces = must_ok(derive_timelines(
                &segment,
                &replanned(provenance(at(103, 0), at(106, 0)), tstart),
                &ProvenanceResolver::new(&store),
                &mut PassLog::new(),
            ));

            prop_assert_eq!(pieces.len(), 2);
            prop_assert_eq!(pieces[0].datestart, segment.segment.datestart);
            prop_assert_eq!(pieces[0].datestop, tstart);
            prop_assert_eq!(pieces[1].datestart, tstart);
            prop_assert_eq!(pieces[1].datestop, segment.segment.datestop);
        }
    }
}
