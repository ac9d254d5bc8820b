use std::sync::OnceLock;

use regex::Regex;

use crate::{
    BuiltLoad, LoadSegment, ProcessingRecord, Provenance, ProvenanceStore, TimelinesError,
};

const SEGMENT_CODE_PATTERN: &str = r"(CL\d{3}:\d{4})";
const REPLAN_CODE_PATTERN: &str = r"C(\d{3}).?(\d{4})";

static SEGMENT_CODE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
static REPLAN_CODE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// Resolves the built-product / processing chain behind a load segment.
pub struct ProvenanceResolver<'a, P: ProvenanceStore + ?Sized> {
    source: &'a P,
}

impl<'a, P: ProvenanceStore + ?Sized> ProvenanceResolver<'a, P> {
    pub fn new(source: &'a P) -> Self {
        Self { source }
    }

    /// Finds the newest built product for a load segment, falling back to a
    /// containment match on the embedded `CLddd:hhmm` code.
    ///
    /// # Errors
    /// Returns [`TimelinesError::NotFound`] carrying `year,name` when neither
    /// lookup succeeds or the name has no segment code.
    pub fn resolve_built(&self, load: &LoadSegment) -> Result<BuiltLoad, TimelinesError> {
        if let Some(built) = self.source.latest_built_load(&load.name, load.year)? {
            return Ok(built);
        }

        let Some(code) = capture(compiled(&SEGMENT_CODE, SEGMENT_CODE_PATTERN)?, &load.name)
            .and_then(|captures| captures.into_iter().next())
        else {
            return Err(TimelinesError::not_found(
                "built load (name has no CLddd:hhmm code)",
                load.to_string(),
            ));
        };

        tracing::debug!(load = %load, code = %code, "no exact built load, trying code match");
        self.source
            .latest_built_load_containing(&code, load.year)?
            .ok_or_else(|| TimelinesError::not_found("built load", load.to_string()))
    }

    /// # Errors
    /// Returns [`TimelinesError::NotFound`] when the built file has no
    /// processing summary at the same modification time.
    pub fn resolve_processing(
        &self,
        built: &BuiltLoad,
    ) -> Result<ProcessingRecord, TimelinesError> {
        self.source
            .processing_for(&built.file, built.sumfile_modtime)?
            .ok_or_else(|| {
                TimelinesError::not_found(
                    "processing",
                    format!("built file {} (modtime {})", built.file, built.sumfile_modtime),
                )
            })
    }

    /// Maps a replan source label (`C123:1029`, `C014_0293`) onto the
    /// directory of the newest product built from that file in `year`.
    ///
    /// Processing records that are themselves replans sourced from this
    /// label are skipped.
    ///
    /// # Errors
    /// Returns [`TimelinesError::NotFound`] when the label has no code or no
    /// matching product exists.
    pub fn resolve_replan_dir(&self, replan_cmds: &str, year: i32) -> Result<String, TimelinesError> {
        let key = format!("{year},{replan_cmds}");
        let Some(groups) = capture(compiled(&REPLAN_CODE, REPLAN_CODE_PATTERN)?, replan_cmds) else {
            return Err(TimelinesError::not_found(
                "replan source (label has no Cddd?hhmm code)",
                key,
            ));
        };
        let [day, serial] = groups.as_slice() else {
            return Err(TimelinesError::not_found("replan source", key));
        };

        self.source
            .processing_matching_code(day, serial, year)?
            .into_iter()
            .find(|record| !(record.replan && record.replan_cmds.as_deref() == Some(replan_cmds)))
            .map(|record| record.dir)
            .ok_or_else(|| TimelinesError::not_found("replan source", key))
    }

    /// # Errors
    /// Propagates [`Self::resolve_built`] and [`Self::resolve_processing`] failures.
    pub fn resolve(&self, load: &LoadSegment) -> Result<Provenance, TimelinesError> {
        let built = self.resolve_built(load)?;
        let processing = self.resolve_processing(&built)?;
        Ok(Provenance { built, processing })
    }
}

fn compiled(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    pattern: &str,
) -> Result<&'static Regex, TimelinesError> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|err| TimelinesError::Configuration(format!("bad pattern {pattern}: {err}")))
}

fn capture(regex: &Regex, text: &str) -> Option<Vec<String>> {
    regex.captures(text).map(|captures| {
        captures
            .iter()
            .skip(1)
            .flatten()
            .map(|group| group.as_str().to_string())
            .collect()
    })
}
