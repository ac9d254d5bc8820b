//! Load segment feed ingestion from tab separated RDB tables.
//!
//! An RDB file is a header line of column names, a line of column types, then
//! one tab separated row per load segment. Lines starting with `#` are
//! comments.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use timelines_core::{DateStamp, LoadSegment};

const NAME_COLUMN: &str = "LOADSEG.NAME";
const START_COLUMN: &str = "TStart (GMT)";
const STOP_COLUMN: &str = "TStop (GMT)";
const SCS_COLUMN: &str = "LOADSEG.SCS";

/// The newest feed file in `dir`, by maximum file name.
///
/// # Errors
/// Returns an error when the directory cannot be read or holds no files.
pub fn latest_feed_file(dir: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read load segment directory {}", dir.display()))?;
    let mut newest: Option<PathBuf> = None;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to list {}", dir.display()))?
            .path();
        if !path.is_file() {
            continue;
        }
        let newer = match &newest {
            Some(current) => path.file_name() > current.file_name(),
            None => true,
        };
        if newer {
            newest = Some(path);
        }
    }
    newest.ok_or_else(|| anyhow!("no load segment files in {}", dir.display()))
}

/// Reads the newest RDB file in `dir`.
///
/// # Errors
/// Returns an error when no file exists or the newest one cannot be parsed.
pub fn read_feed(dir: &Path) -> Result<(PathBuf, Vec<LoadSegment>)> {
    let path = latest_feed_file(dir)?;
    tracing::debug!(file = %path.display(), "reading load segment feed");
    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let loads = parse_rdb(&text).with_context(|| format!("invalid RDB file {}", path.display()))?;
    Ok((path, loads))
}

/// Parses RDB text into feed records sorted by `(datestart, scs)`.
///
/// # Errors
/// Returns an error when a required column is missing or a row is malformed.
pub fn parse_rdb(text: &str) -> Result<Vec<LoadSegment>> {
    let mut lines = text
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| anyhow!("missing header line"))?
        .split('\t')
        .map(str::trim)
        .collect();
    lines.next().ok_or_else(|| anyhow!("missing column type line"))?;

    let column = |name: &str| -> Result<usize> {
        header
            .iter()
            .position(|candidate| *candidate == name)
            .ok_or_else(|| anyhow!("missing column {name}"))
    };
    let (name_at, start_at, stop_at, scs_at) = (
        column(NAME_COLUMN)?,
        column(START_COLUMN)?,
        column(STOP_COLUMN)?,
        column(SCS_COLUMN)?,
    );

    let mut loads = Vec::new();
    for (index, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        let field = |at: usize| -> Result<&str> {
            fields
                .get(at)
                .copied()
                .ok_or_else(|| anyhow!("row {} has only {} fields", index + 1, fields.len()))
        };
        let datestart = DateStamp::parse(field(start_at)?)
            .with_context(|| format!("row {}: bad {START_COLUMN}", index + 1))?;
        let scs = field(scs_at)?
            .parse::<i64>()
            .with_context(|| format!("row {}: bad {SCS_COLUMN}", index + 1))?;
        loads.push(LoadSegment {
            name: field(name_at)?.to_string(),
            year: datestart.year(),
            datestart,
            datestop: DateStamp::parse(field(stop_at)?)
                .with_context(|| format!("row {}: bad {STOP_COLUMN}", index + 1))?,
            scs,
            fixed_by_hand: false,
        });
    }

    loads.sort_by(|a, b| (a.datestart, a.scs).cmp(&(b.datestart, b.scs)));
    Ok(loads)
}
