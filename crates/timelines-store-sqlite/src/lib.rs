use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use timelines_core::{
    BuiltLoad, DateStamp, LoadSegment, LoadSegmentId, ProcessingRecord, ProvenanceStore,
    StoredLoadSegment, StoredTimeline, Timeline, TimelineId, TimelineStore,
};

const LATEST_SCHEMA_VERSION: i64 = 1;

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS load_segments (
  id INTEGER PRIMARY KEY,
  load_segment TEXT NOT NULL,
  year INTEGER NOT NULL,
  datestart TEXT NOT NULL,
  datestop TEXT NOT NULL,
  load_scs INTEGER NOT NULL,
  fixed_by_hand INTEGER NOT NULL DEFAULT 0 CHECK (fixed_by_hand IN (0,1))
);

CREATE TABLE IF NOT EXISTS timelines (
  id INTEGER PRIMARY KEY,
  load_segment_id INTEGER NOT NULL,
  dir TEXT,
  datestart TEXT NOT NULL,
  datestop TEXT NOT NULL,
  replan INTEGER NOT NULL DEFAULT 0 CHECK (replan IN (0,1)),
  incomplete INTEGER NOT NULL DEFAULT 0 CHECK (incomplete IN (0,1)),
  fixed_by_hand INTEGER NOT NULL DEFAULT 0 CHECK (fixed_by_hand IN (0,1))
);

CREATE TABLE IF NOT EXISTS tl_built_loads (
  file TEXT NOT NULL,
  sumfile_modtime REAL NOT NULL,
  load_segment TEXT NOT NULL,
  year INTEGER NOT NULL,
  first_cmd_time TEXT NOT NULL,
  last_cmd_time TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tl_processing (
  year INTEGER NOT NULL,
  dir TEXT NOT NULL,
  file TEXT NOT NULL,
  replan INTEGER NOT NULL DEFAULT 0 CHECK (replan IN (0,1)),
  bcf_cmd_count INTEGER NOT NULL DEFAULT 0,
  replan_cmds TEXT,
  processing_tstart TEXT,
  processing_tstop TEXT,
  sumfile_modtime REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS cmds (
  id INTEGER PRIMARY KEY,
  timeline_id INTEGER,
  date TEXT NOT NULL,
  cmd TEXT NOT NULL,
  tlmsid TEXT
);

CREATE TABLE IF NOT EXISTS cmd_intpars (
  cmd_id INTEGER NOT NULL,
  timeline_id INTEGER,
  name TEXT NOT NULL,
  value INTEGER
);

CREATE TABLE IF NOT EXISTS cmd_fltpars (
  cmd_id INTEGER NOT NULL,
  timeline_id INTEGER,
  name TEXT NOT NULL,
  value REAL
);

CREATE INDEX IF NOT EXISTS idx_load_segments_datestart ON load_segments(datestart, load_scs);
CREATE INDEX IF NOT EXISTS idx_timelines_datestart ON timelines(datestart, load_segment_id);
CREATE INDEX IF NOT EXISTS idx_timelines_load_segment ON timelines(load_segment_id);
CREATE INDEX IF NOT EXISTS idx_tl_built_loads_name ON tl_built_loads(load_segment, year);
CREATE INDEX IF NOT EXISTS idx_tl_processing_file ON tl_processing(file, sumfile_modtime);
CREATE INDEX IF NOT EXISTS idx_cmds_timeline ON cmds(timeline_id);
CREATE INDEX IF NOT EXISTS idx_cmd_intpars_timeline ON cmd_intpars(timeline_id);
CREATE INDEX IF NOT EXISTS idx_cmd_fltpars_timeline ON cmd_fltpars(timeline_id);
";

const LOAD_SEGMENT_COLUMNS: &str =
    "id, load_segment, year, datestart, datestop, load_scs, fixed_by_hand";
const TIMELINE_COLUMNS: &str =
    "id, load_segment_id, dir, datestart, datestop, replan, incomplete, fixed_by_hand";
const BUILT_LOAD_COLUMNS: &str =
    "file, year, load_segment, first_cmd_time, last_cmd_time, sumfile_modtime";
const PROCESSING_COLUMNS: &str = "year, dir, file, replan, bcf_cmd_count, replan_cmds, \
     processing_tstart, processing_tstop, sumfile_modtime";

/// `SQLite` backing store for load segments, timelines and their provenance.
pub struct SqliteTimelineStore {
    conn: Connection,
}

impl SqliteTimelineStore {
    /// Open a `SQLite` timelines database and configure runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// # Errors
    /// Returns an error when the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// # Errors
    /// Returns an error when `PRAGMA user_version` cannot be read.
    pub fn schema_version(&self) -> Result<i64> {
        self.conn
            .query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
            .context("failed to read current schema version")
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when the database is newer than this build or a
    /// migration step fails.
    pub fn migrate(&mut self) -> Result<()> {
        let version = self.schema_version()?;
        if version > LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected at most {LATEST_SCHEMA_VERSION}"
            ));
        }

        if version < 1 {
            let tx = self
                .conn
                .transaction()
                .context("failed to start migration v1 transaction")?;
            tx.execute_batch(MIGRATION_001_SQL)
                .context("failed to apply migration v1")?;
            tx.pragma_update(None, "user_version", 1_i64)
                .context("failed to record migration version 1")?;
            tx.commit().context("failed to commit migration v1")?;
            tracing::info!(version = 1, "applied timelines schema migration");
        }

        Ok(())
    }

    /// Runs `work` inside one transaction: commits when it returns `Ok`,
    /// rolls back when it returns `Err`.
    ///
    /// # Errors
    /// Returns the error from `work`, or a store error when the transaction
    /// cannot be started or committed.
    pub fn with_transaction<T, E>(
        &mut self,
        work: impl FnOnce(&mut Self) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<anyhow::Error>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .context("failed to start transaction")?;

        match work(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("COMMIT")
                    .context("failed to commit transaction")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    tracing::error!(error = %rollback, "failed to roll back transaction");
                }
                Err(err)
            }
        }
    }

    /// # Errors
    /// Returns an error when the row cannot be written.
    pub fn insert_built_load(&mut self, built: &BuiltLoad) -> Result<()> {
        self.conn
            .execute(
                &format!("INSERT INTO tl_built_loads ({BUILT_LOAD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    built.file,
                    built.year,
                    built.load_segment,
                    built.first_cmd_time.to_string(),
                    built.last_cmd_time.to_string(),
                    built.sumfile_modtime,
                ],
            )
            .context("failed to insert tl_built_loads row")?;
        Ok(())
    }

    /// Adds a generated command with its parameter rows; returns the command id.
    ///
    /// # Errors
    /// Returns an error when any row cannot be written.
    pub fn insert_command(
        &mut self,
        timeline_id: TimelineId,
        date: &DateStamp,
        cmd: &str,
        intpars: &[(&str, i64)],
        fltpars: &[(&str, f64)],
    ) -> Result<i64> {
        let tx = self.conn.transaction().context("failed to start transaction")?;
        tx.execute(
            "INSERT INTO cmds (timeline_id, date, cmd) VALUES (?1, ?2, ?3)",
            params![timeline_id.0, date.to_string(), cmd],
        )
        .context("failed to insert cmds row")?;
        let cmd_id = tx.last_insert_rowid();
        for (name, value) in intpars {
            tx.execute(
                "INSERT INTO cmd_intpars (cmd_id, timeline_id, name, value) VALUES (?1, ?2, ?3, ?4)",
                params![cmd_id, timeline_id.0, name, value],
            )
            .context("failed to insert cmd_intpars row")?;
        }
        for (name, value) in fltpars {
            tx.execute(
                "INSERT INTO cmd_fltpars (cmd_id, timeline_id, name, value) VALUES (?1, ?2, ?3, ?4)",
                params![cmd_id, timeline_id.0, name, value],
            )
            .context("failed to insert cmd_fltpars row")?;
        }
        tx.commit().context("failed to commit command transaction")?;
        Ok(cmd_id)
    }

    /// Number of `cmds`, `cmd_intpars` and `cmd_fltpars` rows for a timeline.
    ///
    /// # Errors
    /// Returns an error when the counts cannot be read.
    pub fn command_row_counts(&self, timeline_id: TimelineId) -> Result<(usize, usize, usize)> {
        let count = |table: &str| -> Result<usize> {
            let value: i64 = self
                .conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {table} WHERE timeline_id = ?1"),
                    params![timeline_id.0],
                    |row| row.get(0),
                )
                .with_context(|| format!("failed to count {table} rows"))?;
            usize::try_from(value).with_context(|| format!("negative {table} count"))
        };
        Ok((count("cmds")?, count("cmd_intpars")?, count("cmd_fltpars")?))
    }

    /// Every stored timeline, ordered by `(datestart, load_segment_id)`.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_timelines(&self) -> Result<Vec<StoredTimeline>> {
        self.query_timelines(
            &format!("SELECT {TIMELINE_COLUMNS} FROM timelines ORDER BY datestart, load_segment_id, id"),
            [],
        )
    }

    fn query_load_segments<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<StoredLoadSegment>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut loads = Vec::new();
        while let Some(row) = rows.next()? {
            loads.push(load_segment_from_row(row)?);
        }
        Ok(loads)
    }

    fn query_timelines<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<StoredTimeline>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut timelines = Vec::new();
        while let Some(row) = rows.next()? {
            timelines.push(timeline_from_row(row)?);
        }
        Ok(timelines)
    }

    fn query_built_load<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Option<BuiltLoad>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        match rows.next()? {
            Some(row) => Ok(Some(BuiltLoad {
                file: row.get(0)?,
                year: row.get(1)?,
                load_segment: row.get(2)?,
                first_cmd_time: stamp(row.get(3)?)?,
                last_cmd_time: stamp(row.get(4)?)?,
                sumfile_modtime: row.get(5)?,
            })),
            None => Ok(None),
        }
    }

    fn query_processing<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<ProcessingRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(ProcessingRecord {
                year: row.get(0)?,
                dir: row.get(1)?,
                file: row.get(2)?,
                replan: row.get(3)?,
                bcf_cmd_count: row.get(4)?,
                replan_cmds: row.get(5)?,
                processing_tstart: row.get::<_, Option<String>>(6)?.map(stamp).transpose()?,
                processing_tstop: row.get::<_, Option<String>>(7)?.map(stamp).transpose()?,
                sumfile_modtime: row.get(8)?,
            });
        }
        Ok(records)
    }

    fn max_id(&self, table: &str) -> Result<i64> {
        self.conn
            .query_row(&format!("SELECT COALESCE(MAX(id), 0) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .with_context(|| format!("failed to read max id of {table}"))
    }
}

impl TimelineStore for SqliteTimelineStore {
    fn max_load_segment_id(&self) -> Result<i64> {
        self.max_id("load_segments")
    }

    fn count_load_segments(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM load_segments", [], |row| row.get(0))
            .context("failed to count load_segments")?;
        usize::try_from(count).context("negative load_segments count")
    }

    fn load_segments_from(&self, from: &DateStamp) -> Result<Vec<StoredLoadSegment>> {
        self.query_load_segments(
            &format!(
                "SELECT {LOAD_SEGMENT_COLUMNS} FROM load_segments
                 WHERE datestart >= ?1
                 ORDER BY datestart, load_scs, id"
            ),
            params![from.to_string()],
        )
        .context("failed to read load_segments")
    }

    fn insert_load_segment(&mut self, load: &StoredLoadSegment) -> Result<()> {
        let segment = &load.segment;
        self.conn
            .execute(
                &format!("INSERT INTO load_segments ({LOAD_SEGMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    load.id.0,
                    segment.name,
                    segment.year,
                    segment.datestart.to_string(),
                    segment.datestop.to_string(),
                    segment.scs,
                    segment.fixed_by_hand,
                ],
            )
            .with_context(|| format!("failed to insert load segment {}", load.id))?;
        Ok(())
    }

    fn delete_load_segment(&mut self, id: LoadSegmentId) -> Result<()> {
        self.conn
            .execute("DELETE FROM load_segments WHERE id = ?1", params![id.0])
            .with_context(|| format!("failed to delete load segment {id}"))?;
        Ok(())
    }

    fn max_timeline_id(&self) -> Result<i64> {
        self.max_id("timelines")
    }

    fn timeline(&self, id: TimelineId) -> Result<Option<StoredTimeline>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TIMELINE_COLUMNS} FROM timelines WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id.0])?;
        match rows.next()? {
            Some(row) => Ok(Some(timeline_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn timelines_for_load_segment(&self, id: LoadSegmentId) -> Result<Vec<StoredTimeline>> {
        self.query_timelines(
            &format!(
                "SELECT {TIMELINE_COLUMNS} FROM timelines
                 WHERE load_segment_id = ?1
                 ORDER BY datestart, id"
            ),
            params![id.0],
        )
        .with_context(|| format!("failed to read timelines of load segment {id}"))
    }

    fn timelines_ending_from(&self, from: &DateStamp) -> Result<Vec<StoredTimeline>> {
        self.query_timelines(
            &format!(
                "SELECT {TIMELINE_COLUMNS} FROM timelines
                 WHERE datestop >= ?1
                 ORDER BY datestart, load_segment_id, id"
            ),
            params![from.to_string()],
        )
        .context("failed to read timelines")
    }

    fn timelines_starting_after(&self, after: &DateStamp) -> Result<Vec<StoredTimeline>> {
        self.query_timelines(
            &format!(
                "SELECT {TIMELINE_COLUMNS} FROM timelines
                 WHERE datestart > ?1
                 ORDER BY datestart, load_segment_id, id"
            ),
            params![after.to_string()],
        )
        .context("failed to read timelines")
    }

    fn insert_timeline(&mut self, timeline: &StoredTimeline) -> Result<()> {
        let row = &timeline.timeline;
        self.conn
            .execute(
                &format!("INSERT INTO timelines ({TIMELINE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    timeline.id.0,
                    row.load_segment_id.0,
                    row.dir,
                    row.datestart.to_string(),
                    row.datestop.to_string(),
                    row.replan,
                    row.incomplete,
                    timeline.fixed_by_hand,
                ],
            )
            .with_context(|| format!("failed to insert timeline {}", timeline.id))?;
        Ok(())
    }

    fn delete_timeline(&mut self, id: TimelineId) -> Result<()> {
        self.conn
            .execute("DELETE FROM timelines WHERE id = ?1", params![id.0])
            .with_context(|| format!("failed to delete timeline {id}"))?;
        Ok(())
    }

    fn delete_commands_for_timeline(&mut self, id: TimelineId) -> Result<usize> {
        for table in ["cmd_fltpars", "cmd_intpars"] {
            self.conn
                .execute(
                    &format!("DELETE FROM {table} WHERE timeline_id = ?1"),
                    params![id.0],
                )
                .with_context(|| format!("failed to delete {table} rows of timeline {id}"))?;
        }
        self.conn
            .execute("DELETE FROM cmds WHERE timeline_id = ?1", params![id.0])
            .with_context(|| format!("failed to delete cmds rows of timeline {id}"))
    }
}

impl ProvenanceStore for SqliteTimelineStore {
    fn latest_built_load(&self, load_segment: &str, year: i32) -> Result<Option<BuiltLoad>> {
        self.query_built_load(
            &format!(
                "SELECT {BUILT_LOAD_COLUMNS} FROM tl_built_loads
                 WHERE load_segment = ?1 AND year = ?2
                 ORDER BY sumfile_modtime DESC LIMIT 1"
            ),
            params![load_segment, year],
        )
        .with_context(|| format!("failed to read tl_built_loads for {year},{load_segment}"))
    }

    fn latest_built_load_containing(&self, code: &str, year: i32) -> Result<Option<BuiltLoad>> {
        self.query_built_load(
            &format!(
                "SELECT {BUILT_LOAD_COLUMNS} FROM tl_built_loads
                 WHERE load_segment LIKE ?1 AND year = ?2
                 ORDER BY sumfile_modtime DESC LIMIT 1"
            ),
            params![format!("%{code}%"), year],
        )
        .with_context(|| format!("failed to read tl_built_loads like {year},{code}"))
    }

    fn processing_for(&self, file: &str, sumfile_modtime: f64) -> Result<Option<ProcessingRecord>> {
        let records = self
            .query_processing(
                &format!(
                    "SELECT {PROCESSING_COLUMNS} FROM tl_processing
                     WHERE file = ?1 AND sumfile_modtime = ?2
                     ORDER BY dir DESC LIMIT 1"
                ),
                params![file, sumfile_modtime],
            )
            .with_context(|| format!("failed to read tl_processing for {file}"))?;
        Ok(records.into_iter().next())
    }

    fn processing_matching_code(
        &self,
        day: &str,
        serial: &str,
        year: i32,
    ) -> Result<Vec<ProcessingRecord>> {
        self.query_processing(
            &format!(
                "SELECT {PROCESSING_COLUMNS} FROM tl_processing
                 WHERE file LIKE ?1 AND year = ?2
                 ORDER BY sumfile_modtime DESC"
            ),
            params![format!("C{day}%{serial}.sum"), year],
        )
        .with_context(|| format!("failed to read tl_processing like C{day}?{serial}"))
    }

    fn delete_processing_for_dir(&mut self, dir: &str) -> Result<usize> {
        self.conn
            .execute("DELETE FROM tl_processing WHERE dir = ?1", params![dir])
            .with_context(|| format!("failed to delete tl_processing rows for {dir}"))
    }

    fn insert_processing(&mut self, record: &ProcessingRecord) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO tl_processing ({PROCESSING_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    record.year,
                    record.dir,
                    record.file,
                    record.replan,
                    record.bcf_cmd_count,
                    record.replan_cmds,
                    record.processing_tstart.map(|value| value.to_string()),
                    record.processing_tstop.map(|value| value.to_string()),
                    record.sumfile_modtime,
                ],
            )
            .with_context(|| format!("failed to insert tl_processing row for {}", record.dir))?;
        Ok(())
    }
}

fn stamp(raw: String) -> Result<DateStamp> {
    DateStamp::parse(&raw).with_context(|| format!("invalid stored date: {raw}"))
}

fn load_segment_from_row(row: &Row<'_>) -> Result<StoredLoadSegment> {
    Ok(StoredLoadSegment {
        id: LoadSegmentId(row.get(0)?),
        segment: LoadSegment {
            name: row.get(1)?,
            year: row.get(2)?,
            datestart: stamp(row.get(3)?)?,
            datestop: stamp(row.get(4)?)?,
            scs: row.get(5)?,
            fixed_by_hand: row.get(6)?,
        },
    })
}

fn timeline_from_row(row: &Row<'_>) -> Result<StoredTimeline> {
    Ok(StoredTimeline {
        id: TimelineId(row.get(0)?),
        fixed_by_hand: row.get(7)?,
        timeline: Timeline {
            load_segment_id: LoadSegmentId(row.get(1)?),
            dir: row.get(2)?,
            datestart: stamp(row.get(3)?)?,
            datestop: stamp(row.get(4)?)?,
            replan: row.get(5)?,
            incomplete: row.get(6)?,
        },
    })
}
