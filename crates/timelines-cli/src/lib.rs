//! Command surface for load segment and timeline reconciliation.
//!
//! - [`run_cli`] executes a fully parsed command line.
//! - [`run_update`] runs one reconciliation pass against an open store and
//!   returns its [`PassReport`].
//!
//! Every command prints JSON on stdout; logs go to stderr.

pub mod feed;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::json;
use timelines_core::{
    run_pass, DateStamp, PassReport, ReconcileConfig, RepairPlan, TimelineStore,
};
use timelines_store_sqlite::SqliteTimelineStore;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "timelines")]
#[command(about = "Load segment and timeline reconciliation")]
pub struct Cli {
    #[arg(long, env = "TIMELINES_DB", default_value = "./timelines.sqlite3")]
    db: PathBuf,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or migrate the database schema.
    Init,
    /// Reconcile the stored tables against the newest load segment feed.
    Update(UpdateArgs),
    /// Print stored load segments and timelines from a date.
    Show(ShowArgs),
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[arg(long, env = "TIMELINES_LOADSEG_DIR")]
    loadseg_rdb_dir: PathBuf,
    /// YAML file with `ReconcileConfig` fields.
    #[arg(long)]
    config: Option<PathBuf>,
    /// YAML repair plan applied after the historical corrections.
    #[arg(long)]
    repairs: Option<PathBuf>,
    /// Skip the built-in historical load corrections.
    #[arg(long)]
    no_historical_repairs: bool,
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    test: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(long)]
    from: String,
}

/// Installs the stderr `tracing` subscriber.
///
/// # Errors
/// Returns an error when a global subscriber is already installed.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to initialise logging: {err}"))
}

/// Executes a parsed command line.
///
/// # Errors
/// Returns an error when the store cannot be opened or migrated, or the
/// requested command fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let mut store = SqliteTimelineStore::open(&cli.db)?;
    store.migrate()?;
    match cli.command {
        Command::Init => {
            let output = json!({
                "db": cli.db.display().to_string(),
                "schema_version": store.schema_version()?,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Update(args) => {
            let report = run_update(&args, &mut store)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Show(args) => {
            let from = DateStamp::parse(&args.from)
                .with_context(|| format!("invalid --from date: {}", args.from))?;
            let output = json!({
                "load_segments": store.load_segments_from(&from)?,
                "timelines": store.timelines_ending_from(&from)?,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Runs one reconciliation pass inside a single store transaction.
///
/// # Errors
/// Returns an error when inputs cannot be loaded or the pass fails; a failed
/// pass leaves the store as it was.
pub fn run_update(args: &UpdateArgs, store: &mut SqliteTimelineStore) -> Result<PassReport> {
    let config = load_config(args)?;
    let plan = load_repairs(args)?;
    let (file, feed) = feed::read_feed(&args.loadseg_rdb_dir)?;
    tracing::info!(
        file = %file.display(),
        records = feed.len(),
        dry_run = config.dry_run,
        "updating load segments"
    );

    store
        .with_transaction(|store| run_pass(store, feed, &plan, &config))
        .context("reconciliation pass failed; no changes were written")
}

fn load_config(args: &UpdateArgs) -> Result<ReconcileConfig> {
    let mut config = match &args.config {
        Some(path) => read_yaml::<ReconcileConfig>(path)?,
        None => ReconcileConfig::default(),
    };
    config.dry_run |= args.dryrun;
    config.test_mode |= args.test;
    config.validate()?;
    Ok(config)
}

fn load_repairs(args: &UpdateArgs) -> Result<RepairPlan> {
    let mut plan = if args.no_historical_repairs {
        RepairPlan::default()
    } else {
        RepairPlan::historical()?
    };
    if let Some(path) = &args.repairs {
        let extra = read_yaml::<RepairPlan>(path)?;
        plan.processing.extend(extra.processing);
        plan.loads.extend(extra.loads);
    }
    plan.validate()?;
    Ok(plan)
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("invalid YAML in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use timelines_core::{BuiltLoad, LoadCorrection, ProcessingRecord, ProvenanceStore};

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err:#}"),
        }
    }

    fn execute_cli(args: &[&str]) -> Result<()> {
        let cli = Cli::try_parse_from(args)?;
        run_cli(cli)
    }

    fn stamp(day: u32) -> DateStamp {
        must(DateStamp::parse(&format!("2010:{day:03}:00:00:00.000")).map_err(anyhow::Error::from))
    }

    fn write_feed(dir: &Path, days: &[u32]) {
        let mut text = String::from("LOADSEG.NAME\tTStart (GMT)\tTStop (GMT)\tLOADSEG.SCS\nS\tS\tS\tN\n");
        for day in days {
            text.push_str(&format!(
                "CL{day:03}:0000\t{}\t{}\t128\n",
                stamp(*day),
                stamp(day + 1)
            ));
        }
        must(fs::write(dir.join("loads.rdb"), text).map_err(anyhow::Error::from));
    }

    fn seed_provenance(db: &Path, days: std::ops::RangeInclusive<u32>) {
        let mut store = must(SqliteTimelineStore::open(db));
        must(store.migrate());
        for day in days {
            let file = format!("C{day:03}_0001.sum");
            must(store.insert_built_load(&BuiltLoad {
                file: file.clone(),
                year: 2010,
                load_segment: format!("CL{day:03}:0000"),
                first_cmd_time: stamp(day),
                last_cmd_time: stamp(day + 1),
                sumfile_modtime: f64::from(day),
            }));
            must(store.insert_processing(&ProcessingRecord {
                year: 2010,
                dir: format!("/2010/D{day:03}/oflsa/"),
                file,
                replan: false,
                bcf_cmd_count: 0,
                replan_cmds: None,
                processing_tstart: Some(stamp(day)),
                processing_tstop: Some(stamp(day + 1)),
                sumfile_modtime: f64::from(day),
            }));
        }
    }

    fn update_args(dir: &Path) -> UpdateArgs {
        UpdateArgs {
            loadseg_rdb_dir: dir.to_path_buf(),
            config: None,
            repairs: None,
            no_historical_repairs: false,
            dryrun: false,
            test: false,
        }
    }

    #[test]
    fn update_flags_parse_with_defaults() {
        let cli = must(
            Cli::try_parse_from([
                "timelines",
                "--db",
                "/tmp/t.sqlite3",
                "update",
                "--loadseg-rdb-dir",
                "/data/loads",
                "--dryrun",
                "--verbose",
            ])
            .map_err(anyhow::Error::from),
        );
        assert!(cli.verbose());
        let Command::Update(args) = cli.command else {
            panic!("expected update command");
        };
        assert!(args.dryrun);
        assert!(!args.test);
        assert!(!args.no_historical_repairs);
        assert!(args.config.is_none());
        assert_eq!(args.loadseg_rdb_dir, PathBuf::from("/data/loads"));
    }

    #[test]
    fn config_file_and_flags_combine() {
        let dir = must(tempfile::tempdir().map_err(anyhow::Error::from));
        let path = dir.path().join("config.yaml");
        must(
            fs::write(&path, "short_timeline_minutes: 30\ncompare_exclude: [scs]\n")
                .map_err(anyhow::Error::from),
        );
        let mut args = update_args(dir.path());
        args.config = Some(path);
        args.test = true;

        let config = must(load_config(&args));
        assert_eq!(config.short_timeline_minutes, 30);
        assert_eq!(config.max_separation_hours, 12);
        assert!(config.test_mode);
        assert!(!config.dry_run);
    }

    #[test]
    fn bad_config_is_rejected() {
        let dir = must(tempfile::tempdir().map_err(anyhow::Error::from));
        let path = dir.path().join("config.yaml");
        must(fs::write(&path, "max_separation_hours: 0\n").map_err(anyhow::Error::from));
        let mut args = update_args(dir.path());
        args.config = Some(path);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn repair_file_extends_historical_plan() {
        let dir = must(tempfile::tempdir().map_err(anyhow::Error::from));
        let path = dir.path().join("repairs.yaml");
        must(
            fs::write(&path, "loads:\n  - action: drop\n    name: CL010:0000\n    year: 2010\n")
                .map_err(anyhow::Error::from),
        );
        let mut args = update_args(dir.path());
        args.repairs = Some(path);

        let plan = must(load_repairs(&args));
        let historical = must(RepairPlan::historical().map_err(anyhow::Error::from));
        assert_eq!(plan.loads.len(), historical.loads.len() + 1);
        assert!(matches!(
            plan.loads.last(),
            Some(LoadCorrection::Drop { name, year: 2010 }) if name == "CL010:0000"
        ));
    }

    #[test]
    fn historical_repairs_apply_unless_opted_out() {
        let dir = must(tempfile::tempdir().map_err(anyhow::Error::from));
        let historical = must(RepairPlan::historical().map_err(anyhow::Error::from));
        let mut args = update_args(dir.path());
        assert_eq!(must(load_repairs(&args)), historical);

        args.no_historical_repairs = true;
        assert_eq!(must(load_repairs(&args)), RepairPlan::default());

        let cli = must(
            Cli::try_parse_from([
                "timelines",
                "update",
                "--loadseg-rdb-dir",
                "/data/loads",
                "--no-historical-repairs",
            ])
            .map_err(anyhow::Error::from),
        );
        let Command::Update(args) = cli.command else {
            panic!("expected update command");
        };
        assert!(args.no_historical_repairs);
    }

    #[test]
    fn update_bootstraps_then_settles() {
        let dir = must(tempfile::tempdir().map_err(anyhow::Error::from));
        let db = dir.path().join("timelines.sqlite3");
        let feed_dir = dir.path().join("loads");
        must(fs::create_dir(&feed_dir).map_err(anyhow::Error::from));
        write_feed(&feed_dir, &[10, 11, 12]);
        seed_provenance(&db, 10..=12);

        let mut store = must(SqliteTimelineStore::open(&db));
        let mut args = update_args(&feed_dir);
        args.test = true;
        let first = must(run_update(&args, &mut store));
        assert_eq!(first.load_segments_inserted.len(), 3);
        assert_eq!(first.timelines_inserted.len(), 3);

        args.test = false;
        let second = must(run_update(&args, &mut store));
        assert!(second.is_noop(), "{second:?}");
        assert_eq!(must(store.count_load_segments()), 3);
    }

    #[test]
    fn empty_database_needs_test_flag() {
        let dir = must(tempfile::tempdir().map_err(anyhow::Error::from));
        let db = dir.path().join("timelines.sqlite3");
        let feed_dir = dir.path().join("loads");
        must(fs::create_dir(&feed_dir).map_err(anyhow::Error::from));
        write_feed(&feed_dir, &[10, 11]);
        seed_provenance(&db, 10..=11);

        let mut store = must(SqliteTimelineStore::open(&db));
        assert!(run_update(&update_args(&feed_dir), &mut store).is_err());
        assert_eq!(must(store.count_load_segments()), 0);
        assert!(must(store.processing_for("C010_0001.sum", 10.0)).is_some());
    }

    #[test]
    fn init_and_show_run_end_to_end() {
        let dir = must(tempfile::tempdir().map_err(anyhow::Error::from));
        let db = dir.path().join("timelines.sqlite3");
        let db = db.to_string_lossy().to_string();
        must(execute_cli(&["timelines", "--db", db.as_str(), "init"]));
        must(execute_cli(&[
            "timelines",
            "--db",
            db.as_str(),
            "show",
            "--from",
            "2010:001:00:00:00.000",
        ]));
        assert!(execute_cli(&["timelines", "--db", db.as_str(), "show", "--from", "yesterday"]).is_err());
    }
}
