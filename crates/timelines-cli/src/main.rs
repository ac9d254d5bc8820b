use anyhow::Result;
use clap::Parser;
use timelines_cli::{init_logging, run_cli, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose())?;
    run_cli(cli)
}
