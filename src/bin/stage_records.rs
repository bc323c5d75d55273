//! Bulk-import CLI: parse vendor property exports into normalized staging
//! rows, written as JSON lines for the downstream upsert.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mapscout::staging::{import_avm, import_recorder, ImportSummary, JsonlSink};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mapscout-stage",
    version,
    about = "Stage bulk property-record exports as normalized JSON lines"
)]
struct RootArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage an AVM valuation export
    Avm(StageArgs),
    /// Stage a RECORDER deed export
    Recorder(StageArgs),
}

#[derive(Parser, Debug)]
struct StageArgs {
    /// Vendor CSV export to stage
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output path for the staging rows (JSON lines)
    #[arg(long, value_name = "PATH")]
    out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = RootArgs::parse();
    let (label, stage_args) = match &args.command {
        Command::Avm(stage_args) => ("AVM", stage_args),
        Command::Recorder(stage_args) => ("RECORDER", stage_args),
    };
    println!("Importing {label} data...");

    let file = File::create(&stage_args.out)
        .with_context(|| format!("create {}", stage_args.out.display()))?;
    let mut sink = JsonlSink::new(BufWriter::new(file));
    let summary = match &args.command {
        Command::Avm(_) => import_avm(&stage_args.input, &mut sink)?,
        Command::Recorder(_) => import_recorder(&stage_args.input, &mut sink)?,
    };
    sink.into_inner()
        .flush()
        .with_context(|| format!("flush {}", stage_args.out.display()))?;
    report(label, &summary);
    Ok(())
}

fn report(label: &str, summary: &ImportSummary) {
    println!(
        "Imported {} {label} records ({} skipped)",
        summary.imported, summary.skipped
    );
}
