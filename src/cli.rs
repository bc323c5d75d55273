//! CLI argument parsing.
//!
//! The catalog CLI is intentionally thin: one positional input path with a
//! fixed default, no flags. Everything else (cache location, output paths,
//! pacing) is a fixed property of a run so that two runs over the same input
//! are comparable.

use crate::builder::DEFAULT_INPUT;
use clap::Parser;
use std::path::PathBuf;

/// Catalog builder entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "mapscout",
    version,
    about = "Probe ArcGIS REST services and score layers for parcel enrichment"
)]
pub struct RootArgs {
    /// CSV of candidate service links (header row required)
    #[arg(value_name = "INPUT", default_value = DEFAULT_INPUT)]
    pub input: PathBuf,
}
