use anyhow::Result;
use clap::Parser;
use mapscout::builder::{build_catalog, CatalogPaths};
use mapscout::cache::DirStore;
use mapscout::cli::RootArgs;
use mapscout::fetch::{Fetcher, UreqTransport};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = RootArgs::parse();
    let paths = CatalogPaths::with_input(args.input);
    let fetcher = Fetcher::new(
        Box::new(DirStore::new(&paths.cache_dir)),
        Box::new(UreqTransport::new()),
    );
    build_catalog(&paths, &fetcher)?;
    Ok(())
}
