//! Query binary: loads a persisted contraction index and evaluates the
//! shortest-path count for every vertex pair in a query file, one count per
//! output line.

use std::fs::File;
use std::io::{
    BufReader,
    BufWriter,
    Write,
};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{
    Context,
    Result,
};
use clap::Parser;
use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use spc_oracle::{
    logging,
    ContractionIndex,
};
use tracing::info;

/// Evaluate shortest-path-count queries against a built index.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Index prefix used at build time; reads `<prefix>_cl`.
    index_prefix: String,

    /// Query file: one `u v` pair per line.
    queries: PathBuf,

    /// Logging verbosity level (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    logging::setup(&args.verbosity);

    let cl_path = format!("{}_cl", args.index_prefix);
    let file = File::open(&cl_path).with_context(|| format!("opening index file {cl_path}"))?;
    let index = ContractionIndex::read(&mut BufReader::new(file)).context("reading contraction index")?;
    info!(nodes = index.node_count(), "loaded index");

    let queries = spc_oracle::read_queries(&args.queries)?;

    let bar = ProgressBar::new(queries.len() as u64).with_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} queries ({per_sec})").expect("static template"),
    );
    let start = Instant::now();
    let counts: Vec<u16> = queries
        .iter()
        .map(|&(u, v)| {
            bar.inc(1);
            index.get_spc(u, v)
        })
        .collect();
    bar.finish_and_clear();
    let elapsed = start.elapsed().as_secs_f64();
    info!(
        queries = queries.len(),
        seconds = elapsed,
        avg_hoplinks = index.avg_hoplinks(&queries),
        "query batch done"
    );

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for count in counts {
        writeln!(out, "{count}")?;
    }
    Ok(())
}
