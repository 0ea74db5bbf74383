//! Index construction binary: reads a graph in the `p sp` text format,
//! builds the contraction index and the shortcut DAG, and persists both
//! next to a JSON metadata file.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{
    Context,
    Result,
};
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use spc_oracle::{
    logging,
    ContractionIndex,
};
use tracing::info;

/// Build the distance and shortest-path-count index for a road network.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input graph in the `p sp <n> <m>` / `a <u> <v> <w>` text format.
    graph: PathBuf,

    /// Output prefix; writes `<prefix>_cl` (contraction index),
    /// `<prefix>_gs` (shortcut DAG) and `<prefix>_meta.json`.
    output_prefix: String,

    /// Balance bound for the recursive partitioning (range 0.0-0.5).
    #[arg(long, default_value_t = 0.2, value_parser = parse_balance)]
    balance: f64,

    /// Logging verbosity level (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    /// Also write a human-readable JSON dump of every label.
    #[arg(long)]
    export_json: Option<PathBuf>,
}

/// Custom parser for `balance` to enforce the range (0.0, 0.5].
fn parse_balance(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|_| format!("'{s}' isn't a valid float number"))?;
    if val > 0.0 && val <= 0.5 {
        Ok(val)
    } else {
        Err(format!("value must be in (0.0, 0.5], got: {val}"))
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    logging::setup(&args.verbosity);

    let mut g = spc_oracle::load_graph(&args.graph)?;
    let node_count = g.node_count();
    let edge_count = g.edge_count();

    let start = Instant::now();
    let closest = g.contract();
    info!(core = g.node_count(), "degree-1 contraction done");
    let mut ci = g.create_cut_index(args.balance);
    g.reset();
    let ch = g.build_shortcut_graph(&mut ci, &closest);
    let index = ContractionIndex::new(ci, &closest);
    let build_seconds = start.elapsed().as_secs_f64();

    let stats = index.stats();
    info!(
        size_mb = stats.index_bytes / (1024 * 1024),
        labels = stats.labels,
        height = stats.height,
        seconds = build_seconds,
        "created index"
    );

    let cl_path = format!("{}_cl", args.output_prefix);
    let mut cl_out = BufWriter::new(File::create(&cl_path).with_context(|| format!("creating {cl_path}"))?);
    index.write(&mut cl_out).context("writing contraction index")?;

    let gs_path = format!("{}_gs", args.output_prefix);
    let mut gs_out = BufWriter::new(File::create(&gs_path).with_context(|| format!("creating {gs_path}"))?);
    ch.write(&mut gs_out).context("writing shortcut graph")?;

    let metadata = json!({
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "graph": args.graph.display().to_string(),
        "nodes": node_count,
        "edges": edge_count,
        "balance": args.balance,
        "build_seconds": build_seconds,
        "dag_edges": ch.edge_count(),
        "index": stats,
    });
    let meta_path = format!("{}_meta.json", args.output_prefix);
    std::fs::write(&meta_path, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("writing {meta_path}"))?;

    if let Some(path) = &args.export_json {
        let mut out = BufWriter::new(File::create(path).with_context(|| format!("creating {}", path.display()))?);
        index.export_json(&mut out).context("exporting labels as JSON")?;
    }

    Ok(())
}
