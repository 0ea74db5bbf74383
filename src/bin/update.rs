//! Update binary: loads the graph, the contraction index and the shortcut
//! DAG, applies a batch of edge-weight changes (halved for decreases,
//! increased by half for increases) and repairs the index in place with the
//! chosen maintenance variant.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{
    Context,
    Result,
};
use clap::{
    Parser,
    ValueEnum,
};
use spc_oracle::{
    logging,
    ContractionIndex,
    EdgeUpdate,
    PendantUpdate,
    ShortcutGraph,
};
use tracing::info;

/// Direction of the weight change applied to every update line.
#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    /// Multiply each weight by 0.5.
    #[value(name = "d")]
    Decrease,
    /// Multiply each weight by 1.5.
    #[value(name = "i")]
    Increase,
}

/// Which label-repair implementation to run.
#[derive(Clone, Copy, ValueEnum)]
enum Variant {
    /// One bucket queue, one update at a time.
    Sequential,
    /// In-place pending markers coalescing converging updates.
    Optimized,
    /// One thread group working distinct label slots concurrently.
    Parallel,
}

/// Apply edge-weight updates to a built index.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input graph the index was built from.
    graph: PathBuf,

    /// Index prefix used at build time; reads `<prefix>_cl` and
    /// `<prefix>_gs`.
    index_prefix: String,

    /// Update file: one `u v w` triple per line.
    updates: PathBuf,

    /// Weight-change direction: `d` (decrease) or `i` (increase).
    #[arg(value_enum)]
    direction: Direction,

    /// Label-repair implementation.
    #[arg(long, value_enum, default_value = "sequential")]
    variant: Variant,

    /// Logging verbosity level (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    logging::setup(&args.verbosity);

    let mut g = spc_oracle::load_graph(&args.graph)?;

    let cl_path = format!("{}_cl", args.index_prefix);
    let file = File::open(&cl_path).with_context(|| format!("opening index file {cl_path}"))?;
    let mut index = ContractionIndex::read(&mut BufReader::new(file)).context("reading contraction index")?;

    let gs_path = format!("{}_gs", args.index_prefix);
    let file = File::open(&gs_path).with_context(|| format!("opening shortcut file {gs_path}"))?;
    let mut ch = ShortcutGraph::read(&mut BufReader::new(file)).context("reading shortcut graph")?;

    let mut updates: Vec<EdgeUpdate> = Vec::new();
    let mut pendant_updates: Vec<PendantUpdate> = Vec::new();
    for (a, b, weight) in spc_oracle::read_updates(&args.updates)? {
        let new_weight = match args.direction {
            Direction::Decrease => weight / 2,
            Direction::Increase => weight + weight / 2,
        };
        g.update_edge(a, b, new_weight);
        g.update_edge(b, a, new_weight);

        // Changes on pendant-chain edges shift contraction offsets instead
        // of labels.
        if index.is_contracted(a) || index.is_contracted(b) {
            let x = index.get_contraction_label(a);
            let y = index.get_contraction_label(b);
            if x.distance_offset > y.distance_offset {
                pendant_updates.push(PendantUpdate {
                    node: a,
                    old_offset: x.distance_offset,
                    new_offset: y.distance_offset + new_weight,
                });
            } else if x.distance_offset < y.distance_offset {
                pendant_updates.push(PendantUpdate {
                    node: b,
                    old_offset: y.distance_offset,
                    new_offset: x.distance_offset + new_weight,
                });
            }
            continue;
        }
        updates.push(EdgeUpdate { a, b, old: weight, new: new_weight });
    }

    let start = Instant::now();
    match (args.direction, args.variant) {
        (Direction::Decrease, Variant::Sequential) => g.propagate_decrease(&mut ch, &index, &updates),
        (Direction::Decrease, Variant::Optimized) => g.propagate_decrease_optimized(&mut ch, &index, &updates),
        (Direction::Decrease, Variant::Parallel) => g.propagate_decrease_parallel(&mut ch, &index, &updates),
        (Direction::Increase, Variant::Sequential) => g.propagate_increase(&mut ch, &index, &updates),
        (Direction::Increase, Variant::Optimized) => g.propagate_increase_optimized(&mut ch, &index, &updates),
        (Direction::Increase, Variant::Parallel) => g.propagate_increase_parallel(&mut ch, &index, &updates),
    }
    g.propagate_pendant_updates(&mut index, pendant_updates);
    let elapsed = start.elapsed().as_secs_f64();
    info!(updates = updates.len(), seconds = elapsed, "applied updates");

    Ok(())
}
