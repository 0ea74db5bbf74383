//! Text and binary input/output: the `p sp` graph format, query and update
//! files, and the fixed-width little-endian primitives the persisted index
//! formats are built from.

use std::fs::File;
use std::io::{
    BufRead,
    BufReader,
    Read,
    Write,
};
use std::path::Path;

use anyhow::{
    bail,
    Context,
    Result,
};
use tracing::info;

use crate::graph::Graph;
use crate::model::{
    Distance,
    NodeID,
};

/// Reads a graph in the text format
///
/// ```text
/// p sp <n> <m>
/// a <u> <v> <w>
/// ```
///
/// Lines with unknown ids are skipped; duplicate undirected edges keep the
/// minimum weight; isolated vertices are removed.
pub fn read_graph<R: BufRead>(reader: R) -> Result<Graph> {
    let mut graph: Option<Graph> = None;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.context("reading graph input")?;
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("p") => {
                // "p sp <n> <m>"
                let n: usize = tokens
                    .nth(1)
                    .with_context(|| format!("line {}: problem line without node count", lineno + 1))?
                    .parse()
                    .with_context(|| format!("line {}: malformed node count", lineno + 1))?;
                graph = Some(Graph::new(n));
            },
            Some("a") => {
                let g = graph
                    .as_mut()
                    .with_context(|| format!("line {}: edge before problem line", lineno + 1))?;
                let mut next = |what: &str| {
                    tokens
                        .next()
                        .with_context(|| format!("line {}: missing {what}", lineno + 1))?
                        .parse::<u32>()
                        .with_context(|| format!("line {}: malformed {what}", lineno + 1))
                };
                let v: NodeID = next("source")?;
                let w: NodeID = next("target")?;
                let d: Distance = next("weight")?;
                g.add_edge(v, w, d, true);
            },
            // Unknown line ids (comments etc.) are ignored.
            _ => {},
        }
    }
    let mut g = graph.context("graph input contains no problem line")?;
    g.remove_isolated();
    Ok(g)
}

/// Reads a graph file from disk.
pub fn load_graph<P: AsRef<Path>>(path: P) -> Result<Graph> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening graph file {}", path.display()))?;
    let g = read_graph(BufReader::new(file)).with_context(|| format!("parsing graph file {}", path.display()))?;
    info!(nodes = g.node_count(), edges = g.edge_count(), "loaded graph");
    Ok(g)
}

/// Writes a graph back out in the text format, edges sorted.
pub fn write_graph<W: Write>(g: &Graph, w: &mut W) -> Result<()> {
    let mut edges = g.get_edges();
    edges.sort_unstable();
    writeln!(w, "p sp {} {}", g.node_count(), edges.len())?;
    for e in edges {
        writeln!(w, "a {} {} {}", e.a, e.b, e.d)?;
    }
    Ok(())
}

/// Reads a query file: one `u v` pair per line.
pub fn read_queries<P: AsRef<Path>>(path: P) -> Result<Vec<(NodeID, NodeID)>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening query file {}", path.display()))?;
    let mut queries = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let parse = |token: Option<&str>| -> Result<NodeID> {
            token
                .with_context(|| format!("line {}: incomplete query", lineno + 1))?
                .parse()
                .with_context(|| format!("line {}: malformed query", lineno + 1))
        };
        queries.push((parse(tokens.next())?, parse(tokens.next())?));
    }
    Ok(queries)
}

/// Reads an update file: one `u v w` triple per line.
pub fn read_updates<P: AsRef<Path>>(path: P) -> Result<Vec<(NodeID, NodeID, Distance)>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening update file {}", path.display()))?;
    let mut updates = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let mut parse = || -> Result<u32> {
            tokens
                .next()
                .with_context(|| format!("line {}: incomplete update", lineno + 1))?
                .parse()
                .with_context(|| format!("line {}: malformed update", lineno + 1))
        };
        updates.push((parse()?, parse()?, parse()?));
    }
    Ok(updates)
}

// ----- fixed-width little-endian primitives ---------------------------------

/// Reads a little-endian `u16`.
pub(crate) fn read_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Reads a little-endian `u32`.
pub(crate) fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads a little-endian `u64`.
pub(crate) fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads exactly `len` bytes.
pub(crate) fn read_exact_bytes<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Writes a little-endian `u16`.
pub(crate) fn write_u16<W: Write>(w: &mut W, value: u16) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Writes a little-endian `u32`.
pub(crate) fn write_u32<W: Write>(w: &mut W, value: u32) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Writes a little-endian `u64`.
pub(crate) fn write_u64<W: Write>(w: &mut W, value: u64) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_graph_skipping_unknown_lines() {
        let input = "c a comment line\np sp 4 3\na 1 2 5\nc mid-file comment\na 2 3 7\na 1 2 3\nx whatever\n";
        let g = read_graph(input.as_bytes()).unwrap();
        // Vertex 4 is isolated and removed; duplicate edge keeps weight 3.
        assert_eq!(g.get_nodes(), &[1, 2, 3]);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.get_distance(1, 3, true), 10);
    }

    #[test]
    fn malformed_edge_line_is_an_error() {
        assert!(read_graph("p sp 2 1\na 1 x 5\n".as_bytes()).is_err());
        assert!(read_graph("a 1 2 5\n".as_bytes()).is_err());
    }

    #[test]
    fn graph_round_trips_through_text() {
        let mut g = Graph::new(3);
        g.add_edge(1, 2, 4, true);
        g.add_edge(2, 3, 6, true);
        let mut out = Vec::new();
        write_graph(&g, &mut out).unwrap();
        let back = read_graph(out.as_slice()).unwrap();
        assert_eq!(back.get_edges(), g.get_edges());
    }

    #[test]
    fn primitives_round_trip() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0xBEEF).unwrap();
        write_u32(&mut buf, 0xDEAD_BEEF).unwrap();
        write_u64(&mut buf, 0x0123_4567_89AB_CDEF).unwrap();
        let mut r = buf.as_slice();
        assert_eq!(read_u16(&mut r).unwrap(), 0xBEEF);
        assert_eq!(read_u32(&mut r).unwrap(), 0xDEAD_BEEF);
        assert_eq!(read_u64(&mut r).unwrap(), 0x0123_4567_89AB_CDEF);
    }
}
