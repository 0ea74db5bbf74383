//! The shortcut DAG: upward edges carrying `(distance, path count)`, built
//! bottom-up over the finalized decomposition. The DAG both fills the final
//! label arrays and supports incremental maintenance after edge-weight
//! changes.

use std::io::{
    Read,
    Write,
};

use anyhow::{
    Context,
    Result,
};
use tracing::{
    info,
    instrument,
};

use crate::graph::{
    Graph,
    PARALLEL_SEARCHES,
};
use crate::index::CutIndex;
use crate::io::{
    read_u16,
    read_u32,
    read_u64,
    write_u16,
    write_u32,
    write_u64,
};
use crate::model::{
    add_distance,
    Distance,
    Neighbor,
    NodeID,
    PathCount,
    INFINITY,
};
use crate::sync::{
    ParBucketQueue,
    SharedCell,
};

/// `dist_index` sentinel for vertices not present in the DAG (contracted
/// pendants and degenerate cores without label slots).
pub const CONTRACTED: u16 = u16::MAX;

/// An upward DAG edge: target vertex with strictly smaller `dist_index`,
/// shortest distance restricted to lower-index intermediates, and the
/// number of such shortest paths.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct UpEdge {
    /// Target vertex.
    pub node: NodeID,
    /// Edge / shortcut distance.
    pub distance: Distance,
    /// Shortest-path count at that distance.
    pub paths: PathCount,
}

/// Per-vertex DAG state.
#[derive(Clone, Debug)]
pub struct ShortcutNode {
    /// The vertex's label slot within its own cut; [`CONTRACTED`] when the
    /// vertex is not in the DAG.
    pub dist_index: u16,
    /// Upward edges, deduplicated by target.
    pub up: Vec<UpEdge>,
    /// Sorted back-references: vertices having this one as an up target.
    pub down: Vec<NodeID>,
}

impl Default for ShortcutNode {
    fn default() -> Self {
        Self { dist_index: CONTRACTED, up: Vec::new(), down: Vec::new() }
    }
}

/// The shortcut DAG over all core vertices.
pub struct ShortcutGraph {
    /// Entry per vertex id; slot 0 unused.
    pub(crate) nodes: Vec<ShortcutNode>,
}

impl ShortcutGraph {
    /// The label-slot index of `v`.
    pub(crate) fn dist_index(&self, v: NodeID) -> u16 {
        self.nodes[v as usize].dist_index
    }

    /// The up edge `v → w`; panics if absent (a violated DAG invariant).
    pub(crate) fn up_edge(&self, v: NodeID, w: NodeID) -> UpEdge {
        *self.nodes[v as usize]
            .up
            .iter()
            .find(|e| e.node == w)
            .expect("missing shortcut edge")
    }

    /// Mutable access to the up edge `v → w`.
    pub(crate) fn up_edge_mut(&mut self, v: NodeID, w: NodeID) -> &mut UpEdge {
        self.nodes[v as usize]
            .up
            .iter_mut()
            .find(|e| e.node == w)
            .expect("missing shortcut edge")
    }

    /// Total number of upward edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.up.len()).sum()
    }

    /// Approximate in-memory size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.dist_index != CONTRACTED)
            .map(|n| 8 + n.up.len() * 10 + n.down.len() * 4)
            .sum()
    }

    /// Writes the DAG in the fixed little-endian on-disk format.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u64(w, self.nodes.len() as u64)?;
        for node in &self.nodes[1..] {
            write_u16(w, node.dist_index)?;
            if node.dist_index == CONTRACTED {
                continue;
            }
            write_u64(w, node.up.len() as u64)?;
            for e in &node.up {
                write_u32(w, e.node)?;
                write_u32(w, e.distance)?;
                write_u16(w, e.paths)?;
            }
            write_u64(w, node.down.len() as u64)?;
            for &d in &node.down {
                write_u32(w, d)?;
            }
        }
        Ok(())
    }

    /// Reads a DAG written by [`Self::write`].
    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let node_count = read_u64(r).context("reading shortcut graph node count")? as usize;
        let mut nodes = vec![ShortcutNode::default(); node_count];
        for node in nodes.iter_mut().skip(1) {
            node.dist_index = read_u16(r)?;
            if node.dist_index == CONTRACTED {
                continue;
            }
            let up_count = read_u64(r)? as usize;
            node.up.reserve(up_count);
            for _ in 0..up_count {
                node.up.push(UpEdge { node: read_u32(r)?, distance: read_u32(r)?, paths: read_u16(r)? });
            }
            let down_count = read_u64(r)? as usize;
            node.down.reserve(down_count);
            for _ in 0..down_count {
                node.down.push(read_u32(r)?);
            }
        }
        Ok(Self { nodes })
    }
}

impl Graph {
    /// Builds the shortcut DAG over the core vertices and fills the final
    /// label arrays (distances and path counts) of `ci` by bottom-up
    /// propagation.
    ///
    /// `closest` is the contraction table from [`Graph::contract`]; pendant
    /// vertices stay out of the DAG.
    #[instrument(skip_all, fields(nodes = self.node_count()))]
    pub fn build_shortcut_graph(&self, ci: &mut Vec<CutIndex>, closest: &[Neighbor]) -> ShortcutGraph {
        let mut ch = ShortcutGraph { nodes: vec![ShortcutNode::default(); self.max_node_id() + 1] };
        let mut bottom_up: Vec<NodeID> = Vec::new();
        for &node in &self.nodes {
            if closest[node as usize].node != node {
                continue;
            }
            let entry = &mut ci[node as usize];
            let label_count = entry.dist_index[entry.cut_level as usize] as usize;
            // A core vertex without label slots (single-vertex core) stays
            // out of the DAG like a contracted one.
            if let Some(own_slot) = label_count.checked_sub(1) {
                ch.nodes[node as usize].dist_index = own_slot as u16;
                bottom_up.push(node);
                // Discard the transient separator labels from the
                // hierarchy; propagation recomputes every slot.
                entry.distances.clear();
                entry.distances.resize(own_slot, INFINITY);
                entry.paths.clear();
                entry.paths.resize(own_slot, 0);
            }
        }
        // Seed with the upward original edges.
        for &node in &bottom_up {
            for n in self.neighbors(node) {
                if closest[n.node as usize].node == n.node
                    && ch.nodes[n.node as usize].dist_index < ch.nodes[node as usize].dist_index
                {
                    ch.nodes[node as usize].up.push(UpEdge { node: n.node, distance: n.distance, paths: 1 });
                    let slot = ch.nodes[n.node as usize].dist_index as usize;
                    let entry = &mut ci[node as usize];
                    entry.distances[slot] = n.distance;
                    entry.paths[slot] = 1;
                }
            }
        }
        // Close the DAG bottom-up: for every vertex, combine each pair of
        // up edges into a shortcut between their targets.
        bottom_up.sort_unstable_by(|&a, &b| ch.nodes[b as usize].dist_index.cmp(&ch.nodes[a as usize].dist_index));
        for &node in &bottom_up {
            let mut up = std::mem::take(&mut ch.nodes[node as usize].up);
            {
                // Within one up list, equal slot indices imply the same
                // target, so sorting groups duplicates; the best entry (min
                // distance, then max count) comes first and survives.
                let slot_of = |v: NodeID| ch.nodes[v as usize].dist_index;
                up.sort_unstable_by(|a, b| {
                    slot_of(b.node)
                        .cmp(&slot_of(a.node))
                        .then(a.distance.cmp(&b.distance))
                        .then(b.paths.cmp(&a.paths))
                });
            }
            up.dedup_by(|next, kept| next.node == kept.node);
            for i in 0..up.len() {
                for j in i + 1..up.len() {
                    let weight = add_distance(up[i].distance, up[j].distance);
                    let count = up[i].paths.wrapping_mul(up[j].paths);
                    let target = up[i].node as usize;
                    let slot = ch.nodes[up[j].node as usize].dist_index as usize;
                    let entry = &mut ci[target];
                    if weight < entry.distances[slot] {
                        entry.distances[slot] = weight;
                        entry.paths[slot] = count;
                        ch.nodes[target].up.push(UpEdge { node: up[j].node, distance: weight, paths: count });
                    } else if weight == entry.distances[slot] {
                        entry.paths[slot] = entry.paths[slot].wrapping_add(count);
                        ch.nodes[target].up.push(UpEdge {
                            node: up[j].node,
                            distance: weight,
                            paths: entry.paths[slot],
                        });
                    }
                }
            }
            for e in &up {
                ch.nodes[e.node as usize].down.push(node);
            }
            ch.nodes[node as usize].up = up;
        }
        // Sorted back-references allow two-pointer intersection during
        // maintenance.
        for &node in &bottom_up {
            ch.nodes[node as usize].down.sort_unstable();
        }
        // Propagate label values top-down (ascending slot index): every
        // ancestor slot of an up target improves the vertex's own slots.
        if bottom_up.is_empty() {
            return ch;
        }
        if self.node_count() > self.thread_threshold() {
            self.fill_labels_parallel(&ch, ci, &bottom_up);
        } else {
            for &node in bottom_up.iter().rev() {
                for e in &ch.nodes[node as usize].up {
                    for anc in 0..ch.nodes[e.node as usize].dist_index as usize {
                        let d_anc = ci[e.node as usize].distances[anc];
                        let p_anc = ci[e.node as usize].paths[anc];
                        let dist = add_distance(e.distance, d_anc);
                        let count = e.paths.wrapping_mul(p_anc);
                        let entry = &mut ci[node as usize];
                        if dist < entry.distances[anc] {
                            entry.distances[anc] = dist;
                            entry.paths[anc] = count;
                        } else if dist == entry.distances[anc] {
                            entry.paths[anc] = entry.paths[anc].wrapping_add(count);
                        }
                    }
                }
                let entry = &mut ci[node as usize];
                entry.distances.push(0);
                entry.paths.push(1);
            }
        }
        info!(dag_nodes = bottom_up.len(), dag_edges = ch.edge_count(), "shortcut graph constructed");
        ch
    }

    /// Parallel label propagation over a barrier-synchronized bucket list
    /// keyed by slot index; a bucket only starts after all smaller-index
    /// buckets finished, so every read of an up target's labels sees final
    /// values.
    fn fill_labels_parallel(&self, ch: &ShortcutGraph, ci: &mut Vec<CutIndex>, bottom_up: &[NodeID]) {
        let mut queue = ParBucketQueue::new(PARALLEL_SEARCHES);
        for &node in bottom_up {
            queue.push(node, ch.nodes[node as usize].dist_index as usize);
        }
        let slots: Vec<SharedCell<CutIndex>> = std::mem::take(ci).into_iter().map(SharedCell::new).collect();
        {
            let queue = &queue;
            let slots = &slots;
            std::thread::scope(|scope| {
                for _ in 0..PARALLEL_SEARCHES {
                    scope.spawn(move || {
                        while let Some(x) = queue.next() {
                            for e in &ch.nodes[x as usize].up {
                                for anc in 0..ch.nodes[e.node as usize].dist_index as usize {
                                    let d_anc = slots[e.node as usize].as_ref().distances[anc];
                                    let p_anc = slots[e.node as usize].as_ref().paths[anc];
                                    let dist = add_distance(e.distance, d_anc);
                                    let count = e.paths.wrapping_mul(p_anc);
                                    let entry = slots[x as usize].as_mut();
                                    if dist < entry.distances[anc] {
                                        entry.distances[anc] = dist;
                                        entry.paths[anc] = count;
                                    } else if dist == entry.distances[anc] {
                                        entry.paths[anc] = entry.paths[anc].wrapping_add(count);
                                    }
                                }
                            }
                            let entry = slots[x as usize].as_mut();
                            entry.distances.push(0);
                            entry.paths.push(1);
                        }
                    });
                }
            });
        }
        *ci = slots.into_iter().map(SharedCell::into_inner).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(edges: &[(NodeID, NodeID, Distance)], n: usize) -> (Graph, Vec<CutIndex>, ShortcutGraph) {
        let mut g = Graph::new(n);
        for &(a, b, d) in edges {
            g.add_edge(a, b, d, true);
        }
        let closest = g.contract();
        let mut ci = g.create_cut_index(0.25);
        g.reset();
        let ch = g.build_shortcut_graph(&mut ci, &closest);
        (g, ci, ch)
    }

    #[test]
    fn up_edges_point_to_smaller_slots() {
        let (g, _ci, ch) = build(&[(1, 2, 1), (1, 3, 1), (2, 4, 1), (3, 4, 1)], 4);
        for &v in g.get_nodes() {
            let node = &ch.nodes[v as usize];
            if node.dist_index == CONTRACTED {
                continue;
            }
            for e in &node.up {
                assert!(
                    ch.nodes[e.node as usize].dist_index < node.dist_index,
                    "up edge {v} -> {} does not descend",
                    e.node
                );
            }
        }
    }

    #[test]
    fn labels_match_prefix_sums_after_fill() {
        let (g, ci, ch) = build(&[(1, 2, 1), (2, 3, 1), (3, 4, 1), (4, 1, 1), (1, 3, 2)], 4);
        for &v in g.get_nodes() {
            if ch.nodes[v as usize].dist_index == CONTRACTED {
                continue;
            }
            let entry = &ci[v as usize];
            assert_eq!(entry.distances.len(), entry.label_count());
            assert_eq!(entry.paths.len(), entry.label_count());
            // The self slot closes every label block.
            assert_eq!(*entry.distances.last().unwrap(), 0);
            assert_eq!(*entry.paths.last().unwrap(), 1);
        }
    }

    #[test]
    fn diamond_shortcut_carries_both_paths() {
        let (_g, ci, ch) = build(&[(1, 2, 1), (1, 3, 1), (2, 4, 1), (3, 4, 1)], 4);
        // Between the two non-separator vertices the separator slots carry
        // two tied shortest paths in some direction; find any label slot
        // with count 2.
        let doubled = ci.iter().any(|e| e.paths.iter().any(|&p| p == 2));
        assert!(doubled, "no label slot accumulated the tied paths");
        assert!(ch.edge_count() > 0);
    }

    #[test]
    fn dag_round_trips_through_bytes() {
        let (_g, _ci, ch) = build(&[(1, 2, 1), (2, 3, 1), (3, 4, 1), (4, 5, 1), (5, 1, 1)], 5);
        let mut bytes = Vec::new();
        ch.write(&mut bytes).unwrap();
        let back = ShortcutGraph::read(&mut bytes.as_slice()).unwrap();
        let mut bytes2 = Vec::new();
        back.write(&mut bytes2).unwrap();
        assert_eq!(bytes, bytes2);
        assert_eq!(back.edge_count(), ch.edge_count());
        for (a, b) in ch.nodes.iter().zip(&back.nodes) {
            assert_eq!(a.dist_index, b.dist_index);
            assert_eq!(a.up, b.up);
            assert_eq!(a.down, b.down);
        }
    }
}
