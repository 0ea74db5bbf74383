//! End-to-end laws of the oracle: agreement with a reference Dijkstra on
//! distances and path counts, persistence round trips, and dynamic-update
//! correctness on mutated graphs.

use std::collections::BinaryHeap;

use petgraph::algo::dijkstra;
use petgraph::graph::{
    NodeIndex,
    UnGraph,
};
use rand::rngs::StdRng;
use rand::{
    Rng,
    SeedableRng,
};
use spc_oracle::{
    ContractionIndex,
    Distance,
    EdgeUpdate,
    Graph,
    NodeID,
    PendantUpdate,
    ShortcutGraph,
    INFINITY,
};

/// Builds the full oracle pipeline over an edge list.
fn build_oracle(n: usize, edges: &[(NodeID, NodeID, Distance)]) -> (Graph, ShortcutGraph, ContractionIndex) {
    let mut g = Graph::new(n);
    for &(a, b, d) in edges {
        g.add_edge(a, b, d, true);
    }
    let closest = g.contract();
    let mut ci = g.create_cut_index(0.25);
    g.reset();
    let ch = g.build_shortcut_graph(&mut ci, &closest);
    let index = ContractionIndex::new(ci, &closest);
    (g, ch, index)
}

/// Reference distances and exact (u64) shortest-path counts by plain
/// Dijkstra over an adjacency list.
struct Reference {
    adjacency: Vec<Vec<(usize, Distance)>>,
}

impl Reference {
    fn new(n: usize, edges: &[(NodeID, NodeID, Distance)]) -> Self {
        let mut adjacency = vec![Vec::new(); n + 1];
        for &(a, b, d) in edges {
            adjacency[a as usize].push((b as usize, d));
            adjacency[b as usize].push((a as usize, d));
        }
        Self { adjacency }
    }

    fn from_source(&self, source: NodeID) -> (Vec<Distance>, Vec<u64>) {
        let n = self.adjacency.len();
        let mut dist = vec![INFINITY; n];
        let mut count = vec![0u64; n];
        dist[source as usize] = 0;
        count[source as usize] = 1;
        let mut heap = BinaryHeap::new();
        heap.push(std::cmp::Reverse((0u32, source as usize)));
        while let Some(std::cmp::Reverse((d, v))) = heap.pop() {
            if d > dist[v] {
                continue;
            }
            for &(w, weight) in &self.adjacency[v] {
                let nd = d + weight;
                if nd < dist[w] {
                    dist[w] = nd;
                    count[w] = count[v];
                    heap.push(std::cmp::Reverse((nd, w)));
                } else if nd == dist[w] {
                    count[w] += count[v];
                }
            }
        }
        (dist, count)
    }
}

/// Asserts index agreement with the reference over all vertex pairs.
fn assert_matches_reference(index: &ContractionIndex, n: usize, edges: &[(NodeID, NodeID, Distance)]) {
    let reference = Reference::new(n, edges);
    // Distances are independently cross-checked against petgraph.
    let mut pg: UnGraph<(), Distance> = UnGraph::new_undirected();
    let pg_nodes: Vec<NodeIndex> = (0..n).map(|_| pg.add_node(())).collect();
    for &(a, b, d) in edges {
        pg.add_edge(pg_nodes[a as usize - 1], pg_nodes[b as usize - 1], d);
    }
    for v in 1..=n as NodeID {
        let (dist, count) = reference.from_source(v);
        let pg_dist = dijkstra(&pg, pg_nodes[v as usize - 1], None, |e| *e.weight());
        for w in 1..=n as NodeID {
            let expected = dist[w as usize];
            assert_eq!(index.get_distance(v, w), expected, "d({v},{w})");
            assert_eq!(
                pg_dist.get(&pg_nodes[w as usize - 1]).copied().unwrap_or(INFINITY),
                expected,
                "reference self-check d({v},{w})"
            );
            if count[w as usize] <= u64::from(u16::MAX) {
                assert_eq!(u64::from(index.get_spc(v, w)), count[w as usize], "spc({v},{w})");
            }
        }
    }
}

/// Mirrors the update binary: route a weight change either to the core
/// updates or to a pendant-offset update.
fn stage_update(
    g: &mut Graph,
    index: &ContractionIndex,
    a: NodeID,
    b: NodeID,
    old: Distance,
    new: Distance,
    core: &mut Vec<EdgeUpdate>,
    pendant: &mut Vec<PendantUpdate>,
) {
    g.update_edge(a, b, new);
    g.update_edge(b, a, new);
    if index.is_contracted(a) || index.is_contracted(b) {
        let x = index.get_contraction_label(a);
        let y = index.get_contraction_label(b);
        if x.distance_offset > y.distance_offset {
            pendant.push(PendantUpdate { node: a, old_offset: x.distance_offset, new_offset: y.distance_offset + new });
        } else if x.distance_offset < y.distance_offset {
            pendant.push(PendantUpdate { node: b, old_offset: y.distance_offset, new_offset: x.distance_offset + new });
        }
        return;
    }
    core.push(EdgeUpdate { a, b, old, new });
}

#[test]
fn path_graph_distances_and_counts() {
    let edges = [(1, 2, 2), (2, 3, 2), (3, 4, 2), (4, 5, 2)];
    let (_g, _ch, index) = build_oracle(5, &edges);
    assert_eq!(index.get_distance(1, 5), 8);
    assert_eq!(index.get_spc(1, 5), 1);
    assert_matches_reference(&index, 5, &edges);
}

#[test]
fn path_graph_pendant_decrease() {
    // Decreasing a pendant-chain edge shifts every offset behind it.
    let edges = [(1, 2, 2), (2, 3, 2), (3, 4, 2), (4, 5, 2)];
    let (mut g, _ch, mut index) = build_oracle(5, &edges);
    let mut core = Vec::new();
    let mut pendant = Vec::new();
    stage_update(&mut g, &index, 3, 4, 2, 1, &mut core, &mut pendant);
    assert!(core.is_empty(), "edge (3,4) lies on a pendant chain");
    g.propagate_pendant_updates(&mut index, pendant);
    assert_eq!(index.get_distance(1, 5), 7);
    assert_eq!(index.get_spc(1, 5), 1);
    let mutated = [(1, 2, 2), (2, 3, 2), (3, 4, 1), (4, 5, 2)];
    assert_matches_reference(&index, 5, &mutated);
}

#[test]
fn diamond_has_two_shortest_paths() {
    let edges = [(1, 2, 1), (1, 3, 1), (2, 4, 1), (3, 4, 1)];
    let (_g, _ch, index) = build_oracle(4, &edges);
    assert_eq!(index.get_distance(1, 4), 2);
    assert_eq!(index.get_spc(1, 4), 2);
    assert_eq!(index.get_distance(1, 1), 0);
    assert_eq!(index.get_spc(1, 1), 1);
    assert_matches_reference(&index, 4, &edges);
}

#[test]
fn complete_graph_with_one_heavy_edge() {
    // K4; the heavy edge (1,2) ties with its two two-hop detours, giving
    // three shortest paths.
    let edges = [(1, 2, 2), (1, 3, 1), (1, 4, 1), (2, 3, 1), (2, 4, 1), (3, 4, 1)];
    let (_g, _ch, index) = build_oracle(4, &edges);
    assert_eq!(index.get_distance(1, 2), 2);
    assert_eq!(index.get_spc(1, 2), 3);
    assert_matches_reference(&index, 4, &edges);
}

#[test]
fn unit_complete_graph() {
    let edges = [(1, 2, 1), (1, 3, 1), (1, 4, 1), (2, 3, 1), (2, 4, 1), (3, 4, 1)];
    let (_g, _ch, index) = build_oracle(4, &edges);
    for v in 1..=4 {
        for w in 1..=4 {
            if v != w {
                assert_eq!(index.get_distance(v, w), 1);
                assert_eq!(index.get_spc(v, w), 1);
            }
        }
    }
    assert_matches_reference(&index, 4, &edges);
}

#[test]
fn disconnected_components_are_unreachable() {
    let edges = [(1, 2, 1), (3, 4, 1)];
    let (_g, _ch, index) = build_oracle(4, &edges);
    assert_eq!(index.get_distance(1, 3), INFINITY);
    assert_eq!(index.get_spc(1, 3), 0);
    assert_eq!(index.get_distance(1, 2), 1);
    assert_matches_reference(&index, 4, &edges);
}

#[test]
fn pendant_leaf_queries_through_the_chain() {
    let edges = [(1, 2, 1), (2, 3, 1), (3, 4, 1), (5, 2, 1)];
    let (_g, _ch, index) = build_oracle(5, &edges);
    assert_eq!(index.get_distance(5, 4), 3);
    assert_eq!(index.get_spc(5, 4), 1);
    assert_matches_reference(&index, 5, &edges);
}

#[test]
fn grid_counts_lattice_paths() {
    // 4x4 unit grid: between opposite corners there are C(6,3) = 20
    // shortest paths.
    let id = |r: u32, c: u32| -> NodeID { r * 4 + c + 1 };
    let mut edges = Vec::new();
    for r in 0..4 {
        for c in 0..4 {
            if c + 1 < 4 {
                edges.push((id(r, c), id(r, c + 1), 1));
            }
            if r + 1 < 4 {
                edges.push((id(r, c), id(r + 1, c), 1));
            }
        }
    }
    let (_g, _ch, index) = build_oracle(16, &edges);
    assert_eq!(index.get_distance(id(0, 0), id(3, 3)), 6);
    assert_eq!(index.get_spc(id(0, 0), id(3, 3)), 20);
    assert_matches_reference(&index, 16, &edges);
}

#[test]
fn queries_are_symmetric() {
    let edges = [(1, 2, 3), (2, 3, 1), (3, 4, 2), (4, 1, 2), (2, 4, 3)];
    let (_g, _ch, index) = build_oracle(4, &edges);
    for v in 1..=4 {
        for w in 1..=4 {
            assert_eq!(index.get_distance(v, w), index.get_distance(w, v));
            assert_eq!(index.get_spc(v, w), index.get_spc(w, v));
        }
    }
}

#[test]
fn random_graphs_agree_with_reference() {
    let mut rng = StdRng::seed_from_u64(0x5bc);
    for round in 0..4 {
        let n: u32 = 24 + round * 7;
        // A ring keeps the graph connected and free of degree-1 vertices;
        // chords and small weights create plenty of tied paths.
        let mut edges: Vec<(NodeID, NodeID, Distance)> = (1..=n)
            .map(|v| (v, v % n + 1, rng.gen_range(1..=3)))
            .collect();
        for _ in 0..n {
            let a = rng.gen_range(1..=n);
            let b = rng.gen_range(1..=n);
            if a != b {
                edges.push((a, b, rng.gen_range(1..=3)));
            }
        }
        let (g, _ch, index) = build_oracle(n as usize, &edges);
        // The deduplicated edge set is what both sides must agree on.
        let final_edges: Vec<(NodeID, NodeID, Distance)> =
            g.get_edges().iter().map(|e| (e.a, e.b, e.d)).collect();
        assert_matches_reference(&index, n as usize, &final_edges);
    }
}

#[test]
fn index_round_trips_byte_identical() {
    let edges = [(1, 2, 1), (2, 3, 1), (3, 4, 1), (5, 2, 1), (3, 1, 4)];
    let (_g, ch, index) = build_oracle(5, &edges);

    let dir = tempfile::tempdir().unwrap();
    let cl_path = dir.path().join("idx_cl");
    let gs_path = dir.path().join("idx_gs");

    let mut cl_bytes = Vec::new();
    index.write(&mut cl_bytes).unwrap();
    std::fs::write(&cl_path, &cl_bytes).unwrap();
    let mut gs_bytes = Vec::new();
    ch.write(&mut gs_bytes).unwrap();
    std::fs::write(&gs_path, &gs_bytes).unwrap();

    let index2 = ContractionIndex::read(&mut std::fs::File::open(&cl_path).unwrap()).unwrap();
    let ch2 = ShortcutGraph::read(&mut std::fs::File::open(&gs_path).unwrap()).unwrap();

    let mut cl_bytes2 = Vec::new();
    index2.write(&mut cl_bytes2).unwrap();
    assert_eq!(cl_bytes, cl_bytes2);
    let mut gs_bytes2 = Vec::new();
    ch2.write(&mut gs_bytes2).unwrap();
    assert_eq!(gs_bytes, gs_bytes2);

    for v in 1..=5 {
        for w in 1..=5 {
            assert_eq!(index.get_distance(v, w), index2.get_distance(v, w));
            assert_eq!(index.get_spc(v, w), index2.get_spc(v, w));
        }
    }
}

#[test]
fn decreases_then_inverse_increases_restore_the_oracle() {
    let mut rng = StdRng::seed_from_u64(0xca11);
    let n: u32 = 20;
    let mut edges: Vec<(NodeID, NodeID, Distance)> = (1..=n)
        .map(|v| (v, v % n + 1, rng.gen_range(2..=4)))
        .collect();
    for _ in 0..15 {
        let a = rng.gen_range(1..=n);
        let b = rng.gen_range(1..=n);
        if a != b {
            edges.push((a, b, rng.gen_range(2..=4)));
        }
    }
    let (mut g, mut ch, index) = build_oracle(n as usize, &edges);
    let final_edges: Vec<(NodeID, NodeID, Distance)> =
        g.get_edges().iter().map(|e| (e.a, e.b, e.d)).collect();

    // Decrease a handful of edges, check against the mutated graph.
    let targets: Vec<(NodeID, NodeID, Distance)> = final_edges
        .iter()
        .copied()
        .filter(|&(_, _, d)| d >= 2)
        .take(5)
        .collect();
    let mut core = Vec::new();
    let mut pendant = Vec::new();
    for &(a, b, d) in &targets {
        stage_update(&mut g, &index, a, b, d, d / 2, &mut core, &mut pendant);
    }
    assert!(pendant.is_empty(), "ring graphs have no pendants");
    g.propagate_decrease(&mut ch, &index, &core);
    let mutated: Vec<(NodeID, NodeID, Distance)> =
        g.get_edges().iter().map(|e| (e.a, e.b, e.d)).collect();
    assert_matches_reference(&index, n as usize, &mutated);

    // Apply the exact inverse and check the original answers return.
    let mut inverse = Vec::new();
    for &(a, b, d) in &targets {
        stage_update(&mut g, &index, a, b, d / 2, d, &mut inverse, &mut pendant);
    }
    g.propagate_increase(&mut ch, &index, &inverse);
    assert_matches_reference(&index, n as usize, &final_edges);
}

#[test]
fn increase_batch_agrees_with_reference() {
    let mut rng = StdRng::seed_from_u64(0x1234);
    let n: u32 = 18;
    let mut edges: Vec<(NodeID, NodeID, Distance)> = (1..=n)
        .map(|v| (v, v % n + 1, rng.gen_range(1..=3)))
        .collect();
    for _ in 0..12 {
        let a = rng.gen_range(1..=n);
        let b = rng.gen_range(1..=n);
        if a != b {
            edges.push((a, b, rng.gen_range(1..=3)));
        }
    }
    let (mut g, mut ch, index) = build_oracle(n as usize, &edges);
    let final_edges: Vec<(NodeID, NodeID, Distance)> =
        g.get_edges().iter().map(|e| (e.a, e.b, e.d)).collect();
    let targets: Vec<(NodeID, NodeID, Distance)> = final_edges.iter().copied().step_by(4).take(4).collect();
    let mut core = Vec::new();
    let mut pendant = Vec::new();
    for &(a, b, d) in &targets {
        stage_update(&mut g, &index, a, b, d, d + d / 2 + 1, &mut core, &mut pendant);
    }
    g.propagate_increase(&mut ch, &index, &core);
    let mutated: Vec<(NodeID, NodeID, Distance)> =
        g.get_edges().iter().map(|e| (e.a, e.b, e.d)).collect();
    assert_matches_reference(&index, n as usize, &mutated);
}
