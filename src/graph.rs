//! Flat vertex table with subgraph views, plus the search and contraction
//! primitives the hierarchy construction is built from.
//!
//! One process-wide node table backs every transient subgraph: a subgraph is
//! a [`Graph`] value holding a member list and a unique [`SubgraphID`]
//! stamped onto each member slot, so containment is a single comparison and
//! no adjacency data is ever copied. Sibling subgraphs are vertex-disjoint,
//! which is what makes the parallel recursion over them safe: each task
//! mutates only the slots of its own members (see [`crate::sync`]).
//!
//! The two synthetic flow terminals live in per-`Graph` scratch slots rather
//! than the shared table, so concurrent max-flow computations on disjoint
//! subgraphs cannot conflict on them.

use std::collections::BinaryHeap;
use std::sync::atomic::{
    AtomicU32,
    Ordering,
};
use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::model::{
    Distance,
    Edge,
    Neighbor,
    NodeID,
    PathCount,
    SubgraphID,
    INFINITY,
    NO_NODE,
    NO_SUBGRAPH,
};
use crate::sync::SharedCell;

/// Number of per-node distance slots, and thus the maximum number of
/// concurrent single-source searches and worker threads in the bucket
/// phases.
pub const PARALLEL_SEARCHES: usize = 8;

/// Divisor for the parallel-recursion threshold: subgraphs larger than
/// `node_count / PARTITION_THREADS` split their recursion across threads.
const PARTITION_THREADS: usize = 8;

/// Subgraphs below this size never spawn threads.
const MIN_THREAD_NODES: usize = 1000;

/// Per-vertex slot in the shared table.
///
/// All fields are interior-mutable: search scratch (`distance`,
/// `outcopy_distance`, `path_count`, flow links, `landmark_level`) is owned
/// by the task whose subgraph contains the vertex; the `distances` slots are
/// owned per-index by the threads of a multi-source search; `subgraph_id` is
/// atomic because foreign tasks probe it while the owner restamps.
pub(crate) struct Node {
    /// Stamp identifying the subgraph this vertex currently belongs to.
    subgraph_id: AtomicU32,
    /// Adjacency list; mutated only by the owning task.
    neighbors: SharedCell<Vec<Neighbor>>,
    /// Single-source search scratch (also the in-copy level during max-flow).
    pub(crate) distance: SharedCell<Distance>,
    /// Out-copy level during max-flow.
    pub(crate) outcopy_distance: SharedCell<Distance>,
    /// Shortest-path count scratch for the counting Dijkstra.
    pub(crate) path_count: SharedCell<PathCount>,
    /// Flow predecessor (the unit of flow entering this vertex), or
    /// [`NO_NODE`].
    pub(crate) inflow: SharedCell<NodeID>,
    /// Flow successor, or [`NO_NODE`].
    pub(crate) outflow: SharedCell<NodeID>,
    /// Position marker while a cut is being ordered; 0 otherwise.
    pub(crate) landmark_level: SharedCell<u16>,
    /// Per-thread distance slots for multi-source searches.
    pub(crate) distances: [SharedCell<Distance>; PARALLEL_SEARCHES],
}

impl Node {
    /// Creates an empty slot stamped with `subgraph_id`.
    fn new(subgraph_id: SubgraphID) -> Self {
        Self {
            subgraph_id: AtomicU32::new(subgraph_id),
            neighbors: SharedCell::new(Vec::new()),
            distance: SharedCell::new(0),
            outcopy_distance: SharedCell::new(0),
            path_count: SharedCell::new(0),
            inflow: SharedCell::new(NO_NODE),
            outflow: SharedCell::new(NO_NODE),
            landmark_level: SharedCell::new(0),
            distances: std::array::from_fn(|_| SharedCell::new(0)),
        }
    }

    pub(crate) fn subgraph(&self) -> SubgraphID {
        self.subgraph_id.load(Ordering::Relaxed)
    }

    pub(crate) fn set_subgraph(&self, id: SubgraphID) {
        self.subgraph_id.store(id, Ordering::Relaxed);
    }
}

/// The process-wide slot table shared by all subgraph views of one graph.
pub(crate) struct NodeTable {
    /// Slot per vertex id: 0 is the null slot, then vertices 1..=n, then the
    /// two reserved terminal ids.
    slots: Vec<Node>,
    /// Allocator for fresh subgraph stamps.
    next_subgraph: AtomicU32,
    /// Subgraph size above which recursion and searches go parallel.
    thread_threshold: usize,
}

impl NodeTable {
    /// Id of the synthetic flow source.
    fn s(&self) -> NodeID {
        (self.slots.len() - 2) as NodeID
    }

    /// Id of the synthetic flow sink.
    fn t(&self) -> NodeID {
        (self.slots.len() - 1) as NodeID
    }

    /// Allocates a stamp no existing view of this table uses.
    fn fresh_subgraph_id(&self) -> SubgraphID {
        self.next_subgraph.fetch_add(1, Ordering::Relaxed)
    }
}

/// A (sub)graph view: a member list plus the stamp identifying membership in
/// the shared table.
pub struct Graph {
    /// Shared slot table.
    pub(crate) table: Arc<NodeTable>,
    /// Members of this view.
    pub(crate) nodes: Vec<NodeID>,
    /// Stamp carried by every member slot.
    subgraph_id: SubgraphID,
    /// Scratch slot for the synthetic source, private to this view.
    s_node: Node,
    /// Scratch slot for the synthetic sink, private to this view.
    t_node: Node,
}

/// Queue entry for the Dijkstra variants.
pub(crate) struct SearchNode {
    /// Tentative distance.
    pub distance: Distance,
    /// Vertex.
    pub node: NodeID,
}

impl SearchNode {
    pub const fn new(distance: Distance, node: NodeID) -> Self {
        Self { distance, node }
    }
}

impl PartialEq for SearchNode {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}
impl Eq for SearchNode {}

// Reversed so BinaryHeap pops the smallest distance first.
impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.distance.cmp(&self.distance)
    }
}
impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Graph {
    /// Creates a graph over vertices `1..=node_count` with no edges.
    #[must_use]
    pub fn new(node_count: usize) -> Self {
        let table = NodeTable {
            slots: Vec::new(),
            next_subgraph: AtomicU32::new(1),
            thread_threshold: std::cmp::max(node_count / PARTITION_THREADS, MIN_THREAD_NODES),
        };
        let mut g = Self {
            table: Arc::new(table),
            nodes: Vec::with_capacity(node_count),
            subgraph_id: NO_SUBGRAPH,
            s_node: Node::new(NO_SUBGRAPH),
            t_node: Node::new(NO_SUBGRAPH),
        };
        let id = g.table.fresh_subgraph_id();
        g.subgraph_id = id;
        {
            let table = Arc::get_mut(&mut g.table).expect("fresh table is unshared");
            // Vertex numbering starts at 1, plus two reserved terminal slots.
            table.slots.extend((0..node_count + 3).map(|_| Node::new(id)));
            table.slots[0].set_subgraph(NO_SUBGRAPH);
            let (s, t) = (node_count + 1, node_count + 2);
            table.slots[s].set_subgraph(NO_SUBGRAPH);
            table.slots[t].set_subgraph(NO_SUBGRAPH);
        }
        g.nodes.extend(1..=node_count as NodeID);
        g
    }

    /// Creates a graph and inserts `edges` in both directions.
    #[must_use]
    pub fn with_edges(node_count: usize, edges: &[Edge]) -> Self {
        let mut g = Self::new(node_count);
        for e in edges {
            g.add_edge(e.a, e.b, e.d, true);
        }
        g
    }

    /// Carves an induced subgraph view over `nodes`, stamping a fresh id.
    pub(crate) fn subgraph<I>(&self, nodes: I) -> Self
    where
        I: IntoIterator<Item = NodeID>,
    {
        let subgraph_id = self.table.fresh_subgraph_id();
        let nodes: Vec<NodeID> = nodes.into_iter().collect();
        let g = Self {
            table: Arc::clone(&self.table),
            nodes,
            subgraph_id,
            s_node: Node::new(NO_SUBGRAPH),
            t_node: Node::new(NO_SUBGRAPH),
        };
        g.assign_nodes();
        g
    }

    /// Slot accessor; the terminal ids resolve to this view's scratch slots.
    pub(crate) fn node(&self, v: NodeID) -> &Node {
        if v == self.table.s() {
            &self.s_node
        } else if v == self.table.t() {
            &self.t_node
        } else {
            &self.table.slots[v as usize]
        }
    }

    /// Id of the synthetic flow source.
    pub(crate) fn s(&self) -> NodeID {
        self.table.s()
    }

    /// Id of the synthetic flow sink.
    pub(crate) fn t(&self) -> NodeID {
        self.table.t()
    }

    /// Highest real vertex id backed by the table.
    pub(crate) fn max_node_id(&self) -> usize {
        self.table.slots.len() - 3
    }

    /// Subgraph size above which work is split across threads.
    pub(crate) fn thread_threshold(&self) -> usize {
        self.table.thread_threshold
    }

    /// Stamp identifying this view.
    pub(crate) fn id(&self) -> SubgraphID {
        self.subgraph_id
    }

    /// Whether `v` belongs to this subgraph view.
    #[must_use]
    pub fn contains(&self, v: NodeID) -> bool {
        self.node(v).subgraph() == self.subgraph_id
    }

    /// Number of vertices in this view.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of undirected edges fully inside this view.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        let mut count = 0;
        for &v in &self.nodes {
            count += self.neighbors(v).iter().filter(|n| self.contains(n.node)).count();
        }
        count / 2
    }

    /// Member list of this view.
    #[must_use]
    pub fn get_nodes(&self) -> &[NodeID] {
        &self.nodes
    }

    /// Adjacency list of `v` (unfiltered; entries may leave the subgraph).
    pub(crate) fn neighbors(&self, v: NodeID) -> &[Neighbor] {
        self.node(v).neighbors.as_ref()
    }

    /// Mutable adjacency list of `v`; caller must own the vertex.
    pub(crate) fn neighbors_mut(&self, v: NodeID) -> &mut Vec<Neighbor> {
        self.node(v).neighbors.as_mut()
    }

    /// Inserts an edge, deduplicating by keeping the minimum weight.
    /// Self-loops are ignored: they never lie on a shortest path.
    pub fn add_edge(&mut self, v: NodeID, w: NodeID, distance: Distance, add_reverse: bool) {
        assert!(distance > 0, "edge weights must be positive");
        if v == w {
            return;
        }
        let neighbors = self.neighbors_mut(v);
        if let Some(n) = neighbors.iter_mut().find(|n| n.node == w) {
            n.distance = n.distance.min(distance);
        } else {
            neighbors.push(Neighbor::new(w, distance));
        }
        if add_reverse {
            self.add_edge(w, v, distance, false);
        }
    }

    /// Removes the edge between `v` and `w` in both directions.
    pub fn remove_edge(&mut self, v: NodeID, w: NodeID) {
        self.neighbors_mut(v).retain(|n| n.node != w);
        self.neighbors_mut(w).retain(|n| n.node != v);
    }

    /// Overwrites the weight of the directed adjacency entry `v → w`.
    pub fn update_edge(&mut self, v: NodeID, w: NodeID, distance: Distance) {
        if let Some(n) = self.neighbors_mut(v).iter_mut().find(|n| n.node == w) {
            n.distance = distance;
        }
    }

    /// Adds a vertex to this view.
    pub(crate) fn add_node(&mut self, v: NodeID) {
        self.nodes.push(v);
        self.node(v).set_subgraph(self.subgraph_id);
    }

    /// Removes a sorted set of vertices from this view, un-stamping them.
    pub(crate) fn remove_nodes(&mut self, node_set: &[NodeID]) {
        debug_assert!(node_set.windows(2).all(|w| w[0] <= w[1]));
        self.nodes.retain(|v| node_set.binary_search(v).is_err());
        for &v in node_set {
            self.node(v).set_subgraph(NO_SUBGRAPH);
        }
    }

    /// Drops vertices with no incident edges from this view.
    pub fn remove_isolated(&mut self) {
        let mut keep = Vec::with_capacity(self.nodes.len());
        for &v in &self.nodes {
            if self.degree(v) == 0 {
                self.node(v).set_subgraph(NO_SUBGRAPH);
            } else {
                keep.push(v);
            }
        }
        self.nodes = keep;
    }

    /// Rebuilds the member list from every vertex with a non-empty adjacency
    /// list, restamping them into this view.
    pub fn reset(&mut self) {
        self.nodes.clear();
        for v in 1..=self.max_node_id() as NodeID {
            if !self.neighbors(v).is_empty() {
                self.nodes.push(v);
                self.node(v).set_subgraph(self.subgraph_id);
            }
        }
        self.s_node.set_subgraph(NO_SUBGRAPH);
        self.t_node.set_subgraph(NO_SUBGRAPH);
    }

    /// Restamps every member with this view's id (repairs stamps after child
    /// views touched them).
    pub(crate) fn assign_nodes(&self) {
        for &v in &self.nodes {
            self.node(v).set_subgraph(self.subgraph_id);
        }
    }

    /// Number of neighbors of `v` inside this view.
    #[must_use]
    pub fn degree(&self, v: NodeID) -> usize {
        debug_assert!(self.contains(v));
        self.neighbors(v).iter().filter(|n| self.contains(n.node)).count()
    }

    /// The unique in-view neighbor of `v`, or [`Neighbor::NONE`] when `v`
    /// has zero or more than one.
    pub(crate) fn single_neighbor(&self, v: NodeID) -> Neighbor {
        debug_assert!(self.contains(v));
        let mut single = Neighbor::NONE;
        for n in self.neighbors(v) {
            if self.contains(n.node) {
                if single.node != NO_NODE {
                    return Neighbor::NONE;
                }
                single = *n;
            }
        }
        single
    }

    /// All edges fully inside this view, each reported once.
    #[must_use]
    pub fn get_edges(&self) -> Vec<Edge> {
        let mut edges = Vec::new();
        for &a in &self.nodes {
            for n in self.neighbors(a) {
                if n.node > a && self.contains(n.node) {
                    edges.push(Edge::new(a, n.node, n.distance));
                }
            }
        }
        edges
    }

    // ----- search primitives ------------------------------------------------

    /// Single-source Dijkstra over the subgraph, filling the distance and
    /// shortest-path-count scratch of every member.
    pub(crate) fn run_dijkstra(&self, v: NodeID) {
        debug_assert!(self.contains(v));
        for &node in &self.nodes {
            self.node(node).distance.set(INFINITY);
            self.node(node).path_count.set(0);
        }
        self.node(v).distance.set(0);
        self.node(v).path_count.set(1);
        let mut q = BinaryHeap::new();
        q.push(SearchNode::new(0, v));
        while let Some(next) = q.pop() {
            for n in self.neighbors(next.node) {
                if !self.contains(n.node) {
                    continue;
                }
                let new_dist = next.distance + n.distance;
                let n_data = self.node(n.node);
                if new_dist < n_data.distance.get() {
                    n_data.distance.set(new_dist);
                    n_data.path_count.set(self.node(next.node).path_count.get());
                    q.push(SearchNode::new(new_dist, n.node));
                } else if new_dist == n_data.distance.get() {
                    let count = n_data.path_count.get();
                    n_data.path_count.set(count.wrapping_add(self.node(next.node).path_count.get()));
                }
            }
        }
    }

    /// Dijkstra over doubled distances whose low bit flags paths that avoid
    /// all landmark-marked vertices; a vertex ending on an even distance was
    /// reached only through landmarks and counts toward their pruning
    /// potential.
    pub(crate) fn run_dijkstra_flagged(&self, v: NodeID) {
        debug_assert!(self.contains(v));
        let pruning_level = self.node(v).landmark_level.get();
        for &node in &self.nodes {
            self.node(node).distance.set(INFINITY);
        }
        self.node(v).distance.set(1);
        let mut q = BinaryHeap::new();
        for n in self.neighbors(v) {
            if !self.contains(n.node) {
                continue;
            }
            let n_dist = (n.distance << 1) | 1;
            self.node(n.node).distance.set(n_dist);
            q.push(SearchNode::new(n_dist, n.node));
        }
        while let Some(next) = q.pop() {
            let current_dist = if self.node(next.node).landmark_level.get() >= pruning_level {
                next.distance & !1
            } else {
                next.distance
            };
            for n in self.neighbors(next.node) {
                if !self.contains(n.node) {
                    continue;
                }
                let new_dist = current_dist + (n.distance << 1);
                let n_data = self.node(n.node);
                if new_dist < n_data.distance.get() {
                    n_data.distance.set(new_dist);
                    q.push(SearchNode::new(new_dist, n.node));
                }
            }
        }
    }

    /// Runs one Dijkstra per vertex concurrently, each writing the distance
    /// slot matching its position in `vertices`. At most
    /// [`PARALLEL_SEARCHES`] vertices per call.
    pub(crate) fn run_dijkstra_par(&self, vertices: &[NodeID]) {
        assert!(vertices.len() <= PARALLEL_SEARCHES);
        std::thread::scope(|scope| {
            for (slot, &v) in vertices.iter().enumerate() {
                scope.spawn(move || {
                    debug_assert!(self.contains(v));
                    for &node in &self.nodes {
                        self.node(node).distances[slot].set(INFINITY);
                    }
                    self.node(v).distances[slot].set(0);
                    let mut q = BinaryHeap::new();
                    q.push(SearchNode::new(0, v));
                    while let Some(next) = q.pop() {
                        for n in self.neighbors(next.node) {
                            if !self.contains(n.node) {
                                continue;
                            }
                            let new_dist = next.distance + n.distance;
                            let cell = &self.node(n.node).distances[slot];
                            if new_dist < cell.get() {
                                cell.set(new_dist);
                                q.push(SearchNode::new(new_dist, n.node));
                            }
                        }
                    }
                });
            }
        });
    }

    /// Parallel counterpart of [`Self::run_dijkstra_flagged`], one slot per
    /// vertex.
    pub(crate) fn run_dijkstra_flagged_par(&self, vertices: &[NodeID]) {
        assert!(vertices.len() <= PARALLEL_SEARCHES);
        std::thread::scope(|scope| {
            for (slot, &v) in vertices.iter().enumerate() {
                scope.spawn(move || {
                    debug_assert!(self.contains(v));
                    let pruning_level = self.node(v).landmark_level.get();
                    for &node in &self.nodes {
                        self.node(node).distances[slot].set(INFINITY);
                    }
                    self.node(v).distances[slot].set(1);
                    let mut q = BinaryHeap::new();
                    for n in self.neighbors(v) {
                        if !self.contains(n.node) {
                            continue;
                        }
                        let n_dist = (n.distance << 1) | 1;
                        self.node(n.node).distances[slot].set(n_dist);
                        q.push(SearchNode::new(n_dist, n.node));
                    }
                    while let Some(next) = q.pop() {
                        let current_dist = if self.node(next.node).landmark_level.get() >= pruning_level {
                            next.distance & !1
                        } else {
                            next.distance
                        };
                        for n in self.neighbors(next.node) {
                            if !self.contains(n.node) {
                                continue;
                            }
                            let new_dist = current_dist + (n.distance << 1);
                            let cell = &self.node(n.node).distances[slot];
                            if new_dist < cell.get() {
                                cell.set(new_dist);
                                q.push(SearchNode::new(new_dist, n.node));
                            }
                        }
                    }
                });
            }
        });
    }

    /// Breadth-first search filling the distance scratch with hop counts.
    pub(crate) fn run_bfs(&self, v: NodeID) {
        debug_assert!(self.contains(v));
        for &node in &self.nodes {
            self.node(node).distance.set(INFINITY);
        }
        self.node(v).distance.set(0);
        let mut q = std::collections::VecDeque::new();
        q.push_back(v);
        while let Some(next) = q.pop_front() {
            let new_dist = self.node(next).distance.get() + 1;
            for n in self.neighbors(next) {
                if self.contains(n.node) && self.node(n.node).distance.get() == INFINITY {
                    self.node(n.node).distance.set(new_dist);
                    q.push_back(n.node);
                }
            }
        }
    }

    /// Distance scratch of `v` after a search.
    pub(crate) fn scratch_distance(&self, v: NodeID) -> Distance {
        self.node(v).distance.get()
    }

    /// Distance slot `slot` of `v` after a multi-source search.
    pub(crate) fn slot_distance(&self, v: NodeID, slot: usize) -> Distance {
        self.node(v).distances[slot].get()
    }

    /// Landmark level accessors used while ordering cuts.
    pub(crate) fn landmark_level(&self, v: NodeID) -> u16 {
        self.node(v).landmark_level.get()
    }

    /// Sets the landmark level of `v`.
    pub(crate) fn set_landmark_level(&self, v: NodeID, level: u16) {
        self.node(v).landmark_level.set(level);
    }

    /// Exact distance between two members, by full search.
    #[must_use]
    pub fn get_distance(&self, v: NodeID, w: NodeID, weighted: bool) -> Distance {
        debug_assert!(self.contains(v) && self.contains(w));
        if weighted {
            self.run_dijkstra(v);
        } else {
            self.run_bfs(v);
        }
        self.node(w).distance.get()
    }

    /// Exact shortest-path count between two members, by full search.
    #[must_use]
    pub fn get_path_count(&self, v: NodeID, w: NodeID) -> PathCount {
        debug_assert!(self.contains(v) && self.contains(w));
        self.run_dijkstra(v);
        self.node(w).path_count.get()
    }

    /// The member furthest from `v` and its distance.
    pub(crate) fn get_furthest(&self, v: NodeID, weighted: bool) -> (NodeID, Distance) {
        if weighted {
            self.run_dijkstra(v);
        } else {
            self.run_bfs(v);
        }
        let mut furthest = v;
        for &node in &self.nodes {
            if self.node(node).distance.get() > self.node(furthest).distance.get() {
                furthest = node;
            }
        }
        (furthest, self.node(furthest).distance.get())
    }

    /// A pair of mutually far-apart members, found by iterated
    /// farthest-vertex search.
    pub(crate) fn get_furthest_pair(&self, weighted: bool) -> Edge {
        assert!(self.nodes.len() > 1);
        let mut max_dist = 0;
        let mut start = self.nodes[0];
        let mut furthest = self.get_furthest(start, weighted);
        while furthest.1 > max_dist {
            max_dist = furthest.1;
            start = furthest.0;
            furthest = self.get_furthest(start, weighted);
        }
        Edge::new(start, furthest.0, max_dist)
    }

    /// Approximate diameter of the subgraph.
    #[must_use]
    pub fn diameter(&self, weighted: bool) -> Distance {
        if self.nodes.len() < 2 {
            return 0;
        }
        self.get_furthest_pair(weighted).d
    }

    // ----- degree-1 contraction --------------------------------------------

    /// Iteratively removes degree-1 vertices, recording for every vertex its
    /// closest remaining neighbor.
    ///
    /// Returns the `closest` table: `closest[v].node == v` marks a core
    /// vertex, a different node marks the next hop toward the core (with the
    /// hop distance), and [`NO_NODE`] marks a vertex that was never in the
    /// graph.
    pub fn contract(&mut self) -> Vec<Neighbor> {
        let mut closest = vec![Neighbor::NONE; self.max_node_id() + 1];
        for &node in &self.nodes {
            closest[node as usize] = Neighbor::new(node, 0);
        }
        let find_degree_one = |g: &Self, candidates: &[NodeID], closest: &mut Vec<Neighbor>| {
            let mut degree_one = Vec::new();
            let mut neighbors = Vec::new();
            for &node in candidates {
                if !g.contains(node) {
                    continue;
                }
                let neighbor = g.single_neighbor(node);
                if neighbor.node != NO_NODE {
                    // Leave mutually-pendant pairs in place so the core
                    // never contracts away entirely.
                    if g.single_neighbor(neighbor.node).node == NO_NODE {
                        closest[node as usize] = neighbor;
                        degree_one.push(node);
                        neighbors.push(neighbor.node);
                    }
                }
            }
            (degree_one, neighbors)
        };
        let (mut degree_one, mut neighbors) = find_degree_one(self, &self.nodes.clone(), &mut closest);
        while !degree_one.is_empty() {
            degree_one.sort_unstable();
            degree_one.dedup();
            self.remove_nodes(&degree_one);
            let old_neighbors = neighbors;
            (degree_one, neighbors) = find_degree_one(self, &old_neighbors, &mut closest);
        }
        debug!(removed = closest.iter().filter(|n| n.node != NO_NODE).count() - self.nodes.len(), "contracted degree-1 vertices");
        closest
    }

    // ----- randomized helpers ----------------------------------------------

    /// A uniformly random member.
    #[must_use]
    pub fn random_node(&self) -> NodeID {
        self.nodes[rand::thread_rng().gen_range(0..self.nodes.len())]
    }

    /// A random vertex pair; with `steps > 0` the second vertex is found by
    /// a `steps`-long random walk from the first.
    #[must_use]
    pub fn random_pair(&self, steps: usize) -> (NodeID, NodeID) {
        if steps < 1 {
            return (self.random_node(), self.random_node());
        }
        let mut rng = rand::thread_rng();
        let start = self.random_node();
        let mut stop = start;
        for _ in 0..steps {
            loop {
                let neighbors = self.neighbors(stop);
                let n = neighbors[rng.gen_range(0..neighbors.len())].node;
                if self.contains(n) {
                    stop = n;
                    break;
                }
            }
        }
        (start, stop)
    }

    /// Shuffles the member list and every adjacency list.
    pub fn randomize(&mut self) {
        use rand::seq::SliceRandom;
        let mut rng = rand::thread_rng();
        self.nodes.shuffle(&mut rng);
        for &node in &self.nodes {
            self.neighbors_mut(node).shuffle(&mut rng);
        }
    }

    // ----- consistency checks ----------------------------------------------

    /// Every member stamped, and no foreign slot carrying our stamp.
    pub(crate) fn is_consistent(&self) -> bool {
        for &node in &self.nodes {
            if self.node(node).subgraph() != self.subgraph_id {
                return false;
            }
        }
        let mut count = self.table.slots.iter().filter(|n| n.subgraph() == self.subgraph_id).count();
        if self.s_node.subgraph() == self.subgraph_id {
            count += 1;
        }
        if self.t_node.subgraph() == self.subgraph_id {
            count += 1;
        }
        count == self.nodes.len()
    }

    /// Every edge present in both directions with equal weight.
    pub(crate) fn is_undirected(&self) -> bool {
        for &node in &self.nodes {
            for n in self.neighbors(node) {
                let back = self.neighbors(n.node).iter().any(|nn| nn.node == node && nn.distance == n.distance);
                if !back {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph(n: usize) -> Graph {
        let mut g = Graph::new(n);
        for v in 1..n as NodeID {
            g.add_edge(v, v + 1, 1, true);
        }
        g
    }

    #[test]
    fn add_edge_deduplicates_keeping_minimum() {
        let mut g = Graph::new(2);
        g.add_edge(1, 2, 5, true);
        g.add_edge(1, 2, 3, true);
        g.add_edge(2, 1, 7, true);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.neighbors(1), &[Neighbor::new(2, 3)]);
        assert!(g.is_undirected());
    }

    #[test]
    fn self_loops_are_rejected() {
        let mut g = Graph::new(2);
        g.add_edge(1, 1, 4, true);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn subgraph_membership_is_by_stamp() {
        let g = path_graph(5);
        let sub = g.subgraph([2, 3, 4]);
        assert!(sub.contains(3) && !sub.contains(1) && !sub.contains(5));
        assert_eq!(sub.degree(3), 2);
        assert_eq!(sub.degree(2), 1);
        // Parent stamps are repaired on demand.
        g.assign_nodes();
        assert!(g.contains(2));
    }

    #[test]
    fn dijkstra_counts_shortest_paths() {
        // Diamond: two shortest paths from 1 to 4.
        let mut g = Graph::new(4);
        for (a, b) in [(1, 2), (1, 3), (2, 4), (3, 4)] {
            g.add_edge(a, b, 1, true);
        }
        assert_eq!(g.get_distance(1, 4, true), 2);
        assert_eq!(g.get_path_count(1, 4), 2);
        assert_eq!(g.get_path_count(1, 1), 1);
    }

    #[test]
    fn parallel_dijkstra_matches_sequential() {
        let g = path_graph(7);
        let sources = [1, 4, 7];
        g.run_dijkstra_par(&sources);
        for (slot, &v) in sources.iter().enumerate() {
            g.run_dijkstra(v);
            for &node in g.get_nodes() {
                assert_eq!(g.slot_distance(node, slot), g.scratch_distance(node));
            }
        }
    }

    #[test]
    fn furthest_pair_spans_a_path() {
        let g = path_graph(6);
        let e = g.get_furthest_pair(false);
        assert_eq!(e.d, 5);
        assert_eq!(e.a.min(e.b), 1);
        assert_eq!(e.a.max(e.b), 6);
    }

    #[test]
    fn contraction_records_pendant_chains() {
        // 1-2-3-4 with a leaf 5 hanging off 2.
        let mut g = Graph::new(5);
        for (a, b) in [(1, 2), (2, 3), (3, 4), (5, 2)] {
            g.add_edge(a, b, 1, true);
        }
        let closest = g.contract();
        // 1, 4 and 5 contract away; a mutually-pendant core pair remains.
        assert_eq!(g.node_count(), 2);
        assert_eq!(closest[5], Neighbor::new(2, 1));
        assert_eq!(closest[1], Neighbor::new(2, 1));
        for &v in g.get_nodes() {
            assert_eq!(closest[v as usize], Neighbor::new(v, 0));
        }
    }

    #[test]
    fn remove_isolated_drops_edgeless_vertices() {
        let mut g = Graph::new(4);
        g.add_edge(1, 2, 1, true);
        g.remove_isolated();
        assert_eq!(g.get_nodes(), &[1, 2]);
    }

    #[test]
    fn random_pair_walks_stay_inside() {
        let g = path_graph(10);
        for _ in 0..20 {
            let (a, b) = g.random_pair(3);
            assert!(g.contains(a) && g.contains(b));
        }
    }
}
