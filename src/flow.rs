//! Minimum vertex cuts by unit-capacity max-flow (Dinitz).
//!
//! Every vertex other than the terminals is implicitly split into an
//! incoming and an outgoing copy joined by a unit-capacity internal edge;
//! the terminals have unbounded capacity. Flow is represented per vertex as
//! the `inflow`/`outflow` links of the slot, and the level graph lives in
//! the `distance` (in-copy) and `outcopy_distance` (out-copy) scratch
//! fields.

use tracing::trace;

use crate::graph::Graph;
use crate::model::{
    Distance,
    NodeID,
    INFINITY,
    NO_NODE,
};
use crate::sync::SharedCell;

/// A vertex copy in the implicit split graph.
#[derive(Clone, Copy, Debug)]
struct FlowNode {
    /// The underlying vertex.
    node: NodeID,
    /// Whether this is the outgoing copy.
    outcopy: bool,
}

impl FlowNode {
    const fn new(node: NodeID, outcopy: bool) -> Self {
        Self { node, outcopy }
    }
}

/// Lowers the cell to `new` if that improves it.
fn update_distance(cell: &SharedCell<Distance>, new: Distance) -> bool {
    if cell.get() > new {
        cell.set(new);
        return true;
    }
    false
}

impl Graph {
    /// BFS from the source through the residual graph, filling in-copy and
    /// out-copy levels. Mirror image of [`Self::run_flow_bfs_from_t`].
    pub(crate) fn run_flow_bfs_from_s(&self) {
        debug_assert!(self.contains(self.s()) && self.contains(self.t()));
        for &node in &self.nodes {
            self.node(node).distance.set(INFINITY);
            self.node(node).outcopy_distance.set(INFINITY);
        }
        self.node(self.t()).distance.set(0);
        self.node(self.t()).outcopy_distance.set(0);
        // Start from the source's neighbors: the source itself needs no
        // levels, only residual edges out of it.
        let mut q = std::collections::VecDeque::new();
        for n in self.neighbors(self.s()) {
            if self.contains(n.node) && self.node(n.node).inflow.get() != self.s() {
                debug_assert_eq!(self.node(n.node).inflow.get(), NO_NODE);
                self.node(n.node).distance.set(1);
                // Vertex-internal edges count as length 0.
                self.node(n.node).outcopy_distance.set(1);
                q.push_back(FlowNode::new(n.node, false));
            }
        }
        while let Some(fn_) = q.pop_front() {
            let data = self.node(fn_.node);
            let fn_dist = if fn_.outcopy { data.outcopy_distance.get() } else { data.distance.get() };
            let inflow = data.inflow.get();
            if inflow != NO_NODE && !fn_.outcopy {
                // A saturated vertex routes its in-copy only along the flow
                // edge.
                let in_data = self.node(inflow);
                if update_distance(&in_data.outcopy_distance, fn_dist + 1) {
                    // Zero-length internal edges must settle immediately or a
                    // longer path could pin the wrong level first.
                    update_distance(&in_data.distance, fn_dist + 1);
                    q.push_back(FlowNode::new(inflow, true));
                }
            } else {
                for n in self.neighbors(fn_.node) {
                    if !self.contains(n.node) {
                        continue;
                    }
                    let n_data = self.node(n.node);
                    if n.node == inflow {
                        // Following the inflow inverts existing flow.
                        if update_distance(&n_data.outcopy_distance, fn_dist + 1) {
                            update_distance(&n_data.distance, fn_dist + 1);
                            q.push_back(FlowNode::new(n.node, true));
                        }
                    } else if update_distance(&n_data.distance, fn_dist + 1) {
                        if n_data.inflow.get() == NO_NODE {
                            update_distance(&n_data.outcopy_distance, fn_dist + 1);
                        }
                        q.push_back(FlowNode::new(n.node, false));
                    }
                }
            }
        }
    }

    /// BFS from the sink through the inverse residual graph; levels feed the
    /// blocking-flow DFS of [`Self::min_vertex_cuts`].
    pub(crate) fn run_flow_bfs_from_t(&self) {
        debug_assert!(self.contains(self.s()) && self.contains(self.t()));
        for &node in &self.nodes {
            self.node(node).distance.set(INFINITY);
            self.node(node).outcopy_distance.set(INFINITY);
        }
        self.node(self.t()).distance.set(0);
        self.node(self.t()).outcopy_distance.set(0);
        let mut q = std::collections::VecDeque::new();
        for n in self.neighbors(self.t()) {
            if self.contains(n.node) && self.node(n.node).outflow.get() != self.t() {
                debug_assert_eq!(self.node(n.node).outflow.get(), NO_NODE);
                self.node(n.node).outcopy_distance.set(1);
                self.node(n.node).distance.set(1);
                q.push_back(FlowNode::new(n.node, true));
            }
        }
        while let Some(fn_) = q.pop_front() {
            let data = self.node(fn_.node);
            let fn_dist = if fn_.outcopy { data.outcopy_distance.get() } else { data.distance.get() };
            let outflow = data.outflow.get();
            if outflow != NO_NODE && fn_.outcopy {
                let out_data = self.node(outflow);
                if update_distance(&out_data.distance, fn_dist + 1) {
                    update_distance(&out_data.outcopy_distance, fn_dist + 1);
                    q.push_back(FlowNode::new(outflow, false));
                }
            } else {
                for n in self.neighbors(fn_.node) {
                    if !self.contains(n.node) {
                        continue;
                    }
                    let n_data = self.node(n.node);
                    if n.node == outflow {
                        if update_distance(&n_data.distance, fn_dist + 1) {
                            update_distance(&n_data.outcopy_distance, fn_dist + 1);
                            q.push_back(FlowNode::new(n.node, false));
                        }
                    } else if update_distance(&n_data.outcopy_distance, fn_dist + 1) {
                        if n_data.outflow.get() == NO_NODE {
                            update_distance(&n_data.distance, fn_dist + 1);
                        }
                        q.push_back(FlowNode::new(n.node, true));
                    }
                }
            }
        }
    }

    /// Computes a maximum set of vertex-disjoint s-t paths and extracts the
    /// minimum vertex cut(s) separating the terminals.
    ///
    /// Returns one cut per residual side (sink-side and source-side) with
    /// duplicates coalesced; the caller picks by balance.
    pub(crate) fn min_vertex_cuts(&mut self) -> Vec<Vec<NodeID>> {
        debug_assert!(self.is_consistent());
        assert!(self.contains(self.s()) && self.contains(self.t()));
        for &node in &self.nodes {
            self.node(node).inflow.set(NO_NODE);
            self.node(node).outflow.set(NO_NODE);
        }
        // Dinitz phases: level the residual graph, then saturate one
        // blocking flow along strictly decreasing levels.
        loop {
            self.run_flow_bfs_from_t();
            let s_distance = self.node(self.s()).outcopy_distance.get();
            if s_distance == INFINITY {
                break;
            }
            let mut path: Vec<NodeID> = Vec::new();
            let mut stack: Vec<FlowNode> = Vec::new();
            // Iterating the source's neighbors directly keeps the stack
            // cleanup after each augmenting path trivial.
            for sn in self.neighbors(self.s()) {
                if !self.contains(sn.node) || self.node(sn.node).distance.get() != s_distance - 1 {
                    continue;
                }
                // Residual edge from s exists only while the neighbor is
                // unsaturated.
                if self.node(sn.node).inflow.get() != NO_NODE {
                    debug_assert_eq!(self.node(sn.node).inflow.get(), self.s());
                    continue;
                }
                stack.push(FlowNode::new(sn.node, false));
                while let Some(fn_) = stack.pop() {
                    let data = self.node(fn_.node);
                    let fn_dist = if fn_.outcopy { data.outcopy_distance.get() } else { data.distance.get() };
                    // Node may have been disabled after being stacked.
                    if fn_dist == INFINITY {
                        continue;
                    }
                    debug_assert!(fn_dist < s_distance && (s_distance - fn_dist - 1) as usize <= path.len());
                    path.truncate((s_distance - fn_dist - 1) as usize);
                    if fn_.node == self.t() {
                        // Commit the augmenting path, inverting existing flow
                        // where the path runs against it.
                        trace!(?path, "augmenting path");
                        debug_assert_eq!(self.node(path[0]).inflow.get(), NO_NODE);
                        self.node(path[0]).inflow.set(self.s());
                        for pos in 1..path.len() {
                            let from = path[pos - 1];
                            let to = path[pos];
                            // from.inflow may already be overwritten, so the
                            // inversion check goes through to.outflow.
                            if self.node(to).outflow.get() == from {
                                self.node(to).outflow.set(NO_NODE);
                                if self.node(from).inflow.get() == to {
                                    self.node(from).inflow.set(NO_NODE);
                                }
                            } else {
                                self.node(from).outflow.set(to);
                                self.node(to).inflow.set(from);
                            }
                        }
                        let last = *path.last().expect("augmenting path is nonempty");
                        debug_assert_eq!(self.node(last).outflow.get(), NO_NODE);
                        self.node(last).outflow.set(self.t());
                        stack.clear();
                        path.clear();
                        break;
                    }
                    // Disable the copy for the remainder of this phase.
                    if fn_.outcopy {
                        data.outcopy_distance.set(INFINITY);
                    } else {
                        data.distance.set(INFINITY);
                    }
                    path.push(fn_.node);
                    let next_distance = fn_dist - 1;
                    let inflow = data.inflow.get();
                    if inflow != NO_NODE && !fn_.outcopy {
                        // Saturated vertex: inverting the inflow is the only
                        // way on from the in-copy.
                        if self.node(inflow).outcopy_distance.get() == next_distance {
                            stack.push(FlowNode::new(inflow, true));
                        }
                    } else {
                        for n in self.neighbors(fn_.node) {
                            if !self.contains(n.node) {
                                continue;
                            }
                            if n.node == inflow {
                                if self.node(inflow).outcopy_distance.get() == next_distance {
                                    stack.push(FlowNode::new(inflow, true));
                                }
                            } else if self.node(n.node).distance.get() == next_distance {
                                stack.push(FlowNode::new(n.node, false));
                            }
                        }
                    }
                }
            }
        }
        // Sink-side cut: a saturated vertex is in the cut iff its out-copy
        // is residually reachable from t but its in-copy is not; for flow
        // ending directly at t the carrier vertex is the cut vertex.
        let mut cuts = vec![Vec::new()];
        for &node in &self.nodes {
            let data = self.node(node);
            let outflow = data.outflow.get();
            if outflow != NO_NODE {
                debug_assert_ne!(data.inflow.get(), NO_NODE);
                if data.outcopy_distance.get() < INFINITY {
                    if data.distance.get() == INFINITY {
                        cuts[0].push(node);
                    }
                } else if outflow == self.t() {
                    cuts[0].push(node);
                }
            }
        }
        // Source-side cut, from reachability in the forward residual graph.
        self.run_flow_bfs_from_s();
        cuts.push(Vec::new());
        for &node in &self.nodes {
            let data = self.node(node);
            let inflow = data.inflow.get();
            if inflow != NO_NODE {
                debug_assert_ne!(data.outflow.get(), NO_NODE);
                if data.distance.get() < INFINITY {
                    if data.outcopy_distance.get() == INFINITY {
                        cuts[1].push(node);
                    }
                } else if inflow == self.s() {
                    cuts[1].push(node);
                }
            }
        }
        if cuts[0] == cuts[1] {
            cuts.pop();
        }
        trace!(?cuts, "minimum vertex cuts");
        cuts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Attaches s to `left` and t to `right`, runs the cut extraction, and
    /// detaches the terminals again.
    fn cuts_between(g: &mut Graph, left: &[NodeID], right: &[NodeID]) -> Vec<Vec<NodeID>> {
        let s = g.s();
        let t = g.t();
        g.add_node(s);
        g.add_node(t);
        for &v in left {
            g.add_edge(s, v, 1, true);
        }
        for &v in right {
            g.add_edge(t, v, 1, true);
        }
        let mut cuts = g.min_vertex_cuts();
        for cut in &mut cuts {
            cut.sort_unstable();
        }
        cuts
    }

    #[test]
    fn articulation_vertex_is_the_min_cut() {
        // Two triangles joined at vertex 4.
        let mut g = Graph::new(7);
        for (a, b) in [(1, 2), (2, 3), (1, 3), (3, 4), (4, 5), (5, 6), (6, 7), (5, 7)] {
            g.add_edge(a, b, 1, true);
        }
        let cuts = cuts_between(&mut g, &[1], &[7]);
        for cut in cuts {
            assert_eq!(cut.len(), 1);
        }
    }

    #[test]
    fn parallel_paths_need_two_cut_vertices() {
        // s-side 1 connects to t-side 6 through two disjoint paths.
        let mut g = Graph::new(6);
        for (a, b) in [(1, 2), (2, 3), (3, 6), (1, 4), (4, 5), (5, 6)] {
            g.add_edge(a, b, 1, true);
        }
        let cuts = cuts_between(&mut g, &[1], &[6]);
        for cut in cuts {
            assert_eq!(cut.len(), 2);
        }
    }

    #[test]
    fn direct_terminal_flow_picks_carrier_vertices() {
        // Star: center 1, with s and t both attached to the leaves.
        let mut g = Graph::new(3);
        g.add_edge(1, 2, 1, true);
        g.add_edge(1, 3, 1, true);
        let cuts = cuts_between(&mut g, &[2], &[3]);
        for cut in cuts {
            assert_eq!(cut.len(), 1);
        }
    }
}
