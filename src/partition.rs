//! Balanced vertex-cut partitioning: a rough bipartition from the BFS
//! difference of two far endpoints, refined into an exact minimum cut by the
//! max-flow stage, completed and rated for the recursion.

use ordered_float::OrderedFloat;
use tracing::trace;

use crate::graph::Graph;
use crate::model::{
    Distance,
    NodeID,
    INFINITY,
};

/// Use edge weights when locating far endpoints for the rough partition.
const WEIGHTED_FURTHEST: bool = false;
/// Use edge weights for the distance-difference ordering.
const WEIGHTED_DIFF: bool = false;

/// A three-way split of a subgraph: two sides and the separating cut.
#[derive(Clone, Debug, Default)]
pub struct Partition {
    /// Vertices of the left side.
    pub left: Vec<NodeID>,
    /// The separator.
    pub cut: Vec<NodeID>,
    /// Vertices of the right side.
    pub right: Vec<NodeID>,
}

impl Partition {
    /// Balance rating `min(|L|, |R|) / (|C|² + 1)`; larger is better.
    #[must_use]
    pub fn rating(&self) -> f64 {
        let (l, r, c) = (self.left.len(), self.right.len(), self.cut.len());
        l.min(r) as f64 / (c * c + 1) as f64
    }
}

/// Per-vertex distances to the two far endpoints of the rough partition.
#[derive(Clone, Copy, Debug)]
struct DiffData {
    /// The vertex.
    node: NodeID,
    /// Distance to endpoint a.
    dist_a: Distance,
    /// Distance to endpoint b.
    dist_b: Distance,
}

impl DiffData {
    /// Signed difference ordering the vertices from the a-side to the
    /// b-side.
    fn diff(self) -> i64 {
        i64::from(self.dist_a) - i64::from(self.dist_b)
    }

    /// Distance to the closer endpoint.
    fn min(self) -> Distance {
        self.dist_a.min(self.dist_b)
    }
}

/// Appends a component to the smaller of the two sides.
fn add_to_smaller(left: &mut Vec<NodeID>, right: &mut Vec<NodeID>, component: &[NodeID]) {
    let smaller = if left.len() <= right.len() { left } else { right };
    smaller.extend_from_slice(component);
}

impl Graph {
    /// Connected components of this subgraph, each as a vertex list.
    pub(crate) fn get_connected_components(&self) -> Vec<Vec<NodeID>> {
        debug_assert!(self.is_consistent());
        let mut components = Vec::new();
        for &start in &self.nodes {
            // Visited vertices are temporarily un-stamped.
            if !self.contains(start) {
                continue;
            }
            self.node(start).set_subgraph(crate::model::NO_SUBGRAPH);
            let mut cc = Vec::new();
            let mut stack = vec![start];
            while let Some(node) = stack.pop() {
                cc.push(node);
                for n in self.neighbors(node) {
                    if self.contains(n.node) {
                        self.node(n.node).set_subgraph(crate::model::NO_SUBGRAPH);
                        stack.push(n.node);
                    }
                }
            }
            components.push(cc);
        }
        self.assign_nodes();
        debug_assert_eq!(components.iter().map(Vec::len).sum::<usize>(), self.nodes.len());
        components
    }

    /// Distances of every member to endpoints `a` and `b`.
    fn get_diff_data(&self, a: NodeID, b: NodeID, weighted: bool) -> Vec<DiffData> {
        debug_assert!(self.is_consistent());
        let mut diff = Vec::with_capacity(self.nodes.len());
        if weighted {
            self.run_dijkstra(a);
        } else {
            self.run_bfs(a);
        }
        for &node in &self.nodes {
            diff.push(DiffData { node, dist_a: self.scratch_distance(node), dist_b: 0 });
        }
        if weighted {
            self.run_dijkstra(b);
        } else {
            self.run_bfs(b);
        }
        for dd in &mut diff {
            dd.dist_b = self.scratch_distance(dd.node);
        }
        diff
    }

    /// Rough three-way split of the subgraph. Returns `true` when the split
    /// is already final (component splits with an empty or provably minimal
    /// cut) and the max-flow refinement can be skipped.
    pub(crate) fn get_rough_partition(&mut self, p: &mut Partition, balance: f64, check_components: bool) -> bool {
        debug_assert!(self.is_consistent());
        debug_assert!(p.left.is_empty() && p.cut.is_empty() && p.right.is_empty());
        if check_components {
            let mut cc = self.get_connected_components();
            if cc.len() > 1 {
                trace!(components = cc.len(), "splitting disconnected subgraph");
                cc.sort_by_key(|c| std::cmp::Reverse(c.len()));
                // An empty cut loosens the balance requirement.
                if (cc[0].len() as f64) < self.nodes.len() as f64 * (1.0 - balance / 2.0) {
                    for c in &cc {
                        add_to_smaller(&mut p.left, &mut p.right, c);
                    }
                    return true;
                }
                // Partition the dominating component, then distribute the
                // rest.
                let mut main_cc = self.subgraph(cc[0].iter().copied());
                let is_fine = main_cc.get_rough_partition(p, balance, false);
                for &node in &main_cc.nodes {
                    self.node(node).set_subgraph(self.id());
                }
                if is_fine {
                    for c in &cc[1..] {
                        add_to_smaller(&mut p.left, &mut p.right, c);
                    }
                }
                return is_fine;
            }
        }
        // Connected: order vertices by their distance difference to two
        // mutually far endpoints.
        let a = self.get_furthest(self.nodes[0], WEIGHTED_FURTHEST).0;
        let b = self.get_furthest(a, WEIGHTED_FURTHEST).0;
        let mut diff = self.get_diff_data(a, b, WEIGHTED_DIFF);
        diff.sort_unstable_by_key(|dd| (dd.diff(), dd.node));
        // Quantile bounds from the balance parameter, rounded up.
        let mut max_left = std::cmp::min(self.nodes.len() / 2, (self.nodes.len() as f64 * balance).ceil() as usize);
        let mut min_right = self.nodes.len() - max_left;
        debug_assert!(max_left <= min_right);
        // Degenerate middle: most vertices share one difference value.
        // Remove the minimum-distance bottleneck set and retry without it.
        if diff[max_left - 1].diff() == diff[min_right].diff() {
            let center_diff = diff[min_right].diff();
            let mut min_dist = INFINITY;
            let mut bottlenecks: Vec<NodeID> = Vec::new();
            for dd in &diff {
                if dd.diff() == center_diff {
                    if dd.min() < min_dist {
                        min_dist = dd.min();
                        bottlenecks.clear();
                    }
                    if dd.min() == min_dist {
                        bottlenecks.push(dd.node);
                    }
                }
            }
            bottlenecks.sort_unstable();
            trace!(?bottlenecks, "degenerate middle");
            self.remove_nodes(&bottlenecks);
            let is_fine = self.get_rough_partition(p, balance, true);
            for &bn in &bottlenecks {
                self.add_node(bn);
                p.cut.push(bn);
            }
            // If the bottlenecks are the only cut vertices they form a
            // minimal cut already.
            return is_fine && p.cut.len() == bottlenecks.len();
        }
        // Expand both boundaries to equal-difference frontiers so the
        // pre-partitions stay connected.
        while diff[max_left - 1].diff() == diff[max_left].diff() {
            max_left += 1;
        }
        while diff[min_right - 1].diff() == diff[min_right].diff() {
            min_right -= 1;
        }
        for (i, dd) in diff.iter().enumerate() {
            if i < max_left {
                p.left.push(dd.node);
            } else if i < min_right {
                p.cut.push(dd.node);
            } else {
                p.right.push(dd.node);
            }
        }
        false
    }

    /// Refines a rough partition into exact minimum cuts: builds the flow
    /// graph over the middle with the terminals attached to the side
    /// borders, forcing endpoints of direct left-right edges into the
    /// middle.
    pub(crate) fn rough_partition_to_cuts(&mut self, p: &Partition) -> Vec<Vec<NodeID>> {
        let mut left = self.subgraph(p.left.iter().copied());
        let mut center = self.subgraph(p.cut.iter().copied());
        let mut right = self.subgraph(p.right.iter().copied());
        let s = self.s();
        let t = self.t();
        center.add_node(s);
        center.add_node(t);
        // Direct left-right edges would bypass the middle; move their
        // endpoints into it first, as this can eliminate other terminal
        // neighbors.
        let mut s_neighbors: Vec<NodeID> = Vec::new();
        let mut t_neighbors: Vec<NodeID> = Vec::new();
        for &node in &left.nodes {
            for n in self.neighbors(node) {
                if right.contains(n.node) {
                    s_neighbors.push(node);
                    t_neighbors.push(n.node);
                }
            }
        }
        s_neighbors.sort_unstable();
        s_neighbors.dedup();
        t_neighbors.sort_unstable();
        t_neighbors.dedup();
        trace!(?s_neighbors, ?t_neighbors, "moving direct-edge endpoints to center");
        left.remove_nodes(&s_neighbors);
        for &node in &s_neighbors {
            center.add_node(node);
        }
        right.remove_nodes(&t_neighbors);
        for &node in &t_neighbors {
            center.add_node(node);
        }
        // Remaining terminal attachment points: middle vertices bordering
        // either side.
        for &node in &left.nodes {
            for n in self.neighbors(node) {
                if center.contains(n.node) {
                    s_neighbors.push(n.node);
                }
            }
        }
        for &node in &right.nodes {
            for n in self.neighbors(node) {
                if center.contains(n.node) {
                    t_neighbors.push(n.node);
                }
            }
        }
        s_neighbors.sort_unstable();
        s_neighbors.dedup();
        t_neighbors.sort_unstable();
        t_neighbors.dedup();
        for &node in &s_neighbors {
            center.add_edge(s, node, 1, true);
        }
        for &node in &t_neighbors {
            center.add_edge(t, node, 1, true);
        }
        let cuts = center.min_vertex_cuts();
        // Detach the terminals; their edges were appended last, t after s.
        for &node in &t_neighbors {
            let popped = center.neighbors_mut(node).pop();
            debug_assert_eq!(popped.map(|n| n.node), Some(t));
        }
        for &node in &s_neighbors {
            let popped = center.neighbors_mut(node).pop();
            debug_assert_eq!(popped.map(|n| n.node), Some(s));
        }
        self.assign_nodes();
        cuts
    }

    /// Rebuilds both sides of `p` from the components left after removing
    /// its cut, balancing component by component.
    pub(crate) fn complete_partition(&mut self, p: &mut Partition) {
        debug_assert!(self.is_consistent());
        p.cut.sort_unstable();
        p.cut.dedup();
        self.remove_nodes(&p.cut);
        p.left.clear();
        p.right.clear();
        let mut components = self.get_connected_components();
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));
        for cc in &components {
            add_to_smaller(&mut p.left, &mut p.right, cc);
        }
        for &node in &p.cut {
            self.add_node(node);
        }
        debug_assert_eq!(p.left.len() + p.right.len() + p.cut.len(), self.nodes.len());
    }

    /// Produces a balanced partition of this subgraph: rough split, flow
    /// refinement, and selection of the better-rated cut side.
    pub(crate) fn create_partition(&mut self, balance: f64) -> Partition {
        debug_assert!(self.is_consistent());
        assert!(self.nodes.len() > 1);
        let mut p = Partition::default();
        if self.get_rough_partition(&mut p, balance, true) {
            trace!(rating = p.rating(), "rough partition is final");
            return p;
        }
        let cuts = self.rough_partition_to_cuts(&p);
        debug_assert!(!cuts.is_empty());
        let mut best: Option<Partition> = None;
        for cut in cuts {
            let mut candidate = Partition { cut, ..Partition::default() };
            self.complete_partition(&mut candidate);
            let better = best
                .as_ref()
                .map_or(true, |b| OrderedFloat(b.rating()) < OrderedFloat(candidate.rating()));
            if better {
                best = Some(candidate);
            }
        }
        let p = best.expect("at least one cut candidate");
        trace!(left = p.left.len(), cut = p.cut.len(), right = p.right.len(), "partition");
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_prefers_small_balanced_cuts() {
        let balanced = Partition { left: vec![1, 2], cut: vec![3], right: vec![4, 5] };
        let lopsided = Partition { left: vec![1], cut: vec![3], right: vec![2, 4, 5] };
        let fat_cut = Partition { left: vec![1, 2], cut: vec![3, 6], right: vec![4, 5] };
        assert!(balanced.rating() > lopsided.rating());
        assert!(balanced.rating() > fat_cut.rating());
    }

    #[test]
    fn connected_components_cover_the_subgraph() {
        let mut g = Graph::new(6);
        g.add_edge(1, 2, 1, true);
        g.add_edge(3, 4, 1, true);
        g.add_edge(4, 5, 1, true);
        g.remove_isolated();
        let mut components = g.get_connected_components();
        for c in &mut components {
            c.sort_unstable();
        }
        components.sort();
        assert_eq!(components, vec![vec![1, 2], vec![3, 4, 5]]);
        // Membership stamps survive the traversal.
        assert!(g.contains(1) && g.contains(5));
    }

    #[test]
    fn partition_of_a_path_cuts_near_the_middle() {
        let mut g = Graph::new(9);
        for v in 1..9 {
            g.add_edge(v, v + 1, 1, true);
        }
        let p = g.create_partition(0.25);
        assert_eq!(p.cut.len(), 1);
        assert_eq!(p.left.len() + p.right.len(), 8);
        assert!(p.left.len() >= 2 && p.right.len() >= 2);
    }

    #[test]
    fn disconnected_subgraph_splits_without_a_cut() {
        let mut g = Graph::new(4);
        g.add_edge(1, 2, 1, true);
        g.add_edge(3, 4, 1, true);
        let p = g.create_partition(0.2);
        assert!(p.cut.is_empty());
        assert_eq!(p.left.len(), 2);
        assert_eq!(p.right.len(), 2);
    }

    #[test]
    fn two_cliques_cut_at_the_bridge_vertex() {
        // K4 and K4 sharing vertex 4.
        let mut g = Graph::new(7);
        for (a, b) in [(1, 2), (1, 3), (2, 3), (1, 4), (2, 4), (3, 4)] {
            g.add_edge(a, b, 1, true);
        }
        for (a, b) in [(5, 6), (5, 7), (6, 7), (5, 4), (6, 4), (7, 4)] {
            g.add_edge(a, b, 1, true);
        }
        let p = g.create_partition(0.25);
        assert_eq!(p.cut, vec![4]);
        assert_eq!(p.left.len(), 3);
        assert_eq!(p.right.len(), 3);
    }
}
