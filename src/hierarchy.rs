//! Recursive cut-based labeling: partition, order and label each separator,
//! insert border shortcuts for the children, and recurse (in parallel on
//! large subgraphs).
//!
//! Separator distances are labeled eagerly at each level because the border
//! shortcut insertion one level down compares child-internal distances
//! against 2-hop distances through the parent separator. These eager label
//! values are scaffolding only: the shortcut-graph pass re-initializes every
//! label array before computing the final distances and path counts.
//!
//! Border shortcuts are equally transient. They keep subgraph-internal
//! distances equal to global distances while the recursion runs, but a
//! shortcut summarizes paths that the label arrays already account for, so
//! leaving one in the adjacency lists would count its paths twice. Every
//! insertion is therefore logged and rolled back once the recursion
//! finishes.

use std::sync::Mutex;

use tracing::{
    debug,
    info,
    instrument,
};

use crate::graph::{
    Graph,
    PARALLEL_SEARCHES,
};
use crate::index::{
    block_offset,
    cut_level_distance,
    CutIndex,
};
use crate::model::{
    add_distance,
    NodeID,
    MAX_CUT_LEVEL,
};
use crate::partition::Partition;
use crate::sync::SharedCell;

/// Shared build-side label table, one slot per vertex id. Sibling recursion
/// tasks write disjoint slots; parent-separator slots are finalized before
/// the children spawn.
pub(crate) type CutSlots = [SharedCell<CutIndex>];

/// Undo record for one transient border shortcut.
struct ShortcutRecord {
    /// One endpoint.
    a: NodeID,
    /// The other endpoint.
    b: NodeID,
    /// Weight of the pre-existing edge the shortcut lowered, if any.
    previous: Option<crate::model::Distance>,
}

/// Log of inserted border shortcuts, shared across recursion threads.
type ShortcutLog = Mutex<Vec<ShortcutRecord>>;

/// Index of the unordered pair `(a, b)` in a flat half-matrix.
fn hmi(a: usize, b: usize) -> usize {
    debug_assert_ne!(a, b);
    if a < b {
        (b * (b - 1)) / 2 + a
    } else {
        (a * (a - 1)) / 2 + b
    }
}

impl Graph {
    /// Inserts shortcut edges among the border of this subgraph (the
    /// neighbors of the parent separator), preserving distances that ran
    /// through the separator.
    ///
    /// A shortcut `(i, j)` is added when the subgraph-internal distance
    /// exceeds the best distance through the already-labeled parent
    /// separator, unless a third border vertex witnesses that distance.
    fn add_shortcuts(&mut self, cut: &[NodeID], ci: &CutSlots, log: &ShortcutLog) {
        debug_assert!(self.is_consistent());
        if cut.is_empty() {
            return;
        }
        let mut border: Vec<NodeID> = Vec::new();
        for &cut_node in cut {
            for n in self.neighbors(cut_node) {
                if self.contains(n.node) {
                    border.push(n.node);
                }
            }
        }
        border.sort_unstable();
        border.dedup();
        if border.len() < 2 {
            return;
        }
        let cut_level = ci[cut[0] as usize].as_ref().cut_level as usize;
        // Pairwise distances inside the subgraph, and the best known in the
        // full graph (through the separator labels).
        let pair_count = border.len() * (border.len() - 1) / 2;
        let mut d_partition = vec![0; pair_count];
        let mut d_graph = vec![0; pair_count];
        let fill_pair = |d_partition: &mut Vec<u32>, d_graph: &mut Vec<u32>, i: usize, j: usize, d_ij: u32| {
            let d_cut = cut_level_distance(
                ci[border[i] as usize].as_ref(),
                ci[border[j] as usize].as_ref(),
                cut_level,
            );
            d_partition[hmi(i, j)] = d_ij;
            d_graph[hmi(i, j)] = d_ij.min(d_cut);
        };
        if self.node_count() > self.thread_threshold() {
            for chunk_start in (0..border.len()).step_by(PARALLEL_SEARCHES) {
                let chunk_end = (chunk_start + PARALLEL_SEARCHES).min(border.len());
                self.run_dijkstra_par(&border[chunk_start..chunk_end]);
                for slot in 0..chunk_end - chunk_start {
                    let i = chunk_start + slot;
                    for j in 0..i {
                        let d_ij = self.slot_distance(border[j], slot);
                        fill_pair(&mut d_partition, &mut d_graph, i, j, d_ij);
                    }
                }
            }
        } else {
            for i in 1..border.len() {
                self.run_dijkstra(border[i]);
                for j in 0..i {
                    let d_ij = self.scratch_distance(border[j]);
                    fill_pair(&mut d_partition, &mut d_graph, i, j, d_ij);
                }
            }
        }
        // Separate pass: the redundancy check needs the full half-matrix.
        let mut idx_ij = 0;
        let mut added = 0usize;
        for i in 1..border.len() {
            for j in 0..i {
                debug_assert_eq!(idx_ij, hmi(i, j));
                let dg_ij = d_graph[idx_ij];
                if d_partition[idx_ij] > dg_ij {
                    let redundant = (0..border.len()).any(|k| {
                        k != i && k != j && add_distance(d_graph[hmi(i, k)], d_graph[hmi(k, j)]) == dg_ij
                    });
                    if !redundant {
                        let previous = self
                            .neighbors(border[i])
                            .iter()
                            .find(|n| n.node == border[j])
                            .map(|n| n.distance);
                        log.lock()
                            .expect("shortcut log poisoned")
                            .push(ShortcutRecord { a: border[i], b: border[j], previous });
                        self.add_edge(border[i], border[j], dg_ij, true);
                        added += 1;
                    }
                }
                idx_ij += 1;
            }
        }
        debug!(border = border.len(), added, "inserted border shortcuts");
    }

    /// Orders a fresh separator by pruning potential: vertices whose
    /// shortest-path trees cover few vertices exclusively come first, so the
    /// higher-value separator members take the later label slots.
    fn sort_cut_for_pruning(&self, cut: &mut [NodeID]) {
        let mut potential: Vec<(usize, NodeID)> = cut.iter().map(|&node| (0, node)).collect();
        for &node in cut.iter() {
            self.set_landmark_level(node, 1);
        }
        if self.node_count() > self.thread_threshold() {
            for chunk_start in (0..cut.len()).step_by(PARALLEL_SEARCHES) {
                let chunk_end = (chunk_start + PARALLEL_SEARCHES).min(cut.len());
                self.run_dijkstra_flagged_par(&cut[chunk_start..chunk_end]);
                for slot in 0..chunk_end - chunk_start {
                    for &node in &self.nodes {
                        if self.slot_distance(node, slot) & 1 == 0 {
                            potential[chunk_start + slot].0 += 1;
                        }
                    }
                }
            }
        } else {
            for c in 0..cut.len() {
                self.run_dijkstra_flagged(cut[c]);
                for &node in &self.nodes {
                    // An even distance flag means the vertex was reached only
                    // through separator members.
                    if self.scratch_distance(node) & 1 == 0 {
                        potential[c].0 += 1;
                    }
                }
            }
        }
        potential.sort_unstable();
        for (c, &(_, node)) in potential.iter().enumerate() {
            cut[c] = node;
        }
    }

    /// Appends this separator's distance labels to every member of the
    /// subgraph, in separator order. Separator members receive truncated
    /// blocks ending at their own slot.
    fn label_cut(&self, cut: &[NodeID], ci: &CutSlots) {
        let takes_label = |g: &Self, node: NodeID, c: usize| {
            let lm = g.landmark_level(node) as usize;
            lm == 0 || cut.len() - lm >= c
        };
        if self.node_count() > self.thread_threshold() {
            for chunk_start in (0..cut.len()).step_by(PARALLEL_SEARCHES) {
                let chunk_end = (chunk_start + PARALLEL_SEARCHES).min(cut.len());
                self.run_dijkstra_par(&cut[chunk_start..chunk_end]);
                for slot in 0..chunk_end - chunk_start {
                    let c = chunk_start + slot;
                    for &node in &self.nodes {
                        if takes_label(self, node, c) {
                            ci[node as usize].as_mut().distances.push(self.slot_distance(node, slot));
                        }
                    }
                }
            }
        } else {
            for (c, &cut_node) in cut.iter().enumerate() {
                self.run_dijkstra(cut_node);
                for &node in &self.nodes {
                    if takes_label(self, node, c) {
                        ci[node as usize].as_mut().distances.push(self.scratch_distance(node));
                    }
                }
            }
        }
    }

    /// Recursion step over one partition side: carve the subgraph, insert
    /// border shortcuts, and extend the labeling below.
    fn extend_on_partition(
        &self,
        ci: &CutSlots,
        balance: f64,
        cut_level: u16,
        part: &[NodeID],
        cut: &[NodeID],
        log: &ShortcutLog,
    ) {
        if part.len() > 1 {
            let mut g = self.subgraph(part.iter().copied());
            g.add_shortcuts(cut, ci, log);
            g.extend_cut_index(ci, balance, cut_level + 1, log);
        } else if part.len() == 1 {
            // Singleton leaf: one label slot for the vertex itself; its
            // value is produced by the shortcut-graph pass.
            let entry = ci[part[0] as usize].as_mut();
            entry.cut_level = cut_level + 1;
            let prev = entry.dist_index[cut_level as usize];
            entry.dist_index.push(prev + 1);
            debug_assert!(entry.is_consistent(false));
        }
    }

    /// Recursively partitions the subgraph, writing separator labels,
    /// partition bits and prefix sums at `cut_level`.
    fn extend_cut_index(&mut self, ci: &CutSlots, balance: f64, cut_level: u16, log: &ShortcutLog) {
        debug_assert!(self.is_consistent());
        assert!(cut_level <= MAX_CUT_LEVEL);
        if self.node_count() < 2 {
            debug_assert_eq!(cut_level, 0);
            for &node in &self.nodes {
                let entry = ci[node as usize].as_mut();
                entry.cut_level = 0;
                entry.dist_index.push(0);
            }
            return;
        }
        let p = if cut_level < MAX_CUT_LEVEL {
            self.create_partition(balance)
        } else {
            // Tree height exhausted: everything left becomes one separator.
            Partition { cut: self.nodes.clone(), ..Partition::default() }
        };
        let mut cut = p.cut;
        self.sort_cut_for_pruning(&mut cut);
        // Landmark levels encode each separator member's slot position for
        // the truncated-block bookkeeping below.
        for (c, &node) in cut.iter().enumerate() {
            self.set_landmark_level(node, (cut.len() - c) as u16);
        }
        for &node in &self.nodes {
            let entry = ci[node as usize].as_mut();
            debug_assert_eq!(entry.dist_index.len(), cut_level as usize);
            let prev = block_offset(&entry.dist_index, cut_level as usize);
            let lm = self.landmark_level(node) as usize;
            let block = if lm == 0 { cut.len() } else { cut.len() - lm + 1 };
            entry.dist_index.push(prev + block as u16);
        }
        for &node in &cut {
            let entry = ci[node as usize].as_mut();
            entry.cut_level = cut_level;
            debug_assert!(entry.is_consistent(false));
        }
        for &node in &p.right {
            ci[node as usize].as_mut().partition |= 1 << cut_level;
        }
        self.label_cut(&cut, ci);
        for &node in &cut {
            self.set_landmark_level(node, 0);
        }
        // Recurse; the sides are vertex-disjoint, so the left side can run
        // on its own thread.
        if self.node_count() > self.thread_threshold() {
            std::thread::scope(|scope| {
                scope.spawn(|| self.extend_on_partition(ci, balance, cut_level, &p.left, &cut, log));
                self.extend_on_partition(ci, balance, cut_level, &p.right, &cut, log);
            });
        } else {
            self.extend_on_partition(ci, balance, cut_level, &p.left, &cut, log);
            self.extend_on_partition(ci, balance, cut_level, &p.right, &cut, log);
        }
    }

    /// Builds the full cut-based labeling of this graph.
    ///
    /// `balance` bounds the smaller side of every partition (0 < balance ≤
    /// 0.5). The returned entries carry the decomposition (partition bits,
    /// cut levels, prefix sums) and the transient separator labels; final
    /// label values are produced by
    /// [`Self::build_shortcut_graph`](Graph::build_shortcut_graph).
    #[instrument(skip_all, fields(nodes = self.node_count(), balance))]
    pub fn create_cut_index(&mut self, balance: f64) -> Vec<CutIndex> {
        debug_assert!(self.is_undirected());
        // Sorted adjacency keeps the decomposition deterministic.
        for &node in &self.nodes {
            self.neighbors_mut(node).sort_unstable();
        }
        let original_nodes = self.nodes.clone();
        let slots: Vec<SharedCell<CutIndex>> =
            (0..=self.max_node_id()).map(|_| SharedCell::new(CutIndex::default())).collect();
        let log: ShortcutLog = Mutex::new(Vec::new());
        self.extend_cut_index(&slots, balance, 0, &log);
        // Top-level separator vertices were removed from the member list
        // during recursion.
        self.nodes = original_nodes;
        self.assign_nodes();
        // Roll the transient border shortcuts back: their paths are covered
        // by the labels, so they must not survive into the shortcut graph.
        let records = log.into_inner().expect("shortcut log poisoned");
        let shortcut_count = records.len();
        for rec in records.into_iter().rev() {
            match rec.previous {
                Some(weight) => {
                    self.update_edge(rec.a, rec.b, weight);
                    self.update_edge(rec.b, rec.a, weight);
                },
                None => self.remove_edge(rec.a, rec.b),
            }
        }
        let ci: Vec<CutIndex> = slots.into_iter().map(SharedCell::into_inner).collect();
        debug_assert!(self.nodes.iter().all(|&node| ci[node as usize].is_consistent(false)));
        info!(
            height = ci.iter().map(|e| e.cut_level).max().unwrap_or(0),
            shortcuts = shortcut_count,
            "cut index constructed"
        );
        ci
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Distance;

    fn cut_index_for(edges: &[(NodeID, NodeID, Distance)], n: usize) -> (Graph, Vec<CutIndex>) {
        let mut g = Graph::new(n);
        for &(a, b, d) in edges {
            g.add_edge(a, b, d, true);
        }
        let ci = g.create_cut_index(0.25);
        (g, ci)
    }

    #[test]
    fn dist_index_is_monotone_and_partition_bits_bounded() {
        let (g, ci) = cut_index_for(&[(1, 2, 1), (2, 3, 1), (3, 4, 1), (4, 5, 1), (1, 5, 2)], 5);
        for &node in g.get_nodes() {
            let entry = &ci[node as usize];
            assert!(entry.is_consistent(false), "inconsistent entry for {node}");
            assert_eq!(entry.dist_index.len(), entry.cut_level as usize + 1);
            assert!(entry.partition < (1 << entry.cut_level));
        }
    }

    #[test]
    fn separator_members_terminate_at_their_level() {
        let (g, ci) = cut_index_for(&[(1, 2, 1), (2, 3, 1), (3, 4, 1), (4, 5, 1), (5, 6, 1)], 6);
        // Each cut member's final block ends at its own slot: the prefix sum
        // grows by at most the full cut size.
        for &node in g.get_nodes() {
            let entry = &ci[node as usize];
            let own_level = entry.cut_level as usize;
            let own_block = entry.dist_index[own_level] - block_offset(&entry.dist_index, own_level);
            assert!(own_block >= 1);
        }
    }

    #[test]
    fn eager_separator_labels_cover_members() {
        let (g, ci) = cut_index_for(&[(1, 2, 1), (2, 3, 1), (3, 4, 1)], 4);
        // Every member carries one transient distance per label slot of its
        // ancestor separators (its own singleton slot is filled later).
        for &node in g.get_nodes() {
            let entry = &ci[node as usize];
            assert!(entry.distances.len() >= entry.label_count().saturating_sub(1));
        }
    }

    #[test]
    fn half_matrix_index_is_dense() {
        let mut seen = std::collections::HashSet::new();
        for a in 0..5 {
            for b in 0..a {
                assert!(seen.insert(hmi(a, b)));
                assert_eq!(hmi(a, b), hmi(b, a));
            }
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(*seen.iter().max().unwrap(), 9);
    }
}
