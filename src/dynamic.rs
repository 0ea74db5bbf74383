//! Dynamic maintenance after edge-weight changes: repair the shortcut DAG,
//! then propagate the repairs into the distance labels (sequential,
//! optimized and parallel variants), plus the pendant-chain offset updates
//! for changes touching contracted vertices.

use std::collections::BinaryHeap;

use tracing::{
    debug,
    instrument,
};

use crate::graph::{
    Graph,
    PARALLEL_SEARCHES,
};
use crate::index::ContractionIndex;
use crate::model::{
    add_distance,
    Distance,
    NodeID,
    PathCount,
    INFINITY,
};
use crate::shortcut::{
    ShortcutGraph,
    UpEdge,
};
use crate::sync::{
    MinBucketQueue,
    TsBucketQueue,
};

/// High bit of a label path count, marking a slot with a pending update in
/// the optimized variants.
const PENDING: PathCount = 1 << 15;

/// A weight change on a core edge, with both the previous and the new
/// weight. The underlying graph must already carry the new weight.
#[derive(Clone, Copy, Debug)]
pub struct EdgeUpdate {
    /// One endpoint.
    pub a: NodeID,
    /// The other endpoint.
    pub b: NodeID,
    /// Weight before the change.
    pub old: Distance,
    /// Weight after the change.
    pub new: Distance,
}

/// A weight change on a pendant-chain edge, translated into the affected
/// vertex's new chain offset.
#[derive(Clone, Copy, Debug)]
pub struct PendantUpdate {
    /// The pendant vertex whose offset changes.
    pub node: NodeID,
    /// Offset before the change (precondition for applying).
    pub old_offset: Distance,
    /// Offset after the change.
    pub new_offset: Distance,
}

/// A repaired DAG edge handed from the shortcut phase to the label phase.
/// On decrease it carries the new (distance, count); on increase the old
/// distance and the count being removed.
#[derive(Clone, Copy, Debug)]
struct ShortcutChange {
    /// Higher-slot endpoint.
    v: NodeID,
    /// Lower-slot endpoint.
    w: NodeID,
    /// Edge distance (see above).
    distance: Distance,
    /// Path count (see above).
    paths: PathCount,
}

/// Queue entry of the DAG repair phases, popped in descending slot order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DagUpdate {
    /// Slot index of `v`; the heap key.
    slot: u16,
    /// Higher-slot endpoint of the edge under repair.
    v: NodeID,
    /// Lower-slot endpoint.
    w: NodeID,
    /// Candidate distance.
    distance: Distance,
    /// Candidate path count.
    paths: PathCount,
}

/// Queue entry of the sequential/optimized label phases.
#[derive(Clone, Copy, Debug)]
struct LabelUpdate {
    /// Vertex whose label is touched.
    v: NodeID,
    /// Label slot index.
    i: u16,
    /// Candidate (or captured original) distance.
    distance: Distance,
    /// Candidate (or captured original) path count.
    paths: PathCount,
}

/// Queue entry of the parallel label phase; the slot index is the bucket
/// key.
#[derive(Clone, Copy, Debug)]
struct SlotUpdate {
    /// Vertex whose label is touched.
    v: NodeID,
    /// Candidate distance.
    distance: Distance,
    /// Candidate path count.
    paths: PathCount,
}

/// Sorts a change set by edge and combines duplicates, keeping the shorter
/// distance and accumulating counts on ties.
fn merge_changes(changes: &mut Vec<ShortcutChange>) {
    if changes.len() < 2 {
        return;
    }
    changes.sort_unstable_by_key(|c| (c.v, c.w, c.distance, c.paths));
    let mut merged: Vec<ShortcutChange> = Vec::with_capacity(changes.len());
    for c in changes.drain(..) {
        match merged.last_mut() {
            Some(last) if last.v == c.v && last.w == c.w => {
                if c.distance < last.distance {
                    *last = c;
                } else if c.distance == last.distance {
                    last.paths = last.paths.wrapping_add(c.paths);
                }
            },
            _ => merged.push(c),
        }
    }
    *changes = merged;
}

/// Orders an edge so the higher-slot endpoint comes first.
fn by_slot(ch: &ShortcutGraph, a: NodeID, b: NodeID) -> (NodeID, NodeID) {
    if ch.dist_index(a) < ch.dist_index(b) {
        (b, a)
    } else {
        (a, b)
    }
}

impl Graph {
    /// Repairs the DAG after weight decreases, bottom-up over the affected
    /// edges; returns the merged set of improved edges.
    fn repair_shortcuts_decrease(&self, ch: &mut ShortcutGraph, updates: &[EdgeUpdate]) -> Vec<ShortcutChange> {
        let mut q: BinaryHeap<DagUpdate> = BinaryHeap::new();
        for u in updates {
            let (a, b) = by_slot(ch, u.a, u.b);
            if ch.up_edge(a, b).distance >= u.new {
                q.push(DagUpdate { slot: ch.dist_index(a), v: a, w: b, distance: u.new, paths: 1 });
            }
        }
        let mut changes = Vec::new();
        while let Some(next) = q.pop() {
            {
                let x = ch.up_edge_mut(next.v, next.w);
                if next.distance < x.distance {
                    x.distance = next.distance;
                    x.paths = next.paths;
                } else if next.distance == x.distance {
                    x.paths = x.paths.wrapping_add(next.paths);
                } else {
                    continue;
                }
            }
            // The repaired edge may improve the implied shortcut between its
            // lower endpoint and every other up target of v.
            let up = ch.nodes[next.v as usize].up.clone();
            for n in up {
                if n.node == next.w {
                    continue;
                }
                let dist = add_distance(next.distance, n.distance);
                let count = next.paths.wrapping_mul(n.paths);
                let (a, b) = by_slot(ch, next.w, n.node);
                if ch.up_edge(a, b).distance >= dist {
                    q.push(DagUpdate { slot: ch.dist_index(a), v: a, w: b, distance: dist, paths: count });
                }
            }
            changes.push(ShortcutChange { v: next.v, w: next.w, distance: next.distance, paths: next.paths });
        }
        merge_changes(&mut changes);
        debug!(changed = changes.len(), "shortcut edges improved");
        changes
    }

    /// Repairs the DAG after weight increases; returns the merged set of
    /// formerly-shortest edges with the counts they lose.
    fn repair_shortcuts_increase(&self, ch: &mut ShortcutGraph, updates: &[EdgeUpdate]) -> Vec<ShortcutChange> {
        let mut q: BinaryHeap<DagUpdate> = BinaryHeap::new();
        for u in updates {
            let (a, b) = by_slot(ch, u.a, u.b);
            if ch.up_edge(a, b).distance == u.old {
                q.push(DagUpdate { slot: ch.dist_index(a), v: a, w: b, distance: u.old, paths: 1 });
            }
        }
        let mut changes = Vec::new();
        while let Some(next) = q.pop() {
            let up = ch.nodes[next.v as usize].up.clone();
            for n in &up {
                if n.node == next.w {
                    continue;
                }
                let dist = add_distance(next.distance, n.distance);
                let count = next.paths.wrapping_mul(n.paths);
                let (a, b) = by_slot(ch, next.w, n.node);
                if ch.up_edge(a, b).distance == dist {
                    q.push(DagUpdate { slot: ch.dist_index(a), v: a, w: b, distance: dist, paths: count });
                }
            }
            let x = ch.up_edge(next.v, next.w);
            let repaired = if x.paths > next.paths {
                // Only some of the shortest paths died; the distance stands.
                UpEdge { node: next.w, distance: x.distance, paths: x.paths - next.paths }
            } else {
                // All counted paths died: recompute the edge from the
                // underlying graph edge and the common down-neighbors.
                let mut distance = INFINITY;
                let mut paths: PathCount = 1;
                if let Some(n) = self.neighbors(next.v).iter().find(|n| n.node == next.w) {
                    distance = n.distance;
                }
                let dv = &ch.nodes[next.v as usize].down;
                let dw = &ch.nodes[next.w as usize].down;
                let (mut i, mut j) = (0, 0);
                while i < dv.len() && j < dw.len() {
                    match dv[i].cmp(&dw[j]) {
                        std::cmp::Ordering::Less => i += 1,
                        std::cmp::Ordering::Greater => j += 1,
                        std::cmp::Ordering::Equal => {
                            let av = ch.up_edge(dv[i], next.v);
                            let aw = ch.up_edge(dv[i], next.w);
                            let dist = add_distance(av.distance, aw.distance);
                            let count = av.paths.wrapping_mul(aw.paths);
                            if dist < distance {
                                distance = dist;
                                paths = count;
                            } else if dist == distance {
                                paths = paths.wrapping_add(count);
                            }
                            i += 1;
                            j += 1;
                        },
                    }
                }
                UpEdge { node: next.w, distance, paths }
            };
            *ch.up_edge_mut(next.v, next.w) = repaired;
            changes.push(ShortcutChange { v: next.v, w: next.w, distance: next.distance, paths: next.paths });
        }
        merge_changes(&mut changes);
        debug!(changed = changes.len(), "shortcut edges degraded");
        changes
    }

    /// Seeds the label phase of a decrease: every improved edge (v, w)
    /// proposes `distance + label(w)[i]` for each ancestor slot i of w.
    fn seed_decrease(
        ch: &ShortcutGraph,
        ci: &ContractionIndex,
        changes: &[ShortcutChange],
        mut push: impl FnMut(NodeID, usize, Distance, PathCount),
    ) {
        for c in changes {
            let a = ci.label(c.v).cut_index.as_ref().expect("core vertex has labels").clone();
            let w_slot = ch.dist_index(c.w) as usize;
            if c.distance <= a.distance(w_slot) {
                let b = ci.label(c.w).cut_index.as_ref().expect("core vertex has labels").clone();
                for i in 0..=w_slot {
                    let dist = add_distance(c.distance, b.distance(i));
                    if a.distance(i) >= dist {
                        push(c.v, i, dist, c.paths.wrapping_mul(b.path(i)));
                    }
                }
            }
        }
    }

    /// Seeds the label phase of an increase: every degraded edge proposes
    /// the count removal for each ancestor slot still matching the old
    /// distance.
    fn seed_increase(
        ch: &ShortcutGraph,
        ci: &ContractionIndex,
        changes: &[ShortcutChange],
        mut push: impl FnMut(NodeID, usize, Distance, PathCount),
    ) {
        for c in changes {
            let a = ci.label(c.v).cut_index.as_ref().expect("core vertex has labels").clone();
            let w_slot = ch.dist_index(c.w) as usize;
            if c.distance == a.distance(w_slot) {
                let b = ci.label(c.w).cut_index.as_ref().expect("core vertex has labels").clone();
                for i in 0..=w_slot {
                    let dist = add_distance(c.distance, b.distance(i));
                    if dist == a.distance(i) {
                        push(c.v, i, dist, c.paths.wrapping_mul(b.path(i)));
                    }
                }
            }
        }
    }

    /// Recomputes label slot `i` of `v` from scratch over its up edges.
    fn recompute_label_slot(ch: &ShortcutGraph, ci: &ContractionIndex, v: NodeID, i: usize) {
        let cv = ci.label(v).cut_index.as_ref().expect("core vertex has labels").clone();
        cv.set_distance(i, INFINITY);
        for e in &ch.nodes[v as usize].up {
            if ch.dist_index(e.node) as usize >= i {
                let cu = ci.label(e.node).cut_index.as_ref().expect("core vertex has labels");
                let dist = add_distance(e.distance, cu.distance(i));
                let count = e.paths.wrapping_mul(cu.path(i));
                if dist < cv.distance(i) {
                    cv.set_distance(i, dist);
                    cv.set_path(i, count);
                } else if dist == cv.distance(i) {
                    cv.set_path(i, cv.path(i).wrapping_add(count));
                }
            }
        }
    }

    /// Applies weight decreases end to end: DAG repair, then label repair
    /// through ancestors and descendants, one update at a time.
    #[instrument(skip_all, fields(updates = updates.len()))]
    pub fn propagate_decrease(&self, ch: &mut ShortcutGraph, ci: &ContractionIndex, updates: &[EdgeUpdate]) {
        let changes = self.repair_shortcuts_decrease(ch, updates);
        let ch = &*ch;
        let mut q: MinBucketQueue<LabelUpdate> = MinBucketQueue::new();
        Self::seed_decrease(ch, ci, &changes, |v, i, distance, paths| {
            q.push(LabelUpdate { v, i: i as u16, distance, paths }, ch.dist_index(v) as usize);
        });
        while let Some(next) = q.pop() {
            let cv = ci.label(next.v).cut_index.as_ref().expect("core vertex has labels").clone();
            let i = next.i as usize;
            if cv.distance(i) > next.distance {
                cv.set_distance(i, next.distance);
                cv.set_path(i, next.paths);
            } else if cv.distance(i) == next.distance {
                cv.set_path(i, cv.path(i).wrapping_add(next.paths));
            } else {
                continue;
            }
            for &u in &ch.nodes[next.v as usize].down {
                let x = ch.up_edge(u, next.v);
                let dist = add_distance(x.distance, next.distance);
                let cu = ci.label(u).cut_index.as_ref().expect("core vertex has labels");
                if cu.distance(i) >= dist {
                    q.push(
                        LabelUpdate { v: u, i: next.i, distance: dist, paths: x.paths.wrapping_mul(next.paths) },
                        ch.dist_index(u) as usize,
                    );
                }
            }
        }
    }

    /// Applies weight increases end to end, subtracting dead counts and
    /// recomputing slots whose counts drain completely.
    #[instrument(skip_all, fields(updates = updates.len()))]
    pub fn propagate_increase(&self, ch: &mut ShortcutGraph, ci: &ContractionIndex, updates: &[EdgeUpdate]) {
        let changes = self.repair_shortcuts_increase(ch, updates);
        let ch = &*ch;
        let mut q: MinBucketQueue<LabelUpdate> = MinBucketQueue::new();
        Self::seed_increase(ch, ci, &changes, |v, i, distance, paths| {
            q.push(LabelUpdate { v, i: i as u16, distance, paths }, ch.dist_index(v) as usize);
        });
        while let Some(next) = q.pop() {
            let cv = ci.label(next.v).cut_index.as_ref().expect("core vertex has labels").clone();
            let i = next.i as usize;
            for &u in &ch.nodes[next.v as usize].down {
                let x = ch.up_edge(u, next.v);
                let cu = ci.label(u).cut_index.as_ref().expect("core vertex has labels");
                let dist = add_distance(x.distance, cv.distance(i));
                if dist == cu.distance(i) {
                    q.push(
                        LabelUpdate { v: u, i: next.i, distance: dist, paths: x.paths.wrapping_mul(next.paths) },
                        ch.dist_index(u) as usize,
                    );
                }
            }
            if cv.path(i) > next.paths {
                cv.set_path(i, cv.path(i) - next.paths);
            } else {
                Self::recompute_label_slot(ch, ci, next.v, i);
            }
        }
    }

    /// Captures a slot's original values into the queue on first touch,
    /// marking it pending, then applies the decrease in place.
    fn touch_and_decrease(
        q: &mut MinBucketQueue<LabelUpdate>,
        ch: &ShortcutGraph,
        ci: &ContractionIndex,
        v: NodeID,
        i: usize,
        dist: Distance,
        paths: PathCount,
    ) {
        let cv = ci.label(v).cut_index.as_ref().expect("core vertex has labels").clone();
        if cv.path(i) & PENDING == 0 {
            q.push(
                LabelUpdate { v, i: i as u16, distance: cv.distance(i), paths: cv.path(i) },
                ch.dist_index(v) as usize,
            );
            cv.set_path(i, cv.path(i) | PENDING);
        }
        if cv.distance(i) > dist {
            cv.set_distance(i, dist);
            cv.set_path(i, paths | PENDING);
        } else {
            cv.set_path(i, cv.path(i).wrapping_add(paths));
        }
    }

    /// Increase-side counterpart of [`Self::touch_and_decrease`].
    fn touch_and_subtract(
        q: &mut MinBucketQueue<LabelUpdate>,
        ch: &ShortcutGraph,
        ci: &ContractionIndex,
        v: NodeID,
        i: usize,
        paths: PathCount,
    ) {
        let cv = ci.label(v).cut_index.as_ref().expect("core vertex has labels").clone();
        if cv.path(i) & PENDING == 0 {
            q.push(
                LabelUpdate { v, i: i as u16, distance: cv.distance(i), paths: cv.path(i) },
                ch.dist_index(v) as usize,
            );
            cv.set_path(i, cv.path(i) | PENDING);
        }
        cv.set_path(i, cv.path(i).wrapping_sub(paths));
    }

    /// Decrease variant that coalesces updates converging on one slot: the
    /// slot is updated in place immediately, and only the net effect
    /// propagates when the slot is dequeued.
    #[instrument(skip_all, fields(updates = updates.len()))]
    pub fn propagate_decrease_optimized(&self, ch: &mut ShortcutGraph, ci: &ContractionIndex, updates: &[EdgeUpdate]) {
        let changes = self.repair_shortcuts_decrease(ch, updates);
        let ch = &*ch;
        let mut q: MinBucketQueue<LabelUpdate> = MinBucketQueue::new();
        Self::seed_decrease(ch, ci, &changes, |v, i, dist, paths| {
            Self::touch_and_decrease(&mut q, ch, ci, v, i, dist, paths);
        });
        while let Some(next) = q.pop() {
            let cv = ci.label(next.v).cut_index.as_ref().expect("core vertex has labels").clone();
            let i = next.i as usize;
            cv.set_path(i, cv.path(i) & !PENDING);
            // `next` carries the slot's original values; the difference is
            // the net count gained at the (possibly improved) distance.
            let convex = if cv.distance(i) == next.distance {
                cv.path(i).wrapping_sub(next.paths)
            } else if cv.distance(i) < next.distance {
                cv.path(i)
            } else {
                continue;
            };
            for &u in &ch.nodes[next.v as usize].down {
                let x = ch.up_edge(u, next.v);
                let dist = add_distance(x.distance, cv.distance(i));
                let cu = ci.label(u).cut_index.as_ref().expect("core vertex has labels");
                if cu.distance(i) >= dist {
                    Self::touch_and_decrease(&mut q, ch, ci, u, i, dist, x.paths.wrapping_mul(convex));
                }
            }
        }
    }

    /// Increase variant with the same pending-slot coalescing.
    #[instrument(skip_all, fields(updates = updates.len()))]
    pub fn propagate_increase_optimized(&self, ch: &mut ShortcutGraph, ci: &ContractionIndex, updates: &[EdgeUpdate]) {
        let changes = self.repair_shortcuts_increase(ch, updates);
        let ch = &*ch;
        let mut q: MinBucketQueue<LabelUpdate> = MinBucketQueue::new();
        Self::seed_increase(ch, ci, &changes, |v, i, _dist, paths| {
            Self::touch_and_subtract(&mut q, ch, ci, v, i, paths);
        });
        while let Some(next) = q.pop() {
            let cv = ci.label(next.v).cut_index.as_ref().expect("core vertex has labels").clone();
            let i = next.i as usize;
            cv.set_path(i, cv.path(i) & !PENDING);
            let convex = next.paths.wrapping_sub(cv.path(i));
            for &u in &ch.nodes[next.v as usize].down {
                let x = ch.up_edge(u, next.v);
                let cu = ci.label(u).cut_index.as_ref().expect("core vertex has labels");
                let dist = add_distance(x.distance, cv.distance(i));
                if dist == cu.distance(i) {
                    Self::touch_and_subtract(&mut q, ch, ci, u, i, x.paths.wrapping_mul(convex));
                }
            }
            if cv.path(i) == 0 {
                Self::recompute_label_slot(ch, ci, next.v, i);
            }
        }
    }

    /// Parallel decrease: one bucket per label slot index, drained by a
    /// thread group; within a slot the propagation is single-threaded.
    #[instrument(skip_all, fields(updates = updates.len()))]
    pub fn propagate_decrease_parallel(&self, ch: &mut ShortcutGraph, ci: &ContractionIndex, updates: &[EdgeUpdate]) {
        let changes = self.repair_shortcuts_decrease(ch, updates);
        let ch = &*ch;
        let mut grouping: TsBucketQueue<SlotUpdate> = TsBucketQueue::new();
        Self::seed_decrease(ch, ci, &changes, |v, i, distance, paths| {
            grouping.push(SlotUpdate { v, distance, paths }, i);
        });
        let grouping = &grouping;
        std::thread::scope(|scope| {
            for _ in 0..PARALLEL_SEARCHES {
                scope.spawn(move || {
                    while let Some((bucket, i)) = grouping.next_bucket() {
                        let mut work = bucket;
                        while let Some(next) = work.pop() {
                            let cv = ci.label(next.v).cut_index.as_ref().expect("core vertex has labels");
                            if cv.distance(i) > next.distance {
                                cv.set_distance(i, next.distance);
                                cv.set_path(i, next.paths);
                            } else if cv.distance(i) == next.distance {
                                cv.set_path(i, cv.path(i).wrapping_add(next.paths));
                            } else {
                                continue;
                            }
                            for &u in &ch.nodes[next.v as usize].down {
                                let x = ch.up_edge(u, next.v);
                                let dist = add_distance(x.distance, next.distance);
                                let cu = ci.label(u).cut_index.as_ref().expect("core vertex has labels");
                                if cu.distance(i) >= dist {
                                    work.push(SlotUpdate {
                                        v: u,
                                        distance: dist,
                                        paths: x.paths.wrapping_mul(next.paths),
                                    });
                                }
                            }
                        }
                    }
                });
            }
        });
    }

    /// Parallel increase, same slot-per-bucket decomposition.
    #[instrument(skip_all, fields(updates = updates.len()))]
    pub fn propagate_increase_parallel(&self, ch: &mut ShortcutGraph, ci: &ContractionIndex, updates: &[EdgeUpdate]) {
        let changes = self.repair_shortcuts_increase(ch, updates);
        let ch = &*ch;
        let mut grouping: TsBucketQueue<SlotUpdate> = TsBucketQueue::new();
        Self::seed_increase(ch, ci, &changes, |v, i, distance, paths| {
            grouping.push(SlotUpdate { v, distance, paths }, i);
        });
        let grouping = &grouping;
        std::thread::scope(|scope| {
            for _ in 0..PARALLEL_SEARCHES {
                scope.spawn(move || {
                    while let Some((bucket, i)) = grouping.next_bucket() {
                        let mut work = bucket;
                        while let Some(next) = work.pop() {
                            let cv = ci.label(next.v).cut_index.as_ref().expect("core vertex has labels").clone();
                            for &u in &ch.nodes[next.v as usize].down {
                                let x = ch.up_edge(u, next.v);
                                let cu = ci.label(u).cut_index.as_ref().expect("core vertex has labels");
                                let dist = add_distance(x.distance, cv.distance(i));
                                if dist == cu.distance(i) {
                                    work.push(SlotUpdate {
                                        v: u,
                                        distance: dist,
                                        paths: x.paths.wrapping_mul(next.paths),
                                    });
                                }
                            }
                            if cv.path(i) > next.paths {
                                cv.set_path(i, cv.path(i) - next.paths);
                            } else {
                                Self::recompute_label_slot(ch, ci, next.v, i);
                            }
                        }
                    }
                });
            }
        });
    }

    /// Replays pendant-chain offset changes: sorted so nearer updates
    /// commit first, each walking its subtree by DFS, and stale updates
    /// (whose precondition no longer holds) short-circuit.
    #[instrument(skip_all, fields(updates = updates.len()))]
    pub fn propagate_pendant_updates(&self, ci: &mut ContractionIndex, mut updates: Vec<PendantUpdate>) {
        updates.sort_unstable_by_key(|u| (u.old_offset, u.new_offset, u.node));
        let mut stack: Vec<(Distance, NodeID)> = Vec::new();
        for u in updates {
            if u.old_offset != ci.label(u.node).distance_offset {
                continue;
            }
            stack.push((u.new_offset, u.node));
            while let Some((d, node)) = stack.pop() {
                ci.update_distance_offset(node, d);
                for n in self.neighbors(node) {
                    if ci.label(n.node).parent == node {
                        stack.push((d + n.distance, n.node));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::CutIndex;
    use crate::model::Edge;

    fn build(edges: &[(NodeID, NodeID, Distance)], n: usize) -> (Graph, ShortcutGraph, ContractionIndex) {
        let mut g = Graph::with_edges(
            n,
            &edges.iter().map(|&(a, b, d)| Edge::new(a, b, d)).collect::<Vec<_>>(),
        );
        let closest = g.contract();
        let mut ci: Vec<CutIndex> = g.create_cut_index(0.25);
        g.reset();
        let ch = g.build_shortcut_graph(&mut ci, &closest);
        let index = ContractionIndex::new(ci, &closest);
        (g, ch, index)
    }

    const DIAMOND: &[(NodeID, NodeID, Distance)] = &[(1, 2, 1), (1, 3, 1), (2, 4, 1), (3, 4, 1)];

    fn apply(g: &mut Graph, a: NodeID, b: NodeID, old: Distance, new: Distance) -> EdgeUpdate {
        g.update_edge(a, b, new);
        g.update_edge(b, a, new);
        EdgeUpdate { a, b, old, new }
    }

    #[test]
    fn diamond_queries_before_update() {
        let (_g, _ch, index) = build(DIAMOND, 4);
        assert_eq!(index.get_distance(1, 4), 2);
        assert_eq!(index.get_spc(1, 4), 2);
        assert_eq!(index.get_spc(2, 3), 2);
    }

    #[test]
    fn increase_kills_one_of_two_paths() {
        let (mut g, mut ch, index) = build(DIAMOND, 4);
        let u = apply(&mut g, 3, 4, 1, 10);
        g.propagate_increase(&mut ch, &index, &[u]);
        assert_eq!(index.get_distance(1, 4), 2);
        assert_eq!(index.get_spc(1, 4), 1);
        assert_eq!(index.get_distance(3, 4), 3);
        assert_eq!(index.get_spc(3, 4), 1);
        assert_eq!(index.get_spc(4, 3), 1);
    }

    #[test]
    fn decrease_reroutes_the_shortest_path() {
        // Diamond with weight 2 everywhere; decreasing one edge makes the
        // route through it uniquely shortest.
        let heavy: Vec<(NodeID, NodeID, Distance)> = DIAMOND.iter().map(|&(a, b, _)| (a, b, 2)).collect();
        let (mut g, mut ch, index) = build(&heavy, 4);
        assert_eq!(index.get_distance(1, 4), 4);
        assert_eq!(index.get_spc(1, 4), 2);
        let u = apply(&mut g, 3, 4, 2, 1);
        g.propagate_decrease(&mut ch, &index, &[u]);
        assert_eq!(index.get_distance(1, 4), 3);
        assert_eq!(index.get_spc(1, 4), 1);
        assert_eq!(index.get_distance(3, 4), 1);
    }

    #[test]
    fn optimized_variant_matches_sequential() {
        for new_weight in [10, 3] {
            let (mut g1, mut ch1, index1) = build(DIAMOND, 4);
            let u1 = apply(&mut g1, 3, 4, 1, new_weight);
            g1.propagate_increase(&mut ch1, &index1, &[u1]);

            let (mut g2, mut ch2, index2) = build(DIAMOND, 4);
            let u2 = apply(&mut g2, 3, 4, 1, new_weight);
            g2.propagate_increase_optimized(&mut ch2, &index2, &[u2]);

            for v in 1..=4 {
                for w in 1..=4 {
                    assert_eq!(index1.get_distance(v, w), index2.get_distance(v, w), "d({v},{w})");
                    assert_eq!(index1.get_spc(v, w), index2.get_spc(v, w), "spc({v},{w})");
                }
            }
        }
    }

    #[test]
    fn parallel_variant_matches_sequential() {
        let (mut g1, mut ch1, index1) = build(DIAMOND, 4);
        let u1 = apply(&mut g1, 2, 4, 1, 7);
        g1.propagate_increase(&mut ch1, &index1, &[u1]);

        let (mut g2, mut ch2, index2) = build(DIAMOND, 4);
        let u2 = apply(&mut g2, 2, 4, 1, 7);
        g2.propagate_increase_parallel(&mut ch2, &index2, &[u2]);

        for v in 1..=4 {
            for w in 1..=4 {
                assert_eq!(index1.get_distance(v, w), index2.get_distance(v, w), "d({v},{w})");
                assert_eq!(index1.get_spc(v, w), index2.get_spc(v, w), "spc({v},{w})");
            }
        }
    }

    #[test]
    fn pendant_update_shifts_the_whole_subtree() {
        // Path 1-2-3-4 with leaf 5 on 2: the core is {2,3} and everything
        // else hangs off it.
        let (mut g, _ch, mut index) =
            build(&[(1, 2, 2), (2, 3, 2), (3, 4, 2), (5, 2, 2)], 5);
        assert_eq!(index.get_distance(5, 4), 6);
        assert_eq!(index.get_spc(5, 4), 1);
        // Decrease the pendant edge (3, 4) from 2 to 1.
        g.update_edge(3, 4, 1);
        g.update_edge(4, 3, 1);
        let updates = vec![PendantUpdate { node: 4, old_offset: 2, new_offset: 1 }];
        g.propagate_pendant_updates(&mut index, updates);
        assert_eq!(index.get_distance(5, 4), 5);
        assert_eq!(index.get_distance(3, 4), 1);
    }

    #[test]
    fn inverse_update_restores_queries() {
        let (mut g, mut ch, index) = build(DIAMOND, 4);
        let up = apply(&mut g, 3, 4, 1, 6);
        g.propagate_increase(&mut ch, &index, &[up]);
        let down = apply(&mut g, 3, 4, 6, 1);
        g.propagate_decrease(&mut ch, &index, &[down]);
        assert_eq!(index.get_distance(1, 4), 2);
        assert_eq!(index.get_spc(1, 4), 2);
        assert_eq!(index.get_spc(2, 3), 2);
    }
}
