//! The distance-label index: build-side [`CutIndex`] entries, the packed
//! query-side [`FlatCutIndex`], and the [`ContractionIndex`] answering
//! distance and shortest-path-count queries in microseconds.

use std::io::{
    Read,
    Write,
};
use std::sync::Arc;

use anyhow::{
    bail,
    Context,
    Result,
};
use rand::Rng;
use serde::Serialize;

use crate::io::{
    read_exact_bytes,
    read_u32,
    read_u64,
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
    MAX_CUT_LEVEL,
    NO_NODE,
};
use crate::sync::SharedCell;

/// Partition bitvector helpers.
///
/// The low 6 bits store the cut level (0..=58), the 58 bits above store the
/// root-to-leaf path through the decomposition tree, least significant bit
/// first.
pub mod pbv {
    /// Packs a path and its length into a bitvector.
    #[must_use]
    pub fn from(bits: u64, length: u16) -> u64 {
        if length == 0 {
            return 0;
        }
        (bits << (64 - length) >> (58 - length)) | u64::from(length)
    }

    /// The path bits.
    #[must_use]
    pub fn partition(bv: u64) -> u64 {
        bv >> 6
    }

    /// The path length (cut level).
    #[must_use]
    pub fn cut_level(bv: u64) -> u16 {
        (bv & 63) as u16
    }

    /// Deepest level at which both vertices still share an ancestor cut.
    #[must_use]
    pub fn lca_level(bv1: u64, bv2: u64) -> u16 {
        let mut level = cut_level(bv1).min(cut_level(bv2));
        let (p1, p2) = (partition(bv1), partition(bv2));
        if p1 != p2 {
            let diff_level = (p1 ^ p2).trailing_zeros() as u16;
            if diff_level < level {
                level = diff_level;
            }
        }
        level
    }

    /// Bitvector of the lowest common ancestor cut.
    #[must_use]
    pub fn lca(bv1: u64, bv2: u64) -> u64 {
        let level = lca_level(bv1, bv2);
        // A shift by 64 is not defined, so level 0 short-circuits.
        if level == 0 {
            return 0;
        }
        (bv1 >> 6) << (64 - level) >> (58 - level) | u64::from(level)
    }

    /// Whether the first cut lies on the root path of the second.
    #[must_use]
    pub fn is_ancestor(bv_ancestor: u64, bv_descendant: u64) -> bool {
        let (cla, cld) = (cut_level(bv_ancestor), cut_level(bv_descendant));
        // A shift by 64 is not defined, so level 0 short-circuits.
        cla == 0 || (cla <= cld && ((bv_ancestor ^ bv_descendant) >> 6) << (64 - cla) == 0)
    }
}

/// Offset of the level-`cut_level` label block within the flat label arrays.
pub(crate) fn block_offset(dist_index: &[u16], cut_level: usize) -> u16 {
    if cut_level == 0 {
        0
    } else {
        dist_index[cut_level - 1]
    }
}

/// Per-vertex labeling state accumulated during hierarchy construction.
#[derive(Clone, Debug, Default)]
pub struct CutIndex {
    /// Partition path bits (without the length field).
    pub(crate) partition: u64,
    /// Depth of this vertex's leaf in the decomposition tree.
    pub(crate) cut_level: u16,
    /// Nondecreasing prefix sums: `dist_index[k]` is the total label count
    /// through level k.
    pub(crate) dist_index: Vec<u16>,
    /// Label distances, one block per level.
    pub(crate) distances: Vec<Distance>,
    /// Shortest-path counts parallel to `distances`.
    pub(crate) paths: Vec<PathCount>,
}

impl CutIndex {
    /// Whether this entry was never touched (vertex absent from the graph).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dist_index.is_empty()
    }

    /// Total number of labels through the bottom level.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.dist_index.last().copied().unwrap_or(0) as usize
    }

    /// Structural sanity; `partial` skips the checks that only hold once
    /// the vertex's recursion has terminated.
    pub(crate) fn is_consistent(&self, partial: bool) -> bool {
        if self.cut_level > MAX_CUT_LEVEL {
            return false;
        }
        if !partial && self.partition >= (1 << self.cut_level) {
            return false;
        }
        if !partial && self.dist_index.len() != self.cut_level as usize + 1 {
            return false;
        }
        self.dist_index.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Minimum 2-hop distance between two vertices through the level-`cut_level`
/// separator, over build-side labels.
pub(crate) fn cut_level_distance(a: &CutIndex, b: &CutIndex, cut_level: usize) -> Distance {
    let a_offset = block_offset(&a.dist_index, cut_level) as usize;
    let b_offset = block_offset(&b.dist_index, cut_level) as usize;
    let len = std::cmp::min(
        a.dist_index[cut_level] as usize - a_offset,
        b.dist_index[cut_level] as usize - b_offset,
    );
    let mut min_dist = INFINITY;
    for i in 0..len {
        let dist = add_distance(a.distances[a_offset + i], b.distances[b_offset + i]);
        if dist < min_dist {
            min_dist = dist;
        }
    }
    min_dist
}

/// Rounds a byte size up to `u32` alignment, matching the padding between
/// the `dist_index` and `distances` sections of the serialized block.
const fn aligned4(size: usize) -> usize {
    (size + 3) & !3
}

/// Immutable packed labeling of one vertex, shared by reference between a
/// core vertex and its contracted pendants.
///
/// Label slots are interior-mutable so the maintenance phases can repair
/// them in place through the shared reference; see [`crate::sync`] for the
/// ownership protocol.
pub struct FlatCutIndex {
    /// Packed partition bitvector.
    pbv: u64,
    /// Per-level label-count prefix sums.
    dist_index: Box<[u16]>,
    /// Label distances.
    distances: Box<[SharedCell<Distance>]>,
    /// Label path counts.
    paths: Box<[SharedCell<PathCount>]>,
}

impl FlatCutIndex {
    /// Flattens a finished build-side entry.
    pub(crate) fn new(ci: &CutIndex) -> Self {
        debug_assert!(ci.is_consistent(false));
        debug_assert_eq!(ci.distances.len(), ci.label_count());
        debug_assert_eq!(ci.paths.len(), ci.label_count());
        Self {
            pbv: pbv::from(ci.partition, ci.cut_level),
            dist_index: ci.dist_index.clone().into_boxed_slice(),
            distances: ci.distances.iter().map(|&d| SharedCell::new(d)).collect(),
            paths: ci.paths.iter().map(|&p| SharedCell::new(p)).collect(),
        }
    }

    /// The packed partition bitvector.
    #[must_use]
    pub fn pbv(&self) -> u64 {
        self.pbv
    }

    /// Partition path bits.
    #[must_use]
    pub fn partition(&self) -> u64 {
        pbv::partition(self.pbv)
    }

    /// Depth of the vertex's leaf.
    #[must_use]
    pub fn cut_level(&self) -> u16 {
        pbv::cut_level(self.pbv)
    }

    /// Total number of labels.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.dist_index[self.cut_level() as usize] as usize
    }

    /// Number of labels at level `cl`.
    #[must_use]
    pub fn cut_size(&self, cl: usize) -> usize {
        (self.dist_index[cl] - block_offset(&self.dist_index, cl)) as usize
    }

    /// Number of labels at the vertex's own level.
    #[must_use]
    pub fn bottom_cut_size(&self) -> usize {
        self.cut_size(self.cut_level() as usize)
    }

    /// Label distance in slot `i`.
    pub(crate) fn distance(&self, i: usize) -> Distance {
        self.distances[i].get()
    }

    /// Overwrites the label distance in slot `i`.
    pub(crate) fn set_distance(&self, i: usize, d: Distance) {
        self.distances[i].set(d);
    }

    /// Label path count in slot `i`.
    pub(crate) fn path(&self, i: usize) -> PathCount {
        self.paths[i].get()
    }

    /// Overwrites the label path count in slot `i`.
    pub(crate) fn set_path(&self, i: usize, c: PathCount) {
        self.paths[i].set(c);
    }

    /// Size of the serialized block in bytes.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        8 + aligned4(self.dist_index.len() * 2) + self.label_count() * 4 + self.label_count() * 2
    }

    /// Serializes to the packed little-endian block layout:
    /// `u64 pbv ‖ u16 dist_index[ℓ+1] ‖ pad to 4 ‖ u32 distances[L] ‖
    /// u16 paths[L]`.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_size());
        bytes.extend_from_slice(&self.pbv.to_le_bytes());
        for &di in self.dist_index.iter() {
            bytes.extend_from_slice(&di.to_le_bytes());
        }
        bytes.resize(8 + aligned4(self.dist_index.len() * 2), 0);
        for d in self.distances.iter() {
            bytes.extend_from_slice(&d.get().to_le_bytes());
        }
        for p in self.paths.iter() {
            bytes.extend_from_slice(&p.get().to_le_bytes());
        }
        debug_assert_eq!(bytes.len(), self.byte_size());
        bytes
    }

    /// Parses a serialized block.
    pub(crate) fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            bail!("label block truncated: {} bytes", data.len());
        }
        let bv = u64::from_le_bytes(data[0..8].try_into().expect("sliced to width"));
        let levels = pbv::cut_level(bv) as usize + 1;
        let mut dist_index = Vec::with_capacity(levels);
        let mut pos = 8;
        for _ in 0..levels {
            dist_index.push(u16::from_le_bytes(data[pos..pos + 2].try_into().expect("sliced to width")));
            pos += 2;
        }
        pos = 8 + aligned4(levels * 2);
        let count = dist_index[levels - 1] as usize;
        if data.len() != 8 + aligned4(levels * 2) + count * 6 {
            bail!("label block has {} bytes, expected {}", data.len(), 8 + aligned4(levels * 2) + count * 6);
        }
        let mut distances = Vec::with_capacity(count);
        for _ in 0..count {
            distances.push(SharedCell::new(u32::from_le_bytes(
                data[pos..pos + 4].try_into().expect("sliced to width"),
            )));
            pos += 4;
        }
        let mut paths = Vec::with_capacity(count);
        for _ in 0..count {
            paths.push(SharedCell::new(u16::from_le_bytes(
                data[pos..pos + 2].try_into().expect("sliced to width"),
            )));
            pos += 2;
        }
        Ok(Self {
            pbv: bv,
            dist_index: dist_index.into_boxed_slice(),
            distances: distances.into_boxed_slice(),
            paths: paths.into_boxed_slice(),
        })
    }

    /// Unflattens into per-level `(distance, path count)` blocks.
    #[must_use]
    pub fn labels(&self) -> Vec<Vec<(Distance, PathCount)>> {
        (0..=self.cut_level() as usize)
            .map(|cl| {
                let offset = block_offset(&self.dist_index, cl) as usize;
                (offset..self.dist_index[cl] as usize)
                    .map(|i| (self.distance(i), self.path(i)))
                    .collect()
            })
            .collect()
    }
}

/// Per-vertex entry of the [`ContractionIndex`]: either a label-owning core
/// vertex (`distance_offset == 0`) or a pendant referencing its core root.
#[derive(Clone, Default)]
pub struct ContractionLabel {
    /// The vertex's labeling; shared with the core root for pendants, absent
    /// for vertices that were never in the graph.
    pub(crate) cut_index: Option<Arc<FlatCutIndex>>,
    /// Distance to the core root along the contraction chain; 0 for core
    /// vertices.
    pub distance_offset: Distance,
    /// Next hop toward the core root; [`NO_NODE`] for core vertices.
    pub parent: NodeID,
}

/// Summary statistics of a built index.
#[derive(Debug, Serialize)]
pub struct IndexStats {
    /// Total vertices covered (including contracted pendants).
    pub nodes: usize,
    /// Vertices owning a label block.
    pub core_nodes: usize,
    /// Serialized index size in bytes.
    pub index_bytes: usize,
    /// Total label entries over all core vertices.
    pub labels: usize,
    /// Largest per-vertex label count.
    pub max_labels: usize,
    /// Height of the decomposition tree.
    pub height: usize,
    /// Mean labels per level over core vertices.
    pub avg_cut_size: f64,
    /// Largest bottom-level cut.
    pub max_cut_size: usize,
}

/// The query-side oracle: one [`ContractionLabel`] per vertex.
pub struct ContractionIndex {
    /// Entry per vertex id; slot 0 unused.
    labels: Vec<ContractionLabel>,
}

impl ContractionIndex {
    /// Flattens the build-side labeling, wiring contracted pendants to their
    /// core roots via the `closest` table produced by
    /// [`crate::graph::Graph::contract`].
    #[must_use]
    pub fn new(mut ci: Vec<CutIndex>, closest: &[Neighbor]) -> Self {
        assert_eq!(ci.len(), closest.len());
        let mut labels: Vec<ContractionLabel> = vec![ContractionLabel::default(); ci.len()];
        // Core vertices own their flattened block.
        for node in 1..closest.len() {
            if closest[node].node == node as NodeID {
                debug_assert_eq!(closest[node].distance, 0);
                labels[node].cut_index = Some(Arc::new(FlatCutIndex::new(&ci[node])));
            }
            // The build-side entry is no longer needed.
            ci[node] = CutIndex::default();
        }
        // Pendants share their root's block, annotated with the chain
        // distance.
        for node in 1..closest.len() {
            let n = closest[node];
            // Isolated vertices were removed entirely.
            if n.node != node as NodeID && n.node != NO_NODE {
                debug_assert!(n.distance > 0);
                let mut root = n.node;
                let mut root_dist = n.distance;
                while closest[root as usize].node != root {
                    root_dist += closest[root as usize].distance;
                    root = closest[root as usize].node;
                }
                let root_index = labels[root as usize].cut_index.clone();
                debug_assert!(root_index.is_some());
                labels[node].cut_index = root_index;
                labels[node].distance_offset = root_dist;
                labels[node].parent = n.node;
            }
        }
        Self { labels }
    }

    /// Flattens a labeling with no contraction (every vertex is core).
    #[must_use]
    pub fn from_cut_index(ci: Vec<CutIndex>) -> Self {
        let labels = ci
            .into_iter()
            .map(|entry| {
                let cut_index = (!entry.is_empty()).then(|| Arc::new(FlatCutIndex::new(&entry)));
                ContractionLabel { cut_index, ..ContractionLabel::default() }
            })
            .collect();
        Self { labels }
    }

    /// Number of vertices covered.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.labels.len() - 1
    }

    /// Entry for `v`.
    #[must_use]
    pub fn get_contraction_label(&self, v: NodeID) -> ContractionLabel {
        self.labels[v as usize].clone()
    }

    /// Borrowed entry for `v`.
    pub(crate) fn label(&self, v: NodeID) -> &ContractionLabel {
        &self.labels[v as usize]
    }

    /// Whether `v` was contracted away before labeling.
    #[must_use]
    pub fn is_contracted(&self, v: NodeID) -> bool {
        self.labels[v as usize].parent != NO_NODE
    }

    /// Number of label-owning core vertices.
    #[must_use]
    pub fn uncontracted_count(&self) -> usize {
        (1..self.labels.len()).filter(|&v| !self.is_contracted(v as NodeID)).count()
    }

    /// Overwrites the pendant-chain offset of `n` during maintenance.
    pub(crate) fn update_distance_offset(&mut self, n: NodeID, d: Distance) {
        self.labels[n as usize].distance_offset = d;
    }

    /// Minimum 2-hop distance over the shared label prefix.
    fn flat_distance(a: &FlatCutIndex, b: &FlatCutIndex) -> Distance {
        let cl = pbv::lca_level(a.pbv, b.pbv) as usize;
        let end = std::cmp::min(a.dist_index[cl], b.dist_index[cl]) as usize;
        let mut min_dist = INFINITY;
        for i in 0..end {
            let dist = add_distance(a.distance(i), b.distance(i));
            if dist < min_dist {
                min_dist = dist;
            }
        }
        min_dist
    }

    /// Shortest-path count over the shared label prefix: counts multiply
    /// per slot, tie for the minimum accumulates, a strictly smaller sum
    /// resets the accumulator.
    fn flat_paths(a: &FlatCutIndex, b: &FlatCutIndex) -> PathCount {
        let cl = pbv::lca_level(a.pbv, b.pbv) as usize;
        let end = std::cmp::min(a.dist_index[cl], b.dist_index[cl]) as usize;
        let mut min_dist = INFINITY;
        let mut spc: PathCount = 0;
        for i in 0..end {
            let dist = add_distance(a.distance(i), b.distance(i));
            let count = a.path(i).wrapping_mul(b.path(i));
            if dist < min_dist {
                min_dist = dist;
                spc = count;
            } else if dist == min_dist {
                spc = spc.wrapping_add(count);
            }
        }
        spc
    }

    /// Shortest-path distance between `v` and `w`.
    #[must_use]
    pub fn get_distance(&self, v: NodeID, w: NodeID) -> Distance {
        let cv = &self.labels[v as usize];
        let cw = &self.labels[w as usize];
        let (Some(a), Some(b)) = (&cv.cut_index, &cw.cut_index) else {
            return INFINITY;
        };
        if Arc::ptr_eq(a, b) {
            // Same contraction class: resolve within the pendant tree.
            if v == w {
                return 0;
            }
            if cv.distance_offset == 0 {
                return cw.distance_offset;
            }
            if cw.distance_offset == 0 {
                return cv.distance_offset;
            }
            if cv.parent == w {
                return cv.distance_offset - cw.distance_offset;
            }
            if cw.parent == v {
                return cw.distance_offset - cv.distance_offset;
            }
            // Walk both chains toward the root until they meet.
            let (mut v_anc, mut w_anc) = (v, w);
            let (mut cv_anc, mut cw_anc) = (cv, cw);
            while v_anc != w_anc {
                if cv_anc.distance_offset < cw_anc.distance_offset {
                    w_anc = cw_anc.parent;
                    cw_anc = &self.labels[w_anc as usize];
                } else if cv_anc.distance_offset > cw_anc.distance_offset {
                    v_anc = cv_anc.parent;
                    cv_anc = &self.labels[v_anc as usize];
                } else {
                    v_anc = cv_anc.parent;
                    w_anc = cw_anc.parent;
                    cv_anc = &self.labels[v_anc as usize];
                    cw_anc = &self.labels[w_anc as usize];
                }
            }
            return cv.distance_offset + cw.distance_offset - 2 * cv_anc.distance_offset;
        }
        add_distance(cv.distance_offset, add_distance(cw.distance_offset, Self::flat_distance(a, b)))
    }

    /// Number of distinct shortest paths between `v` and `w` (wrapping past
    /// 65535).
    #[must_use]
    pub fn get_spc(&self, v: NodeID, w: NodeID) -> PathCount {
        let cv = &self.labels[v as usize];
        let cw = &self.labels[w as usize];
        let (Some(a), Some(b)) = (&cv.cut_index, &cw.cut_index) else {
            return 0;
        };
        if Arc::ptr_eq(a, b) {
            // Paths within a pendant tree are unique.
            return 1;
        }
        Self::flat_paths(a, b)
    }

    /// Number of label slots a query between `v` and `w` would scan at the
    /// meet level.
    #[must_use]
    pub fn get_hoplinks(&self, v: NodeID, w: NodeID) -> usize {
        let (Some(a), Some(b)) = (&self.labels[v as usize].cut_index, &self.labels[w as usize].cut_index) else {
            return 0;
        };
        if Arc::ptr_eq(a, b) {
            return 0;
        }
        let cl = pbv::lca_level(a.pbv, b.pbv) as usize;
        std::cmp::min(a.cut_size(cl), b.cut_size(cl))
    }

    /// Mean hoplinks over a query batch.
    #[must_use]
    pub fn avg_hoplinks(&self, queries: &[(NodeID, NodeID)]) -> f64 {
        if queries.is_empty() {
            return 0.0;
        }
        let total: usize = queries.iter().map(|&(v, w)| self.get_hoplinks(v, w)).sum();
        total as f64 / queries.len() as f64
    }

    /// A uniformly random query pair.
    #[must_use]
    pub fn random_query(&self) -> (NodeID, NodeID) {
        let mut rng = rand::thread_rng();
        let node_count = self.node_count() as NodeID;
        (1 + rng.gen_range(0..node_count), 1 + rng.gen_range(0..node_count))
    }

    /// Serialized size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        let mut total = 8;
        for label in &self.labels[1..] {
            total += 4;
            if label.distance_offset == 0 {
                total += 8 + label.cut_index.as_ref().map_or(0, |ci| ci.byte_size());
            } else {
                total += 4;
            }
        }
        total
    }

    /// Build statistics for reporting.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats {
            nodes: 0,
            core_nodes: 0,
            index_bytes: self.size_bytes(),
            labels: 0,
            max_labels: 0,
            height: 0,
            avg_cut_size: 0.0,
            max_cut_size: 0,
        };
        let mut cut_sum = 0usize;
        for (v, label) in self.labels.iter().enumerate().skip(1) {
            let Some(ci) = &label.cut_index else { continue };
            stats.nodes += 1;
            if !self.is_contracted(v as NodeID) {
                stats.core_nodes += 1;
            }
            if label.distance_offset == 0 {
                stats.labels += ci.label_count();
                stats.max_labels = stats.max_labels.max(ci.label_count());
                stats.height = stats.height.max(ci.cut_level() as usize);
                stats.max_cut_size = stats.max_cut_size.max(ci.bottom_cut_size());
                cut_sum += ci.cut_level() as usize + 1;
            }
        }
        stats.avg_cut_size = stats.labels as f64 / cut_sum.max(1) as f64;
        stats
    }

    /// Writes the index in the fixed little-endian on-disk format.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u64(w, (self.labels.len() - 1) as u64)?;
        for label in &self.labels[1..] {
            write_u32(w, label.distance_offset)?;
            if label.distance_offset == 0 {
                match &label.cut_index {
                    Some(ci) => {
                        let bytes = ci.to_bytes();
                        write_u64(w, bytes.len() as u64)?;
                        w.write_all(&bytes)?;
                    },
                    // Isolated vertices persist as an empty block.
                    None => write_u64(w, 0)?,
                }
            } else {
                write_u32(w, label.parent)?;
            }
        }
        Ok(())
    }

    /// Reads an index written by [`Self::write`], re-establishing the
    /// block sharing between pendants and their roots.
    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let node_count = read_u64(r).context("reading index node count")? as usize;
        let mut labels: Vec<ContractionLabel> = vec![ContractionLabel::default(); node_count + 1];
        for node in 1..=node_count {
            let distance_offset = read_u32(r)?;
            let label = &mut labels[node];
            label.distance_offset = distance_offset;
            if distance_offset == 0 {
                let data_size = read_u64(r)? as usize;
                if data_size > 0 {
                    let data = read_exact_bytes(r, data_size)?;
                    label.cut_index = Some(Arc::new(
                        FlatCutIndex::from_bytes(&data).with_context(|| format!("label block of node {node}"))?,
                    ));
                }
            } else {
                label.parent = read_u32(r)?;
            }
        }
        // Pendants point at their root's block.
        for node in 1..=node_count {
            if labels[node].distance_offset != 0 {
                let mut root = labels[node].parent;
                while labels[root as usize].distance_offset != 0 {
                    root = labels[root as usize].parent;
                }
                labels[node].cut_index = labels[root as usize].cut_index.clone();
                debug_assert!(labels[node].cut_index.is_some());
            }
        }
        Ok(Self { labels })
    }

    /// Human-readable JSON dump of every label, for inspection.
    pub fn export_json<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut map = serde_json::Map::new();
        for (node, label) in self.labels.iter().enumerate().skip(1) {
            let value = if label.distance_offset == 0 {
                label.cut_index.as_ref().map_or(serde_json::Value::Null, |ci| serde_json::json!(ci.labels()))
            } else {
                serde_json::json!({ "p": label.parent, "d": label.distance_offset })
            };
            map.insert(node.to_string(), value);
        }
        serde_json::to_writer_pretty(&mut *w, &serde_json::Value::Object(map))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pbv_round_trips_path_and_length() {
        let bv = pbv::from(0b1011, 4);
        assert_eq!(pbv::cut_level(bv), 4);
        assert_eq!(pbv::partition(bv), 0b1011);
        assert_eq!(pbv::from(0, 0), 0);
        // Bits beyond the length are masked off.
        assert_eq!(pbv::partition(pbv::from(0b111_0101, 3)), 0b101);
    }

    #[test]
    fn lca_level_finds_first_divergence() {
        let a = pbv::from(0b0011, 4);
        let b = pbv::from(0b0111, 4);
        // Paths agree on bits 0 and 1, diverge at bit 2.
        assert_eq!(pbv::lca_level(a, b), 2);
        // Same path, different depths: the shallower level wins.
        let c = pbv::from(0b011, 3);
        assert_eq!(pbv::lca_level(a, c), 3);
        assert_eq!(pbv::lca(a, b), pbv::from(0b11, 2));
    }

    #[test]
    fn level_zero_guards() {
        // Level 0 must not shift by 64.
        assert_eq!(pbv::lca(pbv::from(0b1, 1), pbv::from(0b0, 1)), 0);
        assert!(pbv::is_ancestor(0, pbv::from(0b101, 3)));
        assert!(pbv::is_ancestor(pbv::from(0b01, 2), pbv::from(0b1101, 4)));
        assert!(!pbv::is_ancestor(pbv::from(0b11, 2), pbv::from(0b1101, 4)));
    }

    fn sample_cut_index() -> CutIndex {
        CutIndex {
            partition: 0b10,
            cut_level: 2,
            dist_index: vec![2, 3, 6],
            distances: vec![4, 7, 1, 0, 9, 2],
            paths: vec![1, 2, 1, 1, 3, 1],
        }
    }

    #[test]
    fn flat_index_block_round_trips() {
        let flat = FlatCutIndex::new(&sample_cut_index());
        assert_eq!(flat.cut_level(), 2);
        assert_eq!(flat.label_count(), 6);
        assert_eq!(flat.cut_size(0), 2);
        assert_eq!(flat.cut_size(1), 1);
        assert_eq!(flat.bottom_cut_size(), 3);
        let bytes = flat.to_bytes();
        assert_eq!(bytes.len(), flat.byte_size());
        let back = FlatCutIndex::from_bytes(&bytes).unwrap();
        assert_eq!(back.to_bytes(), bytes);
        assert_eq!(back.labels(), flat.labels());
    }

    #[test]
    fn truncated_block_is_rejected() {
        let bytes = FlatCutIndex::new(&sample_cut_index()).to_bytes();
        assert!(FlatCutIndex::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn pendant_chain_queries_use_offsets() {
        // Core root 1 with pendant chain 1 - 2 - 3 (weights 2 and 3).
        let mut ci = vec![CutIndex::default(); 4];
        ci[1] = CutIndex {
            partition: 0,
            cut_level: 0,
            dist_index: vec![1],
            distances: vec![0],
            paths: vec![1],
        };
        let closest = vec![
            Neighbor::NONE,
            Neighbor::new(1, 0),
            Neighbor::new(1, 2),
            Neighbor::new(2, 3),
        ];
        let index = ContractionIndex::new(ci, &closest);
        assert!(index.is_contracted(3) && !index.is_contracted(1));
        assert_eq!(index.get_distance(1, 1), 0);
        assert_eq!(index.get_distance(1, 3), 5);
        assert_eq!(index.get_distance(3, 1), 5);
        assert_eq!(index.get_distance(2, 3), 3);
        assert_eq!(index.get_spc(1, 3), 1);
        assert_eq!(index.get_spc(3, 3), 1);
    }

    #[test]
    fn flat_query_accumulates_tied_counts() {
        // Two vertices whose two shared slots tie at distance 4.
        let a = CutIndex {
            partition: 0,
            cut_level: 1,
            dist_index: vec![2, 3],
            distances: vec![1, 3, 0],
            paths: vec![1, 2, 1],
        };
        let b = CutIndex {
            partition: 1,
            cut_level: 1,
            dist_index: vec![2, 3],
            distances: vec![3, 1, 0],
            paths: vec![2, 1, 1],
        };
        let index = ContractionIndex::from_cut_index(vec![CutIndex::default(), a, b]);
        assert_eq!(index.get_distance(1, 2), 4);
        // 1·2 + 2·1 tied at distance 4.
        assert_eq!(index.get_spc(1, 2), 4);
    }

    #[test]
    fn missing_labels_mean_unreachable() {
        let index = ContractionIndex::from_cut_index(vec![CutIndex::default(); 3]);
        assert_eq!(index.get_distance(1, 2), INFINITY);
        assert_eq!(index.get_spc(1, 2), 0);
    }
}
