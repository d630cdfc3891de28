//! Data association: bipartite admissibility graph, connected-component
//! partitioning (union-find), and Hungarian assignment.
//!
//! # Algorithm pipeline
//! 1. Every (track, measurement) pair that passed gating becomes an edge of
//!    the sparse bipartite graph, costed by its squared Mahalanobis distance.
//! 2. The graph is partitioned into **connected components** using
//!    union-find. Components are independent and are solved in parallel.
//! 3. Each component is solved with the **Hungarian algorithm** on a square
//!    matrix where non-admissible and dummy entries carry a big-M cost, so
//!    the solution has maximum cardinality first and minimum total cost
//!    second.
//!
//! Rows are ordered by track position in the store (ascending track id) and
//! columns by measurement index. Among equally good matchings, each track in
//! ascending order takes the lowest measurement index that still admits an
//! optimal completion.
//!
//! The probabilistic strategy lives in [`crate::jpda`] and shares the graph
//! and component code.

use crate::{config::AssociationStrategy, config::JpdaConfig, gating::TrackGate, jpda};
use rayon::prelude::*;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Bipartite graph
// ---------------------------------------------------------------------------

/// An admissible (track, measurement) pair.
#[derive(Clone, Debug)]
pub struct AssignEdge {
    pub track_idx: usize,
    pub meas_idx: usize,
    /// Mahalanobis distance squared (used as cost)
    pub cost: f64,
}

/// Sparse bipartite graph: edges between track indices and measurement indices.
#[derive(Clone, Debug, Default)]
pub struct BipartiteGraph {
    pub edges: Vec<AssignEdge>,
    pub n_tracks: usize,
    pub n_meas: usize,
}

impl BipartiteGraph {
    pub fn new(n_tracks: usize, n_meas: usize) -> Self {
        Self {
            edges: Vec::new(),
            n_tracks,
            n_meas,
        }
    }

    /// Build the admissibility relation from per-track gate results.
    pub fn from_gates(gates: &[TrackGate], n_meas: usize) -> Self {
        let mut graph = Self::new(gates.len(), n_meas);
        for (ti, gate) in gates.iter().enumerate() {
            for hit in &gate.hits {
                graph.add_edge(ti, hit.meas_idx, hit.d2);
            }
        }
        graph
    }

    /// Add an edge (gate-passed association candidate).
    pub fn add_edge(&mut self, track_idx: usize, meas_idx: usize, cost: f64) {
        self.edges.push(AssignEdge {
            track_idx,
            meas_idx,
            cost,
        });
    }

    /// True if no edges exist; every track and measurement is independent.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Measurements with no admissible track at all.
    pub fn isolated_measurements(&self) -> Vec<usize> {
        let mut touched = vec![false; self.n_meas];
        for e in &self.edges {
            touched[e.meas_idx] = true;
        }
        (0..self.n_meas).filter(|&j| !touched[j]).collect()
    }

    /// Tracks with no admissible measurement at all.
    pub fn isolated_tracks(&self) -> Vec<usize> {
        let mut touched = vec![false; self.n_tracks];
        for e in &self.edges {
            touched[e.track_idx] = true;
        }
        (0..self.n_tracks).filter(|&i| !touched[i]).collect()
    }
}

// ---------------------------------------------------------------------------
// Union-Find (path halving + union by rank)
// ---------------------------------------------------------------------------

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]]; // path halving
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, x: usize, y: usize) {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return;
        }
        match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => self.parent[rx] = ry,
            std::cmp::Ordering::Greater => self.parent[ry] = rx,
            std::cmp::Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
            }
        }
    }
}

/// A single connected component (cluster) of the bipartite graph.
#[derive(Clone, Debug)]
pub struct Component {
    /// Sorted ascending
    pub track_indices: Vec<usize>,
    /// Sorted ascending
    pub meas_indices: Vec<usize>,
    pub edges: Vec<AssignEdge>,
}

/// Partition the bipartite graph into connected components, ordered by
/// their lowest track index.
///
/// Tracks and measurements are nodes of one combined graph:
/// - Track i   → node i
/// - Measure j → node n_tracks + j
pub fn partition_components(graph: &BipartiteGraph) -> Vec<Component> {
    let n_total = graph.n_tracks + graph.n_meas;
    let mut uf = UnionFind::new(n_total);

    for e in &graph.edges {
        uf.union(e.track_idx, graph.n_tracks + e.meas_idx);
    }

    let mut comp_map: BTreeMap<usize, Component> = BTreeMap::new();
    for e in &graph.edges {
        let root = uf.find(e.track_idx);
        comp_map
            .entry(root)
            .or_insert_with(|| Component {
                track_indices: Vec::new(),
                meas_indices: Vec::new(),
                edges: Vec::new(),
            })
            .edges
            .push(e.clone());
    }

    let mut comps: Vec<Component> = comp_map
        .into_values()
        .map(|mut comp| {
            comp.track_indices = comp.edges.iter().map(|e| e.track_idx).collect();
            comp.track_indices.sort_unstable();
            comp.track_indices.dedup();
            comp.meas_indices = comp.edges.iter().map(|e| e.meas_idx).collect();
            comp.meas_indices.sort_unstable();
            comp.meas_indices.dedup();
            comp
        })
        .collect();
    comps.sort_by_key(|c| c.track_indices[0]);
    comps
}

// ---------------------------------------------------------------------------
// Association results
// ---------------------------------------------------------------------------

/// Hard one-to-one assignment (global nearest neighbour).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assignment {
    /// (track_idx, meas_idx) matched pairs, ascending by track index
    pub pairs: Vec<(usize, usize)>,
    /// Track indices that were NOT matched (missed detections)
    pub unmatched_tracks: Vec<usize>,
    /// Measurement indices not matched (new track candidates / clutter)
    pub unmatched_meas: Vec<usize>,
}

/// Per-track association probabilities (probabilistic joint association).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackWeights {
    /// β₀: probability that no gated measurement originated from the track
    pub miss_prob: f64,
    /// (meas_idx, β_j) for every gated measurement
    pub meas_probs: Vec<(usize, f64)>,
}

/// Soft assignment for every track.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SoftAssignment {
    /// Indexed by track index
    pub weights: Vec<TrackWeights>,
    /// Measurements admissible for no track
    pub unmatched_meas: Vec<usize>,
}

/// Outcome of one association round; consumed by the update and lifecycle steps.
#[derive(Clone, Debug, PartialEq)]
pub enum AssociationResult {
    Hard(Assignment),
    Soft(SoftAssignment),
}

impl AssociationResult {
    /// Measurements that belong to no track and seed new tentative tracks.
    pub fn unassigned_measurements(&self) -> &[usize] {
        match self {
            AssociationResult::Hard(a) => &a.unmatched_meas,
            AssociationResult::Soft(s) => &s.unmatched_meas,
        }
    }
}

/// Run the configured association strategy over the gate results of one scan.
pub fn associate(
    strategy: AssociationStrategy,
    gates: &[TrackGate],
    n_meas: usize,
    jpda_cfg: &JpdaConfig,
    gate_prob: f64,
) -> AssociationResult {
    let graph = BipartiteGraph::from_gates(gates, n_meas);
    match strategy {
        AssociationStrategy::OptimalAssignment => AssociationResult::Hard(solve_gnn(&graph)),
        AssociationStrategy::ProbabilisticJoint => {
            AssociationResult::Soft(jpda::solve(&graph, gates, jpda_cfg, gate_prob))
        }
    }
}

/// Global nearest neighbour over the whole graph.
pub fn solve_gnn(graph: &BipartiteGraph) -> Assignment {
    let comps = partition_components(graph);
    let solved: Vec<Assignment> = comps.par_iter().map(hungarian_solve).collect();

    let mut out = Assignment {
        unmatched_tracks: graph.isolated_tracks(),
        unmatched_meas: graph.isolated_measurements(),
        ..Default::default()
    };
    for a in solved {
        out.pairs.extend(a.pairs);
        out.unmatched_tracks.extend(a.unmatched_tracks);
        out.unmatched_meas.extend(a.unmatched_meas);
    }
    out.pairs.sort_unstable();
    out.unmatched_tracks.sort_unstable();
    out.unmatched_meas.sort_unstable();
    out
}

// ---------------------------------------------------------------------------
// Hungarian algorithm, O(n³) Kuhn-Munkres
// ---------------------------------------------------------------------------

/// Solve the assignment problem for a single component.
///
/// The local cost matrix is square (`max(nt, nm)`); entries without an
/// admissible edge, and the padding rows/columns, cost `big_m`, which
/// exceeds the sum of every admissible cost in the component. A pair that
/// lands on a `big_m` entry is decoded as unmatched.
pub fn hungarian_solve(component: &Component) -> Assignment {
    let nt = component.track_indices.len();
    let nm = component.meas_indices.len();

    if nt == 0 || nm == 0 {
        return Assignment {
            pairs: vec![],
            unmatched_tracks: component.track_indices.clone(),
            unmatched_meas: component.meas_indices.clone(),
        };
    }

    let big_m = 1.0 + 2.0 * component.edges.iter().map(|e| e.cost.max(0.0)).sum::<f64>();
    let n = nt.max(nm);
    let mut cost = vec![big_m; n * n];
    let mut admissible = vec![false; n * n];

    // Local index maps: track_indices[i] → row i,  meas_indices[j] → col j
    for e in &component.edges {
        if let (Ok(ri), Ok(ci)) = (
            component.track_indices.binary_search(&e.track_idx),
            component.meas_indices.binary_search(&e.meas_idx),
        ) {
            cost[ri * n + ci] = e.cost;
            admissible[ri * n + ci] = true;
        }
    }

    let all: Vec<usize> = (0..n).collect();
    let (best, row_assign) = solve_subset(&cost, n, &all, &all);
    let row_assign = break_ties(&cost, &admissible, n, nt, row_assign, best);

    let mut pairs = Vec::new();
    let mut unmatched_tracks = Vec::new();
    let mut matched_meas = vec![false; nm];

    for (ri, &ci) in row_assign.iter().enumerate().take(nt) {
        if ci < nm && admissible[ri * n + ci] {
            pairs.push((component.track_indices[ri], component.meas_indices[ci]));
            matched_meas[ci] = true;
        } else {
            unmatched_tracks.push(component.track_indices[ri]);
        }
    }

    let unmatched_meas = (0..nm)
        .filter(|&j| !matched_meas[j])
        .map(|j| component.meas_indices[j])
        .collect();

    Assignment {
        pairs,
        unmatched_tracks,
        unmatched_meas,
    }
}

/// Solve the square sub-problem on `rows` × `cols` of the n×n matrix.
/// Returns the total cost and the global column chosen for each row.
fn solve_subset(cost: &[f64], n: usize, rows: &[usize], cols: &[usize]) -> (f64, Vec<usize>) {
    let k = rows.len();
    if k == 0 {
        return (0.0, Vec::new());
    }
    let mut sub = Vec::with_capacity(k * k);
    for &r in rows {
        sub.extend(cols.iter().map(|&c| cost[r * n + c]));
    }
    let local = run_hungarian(&sub, k);
    let assign: Vec<usize> = local.iter().map(|&j| cols[j]).collect();
    let total = rows.iter().zip(&assign).map(|(&r, &c)| cost[r * n + c]).sum();
    (total, assign)
}

/// Lexicographic tie-break over optimal matchings.
///
/// Walks the track rows in order. Each row tries the admissible columns
/// below its current one (any admissible column if it is currently
/// unmatched), lowest first, and takes the first whose forced completion
/// still reaches the optimal total. Matched rows are then fixed; unmatched
/// rows stay free so they never pin a measurement column.
fn break_ties(
    cost: &[f64],
    admissible: &[bool],
    n: usize,
    nt: usize,
    mut assign: Vec<usize>,
    best: f64,
) -> Vec<usize> {
    let tol = 1e-9 * best.abs().max(1.0);
    let mut free_rows: Vec<usize> = (0..n).collect();
    let mut free_cols: Vec<usize> = (0..n).collect();
    let mut fixed_cost = 0.0;

    for r in 0..nt {
        let current = assign[r];
        let matched = admissible[r * n + current];
        let candidates: Vec<usize> = free_cols
            .iter()
            .copied()
            .filter(|&c| admissible[r * n + c] && (!matched || c < current))
            .collect();

        for c in candidates {
            let rows: Vec<usize> = free_rows.iter().copied().filter(|&x| x != r).collect();
            let cols: Vec<usize> = free_cols.iter().copied().filter(|&x| x != c).collect();
            let (rest, rest_assign) = solve_subset(cost, n, &rows, &cols);
            if (fixed_cost + cost[r * n + c] + rest - best).abs() <= tol {
                assign[r] = c;
                for (&row, col) in rows.iter().zip(rest_assign) {
                    assign[row] = col;
                }
                break;
            }
        }

        let c = assign[r];
        if admissible[r * n + c] {
            fixed_cost += cost[r * n + c];
            free_rows.retain(|&x| x != r);
            free_cols.retain(|&x| x != c);
        }
    }
    assign
}

/// Core Hungarian algorithm on a square n×n cost matrix (row-major).
/// Returns row_assignment[row] = assigned_column.
fn run_hungarian(cost: &[f64], n: usize) -> Vec<usize> {
    // Potentials for rows (u) and columns (v)
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    // p[j] = row assigned to column j (1-indexed, 0 = none)
    let mut p = vec![0usize; n + 1];
    // way[j] = previous column in augmenting path
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=n {
                if !used[j] {
                    let val = cost[(i0 - 1) * n + (j - 1)] - u[i0] - v[j];
                    if val < minv[j] {
                        minv[j] = val;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Augment
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut row_assign = vec![0usize; n];
    for j in 1..=n {
        if p[j] != 0 {
            row_assign[p[j] - 1] = j - 1;
        }
    }
    row_assign
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
