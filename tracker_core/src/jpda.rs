//! Joint Probabilistic Data Association (JPDA).
//!
//! JPDA avoids hard decisions by enumerating every feasible joint event in a
//! cluster of tracks that share gated measurements, weighting each event,
//! and marginalizing into per-pair association probabilities β_{tj} plus a
//! per-track "no detection" probability β_{t0}.
//!
//! Event weight (constants common to all events dropped):
//!
//! ```text
//! P(E) ∝ ∏_{t detected by j} P_D·N(y_tj; 0, S_t) / λ  ·  ∏_{t missed} (1 − P_D·P_G)
//! ```
//!
//! Weights are accumulated in log space so dense gates do not underflow.
//! Exact enumeration grows factorially; clusters with more than
//! `max_cluster_size` tracks or measurements are resolved by hard
//! assignment instead.

use crate::{
    association::{hungarian_solve, BipartiteGraph, Component, SoftAssignment, TrackWeights},
    config::JpdaConfig,
    gating::TrackGate,
};
use rayon::prelude::*;
use tracing::debug;

/// Compute association probabilities for every track of a scan.
///
/// `gates` is indexed like the graph's track indices; tracks with no gated
/// measurement get β₀ = 1. Only measurements gated by no track are reported
/// as unmatched.
pub fn solve(
    graph: &BipartiteGraph,
    gates: &[TrackGate],
    cfg: &JpdaConfig,
    gate_prob: f64,
) -> SoftAssignment {
    let mut weights = vec![
        TrackWeights {
            miss_prob: 1.0,
            meas_probs: Vec::new(),
        };
        graph.n_tracks
    ];

    let comps = crate::association::partition_components(graph);
    let solved: Vec<Vec<(usize, TrackWeights)>> = comps
        .par_iter()
        .map(|comp| solve_component(comp, gates, cfg, gate_prob))
        .collect();
    for (ti, w) in solved.into_iter().flatten() {
        weights[ti] = w;
    }

    SoftAssignment {
        weights,
        unmatched_meas: graph.isolated_measurements(),
    }
}

/// Marginal probabilities for one cluster, keyed by global track index.
pub fn solve_component(
    comp: &Component,
    gates: &[TrackGate],
    cfg: &JpdaConfig,
    gate_prob: f64,
) -> Vec<(usize, TrackWeights)> {
    let n_tracks = comp.track_indices.len();
    let n_meas = comp.meas_indices.len();

    if n_tracks > cfg.max_cluster_size || n_meas > cfg.max_cluster_size {
        debug!(
            n_tracks,
            n_meas, "JPDA cluster too large; falling back to hard assignment"
        );
        return hard_fallback(comp);
    }

    // local_adj[i] = (local meas index, ln(P_D·N(y; 0, S) / λ)) for each gated pair
    let pd = cfg.detection_probability;
    let ln_detect = pd.ln() - cfg.clutter_density.ln();
    let ln_miss = (1.0 - pd * gate_prob).max(f64::MIN_POSITIVE).ln();

    let mut local_adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_tracks];
    for e in &comp.edges {
        let (Ok(li), Ok(lj)) = (
            comp.track_indices.binary_search(&e.track_idx),
            comp.meas_indices.binary_search(&e.meas_idx),
        ) else {
            continue;
        };
        let gate = &gates[e.track_idx];
        let Some(lin) = gate.linearization.as_ref() else {
            continue;
        };
        let Some(hit) = gate.hits.iter().find(|h| h.meas_idx == e.meas_idx) else {
            continue;
        };
        local_adj[li].push((lj, ln_detect + lin.log_likelihood(&hit.innovation)));
    }

    // Two walks over the joint events: the first finds the largest log
    // weight, the second sums weights relative to it. Events are never stored.
    let mut max_ln = f64::NEG_INFINITY;
    let mut track_max = |_: &[Option<usize>], ln_w: f64| max_ln = max_ln.max(ln_w);
    for_each_event(&local_adj, n_meas, ln_miss, &mut track_max);

    let mut marginals = vec![vec![0.0; n_meas]; n_tracks];
    let mut miss = vec![0.0; n_tracks];
    let mut total = 0.0;
    let mut accumulate = |assignment: &[Option<usize>], ln_w: f64| {
        let w = (ln_w - max_ln).exp();
        total += w;
        for (i, slot) in assignment.iter().enumerate() {
            match slot {
                Some(j) => marginals[i][*j] += w,
                None => miss[i] += w,
            }
        }
    };
    for_each_event(&local_adj, n_meas, ln_miss, &mut accumulate);

    (0..n_tracks)
        .map(|i| {
            let meas_probs = (0..n_meas)
                .filter(|&j| marginals[i][j] > 0.0)
                .map(|j| (comp.meas_indices[j], marginals[i][j] / total))
                .collect();
            (
                comp.track_indices[i],
                TrackWeights {
                    miss_prob: miss[i] / total,
                    meas_probs,
                },
            )
        })
        .collect()
}

/// Visit every feasible joint event: each track takes at most one
/// measurement, each measurement goes to at most one track.
fn for_each_event(
    local_adj: &[Vec<(usize, f64)>],
    n_meas: usize,
    ln_miss: f64,
    visit: &mut dyn FnMut(&[Option<usize>], f64),
) {
    let mut current = vec![None; local_adj.len()];
    let mut used = vec![false; n_meas];
    enumerate_events(0, 0.0, local_adj, ln_miss, &mut used, &mut current, visit);
}

fn enumerate_events(
    t_idx: usize,
    ln_weight: f64,
    local_adj: &[Vec<(usize, f64)>],
    ln_miss: f64,
    used: &mut [bool],
    current: &mut [Option<usize>],
    visit: &mut dyn FnMut(&[Option<usize>], f64),
) {
    if t_idx == local_adj.len() {
        visit(current, ln_weight);
        return;
    }

    // Track t_idx is missed
    current[t_idx] = None;
    enumerate_events(
        t_idx + 1,
        ln_weight + ln_miss,
        local_adj,
        ln_miss,
        used,
        current,
        visit,
    );

    // Track t_idx is detected by one of its gated measurements
    for &(m_idx, ln_l) in &local_adj[t_idx] {
        if !used[m_idx] {
            used[m_idx] = true;
            current[t_idx] = Some(m_idx);
            enumerate_events(
                t_idx + 1,
                ln_weight + ln_l,
                local_adj,
                ln_miss,
                used,
                current,
                visit,
            );
            used[m_idx] = false;
        }
    }
    current[t_idx] = None;
}

fn hard_fallback(comp: &Component) -> Vec<(usize, TrackWeights)> {
    let ass = hungarian_solve(comp);
    comp.track_indices
        .iter()
        .map(|&ti| {
            let w = match ass.pairs.iter().find(|(t, _)| *t == ti) {
                Some(&(_, mi)) => TrackWeights {
                    miss_prob: 0.0,
                    meas_probs: vec![(mi, 1.0)],
                },
                None => TrackWeights {
                    miss_prob: 1.0,
                    meas_probs: Vec::new(),
                },
            };
            (ti, w)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::GateConfig,
        gating::{gate_track, CHI2_99},
        types::{DMat, DVec, Measurement, StateEstimate},
    };
    use approx::assert_abs_diff_eq;
    use sensor_models::observation::{MeasurementNoise, SphericalObservation};

    fn gate_for(p: [f64; 3], meas: &[Measurement]) -> TrackGate {
        let s = StateEstimate::new(
            DVec::from_vec(vec![p[0], p[1], p[2], 0.0, 0.0, 0.0]),
            DMat::identity(6, 6) * 400.0,
        );
        gate_track(
            &s,
            p,
            0.0,
            meas,
            &SphericalObservation::new(MeasurementNoise::default(), false),
            &GateConfig::default(),
            CHI2_99[3],
        )
    }

    fn sums_to_one(w: &TrackWeights) {
        let total: f64 = w.miss_prob + w.meas_probs.iter().map(|(_, b)| b).sum::<f64>();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn single_track_close_measurement_dominates() {
        let meas = vec![
            Measurement::from_cartesian(5000.0, 5000.0, 500.0, 1.0, None),
            Measurement::from_cartesian(5030.0, 5000.0, 500.0, 1.0, None),
        ];
        let gates = vec![gate_for([5000.0, 5000.0, 500.0], &meas)];
        let graph = BipartiteGraph::from_gates(&gates, meas.len());
        let soft = solve(&graph, &gates, &JpdaConfig::default(), 0.99);

        let w = &soft.weights[0];
        sums_to_one(w);
        assert_eq!(w.meas_probs.len(), 2);
        assert!(w.meas_probs[0].1 > w.meas_probs[1].1);
        assert!(soft.unmatched_meas.is_empty());
    }

    #[test]
    fn shared_measurement_is_split_between_tracks() {
        let meas = vec![Measurement::from_cartesian(5000.0, 5010.0, 500.0, 1.0, None)];
        let gates = vec![
            gate_for([5000.0, 5000.0, 500.0], &meas),
            gate_for([5000.0, 5020.0, 500.0], &meas),
        ];
        let graph = BipartiteGraph::from_gates(&gates, meas.len());
        let soft = solve(&graph, &gates, &JpdaConfig::default(), 0.99);

        for w in &soft.weights {
            sums_to_one(w);
        }
        // Joint events forbid both tracks claiming the measurement at once.
        let claimed: f64 = soft.weights.iter().map(|w| w.meas_probs[0].1).sum();
        assert!(claimed <= 1.0 + 1e-9);
        // Nearly symmetric geometry gives nearly equal weights.
        assert_abs_diff_eq!(
            soft.weights[0].meas_probs[0].1,
            soft.weights[1].meas_probs[0].1,
            epsilon = 0.05
        );
    }

    #[test]
    fn oversized_cluster_falls_back_to_hard_assignment() {
        let meas = vec![
            Measurement::from_cartesian(5000.0, 5000.0, 500.0, 1.0, None),
            Measurement::from_cartesian(5005.0, 5000.0, 500.0, 1.0, None),
        ];
        let gates = vec![
            gate_for([5000.0, 5000.0, 500.0], &meas),
            gate_for([5005.0, 5000.0, 500.0], &meas),
        ];
        let graph = BipartiteGraph::from_gates(&gates, meas.len());
        let cfg = JpdaConfig {
            max_cluster_size: 1,
            ..Default::default()
        };
        let soft = solve(&graph, &gates, &cfg, 0.99);
        for w in &soft.weights {
            assert_eq!(w.miss_prob, 0.0);
            assert_eq!(w.meas_probs.len(), 1);
            assert_eq!(w.meas_probs[0].1, 1.0);
        }
        assert_ne!(
            soft.weights[0].meas_probs[0].0,
            soft.weights[1].meas_probs[0].0
        );
    }

    #[test]
    fn ungated_track_is_certainly_missed() {
        let meas = vec![Measurement::from_cartesian(90_000.0, 5000.0, 500.0, 1.0, None)];
        let gates = vec![gate_for([5000.0, 5000.0, 500.0], &meas)];
        let graph = BipartiteGraph::from_gates(&gates, meas.len());
        let soft = solve(&graph, &gates, &JpdaConfig::default(), 0.99);
        assert_eq!(soft.weights[0].miss_prob, 1.0);
        assert_eq!(soft.unmatched_meas, vec![0]);
    }

    #[test]
    fn dense_cluster_marginals_are_consistent() {
        // Every track gates every measurement: 13 327 joint events.
        let meas: Vec<Measurement> = (0..6)
            .map(|j| {
                Measurement::from_cartesian(5000.0 + 10.0 * j as f64, 5000.0, 500.0, 1.0, None)
            })
            .collect();
        let gates: Vec<TrackGate> = (0..6)
            .map(|i| gate_for([5000.0 + 10.0 * i as f64, 5000.0, 500.0], &meas))
            .collect();
        assert!(gates.iter().all(|g| g.hits.len() == 6));
        let graph = BipartiteGraph::from_gates(&gates, meas.len());
        let soft = solve(&graph, &gates, &JpdaConfig::default(), 0.99);

        for w in &soft.weights {
            sums_to_one(w);
            assert!(w.meas_probs.iter().all(|&(_, b)| b > 0.0 && b < 1.0));
        }
        for j in 0..meas.len() {
            let claimed: f64 = soft
                .weights
                .iter()
                .flat_map(|w| w.meas_probs.iter())
                .filter(|(m, _)| *m == j)
                .map(|(_, b)| b)
                .sum();
            assert!(claimed <= 1.0 + 1e-9, "measurement {j} claimed {claimed}");
        }
    }
}
