//! The Field Engine - per-node complex consciousness values and aggregates.
//!
//! C_i = A_i·e^(iτ_i). Attention is a Gaussian envelope around the origin,
//! renormalized so ΣA = 1, which bounds |C| = |ΣC_i| by 1.

use nalgebra::Complex;
use std::f64::consts::TAU;

use crate::branches::BranchManager;
use crate::state::Node;

/// Wraps a phase into [0, 2π). Non-finite input maps to 0.
pub fn wrap_phase(phase: f64) -> f64 {
    if !phase.is_finite() {
        return 0.0;
    }
    let wrapped = phase.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Circular distance between two phases, in [0, π].
pub fn phase_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(TAU);
    d.min(TAU - d)
}

/// Circular mean of a set of phases, in [0, 2π). Empty input yields 0.
pub fn mean_phase(phases: impl IntoIterator<Item = f64>) -> f64 {
    let (sin, cos) = phases
        .into_iter()
        .fold((0.0, 0.0), |(s, c), p| (s + p.sin(), c + p.cos()));
    if sin == 0.0 && cos == 0.0 {
        return 0.0;
    }
    wrap_phase(sin.atan2(cos))
}

/// Population aggregates of the field for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSummary {
    /// C = ΣC_i
    pub consciousness: Complex<f64>,
    /// M = Σλ_k·U_k
    pub multiverse: Complex<f64>,
    /// U_k = ΣC_i over nodes of branch k
    pub per_branch: Vec<Complex<f64>>,
}

/// Aggregates per-node values given as `(C_i, branch)` pairs.
///
/// Nodes naming a branch beyond `lambdas` count toward C but not M.
pub fn aggregate(values: impl IntoIterator<Item = (Complex<f64>, usize)>, lambdas: &[f64]) -> FieldSummary {
    let mut consciousness = Complex::new(0.0, 0.0);
    let mut per_branch = vec![Complex::new(0.0, 0.0); lambdas.len()];

    for (c, branch) in values {
        consciousness += c;
        if let Some(u) = per_branch.get_mut(branch) {
            *u += c;
        }
    }

    let multiverse = per_branch
        .iter()
        .zip(lambdas)
        .fold(Complex::new(0.0, 0.0), |m, (u, l)| m + u * *l);

    FieldSummary {
        consciousness,
        multiverse,
        per_branch,
    }
}

/// Computes attention, consciousness values and radii.
#[derive(Debug, Clone)]
pub struct FieldEngine {
    /// Width of the Gaussian attention envelope
    attention_sigma: f64,
}

impl FieldEngine {
    pub fn new(attention_sigma: f64) -> Self {
        Self { attention_sigma }
    }

    /// Advances every node's frequency, phase and cognition by one tick,
    /// then refreshes the derived field values.
    ///
    /// `dt` is the undilated tick length; phase and cognition see
    /// `dt·time_dilation`. Collapse markers are consumed here.
    pub fn step(&self, nodes: &mut [Node], branches: &BranchManager, dt: f64, time_dilation: f64, time: f64) {
        let dt_eff = dt * time_dilation;

        for node in nodes.iter_mut() {
            node.frequency = node.base_frequency * branches.frequency_factor(node.branch, &node.position, time);
            node.phase = wrap_phase(node.phase + node.frequency * dt_eff * TAU);
            node.cognition.evolve(dt_eff, time_dilation);
        }

        self.refresh(nodes);

        for node in nodes.iter_mut() {
            node.collapse_pending = false;
        }
    }

    /// Renormalizes attention and recomputes C_i and radius for all nodes.
    pub fn refresh(&self, nodes: &mut [Node]) {
        if nodes.is_empty() {
            return;
        }

        let two_sigma_sq = 2.0 * self.attention_sigma * self.attention_sigma;
        let mut total = 0.0;
        for node in nodes.iter_mut() {
            let raw = (-node.position.norm_squared() / two_sigma_sq).exp();
            node.attention = if raw.is_finite() { raw } else { 0.0 };
            total += node.attention;
        }

        let n = nodes.len() as f64;
        for node in nodes.iter_mut() {
            node.attention = if total > 0.0 { node.attention / total } else { 1.0 / n };
            node.attention = node.attention.clamp(0.0, 1.0);

            node.consciousness = if node.collapse_pending {
                Complex::new(0.0, 0.0)
            } else {
                Complex::from_polar(node.attention, node.phase)
            };

            // |C_i|·n is the attention relative to a uniform share
            node.radius = node.base_radius + node.consciousness.norm() * n * 0.5;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branches::BranchDynamics;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::f64::consts::PI;

    fn nodes(count: usize) -> Vec<Node> {
        (0..count)
            .map(|i| {
                let x = i as f64 * 25.0 - 100.0;
                Node::new(i as u64, Vector2::new(x, -x * 0.5), 40.0, i as f64 * 0.7, i % 3, 3.0)
            })
            .collect()
    }

    #[test]
    fn test_wrap_phase() {
        assert_eq!(wrap_phase(0.0), 0.0);
        assert_relative_eq!(wrap_phase(TAU + 1.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_phase(-PI), PI, epsilon = 1e-12);
        assert!(wrap_phase(-1e-18) < TAU);
        assert_eq!(wrap_phase(f64::NAN), 0.0);
    }

    #[test]
    fn test_phase_distance_is_circular() {
        assert_relative_eq!(phase_distance(0.1, TAU - 0.1), 0.2, epsilon = 1e-12);
        assert_relative_eq!(phase_distance(0.0, PI), PI, epsilon = 1e-12);
        assert_relative_eq!(phase_distance(2.0, 1.5), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_refresh_normalizes_attention() {
        let engine = FieldEngine::new(200.0);
        let mut ns = nodes(9);
        engine.refresh(&mut ns);

        let total: f64 = ns.iter().map(|n| n.attention).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        for n in &ns {
            assert_relative_eq!(n.consciousness.norm(), n.attention, epsilon = 1e-12);
            assert!(n.radius >= n.base_radius);
        }
    }

    #[test]
    fn test_refresh_far_nodes_fall_back_to_uniform() {
        let engine = FieldEngine::new(1.0);
        let mut ns = nodes(4);
        for n in ns.iter_mut() {
            n.position = Vector2::new(1e6, 1e6);
        }
        engine.refresh(&mut ns);
        for n in &ns {
            assert_relative_eq!(n.attention, 0.25);
        }
    }

    #[test]
    fn test_aggregate_empty_is_zero() {
        let summary = aggregate(std::iter::empty(), &[0.5, 0.5]);
        assert_eq!(summary.consciousness, Complex::new(0.0, 0.0));
        assert_eq!(summary.multiverse, Complex::new(0.0, 0.0));
        assert_eq!(mean_phase(std::iter::empty()), 0.0);
    }

    #[test]
    fn test_aggregate_multiverse_weights_branches() {
        let values = vec![(Complex::new(1.0, 0.0), 0), (Complex::new(0.0, 1.0), 1), (Complex::new(2.0, 0.0), 0)];
        let summary = aggregate(values, &[0.25, 0.75]);
        assert_eq!(summary.consciousness, Complex::new(3.0, 1.0));
        assert_eq!(summary.per_branch, vec![Complex::new(3.0, 0.0), Complex::new(0.0, 1.0)]);
        assert_relative_eq!(summary.multiverse.re, 0.75);
        assert_relative_eq!(summary.multiverse.im, 0.75);
    }

    #[test]
    fn test_step_keeps_phase_bounded_and_consumes_collapse() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let branches = BranchManager::new(3, BranchDynamics::default(), &mut rng);
        let engine = FieldEngine::new(200.0);
        let mut ns = nodes(6);
        ns[2].collapse_pending = true;

        engine.step(&mut ns, &branches, 0.016, 1.0, 0.016);
        assert_eq!(ns[2].consciousness, Complex::new(0.0, 0.0));
        assert!(ns.iter().all(|n| !n.collapse_pending));

        for tick in 1..2_000 {
            engine.step(&mut ns, &branches, 0.016, 5.0, tick as f64 * 0.08);
            assert!(ns.iter().all(|n| (0.0..TAU).contains(&n.phase)));
        }
        assert!(ns[2].consciousness.norm() > 0.0);
    }
}
