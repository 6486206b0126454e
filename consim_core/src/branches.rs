//! The Branch Manager - N parallel universes and their resonance weights λ.
//!
//! λ lives on the probability simplex at all times. Each tick it drifts by a
//! mean-reverting (Ornstein-Uhlenbeck) step toward the uniform distribution
//! and is projected back onto the simplex. A collapse biases λ toward one
//! branch and then relaxes deterministically to the pre-collapse weights.

use nalgebra::Vector2;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Relaxation ends once λ is this close (L1) to its target.
const RELAXATION_EPSILON: f64 = 1e-3;

/// Depth of the per-branch frequency modulation.
const MODULATION_DEPTH: f64 = 0.2;

/// Angular rate of the frequency modulation (rad per simulated second).
const MODULATION_RATE: f64 = 0.05;

/// Geometry of one universe branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: usize,
    pub center: Vector2<f64>,
    pub radius: f64,
}

impl Branch {
    /// Returns true if the point lies inside this branch's disc.
    pub fn contains(&self, point: &Vector2<f64>) -> bool {
        (point - self.center).norm() <= self.radius
    }
}

/// Tuning for drift and collapse.
#[derive(Debug, Clone, Copy)]
pub struct BranchDynamics {
    /// OU mean reversion θ
    pub drift_rate: f64,
    /// OU noise σ
    pub drift_noise: f64,
    /// Mixing toward the dominant branch on collapse
    pub collapse_strength: f64,
    /// Relaxation time constant in seconds
    pub relaxation_secs: f64,
}

impl Default for BranchDynamics {
    fn default() -> Self {
        Self {
            drift_rate: 0.5,
            drift_noise: 0.05,
            collapse_strength: 0.8,
            relaxation_secs: 1.5,
        }
    }
}

/// Owns the branches and λ.
#[derive(Debug, Clone)]
pub struct BranchManager {
    branches: Vec<Branch>,
    weights: Vec<f64>,
    dynamics: BranchDynamics,
    /// Pre-collapse weights while a relaxation is in progress
    relaxation_target: Option<Vec<f64>>,
}

impl BranchManager {
    /// Samples `count` branches (center in [-400,400]², radius in [150,250]).
    pub fn new<R: Rng>(count: usize, dynamics: BranchDynamics, rng: &mut R) -> Self {
        let branches = (0..count)
            .map(|id| Branch {
                id,
                center: Vector2::new(rng.gen_range(-400.0..=400.0), rng.gen_range(-400.0..=400.0)),
                radius: rng.gen_range(150.0..=250.0),
            })
            .collect();

        Self {
            branches,
            weights: uniform(count),
            dynamics,
            relaxation_target: None,
        }
    }

    /// Current λ, ordered by branch id.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// True while λ is relaxing after a collapse.
    pub fn is_relaxing(&self) -> bool {
        self.relaxation_target.is_some()
    }

    /// Index of the largest weight (lowest index on ties).
    pub fn dominant(&self) -> usize {
        let mut best = 0;
        for (k, w) in self.weights.iter().enumerate() {
            if *w > self.weights[best] {
                best = k;
            }
        }
        best
    }

    /// Advances λ by `dt` simulated seconds.
    pub fn step<R: Rng>(&mut self, dt: f64, rng: &mut R) {
        if self.weights.is_empty() || dt <= 0.0 {
            return;
        }

        if let Some(target) = &self.relaxation_target {
            let rate = 1.0 - (-dt / self.dynamics.relaxation_secs).exp();
            for (w, t) in self.weights.iter_mut().zip(target) {
                *w += (t - *w) * rate;
            }
            let distance: f64 = self.weights.iter().zip(target).map(|(w, t)| (w - t).abs()).sum();
            if distance < RELAXATION_EPSILON {
                self.weights.clone_from(target);
                self.relaxation_target = None;
            }
        } else {
            let anchor = 1.0 / self.weights.len() as f64;
            let theta = self.dynamics.drift_rate;
            let diffusion = self.dynamics.drift_noise * dt.sqrt();
            for w in self.weights.iter_mut() {
                let xi: f64 = StandardNormal.sample(rng);
                *w += theta * (anchor - *w) * dt + diffusion * xi;
            }
        }

        project_to_simplex(&mut self.weights);
    }

    /// Biases λ toward the branch nearest `point` and schedules relaxation.
    ///
    /// Returns the favoured branch. A collapse during an ongoing relaxation
    /// keeps the original pre-collapse target.
    pub fn collapse(&mut self, point: Vector2<f64>) -> usize {
        let Some(k) = self.nearest(&point) else {
            return 0;
        };

        if self.relaxation_target.is_none() {
            self.relaxation_target = Some(self.weights.clone());
        }

        let s = self.dynamics.collapse_strength;
        for (i, w) in self.weights.iter_mut().enumerate() {
            let peak = if i == k { 1.0 } else { 0.0 };
            *w = (1.0 - s) * *w + s * peak;
        }
        project_to_simplex(&mut self.weights);
        k
    }

    /// Restores the uniform distribution and cancels any relaxation.
    pub fn reset(&mut self) {
        self.weights = uniform(self.weights.len());
        self.relaxation_target = None;
    }

    /// Draws a branch for a new node, weighted by λ.
    pub fn assign<R: Rng>(&self, rng: &mut R) -> usize {
        match WeightedIndex::new(&self.weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => self.dominant(),
        }
    }

    /// Frequency multiplier for a node of `branch` at `position`.
    pub fn frequency_factor(&self, branch: usize, position: &Vector2<f64>, time: f64) -> f64 {
        match (self.branches.get(branch), self.weights.get(branch)) {
            (Some(b), Some(lambda)) if b.contains(position) => {
                1.0 + lambda * MODULATION_DEPTH * (MODULATION_RATE * time).sin()
            }
            _ => 1.0,
        }
    }

    /// Nearest branch center (lowest index on ties).
    fn nearest(&self, point: &Vector2<f64>) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for b in &self.branches {
            let d = (point - b.center).norm_squared();
            match best {
                Some((_, bd)) if d >= bd => {}
                _ => best = Some((b.id, d)),
            }
        }
        best.map(|(k, _)| k)
    }
}

fn uniform(count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    vec![1.0 / count as f64; count]
}

/// Clips negatives (and non-finite entries) to zero and renormalizes.
///
/// Falls back to uniform if nothing positive remains.
pub fn project_to_simplex(weights: &mut [f64]) {
    for w in weights.iter_mut() {
        if !w.is_finite() || *w < 0.0 {
            *w = 0.0;
        }
    }
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        for w in weights.iter_mut() {
            *w /= total;
        }
    } else if !weights.is_empty() {
        let u = 1.0 / weights.len() as f64;
        weights.iter_mut().for_each(|w| *w = u);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn manager(seed: u64) -> (BranchManager, ChaCha8Rng) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let m = BranchManager::new(3, BranchDynamics::default(), &mut rng);
        (m, rng)
    }

    #[test]
    fn test_initial_weights_uniform() {
        let (m, _) = manager(1);
        assert_eq!(m.len(), 3);
        for w in m.weights() {
            assert_relative_eq!(*w, 1.0 / 3.0);
        }
        for b in m.branches() {
            assert!(b.center.x.abs() <= 400.0 && b.center.y.abs() <= 400.0);
            assert!((150.0..=250.0).contains(&b.radius));
        }
    }

    #[test]
    fn test_drift_stays_on_simplex() {
        let (mut m, mut rng) = manager(7);
        for _ in 0..5_000 {
            m.step(0.016, &mut rng);
            let sum: f64 = m.weights().iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-9);
            assert!(m.weights().iter().all(|w| (0.0..=1.0).contains(w)));
        }
    }

    #[test]
    fn test_collapse_favours_nearest_branch_then_relaxes() {
        let (mut m, mut rng) = manager(3);
        let before = m.weights().to_vec();
        let target = m.branches()[1].center;

        let k = m.collapse(target);
        assert_eq!(k, 1);
        assert_eq!(m.dominant(), 1);
        assert!(m.weights()[1] > 0.8);
        assert!(m.is_relaxing());

        let mut steps = 0;
        while m.is_relaxing() && steps < 2_000 {
            m.step(0.016, &mut rng);
            steps += 1;
        }
        assert!(!m.is_relaxing());
        for (w, b) in m.weights().iter().zip(&before) {
            assert_relative_eq!(*w, *b, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_repeated_collapse_keeps_original_target() {
        let (mut m, _) = manager(5);
        let before = m.weights().to_vec();
        m.collapse(m.branches()[0].center);
        m.collapse(m.branches()[2].center);
        assert_eq!(m.relaxation_target.as_deref(), Some(before.as_slice()));
    }

    #[test]
    fn test_reset_restores_uniform() {
        let (mut m, mut rng) = manager(9);
        m.collapse(Vector2::new(0.0, 0.0));
        m.step(0.016, &mut rng);
        m.reset();
        assert!(!m.is_relaxing());
        assert_eq!(m.weights(), uniform(3).as_slice());
    }

    #[test]
    fn test_assign_respects_weights() {
        let (mut m, mut rng) = manager(11);
        m.weights = vec![0.0, 1.0, 0.0];
        for _ in 0..100 {
            assert_eq!(m.assign(&mut rng), 1);
        }
    }

    #[test]
    fn test_frequency_factor_outside_disc_is_unity() {
        let (m, _) = manager(13);
        let far = Vector2::new(10_000.0, 10_000.0);
        assert_eq!(m.frequency_factor(0, &far, 12.0), 1.0);
        assert_eq!(m.frequency_factor(99, &far, 12.0), 1.0);
    }

    proptest! {
        #[test]
        fn prop_projection_lands_on_simplex(raw in prop::collection::vec(-10.0f64..10.0, 1..8)) {
            let mut w = raw.clone();
            project_to_simplex(&mut w);
            let sum: f64 = w.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-9);
            prop_assert!(w.iter().all(|x| *x >= 0.0 && *x <= 1.0));
        }
    }
}
