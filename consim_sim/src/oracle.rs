//! Invariant oracle for simulation.
//!
//! The oracle audits every snapshot the harness observes against the
//! properties that must hold for all ticks:
//! - Branch weights stay on the probability simplex
//! - Phases stay in [0, 2π) and attention in [0, 1]
//! - Published statistics match a recomputation from the snapshot itself
//! - Cluster membership is consistent in both directions
//! - Population never exceeds capacity and ticks never go backwards

use consim_core::{EngineConfig, Snapshot};
use std::collections::HashMap;
use std::f64::consts::TAU;

/// Tolerance on Σλ = 1.
pub const SIMPLEX_EPSILON: f64 = 1e-9;

/// A single broken invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub tick: u64,
    pub description: String,
}

/// Audits snapshots and accumulates violations.
#[derive(Debug)]
pub struct InvariantOracle {
    branch_count: usize,
    max_nodes: usize,
    min_cluster_size: usize,
    last_tick: Option<u64>,
    violations: Vec<Violation>,
    checks: u64,
}

impl InvariantOracle {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            branch_count: config.branch_count,
            max_nodes: config.max_nodes,
            min_cluster_size: config.min_cluster_size,
            last_tick: None,
            violations: Vec::new(),
            checks: 0,
        }
    }

    /// A reset legitimately rewinds the tick counter.
    pub fn note_reset(&mut self) {
        self.last_tick = None;
    }

    /// Checks one snapshot. Returns true if it passed every invariant.
    pub fn check(&mut self, snapshot: &Snapshot) -> bool {
        let before = self.violations.len();
        let tick = snapshot.tick;
        self.checks += 1;

        if let Some(last) = self.last_tick {
            if tick < last {
                self.flag(tick, format!("tick went backwards from {last}"));
            }
        }
        self.last_tick = Some(tick);

        self.check_simplex(snapshot);
        self.check_nodes(snapshot);
        self.check_clusters(snapshot);

        if snapshot.recompute_stats() != snapshot.global_stats {
            self.flag(tick, "global_stats disagree with snapshot contents".to_string());
        }

        self.violations.len() == before
    }

    fn check_simplex(&mut self, snapshot: &Snapshot) {
        let tick = snapshot.tick;
        if snapshot.lambdas.len() != self.branch_count {
            self.flag(
                tick,
                format!("{} weights for {} branches", snapshot.lambdas.len(), self.branch_count),
            );
        }
        let sum: f64 = snapshot.lambdas.iter().sum();
        if (sum - 1.0).abs() > SIMPLEX_EPSILON {
            self.flag(tick, format!("Σλ = {sum}"));
        }
        if let Some(w) = snapshot.lambdas.iter().find(|w| !(**w >= 0.0)) {
            self.flag(tick, format!("negative or NaN weight {w}"));
        }
    }

    fn check_nodes(&mut self, snapshot: &Snapshot) {
        let tick = snapshot.tick;
        if snapshot.nodes.len() > self.max_nodes {
            self.flag(
                tick,
                format!("{} nodes exceeds capacity {}", snapshot.nodes.len(), self.max_nodes),
            );
        }
        for node in &snapshot.nodes {
            if !(0.0..TAU).contains(&node.phase) {
                self.flag(tick, format!("node {} phase {} outside [0, 2π)", node.id, node.phase));
            }
            if !(0.0..=1.0).contains(&node.attention) {
                self.flag(tick, format!("node {} attention {}", node.id, node.attention));
            }
            if node.universe_id >= self.branch_count {
                self.flag(tick, format!("node {} in unknown branch {}", node.id, node.universe_id));
            }
        }
    }

    fn check_clusters(&mut self, snapshot: &Snapshot) {
        let tick = snapshot.tick;
        let labels: HashMap<u64, Option<usize>> =
            snapshot.nodes.iter().map(|n| (n.id, n.cluster_id)).collect();

        let mut members = 0;
        for cluster in &snapshot.clusters {
            if cluster.node_ids.len() < self.min_cluster_size {
                self.flag(tick, format!("cluster {} has {} members", cluster.id, cluster.node_ids.len()));
            }
            for id in &cluster.node_ids {
                members += 1;
                if labels.get(id) != Some(&Some(cluster.id)) {
                    self.flag(tick, format!("node {id} not labelled with cluster {}", cluster.id));
                }
            }
        }

        let labelled = labels.values().filter(|l| l.is_some()).count();
        if labelled != members {
            self.flag(tick, format!("{labelled} labelled nodes but {members} cluster members"));
        }
    }

    fn flag(&mut self, tick: u64, description: String) {
        self.violations.push(Violation { tick, description });
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of snapshots audited.
    pub fn invariant_checks(&self) -> u64 {
        self.checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consim_core::Engine;

    fn engine(nodes: usize) -> Engine {
        let config = EngineConfig {
            initial_nodes: nodes,
            ..EngineConfig::default()
        };
        Engine::with_seed(config).unwrap()
    }

    #[test]
    fn test_clean_run() {
        let mut engine = engine(64);
        let mut oracle = InvariantOracle::new(engine.config());
        for _ in 0..50 {
            engine.step();
            assert!(oracle.check(&engine.snapshot()));
        }
        assert!(oracle.is_clean());
        assert_eq!(oracle.invariant_checks(), 50);
    }

    #[test]
    fn test_detects_broken_simplex() {
        let engine = engine(4);
        let mut oracle = InvariantOracle::new(engine.config());
        let mut snapshot = (*engine.snapshot()).clone();
        snapshot.lambdas[0] += 0.1;
        assert!(!oracle.check(&snapshot));
        assert!(oracle.violations()[0].description.contains("Σλ"));
    }

    #[test]
    fn test_detects_stale_stats() {
        let engine = engine(8);
        let mut oracle = InvariantOracle::new(engine.config());
        let mut snapshot = (*engine.snapshot()).clone();
        snapshot.nodes[0].phase = wrap(snapshot.nodes[0].phase + 1.0);
        assert!(!oracle.check(&snapshot));
    }

    #[test]
    fn test_tick_regression_and_reset() {
        let mut engine = engine(4);
        let mut oracle = InvariantOracle::new(engine.config());
        engine.step();
        engine.step();
        assert!(oracle.check(&engine.snapshot()));

        engine.reset();
        assert!(!oracle.check(&engine.snapshot()));

        oracle.note_reset();
        engine.step();
        assert!(oracle.check(&engine.snapshot()));
    }

    fn wrap(phase: f64) -> f64 {
        phase.rem_euclid(TAU)
    }
}
