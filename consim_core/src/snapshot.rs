//! Immutable per-tick snapshots and their wire form.
//!
//! A snapshot is built once at the end of a tick, after every component has
//! run, and is never mutated afterwards. Subscribers share it via `Arc`.

use consim_env::{EnvError, Envelope, Frame};
use serde::{Deserialize, Serialize};

use crate::branches::BranchManager;
use crate::cluster::Cluster;
use crate::config::PhysicsParams;
use crate::metrics::{self, GlobalStats};
use crate::state::{Node, StateStore, ViewMode};

/// Envelope type carrying a snapshot.
pub const STATE_MESSAGE: &str = "state";

/// Flat, renderer-facing view of one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub consciousness_re: f64,
    pub consciousness_im: f64,
    pub phase: f64,
    pub frequency: f64,
    pub attention: f64,
    pub consciousness_depth: f64,
    pub self_awareness: f64,
    pub thought_intensity: f64,
    pub cluster_id: Option<usize>,
    pub radius: f64,
    pub universe_id: usize,
}

impl From<&Node> for NodeView {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            x: node.position.x,
            y: node.position.y,
            vx: node.velocity.x,
            vy: node.velocity.y,
            consciousness_re: node.consciousness.re,
            consciousness_im: node.consciousness.im,
            phase: node.phase,
            frequency: node.frequency,
            attention: node.attention,
            consciousness_depth: node.cognition.consciousness_depth,
            self_awareness: node.cognition.self_awareness,
            thought_intensity: node.cognition.thought_intensity,
            cluster_id: node.cluster_id,
            radius: node.radius,
            universe_id: node.branch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseView {
    pub id: usize,
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
    /// λ of this branch
    pub resonance_coeff: f64,
    pub node_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterView {
    pub id: usize,
    pub node_ids: Vec<u64>,
    pub center_x: f64,
    pub center_y: f64,
    pub cohesion: f64,
    pub mean_frequency: f64,
}

impl From<&Cluster> for ClusterView {
    fn from(cluster: &Cluster) -> Self {
        Self {
            id: cluster.id,
            node_ids: cluster.members.clone(),
            center_x: cluster.center.x,
            center_y: cluster.center.y,
            cohesion: cluster.cohesion,
            mean_frequency: cluster.mean_frequency,
        }
    }
}

/// Complete, internally consistent state for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub time: f64,
    pub nodes: Vec<NodeView>,
    pub clusters: Vec<ClusterView>,
    pub universes: Vec<UniverseView>,
    pub global_stats: GlobalStats,
    pub mode: ViewMode,
    pub params: PhysicsParams,
    pub lambdas: Vec<f64>,
    /// Numeric faults since start or last reset
    pub faults: u64,
}

#[derive(Serialize)]
struct StateMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a Snapshot,
    timestamp: f64,
}

impl Snapshot {
    /// Captures the store after a completed tick.
    pub fn capture(store: &StateStore, branches: &BranchManager, clusters: &[Cluster]) -> Self {
        let nodes: Vec<NodeView> = store.nodes.iter().map(NodeView::from).collect();
        let lambdas = branches.weights().to_vec();

        let mut per_branch = vec![0usize; branches.len()];
        for node in &store.nodes {
            if let Some(count) = per_branch.get_mut(node.branch) {
                *count += 1;
            }
        }
        let universes = branches
            .branches()
            .iter()
            .map(|b| UniverseView {
                id: b.id,
                center_x: b.center.x,
                center_y: b.center.y,
                radius: b.radius,
                resonance_coeff: lambdas.get(b.id).copied().unwrap_or(0.0),
                node_count: per_branch.get(b.id).copied().unwrap_or(0),
            })
            .collect();

        let global_stats = metrics::compute(store.tick, store.time, &nodes, &lambdas, clusters.len());

        Self {
            tick: store.tick,
            time: store.time,
            nodes,
            clusters: clusters.iter().map(ClusterView::from).collect(),
            universes,
            global_stats,
            mode: store.mode,
            params: store.params,
            lambdas,
            faults: store.fault_total(),
        }
    }

    /// Recomputes the global statistics from the snapshot's own contents.
    pub fn recompute_stats(&self) -> GlobalStats {
        metrics::compute(self.tick, self.time, &self.nodes, &self.lambdas, self.clusters.len())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Serializes the snapshot as a `state` envelope.
    pub fn to_json(&self, timestamp: f64) -> Result<String, EnvError> {
        let message = StateMessage {
            kind: STATE_MESSAGE,
            data: self,
            timestamp,
        };
        Ok(serde_json::to_string(&message)?)
    }

    /// Serializes once into a frame shareable by every subscriber.
    pub fn to_frame(&self, timestamp: f64) -> Result<Frame, EnvError> {
        Ok(Frame::new(self.tick, self.to_json(timestamp)?))
    }

    /// Parses a `state` envelope back into a snapshot.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, EnvError> {
        if envelope.kind != STATE_MESSAGE {
            return Err(EnvError::Serialization(format!(
                "expected {STATE_MESSAGE} envelope, got {}",
                envelope.kind
            )));
        }
        Ok(serde_json::from_value(envelope.data.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branches::BranchDynamics;
    use crate::field::FieldEngine;
    use nalgebra::Vector2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn populated() -> (StateStore, BranchManager) {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let branches = BranchManager::new(3, BranchDynamics::default(), &mut rng);
        let mut store = StateStore::new(8);
        for i in 0..12 {
            let id = store.allocate_id();
            let pos = Vector2::new(i as f64 * 13.7 - 80.0, 40.0 - i as f64 * 7.3);
            store.nodes.push(Node::new(id, pos, 35.0 + i as f64 * 0.9, i as f64 * 0.51, i % 3, 3.0));
        }
        FieldEngine::new(200.0).refresh(&mut store.nodes);
        store.tick = 42;
        store.time = 0.672;
        (store, branches)
    }

    #[test]
    fn test_capture_counts_nodes_per_universe() {
        let (store, branches) = populated();
        let snapshot = Snapshot::capture(&store, &branches, &[]);
        assert_eq!(snapshot.node_count(), 12);
        assert_eq!(snapshot.universes.iter().map(|u| u.node_count).sum::<usize>(), 12);
        assert_eq!(snapshot.lambdas.len(), 3);
        assert_eq!(snapshot.global_stats.tick, 42);
    }

    #[test]
    fn test_wire_roundtrip_preserves_stats_exactly() {
        let (store, branches) = populated();
        let snapshot = Snapshot::capture(&store, &branches, &[]);

        let text = snapshot.to_json(1_700_000_000_000.0).unwrap();
        let envelope = Envelope::from_json(&text).unwrap();
        assert_eq!(envelope.kind, STATE_MESSAGE);

        let decoded = Snapshot::from_envelope(&envelope).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.recompute_stats(), snapshot.global_stats);
    }

    #[test]
    fn test_from_envelope_rejects_other_types() {
        let envelope = Envelope::new("stats", serde_json::json!({}), 0.0);
        assert!(matches!(Snapshot::from_envelope(&envelope), Err(EnvError::Serialization(_))));
    }

    #[test]
    fn test_frame_carries_tick() {
        let (store, branches) = populated();
        let frame = Snapshot::capture(&store, &branches, &[]).to_frame(0.0).unwrap();
        assert_eq!(frame.tick, 42);
        assert!(frame.size() > 0);
    }
}
