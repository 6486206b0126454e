//! The Cluster Detector - connected components of the alignment relation.
//!
//! Two nodes are linked iff their circular phase distance, frequency
//! difference and spatial distance are all below threshold. Components of
//! size ≥ `min_size` are clusters. Nodes are processed in id order so the
//! partition, the cluster numbering and every float sum are independent of
//! the order nodes are stored in.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::field::phase_distance;
use crate::spatial::SpatialGrid;
use crate::state::Node;

/// Disjoint-set forest with path halving and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merges the sets of `a` and `b`. Returns false if already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

/// One emergent group. Valid for the tick it was computed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    /// Member node ids, ascending
    pub members: Vec<u64>,
    pub center: Vector2<f64>,
    /// Mean pairwise circular phase distance (0 = perfectly in phase)
    pub cohesion: f64,
    pub mean_frequency: f64,
}

/// Partitions nodes into clusters each tick.
#[derive(Debug, Clone)]
pub struct ClusterDetector {
    pub phase_threshold: f64,
    pub frequency_threshold: f64,
    pub distance_threshold: f64,
    pub min_size: usize,
}

impl ClusterDetector {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            phase_threshold: config.cluster_phase_threshold,
            frequency_threshold: config.cluster_frequency_threshold,
            distance_threshold: config.cluster_distance_threshold,
            min_size: config.min_cluster_size.max(2),
        }
    }

    /// The adjacency predicate.
    pub fn linked(&self, a: &Node, b: &Node) -> bool {
        phase_distance(a.phase, b.phase) < self.phase_threshold
            && (a.frequency - b.frequency).abs() < self.frequency_threshold
            && (a.position - b.position).norm() < self.distance_threshold
    }

    /// Computes the clusters, ordered by smallest member id.
    pub fn detect(&self, nodes: &[Node]) -> Vec<Cluster> {
        if nodes.len() < self.min_size {
            return Vec::new();
        }

        // Canonical order: ascending node id
        let mut order: Vec<usize> = (0..nodes.len()).collect();
        order.sort_by_key(|&i| nodes[i].id);
        let sorted: Vec<&Node> = order.iter().map(|&i| &nodes[i]).collect();

        let positions: Vec<Vector2<f64>> = sorted.iter().map(|n| n.position).collect();
        let grid = SpatialGrid::build(&positions, self.distance_threshold);

        let mut sets = UnionFind::new(sorted.len());
        for (i, j) in grid.candidate_pairs() {
            if self.linked(sorted[i], sorted[j]) {
                sets.union(i, j);
            }
        }

        // Group by root; roots are visited in ascending-id order of their
        // first member, so groups come out sorted by min id
        let mut group_of_root = vec![usize::MAX; sorted.len()];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in 0..sorted.len() {
            let root = sets.find(i);
            if group_of_root[root] == usize::MAX {
                group_of_root[root] = groups.len();
                groups.push(Vec::new());
            }
            groups[group_of_root[root]].push(i);
        }

        groups
            .into_iter()
            .filter(|g| g.len() >= self.min_size)
            .enumerate()
            .map(|(id, members)| summarize(id, &members, &sorted))
            .collect()
    }

    /// Detects clusters and writes `cluster_id` on every node.
    pub fn assign(&self, nodes: &mut [Node]) -> Vec<Cluster> {
        let clusters = self.detect(nodes);
        let membership: HashMap<u64, usize> = clusters
            .iter()
            .flat_map(|c| c.members.iter().map(move |&id| (id, c.id)))
            .collect();
        for node in nodes.iter_mut() {
            node.cluster_id = membership.get(&node.id).copied();
        }
        clusters
    }
}

fn summarize(id: usize, members: &[usize], sorted: &[&Node]) -> Cluster {
    let n = members.len() as f64;
    let center = members.iter().fold(Vector2::zeros(), |c, &i| c + sorted[i].position) / n;
    let mean_frequency = members.iter().map(|&i| sorted[i].frequency).sum::<f64>() / n;

    let mut distance = 0.0;
    let mut pairs = 0usize;
    for (k, &i) in members.iter().enumerate() {
        for &j in &members[k + 1..] {
            distance += phase_distance(sorted[i].phase, sorted[j].phase);
            pairs += 1;
        }
    }

    Cluster {
        id,
        members: members.iter().map(|&i| sorted[i].id).collect(),
        center,
        cohesion: if pairs > 0 { distance / pairs as f64 } else { 0.0 },
        mean_frequency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn detector() -> ClusterDetector {
        ClusterDetector::from_config(&EngineConfig::default())
    }

    fn node(id: u64, x: f64, y: f64, phase: f64, freq: f64) -> Node {
        Node::new(id, Vector2::new(x, y), freq, phase, 0, 3.0)
    }

    #[test]
    fn test_union_find() {
        let mut uf = UnionFind::new(5);
        assert!(uf.union(0, 1));
        assert!(uf.union(3, 4));
        assert!(!uf.union(1, 0));
        assert_eq!(uf.find(0), uf.find(1));
        assert_ne!(uf.find(1), uf.find(3));
        assert!(uf.union(1, 4));
        assert_eq!(uf.find(0), uf.find(3));
    }

    #[test]
    fn test_linked_requires_all_three_conditions() {
        let d = detector();
        let a = node(0, 0.0, 0.0, 1.0, 40.0);
        assert!(d.linked(&a, &node(1, 10.0, 0.0, 1.2, 41.0)));
        assert!(!d.linked(&a, &node(1, 10.0, 0.0, 2.0, 41.0)));
        assert!(!d.linked(&a, &node(1, 10.0, 0.0, 1.2, 46.0)));
        assert!(!d.linked(&a, &node(1, 100.0, 0.0, 1.2, 41.0)));
        // Phase distance wraps around 2π
        assert!(d.linked(&node(2, 0.0, 0.0, 0.1, 40.0), &node(3, 0.0, 5.0, 6.2, 40.0)));
    }

    #[test]
    fn test_transitive_chain_forms_one_cluster() {
        let d = detector();
        let nodes = vec![
            node(5, 0.0, 0.0, 1.0, 40.0),
            node(9, 60.0, 0.0, 1.0, 40.0),
            node(2, 120.0, 0.0, 1.0, 40.0),
            node(7, 400.0, 400.0, 1.0, 40.0),
        ];
        let clusters = d.detect(&nodes);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].id, 0);
        assert_eq!(clusters[0].members, vec![2, 5, 9]);
        assert!((clusters[0].center.x - 60.0).abs() < 1e-9);
        assert_eq!(clusters[0].cohesion, 0.0);
    }

    #[test]
    fn test_assign_marks_members_only() {
        let d = detector();
        let mut nodes = vec![
            node(0, 0.0, 0.0, 1.0, 40.0),
            node(1, 10.0, 0.0, 1.1, 40.0),
            node(2, 300.0, 0.0, 1.0, 40.0),
        ];
        nodes[2].cluster_id = Some(4);
        let clusters = d.assign(&mut nodes);
        assert_eq!(clusters.len(), 1);
        assert_eq!(nodes[0].cluster_id, Some(0));
        assert_eq!(nodes[1].cluster_id, Some(0));
        assert_eq!(nodes[2].cluster_id, None);
    }

    #[test]
    fn test_empty_and_singletons() {
        let d = detector();
        assert!(d.detect(&[]).is_empty());
        assert!(d.detect(&[node(0, 0.0, 0.0, 0.0, 40.0)]).is_empty());
    }

    fn arb_nodes() -> impl Strategy<Value = Vec<Node>> {
        prop::collection::vec((-150.0f64..150.0, -150.0f64..150.0, 0.0f64..6.28, 35.0f64..45.0), 0..40).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, (x, y, p, f))| node(i as u64, x, y, p, f))
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_partition_is_order_independent(nodes in arb_nodes(), seed in any::<u64>()) {
            use rand::seq::SliceRandom;
            use rand::SeedableRng;

            let d = detector();
            let expected = d.detect(&nodes);

            let mut shuffled = nodes.clone();
            shuffled.shuffle(&mut rand_chacha::ChaCha8Rng::seed_from_u64(seed));
            prop_assert_eq!(d.detect(&shuffled), expected);
        }
    }
}
