//! CONSIM Metrics Module
//! =====================
//!
//! Global statistics over one snapshot:
//! - **C**: aggregate consciousness ΣC_i (|C| ≤ 1 since ΣA = 1)
//! - **M**: multiverse term Σλ_k·U_k
//! - **Resonance**: phase coherence |mean e^(iτ)| in [0, 1]
//!
//! Stats are computed from the serialized node views rather than from the
//! live nodes, so a subscriber recomputing them from a received snapshot
//! gets bit-identical values.

use nalgebra::Complex;
use serde::{Deserialize, Serialize};

use crate::field::{aggregate, mean_phase};
use crate::snapshot::NodeView;

/// Derived statistics for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub tick: u64,
    /// Simulated seconds since start or last reset
    pub time: f64,
    pub node_count: usize,
    pub cluster_count: usize,
    pub consciousness_re: f64,
    pub consciousness_im: f64,
    pub consciousness_magnitude: f64,
    pub multiverse_re: f64,
    pub multiverse_im: f64,
    pub multiverse_magnitude: f64,
    /// Arithmetic mean of |C_i|
    pub mean_consciousness: f64,
    /// Circular mean of τ, in [0, 2π)
    pub mean_phase: f64,
    pub average_attention: f64,
    /// Phase coherence |Σe^(iτ)|/n
    pub global_resonance: f64,
}

// =============================================================================
// COMPUTATION
// =============================================================================

/// Computes the statistics for a set of node views.
///
/// Zero nodes yields all-zero aggregates.
pub fn compute(tick: u64, time: f64, nodes: &[NodeView], lambdas: &[f64], cluster_count: usize) -> GlobalStats {
    let summary = aggregate(
        nodes
            .iter()
            .map(|n| (Complex::new(n.consciousness_re, n.consciousness_im), n.universe_id)),
        lambdas,
    );

    let count = nodes.len();
    let (mean_consciousness, average_attention, global_resonance) = if count == 0 {
        (0.0, 0.0, 0.0)
    } else {
        let n = count as f64;
        let magnitude: f64 = nodes
            .iter()
            .map(|v| Complex::new(v.consciousness_re, v.consciousness_im).norm())
            .sum();
        let attention: f64 = nodes.iter().map(|v| v.attention).sum();
        let coherence = nodes
            .iter()
            .fold(Complex::new(0.0, 0.0), |acc, v| acc + Complex::from_polar(1.0, v.phase));
        (magnitude / n, attention / n, coherence.norm() / n)
    };

    GlobalStats {
        tick,
        time,
        node_count: count,
        cluster_count,
        consciousness_re: summary.consciousness.re,
        consciousness_im: summary.consciousness.im,
        consciousness_magnitude: summary.consciousness.norm(),
        multiverse_re: summary.multiverse.re,
        multiverse_im: summary.multiverse.im,
        multiverse_magnitude: summary.multiverse.norm(),
        mean_consciousness,
        mean_phase: mean_phase(nodes.iter().map(|v| v.phase)),
        average_attention,
        global_resonance,
    }
}
