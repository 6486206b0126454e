//! Named scenarios for deterministic simulation runs.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: friction alone must bleed speed every tick
    FrictionDecay,

    /// SIM-002: boundary tunneling frequency matches p_tunnel
    TunnelRate,

    /// SIM-003: reset restores an empty world and uniform weights
    ResetDefaults,

    /// SIM-004: clustering ignores node order
    ClusterPermutation,

    /// SIM-005: serialized snapshots reproduce the engine's statistics
    SnapshotRoundtrip,

    /// SIM-006: repeated collapses keep λ on the simplex
    SimplexDrift,

    /// SIM-007: slow and failing subscribers never stall the clock
    SlowSubscriber,

    /// SIM-008: add_node beyond capacity is rejected
    CapacityLimit,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::FrictionDecay,
            ScenarioId::TunnelRate,
            ScenarioId::ResetDefaults,
            ScenarioId::ClusterPermutation,
            ScenarioId::SnapshotRoundtrip,
            ScenarioId::SimplexDrift,
            ScenarioId::SlowSubscriber,
            ScenarioId::CapacityLimit,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::FrictionDecay => "friction_decay",
            ScenarioId::TunnelRate => "tunnel_rate",
            ScenarioId::ResetDefaults => "reset_defaults",
            ScenarioId::ClusterPermutation => "cluster_permutation",
            ScenarioId::SnapshotRoundtrip => "snapshot_roundtrip",
            ScenarioId::SimplexDrift => "simplex_drift",
            ScenarioId::SlowSubscriber => "slow_subscriber",
            ScenarioId::CapacityLimit => "capacity_limit",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::FrictionDecay => "Kick one node, disable gravity and field, verify speed strictly decreases",
            ScenarioId::TunnelRate => "10,000 boundary crossings, tunnel fraction inside the 95% interval around p",
            ScenarioId::ResetDefaults => "Populate, collapse, reset: zero nodes, zero clusters, uniform λ",
            ScenarioId::ClusterPermutation => "Shuffle node order, verify identical cluster partition",
            ScenarioId::SnapshotRoundtrip => "Serialize every snapshot, recompute stats from the wire form",
            ScenarioId::SimplexDrift => "Collapse every 50 ticks, audit Σλ = 1 on every tick",
            ScenarioId::SlowSubscriber => "Fast, lagging and failing subscribers on the async clock loop",
            ScenarioId::CapacityLimit => "Fill to max_nodes, verify further add_node calls are rejected",
        }
    }

    /// Returns true if the scenario drives the async runtime instead of a SimWorld.
    pub fn uses_runtime(&self) -> bool {
        matches!(self, ScenarioId::SlowSubscriber)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "friction_decay" | "frictiondecay" | "sim-001" => Ok(ScenarioId::FrictionDecay),
            "tunnel_rate" | "tunnelrate" | "sim-002" => Ok(ScenarioId::TunnelRate),
            "reset_defaults" | "resetdefaults" | "sim-003" => Ok(ScenarioId::ResetDefaults),
            "cluster_permutation" | "clusterpermutation" | "sim-004" => Ok(ScenarioId::ClusterPermutation),
            "snapshot_roundtrip" | "snapshotroundtrip" | "sim-005" => Ok(ScenarioId::SnapshotRoundtrip),
            "simplex_drift" | "simplexdrift" | "sim-006" => Ok(ScenarioId::SimplexDrift),
            "slow_subscriber" | "slowsubscriber" | "sim-007" => Ok(ScenarioId::SlowSubscriber),
            "capacity_limit" | "capacitylimit" | "sim-008" => Ok(ScenarioId::CapacityLimit),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
