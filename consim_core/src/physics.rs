//! The Physics Integrator - forces, explicit integration and the boundary.
//!
//! Per tick:
//! 1. Accumulate accelerations (collision, gravity, pointer, jitter)
//! 2. `v ← (v + a·dt')·friction`, `x ← x + v·dt'` with `dt' = dt·time_dilation`
//! 3. Resolve the domain boundary per axis (tunnel, reflect or wrap)
//! 4. Cull nodes whose kinematics became non-finite

use nalgebra::Vector2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::warn;

use crate::config::{BoundaryMode, EngineConfig, PhysicsParams};
use crate::spatial::SpatialGrid;
use crate::state::{Node, NumericFault, PointerInteraction, PointerMode};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Central attraction per unit `gravity`
pub const GRAVITY_ACCEL: f64 = 3.6;

/// No gravity inside this distance of the origin
pub const GRAVITY_DEADZONE: f64 = 10.0;

/// Peak collision repulsion per unit `elasticity`
pub const COLLISION_ACCEL: f64 = 1800.0;

/// Peak pointer acceleration per unit falloff
pub const POINTER_ACCEL: f64 = 1440.0;

/// Pointer reach per unit `field_strength`
pub const POINTER_REACH: f64 = 200.0;

/// Jitter standard deviation per unit `field_strength`
pub const JITTER_SCALE: f64 = 2.0;

/// Speed retained by a tunneling node
pub const TUNNEL_VELOCITY_FACTOR: f64 = 0.5;

/// Restitution per unit `elasticity` on reflection
pub const REFLECT_RESTITUTION: f64 = 0.8;

// ============================================================================
// BOUNDARY
// ============================================================================

/// What happened to one coordinate at the domain edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryOutcome {
    Inside,
    Reflected,
    Wrapped,
    Tunneled,
}

/// Boundary behaviour of the domain `[-half_extent, half_extent]`.
#[derive(Debug, Clone, Copy)]
pub struct Boundary {
    pub half_extent: f64,
    pub mode: BoundaryMode,
    pub tunnel_probability: f64,
}

impl Boundary {
    /// Resolves one axis. A crossing costs exactly one Bernoulli draw.
    ///
    /// Tunneling moves the coordinate to the opposite edge and halves the
    /// speed without changing direction, so the node re-enters the domain.
    pub fn resolve<R: Rng>(&self, pos: &mut f64, vel: &mut f64, elasticity: f64, rng: &mut R) -> BoundaryOutcome {
        let w = self.half_extent;
        if !pos.is_finite() || pos.abs() <= w {
            return BoundaryOutcome::Inside;
        }

        if rng.gen_bool(self.tunnel_probability.clamp(0.0, 1.0)) {
            *pos = if *pos > 0.0 { -w } else { w };
            *vel *= TUNNEL_VELOCITY_FACTOR;
            return BoundaryOutcome::Tunneled;
        }

        match self.mode {
            BoundaryMode::Reflect => {
                let side = pos.signum();
                *pos = side * w;
                *vel = -side * vel.abs() * REFLECT_RESTITUTION * elasticity;
                BoundaryOutcome::Reflected
            }
            BoundaryMode::Wrap => {
                *pos = (*pos + w).rem_euclid(2.0 * w) - w;
                BoundaryOutcome::Wrapped
            }
        }
    }
}

// ============================================================================
// POINTER KERNELS
// ============================================================================

/// Acceleration the pointer exerts on a node at `position`.
///
/// Zero when inactive, outside the reach `200·field_strength`, or exactly at
/// the pointer. Every kernel's envelope decays monotonically with distance.
pub fn pointer_acceleration(
    position: &Vector2<f64>,
    pointer: &PointerInteraction,
    field_strength: f64,
    time: f64,
) -> Vector2<f64> {
    let reach = POINTER_REACH * field_strength;
    let delta = pointer.position - position;
    let d = delta.norm();
    if !pointer.active || reach <= 0.0 || d >= reach || d == 0.0 || !d.is_finite() {
        return Vector2::zeros();
    }

    // Unit vector toward the pointer
    let toward = delta / d;
    let falloff = (reach - d) / reach * field_strength;

    match pointer.mode {
        PointerMode::Push => -toward * falloff * POINTER_ACCEL,
        PointerMode::Pull => toward * falloff * POINTER_ACCEL,
        PointerMode::Vortex => {
            let tangent = Vector2::new(-toward.y, toward.x);
            tangent * falloff * POINTER_ACCEL * 1.25
        }
        PointerMode::Wave => toward * falloff * (0.05 * d - 10.0 * time).sin() * POINTER_ACCEL * 1.25,
        PointerMode::String => toward * falloff * falloff * POINTER_ACCEL,
    }
}

// ============================================================================
// INTEGRATOR
// ============================================================================

/// Boundary events and culls from one physics step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicsReport {
    pub tunneled: usize,
    pub reflected: usize,
    pub wrapped: usize,
    pub faults: Vec<NumericFault>,
}

/// Advances node kinematics.
#[derive(Debug, Clone)]
pub struct PhysicsIntegrator {
    boundary: Boundary,
    contact_margin: f64,
}

impl PhysicsIntegrator {
    pub fn new(boundary: Boundary, contact_margin: f64) -> Self {
        Self {
            boundary,
            contact_margin,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            Boundary {
                half_extent: config.world_half_extent,
                mode: config.boundary_mode,
                tunnel_probability: config.tunnel_probability,
            },
            config.contact_margin,
        )
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Runs one physics step. Non-finite nodes are removed and reported.
    #[allow(clippy::too_many_arguments)]
    pub fn step<R: Rng>(
        &self,
        nodes: &mut Vec<Node>,
        params: &PhysicsParams,
        pointer: &PointerInteraction,
        dt: f64,
        time: f64,
        tick: u64,
        rng: &mut R,
    ) -> PhysicsReport {
        let mut report = PhysicsReport::default();
        if nodes.is_empty() {
            return report;
        }

        let mut accel = self.collision_accelerations(nodes, params.elasticity);

        for (node, a) in nodes.iter().zip(accel.iter_mut()) {
            let d = node.position.norm();
            if d > GRAVITY_DEADZONE {
                *a -= node.position / d * params.gravity * GRAVITY_ACCEL;
            }
            *a += pointer_acceleration(&node.position, pointer, params.field_strength, time);
        }

        let sigma = JITTER_SCALE * params.field_strength;
        if sigma > 0.0 {
            if let Ok(jitter) = Normal::new(0.0, sigma) {
                for a in accel.iter_mut() {
                    a.x += jitter.sample(rng);
                    a.y += jitter.sample(rng);
                }
            }
        }

        let dt_eff = dt * params.time_dilation;
        for (node, a) in nodes.iter_mut().zip(&accel) {
            node.velocity = (node.velocity + a * dt_eff) * params.friction;
            node.position += node.velocity * dt_eff;

            for axis in 0..2 {
                let outcome =
                    self.boundary
                        .resolve(&mut node.position[axis], &mut node.velocity[axis], params.elasticity, rng);
                match outcome {
                    BoundaryOutcome::Inside => {}
                    BoundaryOutcome::Reflected => report.reflected += 1,
                    BoundaryOutcome::Wrapped => report.wrapped += 1,
                    BoundaryOutcome::Tunneled => report.tunneled += 1,
                }
            }
        }

        nodes.retain(|node| {
            if node.is_finite() {
                return true;
            }
            warn!("Culling node {} at tick {}: non-finite kinematics", node.id, tick);
            report.faults.push(NumericFault {
                node_id: node.id,
                tick,
                reason: format!(
                    "non-finite state: position=({}, {}) velocity=({}, {})",
                    node.position.x, node.position.y, node.velocity.x, node.velocity.y
                ),
            });
            false
        });

        report
    }

    /// Pairwise contact repulsion via the spatial grid.
    fn collision_accelerations(&self, nodes: &[Node], elasticity: f64) -> Vec<Vector2<f64>> {
        let mut accel = vec![Vector2::zeros(); nodes.len()];
        let max_radius = nodes.iter().map(|n| n.radius).fold(0.0, f64::max);
        let cell = (2.0 * max_radius + self.contact_margin).max(1.0);

        let positions: Vec<Vector2<f64>> = nodes.iter().map(|n| n.position).collect();
        let grid = SpatialGrid::build(&positions, cell);

        for (i, j) in grid.candidate_pairs() {
            let delta = positions[j] - positions[i];
            let d = delta.norm();
            let min_d = nodes[i].radius + nodes[j].radius + self.contact_margin;
            // A NaN distance must not leak into the finite partner
            if d.is_nan() || d >= min_d {
                continue;
            }
            // Coincident nodes have no separation axis; the higher id moves toward +x
            let direction = if d > 0.0 {
                delta / d
            } else if nodes[i].id < nodes[j].id {
                Vector2::x()
            } else {
                -Vector2::x()
            };
            let push = direction * (min_d - d) / min_d * COLLISION_ACCEL * elasticity;
            accel[i] -= push;
            accel[j] += push;
        }

        accel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn integrator(mode: BoundaryMode, p_tunnel: f64) -> PhysicsIntegrator {
        PhysicsIntegrator::new(
            Boundary {
                half_extent: 500.0,
                mode,
                tunnel_probability: p_tunnel,
            },
            0.0,
        )
    }

    fn still() -> PhysicsParams {
        PhysicsParams {
            gravity: 0.0,
            field_strength: 0.0,
            ..PhysicsParams::default()
        }
    }

    #[test]
    fn test_friction_decays_speed_monotonically() {
        let physics = integrator(BoundaryMode::Reflect, 0.05);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut nodes = vec![Node::new(0, Vector2::zeros(), 40.0, 0.0, 0, 3.0)];
        nodes[0].velocity = Vector2::new(30.0, -12.0);

        let mut last = nodes[0].velocity.norm();
        for tick in 0..500 {
            physics.step(&mut nodes, &still(), &PointerInteraction::default(), 0.016, 0.0, tick, &mut rng);
            let speed = nodes[0].velocity.norm();
            assert!(speed < last);
            last = speed;
        }
    }

    #[test]
    fn test_gravity_pulls_toward_origin() {
        let physics = integrator(BoundaryMode::Reflect, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut nodes = vec![Node::new(0, Vector2::new(200.0, 0.0), 40.0, 0.0, 0, 3.0)];
        let params = PhysicsParams {
            field_strength: 0.0,
            ..PhysicsParams::default()
        };

        physics.step(&mut nodes, &params, &PointerInteraction::default(), 0.016, 0.0, 0, &mut rng);
        assert!(nodes[0].velocity.x < 0.0);
        assert_relative_eq!(nodes[0].velocity.y, 0.0);
    }

    #[test]
    fn test_collision_separates_overlapping_nodes() {
        let physics = integrator(BoundaryMode::Reflect, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut nodes = vec![
            Node::new(0, Vector2::new(-1.0, 0.0), 40.0, 0.0, 0, 3.0),
            Node::new(1, Vector2::new(1.0, 0.0), 40.0, 0.0, 0, 3.0),
        ];

        physics.step(&mut nodes, &still(), &PointerInteraction::default(), 0.016, 0.0, 0, &mut rng);
        assert!(nodes[0].velocity.x < 0.0);
        assert!(nodes[1].velocity.x > 0.0);
        assert_relative_eq!(nodes[0].velocity.x, -nodes[1].velocity.x, epsilon = 1e-12);
    }

    #[test]
    fn test_coincident_nodes_separate_by_id() {
        let physics = integrator(BoundaryMode::Reflect, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let spot = Vector2::new(25.0, -10.0);
        let mut nodes = vec![
            Node::new(7, spot, 40.0, 0.0, 0, 3.0),
            Node::new(2, spot, 40.0, 0.0, 0, 3.0),
        ];

        physics.step(&mut nodes, &still(), &PointerInteraction::default(), 0.016, 0.0, 0, &mut rng);
        assert!(nodes[0].velocity.x > 0.0);
        assert!(nodes[1].velocity.x < 0.0);
        assert_relative_eq!(nodes[0].velocity.y, 0.0);
        assert!(nodes[0].position.x > nodes[1].position.x);

        for tick in 1..20 {
            physics.step(&mut nodes, &still(), &PointerInteraction::default(), 0.016, 0.0, tick, &mut rng);
        }
        assert!((nodes[0].position - nodes[1].position).norm() > 1.0);
    }

    #[test]
    fn test_pointer_kernels() {
        let mut pointer = PointerInteraction {
            position: Vector2::new(0.0, 0.0),
            mode: PointerMode::Push,
            active: true,
        };
        let at = Vector2::new(50.0, 0.0);

        assert!(pointer_acceleration(&at, &pointer, 1.0, 0.0).x > 0.0);

        pointer.mode = PointerMode::Pull;
        assert!(pointer_acceleration(&at, &pointer, 1.0, 0.0).x < 0.0);

        pointer.mode = PointerMode::Vortex;
        let swirl = pointer_acceleration(&at, &pointer, 1.0, 0.0);
        assert_relative_eq!(swirl.x, 0.0, epsilon = 1e-9);
        assert!(swirl.y.abs() > 0.0);

        pointer.mode = PointerMode::String;
        let near = pointer_acceleration(&Vector2::new(20.0, 0.0), &pointer, 1.0, 0.0).norm();
        let far = pointer_acceleration(&Vector2::new(150.0, 0.0), &pointer, 1.0, 0.0).norm();
        assert!(near > far);

        // Out of reach and inactive
        assert_eq!(pointer_acceleration(&Vector2::new(250.0, 0.0), &pointer, 1.0, 0.0), Vector2::zeros());
        pointer.active = false;
        assert_eq!(pointer_acceleration(&at, &pointer, 1.0, 0.0), Vector2::zeros());
    }

    #[test]
    fn test_reflect_points_velocity_inward() {
        let boundary = integrator(BoundaryMode::Reflect, 0.0).boundary;
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let (mut x, mut v) = (510.0, 20.0);
        assert_eq!(boundary.resolve(&mut x, &mut v, 0.8, &mut rng), BoundaryOutcome::Reflected);
        assert_eq!(x, 500.0);
        assert_relative_eq!(v, -20.0 * 0.64);
    }

    #[test]
    fn test_wrap_reenters_opposite_side() {
        let boundary = integrator(BoundaryMode::Wrap, 0.0).boundary;
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let (mut x, mut v) = (-505.0, -3.0);
        assert_eq!(boundary.resolve(&mut x, &mut v, 0.8, &mut rng), BoundaryOutcome::Wrapped);
        assert_relative_eq!(x, 495.0, epsilon = 1e-9);
        assert_eq!(v, -3.0);
    }

    #[test]
    fn test_tunnel_keeps_direction_at_half_speed() {
        let boundary = integrator(BoundaryMode::Reflect, 1.0).boundary;
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let (mut x, mut v) = (501.0, 8.0);
        assert_eq!(boundary.resolve(&mut x, &mut v, 0.8, &mut rng), BoundaryOutcome::Tunneled);
        assert_eq!(x, -500.0);
        assert_eq!(v, 4.0);
    }

    #[test]
    fn test_tunnel_rate_matches_probability() {
        let boundary = integrator(BoundaryMode::Reflect, 0.05).boundary;
        let mut rng = ChaCha8Rng::seed_from_u64(0x7u64);
        let trials = 10_000;
        let mut tunneled = 0;
        for _ in 0..trials {
            let (mut x, mut v) = (500.5, 1.0);
            if boundary.resolve(&mut x, &mut v, 0.8, &mut rng) == BoundaryOutcome::Tunneled {
                tunneled += 1;
            }
        }
        // 95% binomial interval: 0.05 ± 1.96·sqrt(0.05·0.95/10000)
        let rate = tunneled as f64 / trials as f64;
        assert!((0.0457..=0.0543).contains(&rate), "tunnel rate {rate}");
    }

    #[test]
    fn test_non_finite_node_is_culled() {
        let physics = integrator(BoundaryMode::Reflect, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut nodes = vec![
            Node::new(0, Vector2::new(0.0, 0.0), 40.0, 0.0, 0, 3.0),
            Node::new(1, Vector2::new(100.0, 0.0), 40.0, 0.0, 0, 3.0),
        ];
        nodes[1].velocity = Vector2::new(f64::INFINITY, 0.0);

        let report = physics.step(&mut nodes, &still(), &PointerInteraction::default(), 0.016, 0.0, 9, &mut rng);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, 0);
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].node_id, 1);
        assert_eq!(report.faults[0].tick, 9);
    }
}
