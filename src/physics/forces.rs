use eframe::egui::{Vec2, vec2};

/// Unit vector from `b` to `a`, or a deterministic spread direction when the
/// two points coincide.
fn separation_direction(delta: Vec2, distance: f32, i: usize, j: usize) -> Vec2 {
    if distance > 0.0001 {
        delta / distance
    } else {
        let angle = ((i as f32) * 0.618_034 + (j as f32) * 0.414_214) * std::f32::consts::TAU;
        vec2(angle.cos(), angle.sin())
    }
}

#[derive(Clone, Copy)]
pub(super) struct RepulsionParams {
    pub(super) strength: f32,
    pub(super) softening: f32,
    pub(super) collision_strength: f32,
    pub(super) collision_padding: f32,
}

/// Pairwise many-body repulsion `delta * strength / (d² + softening)` plus
/// an overlap push between node discs.
pub(super) fn accumulate_repulsion(
    positions: &[Vec2],
    radii: &[f32],
    params: RepulsionParams,
    scale: f32,
    forces: &mut [Vec2],
) {
    let node_count = positions.len();
    for i in 0..node_count {
        for j in (i + 1)..node_count {
            let delta = positions[i] - positions[j];
            let distance_sq = delta.length_sq();
            let distance = distance_sq.sqrt();
            let direction = separation_direction(delta, distance, i, j);

            let repulsion = params.strength * distance.max(1.0) / (distance_sq + params.softening);
            let mut push = repulsion * scale;

            let min_distance = radii[i] + radii[j] + params.collision_padding;
            if distance < min_distance {
                push += (min_distance - distance) * params.collision_strength;
            }

            forces[i] += direction * push;
            forces[j] -= direction * push;
        }
    }
}

#[derive(Clone, Copy)]
pub(super) struct SpringParams {
    pub(super) ideal_distance: f32,
    pub(super) strength: f32,
    pub(super) damping: f32,
}

/// Hooke springs along every link, damped by the endpoints' relative velocity.
pub(super) fn accumulate_springs(
    positions: &[Vec2],
    velocities: &[Vec2],
    links: &[(usize, usize)],
    params: SpringParams,
    scale: f32,
    forces: &mut [Vec2],
) {
    let node_count = positions.len();
    for &(from, to) in links {
        if from >= node_count || to >= node_count || from == to {
            continue;
        }

        let delta = positions[from] - positions[to];
        let distance = delta.length();
        if distance <= 0.0001 {
            continue;
        }
        let direction = delta / distance;

        let spring = (distance - params.ideal_distance) * params.strength * scale;
        let relative_velocity = velocities[from] - velocities[to];
        let damping_force = relative_velocity.dot(direction) * params.damping;
        let correction = direction * (spring + damping_force);

        forces[from] -= correction;
        forces[to] += correction;
    }
}

pub(super) fn accumulate_centering(
    positions: &[Vec2],
    center: Vec2,
    strength: f32,
    forces: &mut [Vec2],
) {
    for (force, position) in forces.iter_mut().zip(positions) {
        *force += (center - *position) * strength;
    }
}

/// Pulls each node's `y` toward its band; `x` is left alone.
pub(super) fn accumulate_band_pull(
    positions: &[Vec2],
    band_targets: &[f32],
    strength: f32,
    forces: &mut [Vec2],
) {
    for ((force, position), target) in forces.iter_mut().zip(positions).zip(band_targets) {
        force.y += (target - position.y) * strength;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPULSION: RepulsionParams = RepulsionParams {
        strength: 500.0,
        softening: 100.0,
        collision_strength: 0.6,
        collision_padding: 4.0,
    };

    #[test]
    fn repulsion_is_symmetric_and_decays() {
        let mut near = vec![Vec2::ZERO; 2];
        accumulate_repulsion(
            &[vec2(0.0, 0.0), vec2(50.0, 0.0)],
            &[0.0, 0.0],
            REPULSION,
            1.0,
            &mut near,
        );
        assert!(near[0].x < 0.0 && near[1].x > 0.0);
        assert!((near[0] + near[1]).length() < 1e-4);

        let mut far = vec![Vec2::ZERO; 2];
        accumulate_repulsion(
            &[vec2(0.0, 0.0), vec2(200.0, 0.0)],
            &[0.0, 0.0],
            REPULSION,
            1.0,
            &mut far,
        );
        assert!(far[1].x < near[1].x);
    }

    #[test]
    fn coincident_nodes_still_separate() {
        let mut forces = vec![Vec2::ZERO; 2];
        accumulate_repulsion(
            &[vec2(10.0, 10.0), vec2(10.0, 10.0)],
            &[10.0, 10.0],
            REPULSION,
            1.0,
            &mut forces,
        );
        assert!(forces[0].length() > 0.0);
        assert!(forces[0].x.is_finite() && forces[0].y.is_finite());
    }

    #[test]
    fn stretched_spring_pulls_endpoints_together() {
        let mut forces = vec![Vec2::ZERO; 2];
        accumulate_springs(
            &[vec2(0.0, 0.0), vec2(300.0, 0.0)],
            &[Vec2::ZERO, Vec2::ZERO],
            &[(0, 1)],
            SpringParams {
                ideal_distance: 100.0,
                strength: 0.1,
                damping: 0.0,
            },
            1.0,
            &mut forces,
        );
        assert!((forces[0].x - 20.0).abs() < 1e-3);
        assert!((forces[1].x + 20.0).abs() < 1e-3);
    }

    #[test]
    fn band_pull_only_moves_vertically() {
        let mut forces = vec![Vec2::ZERO];
        accumulate_band_pull(&[vec2(40.0, 100.0)], &[400.0], 0.5, &mut forces);
        assert_eq!(forces[0], vec2(0.0, 150.0));
    }
}
