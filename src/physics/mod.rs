//! Tier-banded force layout.
//!
//! The engine owns every node's kinematic state. [`LayoutEngine::reset`]
//! swaps in a new node/link set between ticks and seeds retained ids from a
//! [`PositionMemory`], so nodes that survive a snapshot keep their place.

mod forces;

use std::collections::HashMap;

use eframe::egui::{Vec2, vec2};

use crate::config::{CanvasConfig, PhysicsConfig};
use crate::topology::{Tier, TopologyLink, TopologyNode};
use crate::util::stable_pair;

use forces::{
    RepulsionParams, SpringParams, accumulate_band_pull, accumulate_centering,
    accumulate_repulsion, accumulate_springs,
};

const SPRING_DAMPING: f32 = 0.22;
const COLLISION_PADDING: f32 = 4.0;
const MAX_FORCE: f32 = 60.0;
const MAX_SPEED: f32 = 40.0;
/// Clearance kept between neighbouring tier windows.
const BAND_GAP: f32 = 4.0;

/// Last known position of every node id, carried from one reset to the next.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PositionMemory {
    positions: HashMap<String, Vec2>,
}

impl PositionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, position: Vec2) {
        self.positions.insert(id.into(), position);
    }

    pub fn get(&self, id: &str) -> Option<Vec2> {
        self.positions.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct LayoutNode {
    pub id: String,
    pub tier: Tier,
    pub position: Vec2,
    pub velocity: Vec2,
    pub pinned: Option<Vec2>,
    pub radius: f32,
}

pub fn node_radius(tier: Tier) -> f32 {
    match tier {
        Tier::Server => 20.0,
        Tier::Core | Tier::Aggregation => 10.0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
    pub tick: u32,
    pub alpha: f32,
    /// Sum of `½|v|²` over every free node.
    pub kinetic_energy: f32,
    pub settled: bool,
}

struct PhysicsScratch {
    forces: Vec<Vec2>,
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    radii: Vec<f32>,
    band_targets: Vec<f32>,
}

pub struct LayoutEngine {
    canvas: CanvasConfig,
    config: PhysicsConfig,
    nodes: Vec<LayoutNode>,
    links: Vec<(usize, usize)>,
    index_by_id: HashMap<String, usize>,
    alpha: f32,
    ticks: u32,
    settled: bool,
    scratch: PhysicsScratch,
}

impl LayoutEngine {
    pub fn new(canvas: CanvasConfig, config: PhysicsConfig) -> Self {
        Self {
            canvas,
            config,
            nodes: Vec::new(),
            links: Vec::new(),
            index_by_id: HashMap::new(),
            alpha: 1.0,
            ticks: 0,
            settled: true,
            scratch: PhysicsScratch {
                forces: Vec::new(),
                positions: Vec::new(),
                velocities: Vec::new(),
                radii: Vec::new(),
                band_targets: Vec::new(),
            },
        }
    }

    /// Replaces the node and link sets. Ids found in `previous` start where
    /// they were; new ids start at a stable spot inside their tier band.
    /// Links with an unknown endpoint are skipped; their count is returned.
    pub fn reset(
        &mut self,
        nodes: &[TopologyNode],
        links: &[TopologyLink],
        previous: &PositionMemory,
    ) -> usize {
        let mut prior_pins = self
            .nodes
            .drain(..)
            .filter_map(|node| node.pinned.map(|pin| (node.id, pin)))
            .collect::<HashMap<_, _>>();

        self.index_by_id.clear();
        for topology_node in nodes {
            if self.index_by_id.contains_key(&topology_node.id) {
                continue;
            }

            let seeded = previous
                .get(&topology_node.id)
                .unwrap_or_else(|| self.default_position(&topology_node.id, topology_node.tier));
            let pinned = prior_pins
                .remove(&topology_node.id)
                .map(|pin| self.clamp_to_band(topology_node.tier, pin));
            let position = self.clamp_to_band(topology_node.tier, pinned.unwrap_or(seeded));

            self.index_by_id
                .insert(topology_node.id.clone(), self.nodes.len());
            self.nodes.push(LayoutNode {
                id: topology_node.id.clone(),
                tier: topology_node.tier,
                position,
                velocity: Vec2::ZERO,
                pinned,
                radius: node_radius(topology_node.tier),
            });
        }

        self.links.clear();
        let mut skipped = 0usize;
        for link in links {
            match (
                self.index_by_id.get(&link.source),
                self.index_by_id.get(&link.target),
            ) {
                (Some(&from), Some(&to)) if from != to => self.links.push((from, to)),
                _ => skipped += 1,
            }
        }

        self.alpha = 1.0;
        self.ticks = 0;
        self.settled = self.nodes.is_empty();
        skipped
    }

    fn default_position(&self, id: &str, tier: Tier) -> Vec2 {
        let (jx, jy) = stable_pair(id);
        let usable_half_width = (self.canvas.width * 0.5 - self.canvas.margin).max(0.0);
        vec2(
            self.canvas.width * 0.5 + jx * usable_half_width * 0.8,
            self.band_y(tier) + jy * 12.0,
        )
    }

    fn band_y(&self, tier: Tier) -> f32 {
        self.canvas.height * self.config.bands.fraction(tier)
    }

    /// Vertical window a tier is held in: from halfway to the band above to
    /// halfway to the band below, inset by [`BAND_GAP`] and kept inside the
    /// margins. Neighbouring windows never overlap, so tiers cannot swap.
    fn band_window(&self, tier: Tier) -> (f32, f32) {
        let bands = self.config.bands;
        let height = self.canvas.height;
        let margin = self.canvas.margin;
        let boundary = |upper: f32, lower: f32| (upper + lower) * 0.5 * height;
        let (top, bottom) = match tier {
            Tier::Core => (margin, boundary(bands.core, bands.aggregation) - BAND_GAP),
            Tier::Aggregation => (
                boundary(bands.core, bands.aggregation) + BAND_GAP,
                boundary(bands.aggregation, bands.server) - BAND_GAP,
            ),
            Tier::Server => (boundary(bands.aggregation, bands.server) + BAND_GAP, height - margin),
        };
        let floor = (height - margin).max(margin);
        let top = top.clamp(margin, floor);
        (top, bottom.clamp(top, floor))
    }

    fn clamp_to_band(&self, tier: Tier, position: Vec2) -> Vec2 {
        let margin = self.canvas.margin;
        let (top, bottom) = self.band_window(tier);
        vec2(
            position.x.clamp(margin, (self.canvas.width - margin).max(margin)),
            position.y.clamp(top, bottom),
        )
    }

    /// Advances the simulation by one step of `dt` seconds.
    pub fn tick(&mut self, dt: f32) -> TickReport {
        let node_count = self.nodes.len();
        if node_count == 0 {
            self.settled = true;
            return self.report(0.0);
        }

        let config = self.config;
        let dt = if dt.is_finite() { dt } else { 0.0 };
        let time_step_scale = (dt * 60.0).clamp(0.25, 3.0);
        let alpha = self.alpha;

        let scratch = &mut self.scratch;
        scratch.forces.clear();
        scratch.forces.resize(node_count, Vec2::ZERO);
        scratch.positions.clear();
        scratch.velocities.clear();
        scratch.radii.clear();
        scratch.band_targets.clear();
        for node in &self.nodes {
            scratch.positions.push(node.position);
            scratch.velocities.push(node.velocity);
            scratch.radii.push(node.radius);
            scratch
                .band_targets
                .push(self.canvas.height * config.bands.fraction(node.tier));
        }

        accumulate_repulsion(
            &scratch.positions,
            &scratch.radii,
            RepulsionParams {
                strength: config.repulsion_strength,
                softening: config.repulsion_softening,
                collision_strength: config.collision_strength,
                collision_padding: COLLISION_PADDING,
            },
            alpha,
            &mut scratch.forces,
        );
        accumulate_springs(
            &scratch.positions,
            &scratch.velocities,
            &self.links,
            SpringParams {
                ideal_distance: config.link_distance,
                strength: config.link_strength,
                damping: SPRING_DAMPING,
            },
            alpha,
            &mut scratch.forces,
        );
        let (center_x, center_y) = self.canvas.center();
        accumulate_centering(
            &scratch.positions,
            vec2(center_x, center_y),
            config.center_strength * alpha,
            &mut scratch.forces,
        );
        accumulate_band_pull(
            &scratch.positions,
            &scratch.band_targets,
            config.band_strength,
            &mut scratch.forces,
        );

        let damping_factor = config.velocity_damping.powf(time_step_scale);
        let min_sleep_speed_sq = 0.02 * 0.02;
        let min_sleep_force_sq = 0.08 * 0.08;
        let mut kinetic_energy = 0.0;
        for index in 0..node_count {
            if let Some(pin) = self.nodes[index].pinned {
                let node = &mut self.nodes[index];
                node.position = pin;
                node.velocity = Vec2::ZERO;
                continue;
            }

            let mut force = self.scratch.forces[index];
            let force_sq = force.length_sq();
            if force_sq > MAX_FORCE * MAX_FORCE {
                force *= MAX_FORCE / force_sq.sqrt();
            }

            let mut velocity = (self.nodes[index].velocity + force * time_step_scale) * damping_factor;
            let speed_sq = velocity.length_sq();
            if speed_sq > MAX_SPEED * MAX_SPEED {
                velocity *= MAX_SPEED / speed_sq.sqrt();
            }
            if velocity.length_sq() < min_sleep_speed_sq && force_sq < min_sleep_force_sq {
                velocity = Vec2::ZERO;
            }

            let unclamped = self.nodes[index].position + velocity * time_step_scale;
            let position = self.clamp_to_band(self.nodes[index].tier, unclamped);
            if position.x != unclamped.x {
                velocity.x = 0.0;
            }
            if position.y != unclamped.y {
                velocity.y = 0.0;
            }

            let node = &mut self.nodes[index];
            node.position = position;
            node.velocity = velocity;
            kinetic_energy += 0.5 * velocity.length_sq();
        }

        self.ticks = self.ticks.saturating_add(1);
        self.alpha = (self.alpha * (1.0 - config.alpha_decay)).max(0.0);

        let free_nodes = self.nodes.iter().filter(|node| node.pinned.is_none()).count();
        let mean_energy = kinetic_energy / free_nodes.max(1) as f32;
        self.settled = mean_energy < config.settle_energy
            || self.alpha < config.alpha_min
            || self.ticks >= config.max_ticks;

        self.report(kinetic_energy)
    }

    fn report(&self, kinetic_energy: f32) -> TickReport {
        TickReport {
            tick: self.ticks,
            alpha: self.alpha,
            kinetic_energy,
            settled: self.settled,
        }
    }

    /// Fixes a node at `position` until [`Self::unpin`]. The node keeps
    /// pushing and pulling its neighbours.
    pub fn pin(&mut self, id: &str, position: Vec2) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        let position = self.clamp_to_band(self.nodes[index].tier, position);
        let node = &mut self.nodes[index];
        node.pinned = Some(position);
        node.position = position;
        node.velocity = Vec2::ZERO;
        true
    }

    pub fn unpin(&mut self, id: &str) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        self.nodes[index].pinned.take().is_some()
    }

    /// Restarts cooling from `alpha` without touching positions.
    pub fn reheat(&mut self, alpha: f32) {
        self.alpha = self.alpha.max(alpha.clamp(0.0, 1.0));
        self.ticks = 0;
        self.settled = self.nodes.is_empty();
    }

    pub fn set_physics(&mut self, config: PhysicsConfig) {
        self.config = config;
    }

    pub fn physics(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn canvas(&self) -> &CanvasConfig {
        &self.canvas
    }

    pub fn nodes(&self) -> &[LayoutNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&LayoutNode> {
        self.index_by_id.get(id).map(|&index| &self.nodes[index])
    }

    pub fn position_of(&self, id: &str) -> Option<Vec2> {
        self.node(id).map(|node| node.position)
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Current positions, ready to seed the next [`Self::reset`].
    pub fn positions(&self) -> PositionMemory {
        PositionMemory {
            positions: self
                .nodes
                .iter()
                .map(|node| (node.id.clone(), node.position))
                .collect(),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn tick_count(&self) -> u32 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, tier: Tier) -> TopologyNode {
        TopologyNode {
            id: id.to_owned(),
            tier,
        }
    }

    fn link(source: &str, target: &str) -> TopologyLink {
        TopologyLink {
            source: source.to_owned(),
            target: target.to_owned(),
            load: 10.0,
        }
    }

    fn fat_tree(pods: usize, servers_per_pod: usize) -> (Vec<TopologyNode>, Vec<TopologyLink>) {
        let mut nodes = vec![node("Core_Switch", Tier::Core)];
        let mut links = Vec::new();
        for pod in 0..pods {
            let agg = format!("Agg_Switch_{pod}");
            nodes.push(node(&agg, Tier::Aggregation));
            links.push(link("Core_Switch", &agg));
            for server in 0..servers_per_pod {
                let id = format!("Server_{pod}_{server}");
                nodes.push(node(&id, Tier::Server));
                links.push(link(&agg, &id));
            }
        }
        (nodes, links)
    }

    fn engine() -> LayoutEngine {
        LayoutEngine::new(CanvasConfig::default(), PhysicsConfig::default())
    }

    fn mean_y(engine: &LayoutEngine, tier: Tier) -> f32 {
        let ys = engine
            .nodes()
            .iter()
            .filter(|node| node.tier == tier)
            .map(|node| node.position.y)
            .collect::<Vec<_>>();
        ys.iter().sum::<f32>() / ys.len() as f32
    }

    #[test]
    fn every_tick_keeps_nodes_inside_the_margins() {
        let (nodes, links) = fat_tree(4, 4);
        let mut engine = engine();
        let mut previous = PositionMemory::new();
        previous.insert("Server_0_0", vec2(-500.0, 4000.0));
        previous.insert("Core_Switch", vec2(799.0, 1.0));
        engine.reset(&nodes, &links, &previous);

        let canvas = *engine.canvas();
        for _ in 0..200 {
            engine.tick(1.0 / 60.0);
            for node in engine.nodes() {
                assert!(node.position.x >= canvas.margin && node.position.x <= canvas.width - canvas.margin);
                assert!(node.position.y >= canvas.margin && node.position.y <= canvas.height - canvas.margin);
            }
        }
    }

    #[test]
    fn tiers_settle_in_ordered_bands() {
        let (nodes, links) = fat_tree(4, 4);
        let mut engine = engine();
        engine.reset(&nodes, &links, &PositionMemory::new());
        for _ in 0..300 {
            engine.tick(1.0 / 60.0);
        }

        let core = mean_y(&engine, Tier::Core);
        let aggregation = mean_y(&engine, Tier::Aggregation);
        let server = mean_y(&engine, Tier::Server);
        assert!(core < aggregation && aggregation < server, "{core} {aggregation} {server}");

        let lowest_aggregation = engine
            .nodes()
            .iter()
            .filter(|node| node.tier == Tier::Aggregation)
            .map(|node| node.position.y)
            .fold(f32::MIN, f32::max);
        let highest_server = engine
            .nodes()
            .iter()
            .filter(|node| node.tier == Tier::Server)
            .map(|node| node.position.y)
            .fold(f32::MAX, f32::min);
        assert!(lowest_aggregation < highest_server);
    }

    fn tier_extent(engine: &LayoutEngine, tier: Tier) -> (f32, f32) {
        engine
            .nodes()
            .iter()
            .filter(|node| node.tier == tier)
            .map(|node| node.position.y)
            .fold((f32::MAX, f32::MIN), |(low, high), y| (low.min(y), high.max(y)))
    }

    #[test]
    fn crowded_tiers_never_overlap() {
        for (pods, servers_per_pod) in [(8, 10), (10, 10)] {
            let (nodes, links) = fat_tree(pods, servers_per_pod);
            let mut engine = engine();
            engine.reset(&nodes, &links, &PositionMemory::new());
            for _ in 0..600 {
                engine.tick(1.0 / 60.0);
                let (_, core_bottom) = tier_extent(&engine, Tier::Core);
                let (aggregation_top, aggregation_bottom) = tier_extent(&engine, Tier::Aggregation);
                let (server_top, _) = tier_extent(&engine, Tier::Server);
                assert!(
                    core_bottom < aggregation_top,
                    "{pods}x{servers_per_pod}: core {core_bottom} vs aggregation {aggregation_top}"
                );
                assert!(
                    aggregation_bottom < server_top,
                    "{pods}x{servers_per_pod}: aggregation {aggregation_bottom} vs server {server_top}"
                );
            }
        }
    }

    #[test]
    fn pinning_keeps_a_node_inside_its_tier() {
        let mut engine = engine();
        let (nodes, links) = fat_tree(1, 1);
        engine.reset(&nodes, &links, &PositionMemory::new());
        assert!(engine.pin("Server_0_0", vec2(300.0, 30.0)));

        let (_, aggregation_bottom) = tier_extent(&engine, Tier::Aggregation);
        let pinned = engine.node("Server_0_0").unwrap().pinned.unwrap();
        assert!(pinned.y > aggregation_bottom);
        assert_eq!(pinned.x, 300.0);
    }

    #[test]
    fn non_finite_time_steps_keep_positions_finite() {
        let (nodes, links) = fat_tree(2, 2);
        let mut engine = engine();
        engine.reset(&nodes, &links, &PositionMemory::new());
        engine.tick(f32::NAN);
        engine.tick(f32::INFINITY);
        for node in engine.nodes() {
            assert!(node.position.x.is_finite() && node.position.y.is_finite(), "{}", node.id);
        }
        assert_eq!(engine.tick_count(), 2);
    }

    #[test]
    fn simulation_cools_and_settles() {
        let (nodes, links) = fat_tree(2, 3);
        let mut engine = engine();
        engine.reset(&nodes, &links, &PositionMemory::new());
        assert!(!engine.is_settled());

        let mut last = None;
        for _ in 0..PhysicsConfig::default().max_ticks {
            let report = engine.tick(1.0 / 60.0);
            last = Some(report);
            if report.settled {
                break;
            }
        }
        let report = last.unwrap();
        assert!(report.settled);
        assert!(report.alpha < 1.0);
        assert_eq!(engine.alpha(), report.alpha);
    }

    #[test]
    fn retained_nodes_are_seeded_from_memory() {
        let mut engine = engine();
        let (nodes, links) = fat_tree(1, 2);
        engine.reset(&nodes, &links, &PositionMemory::new());
        for _ in 0..30 {
            engine.tick(1.0 / 60.0);
        }
        let memory = engine.positions();
        let before = memory.get("Server_0_1").unwrap();

        let relinked = vec![link("Core_Switch", "Server_0_1"), link("Core_Switch", "Agg_Switch_0")];
        engine.reset(&nodes, &relinked, &memory);
        assert_eq!(engine.position_of("Server_0_1"), Some(before));
        assert_eq!(engine.link_count(), 2);
    }

    #[test]
    fn new_nodes_start_in_their_band() {
        let mut engine = engine();
        let (nodes, links) = fat_tree(1, 1);
        engine.reset(&nodes, &links, &PositionMemory::new());
        let canvas = *engine.canvas();
        let bands = engine.physics().bands;
        for node in engine.nodes() {
            let band = canvas.height * bands.fraction(node.tier);
            assert!((node.position.y - band).abs() <= 12.0 + 1e-3);
        }
    }

    #[test]
    fn unknown_link_endpoints_are_skipped() {
        let mut engine = engine();
        let nodes = vec![node("a", Tier::Core), node("b", Tier::Server)];
        let skipped = engine.reset(
            &nodes,
            &[link("a", "b"), link("a", "ghost"), link("b", "b")],
            &PositionMemory::new(),
        );
        assert_eq!(skipped, 2);
        assert_eq!(engine.link_count(), 1);
    }

    #[test]
    fn pinned_nodes_hold_still_but_push_neighbours() {
        let mut engine = engine();
        let nodes = vec![node("a", Tier::Server), node("b", Tier::Server)];
        let mut memory = PositionMemory::new();
        memory.insert("a", vec2(400.0, 400.0));
        memory.insert("b", vec2(410.0, 400.0));
        engine.reset(&nodes, &[], &memory);
        assert!(engine.pin("a", vec2(400.0, 400.0)));

        for _ in 0..20 {
            engine.tick(1.0 / 60.0);
        }
        assert_eq!(engine.position_of("a"), Some(vec2(400.0, 400.0)));
        assert!(engine.position_of("b").unwrap().x > 410.0);

        assert!(engine.unpin("a"));
        assert!(!engine.unpin("a"));
        assert!(!engine.pin("missing", Vec2::ZERO));
    }

    #[test]
    fn pins_survive_a_reset() {
        let mut engine = engine();
        let nodes = vec![node("a", Tier::Core)];
        engine.reset(&nodes, &[], &PositionMemory::new());
        engine.pin("a", vec2(100.0, 60.0));
        let memory = engine.positions();
        engine.reset(&nodes, &[], &memory);
        assert_eq!(engine.node("a").unwrap().pinned, Some(vec2(100.0, 60.0)));
    }

    #[test]
    fn empty_engine_is_settled() {
        let mut engine = engine();
        assert!(engine.tick(1.0 / 60.0).settled);
    }
}
