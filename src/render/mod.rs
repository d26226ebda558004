//! Backend-neutral frame construction.
//!
//! [`build_frame`] is a pure function of [`FrameInputs`]; backends implement
//! [`RenderBackend`] to put the resulting [`Frame`] on a surface.

mod svg;

use std::collections::HashSet;
use std::time::Duration;

use eframe::egui::{Color32, Pos2, vec2};

use crate::animation::ActiveMigration;
use crate::classify::{ChainCategory, ColorClassifier, LoadLevel, classify_load};
use crate::config::{CanvasConfig, RenderConfig};
use crate::physics::LayoutEngine;
use crate::topology::{Diagnostic, Snapshot, Tier};
use crate::util::{numeric_suffix, short_label, stable_pair};

pub use svg::SvgBackend;

pub const CONTAINER_RADIUS: f32 = 5.0;
pub const PARTICLE_RADIUS: f32 = 6.0;
const LINK_ALPHA: u8 = 153;

/// Something that can draw a frame: an SVG document, an egui painter, ...
pub trait RenderBackend {
    fn draw_frame(&mut self, frame: &Frame);
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeShape {
    pub id: String,
    pub label: String,
    pub tier: Tier,
    pub center: Pos2,
    pub radius: f32,
    pub fill: Color32,
    pub stroke: Color32,
    /// Servers hosting at least one container.
    pub active: bool,
    pub pinned: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LinkShape {
    pub source: String,
    pub target: String,
    pub start: Pos2,
    pub end: Pos2,
    pub load: f64,
    pub level: LoadLevel,
    pub color: Color32,
    pub width: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContainerMarker {
    pub container_id: String,
    pub host_id: String,
    pub center: Pos2,
    pub radius: f32,
    pub category: ChainCategory,
    pub fill: Color32,
    pub visible: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParticleShape {
    pub container_id: String,
    pub start: Pos2,
    pub end: Pos2,
    pub center: Pos2,
    pub progress: f32,
    pub radius: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegendKind {
    Tier,
    Load,
    Chain,
    Migration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LegendEntry {
    pub kind: LegendKind,
    pub label: String,
    pub color: Color32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<NodeShape>,
    pub links: Vec<LinkShape>,
    pub containers: Vec<ContainerMarker>,
    pub particles: Vec<ParticleShape>,
    pub legend: Vec<LegendEntry>,
    /// Items that could not be placed on this frame.
    pub skipped: Vec<Diagnostic>,
}

pub struct FrameInputs<'a> {
    pub canvas: &'a CanvasConfig,
    pub engine: &'a LayoutEngine,
    pub snapshot: Option<&'a Snapshot>,
    pub migrations: &'a [ActiveMigration],
    pub particle_duration: Duration,
    pub classifier: &'a ColorClassifier,
    pub render: &'a RenderConfig,
}

pub fn node_fill(tier: Tier, active: bool) -> Color32 {
    match (tier, active) {
        (Tier::Server, true) => Color32::from_rgb(0xbf, 0xdb, 0xfe),
        (Tier::Server, false) => Color32::from_rgb(0xe2, 0xe8, 0xf0),
        (Tier::Aggregation, _) => Color32::from_rgb(0xcb, 0xd5, 0xe1),
        (Tier::Core, _) => Color32::from_rgb(0x94, 0xa3, 0xb8),
    }
}

pub const NODE_STROKE: Color32 = Color32::from_rgb(0x64, 0x74, 0x8b);
pub const PARTICLE_FILL: Color32 = Color32::from_rgb(0xff, 0xff, 0x00);
pub const PARTICLE_STROKE: Color32 = Color32::BLACK;
pub const CONTAINER_STROKE: Color32 = Color32::WHITE;

pub fn legend(classifier: &ColorClassifier) -> Vec<LegendEntry> {
    let mut entries = Vec::new();
    for tier in Tier::ALL {
        entries.push(LegendEntry {
            kind: LegendKind::Tier,
            label: format!("{tier} node"),
            color: node_fill(tier, false),
        });
    }
    entries.push(LegendEntry {
        kind: LegendKind::Tier,
        label: "server hosting containers".to_owned(),
        color: node_fill(Tier::Server, true),
    });
    for level in LoadLevel::ALL {
        entries.push(LegendEntry {
            kind: LegendKind::Load,
            label: level.label().to_owned(),
            color: level.color(),
        });
    }
    for swatch in classifier.swatches() {
        entries.push(LegendEntry {
            kind: LegendKind::Chain,
            label: swatch.name.clone(),
            color: swatch.color,
        });
    }
    entries.push(LegendEntry {
        kind: LegendKind::Chain,
        label: "Other".to_owned(),
        color: classifier.other_color(),
    });
    entries.push(LegendEntry {
        kind: LegendKind::Migration,
        label: "Migrating container".to_owned(),
        color: PARTICLE_FILL,
    });
    entries
}

/// Builds one frame. Links and containers whose endpoints or host have no
/// layout position are left out and listed in [`Frame::skipped`].
pub fn build_frame(inputs: &FrameInputs<'_>) -> Frame {
    let mut frame = Frame {
        width: inputs.canvas.width,
        height: inputs.canvas.height,
        legend: legend(inputs.classifier),
        ..Frame::default()
    };
    let engine = inputs.engine;

    let hosts: HashSet<&str> = inputs
        .snapshot
        .map(|snapshot| snapshot.containers.values().map(String::as_str).collect())
        .unwrap_or_default();

    frame.nodes = engine
        .nodes()
        .iter()
        .map(|node| {
            let active = node.tier == Tier::Server && hosts.contains(node.id.as_str());
            NodeShape {
                id: node.id.clone(),
                label: match node.tier {
                    Tier::Server => short_label(&node.id),
                    Tier::Core | Tier::Aggregation => String::new(),
                },
                tier: node.tier,
                center: node.position.to_pos2(),
                radius: node.radius,
                fill: node_fill(node.tier, active),
                stroke: NODE_STROKE,
                active,
                pinned: node.pinned.is_some(),
            }
        })
        .collect();

    if let Some(snapshot) = inputs.snapshot {
        for link in &snapshot.links {
            let start = engine.position_of(&link.source);
            let end = engine.position_of(&link.target);
            let (Some(start), Some(end)) = (start, end) else {
                let missing = if start.is_none() {
                    &link.source
                } else {
                    &link.target
                };
                frame.skipped.push(Diagnostic::DanglingLink {
                    from: link.source.clone(),
                    to: link.target.clone(),
                    missing: missing.clone(),
                });
                continue;
            };

            let level = classify_load(link.load);
            let base = level.color();
            frame.links.push(LinkShape {
                source: link.source.clone(),
                target: link.target.clone(),
                start: start.to_pos2(),
                end: end.to_pos2(),
                load: link.load,
                level,
                color: Color32::from_rgba_unmultiplied(base.r(), base.g(), base.b(), LINK_ALPHA),
                width: level.stroke_width(),
            });
        }

        let jitter = inputs.render.container_jitter.max(0.0);
        for (container_id, host_id) in &snapshot.containers {
            let Some(host) = engine.position_of(host_id) else {
                frame.skipped.push(Diagnostic::DanglingContainer {
                    container: container_id.clone(),
                    host: host_id.clone(),
                });
                continue;
            };

            let category = inputs
                .classifier
                .chain_category(container_id, &snapshot.chains);
            let visible = match category {
                ChainCategory::Known(_) => true,
                ChainCategory::Other => numeric_suffix(container_id)
                    .is_some_and(|id| inputs.render.other_visible_ids.contains(id)),
            };
            let (jx, jy) = stable_pair(container_id);

            frame.containers.push(ContainerMarker {
                container_id: container_id.clone(),
                host_id: host_id.clone(),
                center: (host + vec2(jx, jy) * jitter).to_pos2(),
                radius: CONTAINER_RADIUS,
                category,
                fill: inputs.classifier.chain_color(category),
                visible,
            });
        }
    }

    frame.particles = inputs
        .migrations
        .iter()
        .filter(|migration| migration.elapsed < inputs.particle_duration)
        .map(|migration| ParticleShape {
            container_id: migration.event.container_id.clone(),
            start: migration.from.to_pos2(),
            end: migration.to.to_pos2(),
            center: migration.position(inputs.particle_duration).to_pos2(),
            progress: migration.progress(inputs.particle_duration),
            radius: PARTICLE_RADIUS,
        })
        .collect();

    frame
}

impl Frame {
    pub fn node(&self, id: &str) -> Option<&NodeShape> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn visible_containers(&self) -> impl Iterator<Item = &ContainerMarker> {
        self.containers.iter().filter(|marker| marker.visible)
    }

    /// Canvas-space point nearest to `point` among node discs, if any covers it.
    pub fn node_at(&self, point: Pos2) -> Option<&NodeShape> {
        self.nodes
            .iter()
            .filter(|node| node.center.distance(point) <= node.radius)
            .min_by(|a, b| a.center.distance(point).total_cmp(&b.center.distance(point)))
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::pos2;

    use super::*;
    use crate::diff::MigrationEvent;
    use crate::physics::PositionMemory;
    use crate::topology::{TopologyLink, TopologyNode};

    struct Fixture {
        canvas: CanvasConfig,
        render: RenderConfig,
        classifier: ColorClassifier,
        engine: LayoutEngine,
        snapshot: Snapshot,
    }

    fn fixture() -> Fixture {
        let canvas = CanvasConfig::default();
        let render = RenderConfig::default();
        let mut engine = LayoutEngine::new(canvas, Default::default());
        let mut snapshot = Snapshot::default();
        for (id, tier) in [
            ("Agg_Switch_0", Tier::Aggregation),
            ("Server_0_0", Tier::Server),
            ("Server_0_1", Tier::Server),
        ] {
            snapshot.nodes.push(TopologyNode {
                id: id.to_owned(),
                tier,
            });
        }
        for (target, load) in [("Server_0_0", 50.0), ("Server_0_1", 1500.0)] {
            snapshot.links.push(TopologyLink {
                source: "Agg_Switch_0".to_owned(),
                target: target.to_owned(),
                load,
            });
        }
        snapshot
            .containers
            .insert("Container_0".to_owned(), "Server_0_0".to_owned());
        snapshot
            .containers
            .insert("Container_3".to_owned(), "Server_0_0".to_owned());
        snapshot
            .containers
            .insert("Container_12".to_owned(), "Server_0_0".to_owned());
        snapshot
            .containers
            .insert("Container_4".to_owned(), "Server_0_0".to_owned());

        let mut memory = PositionMemory::new();
        memory.insert("Agg_Switch_0", vec2(400.0, 225.0));
        memory.insert("Server_0_0", vec2(300.0, 400.0));
        memory.insert("Server_0_1", vec2(500.0, 400.0));
        engine.reset(&snapshot.nodes, &snapshot.links, &memory);

        Fixture {
            canvas,
            classifier: ColorClassifier::from_config(&render).unwrap(),
            render,
            engine,
            snapshot,
        }
    }

    fn frame_for(fixture: &Fixture, snapshot: &Snapshot, migrations: &[ActiveMigration]) -> Frame {
        build_frame(&FrameInputs {
            canvas: &fixture.canvas,
            engine: &fixture.engine,
            snapshot: Some(snapshot),
            migrations,
            particle_duration: Duration::from_millis(fixture.render.particle_duration_ms),
            classifier: &fixture.classifier,
            render: &fixture.render,
        })
    }

    #[test]
    fn nodes_and_links_follow_the_layout() {
        let fixture = fixture();
        let frame = frame_for(&fixture, &fixture.snapshot, &[]);

        assert_eq!(frame.nodes.len(), 3);
        assert_eq!(frame.links.len(), 2);
        assert!(frame.skipped.is_empty());

        let server = frame.node("Server_0_0").unwrap();
        assert!(server.active);
        assert_eq!(server.radius, 20.0);
        assert_eq!(server.label, "S0_0");
        assert!(!frame.node("Server_0_1").unwrap().active);
        assert!(!frame.node("Agg_Switch_0").unwrap().active);

        let heavy = frame.links.iter().find(|link| link.target == "Server_0_1").unwrap();
        assert_eq!(heavy.level, LoadLevel::High);
        assert_eq!(heavy.width, 3.0);
        assert_eq!(heavy.start, pos2(400.0, 225.0));
        assert_eq!(heavy.end, pos2(500.0, 400.0));
    }

    #[test]
    fn containers_sit_near_their_host() {
        let fixture = fixture();
        let frame = frame_for(&fixture, &fixture.snapshot, &[]);
        assert_eq!(frame.containers.len(), 4);

        let host = pos2(300.0, 400.0);
        for marker in &frame.containers {
            let offset = marker.center - host;
            assert!(offset.x.abs() <= fixture.render.container_jitter + 1e-3);
            assert!(offset.y.abs() <= fixture.render.container_jitter + 1e-3);
        }

        let again = frame_for(&fixture, &fixture.snapshot, &[]);
        assert_eq!(frame, again);
    }

    #[test]
    fn other_containers_outside_the_window_are_hidden() {
        let fixture = fixture();
        let frame = frame_for(&fixture, &fixture.snapshot, &[]);
        let visibility = |id: &str| {
            frame
                .containers
                .iter()
                .find(|marker| marker.container_id == id)
                .map(|marker| marker.visible)
        };

        assert_eq!(visibility("Container_0"), Some(true));
        assert_eq!(visibility("Container_3"), Some(true));
        assert_eq!(visibility("Container_4"), Some(true));
        assert_eq!(visibility("Container_12"), Some(false));
        assert_eq!(frame.visible_containers().count(), 3);
    }

    #[test]
    fn stale_references_are_skipped_not_fatal() {
        let fixture = fixture();
        let mut snapshot = fixture.snapshot.clone();
        snapshot.links.push(TopologyLink {
            source: "Agg_Switch_0".to_owned(),
            target: "Server_9_9".to_owned(),
            load: 10.0,
        });
        snapshot
            .containers
            .insert("Container_1".to_owned(), "Server_9_9".to_owned());

        let frame = frame_for(&fixture, &snapshot, &[]);
        assert_eq!(frame.links.len(), 2);
        assert_eq!(frame.containers.len(), 4);
        assert_eq!(frame.skipped.len(), 2);
    }

    #[test]
    fn particles_interpolate_between_hosts() {
        let fixture = fixture();
        let migration = ActiveMigration {
            event: MigrationEvent {
                container_id: "Container_0".to_owned(),
                from_host: "Server_0_0".to_owned(),
                to_host: "Server_0_1".to_owned(),
            },
            from: vec2(300.0, 400.0),
            to: vec2(500.0, 400.0),
            elapsed: Duration::ZERO,
        };
        let expired = ActiveMigration {
            elapsed: Duration::from_secs(5),
            ..migration.clone()
        };

        let frame = frame_for(&fixture, &fixture.snapshot, &[migration, expired]);
        assert_eq!(frame.particles.len(), 1);
        let particle = &frame.particles[0];
        assert_eq!(particle.start, pos2(300.0, 400.0));
        assert_eq!(particle.end, pos2(500.0, 400.0));
        assert_eq!(particle.center, particle.start);
        assert_eq!(particle.progress, 0.0);
    }

    #[test]
    fn legend_lists_every_category() {
        let fixture = fixture();
        let frame = frame_for(&fixture, &fixture.snapshot, &[]);
        let count = |kind: LegendKind| frame.legend.iter().filter(|entry| entry.kind == kind).count();
        assert_eq!(count(LegendKind::Tier), 4);
        assert_eq!(count(LegendKind::Load), 3);
        assert_eq!(count(LegendKind::Chain), 3);
        assert_eq!(count(LegendKind::Migration), 1);
    }

    #[test]
    fn node_hit_testing_picks_the_closest_disc() {
        let fixture = fixture();
        let frame = frame_for(&fixture, &fixture.snapshot, &[]);
        assert_eq!(
            frame.node_at(pos2(305.0, 398.0)).map(|node| node.id.as_str()),
            Some("Server_0_0")
        );
        assert!(frame.node_at(pos2(50.0, 50.0)).is_none());
    }
}
