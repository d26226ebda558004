//! Migration particles in flight.

use std::time::Duration;

use eframe::egui::Vec2;

use crate::diff::MigrationEvent;
use crate::physics::LayoutEngine;
use crate::topology::Diagnostic;

/// A migration being animated from its old host to its new one. Endpoints
/// are captured when the migration is spawned.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveMigration {
    pub event: MigrationEvent,
    pub from: Vec2,
    pub to: Vec2,
    pub elapsed: Duration,
}

impl ActiveMigration {
    /// Linear progress in `[0, 1]`.
    pub fn progress(&self, duration: Duration) -> f32 {
        if duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f32() / duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    /// Position along the path with cubic in-out easing.
    pub fn position(&self, duration: Duration) -> Vec2 {
        let t = ease_cubic_in_out(self.progress(duration));
        self.from + (self.to - self.from) * t
    }
}

fn ease_cubic_in_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0) * 2.0;
    if t <= 1.0 {
        t * t * t * 0.5
    } else {
        let t = t - 2.0;
        (t * t * t + 2.0) * 0.5
    }
}

#[derive(Clone, Debug)]
pub struct MigrationAnimator {
    duration: Duration,
    active: Vec<ActiveMigration>,
}

impl MigrationAnimator {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            active: Vec::new(),
        }
    }

    /// Starts one particle per event. Events whose hosts have no layout
    /// position are reported instead of animated.
    pub fn spawn(&mut self, events: &[MigrationEvent], engine: &LayoutEngine) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for event in events {
            let from = engine.position_of(&event.from_host);
            let to = engine.position_of(&event.to_host);
            match (from, to) {
                (Some(from), Some(to)) => self.active.push(ActiveMigration {
                    event: event.clone(),
                    from,
                    to,
                    elapsed: Duration::ZERO,
                }),
                (None, _) => diagnostics.push(Diagnostic::UnplacedMigration {
                    container: event.container_id.clone(),
                    host: event.from_host.clone(),
                }),
                (_, None) => diagnostics.push(Diagnostic::UnplacedMigration {
                    container: event.container_id.clone(),
                    host: event.to_host.clone(),
                }),
            }
        }
        diagnostics
    }

    /// Ages every particle and drops the ones that reached their destination.
    pub fn advance(&mut self, dt: Duration) {
        let duration = self.duration;
        for migration in &mut self.active {
            migration.elapsed = migration.elapsed.saturating_add(dt);
        }
        self.active.retain(|migration| migration.elapsed < duration);
    }

    pub fn active(&self) -> &[ActiveMigration] {
        &self.active
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::vec2;

    use super::*;
    use crate::config::{CanvasConfig, PhysicsConfig};
    use crate::physics::PositionMemory;
    use crate::topology::{Tier, TopologyNode};

    fn engine_with_servers() -> LayoutEngine {
        let mut engine = LayoutEngine::new(CanvasConfig::default(), PhysicsConfig::default());
        let nodes = ["S0", "S1"]
            .into_iter()
            .map(|id| TopologyNode {
                id: id.to_owned(),
                tier: Tier::Server,
            })
            .collect::<Vec<_>>();
        let mut memory = PositionMemory::new();
        memory.insert("S0", vec2(100.0, 400.0));
        memory.insert("S1", vec2(600.0, 400.0));
        engine.reset(&nodes, &[], &memory);
        engine
    }

    fn event(from: &str, to: &str) -> MigrationEvent {
        MigrationEvent {
            container_id: "C1".to_owned(),
            from_host: from.to_owned(),
            to_host: to.to_owned(),
        }
    }

    #[test]
    fn particle_travels_between_hosts_and_expires() {
        let engine = engine_with_servers();
        let mut animator = MigrationAnimator::new(Duration::from_millis(1000));
        assert!(animator.spawn(&[event("S0", "S1")], &engine).is_empty());

        let migration = animator.active()[0].clone();
        assert_eq!(migration.position(animator.duration()), vec2(100.0, 400.0));

        animator.advance(Duration::from_millis(500));
        let halfway = animator.active()[0].position(animator.duration());
        assert!((halfway.x - 350.0).abs() < 1e-3);

        animator.advance(Duration::from_millis(499));
        assert_eq!(animator.active().len(), 1);
        animator.advance(Duration::from_millis(1));
        assert!(animator.is_idle());
    }

    #[test]
    fn unplaced_hosts_are_reported() {
        let engine = engine_with_servers();
        let mut animator = MigrationAnimator::new(Duration::from_millis(1000));
        let diagnostics = animator.spawn(&[event("S0", "S9")], &engine);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::UnplacedMigration {
                container: "C1".to_owned(),
                host: "S9".to_owned(),
            }]
        );
        assert!(animator.is_idle());
    }

    #[test]
    fn easing_hits_its_endpoints() {
        assert_eq!(ease_cubic_in_out(0.0), 0.0);
        assert_eq!(ease_cubic_in_out(0.5), 0.5);
        assert_eq!(ease_cubic_in_out(1.0), 1.0);
    }
}
