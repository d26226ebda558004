//! One visualization session: the layout engine, diff tracker and particle
//! animator wired to a stream of snapshots.

use std::time::Duration;

use eframe::egui::Vec2;
use tracing::{debug, info, warn};

use crate::animation::MigrationAnimator;
use crate::classify::ColorClassifier;
use crate::config::{ConfigError, PhysicsConfig, VizConfig};
use crate::diff::{MigrationDiffTracker, MigrationEvent};
use crate::physics::{LayoutEngine, PositionMemory, TickReport};
use crate::render::{Frame, FrameInputs, build_frame};
use crate::scheduler::TickControl;
use crate::series::{LoadSample, LoadSeries};
use crate::topology::{Diagnostic, RawSnapshot, Snapshot, SnapshotError, SnapshotReport};

const MAX_DIAGNOSTICS: usize = 64;

/// What a single applied snapshot changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyReport {
    pub sequence: u64,
    pub migrations: Vec<MigrationEvent>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Visualization {
    config: VizConfig,
    classifier: ColorClassifier,
    engine: LayoutEngine,
    tracker: MigrationDiffTracker,
    animator: MigrationAnimator,
    snapshot: Option<Snapshot>,
    diagnostics: Vec<Diagnostic>,
    series: LoadSeries,
    sequence: u64,
}

impl Visualization {
    pub fn new(config: VizConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = ColorClassifier::from_config(&config.render)?;
        Ok(Self {
            classifier,
            engine: LayoutEngine::new(config.canvas, config.physics),
            tracker: MigrationDiffTracker::new(),
            animator: MigrationAnimator::new(Duration::from_millis(
                config.render.particle_duration_ms,
            )),
            snapshot: None,
            diagnostics: Vec::new(),
            series: LoadSeries::default(),
            sequence: 0,
            config,
        })
    }

    pub fn apply_json(&mut self, raw: &str) -> Result<ApplyReport, SnapshotError> {
        match RawSnapshot::from_json(raw) {
            Ok(snapshot) => self.apply_raw(snapshot),
            Err(err) => {
                self.record_rejection(&err);
                Err(err)
            }
        }
    }

    /// Validates and applies `raw`. A rejected snapshot leaves the session
    /// untouched apart from a recorded diagnostic, so the last good frame
    /// keeps rendering.
    pub fn apply_raw(&mut self, raw: RawSnapshot) -> Result<ApplyReport, SnapshotError> {
        match raw.validate() {
            Ok(report) => Ok(self.apply(report)),
            Err(err) => {
                self.record_rejection(&err);
                Err(err)
            }
        }
    }

    /// Starts over from `raw`. Existing state is cleared only after `raw`
    /// validates; a rejected snapshot is recorded like in [`Self::apply_raw`]
    /// and everything else stays as it was.
    pub fn restart_raw(&mut self, raw: RawSnapshot) -> Result<ApplyReport, SnapshotError> {
        match raw.validate() {
            Ok(report) => {
                self.clear();
                Ok(self.apply(report))
            }
            Err(err) => {
                self.record_rejection(&err);
                Err(err)
            }
        }
    }

    pub fn apply(&mut self, report: SnapshotReport) -> ApplyReport {
        let SnapshotReport {
            snapshot,
            mut diagnostics,
        } = report;
        self.sequence += 1;

        let migrations = self.tracker.observe(&snapshot.containers);
        let previous = self.engine.positions();
        let skipped = self
            .engine
            .reset(&snapshot.nodes, &snapshot.links, &previous);
        if skipped > 0 {
            debug!(skipped, "links without layout endpoints ignored");
        }
        diagnostics.extend(self.animator.spawn(&migrations, &self.engine));

        self.series.push(LoadSample {
            sequence: self.sequence,
            step: snapshot.step,
            total_load: snapshot.total_load(),
            cost: snapshot.cost,
            migrations: migrations.len(),
        });

        info!(
            sequence = self.sequence,
            nodes = snapshot.nodes.len(),
            links = snapshot.links.len(),
            containers = snapshot.containers.len(),
            migrations = migrations.len(),
            diagnostics = diagnostics.len(),
            "snapshot applied"
        );
        for event in &migrations {
            debug!(
                container = %event.container_id,
                from = %event.from_host,
                to = %event.to_host,
                "container migrated"
            );
        }
        for diagnostic in &diagnostics {
            warn!(%diagnostic, "snapshot diagnostic");
        }

        self.snapshot = Some(snapshot);
        self.record(diagnostics.iter().cloned());
        ApplyReport {
            sequence: self.sequence,
            migrations,
            diagnostics,
        }
    }

    /// Notes a snapshot that never reached [`Self::apply`].
    pub fn record_rejection(&mut self, err: &SnapshotError) {
        warn!(error = %err, "snapshot rejected");
        self.record([Diagnostic::SnapshotRejected(err.to_string())]);
    }

    fn record(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
        if self.diagnostics.len() > MAX_DIAGNOSTICS {
            let excess = self.diagnostics.len() - MAX_DIAGNOSTICS;
            self.diagnostics.drain(..excess);
        }
    }

    /// Advances physics and particles by `dt`.
    pub fn tick(&mut self, dt: Duration) -> TickReport {
        let report = self.engine.tick(dt.as_secs_f32());
        self.animator.advance(dt);
        report
    }

    pub fn frame(&self) -> Frame {
        build_frame(&FrameInputs {
            canvas: &self.config.canvas,
            engine: &self.engine,
            snapshot: self.snapshot.as_ref(),
            migrations: self.animator.active(),
            particle_duration: self.animator.duration(),
            classifier: &self.classifier,
            render: &self.config.render,
        })
    }

    /// `true` while the layout is still cooling or a particle is in flight.
    pub fn is_animating(&self) -> bool {
        !self.engine.is_settled() || !self.animator.is_idle()
    }

    /// Drops every snapshot-derived piece of state. Configuration stays.
    pub fn clear(&mut self) {
        self.tracker.clear();
        self.animator.clear();
        self.engine.reset(&[], &[], &PositionMemory::new());
        self.snapshot = None;
        self.diagnostics.clear();
        self.series.clear();
        self.sequence = 0;
        info!("session cleared");
    }

    pub fn pin(&mut self, id: &str, position: Vec2) -> bool {
        self.engine.pin(id, position)
    }

    pub fn unpin(&mut self, id: &str) -> bool {
        let unpinned = self.engine.unpin(id);
        if unpinned {
            self.engine.reheat(0.3);
        }
        unpinned
    }

    pub fn set_physics(&mut self, physics: PhysicsConfig) {
        self.config.physics = physics;
        self.engine.set_physics(physics);
        self.engine.reheat(0.5);
    }

    pub fn reheat(&mut self, alpha: f32) {
        self.engine.reheat(alpha);
    }

    pub fn set_particle_duration(&mut self, duration: Duration) {
        self.config.render.particle_duration_ms = duration.as_millis() as u64;
        self.animator.set_duration(duration);
    }

    pub fn config(&self) -> &VizConfig {
        &self.config
    }

    pub fn classifier(&self) -> &ColorClassifier {
        &self.classifier
    }

    pub fn engine(&self) -> &LayoutEngine {
        &self.engine
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn series(&self) -> &LoadSeries {
        &self.series
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn active_migrations(&self) -> usize {
        self.animator.active().len()
    }
}

/// Tick function for a [`crate::scheduler::TickScheduler`] driving a
/// session. Without `keep_alive` the registration ends once the layout has
/// settled and every particle has landed.
pub fn simulation_loop(
    keep_alive: bool,
) -> impl FnMut(&mut Visualization, Duration) -> TickControl + 'static {
    move |session, dt| {
        session.tick(dt);
        if keep_alive || session.is_animating() {
            TickControl::Continue
        } else {
            TickControl::Stop
        }
    }
}
