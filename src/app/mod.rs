use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use eframe::egui::{self, Context, Vec2};
use migraviz::config::PhysicsConfig;
use migraviz::scheduler::{ScopedTick, TickScheduler};
use migraviz::session::simulation_loop;
use migraviz::source::{SnapshotSource, SourceError};
use migraviz::topology::RawSnapshot;
use migraviz::{Visualization, VizConfig};
use tracing::{info, warn};

mod panels;
mod render_utils;
mod view;

pub struct MigrationVizApp {
    config: VizConfig,
    auto_advance_secs: Option<f32>,
    state: AppState,
}

enum AppState {
    Loading {
        rx: Receiver<Fetched>,
    },
    Ready(Box<ViewModel>),
    Error {
        message: String,
        source: Option<Box<dyn SnapshotSource>>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SourceRequest {
    Reset,
    Next,
    Burst,
}

/// A source handed back by the loader thread together with what it produced.
struct Fetched {
    source: Box<dyn SnapshotSource>,
    request: SourceRequest,
    result: Result<RawSnapshot, SourceError>,
}

struct ViewModel {
    session: Visualization,
    scheduler: TickScheduler<Visualization>,
    tick: Option<ScopedTick>,
    source: Option<Box<dyn SnapshotSource>>,
    source_name: String,
    pending: Option<Receiver<Fetched>>,
    exhausted: bool,
    last_error: Option<String>,
    auto_advance: bool,
    auto_advance_secs: f32,
    since_advance_secs: f32,
    live_physics: bool,
    physics: PhysicsConfig,
    particle_duration_ms: u64,
    search: String,
    selected: Option<String>,
    dragging: Option<String>,
    pan: Vec2,
    zoom: f32,
    show_labels: bool,
    show_legend: bool,
}

fn spawn_fetch(mut source: Box<dyn SnapshotSource>, request: SourceRequest) -> Receiver<Fetched> {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let result = match request {
            SourceRequest::Reset => source.reset(),
            SourceRequest::Next => source.next_snapshot(),
            SourceRequest::Burst => source.burst(),
        };
        let _ = tx.send(Fetched {
            source,
            request,
            result,
        });
    });

    rx
}

impl MigrationVizApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        config: VizConfig,
        source: Box<dyn SnapshotSource>,
        auto_advance_secs: Option<f32>,
    ) -> Self {
        Self {
            config,
            auto_advance_secs,
            state: AppState::Loading {
                rx: spawn_fetch(source, SourceRequest::Reset),
            },
        }
    }

    fn ready_state(&self, fetched: Fetched) -> AppState {
        let Fetched { source, result, .. } = fetched;
        let raw = match result {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "initial snapshot unavailable");
                return AppState::Error {
                    message: format!("Failed to load the initial snapshot: {err}"),
                    source: Some(source),
                };
            }
        };

        let session = match Visualization::new(self.config.clone()) {
            Ok(session) => session,
            Err(err) => {
                return AppState::Error {
                    message: format!("Invalid configuration: {err}"),
                    source: Some(source),
                };
            }
        };

        let mut model = ViewModel::new(session, source, self.auto_advance_secs);
        model.apply(raw);
        AppState::Ready(Box::new(model))
    }
}

impl ViewModel {
    fn new(
        session: Visualization,
        source: Box<dyn SnapshotSource>,
        auto_advance_secs: Option<f32>,
    ) -> Self {
        let schedule = session.config().schedule;
        let physics = session.config().physics;
        let particle_duration_ms = session.config().render.particle_duration_ms;
        Self {
            scheduler: TickScheduler::new(schedule.tick_rate_hz, schedule.max_catch_up_ticks),
            tick: None,
            source_name: source.name().to_owned(),
            source: Some(source),
            pending: None,
            exhausted: false,
            last_error: None,
            auto_advance: auto_advance_secs.is_some(),
            auto_advance_secs: auto_advance_secs.unwrap_or(2.0).max(0.1),
            since_advance_secs: 0.0,
            live_physics: true,
            physics,
            particle_duration_ms,
            search: String::new(),
            selected: None,
            dragging: None,
            pan: Vec2::ZERO,
            zoom: 1.0,
            show_labels: true,
            show_legend: true,
            session,
        }
    }

    fn apply(&mut self, raw: RawSnapshot) {
        if self.session.apply_raw(raw).is_ok() {
            self.restart_loop();
        }
    }

    /// Replaces the running tick loop. The old scope is dropped first so its
    /// registration never sees the new node set.
    fn restart_loop(&mut self) {
        self.tick = None;
        self.tick = Some(self.scheduler.start_scoped(simulation_loop(false)));
    }

    fn ensure_ticking(&mut self) {
        let active = self
            .tick
            .as_ref()
            .is_some_and(|scope| self.scheduler.is_active(scope.handle()));
        if !active {
            self.restart_loop();
        }
    }

    fn request(&mut self, request: SourceRequest) {
        if let Some(source) = self.source.take() {
            self.last_error = None;
            self.pending = Some(spawn_fetch(source, request));
        }
    }

    fn is_fetching(&self) -> bool {
        self.pending.is_some()
    }

    fn poll_source(&mut self) {
        let Some(rx) = self.pending.take() else {
            return;
        };
        let fetched = match rx.try_recv() {
            Ok(fetched) => fetched,
            Err(TryRecvError::Empty) => {
                self.pending = Some(rx);
                return;
            }
            Err(TryRecvError::Disconnected) => {
                self.last_error = Some("Snapshot worker stopped unexpectedly".to_owned());
                warn!("snapshot worker disconnected");
                return;
            }
        };

        self.source = Some(fetched.source);
        match fetched.result {
            Ok(raw) if fetched.request == SourceRequest::Reset => {
                if self.session.restart_raw(raw).is_ok() {
                    self.exhausted = false;
                    self.selected = None;
                    self.restart_loop();
                }
            }
            Ok(raw) => self.apply(raw),
            Err(SourceError::Exhausted) => {
                info!("snapshot source exhausted");
                self.exhausted = true;
                self.auto_advance = false;
            }
            Err(SourceError::Snapshot(err)) => self.session.record_rejection(&err),
            Err(err) => {
                warn!(error = %err, "snapshot request failed");
                self.last_error = Some(err.to_string());
            }
        }
    }

    fn advance_time(&mut self, ctx: &Context) {
        let dt = ctx.input(|input| input.stable_dt).clamp(0.0, 0.25);

        if self.auto_advance && !self.exhausted && !self.is_fetching() {
            self.since_advance_secs += dt;
            if self.since_advance_secs >= self.auto_advance_secs {
                self.since_advance_secs = 0.0;
                self.request(SourceRequest::Next);
            }
        }

        if self.live_physics {
            self.scheduler
                .pump(&mut self.session, Duration::from_secs_f32(dt));
        }

        if self.scheduler.active_count() > 0 || self.is_fetching() {
            ctx.request_repaint();
        } else if self.auto_advance {
            ctx.request_repaint_after(Duration::from_secs_f32(0.1));
        }
    }
}

impl eframe::App for MigrationVizApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let mut transition = None;

        match &mut self.state {
            AppState::Loading { rx } => {
                match rx.try_recv() {
                    Ok(fetched) => transition = Some(fetched),
                    Err(TryRecvError::Empty) => ctx.request_repaint(),
                    Err(TryRecvError::Disconnected) => {
                        self.state = AppState::Error {
                            message: "Snapshot worker stopped before the first snapshot".to_owned(),
                            source: None,
                        };
                        return;
                    }
                }

                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading("Loading network snapshot...");
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
            }
            AppState::Error { message, source } => {
                let mut retry = None;
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Cannot show the network");
                    ui.add_space(6.0);
                    ui.label(message.as_str());
                    ui.add_space(10.0);
                    if source.is_some() && ui.button("Retry").clicked() {
                        retry = source.take();
                    }
                });
                if let Some(source) = retry {
                    self.state = AppState::Loading {
                        rx: spawn_fetch(source, SourceRequest::Reset),
                    };
                }
            }
            AppState::Ready(model) => {
                model.poll_source();
                model.advance_time(ctx);
                model.show(ctx);
            }
        }

        if let Some(fetched) = transition {
            self.state = self.ready_state(fetched);
        }
    }
}
