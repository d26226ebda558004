use std::time::Duration;

use eframe::egui::{self, Align, Color32, Context, Layout, RichText, Sense, Stroke, Ui, vec2};
use migraviz::render::legend;
use migraviz::util::format_load;

use super::render_utils::sparkline_points;
use super::{SourceRequest, ViewModel};

const SPARKLINE_STROKE: Color32 = Color32::from_rgb(59, 130, 246);

fn swatch(ui: &mut Ui, color: Color32) {
    let (rect, _) = ui.allocate_exact_size(vec2(12.0, 12.0), Sense::hover());
    ui.painter().rect_filled(rect, 2.0, color);
}

impl ViewModel {
    pub(super) fn show(&mut self, ctx: &Context) {
        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| self.draw_top_bar(ui));

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| self.draw_controls(ui));

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(320.0)
            .show(ctx, |ui| self.draw_details(ui));

        egui::CentralPanel::default().show(ctx, |ui| self.draw_graph(ui));
    }

    fn draw_top_bar(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            ui.heading("migraviz");
            ui.separator();
            ui.label(format!("source: {}", self.source_name));
            ui.label(format!("snapshot: {}", self.session.sequence()));
            if let Some(step) = self.session.snapshot().and_then(|snapshot| snapshot.step) {
                ui.label(format!("step: {step}"));
            }
            ui.label(format!("nodes: {}", self.session.engine().nodes().len()));
            ui.label(format!("links: {}", self.session.engine().link_count()));
            let containers = self
                .session
                .snapshot()
                .map_or(0, |snapshot| snapshot.containers.len());
            ui.label(format!("containers: {containers}"));

            let idle = self.source.is_some() && !self.is_fetching();
            if ui
                .add_enabled(idle && !self.exhausted, egui::Button::new("Next snapshot"))
                .clicked()
            {
                self.since_advance_secs = 0.0;
                self.request(SourceRequest::Next);
            }
            if ui.add_enabled(idle, egui::Button::new("Reset")).clicked() {
                self.request(SourceRequest::Reset);
            }
            if ui
                .add_enabled(idle, egui::Button::new("Burst"))
                .on_hover_text("Inject a traffic spike between two containers.")
                .clicked()
            {
                self.request(SourceRequest::Burst);
            }
            ui.add_enabled(
                !self.exhausted,
                egui::Checkbox::new(&mut self.auto_advance, "Auto-advance"),
            )
            .on_hover_text(format!("Pull a snapshot every {:.1}s.", self.auto_advance_secs));
            if self.is_fetching() {
                ui.spinner();
            }

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                if let Some(error) = &self.last_error {
                    ui.colored_label(Color32::from_rgb(220, 38, 38), error.as_str());
                } else if self.exhausted {
                    ui.label("source exhausted");
                }
            });
        });
    }

    fn draw_controls(&mut self, ui: &mut Ui) {
        ui.heading("Layout Controls");
        ui.separator();
        ui.add_space(4.0);

        ui.label("Search (node or container id)")
            .on_hover_text("Highlight matching nodes and the servers hosting matching containers.");
        ui.text_edit_singleline(&mut self.search);

        ui.separator();
        ui.checkbox(&mut self.live_physics, "Live physics")
            .on_hover_text("Pause to freeze both the layout and in-flight migrations.");
        ui.horizontal(|ui| {
            if ui.button("Reheat").clicked() {
                self.session.reheat(1.0);
                self.ensure_ticking();
            }
            if ui.button("Reset view").clicked() {
                self.pan = vec2(0.0, 0.0);
                self.zoom = 1.0;
            }
        });
        ui.checkbox(&mut self.show_labels, "Node labels");
        ui.checkbox(&mut self.show_legend, "Legend");

        ui.separator();
        egui::CollapsingHeader::new("Physics tuning")
            .default_open(true)
            .show(ui, |ui| {
                let mut changed = false;
                changed |= ui
                    .add(egui::Slider::new(&mut self.physics.link_distance, 10.0..=300.0).text("Link distance"))
                    .changed();
                changed |= ui
                    .add(egui::Slider::new(&mut self.physics.link_strength, 0.0..=1.0).text("Link strength"))
                    .changed();
                changed |= ui
                    .add(
                        egui::Slider::new(&mut self.physics.repulsion_strength, 0.0..=2000.0)
                            .text("Repulsion"),
                    )
                    .changed();
                changed |= ui
                    .add(egui::Slider::new(&mut self.physics.center_strength, 0.0..=0.5).text("Centering"))
                    .changed();
                changed |= ui
                    .add(egui::Slider::new(&mut self.physics.band_strength, 0.0..=1.0).text("Tier bands"))
                    .on_hover_text("Pull of each tier toward its horizontal band.")
                    .changed();
                changed |= ui
                    .add(
                        egui::Slider::new(&mut self.physics.velocity_damping, 0.05..=0.95)
                            .text("Velocity damping"),
                    )
                    .changed();
                if changed {
                    self.session.set_physics(self.physics);
                    self.ensure_ticking();
                }

                if ui
                    .add(
                        egui::Slider::new(&mut self.particle_duration_ms, 200..=5000)
                            .text("Migration ms"),
                    )
                    .changed()
                {
                    self.session
                        .set_particle_duration(Duration::from_millis(self.particle_duration_ms));
                }

                if ui.button("Restore defaults").clicked() {
                    self.physics = Default::default();
                    self.session.set_physics(self.physics);
                    self.ensure_ticking();
                }
            });

        ui.separator();
        let engine = self.session.engine();
        ui.small(format!(
            "alpha {:.3}  |  ticks {}  |  {}",
            engine.alpha(),
            engine.tick_count(),
            if engine.is_settled() { "settled" } else { "cooling" },
        ));
        ui.small(format!("migrations in flight: {}", self.session.active_migrations()));
    }

    fn draw_details(&mut self, ui: &mut Ui) {
        if self.show_legend {
            ui.heading("Legend");
            ui.add_space(4.0);
            for entry in legend(self.session.classifier()) {
                ui.horizontal(|ui| {
                    swatch(ui, entry.color);
                    ui.label(entry.label);
                });
            }
            ui.separator();
        }

        self.draw_load_series(ui);
        ui.separator();
        self.draw_selection(ui);
        ui.separator();
        self.draw_diagnostics(ui);
    }

    fn draw_load_series(&self, ui: &mut Ui) {
        let series = self.session.series();
        ui.label(RichText::new("Network load").strong());

        let values = series.iter().map(|sample| sample.total_load).collect::<Vec<_>>();
        let (rect, _) = ui.allocate_exact_size(vec2(ui.available_width(), 48.0), Sense::hover());
        ui.painter()
            .rect_filled(rect, 4.0, Color32::from_rgb(241, 245, 249));
        let points = sparkline_points(rect.shrink(4.0), &values);
        if points.len() > 1 {
            ui.painter()
                .add(egui::Shape::line(points, Stroke::new(1.5, SPARKLINE_STROKE)));
        }

        let Some(latest) = series.latest() else {
            ui.small("No snapshots yet.");
            return;
        };
        ui.label(format!("Total load: {}", format_load(latest.total_load)));
        if let Some(change) = series.change_percent() {
            ui.label(format!("Change: {change:+.1}%"));
        }
        ui.label(format!("Peak: {}", format_load(series.peak_load())));
        if let Some(cost) = latest.cost {
            ui.label(format!("Network cost: {}", format_load(cost)));
        }
        ui.label(format!(
            "Migrations: {} last, {} total",
            latest.migrations,
            series.total_migrations()
        ));
    }

    fn draw_selection(&mut self, ui: &mut Ui) {
        ui.label(RichText::new("Selection").strong());
        let Some(selected) = self.selected.clone() else {
            ui.small("Click a node to inspect it.");
            return;
        };
        let Some(node) = self.session.engine().node(&selected) else {
            ui.small("The selected node left the topology.");
            return;
        };

        ui.label(RichText::new(node.id.as_str()).monospace());
        ui.label(format!("Tier: {}", node.tier));
        let (x, y) = (node.position.x, node.position.y);
        ui.label(format!("Position: ({x:.0}, {y:.0})"));

        let mut unpin = false;
        if node.pinned.is_some() {
            unpin = ui.button("Unpin").clicked();
        }

        if let Some(snapshot) = self.session.snapshot() {
            let load = snapshot
                .links
                .iter()
                .filter(|link| link.source == selected || link.target == selected)
                .map(|link| link.load)
                .sum::<f64>();
            ui.label(format!("Attached load: {}", format_load(load)));

            let hosted = snapshot
                .containers
                .iter()
                .filter(|(_, host)| **host == selected)
                .map(|(container, _)| container.as_str())
                .collect::<Vec<_>>();
            if !hosted.is_empty() {
                ui.label(format!("Hosts {} containers:", hosted.len()));
                egui::ScrollArea::vertical()
                    .id_salt("hosted_containers")
                    .max_height(120.0)
                    .show(ui, |ui| {
                        for container in hosted {
                            let category = self
                                .session
                                .classifier()
                                .chain_category(container, &snapshot.chains);
                            ui.horizontal(|ui| {
                                swatch(ui, self.session.classifier().chain_color(category));
                                ui.label(container);
                                ui.small(self.session.classifier().chain_label(category));
                            });
                        }
                    });
            }
        }

        if unpin && self.session.unpin(&selected) {
            self.ensure_ticking();
        }
    }

    fn draw_diagnostics(&self, ui: &mut Ui) {
        let diagnostics = self.session.diagnostics();
        ui.label(RichText::new(format!("Diagnostics ({})", diagnostics.len())).strong());
        if diagnostics.is_empty() {
            ui.small("Every snapshot so far was well formed.");
            return;
        }
        egui::ScrollArea::vertical()
            .id_salt("diagnostics")
            .max_height(180.0)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for diagnostic in diagnostics {
                    ui.small(diagnostic.to_string());
                }
            });
    }
}
