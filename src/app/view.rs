use std::collections::HashSet;

use eframe::egui::{self, Align2, Color32, FontId, Painter, Pos2, Rect, Sense, Stroke, Ui, Vec2, vec2};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use migraviz::render::{
    CONTAINER_STROKE, Frame, NODE_STROKE, PARTICLE_FILL, PARTICLE_STROKE, RenderBackend,
};
use migraviz::topology::Tier;
use migraviz::util::format_load;

use super::ViewModel;
use super::render_utils::{
    blend_color, canvas_to_screen, circle_visible, draw_background, fade_color, screen_to_canvas,
};

const SEARCH_HIGHLIGHT: Color32 = Color32::from_rgb(103, 196, 255);
const SELECTED: Color32 = Color32::from_rgb(245, 158, 11);
const PIN_MARK: Color32 = Color32::from_rgb(30, 41, 59);

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

/// Node ids matching `query`, directly or through a container they host.
fn search_matches(frame: &Frame, query: &str) -> Option<HashSet<String>> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }

    let matcher = SkimMatcherV2::default();
    let mut matches = frame
        .nodes
        .iter()
        .filter(|node| fuzzy_match_score(&matcher, &node.id, query).is_some())
        .map(|node| node.id.clone())
        .collect::<HashSet<_>>();
    matches.extend(
        frame
            .containers
            .iter()
            .filter(|marker| fuzzy_match_score(&matcher, &marker.container_id, query).is_some())
            .map(|marker| marker.host_id.clone()),
    );
    Some(matches)
}

/// Paints frames onto an egui canvas.
pub(super) struct EguiBackend<'a> {
    painter: &'a Painter,
    rect: Rect,
    pan: Vec2,
    zoom: f32,
    canvas_center: Pos2,
    matches: Option<&'a HashSet<String>>,
    selected: Option<&'a str>,
    hovered: Option<&'a str>,
    show_labels: bool,
}

impl EguiBackend<'_> {
    fn to_screen(&self, point: Pos2) -> Pos2 {
        canvas_to_screen(self.rect, self.pan, self.zoom, self.canvas_center, point)
    }

    fn is_match(&self, id: &str) -> Option<bool> {
        self.matches.map(|matches| matches.contains(id))
    }
}

impl RenderBackend for EguiBackend<'_> {
    fn draw_frame(&mut self, frame: &Frame) {
        let canvas = Rect::from_min_max(
            self.to_screen(Pos2::ZERO),
            self.to_screen(Pos2::new(frame.width, frame.height)),
        );
        draw_background(self.painter, self.rect, canvas);

        let width_scale = self.zoom.sqrt();
        for link in &frame.links {
            let start = self.to_screen(link.start);
            let end = self.to_screen(link.end);
            let dimmed = self.is_match(&link.source) == Some(false)
                && self.is_match(&link.target) == Some(false);
            let color = if dimmed {
                fade_color(link.color, 0.2)
            } else {
                link.color
            };
            self.painter
                .line_segment([start, end], Stroke::new(link.width * width_scale, color));
        }

        for node in &frame.nodes {
            let center = self.to_screen(node.center);
            let radius = node.radius * self.zoom;
            if !circle_visible(self.rect, center, radius) {
                continue;
            }

            let is_selected = self.selected == Some(node.id.as_str());
            let is_hovered = self.hovered == Some(node.id.as_str());
            let fill = match self.is_match(&node.id) {
                Some(true) => blend_color(node.fill, SEARCH_HIGHLIGHT, 0.6),
                Some(false) => fade_color(node.fill, 0.3),
                None if is_hovered => blend_color(node.fill, SELECTED, 0.25),
                None => node.fill,
            };

            self.painter.circle_filled(center, radius, fill);
            self.painter
                .circle_stroke(center, radius, Stroke::new(2.0, NODE_STROKE));
            if is_selected {
                self.painter
                    .circle_stroke(center, radius + 4.0, Stroke::new(2.0, SELECTED));
            }
            if node.pinned {
                self.painter
                    .circle_filled(center + vec2(radius * 0.7, -radius * 0.7), 3.0, PIN_MARK);
            }
            if self.show_labels && !node.label.is_empty() && self.zoom > 0.6 {
                self.painter.text(
                    center,
                    Align2::CENTER_CENTER,
                    &node.label,
                    FontId::proportional(10.0 * self.zoom.clamp(0.8, 1.6)),
                    Color32::from_rgb(15, 23, 42),
                );
            }
        }

        for particle in &frame.particles {
            let center = self.to_screen(particle.center);
            let radius = particle.radius * self.zoom.clamp(0.6, 2.0);
            self.painter.circle_filled(center, radius, PARTICLE_FILL);
            self.painter
                .circle_stroke(center, radius, Stroke::new(1.0, PARTICLE_STROKE));
        }

        for marker in frame.visible_containers() {
            let center = self.to_screen(marker.center);
            let radius = marker.radius * self.zoom.clamp(0.6, 2.0);
            if !circle_visible(self.rect, center, radius) {
                continue;
            }
            self.painter.circle_filled(center, radius, marker.fill);
            self.painter
                .circle_stroke(center, radius, Stroke::new(1.0, CONTAINER_STROKE));
        }
    }
}

impl ViewModel {
    fn handle_zoom(&mut self, ui: &Ui, rect: Rect, response: &egui::Response) {
        if !response.hovered() {
            return;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let anchor = pointer - rect.center() - self.pan;

        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        let zoom = (self.zoom * zoom_factor).clamp(0.2, 6.0);
        self.pan += anchor - anchor * (zoom / self.zoom);
        self.zoom = zoom;
    }

    fn handle_pan(&mut self, response: &egui::Response) {
        if response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            self.pan += response.drag_delta();
        }
    }

    /// Dragging a node pins it where it is dropped; double-clicking releases
    /// it.
    fn handle_node_drag(&mut self, response: &egui::Response, pointer: Option<Pos2>, hovered: Option<&str>) {
        if response.drag_started_by(egui::PointerButton::Primary) {
            self.dragging = hovered.map(str::to_owned);
        }

        if let (Some(id), Some(pointer)) = (self.dragging.clone(), pointer)
            && response.dragged_by(egui::PointerButton::Primary)
            && self.session.pin(&id, pointer.to_vec2())
        {
            self.session.reheat(0.3);
            self.ensure_ticking();
        }

        if response.drag_stopped() {
            self.dragging = None;
        }

        if response.double_clicked()
            && let Some(id) = hovered
            && self.session.unpin(id)
        {
            self.ensure_ticking();
        }
    }

    pub(super) fn draw_graph(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        self.handle_zoom(ui, rect, &response);
        self.handle_pan(&response);

        let (center_x, center_y) = self.session.config().canvas.center();
        let canvas_center = Pos2::new(center_x, center_y);
        let pointer = ui
            .input(|input| input.pointer.interact_pos())
            .filter(|position| rect.contains(*position) || self.dragging.is_some())
            .map(|position| screen_to_canvas(rect, self.pan, self.zoom, canvas_center, position));

        let frame = self.session.frame();
        let hovered = pointer
            .and_then(|position| frame.node_at(position))
            .map(|node| node.id.clone());

        self.handle_node_drag(&response, pointer, hovered.as_deref());
        if response.clicked_by(egui::PointerButton::Primary) {
            self.selected = hovered.clone();
        }
        if hovered.is_some() {
            ui.output_mut(|output| {
                output.cursor_icon = egui::CursorIcon::PointingHand;
            });
        }

        // Dragging moved a node; draw where it is now.
        let frame = if self.dragging.is_some() {
            self.session.frame()
        } else {
            frame
        };
        let matches = search_matches(&frame, &self.search);
        let mut backend = EguiBackend {
            painter: &painter,
            rect,
            pan: self.pan,
            zoom: self.zoom,
            canvas_center,
            matches: matches.as_ref(),
            selected: self.selected.as_deref(),
            hovered: hovered.as_deref(),
            show_labels: self.show_labels,
        };
        backend.draw_frame(&frame);

        if let Some(node) = hovered.as_deref().and_then(|id| frame.node(id)) {
            let hosted = self
                .session
                .snapshot()
                .map_or(0, |snapshot| snapshot.containers_on(&node.id));
            let load = self.session.snapshot().map_or(0.0, |snapshot| {
                snapshot
                    .links
                    .iter()
                    .filter(|link| link.source == node.id || link.target == node.id)
                    .map(|link| link.load)
                    .sum()
            });
            let mut text = format!("{}  |  {}  |  load {}", node.id, node.tier, format_load(load));
            if node.tier == Tier::Server {
                text.push_str(&format!("  |  {hosted} containers"));
            }
            if node.pinned {
                text.push_str("  |  pinned");
            }
            painter.text(
                rect.left_top() + vec2(10.0, 10.0),
                Align2::LEFT_TOP,
                text,
                FontId::proportional(13.0),
                Color32::from_rgb(15, 23, 42),
            );
        }
    }
}
