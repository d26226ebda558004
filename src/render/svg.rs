use std::fmt::Write;

use eframe::egui::Color32;

use crate::util::hex_color;

use super::{
    CONTAINER_STROKE, Frame, LegendEntry, PARTICLE_FILL, PARTICLE_STROKE, RenderBackend,
};

const LEGEND_ROW_HEIGHT: f32 = 16.0;

/// Renders frames into a standalone SVG document.
#[derive(Debug, Default)]
pub struct SvgBackend {
    document: String,
    show_legend: bool,
}

impl SvgBackend {
    pub fn new(show_legend: bool) -> Self {
        Self {
            document: String::new(),
            show_legend,
        }
    }

    /// The last drawn frame as SVG markup.
    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn into_document(self) -> String {
        self.document
    }
}

fn paint(color: Color32) -> String {
    let [r, g, b, a] = color.to_srgba_unmultiplied();
    let hex = hex_color(Color32::from_rgb(r, g, b));
    if a == u8::MAX {
        format!(r#""{hex}""#)
    } else {
        format!(r#""{hex}" opacity="{:.2}""#, a as f32 / 255.0)
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl RenderBackend for SvgBackend {
    fn draw_frame(&mut self, frame: &Frame) {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = frame.width,
            h = frame.height
        );
        let _ = writeln!(out, r##"<rect width="100%" height="100%" fill="#f8fafc"/>"##);

        let _ = writeln!(out, r#"<g class="links">"#);
        for link in &frame.links {
            let _ = writeln!(
                out,
                r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-opacity="{:.2}" stroke-width="{}"/>"#,
                link.start.x,
                link.start.y,
                link.end.x,
                link.end.y,
                hex_color(link.level.color()),
                link.color.a() as f32 / 255.0,
                link.width
            );
        }
        let _ = writeln!(out, "</g>");

        let _ = writeln!(out, r#"<g class="nodes">"#);
        for node in &frame.nodes {
            let _ = writeln!(
                out,
                r#"<circle cx="{:.1}" cy="{:.1}" r="{}" fill={} stroke={} stroke-width="2"/>"#,
                node.center.x,
                node.center.y,
                node.radius,
                paint(node.fill),
                paint(node.stroke)
            );
            if !node.label.is_empty() {
                let _ = writeln!(
                    out,
                    r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="10">{}</text>"#,
                    node.center.x,
                    node.center.y + 4.0,
                    escape(&node.label)
                );
            }
        }
        let _ = writeln!(out, "</g>");

        let _ = writeln!(out, r#"<g class="particles">"#);
        for particle in &frame.particles {
            let _ = writeln!(
                out,
                r#"<circle cx="{:.1}" cy="{:.1}" r="{}" fill={} stroke={}/>"#,
                particle.center.x,
                particle.center.y,
                particle.radius,
                paint(PARTICLE_FILL),
                paint(PARTICLE_STROKE)
            );
        }
        let _ = writeln!(out, "</g>");

        let _ = writeln!(out, r#"<g class="containers">"#);
        for marker in frame.visible_containers() {
            let _ = writeln!(
                out,
                r#"<circle cx="{:.1}" cy="{:.1}" r="{}" fill={} stroke={} stroke-width="1"><title>{}</title></circle>"#,
                marker.center.x,
                marker.center.y,
                marker.radius,
                paint(marker.fill),
                paint(CONTAINER_STROKE),
                escape(&marker.container_id)
            );
        }
        let _ = writeln!(out, "</g>");

        if self.show_legend {
            write_legend(&mut out, &frame.legend);
        }

        let _ = writeln!(out, "</svg>");
        self.document = out;
    }
}

fn write_legend(out: &mut String, entries: &[LegendEntry]) {
    let _ = writeln!(out, r#"<g class="legend" transform="translate(10,10)">"#);
    for (row, entry) in entries.iter().enumerate() {
        let y = row as f32 * LEGEND_ROW_HEIGHT;
        let _ = writeln!(
            out,
            r#"<rect x="0" y="{y}" width="10" height="10" fill={}/><text x="16" y="{}" font-size="10">{}</text>"#,
            paint(entry.color),
            y + 9.0,
            escape(&entry.label)
        );
    }
    let _ = writeln!(out, "</g>");
}
