use eframe::egui::{Color32, Painter, Pos2, Rect, Stroke, Vec2, pos2};

pub(super) fn blend_color(base: Color32, overlay: Color32, amount: f32) -> Color32 {
    let amount = amount.clamp(0.0, 1.0);
    let inverse = 1.0 - amount;

    Color32::from_rgba_unmultiplied(
        ((base.r() as f32 * inverse) + (overlay.r() as f32 * amount)) as u8,
        ((base.g() as f32 * inverse) + (overlay.g() as f32 * amount)) as u8,
        ((base.b() as f32 * inverse) + (overlay.b() as f32 * amount)) as u8,
        ((base.a() as f32 * inverse) + (overlay.a() as f32 * amount)) as u8,
    )
}

/// Fades `color` toward transparent while keeping some of its hue.
pub(super) fn fade_color(color: Color32, factor: f32) -> Color32 {
    let factor = factor.clamp(0.0, 1.0);
    Color32::from_rgba_unmultiplied(
        color.r(),
        color.g(),
        color.b(),
        (color.a() as f32 * (0.25 + (factor * 0.75))) as u8,
    )
}

/// Light backdrop with the canvas bounds outlined.
pub(super) fn draw_background(painter: &Painter, rect: Rect, canvas: Rect) {
    painter.rect_filled(rect, 0.0, Color32::from_rgb(241, 245, 249));
    painter.rect_filled(canvas, 6.0, Color32::from_rgb(248, 250, 252));

    let grid = Stroke::new(1.0, Color32::from_rgba_unmultiplied(203, 213, 225, 90));
    let step = (canvas.width() / 16.0).max(12.0);
    let mut x = canvas.left() + step;
    while x < canvas.right() {
        painter.line_segment([pos2(x, canvas.top()), pos2(x, canvas.bottom())], grid);
        x += step;
    }
    let mut y = canvas.top() + step;
    while y < canvas.bottom() {
        painter.line_segment([pos2(canvas.left(), y), pos2(canvas.right(), y)], grid);
        y += step;
    }
}

pub(super) fn circle_visible(rect: Rect, position: Pos2, radius: f32) -> bool {
    !(position.x + radius < rect.left()
        || position.x - radius > rect.right()
        || position.y + radius < rect.top()
        || position.y - radius > rect.bottom())
}

/// Maps canvas coordinates onto the screen. The canvas centre sits at the
/// rect centre shifted by `pan`.
pub(super) fn canvas_to_screen(rect: Rect, pan: Vec2, zoom: f32, canvas_center: Pos2, point: Pos2) -> Pos2 {
    rect.center() + pan + (point - canvas_center) * zoom
}

pub(super) fn screen_to_canvas(rect: Rect, pan: Vec2, zoom: f32, canvas_center: Pos2, screen: Pos2) -> Pos2 {
    canvas_center + (screen - rect.center() - pan) / zoom
}

/// Polyline of `values` scaled into `rect`, newest on the right.
pub(super) fn sparkline_points(rect: Rect, values: &[f64]) -> Vec<Pos2> {
    let peak = values.iter().copied().fold(0.0, f64::max);
    if values.is_empty() || peak <= 0.0 {
        return Vec::new();
    }
    let spacing = if values.len() > 1 {
        rect.width() / (values.len() - 1) as f32
    } else {
        0.0
    };
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let height = (*value / peak) as f32 * rect.height();
            pos2(rect.left() + index as f32 * spacing, rect.bottom() - height)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_mapping_round_trips() {
        let rect = Rect::from_min_size(pos2(100.0, 50.0), Vec2::new(600.0, 400.0));
        let center = pos2(400.0, 250.0);
        let pan = Vec2::new(12.0, -8.0);
        let screen = canvas_to_screen(rect, pan, 1.5, center, pos2(20.0, 480.0));
        let back = screen_to_canvas(rect, pan, 1.5, center, screen);
        assert!((back - pos2(20.0, 480.0)).length() < 1e-3);
    }

    #[test]
    fn sparkline_spans_the_rect() {
        let rect = Rect::from_min_size(Pos2::ZERO, Vec2::new(100.0, 20.0));
        let points = sparkline_points(rect, &[0.0, 5.0, 10.0]);
        assert_eq!(points, vec![pos2(0.0, 20.0), pos2(50.0, 10.0), pos2(100.0, 0.0)]);
        assert!(sparkline_points(rect, &[]).is_empty());
    }
}
