//! Canvas painting for racks, tubes, flow lines, connections and previews.
//!
//! All geometry comes from [`crate::geometry`]; this module only maps world
//! points to the window and picks colors.

use super::canvas::to_window;
use super::state::PlannerApp;
use crate::constants::FLOW_LINE_CAP_LENGTH;
use crate::geometry::{self, RackGeometry};
use crate::metrics;
use crate::planner::Mode;
use crate::types::*;
use eframe::egui;
use eframe::epaint::StrokeKind;
use std::collections::HashMap;

const SELECTION_COLOR: egui::Color32 = egui::Color32::from_rgb(100, 150, 255);
const PREVIEW_COLOR: egui::Color32 = egui::Color32::from_rgb(255, 200, 60);
const MAX_GRID_LINES: usize = 1000;

impl PlannerApp {
    fn world_pos(&self, origin: egui::Pos2, world: Point) -> egui::Pos2 {
        to_window(origin, self.planner.world_to_screen(world))
    }

    fn zoom(&self) -> f32 {
        self.planner.view().zoom as f32
    }

    /// Paints the whole layout.
    ///
    /// Layers, back to front: grid, racks, connections, flow lines, previews.
    ///
    /// # Arguments
    ///
    /// * `painter` - The egui painter for drawing operations
    /// * `canvas_rect` - The screen-space rectangle of the canvas area
    pub fn render_layout(&self, painter: &egui::Painter, canvas_rect: egui::Rect) {
        let origin = canvas_rect.min;
        self.draw_grid(painter, canvas_rect);

        let layout = self.planner.layout();
        let numbering = self.planner.tube_numbering();
        let geometries: HashMap<RackId, RackGeometry> = layout
            .racks
            .iter()
            .map(|rack| (rack.id, geometry::rack_geometry(rack)))
            .collect();

        for rack in &layout.racks {
            if let Some(geometry) = geometries.get(&rack.id) {
                let selected = self.planner.selection().contains_rack(rack.id);
                self.draw_rack(painter, origin, rack, geometry, selected, numbering.get(&rack.id).copied());
            }
        }

        for connection in &layout.connections {
            let ends = (
                tube_center(&geometries, connection.source()),
                tube_center(&geometries, connection.target()),
            );
            if let (Some(a), Some(b)) = ends {
                let stroke = egui::Stroke::new(2.0, parse_color(&connection.color));
                painter.line_segment([self.world_pos(origin, a), self.world_pos(origin, b)], stroke);
            }
        }

        for line in &layout.flow_lines {
            let selected = self.planner.selection().flow_line() == Some(line.id);
            self.draw_flow_line(painter, origin, line, selected);
        }

        self.draw_previews(painter, origin, &geometries);
    }

    /// Draws grid lines every `grid_size` world units, skipped when too dense.
    pub fn draw_grid(&self, painter: &egui::Painter, canvas_rect: egui::Rect) {
        let grid = self.planner.settings().grid_size;
        if grid <= 0.0 || grid as f32 * self.zoom() < 6.0 {
            return;
        }
        let alpha = if self.planner.settings().snap_to_grid { 48 } else { 24 };
        let stroke = egui::Stroke::new(1.0, egui::Color32::from_rgba_unmultiplied(128, 128, 128, alpha));

        let top_left = self.planner.screen_to_world(Point::ZERO);
        let bottom_right = self
            .planner
            .screen_to_world(Point::new(canvas_rect.width() as f64, canvas_rect.height() as f64));

        let Some((x0, columns)) = grid_lines(top_left.x, bottom_right.x, grid) else {
            return;
        };
        let Some((y0, rows)) = grid_lines(top_left.y, bottom_right.y, grid) else {
            return;
        };

        for i in 0..columns {
            let x = x0 + i as f64 * grid;
            let sx = self.world_pos(canvas_rect.min, Point::new(x, 0.0)).x;
            painter.line_segment(
                [egui::pos2(sx, canvas_rect.min.y), egui::pos2(sx, canvas_rect.max.y)],
                stroke,
            );
        }
        for i in 0..rows {
            let y = y0 + i as f64 * grid;
            let sy = self.world_pos(canvas_rect.min, Point::new(0.0, y)).y;
            painter.line_segment(
                [egui::pos2(canvas_rect.min.x, sy), egui::pos2(canvas_rect.max.x, sy)],
                stroke,
            );
        }
    }

    fn draw_rack(
        &self,
        painter: &egui::Painter,
        origin: egui::Pos2,
        rack: &Rack,
        geometry: &RackGeometry,
        selected: bool,
        global_start: Option<usize>,
    ) {
        let settings = self.planner.settings();
        let zoom = self.zoom();

        let outline: Vec<egui::Pos2> = geometry.outline.iter().map(|p| self.world_pos(origin, *p)).collect();
        let fill = if self.dark_mode {
            egui::Color32::from_gray(45)
        } else {
            egui::Color32::from_gray(230)
        };
        let stroke = if selected {
            egui::Stroke::new(2.5, SELECTION_COLOR)
        } else {
            egui::Stroke::new(1.5, egui::Color32::from_gray(140))
        };
        painter.add(egui::Shape::convex_polygon(outline, fill, stroke));

        // Dashed fan segment outlines
        let segment_stroke = egui::Stroke::new(1.0, egui::Color32::from_gray(120));
        for segment in &geometry.segments {
            let mut path: Vec<egui::Pos2> = segment.iter().map(|p| self.world_pos(origin, *p)).collect();
            if let Some(first) = path.first().copied() {
                path.push(first);
            }
            painter.extend(egui::Shape::dashed_line(&path, segment_stroke, 4.0, 3.0));
        }

        for placement in &geometry.tubes {
            let Some(tube) = rack.tubes.get(placement.index) else {
                continue;
            };
            let center = self.world_pos(origin, placement.center);
            let radius = placement.diameter as f32 * zoom / 2.0;
            let [r, g, b] = tube.color.rgb();
            let fill = egui::Color32::from_rgb(r, g, b);
            let visual = tube.firework_type.visual();
            let [or, og, ob] = visual.outline;
            let outline = egui::Stroke::new((visual.width_factor * zoom).max(1.0), egui::Color32::from_rgb(or, og, ob));

            match visual.shape {
                TubeShape::Round => {
                    painter.circle_filled(center, radius, fill);
                    painter.circle_stroke(center, radius, outline);
                }
                TubeShape::Square => {
                    let rect = egui::Rect::from_center_size(center, egui::vec2(radius * 2.0, radius * 2.0));
                    painter.rect_filled(rect, 0.0, fill);
                    painter.rect_stroke(rect, 0.0, outline, StrokeKind::Inside);
                }
            }

            if settings.show_tube_numbers && radius >= 6.0 {
                let label = metrics::tube_label(rack, placement.index, global_start.unwrap_or(0));
                let font = egui::FontId::proportional((radius * 0.8).clamp(6.0, 16.0));
                painter.text(center, egui::Align2::CENTER_CENTER, label, font, label_color(fill));
            }
        }

        if settings.show_rack_names {
            let top = Point::new(
                (geometry.bounds.min_x + geometry.bounds.max_x) / 2.0,
                geometry.bounds.min_y,
            );
            let anchor = self.world_pos(origin, top);
            let text_color = if self.dark_mode {
                egui::Color32::from_gray(220)
            } else {
                egui::Color32::from_gray(40)
            };
            let font = egui::FontId::proportional((12.0 * zoom).clamp(8.0, 24.0));
            painter.text(
                anchor - egui::vec2(0.0, 4.0),
                egui::Align2::CENTER_BOTTOM,
                &rack.name,
                font,
                text_color,
            );
        }
    }

    fn draw_flow_line(&self, painter: &egui::Painter, origin: egui::Pos2, line: &FlowLine, selected: bool) {
        let zoom = self.zoom();
        let a = self.world_pos(origin, line.start());
        let b = self.world_pos(origin, line.end());
        let width = (line.width as f32 * zoom).max(1.0);
        let color = parse_color(&line.color);

        if selected {
            let halo = SELECTION_COLOR.gamma_multiply(0.5);
            painter.line_segment([a, b], egui::Stroke::new(width + 4.0, halo));
        }
        let stroke = egui::Stroke::new(width, color);
        painter.line_segment([a, b], stroke);

        // End caps perpendicular to the line
        let direction = b - a;
        if direction.length() > f32::EPSILON {
            let normal = direction.normalized().rot90() * (FLOW_LINE_CAP_LENGTH as f32 * zoom);
            painter.line_segment([a - normal, a + normal], stroke);
            painter.line_segment([b - normal, b + normal], stroke);
        }

        if !line.label.is_empty() {
            let mid = a + (b - a) * 0.5;
            let font = egui::FontId::proportional((12.0 * zoom).clamp(8.0, 24.0));
            painter.text(mid - egui::vec2(0.0, 6.0), egui::Align2::CENTER_BOTTOM, &line.label, font, color);
        }
    }

    fn draw_previews(&self, painter: &egui::Painter, origin: egui::Pos2, geometries: &HashMap<RackId, RackGeometry>) {
        let cursor = self.planner.cursor_world();
        match self.planner.mode().tool() {
            Mode::DrawingFlowLine { start: Some(start) } => {
                if let Some(cursor) = cursor {
                    let path = [self.world_pos(origin, *start), self.world_pos(origin, cursor)];
                    painter.extend(egui::Shape::dashed_line(&path, egui::Stroke::new(2.0, PREVIEW_COLOR), 6.0, 4.0));
                }
            }
            Mode::ConnectingTubes { source: Some(source) } => {
                let Some(center) = tube_center(geometries, *source) else {
                    return;
                };
                let diameter = geometries
                    .get(&source.rack_id)
                    .and_then(|g| g.tubes.iter().find(|t| t.index == source.tube_index))
                    .map_or(0.0, |t| t.diameter);
                let screen_center = self.world_pos(origin, center);
                let radius = diameter as f32 * self.zoom() / 2.0 + 3.0;
                painter.circle_stroke(screen_center, radius, egui::Stroke::new(2.0, PREVIEW_COLOR));
                if let Some(cursor) = cursor {
                    let path = [screen_center, self.world_pos(origin, cursor)];
                    painter.extend(egui::Shape::dashed_line(&path, egui::Stroke::new(2.0, PREVIEW_COLOR), 6.0, 4.0));
                }
            }
            _ => {}
        }
    }
}

/// First grid coordinate at or before `min` and the number of lines up to `max`.
///
/// `None` when the span is not finite or needs more than [`MAX_GRID_LINES`].
pub fn grid_lines(min: f64, max: f64, grid: f64) -> Option<(f64, usize)> {
    let start = (min / grid).floor() * grid;
    let count = (((max - start) / grid).floor() + 1.0).max(0.0);
    if !start.is_finite() || !count.is_finite() || count > MAX_GRID_LINES as f64 {
        return None;
    }
    Some((start, count as usize))
}

fn tube_center(geometries: &HashMap<RackId, RackGeometry>, address: TubeAddress) -> Option<Point> {
    geometries
        .get(&address.rack_id)?
        .tubes
        .iter()
        .find(|t| t.index == address.tube_index)
        .map(|t| t.center)
}

fn label_color(fill: egui::Color32) -> egui::Color32 {
    let luminance = 0.299 * fill.r() as f32 + 0.587 * fill.g() as f32 + 0.114 * fill.b() as f32;
    if luminance > 140.0 {
        egui::Color32::BLACK
    } else {
        egui::Color32::WHITE
    }
}

/// Parses a stored color string: `#rrggbb`, `#rgb`, a common color name or a
/// fuse color token. Anything else falls back to dark red.
pub fn parse_color(value: &str) -> egui::Color32 {
    let value = value.trim().to_ascii_lowercase();
    if let Some(hex) = value.strip_prefix('#') {
        if let Some(color) = parse_hex(hex) {
            return color;
        }
    }
    let named = match value.as_str() {
        "darkred" => Some((139, 0, 0)),
        "red" => Some((255, 0, 0)),
        "green" => Some((0, 128, 0)),
        "blue" => Some((0, 0, 255)),
        "black" => Some((0, 0, 0)),
        "white" => Some((255, 255, 255)),
        "gray" | "grey" => Some((128, 128, 128)),
        "purple" => Some((128, 0, 128)),
        _ => None,
    };
    if let Some((r, g, b)) = named {
        return egui::Color32::from_rgb(r, g, b);
    }
    match FuseColor::from_token(&value) {
        Some(fuse) => {
            let [r, g, b] = fuse.rgb();
            egui::Color32::from_rgb(r, g, b)
        }
        None => egui::Color32::from_rgb(139, 0, 0),
    }
}

fn parse_hex(hex: &str) -> Option<egui::Color32> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some(egui::Color32::from_rgb(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        3 => {
            let mut digits = hex.chars().map(|c| channel(&format!("{c}{c}")));
            Some(egui::Color32::from_rgb(digits.next()??, digits.next()??, digits.next()??))
        }
        _ => None,
    }
}
