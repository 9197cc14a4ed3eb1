//! Canvas input wiring.
//!
//! Translates egui pointer input into [`Planner`](crate::planner::Planner)
//! gestures. Positions are passed as canvas-relative coordinates so the
//! planner's view transform is independent of where the panel sits in the window.

use super::state::PlannerApp;
use crate::types::Point;
use crate::view::ZoomDirection;
use eframe::egui;

/// Converts a window position to canvas-relative coordinates.
pub fn to_canvas(origin: egui::Pos2, pos: egui::Pos2) -> Point {
    Point::new((pos.x - origin.x) as f64, (pos.y - origin.y) as f64)
}

/// Converts canvas-relative coordinates back to a window position.
pub fn to_window(origin: egui::Pos2, p: Point) -> egui::Pos2 {
    egui::pos2(origin.x + p.x as f32, origin.y + p.y as f32)
}

impl PlannerApp {
    /// Draws the canvas and routes pointer input on it.
    ///
    /// # Arguments
    ///
    /// * `ui` - The egui UI context
    pub fn draw_canvas(&mut self, ui: &mut egui::Ui) {
        let (response, painter) =
            ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
        self.canvas_rect = response.rect;

        self.handle_canvas_zoom(ui, &response);
        self.handle_canvas_pointer(ui, &response);

        self.render_layout(&painter, response.rect);
    }

    /// One zoom step per wheel notch, anchored on the cursor.
    pub fn handle_canvas_zoom(&mut self, ui: &mut egui::Ui, response: &egui::Response) {
        let scroll = ui.input(|i| i.raw_scroll_delta.y);
        if scroll == 0.0 {
            return;
        }
        let Some(pos) = ui.input(|i| i.pointer.hover_pos()) else {
            return;
        };
        if !response.rect.contains(pos) {
            return;
        }
        let direction = if scroll > 0.0 {
            ZoomDirection::In
        } else {
            ZoomDirection::Out
        };
        self.planner
            .zoom_at(to_canvas(response.rect.min, pos), direction);
    }

    /// Handles presses, drags and releases.
    ///
    /// Primary button selects, drags racks, places flow line endpoints and picks
    /// tubes; with Alt or Shift it cycles the color of a tube in the selected
    /// rack; with Cmd/Ctrl it toggles selection. Middle or secondary drag pans.
    pub fn handle_canvas_pointer(&mut self, ui: &mut egui::Ui, response: &egui::Response) {
        let origin = response.rect.min;
        let (pos, modifiers, primary_pressed, primary_down, pan_pressed, pan_down) = ui.input(|i| {
            (
                i.pointer.latest_pos(),
                i.modifiers,
                i.pointer.primary_pressed(),
                i.pointer.primary_down(),
                i.pointer.button_pressed(egui::PointerButton::Middle)
                    || i.pointer.button_pressed(egui::PointerButton::Secondary),
                i.pointer.middle_down() || i.pointer.secondary_down(),
            )
        });
        let Some(pos) = pos else {
            return;
        };
        let p = to_canvas(origin, pos);
        let inside = response.rect.contains(pos);

        // Panning
        if pan_pressed && inside && !self.pointer.panning {
            self.pointer.panning = self.planner.begin_pan(p);
        } else if self.pointer.panning {
            if pan_down {
                self.planner.drag(p);
            } else {
                self.planner.end_pan();
                self.pointer.panning = false;
            }
            return;
        }

        // Primary button
        if primary_pressed && inside {
            self.pointer.primary_active = true;
            if modifiers.alt || modifiers.shift {
                match self.planner.cycle_tube_color_at(p) {
                    Ok(Some((address, color))) => {
                        self.status = Some(format!("Tube {} set to {}", address.tube_index + 1, color.name()));
                    }
                    Ok(None) => {}
                    Err(err) => self.show_error(err),
                }
            } else if let Err(err) = self.planner.press(p, modifiers.command) {
                self.show_error(err);
            }
        } else if self.pointer.primary_active {
            if primary_down {
                self.planner.drag(p);
            } else {
                self.planner.release(p);
                self.pointer.primary_active = false;
            }
        } else if inside {
            self.planner.hover(p);
        }
    }
}
