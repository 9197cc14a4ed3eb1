//! World/screen transform with cursor-anchored zoom.

use crate::constants::{MAX_ZOOM, MIN_ZOOM, ZOOM_STEP};
use crate::types::Point;
use serde::{Deserialize, Serialize};

/// Direction of a zoom step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    /// Magnify by one step
    In,
    /// Shrink by one step
    Out,
}

/// Pan and zoom of the canvas.
///
/// `screen = (world - pan) * zoom`, with screen coordinates relative to the
/// canvas origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewState {
    /// Zoom factor in `[MIN_ZOOM, MAX_ZOOM]`
    #[serde(alias = "zoom_level")]
    pub zoom: f64,
    /// World x shown at the canvas origin
    #[serde(alias = "pan_offset_x")]
    pub pan_x: f64,
    /// World y shown at the canvas origin
    #[serde(alias = "pan_offset_y")]
    pub pan_y: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

impl ViewState {
    /// Maps a world point to the screen.
    pub fn world_to_screen(&self, world: Point) -> Point {
        Point::new((world.x - self.pan_x) * self.zoom, (world.y - self.pan_y) * self.zoom)
    }

    /// Maps a screen point back into the world. Exact inverse of [`Self::world_to_screen`].
    pub fn screen_to_world(&self, screen: Point) -> Point {
        Point::new(screen.x / self.zoom + self.pan_x, screen.y / self.zoom + self.pan_y)
    }

    /// Converts a screen length (pixels) to world units.
    pub fn screen_len_to_world(&self, len: f64) -> f64 {
        len / self.zoom
    }

    /// Converts a world length to screen pixels.
    pub fn world_len_to_screen(&self, len: f64) -> f64 {
        len * self.zoom
    }

    /// Sets the zoom factor while keeping the world point under `cursor` fixed.
    ///
    /// # Returns
    ///
    /// `true` if the zoom actually changed (it may already be at a limit).
    pub fn zoom_to(&mut self, cursor: Point, zoom: f64) -> bool {
        let new_zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        if (new_zoom - self.zoom).abs() <= f64::EPSILON {
            return false;
        }
        let before = self.screen_to_world(cursor);
        self.zoom = new_zoom;
        let after = self.screen_to_world(cursor);
        self.pan_x += before.x - after.x;
        self.pan_y += before.y - after.y;
        true
    }

    /// Applies one multiplicative zoom step around `cursor`.
    pub fn zoom_step(&mut self, cursor: Point, direction: ZoomDirection) -> bool {
        let target = match direction {
            ZoomDirection::In => self.zoom * ZOOM_STEP,
            ZoomDirection::Out => self.zoom / ZOOM_STEP,
        };
        self.zoom_to(cursor, target)
    }

    /// Shifts the view by a screen-space delta, so content follows the pointer.
    pub fn pan_by_screen(&mut self, dx: f64, dy: f64) {
        self.pan_x -= dx / self.zoom;
        self.pan_y -= dy / self.zoom;
    }

    /// Back to zoom 1 with the world origin at the canvas origin.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Repairs values read from an untrusted document.
    pub fn sanitized(self) -> Self {
        let zoom = if self.zoom.is_finite() && self.zoom > 0.0 {
            self.zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        };
        let finite_or_zero = |v: f64| if v.is_finite() { v } else { 0.0 };
        Self {
            zoom,
            pan_x: finite_or_zero(self.pan_x),
            pan_y: finite_or_zero(self.pan_y),
        }
    }
}

/// An in-progress pan drag.
///
/// The pan is recomputed from the absolute pointer position on every move, so
/// repeated or coalesced move events give the same result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanGesture {
    start_screen: Point,
    start_pan: (f64, f64),
}

impl PanGesture {
    /// Starts panning from `screen`.
    pub fn begin(view: &ViewState, screen: Point) -> Self {
        Self {
            start_screen: screen,
            start_pan: (view.pan_x, view.pan_y),
        }
    }

    /// Moves the view so the grabbed world point follows the pointer.
    pub fn update(&self, view: &mut ViewState, screen: Point) {
        view.pan_x = self.start_pan.0 - (screen.x - self.start_screen.x) / view.zoom;
        view.pan_y = self.start_pan.1 - (screen.y - self.start_screen.y) / view.zoom;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_transform_formula() {
        let view = ViewState {
            zoom: 2.0,
            pan_x: 10.0,
            pan_y: -5.0,
        };
        assert_eq!(view.world_to_screen(Point::new(20.0, 5.0)), Point::new(20.0, 20.0));
        assert_eq!(view.screen_to_world(Point::new(20.0, 20.0)), Point::new(20.0, 5.0));
        assert_eq!(view.screen_len_to_world(10.0), 5.0);
        assert_eq!(view.world_len_to_screen(10.0), 20.0);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut view = ViewState::default();
        for _ in 0..50 {
            view.zoom_step(Point::ZERO, ZoomDirection::In);
        }
        assert_eq!(view.zoom, MAX_ZOOM);
        assert!(!view.zoom_step(Point::ZERO, ZoomDirection::In));

        for _ in 0..100 {
            view.zoom_step(Point::ZERO, ZoomDirection::Out);
        }
        assert_eq!(view.zoom, MIN_ZOOM);
    }

    #[test]
    fn test_pan_gesture_is_idempotent() {
        let mut view = ViewState {
            zoom: 2.0,
            ..Default::default()
        };
        let gesture = PanGesture::begin(&view, Point::new(100.0, 100.0));
        gesture.update(&mut view, Point::new(140.0, 80.0));
        gesture.update(&mut view, Point::new(140.0, 80.0));
        assert_eq!((view.pan_x, view.pan_y), (-20.0, 10.0));
    }

    #[test]
    fn test_pan_by_screen_moves_content_with_pointer() {
        let mut view = ViewState::default();
        let anchor = Point::new(50.0, 50.0);
        let before = view.world_to_screen(anchor);
        view.pan_by_screen(30.0, -10.0);
        let after = view.world_to_screen(anchor);
        assert_eq!(after, Point::new(before.x + 30.0, before.y - 10.0));
    }

    #[test]
    fn test_sanitized_repairs_bad_values() {
        let view = ViewState {
            zoom: f64::NAN,
            pan_x: f64::INFINITY,
            pan_y: 3.0,
        }
        .sanitized();
        assert_eq!(view, ViewState { zoom: 1.0, pan_x: 0.0, pan_y: 3.0 });
        assert_eq!(ViewState { zoom: 50.0, ..Default::default() }.sanitized().zoom, MAX_ZOOM);
    }

    #[test]
    fn test_reads_legacy_field_names() {
        let view: ViewState =
            serde_json::from_str(r#"{"zoom_level": 1.5, "pan_offset_x": 4.0, "pan_offset_y": -2.0}"#).unwrap();
        assert_eq!(view, ViewState { zoom: 1.5, pan_x: 4.0, pan_y: -2.0 });
    }

    proptest! {
        #[test]
        fn screen_world_round_trip(
            x in -1.0e4f64..1.0e4,
            y in -1.0e4f64..1.0e4,
            zoom in MIN_ZOOM..MAX_ZOOM,
            pan_x in -1.0e4f64..1.0e4,
            pan_y in -1.0e4f64..1.0e4,
        ) {
            let view = ViewState { zoom, pan_x, pan_y };
            let p = Point::new(x, y);
            let back = view.screen_to_world(view.world_to_screen(p));
            prop_assert!((back.x - x).abs() < 1e-6);
            prop_assert!((back.y - y).abs() < 1e-6);
        }

        #[test]
        fn zoom_keeps_point_under_cursor(
            cx in 0.0f64..2000.0,
            cy in 0.0f64..2000.0,
            zoom in MIN_ZOOM..MAX_ZOOM,
            pan_x in -1.0e3f64..1.0e3,
            pan_y in -1.0e3f64..1.0e3,
            zoom_in in any::<bool>(),
        ) {
            let mut view = ViewState { zoom, pan_x, pan_y };
            let cursor = Point::new(cx, cy);
            let before = view.screen_to_world(cursor);
            let direction = if zoom_in { ZoomDirection::In } else { ZoomDirection::Out };
            view.zoom_step(cursor, direction);
            let after = view.screen_to_world(cursor);
            prop_assert!((before.x - after.x).abs() < 1e-6);
            prop_assert!((before.y - after.y).abs() < 1e-6);
            prop_assert!(view.zoom >= MIN_ZOOM && view.zoom <= MAX_ZOOM);
        }
    }
}
