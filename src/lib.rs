//! # Firework Planner
//!
//! A visual editor for laying out firework racks on a 2D canvas. Two kinds of
//! racks are supported:
//! - **Crates**: a rectangular grid of tubes
//! - **Fans**: parallel segments of tubes with padding between segments
//!
//! ## Features
//! - Rack creation, selection, dragging with grid and edge snapping
//! - Quarter-turn rotation, duplication and deletion
//! - Per-tube fuse color, firework type, cue and lift time
//! - Flow lines and tube-to-tube connections
//! - Canvas panning and cursor-anchored zooming
//! - Bounded undo/redo
//! - Fuse length and show duration estimates
//! - JSON layout documents

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod error;
pub mod geometry;
pub mod history;
pub mod metrics;
pub mod persistence;
pub mod planner;
pub mod types;
pub mod view;
mod ui;

// Re-export the types most callers need
pub use error::{LayoutError, PlannerError, Result};
pub use metrics::{RackSummary, ShowSummary};
pub use persistence::{LayoutDocument, LoadReport};
pub use planner::{DeletionTarget, Mode, Planner, PlannerSettings, RackParams};
pub use types::*;
pub use view::{ViewState, ZoomDirection};
use ui::PlannerApp;

/// Runs the planner application with default window options.
///
/// State saved by a previous session is restored when present.
///
/// # Returns
///
/// Returns `Ok(())` if the application runs successfully, or an `eframe::Error` if
/// initialization fails.
///
/// # Example
///
/// ```no_run
/// use firework_planner::run_app;
///
/// fn main() -> Result<(), eframe::Error> {
///     run_app()
/// }
/// ```
pub fn run_app() -> std::result::Result<(), eframe::Error> {
    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Firework Rack Planner",
        options,
        Box::new(|cc| {
            let app = cc
                .storage
                .and_then(|storage| storage.get_string(ui::APP_STATE_KEY))
                .and_then(|json| match PlannerApp::from_json(&json) {
                    Ok(app) => Some(app),
                    Err(err) => {
                        log::warn!("Ignoring saved app state: {err}");
                        None
                    }
                })
                .unwrap_or_default();
            Ok(Box::new(app))
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_default() {
        let layout = Layout::default();
        assert!(layout.racks.is_empty());
        assert!(layout.flow_lines.is_empty());
        assert!(layout.connections.is_empty());
    }

    #[test]
    fn test_planner_starts_idle() {
        let planner = Planner::new();
        assert!(matches!(planner.mode(), Mode::Idle));
        assert!(!planner.can_undo());
        assert_eq!(planner.view().zoom, 1.0);
    }
}
