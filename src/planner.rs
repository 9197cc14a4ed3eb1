//! The editor core: pointer gestures, tool modes and every layout command.
//!
//! [`Planner`] owns the layout, view, selection and history. All positions it
//! receives from the pointer are canvas-relative screen coordinates; they are
//! converted to world space through the current [`ViewState`] before any hit
//! test. Every command that changes the layout validates first, then records a
//! history snapshot, then mutates.

use crate::constants::*;
use crate::error::{LayoutError, PlannerError, Result};
use crate::geometry::{self, RackGeometry};
use crate::history::{History, Snapshot};
use crate::metrics::{self, RackSummary, ShowSummary};
use crate::persistence::{self, LoadReport};
use crate::types::*;
use crate::view::{PanGesture, ViewState, ZoomDirection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// User-adjustable editor options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Round dragged rack positions to the grid
    pub snap_to_grid: bool,
    /// Grid cell size in world units
    pub grid_size: f64,
    /// Align dragged rack edges with nearby racks
    pub snap_to_racks: bool,
    /// Draw tube numbers (or cues) and number tubes globally
    pub show_tube_numbers: bool,
    /// Draw rack names above racks
    pub show_rack_names: bool,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            snap_to_grid: false,
            grid_size: DEFAULT_GRID_SIZE,
            snap_to_racks: false,
            show_tube_numbers: true,
            show_rack_names: false,
        }
    }
}

/// State of an in-progress rack drag.
#[derive(Debug, Clone, PartialEq)]
pub struct RackDrag {
    primary: RackId,
    grab_offset: Point,
    start_positions: Vec<(RackId, Point)>,
    pending: Box<Snapshot>,
}

impl RackDrag {
    /// The rack under the pointer when the drag started.
    pub fn primary(&self) -> RackId {
        self.primary
    }

    /// Ids of every rack moving with the drag.
    pub fn rack_ids(&self) -> impl Iterator<Item = RackId> + '_ {
        self.start_positions.iter().map(|(id, _)| *id)
    }

    fn start_of(&self, id: RackId) -> Option<Point> {
        self.start_positions
            .iter()
            .find(|(rid, _)| *rid == id)
            .map(|(_, p)| *p)
    }
}

/// Current interaction mode. Exactly one is active.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Mode {
    /// Plain selection
    #[default]
    Idle,
    /// Moving one or more racks
    DraggingRack(RackDrag),
    /// Placing a flow line; `start` is set after the first click
    DrawingFlowLine {
        /// First endpoint, in world space
        start: Option<Point>,
    },
    /// Linking tubes; `source` is set after the first tube click
    ConnectingTubes {
        /// Tube picked as the connection source
        source: Option<TubeAddress>,
    },
    /// Moving the view; the tool mode underneath resumes afterwards
    Panning {
        /// Pan anchor
        gesture: PanGesture,
        /// Mode to return to when the pan ends
        resume: Box<Mode>,
    },
}

impl Mode {
    /// The tool mode, looking through an active pan.
    pub fn tool(&self) -> &Mode {
        match self {
            Mode::Panning { resume, .. } => resume.tool(),
            other => other,
        }
    }

    /// Whether flow line drawing is on.
    pub fn is_drawing_flow_line(&self) -> bool {
        matches!(self.tool(), Mode::DrawingFlowLine { .. })
    }

    /// Whether tube connecting is on.
    pub fn is_connecting_tubes(&self) -> bool {
        matches!(self.tool(), Mode::ConnectingTubes { .. })
    }
}

/// Parameters for a new rack.
#[derive(Debug, Clone, PartialEq)]
pub struct RackParams {
    /// Name; blank names are replaced by a generated one
    pub name: String,
    /// Layout archetype
    pub rack_type: RackType,
    /// Columns (fan segments)
    pub cols: usize,
    /// Rows (tubes per segment)
    pub rows: usize,
    /// Tube diameter in world units
    pub tube_diameter: f64,
    /// World position of the rack center
    pub pos: Point,
    /// Initial orientation
    pub rotation: Rotation,
}

impl Default for RackParams {
    fn default() -> Self {
        Self {
            name: String::new(),
            rack_type: RackType::Crate,
            cols: 3,
            rows: 2,
            tube_diameter: DEFAULT_TUBE_DIAMETER,
            pos: Point::new(DEFAULT_RACK_POS.0, DEFAULT_RACK_POS.1),
            rotation: Rotation::Deg0,
        }
    }
}

/// Result of [`Planner::add_rack`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AddedRack {
    /// Id of the new rack
    pub id: RackId,
    /// Suggested position for the next rack, to the right of this one
    pub next_pos: Point,
}

/// What [`Planner::delete_selected`] is about to remove, for confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum DeletionTarget {
    /// The selected racks
    Racks {
        /// Ids of the racks
        ids: Vec<RackId>,
        /// Names of the racks
        names: Vec<String>,
        /// Connections that will be removed with them
        connections: usize,
    },
    /// The selected flow line
    FlowLine(FlowLineId),
}

/// The editor core.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    layout: Layout,
    view: ViewState,
    selection: SelectionState,
    history: History,
    mode: Mode,
    settings: PlannerSettings,
    cursor: Option<Point>,
}

impl Planner {
    /// Creates an empty planner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a planner with the given settings.
    pub fn with_settings(settings: PlannerSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    // ---- queries -------------------------------------------------------

    /// The scene.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Pan and zoom.
    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Selected racks or flow line.
    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Current interaction mode.
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Editor options.
    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Editor options, for toggles.
    pub fn settings_mut(&mut self) -> &mut PlannerSettings {
        &mut self.settings
    }

    /// Whether an undo step is available.
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Whether a redo step is available.
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Last known pointer position in world space.
    pub fn cursor_world(&self) -> Option<Point> {
        self.cursor
    }

    /// Looks up a rack.
    pub fn rack_by_id(&self, id: RackId) -> Option<&Rack> {
        self.layout.rack_by_id(id)
    }

    /// Looks up a flow line.
    pub fn line_by_id(&self, id: FlowLineId) -> Option<&FlowLine> {
        self.layout.line_by_id(id)
    }

    /// World-space geometry of a rack.
    pub fn rack_geometry(&self, id: RackId) -> Option<RackGeometry> {
        self.layout.rack_by_id(id).map(geometry::rack_geometry)
    }

    /// Maps a world point to canvas coordinates.
    pub fn world_to_screen(&self, world: Point) -> Point {
        self.view.world_to_screen(world)
    }

    /// Maps canvas coordinates to a world point.
    pub fn screen_to_world(&self, screen: Point) -> Point {
        self.view.screen_to_world(screen)
    }

    /// Tube counts, fuse estimate and duration for the whole layout.
    pub fn summary(&self) -> ShowSummary {
        metrics::show_summary(&self.layout)
    }

    /// Rack inspector rows.
    pub fn rack_summaries(&self) -> Vec<RackSummary> {
        metrics::rack_summaries(&self.layout, self.settings.show_tube_numbers)
    }

    /// Global start index per rack, or an empty map when numbering is off.
    pub fn tube_numbering(&self) -> HashMap<RackId, usize> {
        if self.settings.show_tube_numbers {
            metrics::global_start_indices(&self.layout)
        } else {
            HashMap::new()
        }
    }

    /// Topmost flow line near a canvas point.
    pub fn flow_line_at_screen(&self, screen: Point) -> Option<FlowLineId> {
        let world = self.view.screen_to_world(screen);
        let tolerance = self.view.screen_len_to_world(LINE_CLICK_HALO_PX);
        geometry::flow_line_at(&self.layout.flow_lines, world, tolerance)
    }

    /// Topmost rack under a canvas point.
    pub fn rack_at_screen(&self, screen: Point) -> Option<RackId> {
        let world = self.view.screen_to_world(screen);
        geometry::rack_at(&self.layout.racks, world).map(|r| r.id)
    }

    /// Topmost tube under a canvas point.
    pub fn tube_at_screen(&self, screen: Point) -> Option<TubeAddress> {
        let world = self.view.screen_to_world(screen);
        self.tube_at_world(world)
    }

    fn tube_at_world(&self, world: Point) -> Option<TubeAddress> {
        self.layout.racks.iter().rev().find_map(|rack| {
            geometry::rack_geometry(rack)
                .tube_at(world)
                .map(|tube_index| TubeAddress {
                    rack_id: rack.id,
                    tube_index,
                })
        })
    }

    // ---- history -------------------------------------------------------

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            layout: self.layout.clone(),
            view: self.view,
            selection: self.selection.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.layout = snapshot.layout;
        self.view = snapshot.view;
        self.selection = snapshot.selection;
        self.mode = Mode::Idle;
    }

    fn record(&mut self) {
        let snapshot = self.snapshot();
        self.history.record(snapshot);
    }

    /// Steps back one recorded action.
    ///
    /// # Returns
    ///
    /// `false` if there was nothing to undo; state is then unchanged.
    pub fn undo(&mut self) -> bool {
        let current = self.snapshot();
        match self.history.undo(current) {
            Some(previous) => {
                self.restore(previous);
                true
            }
            None => {
                log::debug!("Nothing to undo");
                false
            }
        }
    }

    /// Re-applies the last undone action. Returns `false` if there was none.
    pub fn redo(&mut self) -> bool {
        let current = self.snapshot();
        match self.history.redo(current) {
            Some(next) => {
                self.restore(next);
                true
            }
            None => {
                log::debug!("Nothing to redo");
                false
            }
        }
    }

    // ---- pointer gestures ----------------------------------------------

    /// Primary button pressed at a canvas point.
    ///
    /// In selection mode this picks a flow line, else a rack (starting a drag),
    /// else clears the selection unless `additive` is set. In the drawing modes it
    /// places line endpoints or picks tubes.
    pub fn press(&mut self, screen: Point, additive: bool) -> Result<()> {
        let world = self.view.screen_to_world(screen);
        self.cursor = Some(world);
        match &self.mode {
            Mode::Idle => {
                self.press_select(world, additive);
                Ok(())
            }
            Mode::DrawingFlowLine { start } => {
                let start = *start;
                self.press_flow_line(start, world)
            }
            Mode::ConnectingTubes { source } => {
                let source = *source;
                self.press_connect(source, world)
            }
            // A gesture is already running.
            Mode::DraggingRack(_) | Mode::Panning { .. } => Ok(()),
        }
    }

    fn press_select(&mut self, world: Point, additive: bool) {
        let tolerance = self.view.screen_len_to_world(LINE_CLICK_HALO_PX);
        if let Some(line_id) = geometry::flow_line_at(&self.layout.flow_lines, world, tolerance) {
            // Flow lines do not join a multi-selection
            if additive {
                self.selection.clear_racks();
            } else {
                self.selection.select_flow_line(line_id);
            }
            return;
        }

        let Some(rack_id) = geometry::rack_at(&self.layout.racks, world).map(|r| r.id) else {
            if !additive {
                self.selection.clear();
            }
            return;
        };

        let pending = Box::new(self.snapshot());
        let selected = if additive {
            self.selection.toggle_rack(rack_id)
        } else {
            if !self.selection.contains_rack(rack_id) {
                self.selection.select_rack(rack_id);
            }
            true
        };
        if !selected {
            return;
        }

        let group = self.selection.racks().to_vec();
        self.layout.raise_to_top(&group, Some(rack_id));
        let start_positions: Vec<(RackId, Point)> = group
            .iter()
            .filter_map(|id| self.layout.rack_by_id(*id).map(|r| (*id, r.pos)))
            .collect();
        let Some(primary_pos) = self.layout.rack_by_id(rack_id).map(|r| r.pos) else {
            return;
        };
        self.mode = Mode::DraggingRack(RackDrag {
            primary: rack_id,
            grab_offset: world - primary_pos,
            start_positions,
            pending,
        });
    }

    fn press_flow_line(&mut self, start: Option<Point>, world: Point) -> Result<()> {
        let Some(start) = start else {
            self.mode = Mode::DrawingFlowLine { start: Some(world) };
            return Ok(());
        };
        if self.view.world_len_to_screen(start.distance(world)) < MIN_LINE_LENGTH_PX {
            return Err(PlannerError::LineTooShort);
        }
        self.record();
        let id = self.layout.add_flow_line(FlowLine::new(start, world));
        self.mode = Mode::Idle;
        log::info!("Added flow line {id}");
        Ok(())
    }

    fn press_connect(&mut self, source: Option<TubeAddress>, world: Point) -> Result<()> {
        let Some(target) = self.tube_at_world(world) else {
            self.mode = Mode::ConnectingTubes { source: None };
            return Ok(());
        };
        let Some(source) = source else {
            self.mode = Mode::ConnectingTubes {
                source: Some(target),
            };
            return Ok(());
        };
        self.connect_tubes(source, target)?;
        self.mode = Mode::ConnectingTubes { source: None };
        Ok(())
    }

    /// Pointer moved with the primary button held (or while panning).
    ///
    /// Positions are recomputed from the absolute pointer location, so replaying
    /// the same event is harmless.
    pub fn drag(&mut self, screen: Point) {
        let world = self.view.screen_to_world(screen);
        self.cursor = Some(world);
        match &self.mode {
            Mode::DraggingRack(drag) => {
                let moves = self.drag_targets(drag, world);
                for (id, pos) in moves {
                    if let Some(rack) = self.layout.rack_by_id_mut(id) {
                        rack.pos = pos;
                    }
                }
            }
            Mode::Panning { gesture, .. } => {
                let gesture = *gesture;
                gesture.update(&mut self.view, screen);
                self.cursor = Some(self.view.screen_to_world(screen));
            }
            _ => {}
        }
    }

    /// Pointer moved without a button; only updates previews.
    pub fn hover(&mut self, screen: Point) {
        self.cursor = Some(self.view.screen_to_world(screen));
    }

    fn drag_targets(&self, drag: &RackDrag, world: Point) -> Vec<(RackId, Point)> {
        let (Some(primary), Some(primary_start)) =
            (self.layout.rack_by_id(drag.primary), drag.start_of(drag.primary))
        else {
            return Vec::new();
        };
        let mut target = world - drag.grab_offset;
        if self.settings.snap_to_grid && self.settings.grid_size > 0.0 {
            target = snap_to_grid(target, self.settings.grid_size);
        }
        if self.settings.snap_to_racks {
            let group: Vec<RackId> = drag.rack_ids().collect();
            let threshold = self.view.screen_len_to_world(SNAP_THRESHOLD_PX);
            target = snap_to_racks(&self.layout.racks, primary, &group, target, threshold);
        }
        let delta = target - primary_start;
        drag.start_positions
            .iter()
            .map(|(id, start)| (*id, *start + delta))
            .collect()
    }

    /// Primary button released.
    ///
    /// Ends a rack drag; the snapshot taken at press time is kept only if some
    /// rack actually moved.
    pub fn release(&mut self, screen: Point) {
        if !matches!(self.mode, Mode::DraggingRack(_)) {
            return;
        }
        self.drag(screen);
        if let Mode::DraggingRack(drag) = std::mem::take(&mut self.mode) {
            let moved = drag.start_positions.iter().any(|(id, start)| {
                self.layout
                    .rack_by_id(*id)
                    .is_some_and(|rack| rack.pos != *start)
            });
            if moved {
                self.history.record(*drag.pending);
                log::debug!("Moved {} rack(s)", drag.start_positions.len());
            }
        }
    }

    /// Abandons the current gesture.
    ///
    /// A rack drag snaps back to where it started without a history entry; the
    /// drawing modes forget their first click.
    pub fn cancel_gesture(&mut self) {
        match std::mem::take(&mut self.mode) {
            Mode::DraggingRack(drag) => {
                for (id, start) in drag.start_positions {
                    if let Some(rack) = self.layout.rack_by_id_mut(id) {
                        rack.pos = start;
                    }
                }
            }
            Mode::DrawingFlowLine { .. } => self.mode = Mode::DrawingFlowLine { start: None },
            Mode::ConnectingTubes { .. } => self.mode = Mode::ConnectingTubes { source: None },
            Mode::Panning { resume, .. } => self.mode = *resume,
            Mode::Idle => {}
        }
    }

    /// Starts panning at a canvas point. Not allowed during a rack drag.
    pub fn begin_pan(&mut self, screen: Point) -> bool {
        if matches!(self.mode, Mode::DraggingRack(_) | Mode::Panning { .. }) {
            return false;
        }
        let gesture = PanGesture::begin(&self.view, screen);
        let resume = Box::new(std::mem::take(&mut self.mode));
        self.mode = Mode::Panning { gesture, resume };
        true
    }

    /// Ends panning and returns to the previous tool mode.
    pub fn end_pan(&mut self) {
        if let Mode::Panning { resume, .. } = &mut self.mode {
            let resumed = std::mem::take(&mut **resume);
            self.mode = resumed;
        }
    }

    /// One zoom step around a canvas point.
    pub fn zoom_at(&mut self, screen: Point, direction: ZoomDirection) -> bool {
        self.view.zoom_step(screen, direction)
    }

    /// Back to zoom 1 with no pan. Not recorded in history.
    pub fn reset_view(&mut self) {
        self.view.reset();
    }

    /// Advances the color of the tube under the pointer.
    ///
    /// Works only on the single selected rack.
    ///
    /// # Returns
    ///
    /// The tube and its new color, or `None` if the pointer is not over one of
    /// the selected rack's tubes.
    pub fn cycle_tube_color_at(&mut self, screen: Point) -> Result<Option<(TubeAddress, FuseColor)>> {
        if self.mode.is_drawing_flow_line() || self.mode.is_connecting_tubes() {
            return Ok(None);
        }
        let rack_id = self.selection.single_rack().ok_or(PlannerError::RequiresSingleRack)?;
        let rack = self
            .layout
            .rack_by_id(rack_id)
            .ok_or(PlannerError::RackNotFound(rack_id))?;
        let world = self.view.screen_to_world(screen);
        let Some(tube_index) = geometry::rack_geometry(rack).tube_at(world) else {
            return Ok(None);
        };
        let address = TubeAddress { rack_id, tube_index };
        let Some(color) = self.layout.resolve_tube(address).map(|t| t.color.next()) else {
            return Ok(None);
        };
        self.record();
        if let Some(tube) = self.layout.resolve_tube_mut(address) {
            tube.color = color;
        }
        Ok(Some((address, color)))
    }

    // ---- modes ---------------------------------------------------------

    fn can_switch_tool(&self) -> bool {
        !matches!(self.mode, Mode::DraggingRack(_) | Mode::Panning { .. })
    }

    /// Turns flow line drawing on or off. Turning it on clears the selection and
    /// ends tube connecting.
    pub fn set_flow_line_mode(&mut self, on: bool) -> bool {
        if !self.can_switch_tool() || on == self.mode.is_drawing_flow_line() {
            return false;
        }
        if on {
            self.selection.clear();
            self.mode = Mode::DrawingFlowLine { start: None };
        } else {
            self.mode = Mode::Idle;
        }
        true
    }

    /// Turns tube connecting on or off. Turning it on clears the selection and
    /// ends flow line drawing.
    pub fn set_connect_mode(&mut self, on: bool) -> bool {
        if !self.can_switch_tool() || on == self.mode.is_connecting_tubes() {
            return false;
        }
        if on {
            self.selection.clear();
            self.mode = Mode::ConnectingTubes { source: None };
        } else {
            self.mode = Mode::Idle;
        }
        true
    }

    fn leave_drawing_modes(&mut self) {
        if self.mode.is_drawing_flow_line() || self.mode.is_connecting_tubes() {
            self.mode = Mode::Idle;
        }
    }

    // ---- selection -----------------------------------------------------

    /// Selects racks from an external list. Unknown ids are ignored.
    pub fn select_racks(&mut self, ids: impl IntoIterator<Item = RackId>) {
        let known: Vec<RackId> = ids
            .into_iter()
            .filter(|id| self.layout.rack_by_id(*id).is_some())
            .collect();
        self.selection.set_racks(known);
    }

    /// Selects a flow line.
    pub fn select_flow_line(&mut self, id: FlowLineId) -> Result<()> {
        self.layout
            .line_by_id(id)
            .ok_or(PlannerError::FlowLineNotFound(id))?;
        self.selection.select_flow_line(id);
        Ok(())
    }

    /// Clears the selection.
    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    fn selected_racks_for(&self, action: &'static str) -> Result<Vec<RackId>> {
        if self.selection.flow_line().is_some() {
            return Err(PlannerError::NotApplicableToFlowLine(action));
        }
        let ids: Vec<RackId> = self
            .selection
            .racks()
            .iter()
            .copied()
            .filter(|id| self.layout.rack_by_id(*id).is_some())
            .collect();
        if ids.is_empty() {
            return Err(PlannerError::NoRackSelected);
        }
        Ok(ids)
    }

    // ---- rack commands -------------------------------------------------

    /// Adds a rack and selects it.
    pub fn add_rack(&mut self, params: RackParams) -> Result<AddedRack> {
        Rack::validate_params(params.cols, params.rows, params.tube_diameter)?;
        if !params.pos.x.is_finite() || !params.pos.y.is_finite() {
            return Err(PlannerError::InvalidRackParameters {
                reason: "position must be finite".into(),
            });
        }
        let name = match params.name.trim() {
            "" => format!("{} Rack {}", params.rack_type.label(), self.layout.racks.len() + 1),
            name => name.to_string(),
        };
        let mut rack = Rack::new(
            name,
            params.rack_type,
            params.cols,
            params.rows,
            params.pos,
            params.tube_diameter,
        );
        rack.rotation = params.rotation;
        let width = geometry::rack_bounds(&rack).width();

        self.record();
        let id = self.layout.add_rack(rack);
        self.selection.select_rack(id);
        self.leave_drawing_modes();
        log::info!("Added {} rack {id}", params.rack_type.label());

        Ok(AddedRack {
            id,
            next_pos: Point::new(params.pos.x + width + DEFAULT_RACK_SEPARATION, params.pos.y),
        })
    }

    /// Rotates every selected rack a quarter turn. Positions are unchanged.
    pub fn rotate_selected(&mut self) -> Result<usize> {
        let ids = self.selected_racks_for("rotation")?;
        self.record();
        for id in &ids {
            if let Some(rack) = self.layout.rack_by_id_mut(*id) {
                rack.rotation = rack.rotation.next();
            }
        }
        Ok(ids.len())
    }

    /// Copies every selected rack with a staggered offset and selects the copies.
    pub fn duplicate_selected(&mut self) -> Result<Vec<RackId>> {
        let ids = self.selected_racks_for("duplication")?;
        let copies: Vec<Rack> = ids
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                let original = self.layout.rack_by_id(*id)?;
                let offset = self
                    .view
                    .screen_len_to_world(DUPLICATE_OFFSET + i as f64 * DUPLICATE_OFFSET_INCREMENT);
                let mut copy = original.duplicate();
                copy.name = format!("{} (Copy)", original.name);
                copy.pos = original.pos + Point::new(offset, offset);
                Some(copy)
            })
            .collect();

        self.record();
        let new_ids: Vec<RackId> = copies.into_iter().map(|r| self.layout.add_rack(r)).collect();
        self.selection.set_racks(new_ids.iter().copied());
        log::info!("Duplicated {} rack(s)", new_ids.len());
        Ok(new_ids)
    }

    /// Describes what [`Planner::delete_selected`] would remove.
    pub fn deletion_target(&self) -> Result<DeletionTarget> {
        if let Some(line_id) = self.selection.flow_line() {
            self.layout
                .line_by_id(line_id)
                .ok_or(PlannerError::FlowLineNotFound(line_id))?;
            return Ok(DeletionTarget::FlowLine(line_id));
        }
        let ids = self.selected_racks_for("deletion").map_err(|err| match err {
            PlannerError::NoRackSelected => PlannerError::NoItemSelected,
            other => other,
        })?;
        let names = ids
            .iter()
            .filter_map(|id| self.layout.rack_by_id(*id).map(|r| r.name.clone()))
            .collect();
        let connections = self
            .layout
            .connections
            .iter()
            .filter(|c| ids.iter().any(|id| c.touches(*id)))
            .count();
        Ok(DeletionTarget::Racks {
            ids,
            names,
            connections,
        })
    }

    /// Deletes the selected flow line or racks after the caller confirms.
    ///
    /// Deleting racks removes every connection touching them.
    ///
    /// # Arguments
    ///
    /// * `confirm` - Asked with a description of what will be removed; returning
    ///   `false` cancels without changing anything
    pub fn delete_selected(&mut self, confirm: impl FnOnce(&DeletionTarget) -> bool) -> Result<usize> {
        let target = self.deletion_target()?;
        if !confirm(&target) {
            return Err(PlannerError::DeletionCancelled);
        }

        self.record();
        self.selection.clear();
        match target {
            DeletionTarget::FlowLine(line_id) => {
                self.layout.remove_flow_line(line_id);
                log::info!("Deleted flow line {line_id}");
                Ok(1)
            }
            DeletionTarget::Racks { ids, .. } => {
                for id in &ids {
                    self.layout.remove_rack(*id);
                }
                if matches!(self.mode, Mode::DraggingRack(_)) {
                    self.mode = Mode::Idle;
                }
                log::info!("Deleted {} rack(s)", ids.len());
                Ok(ids.len())
            }
        }
    }

    /// Moves every selected rack by a world-space offset.
    pub fn nudge_selected(&mut self, dx: f64, dy: f64) -> Result<usize> {
        let ids = self.selected_racks_for("nudge")?;
        self.record();
        for id in &ids {
            if let Some(rack) = self.layout.rack_by_id_mut(*id) {
                rack.pos = rack.pos + Point::new(dx, dy);
            }
        }
        Ok(ids.len())
    }

    fn edit_rack(&mut self, id: RackId, edit: impl FnOnce(&mut Rack)) -> Result<bool> {
        let current = self
            .layout
            .rack_by_id(id)
            .ok_or(PlannerError::RackNotFound(id))?;
        let mut edited = current.clone();
        edit(&mut edited);
        if edited == *current {
            return Ok(false);
        }
        self.record();
        if let Some(rack) = self.layout.rack_by_id_mut(id) {
            *rack = edited;
        }
        Ok(true)
    }

    /// Renames a rack. Returns `false` if the name did not change.
    pub fn rename_rack(&mut self, id: RackId, name: &str) -> Result<bool> {
        let name = name.trim().to_string();
        self.edit_rack(id, |rack| rack.name = name)
    }

    /// Moves a rack to an exact world position.
    pub fn set_rack_position(&mut self, id: RackId, pos: Point) -> Result<bool> {
        if !pos.x.is_finite() || !pos.y.is_finite() {
            return Err(PlannerError::InvalidRackParameters {
                reason: "position must be finite".into(),
            });
        }
        self.edit_rack(id, |rack| rack.pos = pos)
    }

    /// Sets a rack's orientation.
    pub fn set_rack_rotation(&mut self, id: RackId, rotation: Rotation) -> Result<bool> {
        self.edit_rack(id, |rack| rack.rotation = rotation)
    }

    fn check_tube_indices(&self, id: RackId, indices: &[usize]) -> Result<()> {
        let rack = self
            .layout
            .rack_by_id(id)
            .ok_or(PlannerError::RackNotFound(id))?;
        match indices.iter().find(|i| **i >= rack.tubes.len()) {
            Some(index) => Err(PlannerError::TubeIndexOutOfRange {
                index: *index,
                len: rack.tubes.len(),
            }),
            None => Ok(()),
        }
    }

    /// Sets the fuse color of several tubes as one undoable step.
    pub fn set_tube_colors(&mut self, id: RackId, indices: &[usize], color: FuseColor) -> Result<bool> {
        self.check_tube_indices(id, indices)?;
        self.edit_rack(id, |rack| {
            for i in indices {
                rack.tubes[*i].color = color;
            }
        })
    }

    /// Sets the firework type of several tubes as one undoable step.
    pub fn set_tube_types(&mut self, id: RackId, indices: &[usize], firework_type: FireworkType) -> Result<bool> {
        self.check_tube_indices(id, indices)?;
        self.edit_rack(id, |rack| {
            for i in indices {
                rack.tubes[*i].firework_type = firework_type;
            }
        })
    }

    /// Sets a tube's cue label.
    pub fn set_tube_cue(&mut self, id: RackId, index: usize, cue: &str) -> Result<bool> {
        self.check_tube_indices(id, &[index])?;
        let cue = cue.trim().to_string();
        self.edit_rack(id, |rack| rack.tubes[index].cue = cue)
    }

    /// Sets a tube's lift time in seconds.
    pub fn set_tube_lift_time(&mut self, id: RackId, index: usize, seconds: f64) -> Result<bool> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(PlannerError::InvalidRackParameters {
                reason: "lift time must be a non-negative number".into(),
            });
        }
        self.check_tube_indices(id, &[index])?;
        self.edit_rack(id, |rack| rack.tubes[index].lift_time = seconds)
    }

    /// Removes every rack and therefore every connection.
    pub fn clear_racks(&mut self) -> Result<usize> {
        if self.layout.racks.is_empty() {
            return Err(PlannerError::NothingToClear("racks"));
        }
        self.record();
        let count = self.layout.racks.len();
        self.layout.racks.clear();
        self.layout.connections.clear();
        self.selection.retain_existing(&self.layout);
        Ok(count)
    }

    // ---- flow lines and connections --------------------------------------

    fn edit_line(&mut self, id: FlowLineId, edit: impl FnOnce(&mut FlowLine)) -> Result<bool> {
        let current = self
            .layout
            .line_by_id(id)
            .ok_or(PlannerError::FlowLineNotFound(id))?;
        let mut edited = current.clone();
        edit(&mut edited);
        if edited == *current {
            return Ok(false);
        }
        self.record();
        if let Some(line) = self.layout.line_by_id_mut(id) {
            *line = edited;
        }
        Ok(true)
    }

    /// Sets a flow line's label.
    pub fn set_flow_line_label(&mut self, id: FlowLineId, label: &str) -> Result<bool> {
        let label = label.trim().to_string();
        self.edit_line(id, |line| line.label = label)
    }

    /// Sets a flow line's color.
    pub fn set_flow_line_color(&mut self, id: FlowLineId, color: &str) -> Result<bool> {
        let color = color.trim().to_string();
        self.edit_line(id, |line| line.color = color)
    }

    /// Removes every flow line.
    pub fn clear_flow_lines(&mut self) -> Result<usize> {
        if self.layout.flow_lines.is_empty() {
            return Err(PlannerError::NothingToClear("flow lines"));
        }
        self.record();
        let count = self.layout.flow_lines.len();
        self.layout.flow_lines.clear();
        self.selection.retain_existing(&self.layout);
        Ok(count)
    }

    /// Connects two tubes.
    pub fn connect_tubes(&mut self, source: TubeAddress, target: TubeAddress) -> Result<ConnectionId> {
        if source == target {
            return Err(PlannerError::SelfConnection);
        }
        self.check_tube_indices(source.rack_id, &[source.tube_index])?;
        self.check_tube_indices(target.rack_id, &[target.tube_index])?;

        self.record();
        let id = self.layout.add_connection(source, target)?;
        log::info!(
            "Connected tube {} to tube {}",
            source.tube_index + 1,
            target.tube_index + 1
        );
        Ok(id)
    }

    /// Removes one connection. Returns `false` if it did not exist.
    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        if !self.layout.connections.iter().any(|c| c.id == id) {
            return false;
        }
        self.record();
        self.layout.remove_connection(id)
    }

    /// Removes every tube connection.
    pub fn clear_connections(&mut self) -> Result<usize> {
        if self.layout.connections.is_empty() {
            return Err(PlannerError::NothingToClear("tube connections"));
        }
        self.record();
        let count = self.layout.connections.len();
        self.layout.connections.clear();
        if self.mode.is_connecting_tubes() {
            self.mode = Mode::ConnectingTubes { source: None };
        }
        Ok(count)
    }

    // ---- settings ------------------------------------------------------

    /// Sets the snap grid size.
    pub fn set_grid_size(&mut self, size: f64) -> Result<()> {
        if !size.is_finite() || size <= 0.0 {
            return Err(PlannerError::InvalidGridSize(size));
        }
        self.settings.grid_size = size;
        Ok(())
    }

    // ---- documents -----------------------------------------------------

    /// Serializes the layout and current view.
    pub fn to_json(&self) -> std::result::Result<String, LayoutError> {
        persistence::to_json(&self.layout, &self.view)
    }

    /// Replaces everything with a loaded document.
    ///
    /// Clears history, selection and any gesture. On error the planner is
    /// untouched.
    pub fn load_json(&mut self, json: &str) -> std::result::Result<LoadReport, LayoutError> {
        let loaded = persistence::from_json(json)?;
        self.layout = loaded.layout;
        self.view = loaded.view;
        self.selection.clear();
        self.history.clear();
        self.mode = Mode::Idle;
        Ok(loaded.report)
    }

    /// Starts over with an empty layout and default view.
    pub fn new_layout(&mut self) {
        self.layout = Layout::new();
        self.view = ViewState::default();
        self.selection.clear();
        self.history.clear();
        self.mode = Mode::Idle;
    }
}

/// Rounds a position to the nearest grid intersection.
pub fn snap_to_grid(p: Point, grid: f64) -> Point {
    Point::new((p.x / grid).round() * grid, (p.y / grid).round() * grid)
}

/// Adjusts a proposed position of `moving` so its bounding edges line up with a
/// nearby rack.
///
/// Per axis, edges are compared in a fixed order: own min to other max, own max
/// to other min, min to min, max to max. The first pair closer than `threshold`
/// wins for that rack; later racks override earlier ones.
pub fn snap_to_racks(racks: &[Rack], moving: &Rack, exclude: &[RackId], proposed: Point, threshold: f64) -> Point {
    let own = geometry::rack_bounds(moving);
    let shift = proposed - moving.pos;
    let (min_x, max_x) = (own.min_x + shift.x, own.max_x + shift.x);
    let (min_y, max_y) = (own.min_y + shift.y, own.max_y + shift.y);

    let mut snapped = proposed;
    for other in racks {
        if other.id == moving.id || exclude.contains(&other.id) {
            continue;
        }
        let b = geometry::rack_bounds(other);
        if let Some(dx) = edge_snap(min_x, max_x, b.min_x, b.max_x, threshold) {
            snapped.x = proposed.x + dx;
        }
        if let Some(dy) = edge_snap(min_y, max_y, b.min_y, b.max_y, threshold) {
            snapped.y = proposed.y + dy;
        }
    }
    snapped
}

fn edge_snap(min: f64, max: f64, other_min: f64, other_max: f64, threshold: f64) -> Option<f64> {
    [(min, other_max), (max, other_min), (min, other_min), (max, other_max)]
        .into_iter()
        .find(|(own, other)| (own - other).abs() < threshold)
        .map(|(own, other)| other - own)
}

/// Parses a whole positive number from a text field.
pub fn parse_count(text: &str, field: &str) -> Result<usize> {
    text.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| PlannerError::InvalidRackParameters {
            reason: format!("{field} must be a positive whole number"),
        })
}

/// Parses a finite number from a text field.
pub fn parse_number(text: &str, field: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| PlannerError::InvalidRackParameters {
            reason: format!("{field} must be a number"),
        })
}

/// Parses an `x`/`y` pair of text fields.
pub fn parse_position(x: &str, y: &str) -> Result<Point> {
    Ok(Point::new(parse_number(x, "X position")?, parse_number(y, "Y position")?))
}

/// Parses a rotation in degrees; only 0, 90, 180 and 270 are accepted.
pub fn parse_rotation(text: &str) -> Result<Rotation> {
    text.trim()
        .parse::<i64>()
        .ok()
        .filter(|d| (0..360).contains(d))
        .and_then(Rotation::from_degrees)
        .ok_or_else(|| PlannerError::InvalidRackParameters {
            reason: "rotation must be 0, 90, 180 or 270".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pt(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn add(planner: &mut Planner, x: f64, y: f64) -> RackId {
        planner
            .add_rack(RackParams {
                pos: pt(x, y),
                ..RackParams::default()
            })
            .unwrap()
            .id
    }

    fn click(planner: &mut Planner, p: Point) {
        planner.press(p, false).unwrap();
        planner.release(p);
    }

    fn pos(planner: &Planner, id: RackId) -> Point {
        planner.rack_by_id(id).unwrap().pos
    }

    #[test]
    fn test_add_rack_validates_before_mutating() {
        let mut planner = Planner::new();
        let err = planner
            .add_rack(RackParams {
                cols: 0,
                ..RackParams::default()
            })
            .unwrap_err();

        assert!(matches!(err, PlannerError::InvalidRackParameters { .. }));
        assert!(planner.layout().racks.is_empty());
        assert!(!planner.can_undo());
        assert!(planner
            .add_rack(RackParams {
                tube_diameter: 2.0,
                ..RackParams::default()
            })
            .is_err());
        assert!(matches!(
            planner.add_rack(RackParams {
                cols: usize::MAX,
                rows: 2,
                ..RackParams::default()
            }),
            Err(PlannerError::InvalidRackParameters { .. })
        ));
        assert!(planner.layout().racks.is_empty());
    }

    #[test]
    fn test_add_rack_names_selects_and_suggests_next_position() {
        let mut planner = Planner::new();
        let added = planner.add_rack(RackParams::default()).unwrap();
        let rack = planner.rack_by_id(added.id).unwrap();

        assert_eq!(rack.name, "Crate Rack 1");
        assert_eq!(planner.selection().racks(), &[added.id]);
        // 78 wide plus the 20 separation.
        assert_eq!(added.next_pos, pt(148.0, 50.0));

        let rotated = planner
            .add_rack(RackParams {
                name: "  Finale ".into(),
                rotation: Rotation::Deg90,
                ..RackParams::default()
            })
            .unwrap();
        assert_eq!(planner.rack_by_id(rotated.id).unwrap().name, "Finale");
        assert_eq!(rotated.next_pos, pt(124.0, 50.0));
    }

    #[test]
    fn test_press_selects_and_clears() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);
        let b = add(&mut planner, 200.0, 50.0);

        click(&mut planner, pt(50.0, 50.0));
        assert_eq!(planner.selection().racks(), &[a]);

        planner.press(pt(200.0, 50.0), true).unwrap();
        planner.release(pt(200.0, 50.0));
        assert_eq!(planner.selection().racks(), &[a, b]);

        planner.press(pt(200.0, 50.0), true).unwrap();
        planner.release(pt(200.0, 50.0));
        assert_eq!(planner.selection().racks(), &[a]);

        click(&mut planner, pt(500.0, 500.0));
        assert!(planner.selection().is_empty());
        assert!(matches!(planner.mode(), Mode::Idle));
    }

    #[test]
    fn test_flow_line_hit_beats_rack() {
        let mut planner = Planner::new();
        add(&mut planner, 50.0, 50.0);
        planner.set_flow_line_mode(true);
        planner.press(pt(0.0, 50.0), false).unwrap();
        planner.press(pt(200.0, 50.0), false).unwrap();

        click(&mut planner, pt(50.0, 52.0));
        assert!(planner.selection().flow_line().is_some());
        assert!(planner.selection().racks().is_empty());
    }

    #[test]
    fn test_additive_press_on_flow_line_only_drops_racks() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);
        planner.set_flow_line_mode(true);
        planner.press(pt(0.0, 50.0), false).unwrap();
        planner.press(pt(200.0, 50.0), false).unwrap();
        let line_id = planner.layout().flow_lines[0].id;

        planner.select_racks([a]);
        planner.press(pt(150.0, 50.0), true).unwrap();
        assert!(planner.selection().is_empty());
        assert!(matches!(planner.mode(), Mode::Idle));

        planner.select_flow_line(line_id).unwrap();
        planner.press(pt(150.0, 50.0), true).unwrap();
        assert_eq!(planner.selection().flow_line(), Some(line_id));
    }

    #[test]
    fn test_drag_moves_rack_and_records_once() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);
        let history_before = planner.history.undo_len();

        planner.press(pt(60.0, 40.0), false).unwrap();
        planner.drag(pt(90.0, 60.0));
        planner.drag(pt(90.0, 60.0));
        planner.release(pt(90.0, 60.0));

        assert_eq!(pos(&planner, a), pt(80.0, 70.0));
        assert_eq!(planner.history.undo_len(), history_before + 1);

        assert!(planner.undo());
        assert_eq!(pos(&planner, a), pt(50.0, 50.0));
    }

    #[test]
    fn test_click_without_motion_records_nothing() {
        let mut planner = Planner::new();
        add(&mut planner, 50.0, 50.0);
        let history_before = planner.history.undo_len();

        click(&mut planner, pt(50.0, 50.0));
        assert_eq!(planner.history.undo_len(), history_before);
    }

    #[test]
    fn test_group_drag_moves_rigidly() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);
        let b = add(&mut planner, 200.0, 50.0);
        planner.select_racks([a, b]);

        planner.press(pt(50.0, 50.0), false).unwrap();
        planner.drag(pt(60.0, 55.0));
        planner.release(pt(60.0, 55.0));

        assert_eq!(pos(&planner, a), pt(60.0, 55.0));
        assert_eq!(pos(&planner, b), pt(210.0, 55.0));
        assert_eq!(planner.selection().racks().len(), 2);
        // The pressed rack is drawn on top.
        assert_eq!(planner.layout().racks.last().map(|r| r.id), Some(a));
    }

    #[test]
    fn test_grid_snap_applies_to_primary() {
        let mut planner = Planner::new();
        planner.settings_mut().snap_to_grid = true;
        planner.set_grid_size(20.0).unwrap();
        let a = add(&mut planner, 50.0, 50.0);

        planner.press(pt(50.0, 50.0), false).unwrap();
        planner.drag(pt(63.0, 47.0));
        planner.release(pt(63.0, 47.0));

        assert_eq!(pos(&planner, a), pt(60.0, 40.0));
    }

    #[test]
    fn test_rack_snap_aligns_edges() {
        let mut planner = Planner::new();
        planner.settings_mut().snap_to_racks = true;
        add(&mut planner, 50.0, 50.0);
        let b = add(&mut planner, 200.0, 50.0);

        // Left edge of B lands 4 units right of A's right edge (89).
        planner.press(pt(200.0, 50.0), false).unwrap();
        planner.drag(pt(132.0, 50.0));
        planner.release(pt(132.0, 50.0));

        assert_eq!(pos(&planner, b), pt(128.0, 50.0));
    }

    #[test]
    fn test_rack_snap_threshold_scales_with_zoom() {
        let racks = vec![
            Rack::new("A".into(), RackType::Crate, 3, 2, pt(50.0, 50.0), 20.0),
            Rack::new("B".into(), RackType::Crate, 3, 2, pt(200.0, 300.0), 20.0),
        ];
        // 8 units away: snaps at zoom 1 (threshold 10), not at zoom 2 (threshold 5).
        let proposed = pt(136.0, 300.0);
        assert_eq!(snap_to_racks(&racks, &racks[1], &[], proposed, 10.0), pt(128.0, 300.0));
        assert_eq!(snap_to_racks(&racks, &racks[1], &[], proposed, 5.0), proposed);
    }

    #[test]
    fn test_rotate_keeps_position_and_rejects_lines() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);

        assert_eq!(planner.rotate_selected(), Ok(1));
        let rack = planner.rack_by_id(a).unwrap();
        assert_eq!(rack.rotation, Rotation::Deg90);
        assert_eq!(rack.pos, pt(50.0, 50.0));
        assert_eq!(rack.tubes.len(), 6);

        planner.clear_selection();
        assert_eq!(planner.rotate_selected(), Err(PlannerError::NoRackSelected));

        planner.set_flow_line_mode(true);
        planner.press(pt(300.0, 300.0), false).unwrap();
        planner.press(pt(400.0, 300.0), false).unwrap();
        let line = planner.layout().flow_lines[0].id;
        planner.select_flow_line(line).unwrap();
        assert_eq!(
            planner.rotate_selected(),
            Err(PlannerError::NotApplicableToFlowLine("rotation"))
        );
    }

    #[test]
    fn test_duplicate_staggers_and_selects_copies() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);
        let b = add(&mut planner, 200.0, 50.0);
        planner.select_racks([a, b]);

        let copies = planner.duplicate_selected().unwrap();

        assert_eq!(copies.len(), 2);
        assert!(copies.iter().all(|id| *id != a && *id != b));
        assert_ne!(copies[0], copies[1]);
        assert_eq!(planner.selection().racks(), copies.as_slice());
        assert_eq!(pos(&planner, copies[0]), pt(70.0, 70.0));
        assert_eq!(pos(&planner, copies[1]), pt(225.0, 75.0));
        assert!(planner.rack_by_id(copies[0]).unwrap().name.ends_with("(Copy)"));
    }

    #[test]
    fn test_delete_requires_confirmation_and_prunes() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);
        let b = add(&mut planner, 200.0, 50.0);
        let c = add(&mut planner, 350.0, 50.0);
        let addr = |rack_id, tube_index| TubeAddress { rack_id, tube_index };
        planner.connect_tubes(addr(a, 0), addr(b, 0)).unwrap();
        planner.connect_tubes(addr(b, 1), addr(c, 1)).unwrap();
        planner.select_racks([a]);

        assert_eq!(planner.delete_selected(|_| false), Err(PlannerError::DeletionCancelled));
        assert_eq!(planner.layout().racks.len(), 3);

        let mut asked = None;
        let removed = planner
            .delete_selected(|target| {
                asked = Some(target.clone());
                true
            })
            .unwrap();
        assert_eq!(removed, 1);
        assert!(matches!(asked, Some(DeletionTarget::Racks { connections: 1, .. })));
        assert_eq!(planner.layout().connections.len(), 1);
        assert!(planner.selection().is_empty());

        assert!(planner.undo());
        assert_eq!(planner.layout().racks.len(), 3);
        assert_eq!(planner.layout().connections.len(), 2);
        assert_eq!(planner.selection().racks(), &[a]);

        planner.clear_selection();
        assert_eq!(planner.delete_selected(|_| true), Err(PlannerError::NoItemSelected));
    }

    #[test]
    fn test_undo_underflow_is_noop() {
        let mut planner = Planner::new();
        assert!(!planner.undo());
        assert!(!planner.redo());
    }

    #[test]
    fn test_undo_resets_gesture() {
        let mut planner = Planner::new();
        add(&mut planner, 50.0, 50.0);
        planner.press(pt(50.0, 50.0), false).unwrap();
        assert!(matches!(planner.mode(), Mode::DraggingRack(_)));

        assert!(planner.undo());
        assert!(matches!(planner.mode(), Mode::Idle));
        assert!(planner.layout().racks.is_empty());
    }

    #[test]
    fn test_cancel_drag_restores_positions() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);
        let history_before = planner.history.undo_len();

        planner.press(pt(50.0, 50.0), false).unwrap();
        planner.drag(pt(150.0, 150.0));
        planner.cancel_gesture();

        assert_eq!(pos(&planner, a), pt(50.0, 50.0));
        assert_eq!(planner.history.undo_len(), history_before);
    }

    #[test]
    fn test_flow_line_drawing() {
        let mut planner = Planner::new();
        assert!(planner.set_flow_line_mode(true));
        planner.press(pt(10.0, 10.0), false).unwrap();
        assert_eq!(
            planner.press(pt(13.0, 10.0), false),
            Err(PlannerError::LineTooShort)
        );
        assert!(planner.layout().flow_lines.is_empty());

        planner.press(pt(110.0, 10.0), false).unwrap();
        let line = &planner.layout().flow_lines[0];
        assert_eq!((line.start(), line.end()), (pt(10.0, 10.0), pt(110.0, 10.0)));
        assert_eq!(line.color, DEFAULT_FLOW_LINE_COLOR);
        assert!(matches!(planner.mode(), Mode::Idle));

        let id = line.id;
        assert_eq!(planner.set_flow_line_label(id, "Intro"), Ok(true));
        assert_eq!(planner.set_flow_line_label(id, "Intro"), Ok(false));
        assert!(planner.undo());
        assert_eq!(planner.line_by_id(id).unwrap().label, "");
    }

    #[test]
    fn test_line_length_is_measured_on_screen() {
        let mut planner = Planner::new();
        planner.zoom_at(Point::ZERO, ZoomDirection::Out);
        planner.zoom_at(Point::ZERO, ZoomDirection::Out);
        planner.set_flow_line_mode(true);
        // 6 world units is under 5 pixels at this zoom.
        let start = planner.world_to_screen(pt(0.0, 0.0));
        planner.press(start, false).unwrap();
        let end = planner.world_to_screen(pt(6.0, 0.0));
        assert_eq!(planner.press(end, false), Err(PlannerError::LineTooShort));
    }

    #[test]
    fn test_connect_mode() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);
        assert!(planner.set_connect_mode(true));
        assert!(planner.selection().is_empty());

        planner.press(pt(26.0, 38.0), false).unwrap();
        assert_eq!(
            planner.press(pt(26.0, 38.0), false),
            Err(PlannerError::SelfConnection)
        );
        planner.press(pt(50.0, 38.0), false).unwrap();

        let connection = &planner.layout().connections[0];
        assert_eq!(connection.source(), TubeAddress { rack_id: a, tube_index: 0 });
        assert_eq!(connection.target(), TubeAddress { rack_id: a, tube_index: 1 });
        assert!(matches!(planner.mode(), Mode::ConnectingTubes { source: None }));

        assert!(planner.set_flow_line_mode(true));
        assert!(!planner.mode().is_connecting_tubes());
    }

    #[test]
    fn test_alt_click_cycles_tube_color() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);
        planner.clear_selection();
        assert_eq!(
            planner.cycle_tube_color_at(pt(26.0, 38.0)),
            Err(PlannerError::RequiresSingleRack)
        );

        planner.select_racks([a]);
        let (address, color) = planner.cycle_tube_color_at(pt(26.0, 38.0)).unwrap().unwrap();
        assert_eq!(address.tube_index, 0);
        assert_eq!(color, FuseColor::Blue);
        assert_eq!(planner.layout().resolve_tube(address).unwrap().color, FuseColor::Blue);
        assert_eq!(planner.cycle_tube_color_at(pt(38.0, 38.0)), Ok(None));
    }

    #[test]
    fn test_batch_tube_edits() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);
        let undo_before = planner.history.undo_len();

        assert!(matches!(
            planner.set_tube_colors(a, &[0, 9], FuseColor::Green),
            Err(PlannerError::TubeIndexOutOfRange { index: 9, len: 6 })
        ));
        assert_eq!(planner.history.undo_len(), undo_before);

        assert_eq!(planner.set_tube_colors(a, &[0, 2, 4], FuseColor::Green), Ok(true));
        assert_eq!(planner.set_tube_types(a, &[1], FireworkType::Ring), Ok(true));
        assert_eq!(planner.set_tube_cue(a, 1, "B2"), Ok(true));
        assert!(planner.set_tube_lift_time(a, 1, -1.0).is_err());
        assert_eq!(planner.history.undo_len(), undo_before + 3);

        let rack = planner.rack_by_id(a).unwrap();
        assert_eq!(rack.tubes[4].color, FuseColor::Green);
        assert_eq!(rack.tubes[1].firework_type, FireworkType::Ring);
        assert_eq!(rack.tubes[1].cue, "B2");
    }

    #[test]
    fn test_clear_racks_is_undoable() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);
        let b = add(&mut planner, 200.0, 50.0);
        planner
            .connect_tubes(
                TubeAddress { rack_id: a, tube_index: 0 },
                TubeAddress { rack_id: b, tube_index: 0 },
            )
            .unwrap();

        assert_eq!(planner.clear_racks(), Ok(2));
        assert!(planner.layout().connections.is_empty());
        assert!(planner.selection().is_empty());
        assert_eq!(planner.clear_racks(), Err(PlannerError::NothingToClear("racks")));

        assert!(planner.undo());
        assert_eq!(planner.layout().racks.len(), 2);
        assert_eq!(planner.layout().connections.len(), 1);
    }

    #[test]
    fn test_pan_resumes_tool_mode() {
        let mut planner = Planner::new();
        planner.set_connect_mode(true);

        assert!(planner.begin_pan(pt(100.0, 100.0)));
        assert!(planner.mode().is_connecting_tubes());
        planner.drag(pt(150.0, 80.0));
        planner.end_pan();

        assert_eq!((planner.view().pan_x, planner.view().pan_y), (-50.0, 20.0));
        assert!(matches!(planner.mode(), Mode::ConnectingTubes { source: None }));
    }

    #[test]
    fn test_pan_not_allowed_during_drag() {
        let mut planner = Planner::new();
        add(&mut planner, 50.0, 50.0);
        planner.press(pt(50.0, 50.0), false).unwrap();
        assert!(!planner.begin_pan(pt(0.0, 0.0)));
    }

    #[test]
    fn test_nudge_and_position_edits() {
        let mut planner = Planner::new();
        let a = add(&mut planner, 50.0, 50.0);

        assert_eq!(planner.nudge_selected(NUDGE_AMOUNT, 0.0), Ok(1));
        assert_eq!(pos(&planner, a), pt(52.0, 50.0));
        assert_eq!(planner.set_rack_position(a, pt(52.0, 50.0)), Ok(false));
        assert_eq!(planner.set_rack_position(a, pt(0.0, 0.0)), Ok(true));
        assert_eq!(planner.set_rack_rotation(a, Rotation::Deg180), Ok(true));
        assert_eq!(planner.rename_rack(a, "Left"), Ok(true));
        assert_eq!(planner.rack_by_id(a).unwrap().name, "Left");
    }

    #[test]
    fn test_load_replaces_state_and_clears_history() {
        let mut planner = Planner::new();
        add(&mut planner, 50.0, 50.0);
        let json = planner.to_json().unwrap();
        add(&mut planner, 200.0, 50.0);

        let report = planner.load_json(&json).unwrap();
        assert_eq!(report.racks, 1);
        assert!(!planner.can_undo());
        assert!(planner.selection().is_empty());

        assert!(planner.load_json("[").is_err());
        assert_eq!(planner.layout().racks.len(), 1);
    }

    #[test]
    fn test_text_parsers() {
        assert_eq!(parse_count("4", "Columns"), Ok(4));
        assert!(parse_count("0", "Columns").is_err());
        assert!(parse_count("two", "Columns").is_err());
        assert_eq!(parse_position(" 12.5", "-3"), Ok(pt(12.5, -3.0)));
        assert!(parse_position("x", "1").is_err());
        assert_eq!(parse_rotation("270"), Ok(Rotation::Deg270));
        assert!(parse_rotation("45").is_err());
        assert!(parse_rotation("360").is_err());
        assert!(Planner::new().set_grid_size(0.0).is_err());
    }

    fn apply_op(planner: &mut Planner, op: u8, n: usize) {
        let _ = match op {
            0 => planner
                .add_rack(RackParams {
                    pos: pt(60.0 * n as f64, 40.0),
                    ..RackParams::default()
                })
                .map(|_| ()),
            1 => planner.rotate_selected().map(|_| ()),
            2 => planner.duplicate_selected().map(|_| ()),
            3 => planner.nudge_selected(2.0, -2.0).map(|_| ()),
            4 => planner.delete_selected(|_| true).map(|_| ()),
            _ => {
                planner.undo();
                Ok(())
            }
        };
    }

    proptest! {
        #[test]
        fn undo_then_redo_restores_state(ops in proptest::collection::vec(0u8..6, 1..25)) {
            let mut planner = Planner::new();
            for (n, op) in ops.iter().enumerate() {
                apply_op(&mut planner, *op, n);
            }
            if planner.can_undo() {
                let before = planner.snapshot();
                prop_assert!(planner.undo());
                prop_assert!(planner.redo());
                prop_assert_eq!(planner.snapshot(), before);
            }
        }
    }
}
