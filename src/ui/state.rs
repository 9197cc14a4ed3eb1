//! Application state structures.
//!
//! The editor core lives in [`Planner`]; everything here is UI-only state such as
//! text field contents, open dialogs and the values persisted between sessions.

use crate::error::Result;
use crate::planner::{self, Planner, PlannerSettings, RackParams};
use crate::types::*;
use eframe::egui;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Text fields of the "Add Rack" form.
pub struct RackForm {
    /// Rack name, blank for a generated one
    pub name: String,
    /// Layout archetype
    pub rack_type: RackType,
    /// Columns or fan segments
    pub cols: String,
    /// Rows or tubes per segment
    pub rows: String,
    /// Tube diameter in world units
    pub diameter: String,
    /// X position of the rack center
    pub x: String,
    /// Y position of the rack center
    pub y: String,
    /// Initial orientation
    pub rotation: Rotation,
}

impl Default for RackForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            rack_type: RackType::Crate,
            cols: "3".into(),
            rows: "2".into(),
            diameter: "20".into(),
            x: "50".into(),
            y: "50".into(),
            rotation: Rotation::Deg0,
        }
    }
}

impl RackForm {
    /// Parses the form into rack parameters.
    pub fn to_params(&self) -> Result<RackParams> {
        Ok(RackParams {
            name: self.name.clone(),
            rack_type: self.rack_type,
            cols: planner::parse_count(&self.cols, "Columns")?,
            rows: planner::parse_count(&self.rows, "Rows")?,
            tube_diameter: planner::parse_number(&self.diameter, "Tube diameter")?,
            pos: planner::parse_position(&self.x, &self.y)?,
            rotation: self.rotation,
        })
    }

    /// Moves the position fields to the suggested spot for the next rack and
    /// clears the name.
    pub fn advance_to(&mut self, next: Point) {
        self.name.clear();
        self.x = format!("{}", next.x);
        self.y = format!("{}", next.y);
    }
}

/// Temporary values for the properties panel while editing.
///
/// Loaded from the selected rack or flow line whenever the selection changes.
pub struct InspectorState {
    /// Rack or flow line the temp values belong to
    pub loaded_for: Option<Uuid>,
    /// Rack name being edited
    pub temp_name: String,
    /// X position being edited
    pub temp_x: String,
    /// Y position being edited
    pub temp_y: String,
    /// Flow line label being edited
    pub temp_label: String,
    /// Flow line color being edited
    pub temp_color: String,
    /// Tube indices picked for batch edits
    pub selected_tubes: Vec<usize>,
    /// Color applied by "Apply Color"
    pub batch_color: FuseColor,
    /// Type applied by "Apply Type"
    pub batch_type: FireworkType,
    /// Cue of the single picked tube being edited
    pub temp_cue: String,
}

impl Default for InspectorState {
    fn default() -> Self {
        Self {
            loaded_for: None,
            temp_name: String::new(),
            temp_x: String::new(),
            temp_y: String::new(),
            temp_label: String::new(),
            temp_color: String::new(),
            selected_tubes: Vec::new(),
            batch_color: FuseColor::default(),
            batch_type: FireworkType::default(),
            temp_cue: String::new(),
        }
    }
}

impl InspectorState {
    /// Reloads the temp values from a rack.
    pub fn load_rack(&mut self, rack: &Rack) {
        self.loaded_for = Some(rack.id);
        self.temp_name = rack.name.clone();
        self.temp_x = format!("{}", rack.pos.x);
        self.temp_y = format!("{}", rack.pos.y);
        self.selected_tubes.clear();
        self.temp_cue.clear();
    }

    /// Reloads the temp values from a flow line.
    pub fn load_flow_line(&mut self, line: &FlowLine) {
        self.loaded_for = Some(line.id);
        self.temp_label = line.label.clone();
        self.temp_color = line.color.clone();
        self.selected_tubes.clear();
    }
}

/// Actions that need a yes/no from the user before running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingConfirmAction {
    /// Delete the selected racks or flow line
    DeleteSelection,
    /// Remove every rack
    ClearRacks,
    /// Remove every flow line
    ClearFlowLines,
    /// Remove every tube connection
    ClearConnections,
    /// Start an empty layout
    NewLayout,
}

/// Pointer buttons the canvas is currently tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerState {
    /// A primary press started on the canvas and has not been released
    pub primary_active: bool,
    /// A pan started on the canvas and has not been released
    pub panning: bool,
}

/// The layout document window.
#[derive(Default)]
pub struct DocumentWindow {
    /// Whether the window is shown
    pub open: bool,
    /// Editable JSON text
    pub text: String,
}

/// The main application structure.
///
/// Implements `eframe::App`; the editor core is the embedded [`Planner`].
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerApp {
    /// The editor core
    #[serde(skip)]
    pub planner: Planner,
    /// Editor options, copied from the planner when saving
    pub settings: PlannerSettings,
    /// Layout document, copied from the planner when saving
    pub layout_document: Option<String>,
    /// Whether dark mode visuals are enabled
    pub dark_mode: bool,
    /// Remembered width of the properties panel across sessions
    pub properties_panel_width: f32,
    /// "Add Rack" form fields
    #[serde(skip)]
    pub rack_form: RackForm,
    /// Properties panel temp values
    #[serde(skip)]
    pub inspector: InspectorState,
    /// Action waiting for confirmation
    #[serde(skip)]
    pub pending_confirm: Option<PendingConfirmAction>,
    /// Layout document window
    #[serde(skip)]
    pub document_window: DocumentWindow,
    /// Canvas pointer tracking
    #[serde(skip)]
    pub pointer: PointerState,
    /// Canvas area from the last frame
    #[serde(skip)]
    pub canvas_rect: egui::Rect,
    /// Last error or notice shown in the status bar
    #[serde(skip)]
    pub status: Option<String>,
}

impl Default for PlannerApp {
    fn default() -> Self {
        Self {
            planner: Planner::new(),
            settings: PlannerSettings::default(),
            layout_document: None,
            dark_mode: true,
            properties_panel_width: 300.0,
            rack_form: RackForm::default(),
            inspector: InspectorState::default(),
            pending_confirm: None,
            document_window: DocumentWindow::default(),
            pointer: PointerState::default(),
            canvas_rect: egui::Rect::ZERO,
            status: None,
        }
    }
}

impl PlannerApp {
    /// Copies the planner's settings and layout into the persisted fields.
    pub fn sync_persisted(&mut self) {
        self.settings = self.planner.settings().clone();
        self.layout_document = match self.planner.to_json() {
            Ok(json) => Some(json),
            Err(err) => {
                log::warn!("Failed to serialize layout: {err}");
                None
            }
        };
    }

    /// Serializes the application state to JSON.
    ///
    /// # Returns
    ///
    /// A JSON string representation of the app state, or an error if serialization fails.
    pub fn to_json(&mut self) -> std::result::Result<String, serde_json::Error> {
        self.sync_persisted();
        serde_json::to_string_pretty(self)
    }

    /// Deserializes application state from JSON and rebuilds the planner.
    ///
    /// A stored layout that fails to load is logged and replaced by an empty one.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let mut app: Self = serde_json::from_str(json)?;
        app.planner = Planner::with_settings(app.settings.clone());
        if let Some(document) = &app.layout_document {
            match app.planner.load_json(document) {
                Ok(report) => log::info!("Restored {} rack(s)", report.racks),
                Err(err) => log::warn!("Discarding stored layout: {err}"),
            }
        }
        Ok(app)
    }
}
