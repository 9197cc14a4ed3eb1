//! User interface for the rack planner.
//!
//! # Module Organization
//!
//! - `state` - Application state structures and the main PlannerApp
//! - `canvas` - Pointer wiring from egui to the planner
//! - `rendering` - Drawing racks, tubes, flow lines, connections and the grid

mod canvas;
mod rendering;
mod state;


pub use state::PlannerApp;

use self::state::PendingConfirmAction;
use crate::constants::NUDGE_AMOUNT;
use crate::error::PlannerError;
use crate::metrics;
use crate::planner::{self, DeletionTarget};
use crate::types::*;
use crate::view::ZoomDirection;
use eframe::egui;

/// Storage key for the persisted app state.
pub const APP_STATE_KEY: &str = "app_state";

impl eframe::App for PlannerApp {
    /// Persist settings and the current layout between restarts.
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        match self.to_json() {
            Ok(json) => {
                storage.set_string(APP_STATE_KEY, json);
            }
            Err(err) => {
                log::warn!("Failed to serialize app state: {err}");
            }
        }
    }

    /// Main update function called by egui for each frame.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The egui context
    /// * `_frame` - The eframe frame
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let visuals = if self.dark_mode {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        };
        ctx.set_visuals(visuals);

        self.handle_undo_redo_keys(ctx);
        self.handle_edit_keys(ctx);

        egui::TopBottomPanel::top("top_toolbar").show(ctx, |ui| {
            self.draw_toolbar(ui);
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            self.draw_status_bar(ui);
        });

        egui::SidePanel::right("properties_panel")
            .resizable(true)
            .default_width(self.properties_panel_width.max(180.0))
            .show(ctx, |ui| {
                self.properties_panel_width = ui.available_width().max(180.0);
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.draw_properties_panel(ui);
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_canvas(ui);
        });

        self.draw_confirm_window(ctx);
        self.draw_document_window(ctx);
    }
}

impl PlannerApp {
    /// Shows an error in the status bar.
    pub fn show_error(&mut self, err: PlannerError) {
        log::debug!("{err}");
        self.status = Some(err.to_string());
    }

    fn report<T>(&mut self, result: crate::error::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.show_error(err);
                None
            }
        }
    }

    /// Handles Cmd/Ctrl+Z, Cmd/Ctrl+Shift+Z and Cmd/Ctrl+Y.
    pub fn handle_undo_redo_keys(&mut self, ctx: &egui::Context) {
        // Text fields keep their own undo
        if ctx.wants_keyboard_input() {
            return;
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Z) && i.modifiers.command && !i.modifiers.shift) {
            self.perform_undo();
        } else if ctx.input(|i| {
            (i.key_pressed(egui::Key::Z) && i.modifiers.command && i.modifiers.shift)
                || (i.key_pressed(egui::Key::Y) && i.modifiers.command)
        }) {
            self.perform_redo();
        }
    }

    /// Handles Delete, R, Cmd/Ctrl+D, arrow nudges and Escape.
    pub fn handle_edit_keys(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() || self.pending_confirm.is_some() {
            return;
        }
        let (delete, rotate, duplicate, escape, nudge) = ctx.input(|i| {
            let step = |key| if i.key_pressed(key) { NUDGE_AMOUNT } else { 0.0 };
            (
                i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace),
                i.key_pressed(egui::Key::R) && !i.modifiers.command,
                i.key_pressed(egui::Key::D) && i.modifiers.command,
                i.key_pressed(egui::Key::Escape),
                (
                    step(egui::Key::ArrowRight) - step(egui::Key::ArrowLeft),
                    step(egui::Key::ArrowDown) - step(egui::Key::ArrowUp),
                ),
            )
        });

        if delete && !self.planner.selection().is_empty() {
            self.pending_confirm = Some(PendingConfirmAction::DeleteSelection);
        }
        if rotate {
            let result = self.planner.rotate_selected();
            self.report(result);
        }
        if duplicate {
            let result = self.planner.duplicate_selected();
            self.report(result);
        }
        if nudge != (0.0, 0.0) {
            let result = self.planner.nudge_selected(nudge.0, nudge.1);
            self.report(result);
        }
        if escape {
            self.planner.cancel_gesture();
            self.pointer = Default::default();
        }
    }

    /// Performs an undo operation.
    pub fn perform_undo(&mut self) {
        if self.planner.undo() {
            self.inspector.loaded_for = None;
        }
    }

    /// Performs a redo operation.
    pub fn perform_redo(&mut self) {
        if self.planner.redo() {
            self.inspector.loaded_for = None;
        }
    }

    /// Renders the toolbar with edit actions, drawing modes and view controls.
    ///
    /// # Arguments
    ///
    /// * `ui` - The egui UI context
    fn draw_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            if ui.button("New").clicked() {
                self.pending_confirm = Some(PendingConfirmAction::NewLayout);
            }
            if ui.button("Document…").clicked() {
                self.open_document_window();
            }
            ui.separator();

            if ui.add_enabled(self.planner.can_undo(), egui::Button::new("Undo")).clicked() {
                self.perform_undo();
            }
            if ui.add_enabled(self.planner.can_redo(), egui::Button::new("Redo")).clicked() {
                self.perform_redo();
            }
            ui.separator();

            let mut drawing = self.planner.mode().is_drawing_flow_line();
            if ui.toggle_value(&mut drawing, "Flow Line").changed() {
                self.planner.set_flow_line_mode(drawing);
            }
            let mut connecting = self.planner.mode().is_connecting_tubes();
            if ui.toggle_value(&mut connecting, "Connect Tubes").changed() {
                self.planner.set_connect_mode(connecting);
            }
            ui.separator();

            if ui.button("Rotate").clicked() {
                let result = self.planner.rotate_selected();
                self.report(result);
            }
            if ui.button("Duplicate").clicked() {
                let result = self.planner.duplicate_selected();
                self.report(result);
            }
            if ui.button("Delete").clicked() {
                match self.planner.deletion_target() {
                    Ok(_) => self.pending_confirm = Some(PendingConfirmAction::DeleteSelection),
                    Err(err) => self.show_error(err),
                }
            }
            ui.separator();

            ui.menu_button("Clear", |ui| {
                if ui.button("All Racks").clicked() {
                    self.pending_confirm = Some(PendingConfirmAction::ClearRacks);
                    ui.close();
                }
                if ui.button("All Flow Lines").clicked() {
                    self.pending_confirm = Some(PendingConfirmAction::ClearFlowLines);
                    ui.close();
                }
                if ui.button("All Connections").clicked() {
                    self.pending_confirm = Some(PendingConfirmAction::ClearConnections);
                    ui.close();
                }
            });
            ui.separator();

            let size = self.canvas_rect.size();
            let center = Point::new(size.x as f64 / 2.0, size.y as f64 / 2.0);
            if ui.button("Zoom +").clicked() {
                self.planner.zoom_at(center, ZoomDirection::In);
            }
            if ui.button("Zoom −").clicked() {
                self.planner.zoom_at(center, ZoomDirection::Out);
            }
            if ui.button("Reset View").clicked() {
                self.planner.reset_view();
            }
            ui.label(format!("{:.0}%", self.planner.view().zoom * 100.0));
            ui.separator();

            ui.checkbox(&mut self.dark_mode, "Dark");
        });
    }

    fn draw_status_bar(&mut self, ui: &mut egui::Ui) {
        let summary = self.planner.summary();
        ui.horizontal_wrapped(|ui| {
            ui.label(format!("Tubes: {}", summary.total_tubes));
            ui.separator();
            ui.label(format!("Duration: {:.1} s", summary.duration_secs));
            ui.separator();
            let fuse: Vec<String> = summary
                .fuse_feet_by_color()
                .iter()
                .map(|(color, feet)| format!("{}: {:.2} ft", color.name(), feet))
                .collect();
            if fuse.is_empty() {
                ui.label("Fuse: none");
            } else {
                ui.label(format!("Fuse: {}", fuse.join(", ")));
            }
            if let Some(status) = &self.status {
                ui.separator();
                ui.colored_label(egui::Color32::from_rgb(230, 160, 60), status);
            }
        });
    }

    /// Renders the right-hand panel: add form, options, selection and inspector.
    fn draw_properties_panel(&mut self, ui: &mut egui::Ui) {
        egui::CollapsingHeader::new("Add Rack")
            .default_open(true)
            .show(ui, |ui| self.draw_rack_form(ui));

        egui::CollapsingHeader::new("Options")
            .default_open(false)
            .show(ui, |ui| self.draw_options(ui));

        ui.separator();
        let selection = self.planner.selection().clone();
        if let Some(line_id) = selection.flow_line() {
            self.draw_flow_line_properties(ui, line_id);
        } else if let Some(rack_id) = selection.single_rack() {
            self.draw_rack_properties(ui, rack_id);
        } else if !selection.racks().is_empty() {
            ui.heading(format!("{} racks selected", selection.racks().len()));
            ui.label("R rotates, Ctrl+D duplicates, arrow keys nudge.");
        } else {
            ui.heading("No selection");
            ui.label("Click a rack or flow line to edit it.");
        }

        ui.separator();
        egui::CollapsingHeader::new("Racks")
            .default_open(true)
            .show(ui, |ui| self.draw_rack_inspector(ui));
    }

    fn draw_rack_form(&mut self, ui: &mut egui::Ui) {
        egui::Grid::new("rack_form").num_columns(2).show(ui, |ui| {
            let form = &mut self.rack_form;
            ui.label("Name");
            ui.text_edit_singleline(&mut form.name);
            ui.end_row();

            ui.label("Type");
            egui::ComboBox::from_id_salt("rack_form_type")
                .selected_text(form.rack_type.label())
                .show_ui(ui, |ui| {
                    for rack_type in RackType::ALL {
                        ui.selectable_value(&mut form.rack_type, rack_type, rack_type.label());
                    }
                });
            ui.end_row();

            let (cols_label, rows_label) = match form.rack_type {
                RackType::Crate => ("Columns", "Rows"),
                RackType::Fan => ("Segments", "Tubes / segment"),
            };
            ui.label(cols_label);
            ui.text_edit_singleline(&mut form.cols);
            ui.end_row();
            ui.label(rows_label);
            ui.text_edit_singleline(&mut form.rows);
            ui.end_row();
            ui.label("Tube diameter");
            ui.text_edit_singleline(&mut form.diameter);
            ui.end_row();
            ui.label("X");
            ui.text_edit_singleline(&mut form.x);
            ui.end_row();
            ui.label("Y");
            ui.text_edit_singleline(&mut form.y);
            ui.end_row();

            ui.label("Rotation");
            rotation_combo(ui, "rack_form_rotation", &mut form.rotation);
            ui.end_row();
        });

        if ui.button("Add Rack").clicked() {
            self.add_rack_from_form();
        }
    }

    /// Validates the form and adds a rack, moving the form to the next free spot.
    pub fn add_rack_from_form(&mut self) {
        let result = self.rack_form.to_params().and_then(|params| self.planner.add_rack(params));
        if let Some(added) = self.report(result) {
            self.rack_form.advance_to(added.next_pos);
            self.status = None;
        }
    }

    fn draw_options(&mut self, ui: &mut egui::Ui) {
        let settings = self.planner.settings_mut();
        ui.checkbox(&mut settings.snap_to_grid, "Snap to grid");
        ui.checkbox(&mut settings.snap_to_racks, "Snap to racks");
        ui.checkbox(&mut settings.show_tube_numbers, "Show tube numbers");
        ui.checkbox(&mut settings.show_rack_names, "Show rack names");

        let mut grid = self.planner.settings().grid_size;
        ui.horizontal(|ui| {
            ui.label("Grid size");
            ui.add(egui::DragValue::new(&mut grid).speed(1.0).range(1.0..=500.0));
        });
        if grid != self.planner.settings().grid_size {
            let result = self.planner.set_grid_size(grid);
            self.report(result);
        }
    }

    fn draw_rack_properties(&mut self, ui: &mut egui::Ui, rack_id: RackId) {
        let Some(rack) = self.planner.rack_by_id(rack_id).cloned() else {
            return;
        };
        if self.inspector.loaded_for != Some(rack_id) {
            self.inspector.load_rack(&rack);
        }

        ui.heading(&rack.name);
        ui.label(format!(
            "{} {}x{}, {} tubes, {}",
            rack.rack_type.label(),
            rack.cols,
            rack.rows,
            rack.tube_count(),
            metrics::physical_dimensions(&rack)
        ));

        egui::Grid::new("rack_properties").num_columns(2).show(ui, |ui| {
            ui.label("Name");
            let name = ui.text_edit_singleline(&mut self.inspector.temp_name);
            ui.end_row();
            if name.lost_focus() {
                let result = self.planner.rename_rack(rack_id, &self.inspector.temp_name);
                self.report(result);
            }

            ui.label("X");
            ui.text_edit_singleline(&mut self.inspector.temp_x);
            ui.end_row();
            ui.label("Y");
            ui.text_edit_singleline(&mut self.inspector.temp_y);
            ui.end_row();

            ui.label("Rotation");
            let mut rotation = rack.rotation;
            rotation_combo(ui, "rack_rotation", &mut rotation);
            ui.end_row();
            if rotation != rack.rotation {
                let result = self.planner.set_rack_rotation(rack_id, rotation);
                self.report(result);
            }
        });

        if ui.button("Apply Position").clicked() {
            let result = planner::parse_position(&self.inspector.temp_x, &self.inspector.temp_y)
                .and_then(|pos| self.planner.set_rack_position(rack_id, pos));
            self.report(result);
            self.inspector.loaded_for = None;
        }

        ui.separator();
        ui.label("Colors");
        for (color, count) in metrics::color_breakdown(&rack) {
            ui.label(format!("  {}: {}", color.name(), count));
        }

        ui.separator();
        self.draw_tube_picker(ui, &rack);
    }

    /// Tube grid in rotated visual order, with batch color/type edits.
    fn draw_tube_picker(&mut self, ui: &mut egui::Ui, rack: &Rack) {
        ui.label("Tubes (click to pick)");
        let (visual_cols, visual_rows) = crate::geometry::visual_grid_size(rack.cols, rack.rows, rack.rotation);
        let mut by_cell = vec![None; visual_cols * visual_rows];
        for index in 0..rack.tube_count() {
            let (c, r) = crate::geometry::visual_cell(rack.rack_type, rack.cols, rack.rows, rack.rotation, index);
            if let Some(slot) = by_cell.get_mut(r * visual_cols + c) {
                *slot = Some(index);
            }
        }

        egui::Grid::new("tube_picker").spacing(egui::vec2(2.0, 2.0)).show(ui, |ui| {
            for row in by_cell.chunks(visual_cols.max(1)) {
                for index in row.iter().flatten() {
                    let picked = self.inspector.selected_tubes.contains(index);
                    if ui.selectable_label(picked, format!("{}", index + 1)).clicked() {
                        if picked {
                            self.inspector.selected_tubes.retain(|i| i != index);
                        } else {
                            self.inspector.selected_tubes.push(*index);
                        }
                        if let [only] = self.inspector.selected_tubes.as_slice() {
                            self.inspector.temp_cue = rack.tubes.get(*only).map(|t| t.cue.clone()).unwrap_or_default();
                        }
                    }
                }
                ui.end_row();
            }
        });

        ui.horizontal(|ui| {
            if ui.button("All").clicked() {
                self.inspector.selected_tubes = (0..rack.tube_count()).collect();
            }
            if ui.button("None").clicked() {
                self.inspector.selected_tubes.clear();
            }
        });

        let picked = self.inspector.selected_tubes.clone();
        ui.add_enabled_ui(!picked.is_empty(), |ui| {
            ui.horizontal(|ui| {
                egui::ComboBox::from_id_salt("batch_color")
                    .selected_text(self.inspector.batch_color.name())
                    .show_ui(ui, |ui| {
                        for color in FuseColor::ALL {
                            ui.selectable_value(&mut self.inspector.batch_color, color, color.name());
                        }
                    });
                if ui.button("Apply Color").clicked() {
                    let result = self.planner.set_tube_colors(rack.id, &picked, self.inspector.batch_color);
                    self.report(result);
                }
            });
            ui.horizontal(|ui| {
                egui::ComboBox::from_id_salt("batch_type")
                    .selected_text(self.inspector.batch_type.label())
                    .show_ui(ui, |ui| {
                        for firework_type in FireworkType::ALL {
                            ui.selectable_value(&mut self.inspector.batch_type, firework_type, firework_type.label());
                        }
                    });
                if ui.button("Apply Type").clicked() {
                    let result = self.planner.set_tube_types(rack.id, &picked, self.inspector.batch_type);
                    self.report(result);
                }
            });
        });

        if let [index] = picked.as_slice() {
            let Some(tube) = rack.tubes.get(*index) else {
                return;
            };
            ui.separator();
            ui.label(format!("Tube {}", index + 1));
            ui.horizontal(|ui| {
                ui.label("Cue");
                if ui.text_edit_singleline(&mut self.inspector.temp_cue).lost_focus() {
                    let result = self.planner.set_tube_cue(rack.id, *index, &self.inspector.temp_cue);
                    self.report(result);
                }
            });
            let mut lift = tube.lift_time;
            ui.horizontal(|ui| {
                ui.label("Lift time (s)");
                ui.add(egui::DragValue::new(&mut lift).speed(0.1).range(0.0..=600.0));
            });
            if lift != tube.lift_time {
                let result = self.planner.set_tube_lift_time(rack.id, *index, lift);
                self.report(result);
            }
        }
    }

    fn draw_flow_line_properties(&mut self, ui: &mut egui::Ui, line_id: FlowLineId) {
        let Some(line) = self.planner.line_by_id(line_id).cloned() else {
            return;
        };
        if self.inspector.loaded_for != Some(line_id) {
            self.inspector.load_flow_line(&line);
        }

        ui.heading("Flow Line");
        ui.label(format!("Length: {:.1}", line.length()));
        egui::Grid::new("flow_line_properties").num_columns(2).show(ui, |ui| {
            ui.label("Label");
            let label = ui.text_edit_singleline(&mut self.inspector.temp_label);
            ui.end_row();
            if label.lost_focus() {
                let result = self.planner.set_flow_line_label(line_id, &self.inspector.temp_label);
                self.report(result);
            }
            ui.label("Color");
            let color = ui.text_edit_singleline(&mut self.inspector.temp_color);
            ui.end_row();
            if color.lost_focus() {
                let result = self.planner.set_flow_line_color(line_id, &self.inspector.temp_color);
                self.report(result);
            }
        });
    }

    /// Rack list; clicking selects, Cmd/Ctrl+click adds to the selection.
    fn draw_rack_inspector(&mut self, ui: &mut egui::Ui) {
        let rows = self.planner.rack_summaries();
        if rows.is_empty() {
            ui.label("No racks yet.");
            return;
        }
        let additive = ui.input(|i| i.modifiers.command);
        for row in rows {
            let selected = self.planner.selection().contains_rack(row.id);
            let start = row.global_start.map(|s| format!(" #{s}")).unwrap_or_default();
            let text = format!(
                "{} [{} {}] {} tubes, {}°{}",
                row.name,
                row.rack_type.label(),
                row.dims,
                row.tubes,
                row.rotation.degrees(),
                start
            );
            if ui.selectable_label(selected, text).clicked() {
                let mut ids: Vec<RackId> = if additive {
                    self.planner.selection().racks().to_vec()
                } else {
                    Vec::new()
                };
                if !ids.contains(&row.id) {
                    ids.push(row.id);
                }
                self.planner.select_racks(ids);
            }
        }
    }

    fn draw_confirm_window(&mut self, ctx: &egui::Context) {
        let Some(action) = self.pending_confirm else {
            return;
        };
        let message = match action {
            PendingConfirmAction::DeleteSelection => match self.planner.deletion_target() {
                Ok(DeletionTarget::FlowLine(_)) => "Delete the selected flow line?".to_string(),
                Ok(DeletionTarget::Racks { names, connections, .. }) => format!(
                    "Delete {} and {} connection(s)?",
                    names.join(", "),
                    connections
                ),
                Err(err) => {
                    self.pending_confirm = None;
                    self.show_error(err);
                    return;
                }
            },
            PendingConfirmAction::ClearRacks => "Remove every rack and tube connection?".to_string(),
            PendingConfirmAction::ClearFlowLines => "Remove every flow line?".to_string(),
            PendingConfirmAction::ClearConnections => "Remove every tube connection?".to_string(),
            PendingConfirmAction::NewLayout => "Discard the current layout and its history?".to_string(),
        };

        let mut decision = None;
        egui::Window::new("Confirm")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label(message);
                ui.horizontal(|ui| {
                    if ui.button("OK").clicked() {
                        decision = Some(true);
                    }
                    if ui.button("Cancel").clicked() {
                        decision = Some(false);
                    }
                });
            });

        if let Some(confirmed) = decision {
            self.pending_confirm = None;
            if confirmed {
                self.run_confirmed(action);
            }
        }
    }

    /// Runs an action the user has confirmed.
    pub fn run_confirmed(&mut self, action: PendingConfirmAction) {
        let result = match action {
            PendingConfirmAction::DeleteSelection => self.planner.delete_selected(|_| true),
            PendingConfirmAction::ClearRacks => self.planner.clear_racks(),
            PendingConfirmAction::ClearFlowLines => self.planner.clear_flow_lines(),
            PendingConfirmAction::ClearConnections => self.planner.clear_connections(),
            PendingConfirmAction::NewLayout => {
                self.planner.new_layout();
                Ok(0)
            }
        };
        if self.report(result).is_some() {
            self.inspector.loaded_for = None;
        }
    }

    fn open_document_window(&mut self) {
        match self.planner.to_json() {
            Ok(json) => {
                self.document_window.text = json;
                self.document_window.open = true;
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    /// Layout JSON viewer; "Load" replaces the layout with the edited text.
    fn draw_document_window(&mut self, ctx: &egui::Context) {
        if !self.document_window.open {
            return;
        }
        let mut open = true;
        let mut load = false;
        egui::Window::new("Layout Document")
            .open(&mut open)
            .default_size(egui::vec2(480.0, 420.0))
            .show(ctx, |ui| {
                if ui.button("Load").clicked() {
                    load = true;
                }
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.add(
                        egui::TextEdit::multiline(&mut self.document_window.text)
                            .code_editor()
                            .desired_width(f32::INFINITY)
                            .desired_rows(20),
                    );
                });
            });
        self.document_window.open = open;

        if load {
            match self.planner.load_json(&self.document_window.text) {
                Ok(report) => {
                    self.status = Some(format!(
                        "Loaded {} rack(s), {} flow line(s), {} connection(s); skipped {}",
                        report.racks,
                        report.flow_lines,
                        report.connections,
                        report.skipped_racks + report.skipped_flow_lines + report.skipped_connections
                    ));
                    self.inspector.loaded_for = None;
                    self.document_window.open = false;
                }
                Err(err) => {
                    log::warn!("Layout load failed: {err}");
                    self.status = Some(err.to_string());
                }
            }
        }
    }
}

fn rotation_combo(ui: &mut egui::Ui, id: &str, rotation: &mut Rotation) {
    egui::ComboBox::from_id_salt(id)
        .selected_text(format!("{}°", rotation.degrees()))
        .show_ui(ui, |ui| {
            for option in Rotation::ALL {
                ui.selectable_value(rotation, option, format!("{}°", option.degrees()));
            }
        });
}
