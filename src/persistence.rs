//! Layout documents: saving and tolerant loading.
//!
//! Documents are written in the current camelCase format. Loading also accepts
//! the older snake_case field names, a flat `tube_colors` array instead of
//! `tubes`, and the oldest format where the whole document is a bare array of
//! racks. Broken rack, line or connection records are skipped and reported
//! rather than failing the whole load.

use crate::constants::DEFAULT_TUBE_DIAMETER;
use crate::error::LayoutError;
use crate::types::*;
use crate::view::ViewState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The persisted shape of a layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDocument {
    /// Racks in draw order
    pub racks: Vec<Rack>,
    /// Flow lines
    pub flow_lines: Vec<FlowLine>,
    /// Tube connections
    pub tube_connections: Vec<TubeConnection>,
    /// View at save time
    pub canvas_view: ViewState,
}

/// What a load kept and what it dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    /// Racks loaded
    pub racks: usize,
    /// Rack records skipped for missing or invalid geometry
    pub skipped_racks: usize,
    /// Flow lines loaded
    pub flow_lines: usize,
    /// Flow line records that could not be read
    pub skipped_flow_lines: usize,
    /// Connections loaded
    pub connections: usize,
    /// Connections dropped because an end did not resolve
    pub skipped_connections: usize,
}

/// Result of reading a document.
#[derive(Debug, Clone)]
pub struct LoadedLayout {
    /// The scene
    pub layout: Layout,
    /// The stored view, or the default view for documents without one
    pub view: ViewState,
    /// Counts of loaded and skipped records
    pub report: LoadReport,
}

/// Serializes a layout and view to a pretty-printed JSON document.
pub fn to_json(layout: &Layout, view: &ViewState) -> Result<String, LayoutError> {
    let document = LayoutDocument {
        racks: layout.racks.clone(),
        flow_lines: layout.flow_lines.clone(),
        tube_connections: layout.connections.clone(),
        canvas_view: *view,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Reads a layout document.
///
/// # Returns
///
/// The loaded layout, or an error only when the text is not JSON or its top
/// level is neither an object nor an array.
pub fn from_json(json: &str) -> Result<LoadedLayout, LayoutError> {
    let value: Value = serde_json::from_str(json)?;
    from_value(&value)
}

/// Reads a layout document that has already been parsed.
pub fn from_value(value: &Value) -> Result<LoadedLayout, LayoutError> {
    let (rack_values, line_values, connection_values, view) = match value {
        Value::Array(racks) => (racks.as_slice(), &[][..], &[][..], ViewState::default()),
        Value::Object(doc) => {
            let view = field(doc, &["canvasView", "canvas_view"])
                .map(|v| match serde_json::from_value::<ViewState>(v.clone()) {
                    Ok(view) => view.sanitized(),
                    Err(err) => {
                        log::warn!("Ignoring unreadable canvas view: {err}");
                        ViewState::default()
                    }
                })
                .unwrap_or_default();
            (
                array_field(doc, &["racks"])?,
                array_field(doc, &["flowLines", "flow_lines"])?,
                array_field(doc, &["tubeConnections", "tube_connections"])?,
                view,
            )
        }
        _ => {
            return Err(LayoutError::InvalidFormat(
                "expected an object or an array of racks".into(),
            ))
        }
    };

    let mut layout = Layout::new();
    let mut report = LoadReport::default();

    for (i, value) in rack_values.iter().enumerate() {
        match parse_rack(value, i) {
            Some(mut rack) => {
                if layout.rack_by_id(rack.id).is_some() {
                    log::warn!("Duplicate rack id {}; assigning a new one", rack.id);
                    rack.id = Uuid::new_v4();
                }
                layout.add_rack(rack);
            }
            None => report.skipped_racks += 1,
        }
    }

    for value in line_values {
        match serde_json::from_value::<FlowLine>(value.clone()) {
            Ok(line) => {
                layout.add_flow_line(line);
            }
            Err(err) => {
                log::warn!("Skipping flow line: {err}");
                report.skipped_flow_lines += 1;
            }
        }
    }

    for value in connection_values {
        match serde_json::from_value::<TubeConnection>(value.clone()) {
            Ok(connection) => layout.connections.push(connection),
            Err(err) => {
                log::warn!("Skipping tube connection: {err}");
                report.skipped_connections += 1;
            }
        }
    }
    let pruned = layout.prune_connections();
    if pruned > 0 {
        log::warn!("Dropped {pruned} connection(s) referencing missing tubes");
    }
    report.skipped_connections += pruned;

    report.racks = layout.racks.len();
    report.flow_lines = layout.flow_lines.len();
    report.connections = layout.connections.len();
    log::info!(
        "Loaded layout: {} racks, {} lines, {} connections ({} racks skipped)",
        report.racks,
        report.flow_lines,
        report.connections,
        report.skipped_racks
    );

    Ok(LoadedLayout {
        layout,
        view,
        report,
    })
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn array_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Result<&'a [Value], LayoutError> {
    match field(obj, keys) {
        None => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(LayoutError::InvalidFormat(format!("`{}` must be an array", keys[0]))),
    }
}

/// Numbers may also arrive as numeric strings in hand-edited files.
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn count(value: &Value) -> Option<usize> {
    let n = number(value)?;
    (n >= 1.0 && n.fract() == 0.0).then_some(n as usize)
}

fn parse_position(obj: &Map<String, Value>) -> Option<Point> {
    if let Some(Value::Object(pos)) = field(obj, &["pos"]) {
        let x = pos.get("x").and_then(number)?;
        let y = pos.get("y").and_then(number)?;
        return Some(Point::new(x, y));
    }
    let x = field(obj, &["posX", "pos_x"]).and_then(number)?;
    let y = field(obj, &["posY", "pos_y"]).and_then(number)?;
    Some(Point::new(x, y))
}

fn parse_tubes(obj: &Map<String, Value>) -> Vec<TubeState> {
    if let Some(Value::Array(tubes)) = field(obj, &["tubes"]) {
        return tubes
            .iter()
            .map(|t| serde_json::from_value::<TubeState>(t.clone()).unwrap_or_default())
            .collect();
    }
    if let Some(Value::Array(colors)) = field(obj, &["tubeColors", "tube_colors"]) {
        return colors
            .iter()
            .map(|c| {
                let color = c.as_str().map(|s| FuseColor::from(s.to_string()));
                TubeState::with_color(color.unwrap_or_default())
            })
            .collect();
    }
    Vec::new()
}

/// Builds a rack from one record, or `None` if its geometry is unusable.
fn parse_rack(value: &Value, index: usize) -> Option<Rack> {
    let Value::Object(obj) = value else {
        log::warn!("Skipping rack record {index}: not an object");
        return None;
    };

    let rack_type = field(obj, &["type"])
        .and_then(Value::as_str)
        .and_then(RackType::from_tag);
    let cols = field(obj, &["cols", "x_tubes", "xTubes"]).and_then(count);
    let rows = field(obj, &["rows", "y_tubes", "yTubes"]).and_then(count);
    let pos = parse_position(obj);

    let (Some(rack_type), Some(cols), Some(rows), Some(pos)) = (rack_type, cols, rows, pos) else {
        log::warn!(
            "Skipping rack record {index} ({}): missing or invalid type, cols, rows or pos",
            obj.get("id").and_then(Value::as_str).unwrap_or("no id")
        );
        return None;
    };
    if let Err(err) = Rack::validate_counts(cols, rows) {
        log::warn!("Skipping rack record {index}: {err}");
        return None;
    }

    let id = field(obj, &["id"])
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let name = field(obj, &["name"])
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} {}", rack_type.label(), index + 1));
    let tube_diameter = field(obj, &["tubeDiameter", "tube_diameter"])
        .and_then(number)
        .filter(|d| Rack::validate_params(cols, rows, *d).is_ok())
        .unwrap_or(DEFAULT_TUBE_DIAMETER);
    let rotation = field(obj, &["rotationDeg", "rotation_angle", "rotation"])
        .and_then(number)
        .map(Rotation::from)
        .unwrap_or_default();

    let mut rack = Rack {
        id,
        name,
        rack_type,
        cols,
        rows,
        pos,
        tube_diameter,
        rotation,
        tubes: parse_tubes(obj),
    };
    if rack.tubes.len() != rack.tube_count() {
        log::debug!(
            "Rack {} has {} tube records for {} tubes; normalizing",
            rack.id,
            rack.tubes.len(),
            rack.tube_count()
        );
        rack.normalize_tubes();
    }
    Some(rack)
}
