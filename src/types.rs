//! Core data types for the rack planner.
//!
//! This module defines the layout data model: racks and their tubes, free-floating
//! flow lines, tube-to-tube connections, the selection, and the [`Layout`] scene
//! collection that owns them.

use crate::constants::*;
use crate::error::PlannerError;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};
use uuid::Uuid;

/// Unique identifier for racks.
pub type RackId = Uuid;

/// Unique identifier for flow lines.
pub type FlowLineId = Uuid;

/// Unique identifier for tube connections.
pub type ConnectionId = Uuid;

/// A point in world (or, where noted, screen) space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate (grows downwards)
    pub y: f64,
}

impl Point {
    /// The origin.
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    /// Creates a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Multiplies both coordinates by `factor`.
    pub fn scale(self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// The two rack layout archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RackType {
    /// Dense rectangular grid of tubes
    #[default]
    Crate,
    /// Columns of independently padded segments, each holding a vertical run of tubes
    Fan,
}

impl RackType {
    /// Both archetypes, in menu order.
    pub const ALL: [RackType; 2] = [RackType::Crate, RackType::Fan];

    /// Display name, also used as the persisted tag.
    pub fn label(self) -> &'static str {
        match self {
            RackType::Crate => "Crate",
            RackType::Fan => "Fan",
        }
    }

    /// Parses a persisted tag. Matching is case-insensitive.
    pub fn from_tag(tag: &str) -> Option<Self> {
        RackType::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(tag.trim()))
    }
}

/// One of the four supported rack orientations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "u16")]
pub enum Rotation {
    /// No rotation
    #[default]
    Deg0,
    /// Quarter turn clockwise on screen
    Deg90,
    /// Half turn
    Deg180,
    /// Three quarter turn
    Deg270,
}

impl Rotation {
    /// The rotation cycle, in order.
    pub const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    /// Angle in degrees.
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Angle in radians.
    pub fn radians(self) -> f64 {
        f64::from(self.degrees()).to_radians()
    }

    /// The next rotation in the cycle, wrapping from 270 back to 0.
    pub fn next(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }

    /// Whether the rack's width and height are exchanged on screen.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Exact conversion from degrees. Full turns are folded away.
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }
}

impl From<f64> for Rotation {
    /// Unsupported angles fall back to no rotation.
    fn from(value: f64) -> Self {
        if !value.is_finite() || value.fract() != 0.0 {
            return Rotation::Deg0;
        }
        Rotation::from_degrees(value as i64).unwrap_or_default()
    }
}

impl From<Rotation> for u16 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

/// The fuse palette. Order matters: it is the tube click-cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FuseColor {
    /// Fastest fuse
    White,
    /// Fast fuse
    Yellow,
    /// Default fuse
    #[default]
    Pink,
    /// Slow fuse
    Blue,
    /// Slower fuse
    Orange,
    /// Slowest fuse
    Green,
}

impl FuseColor {
    /// The palette in cycle order.
    pub const ALL: [FuseColor; 6] = [
        FuseColor::White,
        FuseColor::Yellow,
        FuseColor::Pink,
        FuseColor::Blue,
        FuseColor::Orange,
        FuseColor::Green,
    ];

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            FuseColor::White => "White",
            FuseColor::Yellow => "Yellow",
            FuseColor::Pink => "Pink",
            FuseColor::Blue => "Blue",
            FuseColor::Orange => "Orange",
            FuseColor::Green => "Green",
        }
    }

    /// Persisted color token.
    pub fn token(self) -> &'static str {
        match self {
            FuseColor::White => "white",
            FuseColor::Yellow => "yellow",
            FuseColor::Pink => "pink",
            FuseColor::Blue => "lightblue",
            FuseColor::Orange => "orange",
            FuseColor::Green => "lightgreen",
        }
    }

    /// Burn rate in seconds per foot of fuse.
    pub fn burn_rate_secs_per_foot(self) -> f64 {
        match self {
            FuseColor::White => 0.75,
            FuseColor::Yellow => 1.5,
            FuseColor::Pink => 10.0,
            FuseColor::Blue => 15.0,
            FuseColor::Orange => 18.0,
            FuseColor::Green => 30.0,
        }
    }

    /// RGB value used when painting the tube.
    pub fn rgb(self) -> [u8; 3] {
        match self {
            FuseColor::White => [255, 255, 255],
            FuseColor::Yellow => [255, 255, 0],
            FuseColor::Pink => [255, 192, 203],
            FuseColor::Blue => [173, 216, 230],
            FuseColor::Orange => [255, 165, 0],
            FuseColor::Green => [144, 238, 144],
        }
    }

    /// The next color in the palette, wrapping around.
    pub fn next(self) -> Self {
        let idx = FuseColor::ALL.iter().position(|c| *c == self).unwrap_or(0);
        FuseColor::ALL[(idx + 1) % FuseColor::ALL.len()]
    }

    /// Looks up a color by token or display name, ignoring case.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim();
        FuseColor::ALL.into_iter().find(|c| {
            c.token().eq_ignore_ascii_case(token) || c.name().eq_ignore_ascii_case(token)
        })
    }
}

impl From<String> for FuseColor {
    /// Unknown colors become the default color.
    fn from(value: String) -> Self {
        FuseColor::from_token(&value).unwrap_or_default()
    }
}

impl From<FuseColor> for String {
    fn from(value: FuseColor) -> Self {
        value.token().to_string()
    }
}

/// Shape used to draw a tube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TubeShape {
    /// Circle
    Round,
    /// Axis-aligned square in rack space
    Square,
}

/// How a firework type is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TubeVisual {
    /// Outline color
    pub outline: [u8; 3],
    /// Multiplier on the default outline width
    pub width_factor: f32,
    /// Tube shape
    pub shape: TubeShape,
}

/// Effect category of the firework loaded in a tube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FireworkType {
    /// Plain shell
    #[default]
    Standard,
    /// Shell with a whistling tail
    WhistlingTail,
    /// Shell with a tiger tail
    TigerTail,
    /// Ring shell
    Ring,
    /// Nishiki kamuro shell
    Nishiki,
}

impl FireworkType {
    /// All types, in menu order.
    pub const ALL: [FireworkType; 5] = [
        FireworkType::WhistlingTail,
        FireworkType::TigerTail,
        FireworkType::Ring,
        FireworkType::Nishiki,
        FireworkType::Standard,
    ];

    /// Display name, also used as the persisted tag.
    pub fn label(self) -> &'static str {
        match self {
            FireworkType::Standard => "Standard",
            FireworkType::WhistlingTail => "Whistling Tail",
            FireworkType::TigerTail => "Tiger Tail",
            FireworkType::Ring => "Ring",
            FireworkType::Nishiki => "Nishiki",
        }
    }

    /// Drawing hints for this type.
    pub fn visual(self) -> TubeVisual {
        let (outline, width_factor, shape) = match self {
            FireworkType::Standard => ([0, 0, 0], 1.0, TubeShape::Round),
            FireworkType::WhistlingTail => ([255, 140, 0], 1.5, TubeShape::Square),
            FireworkType::TigerTail => ([139, 69, 19], 1.5, TubeShape::Round),
            FireworkType::Ring => ([148, 0, 211], 1.5, TubeShape::Square),
            FireworkType::Nishiki => ([218, 165, 32], 1.5, TubeShape::Round),
        };
        TubeVisual {
            outline,
            width_factor,
            shape,
        }
    }

    /// Parses a persisted tag, ignoring case.
    pub fn from_tag(tag: &str) -> Option<Self> {
        FireworkType::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(tag.trim()))
    }
}

impl From<String> for FireworkType {
    /// Unknown types become `Standard`.
    fn from(value: String) -> Self {
        FireworkType::from_tag(&value).unwrap_or_default()
    }
}

impl From<FireworkType> for String {
    fn from(value: FireworkType) -> Self {
        value.label().to_string()
    }
}

/// Per-tube payload. Tubes have no identity of their own; they are addressed
/// as `(rack id, tube index)`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TubeState {
    /// Fuse color
    pub color: FuseColor,
    /// Firework loaded in the tube
    #[serde(rename = "type")]
    pub firework_type: FireworkType,
    /// Reserved launch angle; not used by the layout
    pub angle: f64,
    /// Lift time in seconds
    #[serde(alias = "lift_time")]
    pub lift_time: f64,
    /// Free-form cue label
    pub cue: String,
}

impl TubeState {
    /// A default tube with the given color.
    pub fn with_color(color: FuseColor) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }
}

/// A rack of firework tubes placed on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rack {
    /// Unique identifier for this rack
    pub id: RackId,
    /// User-displayable name
    pub name: String,
    /// Layout archetype
    #[serde(rename = "type")]
    pub rack_type: RackType,
    /// Columns in the unrotated grid (fan segments for a fan rack)
    pub cols: usize,
    /// Rows in the unrotated grid (tubes per segment for a fan rack)
    pub rows: usize,
    /// World position of the rack's center
    pub pos: Point,
    /// Tube diameter in world units
    pub tube_diameter: f64,
    /// Orientation
    #[serde(rename = "rotationDeg")]
    pub rotation: Rotation,
    /// Tube payloads; always `cols * rows` long
    pub tubes: Vec<TubeState>,
}

impl Rack {
    /// Creates a new unrotated rack filled with default tubes.
    ///
    /// Callers are expected to have validated the dimensions; see
    /// [`Rack::validate_params`].
    pub fn new(name: String, rack_type: RackType, cols: usize, rows: usize, pos: Point, tube_diameter: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            rack_type,
            cols,
            rows,
            pos,
            tube_diameter,
            rotation: Rotation::Deg0,
            tubes: vec![TubeState::default(); cols * rows],
        }
    }

    /// Checks the user-facing constraints on rack dimensions.
    pub fn validate_params(cols: usize, rows: usize, tube_diameter: f64) -> Result<(), PlannerError> {
        Self::validate_counts(cols, rows)?;
        if !tube_diameter.is_finite() || tube_diameter <= MIN_TUBE_DIAMETER {
            return Err(PlannerError::InvalidRackParameters {
                reason: format!("tube diameter must be greater than {MIN_TUBE_DIAMETER}"),
            });
        }
        Ok(())
    }

    /// Checks that `cols * rows` is positive and at most [`MAX_TUBES_PER_RACK`].
    pub fn validate_counts(cols: usize, rows: usize) -> Result<(), PlannerError> {
        if cols == 0 || rows == 0 {
            return Err(PlannerError::InvalidRackParameters {
                reason: "tube counts must be positive".into(),
            });
        }
        match cols.checked_mul(rows) {
            Some(total) if total <= MAX_TUBES_PER_RACK => Ok(()),
            _ => Err(PlannerError::InvalidRackParameters {
                reason: format!("a rack holds at most {MAX_TUBES_PER_RACK} tubes"),
            }),
        }
    }

    /// Number of tubes in the rack.
    pub fn tube_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Diameter used for drawing and hit-testing.
    pub fn effective_tube_diameter(&self) -> f64 {
        self.tube_diameter.max(MIN_EFFECTIVE_TUBE_DIAMETER)
    }

    /// Returns a copy with a fresh id.
    pub fn duplicate(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }

    /// Pads or truncates `tubes` so it matches `cols * rows`.
    pub fn normalize_tubes(&mut self) {
        let count = self.tube_count();
        self.tubes.resize_with(count, TubeState::default);
    }
}

/// A free annotation segment with perpendicular end caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowLine {
    /// Unique identifier for this line
    pub id: FlowLineId,
    /// Start x (world)
    pub x1: f64,
    /// Start y (world)
    pub y1: f64,
    /// End x (world)
    pub x2: f64,
    /// End y (world)
    pub y2: f64,
    /// Stroke color, either a color name or `#rrggbb`
    #[serde(default = "default_line_color")]
    pub color: String,
    /// Stroke width at zoom 1
    #[serde(default = "default_line_width")]
    pub width: f64,
    /// Optional label drawn at the midpoint
    #[serde(default)]
    pub label: String,
}

fn default_line_color() -> String {
    DEFAULT_FLOW_LINE_COLOR.to_string()
}

fn default_line_width() -> f64 {
    DEFAULT_FLOW_LINE_WIDTH
}

impl FlowLine {
    /// Creates a new unlabelled line with the default style.
    pub fn new(start: Point, end: Point) -> Self {
        Self {
            id: Uuid::new_v4(),
            x1: start.x,
            y1: start.y,
            x2: end.x,
            y2: end.y,
            color: default_line_color(),
            width: default_line_width(),
            label: String::new(),
        }
    }

    /// Start point.
    pub fn start(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    /// End point.
    pub fn end(&self) -> Point {
        Point::new(self.x2, self.y2)
    }

    /// Length in world units.
    pub fn length(&self) -> f64 {
        self.start().distance(self.end())
    }
}

/// Non-owning reference to one tube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TubeAddress {
    /// Rack holding the tube
    pub rack_id: RackId,
    /// Index into the rack's tube array
    pub tube_index: usize,
}

/// A directed edge between two tubes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TubeConnection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Source rack
    #[serde(alias = "source_rack_id")]
    pub source_rack_id: RackId,
    /// Source tube index
    #[serde(alias = "source_tube_idx")]
    pub source_tube_index: usize,
    /// Target rack
    #[serde(alias = "target_rack_id")]
    pub target_rack_id: RackId,
    /// Target tube index
    #[serde(alias = "target_tube_idx")]
    pub target_tube_index: usize,
    /// Stroke color
    #[serde(default = "default_connection_color")]
    pub color: String,
}

fn default_connection_color() -> String {
    DEFAULT_CONNECTION_COLOR.to_string()
}

impl TubeConnection {
    /// Source tube.
    pub fn source(&self) -> TubeAddress {
        TubeAddress {
            rack_id: self.source_rack_id,
            tube_index: self.source_tube_index,
        }
    }

    /// Target tube.
    pub fn target(&self) -> TubeAddress {
        TubeAddress {
            rack_id: self.target_rack_id,
            tube_index: self.target_tube_index,
        }
    }

    /// Whether either end lives on `rack_id`.
    pub fn touches(&self, rack_id: RackId) -> bool {
        self.source_rack_id == rack_id || self.target_rack_id == rack_id
    }
}

/// Currently selected racks or flow line. The two are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectionState {
    racks: Vec<RackId>,
    flow_line: Option<FlowLineId>,
}

impl SelectionState {
    /// Selected rack ids, in selection order.
    pub fn racks(&self) -> &[RackId] {
        &self.racks
    }

    /// The selected flow line, if any.
    pub fn flow_line(&self) -> Option<FlowLineId> {
        self.flow_line
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.racks.is_empty() && self.flow_line.is_none()
    }

    /// Whether `id` is among the selected racks.
    pub fn contains_rack(&self, id: RackId) -> bool {
        self.racks.contains(&id)
    }

    /// The only selected rack, when exactly one is selected.
    pub fn single_rack(&self) -> Option<RackId> {
        match self.racks.as_slice() {
            [id] => Some(*id),
            _ => None,
        }
    }

    /// Clears everything.
    pub fn clear(&mut self) {
        self.racks.clear();
        self.flow_line = None;
    }

    /// Drops the rack selection, keeping a selected flow line.
    pub fn clear_racks(&mut self) {
        self.racks.clear();
    }

    /// Selects exactly one rack.
    pub fn select_rack(&mut self, id: RackId) {
        self.racks.clear();
        self.racks.push(id);
        self.flow_line = None;
    }

    /// Replaces the rack selection, dropping duplicates.
    pub fn set_racks(&mut self, ids: impl IntoIterator<Item = RackId>) {
        self.racks.clear();
        for id in ids {
            if !self.racks.contains(&id) {
                self.racks.push(id);
            }
        }
        self.flow_line = None;
    }

    /// Adds or removes a rack. Returns whether it is selected afterwards.
    pub fn toggle_rack(&mut self, id: RackId) -> bool {
        self.flow_line = None;
        if let Some(idx) = self.racks.iter().position(|r| *r == id) {
            self.racks.remove(idx);
            false
        } else {
            self.racks.push(id);
            true
        }
    }

    /// Selects a flow line, dropping any rack selection.
    pub fn select_flow_line(&mut self, id: FlowLineId) {
        self.racks.clear();
        self.flow_line = Some(id);
    }

    /// Drops references to racks and lines that no longer exist.
    pub fn retain_existing(&mut self, layout: &Layout) {
        self.racks.retain(|id| layout.rack_by_id(*id).is_some());
        if let Some(line) = self.flow_line {
            if layout.line_by_id(line).is_none() {
                self.flow_line = None;
            }
        }
    }
}

/// The scene: racks in draw order, flow lines and tube connections.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Layout {
    /// Racks, back to front
    pub racks: Vec<Rack>,
    /// Flow lines, back to front
    pub flow_lines: Vec<FlowLine>,
    /// Tube connections
    pub connections: Vec<TubeConnection>,
}

impl Layout {
    /// Creates an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rack on top of the draw order.
    pub fn add_rack(&mut self, rack: Rack) -> RackId {
        let id = rack.id;
        self.racks.push(rack);
        id
    }

    /// Removes a rack together with every connection touching it.
    pub fn remove_rack(&mut self, id: RackId) -> Option<Rack> {
        let idx = self.racks.iter().position(|r| r.id == id)?;
        let rack = self.racks.remove(idx);
        self.connections.retain(|c| !c.touches(id));
        Some(rack)
    }

    /// Looks up a rack.
    pub fn rack_by_id(&self, id: RackId) -> Option<&Rack> {
        self.racks.iter().find(|r| r.id == id)
    }

    /// Looks up a rack for mutation.
    pub fn rack_by_id_mut(&mut self, id: RackId) -> Option<&mut Rack> {
        self.racks.iter_mut().find(|r| r.id == id)
    }

    /// Appends a flow line.
    pub fn add_flow_line(&mut self, line: FlowLine) -> FlowLineId {
        let id = line.id;
        self.flow_lines.push(line);
        id
    }

    /// Removes a flow line.
    pub fn remove_flow_line(&mut self, id: FlowLineId) -> Option<FlowLine> {
        let idx = self.flow_lines.iter().position(|l| l.id == id)?;
        Some(self.flow_lines.remove(idx))
    }

    /// Looks up a flow line.
    pub fn line_by_id(&self, id: FlowLineId) -> Option<&FlowLine> {
        self.flow_lines.iter().find(|l| l.id == id)
    }

    /// Looks up a flow line for mutation.
    pub fn line_by_id_mut(&mut self, id: FlowLineId) -> Option<&mut FlowLine> {
        self.flow_lines.iter_mut().find(|l| l.id == id)
    }

    /// Resolves a tube address.
    pub fn resolve_tube(&self, address: TubeAddress) -> Option<&TubeState> {
        self.rack_by_id(address.rack_id)?.tubes.get(address.tube_index)
    }

    /// Resolves a tube address for mutation.
    pub fn resolve_tube_mut(&mut self, address: TubeAddress) -> Option<&mut TubeState> {
        self.rack_by_id_mut(address.rack_id)?
            .tubes
            .get_mut(address.tube_index)
    }

    /// Adds a connection between two existing, distinct tubes.
    ///
    /// # Returns
    ///
    /// The new connection id, or an error if either end does not resolve or both
    /// ends are the same tube.
    pub fn add_connection(&mut self, source: TubeAddress, target: TubeAddress) -> Result<ConnectionId, PlannerError> {
        if source == target {
            return Err(PlannerError::SelfConnection);
        }
        for address in [source, target] {
            let rack = self
                .rack_by_id(address.rack_id)
                .ok_or(PlannerError::RackNotFound(address.rack_id))?;
            if address.tube_index >= rack.tubes.len() {
                return Err(PlannerError::TubeIndexOutOfRange {
                    index: address.tube_index,
                    len: rack.tubes.len(),
                });
            }
        }
        let connection = TubeConnection {
            id: Uuid::new_v4(),
            source_rack_id: source.rack_id,
            source_tube_index: source.tube_index,
            target_rack_id: target.rack_id,
            target_tube_index: target.tube_index,
            color: default_connection_color(),
        };
        let id = connection.id;
        self.connections.push(connection);
        Ok(id)
    }

    /// Removes a connection. Returns whether it existed.
    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c.id != id);
        self.connections.len() != before
    }

    /// Drops connections whose ends no longer resolve to a tube.
    ///
    /// # Returns
    ///
    /// The number of connections removed.
    pub fn prune_connections(&mut self) -> usize {
        let before = self.connections.len();
        let connections = std::mem::take(&mut self.connections);
        self.connections = connections
            .into_iter()
            .filter(|c| {
                c.source() != c.target()
                    && self.resolve_tube(c.source()).is_some()
                    && self.resolve_tube(c.target()).is_some()
            })
            .collect();
        before - self.connections.len()
    }

    /// Moves the given racks to the top of the draw order, keeping their
    /// relative order except that `top` ends up last.
    pub fn raise_to_top(&mut self, ids: &[RackId], top: Option<RackId>) {
        let (mut raised, rest): (Vec<Rack>, Vec<Rack>) = std::mem::take(&mut self.racks)
            .into_iter()
            .partition(|r| ids.contains(&r.id));
        if let Some(top) = top {
            if let Some(idx) = raised.iter().position(|r| r.id == top) {
                let rack = raised.remove(idx);
                raised.push(rack);
            }
        }
        self.racks = rest;
        self.racks.append(&mut raised);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn crate_rack(cols: usize, rows: usize) -> Rack {
        Rack::new("A".into(), RackType::Crate, cols, rows, Point::new(50.0, 50.0), 20.0)
    }

    #[test]
    fn test_rack_creation_fills_default_tubes() {
        let rack = crate_rack(3, 2);

        assert_eq!(rack.tubes.len(), 6);
        assert!(rack.tubes.iter().all(|t| t.color == FuseColor::Pink));
        assert!(rack.tubes.iter().all(|t| t.firework_type == FireworkType::Standard));
        assert_eq!(rack.rotation, Rotation::Deg0);
        assert!(!rack.id.is_nil());
    }

    #[test]
    fn test_validate_params() {
        assert!(Rack::validate_params(3, 2, 20.0).is_ok());
        assert!(Rack::validate_params(0, 2, 20.0).is_err());
        assert!(Rack::validate_params(3, 0, 20.0).is_err());
        assert!(Rack::validate_params(3, 2, 2.0).is_err());
        assert!(Rack::validate_params(3, 2, f64::NAN).is_err());
        assert!(Rack::validate_params(100, 100, 20.0).is_ok());
        assert!(Rack::validate_params(100, 101, 20.0).is_err());
        assert!(Rack::validate_params(usize::MAX, 2, 20.0).is_err());
    }

    #[test]
    fn test_rotation_cycle_wraps() {
        let mut rotation = Rotation::Deg0;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(rotation.degrees());
            rotation = rotation.next();
        }
        assert_eq!(seen, vec![0, 90, 180, 270]);
        assert_eq!(rotation, Rotation::Deg0);
    }

    #[test]
    fn test_rotation_from_unsupported_angle_is_zero() {
        assert_eq!(Rotation::from(45.0), Rotation::Deg0);
        assert_eq!(Rotation::from(-90.0), Rotation::Deg270);
        assert_eq!(Rotation::from(180.0), Rotation::Deg180);
    }

    #[test]
    fn test_fuse_color_cycle_wraps() {
        assert_eq!(FuseColor::White.next(), FuseColor::Yellow);
        assert_eq!(FuseColor::Green.next(), FuseColor::White);
        let mut color = FuseColor::Pink;
        for _ in 0..FuseColor::ALL.len() {
            color = color.next();
        }
        assert_eq!(color, FuseColor::Pink);
    }

    #[test]
    fn test_unknown_tokens_fall_back_to_defaults() {
        let tube: TubeState =
            serde_json::from_value(json!({"color": "chartreuse", "type": "Mystery"})).unwrap();
        assert_eq!(tube.color, FuseColor::Pink);
        assert_eq!(tube.firework_type, FireworkType::Standard);

        let tube: TubeState =
            serde_json::from_value(json!({"color": "lightblue", "type": "Tiger Tail", "lift_time": 1.5}))
                .unwrap();
        assert_eq!(tube.color, FuseColor::Blue);
        assert_eq!(tube.firework_type, FireworkType::TigerTail);
        assert_eq!(tube.lift_time, 1.5);
    }

    #[test]
    fn test_rack_serializes_persisted_field_names() {
        let mut rack = crate_rack(1, 1);
        rack.rotation = Rotation::Deg90;
        let value = serde_json::to_value(&rack).unwrap();

        assert_eq!(value["type"], "Crate");
        assert_eq!(value["rotationDeg"], 90);
        assert_eq!(value["tubeDiameter"], 20.0);
        assert_eq!(value["tubes"][0]["color"], "pink");
        assert_eq!(value["tubes"][0]["type"], "Standard");
        assert_eq!(value["tubes"][0]["liftTime"], 0.0);
    }

    #[test]
    fn test_remove_rack_prunes_only_touching_connections() {
        let mut layout = Layout::new();
        let a = layout.add_rack(crate_rack(2, 2));
        let b = layout.add_rack(crate_rack(2, 2));
        let c = layout.add_rack(crate_rack(2, 2));
        let addr = |rack_id, tube_index| TubeAddress { rack_id, tube_index };

        layout.add_connection(addr(a, 0), addr(b, 1)).unwrap();
        layout.add_connection(addr(c, 2), addr(a, 3)).unwrap();
        let keep = layout.add_connection(addr(b, 0), addr(c, 0)).unwrap();

        assert!(layout.remove_rack(a).is_some());
        assert_eq!(layout.connections.len(), 1);
        assert_eq!(layout.connections[0].id, keep);
    }

    #[test]
    fn test_add_connection_rejects_self_and_dangling() {
        let mut layout = Layout::new();
        let a = layout.add_rack(crate_rack(2, 1));
        let same = TubeAddress { rack_id: a, tube_index: 1 };

        assert_eq!(layout.add_connection(same, same), Err(PlannerError::SelfConnection));
        assert!(matches!(
            layout.add_connection(same, TubeAddress { rack_id: a, tube_index: 2 }),
            Err(PlannerError::TubeIndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            layout.add_connection(same, TubeAddress { rack_id: Uuid::new_v4(), tube_index: 0 }),
            Err(PlannerError::RackNotFound(_))
        ));
        assert!(layout.connections.is_empty());
    }

    #[test]
    fn test_selection_is_mutually_exclusive() {
        let mut selection = SelectionState::default();
        let rack = Uuid::new_v4();
        let line = Uuid::new_v4();

        selection.select_rack(rack);
        selection.select_flow_line(line);
        assert!(selection.racks().is_empty());
        assert_eq!(selection.flow_line(), Some(line));

        assert!(selection.toggle_rack(rack));
        assert_eq!(selection.flow_line(), None);
        assert!(!selection.toggle_rack(rack));
        assert!(selection.is_empty());
    }

    #[test]
    fn test_raise_to_top_keeps_primary_last() {
        let mut layout = Layout::new();
        let a = layout.add_rack(crate_rack(1, 1));
        let b = layout.add_rack(crate_rack(1, 1));
        let c = layout.add_rack(crate_rack(1, 1));

        layout.raise_to_top(&[a, b], Some(a));
        let order: Vec<RackId> = layout.racks.iter().map(|r| r.id).collect();
        assert_eq!(order, vec![c, b, a]);
    }

    #[test]
    fn test_normalize_tubes_pads_and_truncates() {
        let mut rack = crate_rack(2, 2);
        rack.tubes.truncate(1);
        rack.normalize_tubes();
        assert_eq!(rack.tubes.len(), 4);

        rack.tubes.push(TubeState::default());
        rack.normalize_tubes();
        assert_eq!(rack.tubes.len(), 4);
    }
}
