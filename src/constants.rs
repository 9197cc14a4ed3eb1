//! Shared application-wide constants.
//! Centralizes the rack geometry ratios, interaction thresholds and fuse estimates.

// Rack geometry
/// Default tube diameter in world units.
pub const DEFAULT_TUBE_DIAMETER: f64 = 20.0;
/// Gap between neighbouring tubes, as a fraction of the tube diameter.
pub const TUBE_SPACING_RATIO: f64 = 0.2;
/// Padding inside each fan segment on every side, as a fraction of the tube diameter.
pub const FAN_PADDING_RATIO: f64 = 0.2;
/// Gap between two fan segments, as a fraction of the tube diameter.
pub const INTER_FAN_SPACING_RATIO: f64 = 0.5;
/// Constant padding around the content of every rack (world units).
pub const RACK_OUTER_PADDING: f64 = 5.0;
/// Tubes are never hit-tested or drawn smaller than this diameter (world units).
pub const MIN_EFFECTIVE_TUBE_DIAMETER: f64 = 10.0;
/// Tube diameters must be strictly greater than this value.
pub const MIN_TUBE_DIAMETER: f64 = 2.0;
/// Upper bound on `cols * rows` for a single rack.
pub const MAX_TUBES_PER_RACK: usize = 10_000;

// Placement
/// Where the first rack lands when no position is given.
pub const DEFAULT_RACK_POS: (f64, f64) = (50.0, 50.0);
/// Horizontal gap used when suggesting the next rack position.
pub const DEFAULT_RACK_SEPARATION: f64 = 20.0;
/// Distance a nudge moves the selection (world units).
pub const NUDGE_AMOUNT: f64 = 2.0;
/// Base offset for duplicated racks (screen pixels, per axis).
pub const DUPLICATE_OFFSET: f64 = 20.0;
/// Extra stagger per additional duplicated rack (screen pixels).
pub const DUPLICATE_OFFSET_INCREMENT: f64 = 5.0;

// Canvas interactions
/// Distance under which a dragged rack edge snaps to another rack edge (screen pixels).
pub const SNAP_THRESHOLD_PX: f64 = 10.0;
/// Extra tolerance around flow lines for click detection (screen pixels).
pub const LINE_CLICK_HALO_PX: f64 = 5.0;
/// Flow lines shorter than this on screen are discarded (screen pixels).
pub const MIN_LINE_LENGTH_PX: f64 = 5.0;
/// Default grid cell size in world units.
pub const DEFAULT_GRID_SIZE: f64 = 20.0;

// Zoom
/// Smallest zoom factor.
pub const MIN_ZOOM: f64 = 0.1;
/// Largest zoom factor.
pub const MAX_ZOOM: f64 = 5.0;
/// Multiplicative step applied per wheel notch.
pub const ZOOM_STEP: f64 = 1.2;

// Undo/redo
/// Maximum number of undo history entries to retain.
pub const MAX_UNDO_STEPS: usize = 50;

// Flow lines and connections
/// Color of newly drawn flow lines.
pub const DEFAULT_FLOW_LINE_COLOR: &str = "darkred";
/// Stroke width of newly drawn flow lines (screen pixels at zoom 1).
pub const DEFAULT_FLOW_LINE_WIDTH: f64 = 2.0;
/// Length of the perpendicular caps drawn at flow line ends.
pub const FLOW_LINE_CAP_LENGTH: f64 = 6.0;
/// Color of tube-to-tube connections.
pub const DEFAULT_CONNECTION_COLOR: &str = "#00FF00";

// Fuse estimates (inches)
/// Fuse length for a reference crate of `CRATE_BASE_TUBES` tubes.
pub const CRATE_BASE_FUSE_INCHES: f64 = 70.0;
/// Tube count of the reference crate.
pub const CRATE_BASE_TUBES: f64 = 25.0;
/// Fuse lead into a fan rack.
pub const FAN_LEAD_INCHES: f64 = 3.0;
/// Fuse between two tubes in the same fan segment.
pub const FAN_INTER_TUBE_INCHES: f64 = 3.0;
/// Fuse between two fan segments.
pub const FAN_INTER_SEGMENT_INCHES: f64 = 0.0;
/// Fuse tail after the last fan tube.
pub const FAN_TAIL_INCHES: f64 = 3.0;
/// Global correction applied to every rack estimate.
pub const FUSE_SCALE_FACTOR: f64 = 0.9;
/// Inches per foot.
pub const INCHES_PER_FOOT: f64 = 12.0;

// Physical dimensions (inches)
/// Outer diameter of a physical tube.
pub const PHYSICAL_TUBE_DIAMETER: f64 = 2.0;
/// Gap between tubes in a crate.
pub const PHYSICAL_CRATE_SPACING: f64 = 0.5;
/// Gap between tubes in a fan segment.
pub const PHYSICAL_FAN_TUBE_SPACING: f64 = 0.75;
/// Width of one fan segment.
pub const PHYSICAL_FAN_SEGMENT_WIDTH: f64 = 3.0;
/// Gap between fan segments.
pub const PHYSICAL_FAN_SEGMENT_SPACING: f64 = 3.75;
