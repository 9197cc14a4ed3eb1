//! Rack geometry: tube placement, outlines, hit-testing and rotated visual order.
//!
//! Every rack is laid out in its own unrotated local frame with the origin at the
//! top-left corner of its padded bounding rectangle. Local points are rotated about
//! the rectangle's center and then translated so that this center lands on
//! `rack.pos`:
//!
//! ```text
//! world = rack.pos - local_center + rotate(local, local_center)
//! ```
//!
//! Tube indices always refer to the unrotated grid. Rotation changes where a tube
//! is drawn, never which index it has.

use crate::constants::*;
use crate::types::{FlowLine, FlowLineId, Point, Rack, RackType, Rotation};

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    /// Left edge
    pub min_x: f64,
    /// Top edge
    pub min_y: f64,
    /// Right edge
    pub max_x: f64,
    /// Bottom edge
    pub max_y: f64,
}

impl Bounds {
    /// Smallest box containing every point. Empty input gives a zero box.
    pub fn from_points(points: &[Point]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };
        points.iter().skip(1).fold(
            Bounds {
                min_x: first.x,
                min_y: first.y,
                max_x: first.x,
                max_y: first.y,
            },
            |b, p| Bounds {
                min_x: b.min_x.min(p.x),
                min_y: b.min_y.min(p.y),
                max_x: b.max_x.max(p.x),
                max_y: b.max_y.max(p.y),
            },
        )
    }

    /// Horizontal extent.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Vertical extent.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Whether `p` lies inside or on the edge.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Grows the box by `margin` on every side.
    pub fn expand(&self, margin: f64) -> Self {
        Bounds {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }
}

/// A tube center in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TubePlacement {
    /// Index into the rack's tube array
    pub index: usize,
    /// World-space center
    pub center: Point,
    /// Diameter used for drawing and hit-testing
    pub diameter: f64,
}

/// World-space geometry of one rack.
#[derive(Debug, Clone, PartialEq)]
pub struct RackGeometry {
    /// Tube centers, in index order
    pub tubes: Vec<TubePlacement>,
    /// Rotated outline, clockwise from the unrotated top-left corner
    pub outline: [Point; 4],
    /// Rotated outlines of the fan segments; empty for crates
    pub segments: Vec<[Point; 4]>,
    /// Width and height before rotation
    pub unrotated_size: (f64, f64),
    /// Axis-aligned box around the rotated outline
    pub bounds: Bounds,
}

impl RackGeometry {
    /// Width of the rotated bounding box.
    pub fn bbox_width(&self) -> f64 {
        self.bounds.width()
    }

    /// Height of the rotated bounding box.
    pub fn bbox_height(&self) -> f64 {
        self.bounds.height()
    }

    /// Whether `p` is inside the rack outline.
    pub fn contains(&self, p: Point) -> bool {
        point_in_polygon(p, &self.outline)
    }

    /// Index of the tube whose circle contains `p`.
    pub fn tube_at(&self, p: Point) -> Option<usize> {
        self.tubes
            .iter()
            .find(|t| t.center.distance(p) <= t.diameter / 2.0)
            .map(|t| t.index)
    }
}

/// Rotates `p` about `center` by a quarter-turn multiple.
///
/// Uses the standard counter-clockwise rotation matrix in a y-down frame. Quarter
/// turns are computed exactly so that repeated rotations do not drift.
pub fn rotate_point(p: Point, center: Point, rotation: Rotation) -> Point {
    let dx = p.x - center.x;
    let dy = p.y - center.y;
    let (rx, ry) = match rotation {
        Rotation::Deg0 => (dx, dy),
        Rotation::Deg90 => (-dy, dx),
        Rotation::Deg180 => (-dx, -dy),
        Rotation::Deg270 => (dy, -dx),
    };
    Point::new(center.x + rx, center.y + ry)
}

/// Size of the tube content area (without outer padding).
pub fn content_size(rack_type: RackType, cols: usize, rows: usize, diameter: f64) -> (f64, f64) {
    let spacing = TUBE_SPACING_RATIO * diameter;
    let run = |n: usize| n as f64 * diameter + n.saturating_sub(1) as f64 * spacing;
    match rack_type {
        RackType::Crate => (run(cols), run(rows)),
        RackType::Fan => {
            let padding = FAN_PADDING_RATIO * diameter;
            let segment_width = diameter + 2.0 * padding;
            let gap = INTER_FAN_SPACING_RATIO * diameter;
            let width = cols as f64 * segment_width + cols.saturating_sub(1) as f64 * gap;
            (width, run(rows) + 2.0 * padding)
        }
    }
}

/// Size of the padded rectangle before rotation.
pub fn unrotated_size(rack: &Rack) -> (f64, f64) {
    let (w, h) = content_size(rack.rack_type, rack.cols, rack.rows, rack.tube_diameter);
    (w + 2.0 * RACK_OUTER_PADDING, h + 2.0 * RACK_OUTER_PADDING)
}

/// Center of tube `index` in the unrotated local frame.
///
/// Crate tubes are indexed row-major (`row * cols + col`); fan tubes are indexed
/// segment by segment (`segment * rows + tube`).
pub fn local_tube_center(rack_type: RackType, cols: usize, rows: usize, diameter: f64, index: usize) -> Point {
    let pitch = diameter * (1.0 + TUBE_SPACING_RATIO);
    let half = diameter / 2.0;
    match rack_type {
        RackType::Crate => {
            let col = index % cols.max(1);
            let row = index / cols.max(1);
            Point::new(
                RACK_OUTER_PADDING + col as f64 * pitch + half,
                RACK_OUTER_PADDING + row as f64 * pitch + half,
            )
        }
        RackType::Fan => {
            let padding = FAN_PADDING_RATIO * diameter;
            let segment = index / rows.max(1);
            let tube = index % rows.max(1);
            Point::new(
                fan_segment_left(diameter, segment) + padding + half,
                RACK_OUTER_PADDING + padding + tube as f64 * pitch + half,
            )
        }
    }
}

fn fan_segment_left(diameter: f64, segment: usize) -> f64 {
    let segment_width = diameter * (1.0 + 2.0 * FAN_PADDING_RATIO);
    let gap = INTER_FAN_SPACING_RATIO * diameter;
    RACK_OUTER_PADDING + segment as f64 * (segment_width + gap)
}

/// Fan segment holding tube `index`.
pub fn fan_segment_of(rows: usize, index: usize) -> usize {
    index / rows.max(1)
}

/// Maps a local point of `rack` into world space.
fn to_world(rack: &Rack, local: Point, center: Point) -> Point {
    rack.pos - center + rotate_point(local, center, rack.rotation)
}

fn rect_corners(min: Point, max: Point) -> [Point; 4] {
    [
        min,
        Point::new(max.x, min.y),
        max,
        Point::new(min.x, max.y),
    ]
}

/// Rotated outline of `rack` in world space.
pub fn rack_outline(rack: &Rack) -> [Point; 4] {
    let (w, h) = unrotated_size(rack);
    let center = Point::new(w / 2.0, h / 2.0);
    rect_corners(Point::ZERO, Point::new(w, h)).map(|p| to_world(rack, p, center))
}

/// Axis-aligned world bounds of `rack`.
pub fn rack_bounds(rack: &Rack) -> Bounds {
    Bounds::from_points(&rack_outline(rack))
}

/// Computes the full world-space geometry of a rack.
///
/// The caller guarantees positive dimensions; no validation happens here.
pub fn rack_geometry(rack: &Rack) -> RackGeometry {
    let (w, h) = unrotated_size(rack);
    let center = Point::new(w / 2.0, h / 2.0);
    let diameter = rack.effective_tube_diameter();

    let tubes = (0..rack.tube_count())
        .map(|index| TubePlacement {
            index,
            center: to_world(
                rack,
                local_tube_center(rack.rack_type, rack.cols, rack.rows, rack.tube_diameter, index),
                center,
            ),
            diameter,
        })
        .collect();

    let segments = match rack.rack_type {
        RackType::Crate => Vec::new(),
        RackType::Fan => {
            let d = rack.tube_diameter;
            let segment_width = d * (1.0 + 2.0 * FAN_PADDING_RATIO);
            let (_, content_h) = content_size(RackType::Fan, rack.cols, rack.rows, d);
            (0..rack.cols)
                .map(|segment| {
                    let x1 = fan_segment_left(d, segment);
                    let min = Point::new(x1, RACK_OUTER_PADDING);
                    let max = Point::new(x1 + segment_width, RACK_OUTER_PADDING + content_h);
                    rect_corners(min, max).map(|p| to_world(rack, p, center))
                })
                .collect()
        }
    };

    let outline = rect_corners(Point::ZERO, Point::new(w, h)).map(|p| to_world(rack, p, center));

    RackGeometry {
        tubes,
        outline,
        segments,
        unrotated_size: (w, h),
        bounds: Bounds::from_points(&outline),
    }
}

/// Ray-casting point-in-polygon test.
pub fn point_in_polygon(p: Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Shortest distance from `p` to the segment `a`-`b`.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len_sq = ab.x * ab.x + ab.y * ab.y;
    if len_sq == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab.scale(t))
}

/// Topmost rack whose outline contains `p`, searching front to back.
pub fn rack_at(racks: &[Rack], p: Point) -> Option<&Rack> {
    racks
        .iter()
        .rev()
        .find(|rack| rack_bounds(rack).contains(p) && point_in_polygon(p, &rack_outline(rack)))
}

/// Topmost flow line within `tolerance` world units of `p`.
pub fn flow_line_at(lines: &[FlowLine], p: Point, tolerance: f64) -> Option<FlowLineId> {
    lines
        .iter()
        .rev()
        .find(|line| {
            let bounds = Bounds::from_points(&[line.start(), line.end()]).expand(tolerance);
            bounds.contains(p) && distance_to_segment(p, line.start(), line.end()) <= tolerance
        })
        .map(|line| line.id)
}

/// Visual grid dimensions `(columns, rows)` after rotation.
pub fn visual_grid_size(cols: usize, rows: usize, rotation: Rotation) -> (usize, usize) {
    if rotation.swaps_axes() {
        (rows, cols)
    } else {
        (cols, rows)
    }
}

/// Visual `(column, row)` of tube `index` when the rack is displayed rotated.
///
/// For crates the logical cell is `(index % cols, index / cols)`; for fans it is
/// `(segment, tube)` with `segment = index / rows`.
pub fn visual_cell(rack_type: RackType, cols: usize, rows: usize, rotation: Rotation, index: usize) -> (usize, usize) {
    let (c, r) = match rack_type {
        RackType::Crate => (index % cols.max(1), index / cols.max(1)),
        RackType::Fan => (index / rows.max(1), index % rows.max(1)),
    };
    let last_col = cols.saturating_sub(1);
    let last_row = rows.saturating_sub(1);
    match rotation {
        Rotation::Deg0 => (c, r),
        Rotation::Deg90 => (r, last_col - c),
        Rotation::Deg180 => (last_col - c, last_row - r),
        Rotation::Deg270 => (last_row - r, c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    const EPS: f64 = 1e-9;

    fn assert_close(actual: Point, expected: Point) {
        assert!(
            (actual.x - expected.x).abs() < EPS && (actual.y - expected.y).abs() < EPS,
            "expected {expected:?}, got {actual:?}"
        );
    }

    fn rack(rack_type: RackType, cols: usize, rows: usize) -> Rack {
        Rack::new("R".into(), rack_type, cols, rows, Point::new(50.0, 50.0), 20.0)
    }

    #[test]
    fn test_rotate_point_quarter_turns() {
        let c = Point::new(10.0, 10.0);
        let p = Point::new(20.0, 10.0);
        assert_close(rotate_point(p, c, Rotation::Deg0), p);
        assert_close(rotate_point(p, c, Rotation::Deg90), Point::new(10.0, 20.0));
        assert_close(rotate_point(p, c, Rotation::Deg180), Point::new(0.0, 10.0));
        assert_close(rotate_point(p, c, Rotation::Deg270), Point::new(10.0, 0.0));
    }

    #[test]
    fn test_crate_scenario_tube_positions() {
        let mut r = rack(RackType::Crate, 3, 2);
        let geo = rack_geometry(&r);

        assert_eq!(geo.unrotated_size, (78.0, 54.0));
        // Center of the rack sits on `pos`, so the top-left is (11, 23).
        assert_close(geo.outline[0], Point::new(11.0, 23.0));
        assert_close(geo.tubes[0].center, Point::new(26.0, 38.0));
        assert_close(geo.tubes[1].center, Point::new(50.0, 38.0));
        assert_close(geo.tubes[3].center, Point::new(26.0, 62.0));

        r.rotation = Rotation::Deg90;
        let geo = rack_geometry(&r);
        assert_close(geo.tubes[0].center, Point::new(62.0, 26.0));
        // Index steps now move along y instead of x.
        assert_close(geo.tubes[1].center, Point::new(62.0, 50.0));
    }

    #[test]
    fn test_rotation_keeps_rack_center() {
        for rotation in Rotation::ALL {
            let mut r = rack(RackType::Fan, 4, 2);
            r.rotation = rotation;
            let b = rack_bounds(&r);
            assert_close(
                Point::new((b.min_x + b.max_x) / 2.0, (b.min_y + b.max_y) / 2.0),
                r.pos,
            );
        }
    }

    #[test]
    fn test_fan_has_one_segment_outline_per_column() {
        for rotation in Rotation::ALL {
            let mut r = rack(RackType::Fan, 2, 3);
            r.rotation = rotation;
            let geo = rack_geometry(&r);

            assert_eq!(geo.segments.len(), 2);
            for (segment, outline) in geo.segments.iter().enumerate() {
                let inside: Vec<usize> = geo
                    .tubes
                    .iter()
                    .filter(|t| point_in_polygon(t.center, outline))
                    .map(|t| t.index)
                    .collect();
                assert_eq!(inside.len(), 3, "segment {segment} at {rotation:?}");
                assert!(inside.iter().all(|i| fan_segment_of(3, *i) == segment));
            }
        }
    }

    #[test]
    fn test_fan_dimensions() {
        let r = rack(RackType::Fan, 2, 3);
        // Two 28-wide segments with a 10 gap, three tubes high plus padding.
        assert_eq!(unrotated_size(&r), (76.0, 86.0));
        assert!(rack_geometry(&rack(RackType::Crate, 2, 3)).segments.is_empty());
    }

    #[test]
    fn test_small_tubes_use_minimum_effective_diameter() {
        let mut r = rack(RackType::Crate, 1, 1);
        r.tube_diameter = 4.0;
        let geo = rack_geometry(&r);
        assert_eq!(geo.tubes[0].diameter, MIN_EFFECTIVE_TUBE_DIAMETER);
    }

    #[test]
    fn test_tube_at_hits_circle_only() {
        let geo = rack_geometry(&rack(RackType::Crate, 3, 2));
        assert_eq!(geo.tube_at(Point::new(26.0, 38.0)), Some(0));
        assert_eq!(geo.tube_at(Point::new(50.0, 62.0)), Some(4));
        // Gap between tubes 0 and 1.
        assert_eq!(geo.tube_at(Point::new(38.0, 38.0)), None);
    }

    #[test]
    fn test_point_in_polygon() {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(point_in_polygon(Point::new(5.0, 5.0), &square));
        assert!(!point_in_polygon(Point::new(15.0, 5.0), &square));
        assert!(!point_in_polygon(Point::new(5.0, -1.0), &square));
        assert!(!point_in_polygon(Point::new(5.0, 5.0), &square[..2]));

        let concave = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(5.0, 5.0),
            Point::new(0.0, 10.0),
        ];
        assert!(!point_in_polygon(Point::new(5.0, 8.0), &concave));
        assert!(point_in_polygon(Point::new(5.0, 2.0), &concave));
    }

    #[test]
    fn test_distance_to_segment() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert!((distance_to_segment(Point::new(5.0, 3.0), a, b) - 3.0).abs() < EPS);
        assert!((distance_to_segment(Point::new(13.0, 4.0), a, b) - 5.0).abs() < EPS);
        assert!((distance_to_segment(Point::new(3.0, 4.0), a, a) - 5.0).abs() < EPS);
    }

    #[test]
    fn test_rack_at_prefers_topmost() {
        let bottom = rack(RackType::Crate, 3, 3);
        let top = rack(RackType::Crate, 1, 1);
        let racks = vec![bottom.clone(), top.clone()];

        assert_eq!(rack_at(&racks, Point::new(50.0, 50.0)).map(|r| r.id), Some(top.id));
        assert_eq!(rack_at(&racks, Point::new(20.0, 20.0)).map(|r| r.id), Some(bottom.id));
        assert!(rack_at(&racks, Point::new(500.0, 500.0)).is_none());
    }

    #[test]
    fn test_flow_line_at_uses_tolerance() {
        let line = FlowLine::new(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        let lines = vec![line.clone()];
        assert_eq!(flow_line_at(&lines, Point::new(50.0, 4.0), 5.0), Some(line.id));
        assert_eq!(flow_line_at(&lines, Point::new(50.0, 6.0), 5.0), None);
        assert_eq!(flow_line_at(&lines, Point::new(104.0, 0.0), 5.0), Some(line.id));
    }

    #[test]
    fn test_visual_cell_crate_rotations() {
        // 3 columns, 2 rows; tube 0 is the top-left logical cell.
        assert_eq!(visual_cell(RackType::Crate, 3, 2, Rotation::Deg0, 0), (0, 0));
        assert_eq!(visual_cell(RackType::Crate, 3, 2, Rotation::Deg90, 0), (0, 2));
        assert_eq!(visual_cell(RackType::Crate, 3, 2, Rotation::Deg180, 0), (2, 1));
        assert_eq!(visual_cell(RackType::Crate, 3, 2, Rotation::Deg270, 0), (1, 0));
        assert_eq!(visual_grid_size(3, 2, Rotation::Deg90), (2, 3));
    }

    #[test]
    fn test_visual_cell_fan_is_segment_major() {
        // Tube 1 is the second tube of the first segment.
        assert_eq!(visual_cell(RackType::Fan, 2, 3, Rotation::Deg0, 1), (0, 1));
        assert_eq!(visual_cell(RackType::Fan, 2, 3, Rotation::Deg0, 3), (1, 0));
        assert_eq!(visual_cell(RackType::Fan, 2, 3, Rotation::Deg90, 3), (0, 0));
    }

    proptest! {
        #[test]
        fn rotated_bbox_swaps_on_quarter_turns(
            cols in 1usize..12,
            rows in 1usize..12,
            fan in any::<bool>(),
            diameter in 3.0f64..60.0,
        ) {
            let rack_type = if fan { RackType::Fan } else { RackType::Crate };
            let mut r = Rack::new("P".into(), rack_type, cols, rows, Point::new(3.0, -7.0), diameter);
            let (w, h) = unrotated_size(&r);
            for rotation in Rotation::ALL {
                r.rotation = rotation;
                let geo = rack_geometry(&r);
                let (ew, eh) = if rotation.swaps_axes() { (h, w) } else { (w, h) };
                prop_assert!((geo.bbox_width() - ew).abs() < 1e-6);
                prop_assert!((geo.bbox_height() - eh).abs() < 1e-6);
            }
        }

        #[test]
        fn tube_indices_are_stable_under_rotation(
            cols in 1usize..10,
            rows in 1usize..10,
            fan in any::<bool>(),
        ) {
            let rack_type = if fan { RackType::Fan } else { RackType::Crate };
            let mut r = Rack::new("P".into(), rack_type, cols, rows, Point::ZERO, 20.0);
            for rotation in Rotation::ALL {
                r.rotation = rotation;
                let geo = rack_geometry(&r);
                let indices: Vec<usize> = geo.tubes.iter().map(|t| t.index).collect();
                prop_assert_eq!(indices, (0..cols * rows).collect::<Vec<_>>());
                prop_assert_eq!(r.tubes.len(), cols * rows);
                for t in &geo.tubes {
                    prop_assert!(point_in_polygon(t.center, &geo.outline));
                }
            }
        }

        #[test]
        fn visual_cells_cover_the_rotated_grid(
            cols in 1usize..9,
            rows in 1usize..9,
            fan in any::<bool>(),
        ) {
            let rack_type = if fan { RackType::Fan } else { RackType::Crate };
            for rotation in Rotation::ALL {
                let (vc, vr) = visual_grid_size(cols, rows, rotation);
                let cells: HashSet<(usize, usize)> = (0..cols * rows)
                    .map(|i| visual_cell(rack_type, cols, rows, rotation, i))
                    .collect();
                prop_assert_eq!(cells.len(), cols * rows);
                prop_assert!(cells.iter().all(|(c, r)| *c < vc && *r < vr));
            }
        }
    }
}
