//! Derived show metrics: tube counts, fuse estimates, durations and numbering.
//!
//! These are planning estimates from fixed per-unit constants, not measurements.

use crate::constants::*;
use crate::types::{FuseColor, Layout, Rack, RackId, RackType, Rotation};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Totals for a whole layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShowSummary {
    /// Number of tubes across all racks
    pub total_tubes: usize,
    /// Estimated fuse length per color, in inches
    pub fuse_inches_by_color: BTreeMap<FuseColor, f64>,
    /// Estimated burn time in seconds
    pub duration_secs: f64,
}

impl ShowSummary {
    /// Fuse length of one color in feet.
    pub fn fuse_feet(&self, color: FuseColor) -> f64 {
        self.fuse_inches_by_color.get(&color).copied().unwrap_or(0.0) / INCHES_PER_FOOT
    }

    /// Non-zero fuse lengths in feet, ordered by color name.
    pub fn fuse_feet_by_color(&self) -> Vec<(FuseColor, f64)> {
        let mut out: Vec<(FuseColor, f64)> = self
            .fuse_inches_by_color
            .iter()
            .filter(|(_, inches)| **inches > 0.001)
            .map(|(color, inches)| (*color, inches / INCHES_PER_FOOT))
            .collect();
        out.sort_by_key(|(color, _)| color.name());
        out
    }
}

/// Unscaled fuse estimate for one rack, in inches.
///
/// Crates scale a reference length by tube count. Fans chain a lead, the
/// allowances inside and between segments, and a tail.
pub fn rack_fuse_inches(rack: &Rack) -> f64 {
    let tubes = rack.tube_count();
    if tubes == 0 {
        return 0.0;
    }
    match rack.rack_type {
        RackType::Crate => CRATE_BASE_FUSE_INCHES * tubes as f64 / CRATE_BASE_TUBES,
        RackType::Fan => {
            let segments = rack.cols;
            let within = (segments * rack.rows.saturating_sub(1)) as f64 * FAN_INTER_TUBE_INCHES;
            let between = segments.saturating_sub(1) as f64 * FAN_INTER_SEGMENT_INCHES;
            FAN_LEAD_INCHES + within + between + FAN_TAIL_INCHES
        }
    }
}

/// Tube count, per-color fuse length and duration for `layout`.
pub fn show_summary(layout: &Layout) -> ShowSummary {
    let mut summary = ShowSummary::default();
    for rack in &layout.racks {
        let tubes = rack.tube_count();
        summary.total_tubes += tubes;
        let rack_inches = rack_fuse_inches(rack);
        if tubes == 0 || rack_inches <= 0.0 {
            continue;
        }
        let per_tube = rack_inches * FUSE_SCALE_FACTOR / tubes as f64;
        for tube in &rack.tubes {
            *summary.fuse_inches_by_color.entry(tube.color).or_insert(0.0) += per_tube;
        }
    }
    summary.duration_secs = summary
        .fuse_inches_by_color
        .iter()
        .map(|(color, inches)| inches / INCHES_PER_FOOT * color.burn_rate_secs_per_foot())
        .sum();
    summary
}

/// Physical footprint of a rack in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalSize {
    /// Width in inches
    pub width_in: f64,
    /// Height in inches
    pub height_in: f64,
}

impl fmt::Display for PhysicalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\" x {:.1}\"", self.width_in, self.height_in)
    }
}

/// Estimates the built size of the unrotated rack.
pub fn physical_dimensions(rack: &Rack) -> PhysicalSize {
    let run = |n: usize, size: f64, gap: f64| n as f64 * size + n.saturating_sub(1) as f64 * gap;
    match rack.rack_type {
        RackType::Crate => PhysicalSize {
            width_in: run(rack.cols, PHYSICAL_TUBE_DIAMETER, PHYSICAL_CRATE_SPACING),
            height_in: run(rack.rows, PHYSICAL_TUBE_DIAMETER, PHYSICAL_CRATE_SPACING),
        },
        RackType::Fan => PhysicalSize {
            width_in: run(rack.cols, PHYSICAL_FAN_SEGMENT_WIDTH, PHYSICAL_FAN_SEGMENT_SPACING),
            height_in: run(rack.rows, PHYSICAL_TUBE_DIAMETER, PHYSICAL_FAN_TUBE_SPACING),
        },
    }
}

/// Tube count per color, most frequent first, ties by name.
pub fn color_breakdown(rack: &Rack) -> Vec<(FuseColor, usize)> {
    let mut counts: BTreeMap<FuseColor, usize> = BTreeMap::new();
    for tube in &rack.tubes {
        *counts.entry(tube.color).or_insert(0) += 1;
    }
    let mut out: Vec<(FuseColor, usize)> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.name().cmp(b.0.name())));
    out
}

/// Zero-based global number of each rack's first tube.
///
/// Racks are numbered left to right, then top to bottom, by their position.
pub fn global_start_indices(layout: &Layout) -> HashMap<RackId, usize> {
    let mut ordered: Vec<&Rack> = layout.racks.iter().collect();
    ordered.sort_by(|a, b| a.pos.x.total_cmp(&b.pos.x).then(a.pos.y.total_cmp(&b.pos.y)));
    let mut next = 0;
    ordered
        .into_iter()
        .map(|rack| {
            let start = next;
            next += rack.tube_count();
            (rack.id, start)
        })
        .collect()
}

/// Text shown on a tube: its cue if set, otherwise its one-based number.
///
/// `start` is the rack's global start index, or 0 for local numbering.
pub fn tube_label(rack: &Rack, index: usize, start: usize) -> String {
    match rack.tubes.get(index) {
        Some(tube) if !tube.cue.trim().is_empty() => tube.cue.trim().to_string(),
        _ => (start + index + 1).to_string(),
    }
}

/// One row of the rack inspector.
#[derive(Debug, Clone, PartialEq)]
pub struct RackSummary {
    /// Rack id
    pub id: RackId,
    /// Rack name
    pub name: String,
    /// Archetype
    pub rack_type: RackType,
    /// `"{cols}x{rows}"`
    pub dims: String,
    /// Tube count
    pub tubes: usize,
    /// Orientation
    pub rotation: Rotation,
    /// One-based global number of the first tube, when numbering is shown
    pub global_start: Option<usize>,
}

/// Inspector rows in draw order.
pub fn rack_summaries(layout: &Layout, numbering: bool) -> Vec<RackSummary> {
    let starts = if numbering {
        global_start_indices(layout)
    } else {
        HashMap::new()
    };
    layout
        .racks
        .iter()
        .map(|rack| RackSummary {
            id: rack.id,
            name: rack.name.clone(),
            rack_type: rack.rack_type,
            dims: format!("{}x{}", rack.cols, rack.rows),
            tubes: rack.tube_count(),
            rotation: rack.rotation,
            global_start: starts.get(&rack.id).map(|s| s + 1),
        })
        .collect()
}
