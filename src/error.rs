//! Error types for planner commands and layout documents.

use crate::types::{FlowLineId, RackId};
use thiserror::Error;

/// Errors returned by planner commands.
///
/// A command that returns an error has not touched the layout, the view,
/// the selection or the history.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    /// Rack parameters or numeric input failed validation.
    #[error("invalid rack parameters: {reason}")]
    InvalidRackParameters {
        /// Human readable description of the rejected value
        reason: String,
    },

    /// Grid size must be strictly positive.
    #[error("grid size must be greater than zero (got {0})")]
    InvalidGridSize(f64),

    /// The command needs at least one selected rack.
    #[error("no rack selected")]
    NoRackSelected,

    /// The command needs a selected rack or flow line.
    #[error("nothing selected")]
    NoItemSelected,

    /// The command needs exactly one selected rack.
    #[error("select exactly one rack")]
    RequiresSingleRack,

    /// The command cannot act on a flow line.
    #[error("{0} does not apply to flow lines")]
    NotApplicableToFlowLine(&'static str),

    /// No rack with this id exists.
    #[error("rack {0} not found")]
    RackNotFound(RackId),

    /// No flow line with this id exists.
    #[error("flow line {0} not found")]
    FlowLineNotFound(FlowLineId),

    /// A tube index is outside the rack's tube array.
    #[error("tube index {index} out of range for rack with {len} tubes")]
    TubeIndexOutOfRange {
        /// Offending index
        index: usize,
        /// Number of tubes in the rack
        len: usize,
    },

    /// A connection would join a tube to itself.
    #[error("cannot connect a tube to itself")]
    SelfConnection,

    /// The drawn flow line is too short to keep.
    #[error("flow line too short")]
    LineTooShort,

    /// The caller declined the deletion.
    #[error("deletion cancelled")]
    DeletionCancelled,

    /// There is nothing of this kind to clear.
    #[error("no {0} to clear")]
    NothingToClear(&'static str),
}

/// Errors that reject a whole layout document.
#[derive(Error, Debug)]
pub enum LayoutError {
    /// The document is not valid JSON or could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed but has an unsupported shape.
    #[error("invalid layout format: {0}")]
    InvalidFormat(String),
}

/// Result alias for planner commands.
pub type Result<T> = std::result::Result<T, PlannerError>;
