//! Snapshot-based undo/redo.
//!
//! Each entry is a deep copy of the layout, view and selection taken before a
//! mutation. Restoring an entry replaces all three wholesale.

use crate::constants::MAX_UNDO_STEPS;
use crate::types::{Layout, SelectionState};
use crate::view::ViewState;
use std::collections::VecDeque;

/// Everything an undo step restores.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// Racks, flow lines and connections
    pub layout: Layout,
    /// Pan and zoom
    pub view: ViewState,
    /// Selected racks or flow line
    pub selection: SelectionState,
}

/// Bounded undo stack with a redo stack.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: VecDeque<Snapshot>,
    redo_stack: Vec<Snapshot>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(MAX_UNDO_STEPS)
    }
}

impl History {
    /// Creates an empty history holding at most `limit` undo entries.
    pub fn new(limit: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Records the state before a new action.
    ///
    /// This clears the redo stack since a new action invalidates any previously
    /// undone actions. The oldest entry is evicted once the limit is reached.
    pub fn record(&mut self, snapshot: Snapshot) {
        self.push_undo(snapshot);
        self.redo_stack.clear();
    }

    fn push_undo(&mut self, snapshot: Snapshot) {
        self.undo_stack.push_back(snapshot);
        while self.undo_stack.len() > self.limit {
            self.undo_stack.pop_front();
        }
    }

    /// Steps back.
    ///
    /// # Arguments
    ///
    /// * `current` - The live state, kept for redo
    ///
    /// # Returns
    ///
    /// The state to restore, or `None` if there is nothing to undo. In that case
    /// `current` is dropped and the stacks are unchanged.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let previous = self.undo_stack.pop_back()?;
        self.redo_stack.push(current);
        Some(previous)
    }

    /// Steps forward again. Mirror of [`History::undo`].
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let next = self.redo_stack.pop()?;
        self.push_undo(current);
        Some(next)
    }

    /// Returns true if there are actions that can be undone.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Returns true if there are actions that can be redone.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of undo entries.
    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of redo entries.
    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Clears all undo and redo history.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Point, Rack, RackType};

    fn snapshot_with_racks(n: usize) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for i in 0..n {
            snapshot.layout.add_rack(Rack::new(
                format!("R{i}"),
                RackType::Crate,
                1,
                1,
                Point::ZERO,
                20.0,
            ));
        }
        snapshot
    }

    #[test]
    fn test_undo_on_empty_is_noop() {
        let mut history = History::default();
        assert!(history.undo(Snapshot::default()).is_none());
        assert!(history.redo(Snapshot::default()).is_none());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_undo_then_redo() {
        let mut history = History::default();
        let before = snapshot_with_racks(0);
        let after = snapshot_with_racks(1);

        history.record(before.clone());
        let restored = history.undo(after.clone()).unwrap();
        assert_eq!(restored, before);
        assert!(history.can_redo());

        let redone = history.redo(restored).unwrap();
        assert_eq!(redone, after);
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_new_record_clears_redo() {
        let mut history = History::default();
        history.record(snapshot_with_racks(0));
        history.undo(snapshot_with_racks(1));
        assert!(history.can_redo());

        history.record(snapshot_with_racks(0));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_limit_evicts_oldest() {
        let mut history = History::new(3);
        for n in 0..5 {
            history.record(snapshot_with_racks(n));
        }
        assert_eq!(history.undo_len(), 3);

        let mut restored = Vec::new();
        while let Some(s) = history.undo(Snapshot::default()) {
            restored.push(s.layout.racks.len());
        }
        assert_eq!(restored, vec![4, 3, 2]);
    }
}
