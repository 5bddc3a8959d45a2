//! Linear undo/redo over whole-state snapshots.

use crate::error::{CanvasError, CanvasResult};

/// Default number of undo states kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Undo and redo stacks of full state copies.
///
/// The caller pushes the current state once before each logical edit; undo
/// and redo trade the live state for the top of the opposite stack.
#[derive(Debug, Clone)]
pub struct History<T> {
    undo_stack: Vec<T>,
    redo_stack: Vec<T>,
    limit: usize,
    dedupe: bool,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT, true)
    }
}

impl<T> History<T> {
    /// `limit` is clamped to at least one entry. With `dedupe`, a push equal
    /// to the top of the undo stack is ignored.
    pub fn new(limit: usize, dedupe: bool) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            limit: limit.max(1),
            dedupe,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl<T: PartialEq> History<T> {
    /// Record `state` as an undo point and clear the redo stack.
    /// Returns false when the push was skipped as a duplicate.
    pub fn push(&mut self, state: T) -> bool {
        if self.dedupe && self.undo_stack.last() == Some(&state) {
            return false;
        }
        self.undo_stack.push(state);
        if self.undo_stack.len() > self.limit {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
        true
    }

    /// Trade `current` for the most recent undo point.
    pub fn undo(&mut self, current: T) -> CanvasResult<T> {
        let previous = self.undo_stack.pop().ok_or(CanvasError::EmptyHistory)?;
        self.redo_stack.push(current);
        Ok(previous)
    }

    /// Trade `current` for the most recently undone state.
    pub fn redo(&mut self, current: T) -> CanvasResult<T> {
        let next = self.redo_stack.pop().ok_or(CanvasError::EmptyHistory)?;
        self.undo_stack.push(current);
        Ok(next)
    }
}
