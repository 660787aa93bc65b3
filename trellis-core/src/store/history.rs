//! Undo/redo stacks for stores created with history enabled.

use std::collections::VecDeque;

use crate::value::ValueMap;

/// Bounded stack of pre-mutation snapshots plus the matching redo stack.
#[derive(Debug)]
pub(crate) struct History {
    depth: usize,
    undo: VecDeque<ValueMap>,
    redo: Vec<ValueMap>,
}

impl History {
    pub(crate) fn new(depth: usize) -> Self {
        Self {
            depth,
            undo: VecDeque::with_capacity(depth.min(64)),
            redo: Vec::new(),
        }
    }

    /// Push the state as it was before a mutation. A new mutation always
    /// invalidates the redo stack.
    pub(crate) fn record(&mut self, before: ValueMap) {
        self.push_undo(before);
        self.redo.clear();
    }

    /// Swap `current` for the most recent snapshot.
    pub(crate) fn undo(&mut self, current: ValueMap) -> Option<ValueMap> {
        let previous = self.undo.pop_back()?;
        self.redo.push(current);
        Some(previous)
    }

    pub(crate) fn redo(&mut self, current: ValueMap) -> Option<ValueMap> {
        let next = self.redo.pop()?;
        self.push_undo(current);
        Some(next)
    }

    fn push_undo(&mut self, snapshot: ValueMap) {
        if self.depth == 0 {
            return;
        }
        self.undo.push_back(snapshot);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
    }

    pub(crate) fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub(crate) fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}
