// History - Snapshot-based undo/redo
//
// Keeps three lists: past snapshots, the present one and undone (future)
// snapshots. Snapshots are immutable values; undo and redo only move them
// between the lists.

use std::collections::VecDeque;

/// Default maximum number of snapshots kept in the past list
pub const DEFAULT_MAX_HISTORY: usize = 100;

#[derive(Debug, Clone)]
pub struct History<T> {
    /// Oldest first
    past: VecDeque<T>,
    present: T,
    /// Most recently undone last
    future: Vec<T>,
    max_history: usize,
}

impl<T: Clone + PartialEq> History<T> {
    pub fn new(present: T) -> Self {
        Self::with_capacity(present, DEFAULT_MAX_HISTORY)
    }

    /// Create a history that remembers at most `max_history` past snapshots
    pub fn with_capacity(present: T, max_history: usize) -> Self {
        Self {
            past: VecDeque::new(),
            present,
            future: Vec::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn present(&self) -> &T {
        &self.present
    }

    /// Make `next` the present snapshot
    ///
    /// Returns false without touching the history when `next` equals the
    /// present. Otherwise the redo list is cleared and the oldest snapshot is
    /// dropped once the limit is exceeded.
    pub fn push(&mut self, next: T) -> bool {
        if next == self.present {
            return false;
        }
        let previous = std::mem::replace(&mut self.present, next);
        self.past.push_back(previous);
        self.future.clear();
        if self.past.len() > self.max_history {
            self.past.pop_front();
        }
        true
    }

    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.past.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, previous);
        self.future.push(current);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, next);
        self.past.push_back(current);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.past.len()
    }

    pub fn redo_count(&self) -> usize {
        self.future.len()
    }

    /// Replace the present and forget all history (e.g. after loading a project)
    pub fn reset(&mut self, present: T) {
        self.past.clear();
        self.future.clear();
        self.present = present;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_undo() {
        let mut history = History::new(0);
        assert!(history.push(1));
        assert!(history.push(2));
        assert_eq!(history.undo_count(), 2);

        assert!(history.undo());
        assert_eq!(*history.present(), 1);
        assert_eq!(history.redo_count(), 1);
        assert!(history.redo());
        assert_eq!(*history.present(), 2);
    }

    #[test]
    fn test_equal_snapshot_not_pushed() {
        let mut history = History::new(vec![1, 2]);
        assert!(!history.push(vec![1, 2]));
        assert!(!history.can_undo());
    }

    #[test]
    fn test_push_clears_future() {
        let mut history = History::new(0);
        history.push(1);
        history.undo();
        assert!(history.can_redo());
        history.push(5);
        assert!(!history.can_redo());
        assert_eq!(history.redo_count(), 0);
    }

    #[test]
    fn test_history_limit() {
        let mut history = History::with_capacity(0, 3);
        for i in 1..=5 {
            history.push(i);
        }
        assert_eq!(history.undo_count(), 3);
        while history.undo() {}
        assert_eq!(*history.present(), 2);
    }

    #[test]
    fn test_undo_redo_on_empty() {
        let mut history = History::new("a");
        assert!(!history.undo());
        assert!(!history.redo());
        assert_eq!(*history.present(), "a");
    }

    #[test]
    fn test_reset() {
        let mut history = History::new(0);
        history.push(1);
        history.reset(9);
        assert!(!history.can_undo());
        assert_eq!(*history.present(), 9);
    }
}
