// SharedPatternStore - Single-writer store with lock-free snapshot reads
//
// Edits are serialized through a mutex; every committed edit publishes the new
// PatternBank through an ArcSwap so the transport and exporters can read the
// latest snapshot without locking.

use crate::store::patterns::{PatternBank, PatternStore};
use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
pub struct SharedPatternStore {
    store: Arc<Mutex<PatternStore>>,
    published: Arc<ArcSwap<PatternBank>>,
}

impl SharedPatternStore {
    pub fn new(store: PatternStore) -> Self {
        let published = Arc::new(ArcSwap::from_pointee(store.bank().clone()));
        Self {
            store: Arc::new(Mutex::new(store)),
            published,
        }
    }

    /// Latest published snapshot
    pub fn read(&self) -> Arc<PatternBank> {
        self.published.load_full()
    }

    fn lock(&self) -> MutexGuard<'_, PatternStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, store: &PatternStore) {
        let current = self.published.load();
        if **current != *store.bank() {
            self.published.store(Arc::new(store.bank().clone()));
        }
    }

    /// Run an edit against the store and publish the result
    pub fn edit<R>(&self, edit: impl FnOnce(&mut PatternStore) -> R) -> R {
        let mut store = self.lock();
        let result = edit(&mut store);
        self.publish(&store);
        result
    }

    pub fn undo(&self) -> bool {
        self.edit(PatternStore::undo)
    }

    pub fn redo(&self) -> bool {
        self.edit(PatternStore::redo)
    }

    pub fn can_undo(&self) -> bool {
        self.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.lock().can_redo()
    }

    /// Replace all patterns and clear the edit history
    pub fn replace(&self, bank: PatternBank) {
        self.edit(|store| store.reset(bank));
    }
}

impl Default for SharedPatternStore {
    fn default() -> Self {
        Self::new(PatternStore::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::pattern::PatternLength;

    #[test]
    fn test_edit_publishes_snapshot() {
        let shared = SharedPatternStore::default();
        let before = shared.read();
        let id = shared.edit(|s| s.create_pattern("Pattern 1", None));
        assert!(before.is_empty());
        assert!(shared.read().get(&id).is_some());
    }

    #[test]
    fn test_noop_edit_keeps_snapshot_pointer() {
        let shared = SharedPatternStore::default();
        shared.edit(|s| s.create_pattern("Pattern 1", None));
        let before = shared.read();
        assert!(!shared.edit(|s| s.toggle_step("missing", "missing", 0)));
        assert!(Arc::ptr_eq(&before, &shared.read()));
    }

    #[test]
    fn test_undo_republishes() {
        let shared = SharedPatternStore::default();
        let id = shared.edit(|s| s.create_pattern("Pattern 1", None));
        shared.edit(|s| s.set_pattern_length(&id, PatternLength::Steps32));
        assert_eq!(shared.read().get(&id).unwrap().length_steps(), 32);
        assert!(shared.can_undo());
        assert!(shared.undo());
        assert_eq!(shared.read().get(&id).unwrap().length_steps(), 16);
        assert!(shared.can_redo());
    }

    #[test]
    fn test_replace_resets_history() {
        let shared = SharedPatternStore::default();
        shared.edit(|s| s.create_pattern("Pattern 1", None));
        shared.replace(PatternBank::default());
        assert!(shared.read().is_empty());
        assert!(!shared.can_undo());
    }
}
