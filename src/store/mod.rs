// Store module - Pattern data with undo/redo and shared snapshots

pub mod history;
pub mod patterns;
pub mod shared;

pub use history::{DEFAULT_MAX_HISTORY, History};
pub use patterns::{PatternBank, PatternStore};
pub use shared::SharedPatternStore;
