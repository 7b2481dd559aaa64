// Beatgrid - Pattern sequencer library exports for the binary, tests and benchmarks

pub mod audio;
pub mod config;
pub mod messaging;
pub mod project;
pub mod sampler;
pub mod sequencer;
pub mod session;
pub mod store;

// Re-export commonly used types for convenience
pub use audio::engine::{TriggerCommand, TriggerSink, Voice, VoiceRegistry};
pub use audio::export::{ExportError, ExportFormat, ExportSettings, ExportTarget};
pub use config::{ConfigError, SessionConfig};
pub use messaging::channels::{create_notification_channel, create_trigger_channel};
pub use messaging::{Intent, Notification};
pub use project::{ProjectError, ProjectManager, ProjectState};
pub use sequencer::{
    Arrangement, Channel, Note, Pattern, PatternLength, PlaybackMode, Step, Swing, Tempo,
    Transport, TransportState,
};
pub use session::Session;
pub use store::{PatternBank, PatternStore, SharedPatternStore};
