// Audio - Engine contract, mixing, offline rendering and encoders

pub mod engine;
pub mod export;
pub mod meter;
pub mod mp3;
pub mod offline;
pub mod routing;
pub mod wav;

pub use engine::{CommandLog, RingSink, TriggerCommand, TriggerSink, Voice, VoiceRegistry};
pub use export::{ExportError, ExportFormat, ExportSettings, ExportSource, ExportTarget};
pub use meter::{Meter, PeakMeter};
pub use offline::{OfflineRenderer, RenderFormat, RenderedAudio};
