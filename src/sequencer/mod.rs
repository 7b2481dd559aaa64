// Sequencer module - Patterns, song arrangement and the live transport
// Time model, trigger generation and the single event timeline

pub mod metronome;
pub mod midi_recorder;
pub mod note;
pub mod pattern;
pub mod player;
pub mod playlist;
pub mod scheduler;
pub mod step;
pub mod timeline;
pub mod transport;

pub use metronome::{ClickType, Metronome, MetronomeSound};
pub use midi_recorder::{MidiRecorder, Quantize, RecordedTake};
pub use note::{Note, NoteId};
pub use pattern::{
    Channel, ChannelId, ChannelPatch, Effect, EqSettings, Pattern, PatternId, PatternLength,
    SampleRef,
};
pub use playlist::{Arrangement, AudioClip, Playlist, SharedArrangement, TrackBarKey};
pub use scheduler::EventTimeline;
pub use step::Step;
pub use timeline::{StepClock, Swing, Tempo};
pub use transport::{
    PlaybackMode, SharedTransportState, Transition, Transport, TransportNotice, TransportSettings,
    TransportState,
};
