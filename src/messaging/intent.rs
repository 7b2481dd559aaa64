// Intents - UI → Session requests
//
// Every user action is one intent. The session applies intents in order; an
// intent naming a pattern, channel or placement that no longer exists does
// nothing.

use crate::sequencer::midi_recorder::Quantize;
use crate::sequencer::note::Note;
use crate::sequencer::pattern::{ChannelId, ChannelPatch, PatternId, PatternLength};
use crate::sequencer::transport::PlaybackMode;

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    // Transport
    TogglePlay,
    ToggleRecord,
    Stop,
    SetMode(PlaybackMode),
    SelectPattern(PatternId),
    SelectChannel(Option<ChannelId>),
    SetBpm(f64),
    SetSwing(f64),
    SetCountInBars(usize),
    SetQuantize(Quantize),
    SetMetronome(bool),

    // Live input. `at` is the clock time of the key event; the last tick
    // time is used when it is unset
    NoteOn { pitch: u8, velocity: f32, at: Option<f64> },
    NoteOff { pitch: u8, at: Option<f64> },
    RecordHit { at: Option<f64> },

    // Pattern store
    CreatePattern {
        name: String,
        clone_from: Option<PatternId>,
    },
    DeletePattern(PatternId),
    RenamePattern {
        pattern_id: PatternId,
        name: String,
    },
    SetPatternLength {
        pattern_id: PatternId,
        length: PatternLength,
    },
    UpdateChannel {
        pattern_id: PatternId,
        channel_id: ChannelId,
        patch: ChannelPatch,
    },
    ToggleStep {
        pattern_id: PatternId,
        channel_id: ChannelId,
        step: usize,
    },
    SubdivideReset {
        pattern_id: PatternId,
        channel_id: ChannelId,
        step: usize,
    },
    SetChannelNotes {
        channel_id: ChannelId,
        notes: Vec<Note>,
    },
    OpenPianoRoll {
        pattern_id: PatternId,
        channel_id: ChannelId,
    },
    ClearPattern(PatternId),
    Undo,
    Redo,

    // Arrangement
    PlacePattern {
        track: usize,
        bar: usize,
        pattern_id: PatternId,
    },
    RemovePlacement { track: usize, bar: usize },
    RemoveAudioClip(String),
}

impl Intent {
    /// Intents that drive the live transport, blocked while an export runs
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Intent::TogglePlay
                | Intent::ToggleRecord
                | Intent::Stop
                | Intent::NoteOn { .. }
                | Intent::NoteOff { .. }
                | Intent::RecordHit { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_intents() {
        assert!(Intent::TogglePlay.is_transport());
        assert!(Intent::RecordHit { at: None }.is_transport());
        assert!(!Intent::Undo.is_transport());
        assert!(!Intent::SetBpm(90.0).is_transport());
    }
}
