// Note representation for the piano roll
// Start and duration are expressed in 16th-note steps and may be fractional

use crate::sequencer::step::Step;
use crate::sequencer::timeline::Tempo;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for notes
pub type NoteId = u64;

/// Pitch used when a step (rather than a note) triggers a channel: C4
pub const DEFAULT_PITCH: u8 = 60;

/// Global note ID generator (atomic for thread-safety)
static NEXT_NOTE_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique note ID
pub fn generate_note_id() -> NoteId {
    NEXT_NOTE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Make sure freshly generated IDs never collide with `id`
/// Called after loading notes from a project file
pub fn reserve_note_ids_through(id: NoteId) {
    NEXT_NOTE_ID.fetch_max(id.saturating_add(1), Ordering::Relaxed);
}

/// A musical note in a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier for this note
    pub id: NoteId,

    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,

    /// Start position in steps
    pub start: f64,

    /// Duration in steps
    pub duration: f64,

    /// Velocity (0.0 to 1.0)
    pub velocity: f32,
}

impl Note {
    /// Creates a new note with a fresh ID
    /// Pitch and velocity are clamped into range
    pub fn new(pitch: u8, start: f64, duration: f64, velocity: f32) -> Self {
        Self::with_id(generate_note_id(), pitch, start, duration, velocity)
    }

    pub fn with_id(id: NoteId, pitch: u8, start: f64, duration: f64, velocity: f32) -> Self {
        Self {
            id,
            pitch: pitch.min(127),
            start,
            duration,
            velocity: velocity.clamp(0.0, 1.0),
        }
    }

    /// End position in steps
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Check if this note sounds at a given step position
    pub fn contains_step(&self, step: f64) -> bool {
        step >= self.start && step < self.end()
    }

    /// Duration in seconds at the given tempo
    pub fn duration_seconds(&self, tempo: &Tempo) -> f64 {
        tempo.steps_to_seconds(self.duration)
    }

    /// Get the note name (e.g., "C4", "A#5")
    pub fn note_name(&self) -> String {
        const NOTE_NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];

        let octave = (self.pitch / 12) as i32 - 1;
        let note_index = (self.pitch % 12) as usize;

        format!("{}{}", NOTE_NAMES[note_index], octave)
    }
}

/// Convert legacy step data into piano-roll notes
///
/// A roll of N sub-hits becomes N notes of `1/N` step each. Only indices below
/// `length` are converted.
pub fn notes_from_steps(steps: &[Step], length: usize) -> Vec<Note> {
    let mut notes = Vec::new();
    for (index, step) in steps.iter().take(length).enumerate() {
        if !step.is_active() {
            continue;
        }
        let sub_duration = 1.0 / step.sub_hits() as f64;
        for offset in step.sub_hit_offsets() {
            notes.push(Note::new(
                DEFAULT_PITCH,
                index as f64 + offset,
                sub_duration,
                1.0,
            ));
        }
    }
    notes
}
