// MIDI Recorder - Captures live note-on/note-off and pad hits into pattern data
// Positions are measured in 16th steps from the moment recording started

use crate::sequencer::note::Note;
use crate::sequencer::timeline::Tempo;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

/// Shortest note (in steps) a note-off can produce
pub const MIN_RECORDED_DURATION: f64 = 0.1;

/// Quantize grid for recorded notes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quantize {
    Half,
    Quarter,
    Eighth,
    #[default]
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
    None,
}

impl Quantize {
    /// Grid size in 16th-step units (0 disables snapping)
    pub fn step_size(self) -> f64 {
        match self {
            Quantize::Half => 8.0,
            Quantize::Quarter => 4.0,
            Quantize::Eighth => 2.0,
            Quantize::Sixteenth => 1.0,
            Quantize::ThirtySecond => 0.5,
            Quantize::SixtyFourth => 0.25,
            Quantize::None => 0.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quantize::Half => "1/2",
            Quantize::Quarter => "1/4",
            Quantize::Eighth => "1/8",
            Quantize::Sixteenth => "1/16",
            Quantize::ThirtySecond => "1/32",
            Quantize::SixtyFourth => "1/64",
            Quantize::None => "None",
        }
    }

    /// Snap start to the nearest grid line and duration to the grid, at least one unit
    pub fn apply(self, note: &mut Note) {
        let grid = self.step_size();
        if grid <= 0.0 {
            return;
        }
        note.start = (note.start / grid).round() * grid;
        note.duration = ((note.duration / grid).round() * grid).max(grid);
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenNote {
    start: f64,
    velocity: f32,
}

/// Recording session for one channel
#[derive(Debug, Clone)]
pub struct MidiRecorder {
    /// Clock time at which step 0 of the recording was reached
    recording_start: f64,
    step_seconds: f64,
    /// Hits are captured up to this step (exclusive)
    length_steps: usize,
    open_notes: HashMap<u8, OpenNote>,
    recorded_notes: Vec<Note>,
    recorded_hits: BTreeSet<usize>,
}

impl MidiRecorder {
    pub fn new(recording_start: f64, tempo: &Tempo, length_steps: usize) -> Self {
        Self {
            recording_start,
            step_seconds: tempo.step_duration_seconds(),
            length_steps,
            open_notes: HashMap::new(),
            recorded_notes: Vec::new(),
            recorded_hits: BTreeSet::new(),
        }
    }

    fn step_at(&self, now: f64) -> f64 {
        (now - self.recording_start) / self.step_seconds
    }

    /// Open a note; ignored before the recording start (count-in handoff skew)
    pub fn note_on(&mut self, pitch: u8, velocity: f32, now: f64) {
        let start = self.step_at(now);
        if start < 0.0 {
            trace!(pitch, start, "note-on before recording start ignored");
            return;
        }
        self.open_notes.insert(pitch, OpenNote { start, velocity });
    }

    /// Close the open note for `pitch`, if any
    pub fn note_off(&mut self, pitch: u8, now: f64) {
        if let Some(open) = self.open_notes.remove(&pitch) {
            self.close(pitch, open, self.step_at(now));
        }
    }

    fn close(&mut self, pitch: u8, open: OpenNote, end: f64) {
        let duration = (end - open.start).max(MIN_RECORDED_DURATION);
        self.recorded_notes
            .push(Note::new(pitch, open.start, duration, open.velocity));
    }

    /// Capture a pad hit on the nearest step
    pub fn record_hit(&mut self, now: f64) {
        let step = self.step_at(now).round();
        if step < 0.0 {
            return;
        }
        let step = step as usize;
        if step < self.length_steps {
            self.recorded_hits.insert(step);
        }
    }

    pub fn open_count(&self) -> usize {
        self.open_notes.len()
    }

    pub fn recorded_notes(&self) -> &[Note] {
        &self.recorded_notes
    }

    /// Close every open note at `stop_time` and return the quantized result
    pub fn finalize(mut self, stop_time: f64, quantize: Quantize) -> RecordedTake {
        let end = self.step_at(stop_time);
        let mut open: Vec<(u8, OpenNote)> = self.open_notes.drain().collect();
        open.sort_by(|a, b| a.1.start.total_cmp(&b.1.start));
        for (pitch, note) in open {
            self.close(pitch, note, end);
        }

        let mut notes = self.recorded_notes;
        for note in &mut notes {
            quantize.apply(note);
        }
        notes.sort_by(|a, b| a.start.total_cmp(&b.start));

        RecordedTake {
            notes,
            hits: self.recorded_hits.into_iter().collect(),
        }
    }
}

/// Result of a finished recording
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedTake {
    pub notes: Vec<Note>,
    /// Step indices to set to a single hit
    pub hits: Vec<usize>,
}

impl RecordedTake {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.hits.is_empty()
    }
}
