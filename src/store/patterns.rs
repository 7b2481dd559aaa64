// PatternStore - Versioned, undoable collection of patterns
//
// Every mutating operation builds a new PatternBank snapshot. Patterns are
// shared between snapshots through `Arc`, so an edit only copies the pattern
// it touches. Operations on unknown pattern or channel IDs leave the store
// unchanged and return false.

use crate::sequencer::note::{Note, notes_from_steps};
use crate::sequencer::pattern::{
    ChannelId, ChannelPatch, Pattern, PatternId, PatternLength, SampleRef, generate_pattern_id,
};
use crate::sequencer::playlist::PatternLookup;
use crate::sequencer::step::Step;
use crate::store::history::{DEFAULT_MAX_HISTORY, History};
use std::sync::Arc;
use tracing::debug;

/// Immutable snapshot of every pattern in the project
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatternBank {
    patterns: Vec<Arc<Pattern>>,
}

impl PatternBank {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Pattern>> {
        self.patterns.iter().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Pattern>> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn first(&self) -> Option<&Arc<Pattern>> {
        self.patterns.first()
    }

    /// Owned copies of all patterns (for persistence)
    pub fn to_patterns(&self) -> Vec<Pattern> {
        self.patterns.iter().map(|p| Pattern::clone(p)).collect()
    }

    /// Pattern containing the given channel
    pub fn find_channel(&self, channel_id: &str) -> Option<(&Arc<Pattern>, usize)> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .channels
                .iter()
                .position(|c| c.id == channel_id)
                .map(|index| (pattern, index))
        })
    }

    fn pattern_mut(&mut self, id: &str) -> Option<&mut Pattern> {
        self.patterns
            .iter_mut()
            .find(|p| p.id == id)
            .map(Arc::make_mut)
    }

    fn push(&mut self, pattern: Pattern) {
        self.patterns.push(Arc::new(pattern));
    }

    fn remove(&mut self, id: &str) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|p| p.id != id);
        self.patterns.len() != before
    }
}

impl PatternLookup for PatternBank {
    fn pattern(&self, id: &str) -> Option<&Pattern> {
        self.get(id).map(Arc::as_ref)
    }
}

/// Pattern editing operations with undo/redo
#[derive(Debug, Clone)]
pub struct PatternStore {
    history: History<PatternBank>,
}

impl PatternStore {
    pub fn new(bank: PatternBank) -> Self {
        Self::with_history_limit(bank, DEFAULT_MAX_HISTORY)
    }

    pub fn with_history_limit(bank: PatternBank, max_history: usize) -> Self {
        Self {
            history: History::with_capacity(bank, max_history),
        }
    }

    /// Current snapshot
    pub fn bank(&self) -> &PatternBank {
        self.history.present()
    }

    /// Apply `edit` to a copy of the present snapshot and commit it
    ///
    /// Nothing is recorded when the edit reports failure or produces a
    /// snapshot equal to the present one.
    fn commit(&mut self, edit: impl FnOnce(&mut PatternBank) -> bool) -> bool {
        let mut next = self.history.present().clone();
        if !edit(&mut next) {
            return false;
        }
        self.history.push(next)
    }

    fn edit_channel(
        &mut self,
        pattern_id: &str,
        channel_id: &str,
        edit: impl FnOnce(&mut crate::sequencer::pattern::Channel, usize) -> bool,
    ) -> bool {
        // Check existence first so a missing ID never clones a pattern
        let exists = self
            .bank()
            .get(pattern_id)
            .is_some_and(|p| p.channel(channel_id).is_some());
        if !exists {
            return false;
        }
        self.commit(|bank| {
            let Some(pattern) = bank.pattern_mut(pattern_id) else {
                return false;
            };
            let length = pattern.length_steps();
            pattern
                .channel_mut(channel_id)
                .is_some_and(|channel| edit(channel, length))
        })
    }

    /// Create a pattern; with `clone_from`, copy that pattern's channel topology
    ///
    /// Falls back to the default kit when `clone_from` is unknown or absent.
    pub fn create_pattern(&mut self, name: impl Into<String>, clone_from: Option<&str>) -> PatternId {
        let id = generate_pattern_id();
        let name = name.into();
        let pattern = match clone_from.and_then(|source| self.bank().get(source)) {
            Some(source) => source.cloned_topology(id.clone(), name),
            None => Pattern::with_default_kit(id.clone(), name),
        };
        debug!(pattern = %id, channels = pattern.channels.len(), "pattern created");
        self.commit(|bank| {
            bank.push(pattern);
            true
        });
        id
    }

    /// Insert a fully built pattern (e.g. from an import)
    pub fn insert_pattern(&mut self, pattern: Pattern) -> bool {
        if self.bank().get(&pattern.id).is_some() {
            return false;
        }
        self.commit(|bank| {
            bank.push(pattern);
            true
        })
    }

    pub fn delete_pattern(&mut self, pattern_id: &str) -> bool {
        self.commit(|bank| bank.remove(pattern_id))
    }

    pub fn rename_pattern(&mut self, pattern_id: &str, name: impl Into<String>) -> bool {
        let name = name.into();
        self.commit(|bank| match bank.pattern_mut(pattern_id) {
            Some(pattern) => {
                pattern.name = name;
                true
            }
            None => false,
        })
    }

    /// Append a step channel to a pattern
    pub fn add_channel(
        &mut self,
        pattern_id: &str,
        name: impl Into<String>,
        sample: SampleRef,
    ) -> Option<ChannelId> {
        self.bank().get(pattern_id)?;
        let mut added = None;
        self.commit(|bank| match bank.pattern_mut(pattern_id) {
            Some(pattern) => {
                added = Some(pattern.add_channel(name, sample));
                true
            }
            None => false,
        });
        added
    }

    pub fn update_channel(&mut self, pattern_id: &str, channel_id: &str, patch: ChannelPatch) -> bool {
        self.edit_channel(pattern_id, channel_id, |channel, length| {
            patch.apply_to(channel);
            channel.ensure_length(length);
            true
        })
    }

    /// Change the pattern length, padding every channel's steps with silence
    pub fn set_pattern_length(&mut self, pattern_id: &str, length: PatternLength) -> bool {
        self.commit(|bank| {
            let Some(pattern) = bank.pattern_mut(pattern_id) else {
                return false;
            };
            pattern.length = length;
            for channel in &mut pattern.channels {
                if !channel.is_audio_clip_channel {
                    channel.ensure_length(length.steps());
                }
            }
            true
        })
    }

    /// Advance a step along the toggle cycle `0 -> 1 -> 2 -> 4 -> 3 -> 1`
    pub fn toggle_step(&mut self, pattern_id: &str, channel_id: &str, step_index: usize) -> bool {
        self.edit_channel(pattern_id, channel_id, |channel, length| {
            if step_index >= length {
                return false;
            }
            channel.ensure_length(length);
            channel.steps[step_index] = channel.steps[step_index].cycled();
            true
        })
    }

    /// Force a step to silence regardless of its value
    pub fn subdivide_reset(&mut self, pattern_id: &str, channel_id: &str, step_index: usize) -> bool {
        self.set_step(pattern_id, channel_id, step_index, Step::OFF)
    }

    pub fn set_step(&mut self, pattern_id: &str, channel_id: &str, step_index: usize, step: Step) -> bool {
        self.edit_channel(pattern_id, channel_id, |channel, length| {
            if step_index >= length {
                return false;
            }
            channel.ensure_length(length);
            channel.steps[step_index] = step;
            true
        })
    }

    /// Replace the notes of a channel, wherever it lives
    pub fn set_channel_notes(&mut self, channel_id: &str, notes: Vec<Note>) -> bool {
        let Some((pattern, _)) = self.bank().find_channel(channel_id) else {
            return false;
        };
        let pattern_id = pattern.id.clone();
        self.edit_channel(&pattern_id, channel_id, |channel, _| {
            channel.notes = notes;
            true
        })
    }

    /// Write a finished recording into a channel as one undoable edit
    ///
    /// Recorded notes replace the channel's notes; recorded hits become
    /// single-hit steps.
    pub fn apply_take(
        &mut self,
        pattern_id: &str,
        channel_id: &str,
        notes: Vec<Note>,
        hits: &[usize],
    ) -> bool {
        self.edit_channel(pattern_id, channel_id, |channel, length| {
            channel.ensure_length(length);
            if !notes.is_empty() {
                channel.notes = notes;
            }
            for &index in hits.iter().filter(|&&i| i < length) {
                channel.steps[index] = Step::HIT;
            }
            true
        })
    }

    /// Silence one channel: all steps to 0 and no notes
    pub fn clear_channel(&mut self, pattern_id: &str, channel_id: &str) -> bool {
        self.edit_channel(pattern_id, channel_id, |channel, _| {
            channel.steps.iter_mut().for_each(|s| *s = Step::OFF);
            channel.notes.clear();
            true
        })
    }

    /// Zero every step and remove every note of a pattern
    pub fn clear_pattern(&mut self, pattern_id: &str) -> bool {
        self.commit(|bank| {
            let Some(pattern) = bank.pattern_mut(pattern_id) else {
                return false;
            };
            for channel in &mut pattern.channels {
                channel.steps.iter_mut().for_each(|s| *s = Step::OFF);
                channel.notes.clear();
            }
            true
        })
    }

    /// Prepare a channel for piano-roll editing
    ///
    /// A channel without notes gets its step data converted into notes.
    /// Returns true when a migration happened.
    pub fn open_piano_roll(&mut self, pattern_id: &str, channel_id: &str) -> bool {
        self.edit_channel(pattern_id, channel_id, |channel, length| {
            if channel.is_note_driven() {
                return false;
            }
            channel.notes = notes_from_steps(&channel.steps, length);
            !channel.notes.is_empty()
        })
    }

    pub fn undo(&mut self) -> bool {
        self.history.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Replace all content and forget the edit history
    pub fn reset(&mut self, bank: PatternBank) {
        self.history.reset(bank);
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new(PatternBank::default())
    }
}
