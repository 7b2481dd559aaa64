// Sequencer Player - Turns pattern and song data into trigger commands
// Pure functions shared by live playback and offline export

use crate::audio::engine::TriggerCommand;
use crate::sequencer::note::DEFAULT_PITCH;
use crate::sequencer::pattern::{Channel, Pattern};
use crate::sequencer::playlist::{Arrangement, PatternLookup};
use crate::sequencer::step::Step;
use crate::sequencer::timeline::{STEPS_PER_BAR, StepClock};

/// Velocity used for step hits
pub const STEP_VELOCITY: f32 = 1.0;

/// Timing of one sequencer step on the clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTiming {
    /// Trigger time including swing
    pub time: f64,
    /// Trigger time without swing (piano-roll notes are not swung)
    pub straight_time: f64,
    pub step_seconds: f64,
}

impl StepTiming {
    pub fn at(clock: &StepClock, step_index: u64) -> Self {
        Self {
            time: clock.step_time(step_index),
            straight_time: clock.straight_time(step_index),
            step_seconds: clock.step_seconds(),
        }
    }
}

/// Channels the step grid drives
fn plays_steps(channel: &Channel) -> bool {
    !channel.is_note_driven() && !channel.is_audio_clip_channel && !channel.sample.is_empty()
}

/// Emit the hits of one step value: a single hit or an evenly spaced roll
///
/// With `cut_itself`, every hit is preceded by a release of the instrument's
/// sounding voices at the same instant.
pub fn step_hits(channel: &Channel, step: Step, timing: &StepTiming, out: &mut Vec<TriggerCommand>) {
    if !step.is_active() {
        return;
    }
    let sub_duration = timing.step_seconds / step.sub_hits() as f64;
    for offset in step.sub_hit_offsets() {
        let time = timing.time + offset * timing.step_seconds;
        if channel.cut_itself {
            out.push(TriggerCommand::ReleaseAll {
                sample: channel.sample.key().to_string(),
                time,
            });
        }
        out.push(TriggerCommand::AttackRelease {
            channel: channel.id.clone(),
            sample: channel.sample.key().to_string(),
            pitch: DEFAULT_PITCH,
            velocity: STEP_VELOCITY,
            duration: sub_duration,
            time,
        });
    }
}

/// Step triggers for one step of pattern playback
pub fn pattern_step_triggers(
    pattern: &Pattern,
    local_step: usize,
    timing: &StepTiming,
    out: &mut Vec<TriggerCommand>,
) {
    for channel in pattern.channels.iter().filter(|c| plays_steps(c)) {
        step_hits(channel, channel.step_at(local_step), timing, out);
    }
}

/// One note of a note-driven channel, positioned relative to its step
#[derive(Debug, Clone, PartialEq)]
struct ScheduledNote {
    channel: String,
    sample: String,
    pitch: u8,
    velocity: f32,
    /// Fraction of a step after the step boundary
    offset_steps: f64,
    duration_steps: f64,
}

/// Notes of a pattern bucketed by the step they start in
///
/// Built once whenever the pattern changes and replayed every loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteSchedule {
    buckets: Vec<Vec<ScheduledNote>>,
}

impl NoteSchedule {
    pub fn build(pattern: &Pattern) -> Self {
        let length = pattern.length_steps();
        let mut buckets = vec![Vec::new(); length];
        let note_channels = pattern
            .channels
            .iter()
            .filter(|c| c.is_note_driven() && !c.is_audio_clip_channel && !c.sample.is_empty());
        for channel in note_channels {
            for note in &channel.notes {
                if note.start < 0.0 || !note.start.is_finite() {
                    continue;
                }
                let index = note.start.floor() as usize;
                if index >= length {
                    continue;
                }
                buckets[index].push(ScheduledNote {
                    channel: channel.id.clone(),
                    sample: channel.sample.key().to_string(),
                    pitch: note.pitch,
                    velocity: note.velocity,
                    offset_steps: note.start - index as f64,
                    duration_steps: note.duration.max(0.0),
                });
            }
        }
        Self { buckets }
    }

    pub fn note_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// Note triggers starting within `local_step`
    pub fn triggers(&self, local_step: usize, timing: &StepTiming, out: &mut Vec<TriggerCommand>) {
        let Some(bucket) = self.buckets.get(local_step) else {
            return;
        };
        for note in bucket {
            out.push(TriggerCommand::AttackRelease {
                channel: note.channel.clone(),
                sample: note.sample.clone(),
                pitch: note.pitch,
                velocity: note.velocity,
                duration: note.duration_steps * timing.step_seconds,
                time: timing.straight_time + note.offset_steps * timing.step_seconds,
            });
        }
    }
}

/// Step triggers and clip starts for one global step of song playback
///
/// Only the first track holding a pattern at this bar sounds, and only its
/// step-driven channels. Returns the ID of the pattern that played.
pub fn song_step_triggers<L: PatternLookup + ?Sized>(
    patterns: &L,
    arrangement: &Arrangement,
    song_step: usize,
    timing: &StepTiming,
    out: &mut Vec<TriggerCommand>,
) -> Option<String> {
    clip_triggers(arrangement, song_step, timing, out);

    let bar = song_step / STEPS_PER_BAR;
    let placement = arrangement.playlist.resolve_active(patterns, bar)?;
    let pattern = patterns.pattern(&placement.pattern_id)?;
    let local_step = (bar - placement.start_bar) * STEPS_PER_BAR + song_step % STEPS_PER_BAR;
    for channel in pattern.channels.iter().filter(|c| plays_steps(c)) {
        step_hits(channel, channel.step_wrapped(local_step), timing, out);
    }
    Some(placement.pattern_id)
}

/// Start every audio clip whose start falls within `song_step`
pub fn clip_triggers(
    arrangement: &Arrangement,
    song_step: usize,
    timing: &StepTiming,
    out: &mut Vec<TriggerCommand>,
) {
    let bar_seconds = timing.step_seconds * STEPS_PER_BAR as f64;
    for clip in &arrangement.audio_clips {
        if clip.trim_duration_bars <= 0.0 || clip.sample.is_empty() {
            continue;
        }
        let start_step = clip.start_bar * STEPS_PER_BAR as f64;
        if start_step.floor() as usize != song_step {
            continue;
        }
        out.push(TriggerCommand::StartClip {
            clip_id: clip.id.clone(),
            channel: clip.channel_id.clone(),
            sample: clip.sample.key().to_string(),
            time: timing.straight_time + (start_step - song_step as f64) * timing.step_seconds,
            offset: clip.trim_start_bars * bar_seconds,
            duration: clip.trim_duration_bars * bar_seconds,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::note::Note;
    use crate::sequencer::pattern::{PatternLength, SampleRef};
    use crate::sequencer::timeline::{Swing, Tempo};

    fn timing(step: u64) -> StepTiming {
        StepTiming::at(&StepClock::new(Tempo::new(120.0), Swing::default(), 0.0), step)
    }

    fn attack_times(out: &[TriggerCommand]) -> Vec<f64> {
        out.iter()
            .filter_map(|c| match c {
                TriggerCommand::AttackRelease { time, .. } => Some(*time),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_roll_subdivides_step() {
        let mut pattern = Pattern::with_default_kit("p".to_string(), "P");
        pattern.channels[0].steps[2] = Step::new(4);
        let mut out = Vec::new();
        pattern_step_triggers(&pattern, 2, &timing(2), &mut out);
        assert_eq!(attack_times(&out), vec![0.25, 0.28125, 0.3125, 0.34375]);
        assert!(out.iter().all(|c| matches!(
            c,
            TriggerCommand::AttackRelease { duration, .. } if *duration == 0.03125
        )));
    }

    #[test]
    fn test_cut_itself_release_precedes_attack() {
        let mut pattern = Pattern::with_default_kit("p".to_string(), "P");
        let hat = pattern.channels.iter().position(|c| c.cut_itself).unwrap();
        pattern.channels[hat].steps[0] = Step::new(2);
        let mut out = Vec::new();
        pattern_step_triggers(&pattern, 0, &timing(0), &mut out);
        assert_eq!(out.len(), 4);
        assert!(matches!(out[0], TriggerCommand::ReleaseAll { time, .. } if time == 0.0));
        assert!(matches!(out[1], TriggerCommand::AttackRelease { time, .. } if time == 0.0));
        assert!(matches!(out[2], TriggerCommand::ReleaseAll { .. }));
        assert!(matches!(out[3], TriggerCommand::AttackRelease { .. }));
    }

    #[test]
    fn test_note_driven_channel_skips_steps() {
        let mut pattern = Pattern::with_default_kit("p".to_string(), "P");
        pattern.channels[0].steps[0] = Step::HIT;
        pattern.channels[0].notes.push(Note::new(72, 0.5, 2.0, 0.5));
        let mut out = Vec::new();
        pattern_step_triggers(&pattern, 0, &timing(0), &mut out);
        assert!(out.is_empty());

        let schedule = NoteSchedule::build(&pattern);
        assert_eq!(schedule.note_count(), 1);
        schedule.triggers(0, &timing(0), &mut out);
        match &out[0] {
            TriggerCommand::AttackRelease {
                pitch,
                time,
                duration,
                velocity,
                ..
            } => {
                assert_eq!(*pitch, 72);
                assert_eq!(*time, 0.0625);
                assert_eq!(*duration, 0.25);
                assert_eq!(*velocity, 0.5);
            }
            other => panic!("unexpected trigger {other:?}"),
        }
    }

    #[test]
    fn test_notes_not_swung() {
        let mut pattern = Pattern::with_default_kit("p".to_string(), "P");
        pattern.channels[0].notes.push(Note::new(60, 1.0, 1.0, 1.0));
        let clock = StepClock::new(Tempo::new(120.0), Swing::new(1.0), 0.0);
        let mut out = Vec::new();
        NoteSchedule::build(&pattern).triggers(1, &StepTiming::at(&clock, 1), &mut out);
        assert_eq!(attack_times(&out), vec![0.125]);
    }

    #[test]
    fn test_song_step_uses_first_track_and_wraps_steps() {
        let mut long = Pattern::with_default_kit("long".to_string(), "Long");
        long.length = PatternLength::Steps32;
        long.channels[0].steps[3] = Step::HIT;
        let mut other = Pattern::with_default_kit("other".to_string(), "Other");
        other.channels[1].steps[3] = Step::HIT;
        let patterns = vec![long, other];

        let mut arrangement = Arrangement::new();
        arrangement.playlist.place(&patterns, 4, 0, "other");
        arrangement.playlist.place(&patterns, 0, 0, "long");

        // Bar 1, step 3: local step 19 wraps onto the 16-step array of channel 0
        let mut out = Vec::new();
        let played = song_step_triggers(&patterns, &arrangement, 19, &timing(19), &mut out);
        assert_eq!(played.as_deref(), Some("long"));
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], TriggerCommand::AttackRelease { channel, .. } if channel == "long/ch0"));

        out.clear();
        assert_eq!(song_step_triggers(&patterns, &arrangement, 40, &timing(40), &mut out), None);
    }

    #[test]
    fn test_clip_start_trigger() {
        let mut arrangement = Arrangement::new();
        let id = arrangement.add_audio_clip(SampleRef::new("loop", "loop.wav"), 0, 1.5, 4.0);
        arrangement.audio_clip_mut(&id).unwrap().set_trim(1.0, 2.0);
        let mut out = Vec::new();
        clip_triggers(&arrangement, 23, &timing(23), &mut out);
        assert!(out.is_empty());
        clip_triggers(&arrangement, 24, &timing(24), &mut out);
        match &out[0] {
            TriggerCommand::StartClip {
                time,
                offset,
                duration,
                ..
            } => {
                assert_eq!(*time, 3.0);
                assert_eq!(*offset, 2.0);
                assert_eq!(*duration, 4.0);
            }
            other => panic!("unexpected trigger {other:?}"),
        }
    }
}
