// Metronome - Count-in and beat clicks on the transport timeline
// Clicks are scheduled like any other event; the click sound is synthesized once

use crate::sequencer::timeline::{STEPS_PER_BAR, STEPS_PER_BEAT, Tempo};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// Beats per bar (4/4)
pub const BEATS_PER_BAR: usize = STEPS_PER_BAR / STEPS_PER_BEAT;

/// Downbeat or other beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClickType {
    Accent,
    Regular,
}

impl ClickType {
    /// Pitch a click is played at on a click voice
    pub fn pitch(self) -> u8 {
        match self {
            ClickType::Accent => 84,
            ClickType::Regular => 72,
        }
    }

    pub fn from_pitch(pitch: u8) -> Self {
        if pitch >= ClickType::Accent.pitch() {
            ClickType::Accent
        } else {
            ClickType::Regular
        }
    }

    fn for_beat(beat: usize) -> Self {
        if beat % BEATS_PER_BAR == 0 {
            ClickType::Accent
        } else {
            ClickType::Regular
        }
    }

    fn level(self) -> f32 {
        match self {
            ClickType::Accent => 0.6,
            ClickType::Regular => 0.4,
        }
    }
}

/// Synthesized click waveforms, one per click type, rendered at one sample rate
#[derive(Debug, Clone)]
pub struct MetronomeSound {
    accent: Vec<f32>,
    regular: Vec<f32>,
}

impl MetronomeSound {
    const CLICK_SECONDS: f32 = 0.01;

    pub fn new(sample_rate: f32) -> Self {
        let frames = (Self::CLICK_SECONDS * sample_rate) as usize;
        Self {
            accent: blip(ClickType::Accent, sample_rate, frames),
            regular: blip(ClickType::Regular, sample_rate, frames),
        }
    }

    pub fn waveform(&self, kind: ClickType) -> &[f32] {
        match kind {
            ClickType::Accent => &self.accent,
            ClickType::Regular => &self.regular,
        }
    }

    /// Frames per click (both types share one length)
    pub fn frames(&self) -> usize {
        self.accent.len()
    }
}

/// Decaying sine at the click's pitch
fn blip(kind: ClickType, sample_rate: f32, frames: usize) -> Vec<f32> {
    let hz = 440.0 * 2f32.powf((kind.pitch() as f32 - 69.0) / 12.0);
    let omega = TAU * hz / sample_rate;
    (0..frames)
        .map(|i| {
            let decay = (-8.0 * i as f32 / frames as f32).exp();
            (omega * i as f32).sin() * decay * kind.level()
        })
        .collect()
}

/// Metronome settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metronome {
    enabled: bool,
}

impl Metronome {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Click for a playback step: one per beat while enabled
    pub fn click_for_step(&self, step_index: u64) -> Option<ClickType> {
        let step = step_index as usize;
        if !self.enabled || step % STEPS_PER_BEAT != 0 {
            return None;
        }
        Some(ClickType::for_beat(step / STEPS_PER_BEAT))
    }
}

impl Default for Metronome {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Pre-roll clicks: one per beat over `bars`, starting at `start`
///
/// Count-in clicks sound even when the metronome is disabled.
pub fn count_in_clicks(start: f64, bars: usize, tempo: &Tempo) -> Vec<(f64, ClickType)> {
    let beat_seconds = tempo.beat_duration_seconds();
    (0..bars * BEATS_PER_BAR)
        .map(|beat| (start + beat as f64 * beat_seconds, ClickType::for_beat(beat)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accent_click_is_louder() {
        let sound = MetronomeSound::new(8000.0);
        assert_eq!(sound.frames(), 80);
        let peak = |kind| sound.waveform(kind).iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert_eq!(sound.waveform(ClickType::Regular).len(), 80);
        assert!(peak(ClickType::Accent) > peak(ClickType::Regular));
        assert!(peak(ClickType::Accent) <= 0.6);
    }

    #[test]
    fn test_count_in_clicks() {
        let clicks = count_in_clicks(1.0, 2, &Tempo::new(120.0));
        assert_eq!(clicks.len(), 8);
        assert_eq!(clicks[0], (1.0, ClickType::Accent));
        assert_eq!(clicks[1], (1.5, ClickType::Regular));
        assert_eq!(clicks[4], (3.0, ClickType::Accent));
        assert!(count_in_clicks(0.0, 0, &Tempo::new(120.0)).is_empty());
    }

    #[test]
    fn test_beat_clicks() {
        let metronome = Metronome::default();
        let clicks: Vec<Option<ClickType>> = (0..20).map(|s| metronome.click_for_step(s)).collect();
        assert_eq!(clicks[0], Some(ClickType::Accent));
        assert_eq!(clicks[1], None);
        assert_eq!(clicks[4], Some(ClickType::Regular));
        assert_eq!(clicks[16], Some(ClickType::Accent));

        let mut muted = Metronome::new(false);
        assert_eq!(muted.click_for_step(0), None);
        muted.set_enabled(true);
        assert!(muted.is_enabled());
        assert_eq!(
            (ClickType::from_pitch(ClickType::Accent.pitch()), ClickType::from_pitch(72)),
            (ClickType::Accent, ClickType::Regular)
        );
    }
}
