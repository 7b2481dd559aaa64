// Sampler voice - Plays one sample at scheduled times, repitched from middle C
//
// Polyphonic: every trigger is a separate playback. `release_all` chokes the
// playbacks that have started by then, which is how cut-itself channels and
// stop behave. `cancel_from` drops playbacks that were sent ahead but have not
// started yet.

use crate::audio::engine::Voice;
use crate::audio::offline::{RenderFormat, RenderVoice};
use crate::sampler::Sample;
use crate::sequencer::note::DEFAULT_PITCH;
use std::sync::Arc;

/// Fade length after a release, in seconds
pub const RELEASE_SECONDS: f64 = 0.1;

/// One scheduled playback of the sample
#[derive(Debug, Clone, PartialEq)]
pub struct Playback {
    pub start: f64,
    pub pitch: u8,
    pub gain: f32,
    /// Seconds into the source where playback begins
    pub offset: f64,
    /// Time the release fade begins; plays to the end of the sample when unset
    pub release: Option<f64>,
}

pub struct SamplerVoice {
    sample: Arc<Sample>,
    playbacks: Vec<Playback>,
    /// Clip players ignore pitch
    pitched: bool,
}

impl SamplerVoice {
    pub fn new(sample: Arc<Sample>) -> Self {
        Self {
            sample,
            playbacks: Vec::new(),
            pitched: true,
        }
    }

    /// Player for an audio clip region
    pub fn clip_player(sample: Arc<Sample>) -> Self {
        Self {
            pitched: false,
            ..Self::new(sample)
        }
    }

    pub fn sample(&self) -> &Arc<Sample> {
        &self.sample
    }

    pub fn playbacks(&self) -> &[Playback] {
        &self.playbacks
    }

    /// Playback rate relative to the source for a MIDI pitch
    fn pitch_ratio(&self, pitch: u8) -> f64 {
        if self.pitched {
            2.0_f64.powf((pitch as f64 - DEFAULT_PITCH as f64) / 12.0)
        } else {
            1.0
        }
    }

    fn mix_playback(&self, playback: &Playback, out: &mut [f32], first_frame: u64, format: RenderFormat) {
        let out_rate = format.sample_rate as f64;
        let step = self.pitch_ratio(playback.pitch) * self.sample.sample_rate as f64 / out_rate;
        let source_start = playback.offset * self.sample.sample_rate as f64;
        let source_frames = self.sample.frame_count() as f64;
        if step <= 0.0 || source_start >= source_frames {
            return;
        }

        let start_frame = format.frames_for(playback.start);
        let natural_end = start_frame + ((source_frames - source_start) / step).ceil() as u64;
        let end_frame = match playback.release {
            Some(release) => natural_end.min(format.frames_for(release + RELEASE_SECONDS)),
            None => natural_end,
        };

        let block_frames = (out.len() / format.channels as usize) as u64;
        let from = start_frame.max(first_frame);
        let to = end_frame.min(first_frame + block_frames);

        for frame in from..to {
            let elapsed = (frame - start_frame) as f64;
            let position = source_start + elapsed * step;
            let mut gain = playback.gain;
            if let Some(release) = playback.release {
                let since_release = format.seconds_for(frame) - release;
                if since_release > 0.0 {
                    gain *= (1.0 - since_release / RELEASE_SECONDS).max(0.0) as f32;
                }
            }
            let (left, right) = self.sample.interpolated(position);
            format.add_frame(out, (frame - first_frame) as usize, left * gain, right * gain);
        }
    }
}

impl Voice for SamplerVoice {
    fn trigger_attack(&mut self, pitch: u8, time: f64, velocity: f32) {
        self.playbacks.push(Playback {
            start: time,
            pitch,
            gain: velocity,
            offset: 0.0,
            release: None,
        });
    }

    fn trigger_attack_release(&mut self, pitch: u8, duration: f64, time: f64, velocity: f32) {
        self.playbacks.push(Playback {
            start: time,
            pitch,
            gain: velocity,
            offset: 0.0,
            release: Some(time + duration.max(0.0)),
        });
    }

    fn release_all(&mut self, time: f64) {
        for playback in &mut self.playbacks {
            if playback.start <= time && playback.release.is_none_or(|r| r > time) {
                playback.release = Some(time);
            }
        }
    }

    fn cancel_from(&mut self, time: f64) {
        self.playbacks.retain(|playback| playback.start < time);
    }

    fn start_region(&mut self, time: f64, offset: f64, duration: f64, gain: f32) {
        self.playbacks.push(Playback {
            start: time,
            pitch: DEFAULT_PITCH,
            gain,
            offset: offset.max(0.0),
            release: Some(time + duration.max(0.0)),
        });
    }

    fn dispose(&mut self) {
        self.playbacks.clear();
    }
}

impl RenderVoice for SamplerVoice {
    fn mix_block(&self, out: &mut [f32], first_frame: u64, format: RenderFormat) {
        for playback in &self.playbacks {
            self.mix_playback(playback, out, first_frame, format);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Arc<Sample> {
        Arc::new(Sample::new("ramp", 100, 1, (0..100).map(|i| i as f32 / 100.0).collect()))
    }

    fn render(voice: &SamplerVoice, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        voice.mix_block(&mut out, 0, RenderFormat::new(100, 1));
        out
    }

    #[test]
    fn test_octave_up_plays_twice_as_fast() {
        let mut voice = SamplerVoice::new(ramp());
        voice.trigger_attack(72, 0.0, 1.0);
        let out = render(&voice, 100);
        assert!((out[10] - 0.2).abs() < 1e-6);
        // Source exhausted after 50 output frames
        assert_eq!(out[60], 0.0);
    }

    #[test]
    fn test_release_all_chokes_started_playbacks_only() {
        let mut voice = SamplerVoice::new(ramp());
        voice.trigger_attack(60, 0.0, 1.0);
        voice.trigger_attack(60, 0.5, 1.0);
        voice.release_all(0.2);
        assert_eq!(voice.playbacks()[0].release, Some(0.2));
        assert_eq!(voice.playbacks()[1].release, None);

        let out = render(&voice, 50);
        assert!(out[10] > 0.0);
        // Fade is complete RELEASE_SECONDS after the choke
        assert_eq!(out[35], 0.0);
    }

    #[test]
    fn test_cancel_from_drops_pending_playbacks() {
        let mut voice = SamplerVoice::new(ramp());
        voice.trigger_attack(60, 0.0, 1.0);
        voice.trigger_attack_release(60, 0.1, 0.3, 1.0);
        voice.trigger_attack(60, 0.5, 1.0);
        voice.cancel_from(0.3);
        assert_eq!(voice.playbacks().len(), 1);
        assert_eq!(voice.playbacks()[0].start, 0.0);

        let out = render(&voice, 100);
        assert!(out[20] > 0.0);
        assert!((out[60] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_clip_region_uses_offset_and_ignores_pitch() {
        let mut voice = SamplerVoice::clip_player(ramp());
        voice.start_region(0.0, 0.5, 0.2, 1.0);
        let out = render(&voice, 100);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[10] - 0.6).abs() < 1e-6);
        assert_eq!(out[40], 0.0);
        voice.dispose();
        assert!(voice.playbacks().is_empty());
    }
}
