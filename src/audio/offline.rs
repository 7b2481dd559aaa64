// Offline render target - Faster than real time mixing for export
//
// Voices record what they are asked to play, with absolute times. Once every
// event is scheduled the renderer mixes block by block into an interleaved
// buffer. Nothing here runs on the audio thread.

use crate::audio::engine::{TriggerCommand, TriggerSink, Voice, VoiceRegistry};
use crate::audio::meter::PeakMeter;
use crate::sampler::Sample;
use crate::sampler::voice::SamplerVoice;
use crate::sequencer::metronome::{ClickType, MetronomeSound};
use std::sync::Arc;
use tracing::debug;

/// Frames mixed per block (progress is reported per block)
pub const RENDER_BLOCK_FRAMES: usize = 4096;

/// A voice that can mix its scheduled output into a buffer
pub trait RenderVoice: Voice {
    /// Add this voice's output for the frames starting at `first_frame`
    fn mix_block(&self, out: &mut [f32], first_frame: u64, format: RenderFormat);
}

/// Output layout of a render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl RenderFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.clamp(1, 2),
        }
    }

    pub fn frames_for(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    pub fn seconds_for(&self, frames: u64) -> f64 {
        frames as f64 / self.sample_rate as f64
    }

    /// Write a stereo frame, folding to mono when needed
    pub fn add_frame(&self, out: &mut [f32], frame: usize, left: f32, right: f32) {
        match self.channels {
            1 => {
                if let Some(slot) = out.get_mut(frame) {
                    *slot += (left + right) * 0.5;
                }
            }
            _ => {
                if let Some(slots) = out.get_mut(frame * 2..frame * 2 + 2) {
                    slots[0] += left;
                    slots[1] += right;
                }
            }
        }
    }
}

/// Rendered interleaved audio
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl RenderedAudio {
    pub fn silent(format: RenderFormat, frames: usize) -> Self {
        Self {
            samples: vec![0.0; frames * format.channels as usize],
            sample_rate: format.sample_rate,
            channels: format.channels,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

/// Metronome clicks rendered from the synthesized click sound
pub struct ClickVoice {
    sound: MetronomeSound,
    clicks: Vec<(f64, ClickType)>,
}

impl ClickVoice {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sound: MetronomeSound::new(sample_rate as f32),
            clicks: Vec::new(),
        }
    }

    pub fn clicks(&self) -> &[(f64, ClickType)] {
        &self.clicks
    }
}

impl Voice for ClickVoice {
    fn trigger_attack(&mut self, pitch: u8, time: f64, _velocity: f32) {
        self.clicks.push((time, ClickType::from_pitch(pitch)));
    }

    fn trigger_attack_release(&mut self, pitch: u8, _duration: f64, time: f64, velocity: f32) {
        self.trigger_attack(pitch, time, velocity);
    }

    fn release_all(&mut self, _time: f64) {}

    fn cancel_from(&mut self, time: f64) {
        self.clicks.retain(|&(start, _)| start < time);
    }

    fn start_region(&mut self, time: f64, _offset: f64, _duration: f64, _gain: f32) {
        self.trigger_attack(ClickType::Regular.pitch(), time, 1.0);
    }
}

impl RenderVoice for ClickVoice {
    fn mix_block(&self, out: &mut [f32], first_frame: u64, format: RenderFormat) {
        let block_frames = (out.len() / format.channels as usize) as u64;
        for &(time, kind) in &self.clicks {
            let click = self.sound.waveform(kind);
            let start = format.frames_for(time);
            let end = start + click.len() as u64;
            if end <= first_frame || start >= first_frame + block_frames {
                continue;
            }
            let from = start.max(first_frame);
            let to = end.min(first_frame + block_frames);
            for frame in from..to {
                let value = click[(frame - start) as usize];
                format.add_frame(out, (frame - first_frame) as usize, value, value);
            }
        }
    }
}

/// Trigger sink that renders offline
///
/// One voice per unique sample and one per audio clip, like the live engine.
pub struct OfflineRenderer {
    registry: VoiceRegistry<Box<dyn RenderVoice>>,
    format: RenderFormat,
    meter: PeakMeter,
}

impl OfflineRenderer {
    pub fn new(format: RenderFormat) -> Self {
        Self {
            registry: VoiceRegistry::new(),
            format,
            meter: PeakMeter::new(),
        }
    }

    pub fn format(&self) -> RenderFormat {
        self.format
    }

    pub fn load_sample(&mut self, key: impl Into<String>, sample: Arc<Sample>) {
        self.registry
            .load_sample(key, Box::new(SamplerVoice::new(sample)));
    }

    pub fn load_clip(&mut self, clip_id: impl Into<String>, sample: Arc<Sample>) {
        self.registry
            .load_clip(clip_id, Box::new(SamplerVoice::clip_player(sample)));
    }

    pub fn enable_clicks(&mut self) {
        self.registry
            .set_click_voice(Box::new(ClickVoice::new(self.format.sample_rate)));
    }

    pub fn has_sample(&self, key: &str) -> bool {
        self.registry.has_sample(key)
    }

    pub fn has_clip(&self, clip_id: &str) -> bool {
        self.registry.has_clip(clip_id)
    }

    /// Triggers dropped because their sample or clip was not loaded
    pub fn dropped(&self) -> u64 {
        self.registry.dropped()
    }

    /// Level of the last rendered block
    pub fn meter(&self) -> PeakMeter {
        self.meter.clone()
    }

    /// Mix `duration` seconds of everything scheduled so far
    pub fn render(&self, duration: f64, progress: &mut dyn FnMut(f32)) -> RenderedAudio {
        let total_frames = self.format.frames_for(duration) as usize;
        let channels = self.format.channels as usize;
        let mut audio = RenderedAudio::silent(self.format, total_frames);

        let voices: Vec<&Box<dyn RenderVoice>> = self
            .registry
            .voices()
            .map(|(_, v)| v)
            .chain(self.registry.clips().map(|(_, v)| v))
            .chain(self.registry.click_voice())
            .collect();

        debug!(
            frames = total_frames,
            voices = voices.len(),
            sample_rate = self.format.sample_rate,
            "offline render"
        );

        let mut first_frame = 0usize;
        for block in audio.samples.chunks_mut(RENDER_BLOCK_FRAMES * channels) {
            for voice in &voices {
                voice.mix_block(block, first_frame as u64, self.format);
            }
            self.meter.update(block);
            first_frame += block.len() / channels;
            progress(first_frame as f32 / total_frames.max(1) as f32);
        }
        if total_frames == 0 {
            progress(1.0);
        }
        audio
    }
}

impl TriggerSink for OfflineRenderer {
    fn send(&mut self, command: TriggerCommand) {
        self.registry.apply(command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::meter::Meter;

    fn dc_sample(frames: usize) -> Arc<Sample> {
        Arc::new(Sample::new("dc", 1000, 1, vec![0.5; frames]))
    }

    fn attack_release(sample: &str, time: f64, duration: f64) -> TriggerCommand {
        TriggerCommand::AttackRelease {
            channel: "ch".to_string(),
            sample: sample.to_string(),
            pitch: 60,
            velocity: 1.0,
            duration,
            time,
        }
    }

    #[test]
    fn test_render_places_hits_at_their_time() {
        let mut renderer = OfflineRenderer::new(RenderFormat::new(1000, 1));
        renderer.load_sample("dc", dc_sample(1000));
        renderer.send(attack_release("dc", 0.5, 0.2));

        let audio = renderer.render(1.0, &mut |_| {});
        assert_eq!(audio.frame_count(), 1000);
        assert_eq!(audio.samples[499], 0.0);
        assert!((audio.samples[500] - 0.5).abs() < 1e-6);
        assert!((audio.samples[650] - 0.5).abs() < 1e-6);
        // Released at 0.7, faded out before the end
        assert_eq!(audio.samples[999], 0.0);
    }

    #[test]
    fn test_unloaded_sample_is_silent() {
        let mut renderer = OfflineRenderer::new(RenderFormat::new(1000, 2));
        renderer.send(attack_release("missing", 0.0, 0.1));
        let audio = renderer.render(0.5, &mut |_| {});
        assert_eq!(audio.peak(), 0.0);
        assert_eq!(renderer.dropped(), 1);
    }

    #[test]
    fn test_muted_channel_renders_silence() {
        let mut renderer = OfflineRenderer::new(RenderFormat::new(1000, 1));
        renderer.load_sample("dc", dc_sample(1000));
        renderer.send(TriggerCommand::SetGain {
            channel: "ch".to_string(),
            gain_db: f32::NEG_INFINITY,
        });
        renderer.send(attack_release("dc", 0.0, 0.5));
        assert_eq!(renderer.render(1.0, &mut |_| {}).peak(), 0.0);
    }

    #[test]
    fn test_progress_and_meter() {
        let mut renderer = OfflineRenderer::new(RenderFormat::new(8000, 2));
        renderer.enable_clicks();
        renderer.send(TriggerCommand::Click {
            kind: ClickType::Accent,
            time: 0.0,
        });
        let mut reports = Vec::new();
        let audio = renderer.render(2.0, &mut |p| reports.push(p));
        assert_eq!(audio.frame_count(), 16000);
        assert!(audio.peak() > 0.1);
        assert_eq!(reports.last().copied(), Some(1.0));
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
        // Last block is past the click
        assert_eq!(renderer.meter().read(), f32::NEG_INFINITY);
    }
}
