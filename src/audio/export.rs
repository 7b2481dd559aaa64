// Audio Export - Offline rendering of a pattern or the song to WAV/MP3
//
// Export replays the same step-to-trigger mapping as live playback, but every
// event is scheduled up front on an offline renderer and mixed as fast as
// possible. No count-in, no recording, no interactivity.

use crate::audio::engine::{TriggerCommand, TriggerSink};
use crate::audio::mp3::{FfmpegMp3Encoder, Mp3Error, encode_mp3};
use crate::audio::offline::{OfflineRenderer, RenderFormat, RenderedAudio};
use crate::audio::routing::resolve_gains;
use crate::audio::wav::encode_wav;
use crate::sampler::SampleCache;
use crate::sequencer::metronome::Metronome;
use crate::sequencer::pattern::{Channel, Pattern, PatternId, SampleRef};
use crate::sequencer::player::{NoteSchedule, StepTiming, pattern_step_triggers, song_step_triggers};
use crate::sequencer::playlist::Arrangement;
use crate::sequencer::timeline::{SONG_STEPS, STEPS_PER_BAR, StepClock, Swing, Tempo};
use crate::store::PatternBank;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Pattern not found: {0}")]
    PatternNotFound(PatternId),

    #[error("Nothing to export: {0}")]
    Empty(&'static str),

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Mp3(#[from] Mp3Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export already in progress")]
    Busy,
}

/// Audio export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportFormat {
    /// Uncompressed 16-bit PCM
    #[default]
    Wav,
    /// 320 kbps CBR
    Mp3,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Mp3 => "mp3",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "wav" => Some(ExportFormat::Wav),
            "mp3" => Some(ExportFormat::Mp3),
            _ => None,
        }
    }
}

/// What to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    /// One pass through a pattern
    Pattern(PatternId),
    /// The arrangement, up to the end of its last placement or clip
    Song,
}

/// Audio export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub sample_rate: u32,
    /// 1 = mono, 2 = stereo
    pub channels: u16,
    /// Add metronome clicks to the render
    pub include_metronome: bool,
    /// ffmpeg executable used for MP3
    pub ffmpeg_path: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            include_metronome: false,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl ExportSettings {
    pub fn format(&self) -> RenderFormat {
        RenderFormat::new(self.sample_rate, self.channels)
    }
}

/// Everything an export reads, captured when it starts
#[derive(Debug, Clone)]
pub struct ExportSource<'a> {
    pub patterns: &'a PatternBank,
    pub arrangement: &'a Arrangement,
    pub tempo: Tempo,
    pub swing: Swing,
    pub samples: &'a SampleCache,
}

/// Rendered and encoded export
#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub audio: RenderedAudio,
    pub bytes: Vec<u8>,
    pub format: ExportFormat,
}

/// One pass through the pattern
pub fn pattern_duration(pattern: &Pattern, tempo: &Tempo) -> f64 {
    pattern.length_steps() as f64 * tempo.step_duration_seconds()
}

/// Channel gains from mute/solo, sent before any trigger
fn send_gains<'a>(channels: impl IntoIterator<Item = &'a Channel>, sink: &mut dyn TriggerSink) {
    for (channel, gain_db) in resolve_gains(channels) {
        sink.send(TriggerCommand::SetGain { channel, gain_db });
    }
}

fn send_all(out: &mut Vec<TriggerCommand>, sink: &mut dyn TriggerSink) {
    for command in out.drain(..) {
        sink.send(command);
    }
}

fn push_click(metronome: Option<&Metronome>, step: u64, timing: &StepTiming, out: &mut Vec<TriggerCommand>) {
    if let Some(kind) = metronome.and_then(|m| m.click_for_step(step)) {
        out.push(TriggerCommand::Click {
            kind,
            time: timing.straight_time,
        });
    }
}

/// Schedule one pass of `pattern` starting at clock time 0
///
/// Swing delays odd steps exactly as in live playback.
pub fn schedule_pattern(
    pattern: &Pattern,
    tempo: Tempo,
    swing: Swing,
    metronome: Option<&Metronome>,
    sink: &mut dyn TriggerSink,
) {
    send_gains(&pattern.channels, sink);
    let clock = StepClock::new(tempo, swing, 0.0);
    let notes = NoteSchedule::build(pattern);
    let mut out = Vec::new();
    for step in 0..pattern.length_steps() {
        let timing = StepTiming::at(&clock, step as u64);
        pattern_step_triggers(pattern, step, &timing, &mut out);
        notes.triggers(step, &timing, &mut out);
        push_click(metronome, step as u64, &timing, &mut out);
        send_all(&mut out, sink);
    }
}

/// Number of song steps covering the arrangement
pub fn song_steps(patterns: &PatternBank, arrangement: &Arrangement) -> usize {
    let bars = arrangement.song_length_bars(patterns);
    ((bars * STEPS_PER_BAR as f64).ceil() as usize).min(SONG_STEPS)
}

/// Schedule the whole arrangement starting at clock time 0
pub fn schedule_song(
    patterns: &PatternBank,
    arrangement: &Arrangement,
    tempo: Tempo,
    swing: Swing,
    metronome: Option<&Metronome>,
    sink: &mut dyn TriggerSink,
) {
    send_gains(
        patterns
            .iter()
            .flat_map(|p| p.channels.iter())
            .chain(arrangement.clip_channels.iter()),
        sink,
    );
    let clock = StepClock::new(tempo, swing, 0.0);
    let mut out = Vec::new();
    for step in 0..song_steps(patterns, arrangement) {
        let timing = StepTiming::at(&clock, step as u64);
        song_step_triggers(patterns, arrangement, step, &timing, &mut out);
        push_click(metronome, step as u64, &timing, &mut out);
        send_all(&mut out, sink);
    }
}

/// Install one voice per unique sample used by `channels`
fn load_voices<'a>(
    renderer: &mut OfflineRenderer,
    channels: impl IntoIterator<Item = &'a Channel>,
    samples: &SampleCache,
) {
    for channel in channels {
        let key = channel.sample.key();
        if channel.sample.is_empty() || renderer.has_sample(key) {
            continue;
        }
        match samples.get(key) {
            Some(sample) => renderer.load_sample(key, sample.clone()),
            None => warn!(sample = %channel.sample.name, "sample not loaded, channel renders silent"),
        }
    }
}

/// Every sample `target` plays, without duplicates
pub fn referenced_samples(patterns: &PatternBank, arrangement: &Arrangement, target: &ExportTarget) -> Vec<SampleRef> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut keep = |sample: &SampleRef| {
        if !sample.is_empty() && seen.insert(sample.key().to_string()) {
            out.push(sample.clone());
        }
    };
    match target {
        ExportTarget::Pattern(id) => {
            for channel in patterns.get(id).into_iter().flat_map(|p| p.channels.iter()) {
                keep(&channel.sample);
            }
        }
        ExportTarget::Song => {
            for channel in patterns.iter().flat_map(|p| p.channels.iter()) {
                keep(&channel.sample);
            }
            for clip in &arrangement.audio_clips {
                keep(&clip.sample);
            }
        }
    }
    out
}

/// Render a pattern or the song to interleaved audio
pub fn render(
    source: &ExportSource<'_>,
    target: &ExportTarget,
    settings: &ExportSettings,
    progress: &mut dyn FnMut(f32),
) -> Result<RenderedAudio, ExportError> {
    let mut renderer = OfflineRenderer::new(settings.format());
    let metronome = settings.include_metronome.then(|| Metronome::new(true));
    if metronome.is_some() {
        renderer.enable_clicks();
    }

    let duration = match target {
        ExportTarget::Pattern(pattern_id) => {
            let pattern = source
                .patterns
                .get(pattern_id)
                .ok_or_else(|| ExportError::PatternNotFound(pattern_id.clone()))?;
            load_voices(&mut renderer, &pattern.channels, source.samples);
            schedule_pattern(pattern, source.tempo, source.swing, metronome.as_ref(), &mut renderer);
            pattern_duration(pattern, &source.tempo)
        }
        ExportTarget::Song => {
            let duration = source
                .arrangement
                .song_duration_seconds(source.patterns, &source.tempo);
            if duration <= 0.0 {
                return Err(ExportError::Empty("the playlist is empty"));
            }
            load_voices(
                &mut renderer,
                source.patterns.iter().flat_map(|p| p.channels.iter()),
                source.samples,
            );
            for clip in &source.arrangement.audio_clips {
                match source.samples.get(clip.sample.key()) {
                    Some(sample) => renderer.load_clip(clip.id.clone(), sample.clone()),
                    None => warn!(clip = %clip.id, "clip sample not loaded, clip renders silent"),
                }
            }
            schedule_song(
                source.patterns,
                source.arrangement,
                source.tempo,
                source.swing,
                metronome.as_ref(),
                &mut renderer,
            );
            duration
        }
    };

    info!(?target, duration, sample_rate = settings.sample_rate, "export render started");
    let audio = renderer.render(duration, progress);
    if renderer.dropped() > 0 {
        warn!(dropped = renderer.dropped(), "triggers for unloaded samples skipped");
    }
    Ok(audio)
}

/// Encode rendered audio in the requested format
pub fn encode(audio: &RenderedAudio, format: ExportFormat, settings: &ExportSettings) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Wav => Ok(encode_wav(audio)?),
        ExportFormat::Mp3 => {
            let mut encoder = FfmpegMp3Encoder::spawn(&settings.ffmpeg_path, audio.sample_rate)?;
            Ok(encode_mp3(audio, &mut encoder)?)
        }
    }
}

/// Render, encode and return the result
pub fn export(
    source: &ExportSource<'_>,
    target: &ExportTarget,
    format: ExportFormat,
    settings: &ExportSettings,
    progress: &mut dyn FnMut(f32),
) -> Result<ExportOutput, ExportError> {
    let audio = render(source, target, settings, progress)?;
    let bytes = encode(&audio, format, settings)?;
    info!(format = format.extension(), bytes = bytes.len(), "export encoded");
    Ok(ExportOutput { audio, bytes, format })
}

/// Render, encode and write to `path`
pub fn export_to_file(
    source: &ExportSource<'_>,
    target: &ExportTarget,
    format: ExportFormat,
    settings: &ExportSettings,
    path: &Path,
    progress: &mut dyn FnMut(f32),
) -> Result<ExportOutput, ExportError> {
    let output = export(source, target, format, settings, progress)?;
    std::fs::write(path, &output.bytes)?;
    info!(path = %path.display(), "export written");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::Sample;
    use crate::sequencer::pattern::SampleRef;
    use crate::sequencer::step::Step;
    use std::sync::Arc;

    fn pattern_with_kick() -> Pattern {
        let mut pattern = Pattern::new("p1".to_string(), "Beat");
        pattern.add_channel("Kick", SampleRef::new("kick", "kick.wav"));
        pattern
    }

    fn cache() -> SampleCache {
        let mut cache = SampleCache::new();
        cache.insert("kick.wav", Arc::new(Sample::new("kick", 1000, 1, vec![0.5; 50])));
        cache
    }

    #[test]
    fn test_schedule_pattern_applies_swing_to_odd_steps() {
        let mut pattern = pattern_with_kick();
        pattern.channels[0].steps[0] = Step::HIT;
        pattern.channels[0].steps[1] = Step::HIT;

        let mut log: Vec<TriggerCommand> = Vec::new();
        schedule_pattern(&pattern, Tempo::new(120.0), Swing::new(0.5), None, &mut log);
        let times: Vec<f64> = log
            .iter()
            .filter(|c| matches!(c, TriggerCommand::AttackRelease { .. }))
            .filter_map(TriggerCommand::time)
            .collect();
        // 0.125 s steps, half a step of swing at 0.5 is 0.03125
        assert_eq!(times, vec![0.0, 0.125 + 0.03125]);
        assert!(matches!(log[0], TriggerCommand::SetGain { .. }));
    }

    #[test]
    fn test_render_pattern_duration_and_content() {
        let mut pattern = pattern_with_kick();
        pattern.channels[0].steps[4] = Step::HIT;
        let bank = PatternBank::new(vec![pattern]);
        let arrangement = Arrangement::default();
        let samples = cache();
        let source = ExportSource {
            patterns: &bank,
            arrangement: &arrangement,
            tempo: Tempo::new(120.0),
            swing: Swing::default(),
            samples: &samples,
        };
        let settings = ExportSettings {
            sample_rate: 1000,
            channels: 1,
            ..ExportSettings::default()
        };

        let audio = render(&source, &ExportTarget::Pattern("p1".to_string()), &settings, &mut |_| {}).unwrap();
        // One bar at 120 BPM is 2 seconds
        assert_eq!(audio.frame_count(), 2000);
        assert_eq!(audio.samples[499], 0.0);
        assert!((audio.samples[500] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_render_errors() {
        let bank = PatternBank::default();
        let arrangement = Arrangement::default();
        let samples = SampleCache::new();
        let source = ExportSource {
            patterns: &bank,
            arrangement: &arrangement,
            tempo: Tempo::default(),
            swing: Swing::default(),
            samples: &samples,
        };
        let settings = ExportSettings::default();
        assert!(matches!(
            render(&source, &ExportTarget::Pattern("nope".to_string()), &settings, &mut |_| {}),
            Err(ExportError::PatternNotFound(_))
        ));
        assert!(matches!(
            render(&source, &ExportTarget::Song, &settings, &mut |_| {}),
            Err(ExportError::Empty(_))
        ));
    }

    #[test]
    fn test_song_duration_covers_placements() {
        let mut a = pattern_with_kick();
        a.channels[0].steps[0] = Step::HIT;
        let bank = PatternBank::new(vec![a]);
        let mut arrangement = Arrangement::default();
        assert!(arrangement.playlist.place(&bank, 0, 2, "p1"));
        assert_eq!(song_steps(&bank, &arrangement), 3 * STEPS_PER_BAR);

        let samples = cache();
        let source = ExportSource {
            patterns: &bank,
            arrangement: &arrangement,
            tempo: Tempo::new(120.0),
            swing: Swing::default(),
            samples: &samples,
        };
        let settings = ExportSettings {
            sample_rate: 1000,
            channels: 2,
            ..ExportSettings::default()
        };
        let output = export(&source, &ExportTarget::Song, ExportFormat::Wav, &settings, &mut |_| {}).unwrap();
        assert_eq!(output.audio.frame_count(), 6000);
        // Pattern starts at bar 2 (4 s)
        assert_eq!(output.audio.samples[2 * 3999], 0.0);
        assert!(output.audio.samples[2 * 4000] > 0.4);
        assert_eq!(&output.bytes[0..4], b"RIFF");
    }

    #[test]
    fn test_referenced_samples_per_target() {
        let mut a = pattern_with_kick();
        a.add_channel("Kick 2", SampleRef::new("kick", "kick.wav"));
        a.add_channel("Empty", SampleRef::default());
        let bank = PatternBank::new(vec![a]);
        let mut arrangement = Arrangement::default();
        arrangement.add_audio_clip(SampleRef::new("loop", "loop.wav"), 1, 0.0, 1.0);

        let pattern = referenced_samples(&bank, &arrangement, &ExportTarget::Pattern("p1".to_string()));
        assert_eq!(pattern, vec![SampleRef::new("kick", "kick.wav")]);
        let song = referenced_samples(&bank, &arrangement, &ExportTarget::Song);
        assert_eq!(song.len(), 2);
        assert_eq!(song[1].url, "loop.wav");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path(Path::new("out.MP3")), Some(ExportFormat::Mp3));
        assert_eq!(ExportFormat::from_path(Path::new("out.wav")), Some(ExportFormat::Wav));
        assert_eq!(ExportFormat::from_path(Path::new("out.flac")), None);
    }
}
