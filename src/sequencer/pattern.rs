// Pattern - A loopable set of per-channel step and note data
// A pattern is what the playlist places on song tracks

use crate::sequencer::note::Note;
use crate::sequencer::step::Step;
use crate::sequencer::timeline::{STEPS_PER_BAR, Tempo};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for patterns
pub type PatternId = String;

/// Unique identifier for channels, namespaced by the owning pattern
pub type ChannelId = String;

/// Number of effect slots on every channel
pub const EFFECT_SLOTS: usize = 6;

/// Generate a unique pattern ID
pub fn generate_pattern_id() -> PatternId {
    format!("pattern-{}", Uuid::new_v4().simple())
}

/// Allowed pattern lengths (16 steps = 1 bar)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum PatternLength {
    #[default]
    Steps16,
    Steps32,
    Steps64,
    Steps128,
}

impl PatternLength {
    pub fn from_steps(steps: usize) -> Option<Self> {
        match steps {
            16 => Some(Self::Steps16),
            32 => Some(Self::Steps32),
            64 => Some(Self::Steps64),
            128 => Some(Self::Steps128),
            _ => None,
        }
    }

    pub fn steps(self) -> usize {
        match self {
            Self::Steps16 => 16,
            Self::Steps32 => 32,
            Self::Steps64 => 64,
            Self::Steps128 => 128,
        }
    }

    pub fn bars(self) -> usize {
        self.steps() / STEPS_PER_BAR
    }
}

impl TryFrom<usize> for PatternLength {
    type Error = String;

    fn try_from(steps: usize) -> Result<Self, Self::Error> {
        Self::from_steps(steps)
            .ok_or_else(|| format!("pattern length must be 16, 32, 64 or 128 steps, got {steps}"))
    }
}

impl From<PatternLength> for usize {
    fn from(length: PatternLength) -> Self {
        length.steps()
    }
}

/// Reference to an audio sample, identified by its URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SampleRef {
    pub name: String,
    pub url: String,
}

impl SampleRef {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Identity used to share one voice between channels using the same sample
    pub fn key(&self) -> &str {
        &self.url
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_empty()
    }
}

/// Three-band channel EQ (gains in dB)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EqSettings {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverbParams {
    pub decay: f32,
    pub pre_delay: f32,
    pub wet: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayParams {
    pub delay_time: f32,
    pub feedback: f32,
    pub wet: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistortionParams {
    pub amount: f32,
    pub wet: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub kind: FilterKind,
    pub frequency: f32,
    pub q: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BitcrusherParams {
    pub bits: u8,
    pub wet: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    pub threshold: f32,
    pub ratio: f32,
    pub attack: f32,
    pub release: f32,
}

/// Effect inserted in a channel slot, one variant per effect kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Effect {
    Reverb(ReverbParams),
    Delay(DelayParams),
    Distortion(DistortionParams),
    Filter(FilterParams),
    Bitcrusher(BitcrusherParams),
    Compressor(CompressorParams),
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Reverb(_) => "Reverb",
            Effect::Delay(_) => "Delay",
            Effect::Distortion(_) => "Distortion",
            Effect::Filter(_) => "Filter",
            Effect::Bitcrusher(_) => "Bitcrusher",
            Effect::Compressor(_) => "Compressor",
        }
    }
}

pub type EffectSlots = [Option<Effect>; EFFECT_SLOTS];

/// One instrument lane of a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub sample: SampleRef,
    /// At least as long as the pattern; indices past the pattern length are kept but ignored
    pub steps: Vec<Step>,
    /// Any note here switches the channel from step playback to note playback
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Channel gain in dB
    #[serde(default)]
    pub volume: f32,
    /// Stereo position (-1.0 left, 0.0 center, 1.0 right)
    #[serde(default)]
    pub pan: f32,
    /// Choke: a new hit releases the voices still sounding on this channel
    #[serde(default)]
    pub cut_itself: bool,
    #[serde(default)]
    pub eq: EqSettings,
    #[serde(default)]
    pub effects: EffectSlots,
    #[serde(default)]
    pub is_audio_clip_channel: bool,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_soloed: bool,
}

impl Channel {
    /// Create a step channel with `length` silent steps
    pub fn new(id: ChannelId, name: impl Into<String>, sample: SampleRef, length: usize) -> Self {
        Self {
            id,
            name: name.into(),
            sample,
            steps: vec![Step::OFF; length],
            notes: Vec::new(),
            volume: 0.0,
            pan: 0.0,
            cut_itself: false,
            eq: EqSettings::default(),
            effects: EffectSlots::default(),
            is_audio_clip_channel: false,
            is_muted: false,
            is_soloed: false,
        }
    }

    /// Create the dedicated mixer channel of an audio clip
    pub fn new_audio_clip(id: ChannelId, name: impl Into<String>, sample: SampleRef) -> Self {
        Self {
            is_audio_clip_channel: true,
            ..Self::new(id, name, sample, 0)
        }
    }

    /// Note-driven channels ignore their step grid
    pub fn is_note_driven(&self) -> bool {
        !self.notes.is_empty()
    }

    /// Step value at `index`, silent when past the end of the array
    pub fn step_at(&self, index: usize) -> Step {
        self.steps.get(index).copied().unwrap_or(Step::OFF)
    }

    /// Step value for song playback: wraps around shorter step arrays
    pub fn step_wrapped(&self, index: usize) -> Step {
        if self.steps.is_empty() {
            Step::OFF
        } else {
            self.steps[index % self.steps.len()]
        }
    }

    /// Pad (never truncate) the step array up to `length`
    pub fn ensure_length(&mut self, length: usize) {
        if self.steps.len() < length {
            self.steps.resize(length, Step::OFF);
        }
    }

    /// Copy of this channel's settings under a new ID, with no steps or notes
    pub fn cloned_topology(&self, id: ChannelId, length: usize) -> Self {
        Self {
            id,
            steps: vec![Step::OFF; length],
            notes: Vec::new(),
            ..self.clone()
        }
    }
}

/// Partial update of a channel; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelPatch {
    pub name: Option<String>,
    pub sample: Option<SampleRef>,
    pub steps: Option<Vec<Step>>,
    pub notes: Option<Vec<Note>>,
    pub volume: Option<f32>,
    pub pan: Option<f32>,
    pub cut_itself: Option<bool>,
    pub eq: Option<EqSettings>,
    pub effects: Option<EffectSlots>,
    pub is_muted: Option<bool>,
    pub is_soloed: Option<bool>,
}

impl ChannelPatch {
    pub fn muted(muted: bool) -> Self {
        Self {
            is_muted: Some(muted),
            ..Default::default()
        }
    }

    pub fn soloed(soloed: bool) -> Self {
        Self {
            is_soloed: Some(soloed),
            ..Default::default()
        }
    }

    pub fn apply_to(self, channel: &mut Channel) {
        if let Some(name) = self.name {
            channel.name = name;
        }
        if let Some(sample) = self.sample {
            channel.sample = sample;
        }
        if let Some(steps) = self.steps {
            channel.steps = steps;
        }
        if let Some(notes) = self.notes {
            channel.notes = notes;
        }
        if let Some(volume) = self.volume {
            channel.volume = volume;
        }
        if let Some(pan) = self.pan {
            channel.pan = pan.clamp(-1.0, 1.0);
        }
        if let Some(cut_itself) = self.cut_itself {
            channel.cut_itself = cut_itself;
        }
        if let Some(eq) = self.eq {
            channel.eq = eq;
        }
        if let Some(effects) = self.effects {
            channel.effects = effects;
        }
        if let Some(is_muted) = self.is_muted {
            channel.is_muted = is_muted;
        }
        if let Some(is_soloed) = self.is_soloed {
            channel.is_soloed = is_soloed;
        }
    }
}

/// Channel layout used for patterns created from scratch
pub fn default_kit() -> Vec<(&'static str, SampleRef, bool)> {
    vec![
        ("Kick", SampleRef::new("kick.wav", "samples/kick.wav"), false),
        ("Snare", SampleRef::new("snare.wav", "samples/snare.wav"), false),
        ("Clap", SampleRef::new("clap.wav", "samples/clap.wav"), false),
        ("Closed Hat", SampleRef::new("hihat-closed.wav", "samples/hihat-closed.wav"), true),
        ("Open Hat", SampleRef::new("hihat-open.wav", "samples/hihat-open.wav"), true),
    ]
}

/// A pattern of channels sharing one length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    pub channels: Vec<Channel>,
    pub length: PatternLength,
}

impl Pattern {
    /// Create an empty one-bar pattern
    pub fn new(id: PatternId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            channels: Vec::new(),
            length: PatternLength::default(),
        }
    }

    /// Create a one-bar pattern with the default drum kit
    pub fn with_default_kit(id: PatternId, name: impl Into<String>) -> Self {
        let mut pattern = Self::new(id, name);
        for (channel_name, sample, cut_itself) in default_kit() {
            let channel_id = pattern.next_channel_id();
            let mut channel = Channel::new(channel_id, channel_name, sample, pattern.length_steps());
            channel.cut_itself = cut_itself;
            pattern.channels.push(channel);
        }
        pattern
    }

    /// Copy the channel topology of `self` into a new pattern with fresh channel IDs
    pub fn cloned_topology(&self, id: PatternId, name: impl Into<String>) -> Self {
        let mut pattern = Self {
            id,
            name: name.into(),
            channels: Vec::with_capacity(self.channels.len()),
            length: self.length,
        };
        for channel in &self.channels {
            let channel_id = pattern.next_channel_id();
            pattern
                .channels
                .push(channel.cloned_topology(channel_id, self.length_steps()));
        }
        pattern
    }

    /// Next unused channel ID in this pattern's namespace
    pub fn next_channel_id(&self) -> ChannelId {
        let prefix = format!("{}/ch", self.id);
        let next = self
            .channels
            .iter()
            .filter_map(|c| c.id.strip_prefix(&prefix))
            .filter_map(|n| n.parse::<usize>().ok())
            .max()
            .map_or(0, |n| n + 1);
        format!("{prefix}{next}")
    }

    /// Append a new step channel
    pub fn add_channel(&mut self, name: impl Into<String>, sample: SampleRef) -> ChannelId {
        let id = self.next_channel_id();
        let channel = Channel::new(id.clone(), name, sample, self.length_steps());
        self.channels.push(channel);
        id
    }

    pub fn channel(&self, channel_id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == channel_id)
    }

    pub fn channel_mut(&mut self, channel_id: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id == channel_id)
    }

    pub fn length_steps(&self) -> usize {
        self.length.steps()
    }

    pub fn length_bars(&self) -> usize {
        self.length.bars()
    }

    /// Duration of one pass through the pattern
    pub fn duration_seconds(&self, tempo: &Tempo) -> f64 {
        tempo.steps_to_seconds(self.length_steps() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_length_conversion() {
        assert_eq!(PatternLength::from_steps(64), Some(PatternLength::Steps64));
        assert_eq!(PatternLength::from_steps(48), None);
        assert_eq!(PatternLength::Steps128.bars(), 8);
        let parsed: Result<PatternLength, _> = serde_json::from_str("24");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_default_kit_channels() {
        let pattern = Pattern::with_default_kit("p1".to_string(), "Pattern 1");
        assert_eq!(pattern.channels.len(), default_kit().len());
        assert_eq!(pattern.channels[0].id, "p1/ch0");
        assert_eq!(pattern.channels[4].id, "p1/ch4");
        assert!(pattern.channels.iter().all(|c| c.steps.len() == 16));
        assert!(pattern.channel("p1/ch3").is_some_and(|c| c.cut_itself));
    }

    #[test]
    fn test_cloned_topology_mints_fresh_ids() {
        let mut source = Pattern::with_default_kit("a".to_string(), "A");
        source.channels[0].steps[0] = Step::HIT;
        source.channels[0].volume = -6.0;

        let clone = source.cloned_topology("b".to_string(), "B");
        assert_eq!(clone.channels.len(), source.channels.len());
        assert_eq!(clone.channels[0].id, "b/ch0");
        assert_eq!(clone.channels[0].volume, -6.0);
        assert!(!clone.channels[0].steps[0].is_active());
        for (a, b) in source.channels.iter().zip(&clone.channels) {
            assert_ne!(a.id, b.id);
        }
    }

    #[test]
    fn test_next_channel_id_skips_used() {
        let mut pattern = Pattern::new("p".to_string(), "P");
        pattern.add_channel("One", SampleRef::default());
        pattern.add_channel("Two", SampleRef::default());
        pattern.channels.remove(0);
        assert_eq!(pattern.next_channel_id(), "p/ch2");
    }

    #[test]
    fn test_step_lookup() {
        let mut channel = Channel::new("c".to_string(), "C", SampleRef::default(), 16);
        channel.steps[3] = Step::new(2);
        assert_eq!(channel.step_at(3).value(), 2);
        assert_eq!(channel.step_at(40), Step::OFF);
        assert_eq!(channel.step_wrapped(19).value(), 2);
    }

    #[test]
    fn test_ensure_length_never_truncates() {
        let mut channel = Channel::new("c".to_string(), "C", SampleRef::default(), 32);
        channel.steps[20] = Step::HIT;
        channel.ensure_length(16);
        assert_eq!(channel.steps.len(), 32);
        channel.ensure_length(64);
        assert_eq!(channel.steps.len(), 64);
        assert_eq!(channel.steps[20], Step::HIT);
    }

    #[test]
    fn test_channel_patch() {
        let mut channel = Channel::new("c".to_string(), "C", SampleRef::default(), 16);
        ChannelPatch {
            pan: Some(4.0),
            is_muted: Some(true),
            ..Default::default()
        }
        .apply_to(&mut channel);
        assert_eq!(channel.pan, 1.0);
        assert!(channel.is_muted);
        assert_eq!(channel.name, "C");
    }

    #[test]
    fn test_effect_serialization_is_tagged() {
        let effect = Effect::Delay(DelayParams {
            delay_time: 0.25,
            feedback: 0.4,
            wet: 0.3,
        });
        let json = serde_json::to_value(effect).unwrap();
        assert_eq!(json["type"], "delay");
        assert_eq!(json["delayTime"], 0.25);
        let back: Effect = serde_json::from_value(json).unwrap();
        assert_eq!(back, effect);
        assert_eq!(back.name(), "Delay");
    }
}
