// Audio engine contract - Trigger commands, sinks and the voice registry
//
// The sequencer never touches audio directly. It emits TriggerCommands into a
// TriggerSink: a lock-free ring buffer towards the audio thread, the offline
// renderer during export, or a plain log in tests. On the receiving side the
// VoiceRegistry routes each command to the voice owning that sample.

use crate::audio::routing::db_to_linear;
use crate::messaging::channels::TriggerProducer;
use crate::sequencer::metronome::ClickType;
use crate::sequencer::pattern::ChannelId;
use ringbuf::traits::{Consumer, Producer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace, warn};

/// One instruction for the audio engine
///
/// Times are absolute clock seconds. `sample` is the sample identity used to
/// find the voice; `channel` selects the mixer gain.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerCommand {
    Attack {
        channel: ChannelId,
        sample: String,
        pitch: u8,
        velocity: f32,
        time: f64,
    },
    AttackRelease {
        channel: ChannelId,
        sample: String,
        pitch: u8,
        velocity: f32,
        duration: f64,
        time: f64,
    },
    /// Choke every sounding voice of one instrument
    ReleaseAll { sample: String, time: f64 },
    /// Play a trimmed region of an audio clip
    StartClip {
        clip_id: String,
        channel: ChannelId,
        sample: String,
        time: f64,
        /// Seconds into the source where playback begins
        offset: f64,
        duration: f64,
    },
    Click { kind: ClickType, time: f64 },
    SetGain { channel: ChannelId, gain_db: f32 },
    /// Drop every sample and clip playback starting at or after `time`
    CancelFrom { time: f64 },
    /// Stop: drop everything starting at or after `time`, release what is sounding
    ReleaseAllVoices { time: f64 },
}

impl TriggerCommand {
    /// Scheduled time, for commands that have one
    pub fn time(&self) -> Option<f64> {
        match self {
            TriggerCommand::Attack { time, .. }
            | TriggerCommand::AttackRelease { time, .. }
            | TriggerCommand::ReleaseAll { time, .. }
            | TriggerCommand::StartClip { time, .. }
            | TriggerCommand::Click { time, .. }
            | TriggerCommand::CancelFrom { time }
            | TriggerCommand::ReleaseAllVoices { time } => Some(*time),
            TriggerCommand::SetGain { .. } => None,
        }
    }
}

/// Destination of trigger commands
pub trait TriggerSink: Send {
    fn send(&mut self, command: TriggerCommand);
}

impl TriggerSink for Vec<TriggerCommand> {
    fn send(&mut self, command: TriggerCommand) {
        self.push(command);
    }
}

/// Shared, inspectable command log
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    commands: Arc<Mutex<Vec<TriggerCommand>>>,
}

impl CommandLog {
    /// Remove and return everything logged so far
    pub fn take(&self) -> Vec<TriggerCommand> {
        let mut commands = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *commands)
    }

    pub fn len(&self) -> usize {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TriggerSink for CommandLog {
    fn send(&mut self, command: TriggerCommand) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }
}

/// Sends commands to the audio thread through the lock-free trigger channel
pub struct RingSink {
    producer: TriggerProducer,
    dropped: u64,
}

impl RingSink {
    pub fn new(producer: TriggerProducer) -> Self {
        Self {
            producer,
            dropped: 0,
        }
    }

    /// Commands lost because the ring buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl TriggerSink for RingSink {
    fn send(&mut self, command: TriggerCommand) {
        if self.producer.try_push(command).is_err() {
            self.dropped += 1;
            if self.dropped.is_power_of_two() {
                warn!(dropped = self.dropped, "trigger channel full, commands dropped");
            }
        }
    }
}

/// A playable instrument or clip player owned by the engine
pub trait Voice: Send {
    fn trigger_attack(&mut self, pitch: u8, time: f64, velocity: f32);

    fn trigger_attack_release(&mut self, pitch: u8, duration: f64, time: f64, velocity: f32);

    fn release_all(&mut self, time: f64);

    /// Forget scheduled playbacks that start at or after `time`
    fn cancel_from(&mut self, time: f64);

    /// Play `duration` seconds of the source starting `offset` seconds in
    fn start_region(&mut self, time: f64, offset: f64, duration: f64, gain: f32);

    /// Release resources before the voice is dropped or replaced
    fn dispose(&mut self) {}
}

impl<V: Voice + ?Sized> Voice for Box<V> {
    fn trigger_attack(&mut self, pitch: u8, time: f64, velocity: f32) {
        (**self).trigger_attack(pitch, time, velocity);
    }

    fn trigger_attack_release(&mut self, pitch: u8, duration: f64, time: f64, velocity: f32) {
        (**self).trigger_attack_release(pitch, duration, time, velocity);
    }

    fn release_all(&mut self, time: f64) {
        (**self).release_all(time);
    }

    fn cancel_from(&mut self, time: f64) {
        (**self).cancel_from(time);
    }

    fn start_region(&mut self, time: f64, offset: f64, duration: f64, gain: f32) {
        (**self).start_region(time, offset, duration, gain);
    }

    fn dispose(&mut self) {
        (**self).dispose();
    }
}

/// Process-wide voices: one per unique sample, one per audio clip
///
/// Commands for samples or clips that are not loaded (yet) are dropped.
pub struct VoiceRegistry<V: Voice = Box<dyn Voice>> {
    voices: HashMap<String, V>,
    clips: HashMap<String, V>,
    click: Option<V>,
    channel_gains: HashMap<ChannelId, f32>,
    dropped: u64,
}

impl<V: Voice> VoiceRegistry<V> {
    pub fn new() -> Self {
        Self {
            voices: HashMap::new(),
            clips: HashMap::new(),
            click: None,
            channel_gains: HashMap::new(),
            dropped: 0,
        }
    }

    /// Install the voice for a sample, disposing the one it replaces
    pub fn load_sample(&mut self, key: impl Into<String>, voice: V) {
        let key = key.into();
        if let Some(mut old) = self.voices.insert(key.clone(), voice) {
            old.dispose();
            debug!(sample = %key, "sample voice replaced");
        }
    }

    pub fn unload_sample(&mut self, key: &str) -> bool {
        match self.voices.remove(key) {
            Some(mut voice) => {
                voice.dispose();
                true
            }
            None => false,
        }
    }

    /// Install the player for an audio clip, disposing the one it replaces
    pub fn load_clip(&mut self, clip_id: impl Into<String>, voice: V) {
        if let Some(mut old) = self.clips.insert(clip_id.into(), voice) {
            old.dispose();
        }
    }

    pub fn remove_clip(&mut self, clip_id: &str) -> bool {
        match self.clips.remove(clip_id) {
            Some(mut voice) => {
                voice.dispose();
                true
            }
            None => false,
        }
    }

    pub fn set_click_voice(&mut self, voice: V) {
        if let Some(mut old) = self.click.replace(voice) {
            old.dispose();
        }
    }

    pub fn has_sample(&self, key: &str) -> bool {
        self.voices.contains_key(key)
    }

    pub fn has_clip(&self, clip_id: &str) -> bool {
        self.clips.contains_key(clip_id)
    }

    pub fn sample_count(&self) -> usize {
        self.voices.len()
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    pub fn voices(&self) -> impl Iterator<Item = (&String, &V)> {
        self.voices.iter()
    }

    pub fn clips(&self) -> impl Iterator<Item = (&String, &V)> {
        self.clips.iter()
    }

    pub fn click_voice(&self) -> Option<&V> {
        self.click.as_ref()
    }

    /// Triggers dropped because their sample or clip was not loaded
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Dispose every voice and forget channel gains (project reload)
    pub fn clear(&mut self) {
        for (_, mut voice) in self.voices.drain().chain(self.clips.drain()) {
            voice.dispose();
        }
        if let Some(mut click) = self.click.take() {
            click.dispose();
        }
        self.channel_gains.clear();
    }

    fn linear_gain(&self, channel: &str) -> f32 {
        self.channel_gains
            .get(channel)
            .copied()
            .map_or(1.0, db_to_linear)
    }

    fn dropped_trigger(&mut self, target: &str) {
        self.dropped += 1;
        trace!(target, "trigger for unloaded voice dropped");
    }

    /// Route one command to its voice
    pub fn apply(&mut self, command: TriggerCommand) {
        match command {
            TriggerCommand::Attack {
                channel,
                sample,
                pitch,
                velocity,
                time,
            } => {
                let gain = self.linear_gain(&channel);
                match self.voices.get_mut(&sample) {
                    Some(voice) => voice.trigger_attack(pitch, time, velocity * gain),
                    None => self.dropped_trigger(&sample),
                }
            }
            TriggerCommand::AttackRelease {
                channel,
                sample,
                pitch,
                velocity,
                duration,
                time,
            } => {
                let gain = self.linear_gain(&channel);
                match self.voices.get_mut(&sample) {
                    Some(voice) => voice.trigger_attack_release(pitch, duration, time, velocity * gain),
                    None => self.dropped_trigger(&sample),
                }
            }
            TriggerCommand::ReleaseAll { sample, time } => {
                if let Some(voice) = self.voices.get_mut(&sample) {
                    voice.release_all(time);
                }
            }
            TriggerCommand::StartClip {
                clip_id,
                channel,
                time,
                offset,
                duration,
                ..
            } => {
                let gain = self.linear_gain(&channel);
                match self.clips.get_mut(&clip_id) {
                    Some(voice) => voice.start_region(time, offset, duration, gain),
                    None => self.dropped_trigger(&clip_id),
                }
            }
            TriggerCommand::Click { kind, time } => {
                if let Some(click) = &mut self.click {
                    click.trigger_attack(kind.pitch(), time, 1.0);
                }
            }
            TriggerCommand::SetGain { channel, gain_db } => {
                self.channel_gains.insert(channel, gain_db);
            }
            TriggerCommand::CancelFrom { time } => {
                for voice in self.voices.values_mut().chain(self.clips.values_mut()) {
                    voice.cancel_from(time);
                }
            }
            TriggerCommand::ReleaseAllVoices { time } => {
                let click = self.click.as_mut();
                for voice in self.voices.values_mut().chain(self.clips.values_mut()).chain(click) {
                    voice.cancel_from(time);
                    voice.release_all(time);
                }
            }
        }
    }

    /// Apply everything waiting in the trigger channel (audio thread side)
    pub fn drain<C: Consumer<Item = TriggerCommand>>(&mut self, consumer: &mut C) -> usize {
        let mut applied = 0;
        while let Some(command) = consumer.try_pop() {
            self.apply(command);
            applied += 1;
        }
        applied
    }
}

impl<V: Voice> Default for VoiceRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Voice> TriggerSink for VoiceRegistry<V> {
    fn send(&mut self, command: TriggerCommand) {
        self.apply(command);
    }
}
