// Transport - Play/stop/record state machine driving the event timeline
//
// The transport owns the only timeline. Audio-producing events are dispatched
// `lookahead_seconds` before they are due and carry their exact time; state
// changes (recording start, auto-stop) happen when the clock reaches them.
// Pattern and arrangement data are read from the shared stores on every tick.

use crate::audio::engine::{TriggerCommand, TriggerSink};
use crate::audio::routing::MixerGains;
use crate::sequencer::metronome::{ClickType, Metronome, count_in_clicks};
use crate::sequencer::midi_recorder::{MidiRecorder, Quantize};
use crate::sequencer::pattern::{ChannelId, Pattern, PatternId};
use crate::sequencer::player::{
    NoteSchedule, StepTiming, pattern_step_triggers, song_step_triggers,
};
use crate::sequencer::playlist::{Arrangement, SharedArrangement};
use crate::sequencer::scheduler::EventTimeline;
use crate::sequencer::timeline::{SONG_STEPS, STEPS_PER_BAR, StepClock, Swing, Tempo};
use crate::store::{PatternBank, SharedPatternStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use tracing::{debug, info, warn};

/// Default scheduling lookahead
pub const DEFAULT_LOOKAHEAD_SECONDS: f64 = 0.1;

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    /// Record requested; becomes CountingIn (or Recording) on the next tick
    Armed,
    CountingIn,
    Playing,
    Recording,
}

impl TransportState {
    /// Whether the step sequence is sounding
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Recording)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, TransportState::Recording)
    }

    /// Record armed but not yet capturing
    pub fn is_pending_record(&self) -> bool {
        matches!(self, TransportState::Armed | TransportState::CountingIn)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped)
    }

    fn to_u8(self) -> u8 {
        match self {
            TransportState::Stopped => 0,
            TransportState::Armed => 1,
            TransportState::CountingIn => 2,
            TransportState::Playing => 3,
            TransportState::Recording => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => TransportState::Armed,
            2 => TransportState::CountingIn,
            3 => TransportState::Playing,
            4 => TransportState::Recording,
            _ => TransportState::Stopped,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Stopped => "stopped",
            TransportState::Armed => "armed",
            TransportState::CountingIn => "counting in",
            TransportState::Playing => "playing",
            TransportState::Recording => "recording",
        };
        f.write_str(name)
    }
}

/// Which generator drives playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackMode {
    /// Loop the selected pattern
    #[default]
    Pattern,
    /// Play the arrangement, wrapping after the last addressable bar
    Song,
}

/// Outcome of a transport request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied(TransportState),
    Ignored(&'static str),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

/// Something the UI should hear about after a tick
#[derive(Debug, Clone, PartialEq)]
pub enum TransportNotice {
    StateChanged(TransportState),
    StepChanged(Option<usize>),
    RecordingSaved {
        channel_id: ChannelId,
        notes: usize,
        hits: usize,
    },
}

/// Transport state readable from other threads (UI, metering)
#[derive(Debug)]
pub struct SharedTransportState {
    state: AtomicU8,
    /// -1 when no step is current
    current_step: AtomicI64,
}

impl SharedTransportState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn current_step(&self) -> Option<usize> {
        usize::try_from(self.current_step.load(Ordering::Relaxed)).ok()
    }

    fn set_state(&self, state: TransportState) {
        self.state.store(state.to_u8(), Ordering::Relaxed);
    }

    fn set_current_step(&self, step: Option<usize>) {
        let value = step.map_or(-1, |s| s as i64);
        self.current_step.store(value, Ordering::Relaxed);
    }
}

impl Default for SharedTransportState {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(TransportState::Stopped.to_u8()),
            current_step: AtomicI64::new(-1),
        }
    }
}

/// Recording and scheduling options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSettings {
    pub count_in_bars: usize,
    pub quantize: Quantize,
    pub metronome_enabled: bool,
    pub lookahead_seconds: f64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            count_in_bars: 1,
            quantize: Quantize::Sixteenth,
            metronome_enabled: false,
            lookahead_seconds: DEFAULT_LOOKAHEAD_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TimelineEvent {
    /// Dispatch the triggers of one sequence step
    Step(u64),
    Click { kind: ClickType, time: f64 },
    BeginRecording,
    AutoStop,
}

/// Running step sequence
#[derive(Debug)]
struct Generator {
    clock: StepClock,
    /// First step not yet dispatched
    next_step: u64,
    /// Steps below this already sent their metronome click
    clicked_through: u64,
    /// Pattern the note schedule was built from
    source: Option<Arc<Pattern>>,
    notes: NoteSchedule,
}

#[derive(Debug)]
struct RecordingSession {
    pattern_id: PatternId,
    channel_id: ChannelId,
    length_steps: u64,
    recorder: MidiRecorder,
}

/// Transport controller
pub struct Transport {
    patterns: SharedPatternStore,
    arrangement: SharedArrangement,
    sink: Box<dyn TriggerSink>,
    shared_state: Arc<SharedTransportState>,

    settings: TransportSettings,
    metronome: Metronome,
    tempo: Tempo,
    swing: Swing,
    mode: PlaybackMode,
    current_pattern: Option<PatternId>,
    record_channel: Option<ChannelId>,

    state: TransportState,
    timeline: EventTimeline<TimelineEvent>,
    generator: Option<Generator>,
    recording: Option<RecordingSession>,
    now: f64,
    current_step: Option<usize>,
    /// A transition was applied and no tick has observed it yet
    awaiting_observation: bool,

    gains: MixerGains,
    routed_bank: Option<Arc<PatternBank>>,
    routed_arrangement: Option<Arc<Arrangement>>,

    scratch: Vec<TriggerCommand>,
    notices: Vec<TransportNotice>,
}

impl Transport {
    pub fn new(
        patterns: SharedPatternStore,
        arrangement: SharedArrangement,
        sink: Box<dyn TriggerSink>,
        settings: TransportSettings,
    ) -> Self {
        Self {
            patterns,
            arrangement,
            sink,
            shared_state: SharedTransportState::new(),
            metronome: Metronome::new(settings.metronome_enabled),
            settings,
            tempo: Tempo::default(),
            swing: Swing::default(),
            mode: PlaybackMode::default(),
            current_pattern: None,
            record_channel: None,
            state: TransportState::Stopped,
            timeline: EventTimeline::new(),
            generator: None,
            recording: None,
            now: 0.0,
            current_step: None,
            awaiting_observation: false,
            gains: MixerGains::default(),
            routed_bank: None,
            routed_arrangement: None,
            scratch: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn shared_state(&self) -> Arc<SharedTransportState> {
        Arc::clone(&self.shared_state)
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn swing(&self) -> Swing {
        self.swing
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn current_step(&self) -> Option<usize> {
        self.current_step
    }

    pub fn current_pattern(&self) -> Option<&str> {
        self.current_pattern.as_deref()
    }

    pub fn record_channel(&self) -> Option<&str> {
        self.record_channel.as_deref()
    }

    /// Clock time of the last tick
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Number of events waiting on the timeline
    pub fn pending_events(&self) -> usize {
        self.timeline.len()
    }

    /// Musical position (in steps) of the running sequence
    pub fn position_steps(&self) -> Option<f64> {
        self.generator
            .as_ref()
            .map(|g| g.clock.position_steps(self.now))
    }

    fn set_state(&mut self, state: TransportState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "transport state");
            self.state = state;
            self.shared_state.set_state(state);
            self.notices.push(TransportNotice::StateChanged(state));
        }
    }

    fn guard(&self) -> Option<Transition> {
        self.awaiting_observation
            .then_some(Transition::Ignored("previous transition not yet observed"))
    }

    fn applied(&mut self) -> Transition {
        self.awaiting_observation = true;
        Transition::Applied(self.state)
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Start playback from position 0, or stop whatever is running
    pub fn toggle_play(&mut self) -> Transition {
        if let Some(ignored) = self.guard() {
            return ignored;
        }
        if self.state.is_stopped() {
            self.start_playback(self.now);
            info!(mode = ?self.mode, bpm = self.tempo.bpm(), "playback started");
        } else {
            self.stop_at(self.now);
        }
        self.applied()
    }

    /// Arm recording on the selected channel, or cancel/stop a recording
    pub fn toggle_record(&mut self) -> Transition {
        if let Some(ignored) = self.guard() {
            return ignored;
        }
        match self.state {
            TransportState::Stopped => {}
            TransportState::Playing => return Transition::Ignored("stop playback before recording"),
            _ => {
                self.stop_at(self.now);
                return self.applied();
            }
        }
        if self.mode != PlaybackMode::Pattern {
            return Transition::Ignored("recording requires pattern mode");
        }
        let Some(channel_id) = self.record_channel.clone() else {
            return Transition::Ignored("no channel selected");
        };
        let bank = self.patterns.read();
        let Some(pattern) = self.resolve_current_pattern(&bank) else {
            return Transition::Ignored("no pattern to record into");
        };
        if pattern.channel(&channel_id).is_none() {
            return Transition::Ignored("selected channel is not in the current pattern");
        }
        let pattern_id = pattern.id.clone();
        let length_steps = pattern.length_steps() as u64;
        let pattern_seconds = pattern.duration_seconds(&self.tempo);

        // Destructive: a take always replaces the channel content
        self.patterns
            .edit(|store| store.clear_channel(&pattern_id, &channel_id));

        let now = self.now;
        let lookahead = self.settings.lookahead_seconds;
        let count_in_seconds = self
            .tempo
            .bars_to_seconds(self.settings.count_in_bars as f64);
        let recording_start = now + count_in_seconds;

        for (time, kind) in count_in_clicks(now, self.settings.count_in_bars, &self.tempo) {
            self.timeline
                .schedule(time - lookahead, TimelineEvent::Click { kind, time });
        }
        self.timeline
            .schedule(recording_start, TimelineEvent::BeginRecording);
        self.timeline
            .schedule(recording_start + pattern_seconds, TimelineEvent::AutoStop);

        self.current_pattern = Some(pattern_id.clone());
        self.recording = Some(RecordingSession {
            pattern_id: pattern_id.clone(),
            channel_id: channel_id.clone(),
            length_steps,
            recorder: MidiRecorder::new(recording_start, &self.tempo, length_steps as usize),
        });
        self.start_generator(recording_start, 0);
        self.set_state(TransportState::Armed);
        info!(
            pattern = %pattern_id,
            channel = %channel_id,
            count_in_bars = self.settings.count_in_bars,
            "recording armed"
        );
        self.applied()
    }

    /// Stop regardless of state (no-op when already stopped)
    pub fn stop(&mut self) -> Transition {
        if let Some(ignored) = self.guard() {
            return ignored;
        }
        if self.state.is_stopped() {
            return Transition::Ignored("already stopped");
        }
        self.stop_at(self.now);
        self.applied()
    }

    /// Stop now, bypassing the re-entrancy guard
    ///
    /// For callers that replace what the transport plays (project load) and
    /// cannot wait for the next tick.
    pub fn force_stop(&mut self) {
        if !self.state.is_stopped() {
            self.stop_at(self.now);
        }
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        if self.mode == mode {
            return;
        }
        if self.recording.is_some() {
            warn!("playback mode change ignored while recording");
            return;
        }
        self.mode = mode;
        self.rebuild("mode change");
    }

    pub fn select_pattern(&mut self, pattern_id: impl Into<PatternId>) {
        let pattern_id = pattern_id.into();
        if self.current_pattern.as_deref() == Some(pattern_id.as_str()) || self.recording.is_some() {
            return;
        }
        self.current_pattern = Some(pattern_id);
        if self.mode == PlaybackMode::Pattern {
            self.rebuild("pattern change");
        }
    }

    pub fn select_channel(&mut self, channel_id: Option<ChannelId>) {
        self.record_channel = channel_id;
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        let tempo = Tempo::new(bpm);
        if tempo == self.tempo {
            return;
        }
        self.tempo = tempo;
        if let Some(generator) = &mut self.generator {
            generator.clock = generator.clock.retimed(tempo, self.now);
            self.rebuild("tempo change");
        }
    }

    pub fn set_swing(&mut self, amount: f64) {
        let swing = Swing::new(amount);
        if swing == self.swing {
            return;
        }
        self.swing = swing;
        if let Some(generator) = &mut self.generator {
            generator.clock.swing = swing;
            self.rebuild("swing change");
        }
    }

    pub fn set_count_in_bars(&mut self, bars: usize) {
        self.settings.count_in_bars = bars;
    }

    pub fn set_quantize(&mut self, quantize: Quantize) {
        self.settings.quantize = quantize;
    }

    pub fn set_metronome_enabled(&mut self, enabled: bool) {
        self.settings.metronome_enabled = enabled;
        self.metronome.set_enabled(enabled);
    }

    // ------------------------------------------------------------------
    // Live input
    // ------------------------------------------------------------------

    pub fn note_on(&mut self, pitch: u8, velocity: f32, now: f64) {
        if self.state.is_recording() {
            if let Some(session) = &mut self.recording {
                session.recorder.note_on(pitch, velocity, now);
            }
        }
    }

    pub fn note_off(&mut self, pitch: u8, now: f64) {
        if self.state.is_recording() {
            if let Some(session) = &mut self.recording {
                session.recorder.note_off(pitch, now);
            }
        }
    }

    /// Pad hit on a step-driven channel
    pub fn record_hit(&mut self, now: f64) {
        if self.state.is_recording() {
            if let Some(session) = &mut self.recording {
                session.recorder.record_hit(now);
            }
        }
    }

    // ------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------

    /// Advance the clock to `now`, firing everything due, and return what changed
    pub fn advance(&mut self, now: f64) -> Vec<TransportNotice> {
        self.now = self.now.max(now);
        self.awaiting_observation = false;

        if self.state == TransportState::Armed && self.settings.count_in_bars > 0 {
            self.set_state(TransportState::CountingIn);
        }

        self.refresh_gains();
        self.check_pattern_changed();

        while let Some((fire_at, event)) = self.timeline.pop_due(self.now) {
            match event {
                TimelineEvent::Step(index) => self.dispatch_step(index),
                TimelineEvent::Click { kind, time } => {
                    self.sink.send(TriggerCommand::Click { kind, time });
                }
                TimelineEvent::BeginRecording => {
                    self.set_state(TransportState::Recording);
                    info!("recording started");
                }
                TimelineEvent::AutoStop => {
                    debug!(time = fire_at, "recording reached pattern end");
                    self.stop_at(fire_at);
                }
            }
        }

        self.update_current_step();
        std::mem::take(&mut self.notices)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn resolve_current_pattern(&mut self, bank: &PatternBank) -> Option<Arc<Pattern>> {
        let found = self
            .current_pattern
            .as_deref()
            .and_then(|id| bank.get(id))
            .or_else(|| bank.first())
            .cloned()?;
        self.current_pattern = Some(found.id.clone());
        Some(found)
    }

    fn start_playback(&mut self, origin: f64) {
        self.start_generator(origin, 0);
        self.set_state(TransportState::Playing);
    }

    fn start_generator(&mut self, origin: f64, first_step: u64) {
        self.timeline
            .cancel_where(|e| matches!(e, TimelineEvent::Step(_)));
        let clock = StepClock::new(self.tempo, self.swing, origin);
        self.generator = Some(Generator {
            clock,
            next_step: first_step,
            clicked_through: first_step,
            source: None,
            notes: NoteSchedule::default(),
        });
        self.refresh_note_schedule();
        self.schedule_step(first_step);
    }

    fn schedule_step(&mut self, index: u64) {
        let Some(generator) = &self.generator else {
            return;
        };
        let fire_at = generator.clock.step_time(index) - self.settings.lookahead_seconds;
        self.timeline.schedule(fire_at, TimelineEvent::Step(index));
    }

    /// Replace pending step events with a fresh generator at the current position
    ///
    /// Steps already sent ahead that have not sounded yet are cancelled in the
    /// engine and dispatched again from the new source.
    fn rebuild(&mut self, reason: &'static str) {
        let now = self.now;
        let Some(generator) = &mut self.generator else {
            return;
        };
        let dispatched = generator.next_step;
        while generator.next_step > 0 && generator.clock.step_time(generator.next_step - 1) >= now {
            generator.next_step -= 1;
        }
        let next_step = generator.next_step;
        let cancelled = self
            .timeline
            .cancel_where(|e| matches!(e, TimelineEvent::Step(_)));
        self.sink.send(TriggerCommand::CancelFrom { time: now });
        self.refresh_note_schedule();
        self.schedule_step(next_step);
        debug!(
            reason,
            next_step,
            rewound = dispatched - next_step,
            cancelled,
            "sequence rebuilt"
        );
    }

    /// Rebuild the note schedule from the current pattern snapshot
    fn refresh_note_schedule(&mut self) {
        let bank = self.patterns.read();
        let pattern = if self.mode == PlaybackMode::Pattern {
            self.resolve_current_pattern(&bank)
        } else {
            None
        };
        if let Some(generator) = &mut self.generator {
            generator.notes = pattern
                .as_deref()
                .map(NoteSchedule::build)
                .unwrap_or_default();
            generator.source = pattern;
        }
    }

    /// Rebuild when the pattern being looped was edited since the last tick
    fn check_pattern_changed(&mut self) {
        if self.mode != PlaybackMode::Pattern {
            return;
        }
        let Some(generator) = &self.generator else {
            return;
        };
        let bank = self.patterns.read();
        let current = self.current_pattern.as_deref().and_then(|id| bank.get(id));
        let unchanged = match (&generator.source, current) {
            (Some(built), Some(latest)) => Arc::ptr_eq(built, latest),
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            self.rebuild("pattern edited");
        }
    }

    fn dispatch_step(&mut self, index: u64) {
        let Some(generator) = &mut self.generator else {
            return;
        };
        if let Some(session) = &self.recording {
            // A take covers exactly one pass through the pattern
            if index >= session.length_steps {
                return;
            }
        }
        let timing = StepTiming::at(&generator.clock, index);
        generator.next_step = index + 1;
        // A rewound step keeps the click it already sent
        let click_due = index >= generator.clicked_through;
        generator.clicked_through = generator.clicked_through.max(index + 1);

        let mut out = std::mem::take(&mut self.scratch);
        out.clear();
        match self.mode {
            PlaybackMode::Pattern => {
                if let Some(pattern) = &generator.source {
                    let local = (index % pattern.length_steps() as u64) as usize;
                    pattern_step_triggers(pattern, local, &timing, &mut out);
                    generator.notes.triggers(local, &timing, &mut out);
                }
            }
            PlaybackMode::Song => {
                let bank = self.patterns.read();
                let arrangement = self.arrangement.load();
                let song_step = (index % SONG_STEPS as u64) as usize;
                song_step_triggers(bank.as_ref(), &arrangement, song_step, &timing, &mut out);
            }
        }
        if click_due && (self.state.is_playing() || self.state.is_pending_record()) {
            if let Some(kind) = self.metronome.click_for_step(index) {
                out.push(TriggerCommand::Click {
                    kind,
                    time: timing.straight_time,
                });
            }
        }
        for command in out.drain(..) {
            self.sink.send(command);
        }
        self.scratch = out;
        self.schedule_step(index + 1);
    }

    /// Stop everything: cancel the timeline, save a take, silence all voices
    fn stop_at(&mut self, time: f64) {
        let cancelled = self.timeline.cancel_all();
        if let Some(session) = self.recording.take() {
            if self.state.is_recording() {
                self.save_take(session, time);
            } else {
                debug!("recording cancelled during count-in");
            }
        }
        self.generator = None;
        self.sink.send(TriggerCommand::ReleaseAllVoices { time });
        self.set_state(TransportState::Stopped);
        if self.current_step.take().is_some() {
            self.notices.push(TransportNotice::StepChanged(None));
        }
        self.shared_state.set_current_step(None);
        info!(cancelled, "transport stopped");
    }

    fn save_take(&mut self, session: RecordingSession, stop_time: f64) {
        let take = session.recorder.finalize(stop_time, self.settings.quantize);
        let (notes, hits) = (take.notes.len(), take.hits.len());
        if take.is_empty() {
            debug!(channel = %session.channel_id, "recording captured nothing");
            return;
        }
        let saved = self.patterns.edit(|store| {
            store.apply_take(&session.pattern_id, &session.channel_id, take.notes, &take.hits)
        });
        if saved {
            info!(channel = %session.channel_id, notes, hits, "recording saved");
            self.notices.push(TransportNotice::RecordingSaved {
                channel_id: session.channel_id,
                notes,
                hits,
            });
        } else {
            warn!(channel = %session.channel_id, "recording target no longer exists");
        }
    }

    fn update_current_step(&mut self) {
        let step = match &self.generator {
            Some(generator) if self.state.is_playing() => {
                let position = generator.clock.position_steps(self.now);
                let loop_length = match (self.mode, &generator.source) {
                    (PlaybackMode::Pattern, Some(pattern)) => pattern.length_steps(),
                    (PlaybackMode::Pattern, None) => STEPS_PER_BAR,
                    (PlaybackMode::Song, _) => SONG_STEPS,
                };
                (position >= 0.0).then(|| position.floor() as usize % loop_length)
            }
            _ => None,
        };
        if step != self.current_step {
            self.current_step = step;
            self.shared_state.set_current_step(step);
            self.notices.push(TransportNotice::StepChanged(step));
        }
    }

    /// Re-evaluate mute/solo whenever pattern or clip channels changed
    fn refresh_gains(&mut self) {
        let bank = self.patterns.read();
        let arrangement = self.arrangement.load();
        let same_bank = self
            .routed_bank
            .as_ref()
            .is_some_and(|b| Arc::ptr_eq(b, &bank));
        let same_arrangement = self
            .routed_arrangement
            .as_ref()
            .is_some_and(|a| Arc::ptr_eq(a, &arrangement));
        if same_bank && same_arrangement {
            return;
        }
        let channels = bank
            .iter()
            .flat_map(|p| p.channels.iter())
            .chain(arrangement.clip_channels.iter());
        for (channel, gain_db) in self.gains.update(channels) {
            self.sink.send(TriggerCommand::SetGain { channel, gain_db });
        }
        self.routed_bank = Some(bank);
        self.routed_arrangement = Some(arrangement);
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("tempo", &self.tempo)
            .field("current_pattern", &self.current_pattern)
            .field("current_step", &self.current_step)
            .field("pending_events", &self.timeline.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::engine::{CommandLog, VoiceRegistry};
    use crate::sampler::Sample;
    use crate::sampler::voice::SamplerVoice;
    use crate::sequencer::pattern::ChannelPatch;
    use crate::sequencer::step::Step;

    struct Rig {
        transport: Transport,
        store: SharedPatternStore,
        log: CommandLog,
        pattern: PatternId,
        kick: ChannelId,
    }

    fn rig(settings: TransportSettings) -> Rig {
        let store = SharedPatternStore::default();
        let pattern = store.edit(|s| s.create_pattern("Pattern 1", None));
        let kick = store.read().get(&pattern).unwrap().channels[0].id.clone();
        let log = CommandLog::default();
        let mut transport = Transport::new(
            store.clone(),
            SharedArrangement::default(),
            Box::new(log.clone()),
            settings,
        );
        transport.select_pattern(pattern.clone());
        Rig {
            transport,
            store,
            log,
            pattern,
            kick,
        }
    }

    fn attacks(log: &CommandLog) -> Vec<f64> {
        log.take()
            .into_iter()
            .filter_map(|c| match c {
                TriggerCommand::AttackRelease { time, .. } => Some(time),
                _ => None,
            })
            .collect()
    }

    /// Feed everything logged so far into a sampler voice, return playback starts
    fn sounded(rig: &Rig) -> Vec<f64> {
        let key = rig.store.read().get(&rig.pattern).unwrap().channel(&rig.kick).unwrap().sample.key().to_string();
        let mut registry = VoiceRegistry::new();
        registry.load_sample(key, SamplerVoice::new(Arc::new(Sample::new("kick", 1000, 1, vec![0.5; 100]))));
        for command in rig.log.take() {
            registry.apply(command);
        }
        registry
            .voices()
            .flat_map(|(_, voice)| voice.playbacks().iter().map(|p| p.start))
            .collect()
    }

    #[test]
    fn test_play_dispatches_steps_with_lookahead() {
        let mut rig = rig(TransportSettings::default());
        for i in [0, 4, 8] {
            rig.store.edit(|s| s.toggle_step(&rig.pattern, &rig.kick, i));
        }
        rig.transport.advance(10.0);
        assert_eq!(rig.transport.toggle_play(), Transition::Applied(TransportState::Playing));
        rig.log.take();

        // 120 BPM: steps every 0.125 s; step 4 is due at 10.5 and dispatched 0.1 s early
        rig.transport.advance(10.39);
        assert_eq!(attacks(&rig.log), vec![10.0]);
        rig.transport.advance(10.41);
        assert_eq!(attacks(&rig.log), vec![10.5]);
        assert_eq!(rig.transport.current_step(), Some(3));
    }

    #[test]
    fn test_reentrant_requests_ignored_until_observed() {
        let mut rig = rig(TransportSettings::default());
        assert!(rig.transport.toggle_play().is_applied());
        assert!(matches!(rig.transport.toggle_play(), Transition::Ignored(_)));
        rig.transport.advance(0.0);
        assert_eq!(rig.transport.toggle_play(), Transition::Applied(TransportState::Stopped));
    }

    #[test]
    fn test_stop_cancels_everything() {
        let mut rig = rig(TransportSettings::default());
        rig.transport.toggle_play();
        rig.transport.advance(0.5);
        assert!(rig.transport.pending_events() > 0);
        rig.transport.toggle_play();
        assert_eq!(rig.transport.pending_events(), 0);
        assert_eq!(rig.transport.current_step(), None);
        assert!(matches!(
            rig.log.take().last(),
            Some(TriggerCommand::ReleaseAllVoices { .. })
        ));
        rig.transport.advance(5.0);
        assert!(attacks(&rig.log).is_empty());
    }

    #[test]
    fn test_stop_cancels_hits_sent_ahead() {
        let mut rig = rig(TransportSettings::default());
        rig.store.edit(|s| s.toggle_step(&rig.pattern, &rig.kick, 1));
        rig.transport.toggle_play();
        // Step 1 (0.125 s) is already in the engine at 0.03
        rig.transport.advance(0.03);
        assert_eq!(rig.transport.toggle_play(), Transition::Applied(TransportState::Stopped));
        assert!(sounded(&rig).is_empty());
    }

    #[test]
    fn test_edit_cancels_steps_sent_ahead() {
        let mut rig = rig(TransportSettings::default());
        rig.store.edit(|s| s.toggle_step(&rig.pattern, &rig.kick, 0));
        rig.store.edit(|s| s.toggle_step(&rig.pattern, &rig.kick, 4));
        rig.transport.toggle_play();
        // Step 4 (0.5 s) is dispatched at 0.4
        rig.transport.advance(0.41);

        rig.store.edit(|s| s.toggle_step(&rig.pattern, &rig.kick, 4));
        rig.store.edit(|s| s.toggle_step(&rig.pattern, &rig.kick, 5));
        rig.transport.advance(0.45);
        assert_eq!(sounded(&rig), vec![0.0]);

        rig.transport.advance(0.55);
        assert_eq!(sounded(&rig), vec![0.625]);
    }

    #[test]
    fn test_force_stop_ignores_guard() {
        let mut rig = rig(TransportSettings::default());
        assert!(rig.transport.toggle_play().is_applied());
        assert!(matches!(rig.transport.stop(), Transition::Ignored(_)));
        rig.transport.force_stop();
        assert_eq!(rig.transport.state(), TransportState::Stopped);
        assert_eq!(rig.transport.pending_events(), 0);
        rig.transport.force_stop();
        assert_eq!(rig.transport.state(), TransportState::Stopped);
    }

    #[test]
    fn test_edit_while_playing_rebuilds_from_current_position() {
        let mut rig = rig(TransportSettings::default());
        rig.transport.toggle_play();
        rig.transport.advance(0.3);
        rig.log.take();

        rig.store.edit(|s| s.toggle_step(&rig.pattern, &rig.kick, 5));
        rig.store.edit(|s| s.toggle_step(&rig.pattern, &rig.kick, 1));
        rig.transport.advance(0.6);
        // Step 1 already passed; step 5 plays at its slot in this loop
        assert_eq!(attacks(&rig.log), vec![0.625]);
    }

    #[test]
    fn test_record_with_count_in_and_auto_stop() {
        let settings = TransportSettings {
            count_in_bars: 1,
            quantize: Quantize::Sixteenth,
            ..TransportSettings::default()
        };
        let mut rig = rig(settings);
        rig.store.edit(|s| s.toggle_step(&rig.pattern, &rig.kick, 7));
        rig.transport.select_channel(Some(rig.kick.clone()));
        assert_eq!(rig.transport.toggle_record(), Transition::Applied(TransportState::Armed));

        // Record clears the channel immediately
        let kick_steps = rig.store.read().get(&rig.pattern).unwrap().channel(&rig.kick).unwrap().steps.clone();
        assert!(kick_steps.iter().all(|s| !s.is_active()));

        let notices = rig.transport.advance(0.0);
        assert!(notices.contains(&TransportNotice::StateChanged(TransportState::CountingIn)));
        let clicks = rig
            .log
            .take()
            .into_iter()
            .filter(|c| matches!(c, TriggerCommand::Click { .. }))
            .count();
        assert_eq!(clicks, 1);

        // One bar at 120 BPM = 2 s of count-in
        rig.transport.advance(2.0);
        assert_eq!(rig.transport.state(), TransportState::Recording);
        rig.transport.note_on(64, 0.9, 2.26);
        rig.transport.note_off(64, 2.5);
        rig.transport.note_on(67, 0.7, 3.0);

        let notices = rig.transport.advance(4.0);
        assert_eq!(rig.transport.state(), TransportState::Stopped);
        assert!(notices.iter().any(|n| matches!(n, TransportNotice::RecordingSaved { notes: 2, .. })));

        let bank = rig.store.read();
        let notes = &bank.get(&rig.pattern).unwrap().channel(&rig.kick).unwrap().notes;
        assert_eq!(notes.len(), 2);
        assert_eq!((notes[0].pitch, notes[0].start, notes[0].duration), (64, 2.0, 2.0));
        // Open note closed at the auto-stop (step 16)
        assert_eq!((notes[1].pitch, notes[1].start, notes[1].duration), (67, 8.0, 8.0));
    }

    #[test]
    fn test_record_cancel_during_count_in() {
        let mut rig = rig(TransportSettings::default());
        rig.transport.select_channel(Some(rig.kick.clone()));
        rig.transport.toggle_record();
        rig.transport.advance(0.5);
        assert_eq!(rig.transport.state(), TransportState::CountingIn);
        assert_eq!(rig.transport.toggle_record(), Transition::Applied(TransportState::Stopped));
        assert_eq!(rig.transport.pending_events(), 0);
        rig.transport.advance(10.0);
        assert_eq!(rig.transport.state(), TransportState::Stopped);
    }

    #[test]
    fn test_record_requires_channel() {
        let mut rig = rig(TransportSettings::default());
        assert!(matches!(rig.transport.toggle_record(), Transition::Ignored(_)));
        rig.transport.select_channel(Some("missing".to_string()));
        assert!(matches!(rig.transport.toggle_record(), Transition::Ignored(_)));
        assert_eq!(rig.transport.state(), TransportState::Stopped);
    }

    #[test]
    fn test_record_without_count_in_hits() {
        let settings = TransportSettings {
            count_in_bars: 0,
            ..TransportSettings::default()
        };
        let mut rig = rig(settings);
        rig.transport.select_channel(Some(rig.kick.clone()));
        rig.transport.toggle_record();
        rig.transport.advance(0.0);
        assert_eq!(rig.transport.state(), TransportState::Recording);
        rig.transport.record_hit(0.26);
        rig.transport.record_hit(1.0);
        rig.transport.advance(2.5);
        assert_eq!(rig.transport.state(), TransportState::Stopped);
        let bank = rig.store.read();
        let channel = bank.get(&rig.pattern).unwrap().channel(&rig.kick).unwrap();
        assert_eq!(channel.steps[2], Step::HIT);
        assert_eq!(channel.steps[8], Step::HIT);
        assert!(channel.notes.is_empty());
    }

    #[test]
    fn test_mute_sends_negative_infinity_gain() {
        let mut rig = rig(TransportSettings::default());
        rig.transport.advance(0.0);
        rig.log.take();
        rig.store.edit(|s| s.update_channel(&rig.pattern, &rig.kick, ChannelPatch::muted(true)));
        rig.transport.advance(0.1);
        let gains: Vec<(String, f32)> = rig
            .log
            .take()
            .into_iter()
            .filter_map(|c| match c {
                TriggerCommand::SetGain { channel, gain_db } => Some((channel, gain_db)),
                _ => None,
            })
            .collect();
        assert_eq!(gains, vec![(rig.kick.clone(), f32::NEG_INFINITY)]);
    }

    #[test]
    fn test_song_mode_wraps() {
        let mut rig = rig(TransportSettings::default());
        rig.transport.set_mode(PlaybackMode::Song);
        rig.transport.toggle_play();
        // 72 bars at 120 BPM = 144 s
        rig.transport.advance(144.0 + 0.2);
        assert_eq!(rig.transport.current_step(), Some(1));
    }
}
