// Session - Application controller
//
// Owns the editable state (pattern store, arrangement, user samples) and the
// transport, applies UI intents in order, and reports back over the
// notification channel. Sample decoding and export run on worker threads and
// are collected on `tick`.

use crate::audio::engine::TriggerSink;
use crate::audio::export::{self, ExportError, ExportFormat, ExportSettings, ExportSource, ExportTarget};
use crate::config::SessionConfig;
use crate::messaging::channels::{NotificationProducer, notify};
use crate::messaging::intent::Intent;
use crate::messaging::notification::{Alert, AlertCategory, Notification};
use crate::project::{ProjectError, ProjectLoadOptions, ProjectManager, ProjectState};
use crate::sampler::library::SampleNode;
use crate::sampler::loader::{LoadResult, SampleCache, SampleLoader};
use crate::sampler::sample::Sample;
use crate::sequencer::pattern::{Pattern, PatternId, SampleRef};
use crate::sequencer::playlist::{Arrangement, SharedArrangement};
use crate::sequencer::timeline::{Swing, Tempo};
use crate::sequencer::transport::{Transition, Transport};
use crate::store::{PatternBank, PatternStore, SharedPatternStore};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Minimum progress change worth a notification
const PROGRESS_STEP: f32 = 0.01;

/// Clears the export flag when the job ends, however it ends
struct ExportGuard(Arc<AtomicBool>);

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Session {
    config: SessionConfig,
    patterns: SharedPatternStore,
    arrangement: SharedArrangement,
    transport: Transport,
    user_samples: Vec<SampleNode>,
    projects: ProjectManager,

    loader: SampleLoader,
    samples: SampleCache,
    failed_samples: HashSet<String>,
    /// Loaded since the host last asked
    fresh_samples: Vec<(String, Arc<Sample>)>,

    notifications: NotificationProducer,
    dropped_notifications: u64,

    exporting: Arc<AtomicBool>,
    export_events: Receiver<Notification>,
    export_sender: Sender<Notification>,
    export_job: Option<JoinHandle<()>>,
}

impl Session {
    /// Start a session with one default-kit pattern
    pub fn new(
        config: SessionConfig,
        sink: Box<dyn TriggerSink>,
        notifications: NotificationProducer,
    ) -> Self {
        let bank = PatternBank::new(vec![Pattern::with_default_kit("p1".to_string(), "Pattern 1")]);
        let patterns = SharedPatternStore::new(PatternStore::with_history_limit(bank, config.history_limit));
        let arrangement = SharedArrangement::default();

        let mut transport = Transport::new(
            patterns.clone(),
            arrangement.clone(),
            sink,
            config.transport_settings(),
        );
        transport.set_bpm(config.default_bpm);
        transport.set_swing(config.default_swing);
        transport.select_pattern("p1");

        let (export_sender, export_events) = unbounded();
        let mut session = Self {
            loader: SampleLoader::new(config.loader_threads, config.sample_root.clone()),
            projects: ProjectManager::new(config.sample_root.clone()),
            config,
            patterns,
            arrangement,
            transport,
            user_samples: Vec::new(),
            samples: SampleCache::new(),
            failed_samples: HashSet::new(),
            fresh_samples: Vec::new(),
            notifications,
            dropped_notifications: 0,
            exporting: Arc::new(AtomicBool::new(false)),
            export_events,
            export_sender,
            export_job: None,
        };
        session.request_samples();
        session
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn patterns(&self) -> &SharedPatternStore {
        &self.patterns
    }

    pub fn arrangement(&self) -> &SharedArrangement {
        &self.arrangement
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn user_samples(&self) -> &[SampleNode] {
        &self.user_samples
    }

    /// Pattern ids in bank order
    pub fn pattern_ids(&self) -> Vec<PatternId> {
        self.patterns.read().iter().map(|p| p.id.clone()).collect()
    }

    pub fn samples(&self) -> &SampleCache {
        &self.samples
    }

    pub fn is_exporting(&self) -> bool {
        self.exporting.load(Ordering::Acquire)
    }

    /// Notifications lost because the UI queue was full
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications
    }

    fn push(&mut self, notification: Notification) {
        if !notify(&mut self.notifications, notification) {
            self.dropped_notifications += 1;
        }
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    /// Apply one UI intent; returns whether anything changed
    ///
    /// Intents naming missing patterns, channels or placements are ignored.
    pub fn apply(&mut self, intent: Intent) -> bool {
        if intent.is_transport() && self.is_exporting() {
            debug!(?intent, "transport intent ignored during export");
            return false;
        }
        let now = self.transport.now();
        match intent {
            Intent::TogglePlay => self.transition(|t| t.toggle_play()),
            Intent::ToggleRecord => self.transition(|t| t.toggle_record()),
            Intent::Stop => self.transition(|t| t.stop()),
            Intent::SetMode(mode) => {
                self.transport.set_mode(mode);
                self.transport.mode() == mode
            }
            Intent::SelectPattern(pattern_id) => {
                if self.patterns.read().get(&pattern_id).is_none() {
                    return false;
                }
                self.transport.select_pattern(pattern_id);
                true
            }
            Intent::SelectChannel(channel_id) => {
                self.transport.select_channel(channel_id);
                true
            }
            Intent::SetBpm(bpm) => {
                self.transport.set_bpm(bpm);
                true
            }
            Intent::SetSwing(amount) => {
                self.transport.set_swing(amount);
                true
            }
            Intent::SetCountInBars(bars) => {
                self.transport.set_count_in_bars(bars);
                true
            }
            Intent::SetQuantize(quantize) => {
                self.transport.set_quantize(quantize);
                true
            }
            Intent::SetMetronome(enabled) => {
                self.transport.set_metronome_enabled(enabled);
                true
            }

            Intent::NoteOn { pitch, velocity, at } => {
                self.transport.note_on(pitch, velocity, at.unwrap_or(now));
                true
            }
            Intent::NoteOff { pitch, at } => {
                self.transport.note_off(pitch, at.unwrap_or(now));
                true
            }
            Intent::RecordHit { at } => {
                self.transport.record_hit(at.unwrap_or(now));
                true
            }

            Intent::CreatePattern { name, clone_from } => {
                let id = self
                    .patterns
                    .edit(|store| store.create_pattern(name, clone_from.as_deref()));
                self.transport.select_pattern(id);
                self.request_samples();
                true
            }
            Intent::DeletePattern(pattern_id) => self.delete_pattern(&pattern_id),
            Intent::RenamePattern { pattern_id, name } => self
                .patterns
                .edit(|store| store.rename_pattern(&pattern_id, name)),
            Intent::SetPatternLength { pattern_id, length } => self
                .patterns
                .edit(|store| store.set_pattern_length(&pattern_id, length)),
            Intent::UpdateChannel {
                pattern_id,
                channel_id,
                patch,
            } => {
                let sample_changed = patch.sample.is_some();
                let changed = self
                    .patterns
                    .edit(|store| store.update_channel(&pattern_id, &channel_id, patch));
                if changed && sample_changed {
                    self.request_samples();
                }
                changed
            }
            Intent::ToggleStep {
                pattern_id,
                channel_id,
                step,
            } => self
                .patterns
                .edit(|store| store.toggle_step(&pattern_id, &channel_id, step)),
            Intent::SubdivideReset {
                pattern_id,
                channel_id,
                step,
            } => self
                .patterns
                .edit(|store| store.subdivide_reset(&pattern_id, &channel_id, step)),
            Intent::SetChannelNotes { channel_id, notes } => self
                .patterns
                .edit(|store| store.set_channel_notes(&channel_id, notes)),
            Intent::OpenPianoRoll {
                pattern_id,
                channel_id,
            } => self
                .patterns
                .edit(|store| store.open_piano_roll(&pattern_id, &channel_id)),
            Intent::ClearPattern(pattern_id) => self
                .patterns
                .edit(|store| store.clear_pattern(&pattern_id)),
            Intent::Undo => {
                let changed = self.patterns.undo();
                if changed {
                    self.request_samples();
                }
                changed
            }
            Intent::Redo => {
                let changed = self.patterns.redo();
                if changed {
                    self.request_samples();
                }
                changed
            }

            Intent::PlacePattern {
                track,
                bar,
                pattern_id,
            } => {
                let bank = self.patterns.read();
                self.arrangement
                    .update(|a| a.playlist.place(bank.as_ref(), track, bar, &pattern_id))
            }
            Intent::RemovePlacement { track, bar } => self
                .arrangement
                .update(|a| a.playlist.remove_at(track, bar).is_some()),
            Intent::RemoveAudioClip(clip_id) => self
                .arrangement
                .update(|a| a.remove_audio_clip(&clip_id).is_some()),
        }
    }

    fn transition(&mut self, request: impl FnOnce(&mut Transport) -> Transition) -> bool {
        match request(&mut self.transport) {
            Transition::Applied(_) => true,
            Transition::Ignored(reason) => {
                debug!(reason, "transport request ignored");
                false
            }
        }
    }

    /// Delete a pattern together with its playlist placements
    fn delete_pattern(&mut self, pattern_id: &str) -> bool {
        if !self.patterns.edit(|store| store.delete_pattern(pattern_id)) {
            return false;
        }
        let removed = self
            .arrangement
            .update(|a| a.playlist.remove_pattern(pattern_id));
        debug!(pattern = %pattern_id, placements = removed, "pattern deleted");
        true
    }

    /// Place an audio clip on the song timeline; returns the clip id
    pub fn add_audio_clip(&mut self, sample: SampleRef, track: usize, start_bar: f64, duration_bars: f64) -> String {
        self.request_sample(&sample);
        self.arrangement
            .update(|a| a.add_audio_clip(sample, track, start_bar, duration_bars))
    }

    /// Trim a clip; values are clamped to the clip's length
    pub fn trim_audio_clip(&mut self, clip_id: &str, trim_start_bars: f64, trim_duration_bars: f64) -> bool {
        self.arrangement.update(|a| match a.audio_clip_mut(clip_id) {
            Some(clip) => {
                clip.set_trim(trim_start_bars, trim_duration_bars);
                true
            }
            None => false,
        })
    }

    /// Add a file or folder to the root of the user sample tree
    pub fn add_user_sample(&mut self, node: SampleNode) {
        self.user_samples.push(node);
    }

    // ------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------

    /// Advance the transport and collect background results
    pub fn tick(&mut self, now: f64) {
        for notice in self.transport.advance(now) {
            self.push(notice.into());
        }
        self.collect_samples();
        while let Ok(event) = self.export_events.try_recv() {
            self.push(event);
        }
        if self
            .export_job
            .as_ref()
            .is_some_and(|job| job.is_finished())
        {
            self.reap_export();
        }
    }

    // ------------------------------------------------------------------
    // Samples
    // ------------------------------------------------------------------

    fn request_sample(&mut self, sample: &SampleRef) {
        let key = sample.key();
        if sample.is_empty() || self.samples.contains(key) || self.failed_samples.contains(key) {
            return;
        }
        self.loader.request(sample);
    }

    /// Queue every referenced sample that is not loaded yet
    fn request_samples(&mut self) {
        let bank = self.patterns.read();
        let arrangement = self.arrangement.load();
        for sample in export::referenced_samples(&bank, &arrangement, &ExportTarget::Song) {
            self.request_sample(&sample);
        }
    }

    fn collect_samples(&mut self) {
        for result in self.loader.poll() {
            self.absorb_sample(result);
        }
    }

    fn absorb_sample(&mut self, result: LoadResult) {
        match result.result {
            Ok(sample) => {
                debug!(sample = %result.key, frames = sample.frame_count(), "sample ready");
                self.samples.insert(result.key.clone(), Arc::clone(&sample));
                self.fresh_samples.push((result.key, sample));
            }
            Err(e) => {
                // Triggers for this sample stay silent; nothing else is affected
                warn!(sample = %result.key, error = %e, "sample failed to load");
                self.push(Notification::Alert(Alert::warning(
                    AlertCategory::Sample,
                    format!("Could not load {}: {e}", result.key),
                )));
                self.failed_samples.insert(result.key);
            }
        }
    }

    /// Samples decoded since the last call, for the host to install as voices
    pub fn take_loaded_samples(&mut self) -> Vec<(String, Arc<Sample>)> {
        std::mem::take(&mut self.fresh_samples)
    }

    /// Block until pending sample loads finish or `timeout` passes
    pub fn wait_for_samples(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.loader.pending() > 0 {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.loader.wait(left) {
                Some(result) => self.absorb_sample(result),
                None => break,
            }
        }
    }

    // ------------------------------------------------------------------
    // Project
    // ------------------------------------------------------------------

    /// Current editable state as a project
    pub fn project_state(&self) -> ProjectState {
        ProjectState {
            patterns: self.patterns.read().to_patterns(),
            arrangement: Arrangement::clone(&self.arrangement.load()),
            user_samples: self.user_samples.clone(),
            bpm: self.transport.tempo().bpm(),
            swing: self.transport.swing().amount(),
        }
    }

    pub fn save_project(&mut self, path: &Path) -> Result<(), ProjectError> {
        let result = self.projects.save_project(&self.project_state(), path);
        if let Err(e) = &result {
            error!(path = %path.display(), error = %e, "project save failed");
            self.push(Notification::error(AlertCategory::Project, format!("Save failed: {e}")));
        }
        result
    }

    /// Replace the whole editable state from a file, or change nothing
    pub fn load_project(&mut self, path: &Path) -> Result<(), ProjectError> {
        let state = match self.projects.load_project(path, &ProjectLoadOptions::default()) {
            Ok(state) => state,
            Err(e) => {
                self.push(Notification::error(AlertCategory::Project, format!("Load failed: {e}")));
                return Err(e);
            }
        };
        self.install(state);
        Ok(())
    }

    fn install(&mut self, state: ProjectState) {
        self.transport.force_stop();
        let first = state.patterns.first().map(|p| p.id.clone());
        self.patterns.replace(PatternBank::new(state.patterns));
        self.arrangement.replace(state.arrangement);
        self.user_samples = state.user_samples;
        self.transport.set_bpm(state.bpm);
        self.transport.set_swing(state.swing);
        if let Some(first) = first {
            self.transport.select_pattern(first);
        }
        self.failed_samples.clear();
        self.request_samples();
        info!(patterns = self.patterns.read().len(), "project installed");
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Render and write `target` on a worker thread
    ///
    /// The format follows the file extension (WAV when unknown). Progress and
    /// the outcome arrive as notifications on later ticks.
    pub fn export(&mut self, target: ExportTarget, path: PathBuf) -> Result<(), ExportError> {
        if self
            .exporting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ExportError::Busy);
        }
        let guard = ExportGuard(Arc::clone(&self.exporting));

        let job = ExportJob {
            bank: self.patterns.read(),
            arrangement: self.arrangement.load(),
            tempo: self.transport.tempo(),
            swing: self.transport.swing(),
            samples: self.samples.clone(),
            sample_root: self.config.sample_root.clone(),
            settings: self.config.export.clone(),
            format: ExportFormat::from_path(&path).unwrap_or_default(),
            target,
            path,
        };
        let events = self.export_sender.clone();

        let handle = std::thread::Builder::new()
            .name("export".to_string())
            .spawn(move || {
                let _guard = guard;
                job.run(&events);
            })?;
        self.export_job = Some(handle);
        self.push(Notification::ExportStarted);
        Ok(())
    }

    /// Wait for a running export and deliver its notifications
    pub fn finish_export(&mut self) {
        self.reap_export();
        while let Ok(event) = self.export_events.try_recv() {
            self.push(event);
        }
    }

    fn reap_export(&mut self) {
        if let Some(job) = self.export_job.take() {
            if job.join().is_err() {
                error!("export worker panicked");
                self.push(Notification::error(AlertCategory::Export, "Export failed unexpectedly"));
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("transport", &self.transport)
            .field("samples", &self.samples.len())
            .field("exporting", &self.is_exporting())
            .finish()
    }
}

/// Snapshot an export renders from
struct ExportJob {
    bank: Arc<PatternBank>,
    arrangement: Arc<Arrangement>,
    tempo: Tempo,
    swing: Swing,
    samples: SampleCache,
    sample_root: PathBuf,
    settings: ExportSettings,
    format: ExportFormat,
    target: ExportTarget,
    path: PathBuf,
}

impl ExportJob {
    fn run(mut self, events: &Sender<Notification>) {
        let wanted = export::referenced_samples(&self.bank, &self.arrangement, &self.target);
        for (key, e) in self.samples.load_missing(&wanted, &self.sample_root) {
            debug!(sample = %key, error = %e, "export renders sample as silence");
        }

        let source = ExportSource {
            patterns: &self.bank,
            arrangement: &self.arrangement,
            tempo: self.tempo,
            swing: self.swing,
            samples: &self.samples,
        };
        let mut reported = 0.0f32;
        let mut progress = |fraction: f32| {
            if fraction - reported >= PROGRESS_STEP || fraction >= 1.0 {
                reported = fraction;
                let _ = events.send(Notification::ExportProgress(fraction));
            }
        };
        let outcome = export::export_to_file(
            &source,
            &self.target,
            self.format,
            &self.settings,
            &self.path,
            &mut progress,
        );
        let event = match outcome {
            Ok(output) => Notification::ExportFinished {
                path: self.path.clone(),
                bytes: output.bytes.len(),
            },
            Err(e) => {
                error!(error = %e, path = %self.path.display(), "export failed");
                Notification::error(AlertCategory::Export, format!("Export failed: {e}"))
            }
        };
        let _ = events.send(event);
    }
}
