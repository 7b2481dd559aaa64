// Playlist - Song-level placement of patterns onto tracks
// Resolves which pattern occupies which track at a given bar

use crate::sequencer::pattern::{Channel, ChannelId, Pattern, PatternId, SampleRef};
use crate::sequencer::timeline::{MAX_SONG_BARS, TRACK_COUNT, Tempo};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

/// Read access to pattern lengths for placement and resolution
pub trait PatternLookup {
    fn pattern(&self, id: &str) -> Option<&Pattern>;

    fn length_bars(&self, id: &str) -> Option<usize> {
        self.pattern(id).map(Pattern::length_bars)
    }
}

impl PatternLookup for [Pattern] {
    fn pattern(&self, id: &str) -> Option<&Pattern> {
        self.iter().find(|p| p.id == id)
    }
}

impl PatternLookup for Vec<Pattern> {
    fn pattern(&self, id: &str) -> Option<&Pattern> {
        self.as_slice().pattern(id)
    }
}

/// Composite playlist key `"<track>:<startBar>"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackBarKey {
    pub track: usize,
    pub bar: usize,
}

impl TrackBarKey {
    pub fn new(track: usize, bar: usize) -> Self {
        Self { track, bar }
    }
}

impl fmt::Display for TrackBarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.track, self.bar)
    }
}

impl FromStr for TrackBarKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (track, bar) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid playlist key '{s}'"))?;
        let track = track
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid track in playlist key '{s}': {e}"))?;
        let bar = bar
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid bar in playlist key '{s}': {e}"))?;
        if track >= TRACK_COUNT || bar >= MAX_SONG_BARS {
            return Err(format!("playlist key '{s}' is outside the song grid"));
        }
        Ok(Self { track, bar })
    }
}

/// A pattern found at a song position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub track: usize,
    pub start_bar: usize,
    pub pattern_id: PatternId,
}

/// Mapping from (track, start bar) to pattern ID
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "Vec<(String, PatternId)>", try_from = "Vec<(String, PatternId)>")]
pub struct Playlist {
    entries: BTreeMap<TrackBarKey, PatternId>,
}

impl From<Playlist> for Vec<(String, PatternId)> {
    fn from(playlist: Playlist) -> Self {
        playlist
            .entries
            .into_iter()
            .map(|(key, id)| (key.to_string(), id))
            .collect()
    }
}

impl TryFrom<Vec<(String, PatternId)>> for Playlist {
    type Error = String;

    fn try_from(pairs: Vec<(String, PatternId)>) -> Result<Self, Self::Error> {
        let mut entries = BTreeMap::new();
        for (key, id) in pairs {
            entries.insert(key.parse::<TrackBarKey>()?, id);
        }
        Ok(Self { entries })
    }
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, track: usize, bar: usize) -> Option<&PatternId> {
        self.entries.get(&TrackBarKey::new(track, bar))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TrackBarKey, &PatternId)> {
        self.entries.iter()
    }

    /// Place a pattern, deleting every placement on the same track it would overlap
    ///
    /// Returns false (and leaves the playlist unchanged) for positions outside
    /// the song grid or unknown patterns.
    pub fn place<L: PatternLookup + ?Sized>(
        &mut self,
        patterns: &L,
        track: usize,
        bar: usize,
        pattern_id: &str,
    ) -> bool {
        if track >= TRACK_COUNT || bar >= MAX_SONG_BARS {
            return false;
        }
        let Some(new_length) = patterns.length_bars(pattern_id) else {
            return false;
        };
        let new_end = bar + new_length;

        let overlapping: Vec<TrackBarKey> = self
            .entries
            .range(TrackBarKey::new(track, 0)..=TrackBarKey::new(track, MAX_SONG_BARS))
            .filter(|(key, id)| {
                let length = patterns.length_bars(id).unwrap_or(1);
                key.bar < new_end && bar < key.bar + length
            })
            .map(|(key, _)| *key)
            .collect();

        for key in overlapping {
            if let Some(removed) = self.entries.remove(&key) {
                debug!(%key, pattern = %removed, "placement replaced by overlap");
            }
        }

        self.entries
            .insert(TrackBarKey::new(track, bar), pattern_id.to_string());
        true
    }

    /// Remove the placement starting exactly at (track, bar)
    pub fn remove_at(&mut self, track: usize, bar: usize) -> Option<PatternId> {
        self.entries.remove(&TrackBarKey::new(track, bar))
    }

    /// Remove every placement of a pattern
    pub fn remove_pattern(&mut self, pattern_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, id| id != pattern_id);
        before - self.entries.len()
    }

    /// Pattern sounding on `track` at `bar`, scanning start bars backward from `bar`
    pub fn resolve<L: PatternLookup + ?Sized>(
        &self,
        patterns: &L,
        track: usize,
        bar: usize,
    ) -> Option<Placement> {
        self.entries
            .range(TrackBarKey::new(track, 0)..=TrackBarKey::new(track, bar))
            .rev()
            .find(|(key, id)| {
                patterns
                    .length_bars(id)
                    .is_some_and(|length| key.bar + length > bar)
            })
            .map(|(key, id)| Placement {
                track: key.track,
                start_bar: key.bar,
                pattern_id: id.clone(),
            })
    }

    /// The single pattern that plays at `global_bar`: first matching track in index order
    pub fn resolve_active<L: PatternLookup + ?Sized>(
        &self,
        patterns: &L,
        global_bar: usize,
    ) -> Option<Placement> {
        (0..TRACK_COUNT).find_map(|track| self.resolve(patterns, track, global_bar))
    }

    /// Bar where the last placement ends
    pub fn end_bar<L: PatternLookup + ?Sized>(&self, patterns: &L) -> usize {
        self.entries
            .iter()
            .filter_map(|(key, id)| patterns.length_bars(id).map(|len| key.bar + len))
            .max()
            .unwrap_or(0)
    }
}

/// A trimmed region of an audio file placed on the song timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    pub id: String,
    pub channel_id: ChannelId,
    pub sample: SampleRef,
    pub track: usize,
    pub start_bar: f64,
    pub duration_in_bars: f64,
    pub trim_start_bars: f64,
    pub trim_duration_bars: f64,
}

impl AudioClip {
    /// Bar where the audible (trimmed) region ends
    pub fn end_bar(&self) -> f64 {
        self.start_bar + self.trim_duration_bars
    }

    /// Clamp trim values so `0 <= trim_start` and `trim_start + trim_duration <= duration`
    pub fn set_trim(&mut self, trim_start_bars: f64, trim_duration_bars: f64) {
        let duration = self.duration_in_bars.max(0.0);
        self.trim_start_bars = trim_start_bars.clamp(0.0, duration);
        self.trim_duration_bars = trim_duration_bars.clamp(0.0, duration - self.trim_start_bars);
    }

    pub fn is_valid(&self) -> bool {
        self.trim_start_bars >= 0.0
            && self.trim_duration_bars >= 0.0
            && self.trim_start_bars + self.trim_duration_bars <= self.duration_in_bars + 1e-9
    }
}

/// Song-level state: pattern placements plus audio clips and their mixer channels
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Arrangement {
    pub playlist: Playlist,
    pub audio_clips: Vec<AudioClip>,
    pub clip_channels: Vec<Channel>,
}

impl Arrangement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an untrimmed clip on `track` and create its dedicated channel
    pub fn add_audio_clip(
        &mut self,
        sample: SampleRef,
        track: usize,
        start_bar: f64,
        duration_in_bars: f64,
    ) -> String {
        let id = format!("clip-{}", Uuid::new_v4().simple());
        let channel_id = format!("{id}/channel");
        self.clip_channels.push(Channel::new_audio_clip(
            channel_id.clone(),
            sample.name.clone(),
            sample.clone(),
        ));
        let duration = duration_in_bars.max(0.0);
        self.audio_clips.push(AudioClip {
            id: id.clone(),
            channel_id,
            sample,
            track,
            start_bar: start_bar.max(0.0),
            duration_in_bars: duration,
            trim_start_bars: 0.0,
            trim_duration_bars: duration,
        });
        id
    }

    /// Remove a clip together with its channel
    pub fn remove_audio_clip(&mut self, clip_id: &str) -> Option<AudioClip> {
        let index = self.audio_clips.iter().position(|c| c.id == clip_id)?;
        let clip = self.audio_clips.remove(index);
        self.clip_channels.retain(|c| c.id != clip.channel_id);
        Some(clip)
    }

    pub fn audio_clip_mut(&mut self, clip_id: &str) -> Option<&mut AudioClip> {
        self.audio_clips.iter_mut().find(|c| c.id == clip_id)
    }

    pub fn clip_channel_mut(&mut self, channel_id: &str) -> Option<&mut Channel> {
        self.clip_channels.iter_mut().find(|c| c.id == channel_id)
    }

    /// Song length in bars, covering pattern placements and clip ends
    pub fn song_length_bars<L: PatternLookup + ?Sized>(&self, patterns: &L) -> f64 {
        let pattern_end = self.playlist.end_bar(patterns) as f64;
        self.audio_clips
            .iter()
            .map(AudioClip::end_bar)
            .fold(pattern_end, f64::max)
    }

    pub fn song_duration_seconds<L: PatternLookup + ?Sized>(
        &self,
        patterns: &L,
        tempo: &Tempo,
    ) -> f64 {
        tempo.bars_to_seconds(self.song_length_bars(patterns))
    }
}

/// Shared, lock-free readable handle to the current arrangement
///
/// Readers always see the latest committed arrangement; writers are serialized.
#[derive(Debug, Clone)]
pub struct SharedArrangement {
    current: Arc<ArcSwap<Arrangement>>,
    writer: Arc<Mutex<()>>,
}

impl SharedArrangement {
    pub fn new(arrangement: Arrangement) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(arrangement)),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn load(&self) -> Arc<Arrangement> {
        self.current.load_full()
    }

    /// Apply an edit and publish the result
    pub fn update<R>(&self, edit: impl FnOnce(&mut Arrangement) -> R) -> R {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = Arrangement::clone(&self.current.load());
        let result = edit(&mut next);
        self.current.store(Arc::new(next));
        result
    }

    /// Replace the whole arrangement (project load)
    pub fn replace(&self, arrangement: Arrangement) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.current.store(Arc::new(arrangement));
    }
}

impl Default for SharedArrangement {
    fn default() -> Self {
        Self::new(Arrangement::default())
    }
}
