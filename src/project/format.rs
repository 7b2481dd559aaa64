// Project file format - JSON document of the whole editable state
//
// Conversion to and from the in-memory `ProjectState` happens here. Loading
// validates everything before anything is returned, so a caller either gets
// a complete state or an error.

use crate::project::ProjectError;
use crate::sampler::data_url::{DataUrl, is_data_url, mime_for_extension};
use crate::sampler::library::{self, SampleNode};
use crate::sequencer::note::reserve_note_ids_through;
use crate::sequencer::pattern::{Channel, Pattern, SampleRef};
use crate::sequencer::playlist::{Arrangement, AudioClip, Playlist};
use crate::sequencer::timeline::{MAX_SONG_BARS, TRACK_COUNT, Tempo};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Version written by this build
pub const PROJECT_VERSION: &str = "1.1.0";

/// Oldest major version that can still be read
const SUPPORTED_MAJOR: u32 = 1;

/// On-disk shape of a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub version: String,
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub playlist: Playlist,
    #[serde(default)]
    pub audio_clips: Vec<AudioClip>,
    /// Mixer channels of the audio clips; recreated with defaults when absent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clip_channels: Vec<Channel>,
    #[serde(default)]
    pub user_samples: Vec<SampleNode>,
    pub bpm: f64,
    #[serde(default)]
    pub swing: f64,
}

/// Everything a project file restores
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectState {
    pub patterns: Vec<Pattern>,
    pub arrangement: Arrangement,
    pub user_samples: Vec<SampleNode>,
    pub bpm: f64,
    pub swing: f64,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            patterns: vec![Pattern::with_default_kit("p1".to_string(), "Pattern 1")],
            arrangement: Arrangement::default(),
            user_samples: Vec::new(),
            bpm: Tempo::default().bpm(),
            swing: 0.0,
        }
    }
}

impl ProjectFile {
    /// Snapshot `state`, embedding every clip sample as a data URL
    ///
    /// Clip samples that are plain paths are read from disk (relative to
    /// `sample_root`) so the file is self-contained.
    pub fn from_state(state: &ProjectState, sample_root: &Path) -> Result<Self, ProjectError> {
        let audio_clips = state
            .arrangement
            .audio_clips
            .iter()
            .map(|clip| {
                let mut clip = clip.clone();
                clip.sample.url = embed_sample(&clip.sample, sample_root)?;
                Ok(clip)
            })
            .collect::<Result<Vec<_>, ProjectError>>()?;

        Ok(Self {
            version: PROJECT_VERSION.to_string(),
            patterns: state.patterns.clone(),
            playlist: state.arrangement.playlist.clone(),
            audio_clips,
            clip_channels: state.arrangement.clip_channels.clone(),
            user_samples: state.user_samples.clone(),
            bpm: state.bpm,
            swing: state.swing,
        })
    }

    /// Check the document without converting it
    pub fn validate(&self) -> Result<(), ProjectError> {
        check_version(&self.version)?;

        if !self.bpm.is_finite() || self.bpm < Tempo::MIN_BPM || self.bpm > Tempo::MAX_BPM {
            return Err(invalid(format!(
                "bpm {} outside {}..={}",
                self.bpm,
                Tempo::MIN_BPM,
                Tempo::MAX_BPM
            )));
        }
        if !(0.0..=1.0).contains(&self.swing) {
            return Err(invalid(format!("swing {} outside 0..=1", self.swing)));
        }

        let mut pattern_ids = HashSet::new();
        for pattern in &self.patterns {
            if !pattern_ids.insert(pattern.id.as_str()) {
                return Err(invalid(format!("duplicate pattern id {}", pattern.id)));
            }
            let mut channel_ids = HashSet::new();
            for channel in &pattern.channels {
                if !channel_ids.insert(channel.id.as_str()) {
                    return Err(invalid(format!(
                        "duplicate channel id {} in pattern {}",
                        channel.id, pattern.id
                    )));
                }
                if let Some(note) = channel.notes.iter().find(|n| n.pitch > 127) {
                    return Err(invalid(format!("note {} has pitch {}", note.id, note.pitch)));
                }
            }
        }

        for (key, pattern_id) in self.playlist.iter() {
            if !pattern_ids.contains(pattern_id.as_str()) {
                return Err(invalid(format!("playlist entry {key} refers to missing pattern {pattern_id}")));
            }
            if key.track >= TRACK_COUNT || key.bar >= MAX_SONG_BARS {
                return Err(invalid(format!("playlist entry {key} is off the grid")));
            }
        }

        let mut clip_ids = HashSet::new();
        for clip in &self.audio_clips {
            if !clip_ids.insert(clip.id.as_str()) {
                return Err(invalid(format!("duplicate audio clip id {}", clip.id)));
            }
            if !clip.is_valid() {
                return Err(invalid(format!("audio clip {} has an invalid trim", clip.id)));
            }
        }
        Ok(())
    }

    /// Validate and convert into a complete state
    ///
    /// Sample URLs are re-resolved by name against the user sample tree, step
    /// arrays are padded to their pattern length, and the note id counter is
    /// moved past every loaded note.
    pub fn into_state(self) -> Result<ProjectState, ProjectError> {
        self.validate()?;

        let Self {
            patterns,
            playlist,
            audio_clips,
            clip_channels,
            user_samples,
            bpm,
            swing,
            ..
        } = self;

        let mut patterns = patterns;
        for pattern in &mut patterns {
            let length = pattern.length_steps();
            for channel in &mut pattern.channels {
                channel.ensure_length(length);
                resolve_sample(&mut channel.sample, &user_samples);
            }
        }

        let mut audio_clips = audio_clips;
        for clip in &mut audio_clips {
            resolve_sample(&mut clip.sample, &user_samples);
        }

        // Keep stored clip channels, recreate the ones a file left out
        let mut channels: Vec<Channel> = clip_channels
            .into_iter()
            .filter(|channel| audio_clips.iter().any(|clip| clip.channel_id == channel.id))
            .collect();
        for clip in &audio_clips {
            if !channels.iter().any(|c| c.id == clip.channel_id) {
                channels.push(Channel::new_audio_clip(
                    clip.channel_id.clone(),
                    clip.sample.name.clone(),
                    clip.sample.clone(),
                ));
            }
        }
        for channel in &mut channels {
            channel.is_audio_clip_channel = true;
            resolve_sample(&mut channel.sample, &user_samples);
        }

        let max_note_id = patterns
            .iter()
            .flat_map(|p| &p.channels)
            .flat_map(|c| &c.notes)
            .map(|n| n.id)
            .max();
        if let Some(id) = max_note_id {
            reserve_note_ids_through(id);
        }

        debug!(
            patterns = patterns.len(),
            placements = playlist.len(),
            clips = audio_clips.len(),
            "project state restored"
        );

        Ok(ProjectState {
            patterns,
            arrangement: Arrangement {
                playlist,
                audio_clips,
                clip_channels: channels,
            },
            user_samples,
            bpm,
            swing,
        })
    }
}

fn invalid(message: String) -> ProjectError {
    ProjectError::InvalidStructure(message)
}

/// Accept any `1.x` version string
fn check_version(version: &str) -> Result<(), ProjectError> {
    let major = version
        .split('.')
        .next()
        .and_then(|major| major.trim().parse::<u32>().ok())
        .ok_or_else(|| ProjectError::InvalidVersion(version.to_string()))?;
    if major != SUPPORTED_MAJOR {
        return Err(ProjectError::InvalidVersion(version.to_string()));
    }
    Ok(())
}

/// Point a sample at the tree file with the same name, if there is one
fn resolve_sample(sample: &mut SampleRef, tree: &[SampleNode]) {
    if let Some(url) = library::find_by_name(tree, &sample.name) {
        sample.url = url.to_string();
    }
}

/// Data URL for a sample, reading path-based samples from disk
fn embed_sample(sample: &SampleRef, sample_root: &Path) -> Result<String, ProjectError> {
    if sample.is_empty() || is_data_url(&sample.url) {
        return Ok(sample.url.clone());
    }
    let path = PathBuf::from(&sample.url);
    let path = if path.is_absolute() { path } else { sample_root.join(path) };
    let bytes = std::fs::read(&path).map_err(|source| ProjectError::SampleEmbed {
        name: sample.name.clone(),
        source,
    })?;
    let mime = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or("application/octet-stream", mime_for_extension);
    Ok(DataUrl::new(mime, bytes).encode())
}
