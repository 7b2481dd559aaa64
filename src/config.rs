// Session configuration - RON file under the user config directory

use crate::audio::export::ExportSettings;
use crate::sequencer::midi_recorder::Quantize;
use crate::sequencer::timeline::{Swing, Tempo};
use crate::sequencer::transport::{DEFAULT_LOOKAHEAD_SECONDS, TransportSettings};
use crate::store::history::DEFAULT_MAX_HISTORY;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config file: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Could not write config: {0}")]
    Serialize(#[from] ron::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Output rate of the live engine
    pub sample_rate: u32,
    pub default_bpm: f64,
    pub default_swing: f64,
    pub count_in_bars: usize,
    pub quantize: Quantize,
    pub metronome_enabled: bool,
    pub lookahead_seconds: f64,
    /// Undo steps kept by the pattern store
    pub history_limit: usize,
    /// Directory relative sample paths are resolved against
    pub sample_root: PathBuf,
    /// Sample decoding threads
    pub loader_threads: usize,
    pub export: ExportSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let transport = TransportSettings::default();
        Self {
            sample_rate: 44100,
            default_bpm: Tempo::default().bpm(),
            default_swing: 0.0,
            count_in_bars: transport.count_in_bars,
            quantize: transport.quantize,
            metronome_enabled: transport.metronome_enabled,
            lookahead_seconds: DEFAULT_LOOKAHEAD_SECONDS,
            history_limit: DEFAULT_MAX_HISTORY,
            sample_root: PathBuf::from("."),
            loader_threads: 2,
            export: ExportSettings::default(),
        }
    }
}

impl SessionConfig {
    /// `<config dir>/beatgrid/config.ron`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("beatgrid")
            .join("config.ron")
    }

    /// Read a config file; a missing file gives the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let config = ron::from_str(&text)?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&Self::default_path())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let text = ron::ser::to_string_pretty(self, PrettyConfig::default())?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn tempo(&self) -> Tempo {
        Tempo::new(self.default_bpm)
    }

    pub fn swing(&self) -> Swing {
        Swing::new(self.default_swing)
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            count_in_bars: self.count_in_bars,
            quantize: self.quantize,
            metronome_enabled: self.metronome_enabled,
            lookahead_seconds: self.lookahead_seconds.max(0.0),
        }
    }
}
