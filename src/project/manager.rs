// Project manager for loading and saving projects

use crate::project::ProjectError;
use crate::project::format::{ProjectFile, ProjectState};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Options for loading a project
#[derive(Debug, Clone, Default)]
pub struct ProjectLoadOptions {
    /// Override the tempo stored in the file
    pub bpm_override: Option<f64>,
}

/// Saves and loads project files
///
/// Relative sample paths are resolved against `sample_root` when clip audio
/// is embedded at save time.
#[derive(Debug, Clone)]
pub struct ProjectManager {
    sample_root: PathBuf,
}

impl ProjectManager {
    pub fn new(sample_root: impl Into<PathBuf>) -> Self {
        Self {
            sample_root: sample_root.into(),
        }
    }

    pub fn sample_root(&self) -> &Path {
        &self.sample_root
    }

    /// Serialize `state` to pretty JSON
    pub fn to_json(&self, state: &ProjectState) -> Result<String, ProjectError> {
        let file = ProjectFile::from_state(state, &self.sample_root)?;
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Parse and validate a JSON document; nothing is returned unless all of it is usable
    pub fn parse_json(&self, json: &str, options: &ProjectLoadOptions) -> Result<ProjectState, ProjectError> {
        let file: ProjectFile = serde_json::from_str(json)?;
        let mut state = file.into_state()?;
        if let Some(bpm) = options.bpm_override {
            state.bpm = bpm;
        }
        Ok(state)
    }

    /// Save project to a JSON file
    ///
    /// Written to a sibling temporary file first and renamed into place, so an
    /// interrupted save leaves the previous file intact.
    pub fn save_project<P: AsRef<Path>>(&self, state: &ProjectState, project_path: P) -> Result<(), ProjectError> {
        let project_path = project_path.as_ref();
        let json = self.to_json(state)?;

        if let Some(parent) = project_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = project_path.with_extension("json.tmp");
        std::fs::write(&temp_path, json.as_bytes())?;
        if let Err(e) = std::fs::rename(&temp_path, project_path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }

        info!(
            path = %project_path.display(),
            patterns = state.patterns.len(),
            bytes = json.len(),
            "project saved"
        );
        Ok(())
    }

    /// Load project from a JSON file
    pub fn load_project<P: AsRef<Path>>(
        &self,
        project_path: P,
        options: &ProjectLoadOptions,
    ) -> Result<ProjectState, ProjectError> {
        let project_path = project_path.as_ref();
        let json = std::fs::read_to_string(project_path)?;
        match self.parse_json(&json, options) {
            Ok(state) => {
                info!(
                    path = %project_path.display(),
                    patterns = state.patterns.len(),
                    bpm = state.bpm,
                    "project loaded"
                );
                Ok(state)
            }
            Err(e) => {
                warn!(path = %project_path.display(), error = %e, "project load failed");
                Err(e)
            }
        }
    }
}

impl Default for ProjectManager {
    fn default() -> Self {
        Self::new(".")
    }
}
