// Project persistence - JSON project files with embedded clip audio

pub mod format;
pub mod manager;

pub use format::{PROJECT_VERSION, ProjectFile, ProjectState};
pub use manager::{ProjectLoadOptions, ProjectManager};

/// Project error types
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Invalid project structure: {0}")]
    InvalidStructure(String),

    #[error("Unsupported project version: {0}")]
    InvalidVersion(String),

    #[error("Could not embed sample {name}: {source}")]
    SampleEmbed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
