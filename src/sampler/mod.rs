// Sampler - Sample decoding, loading and the user sample library

pub mod data_url;
pub mod library;
pub mod loader;
pub mod sample;
pub mod voice;

pub use data_url::DataUrl;
pub use library::SampleNode;
pub use loader::{LoadResult, SampleCache, SampleLoader, load_sample};
pub use sample::Sample;
pub use voice::SamplerVoice;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("No audio track in {0}")]
    NoTrack(String),

    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Sample not found: {0}")]
    NotFound(String),
}
