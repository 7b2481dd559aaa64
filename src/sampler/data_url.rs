// Data URLs - samples embedded in project files as base64

use crate::sampler::SampleError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

const PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// Payload of a `data:<mime>;base64,<bytes>` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    pub fn parse(url: &str) -> Result<Self, SampleError> {
        let rest = url
            .strip_prefix(PREFIX)
            .ok_or_else(|| SampleError::InvalidDataUrl("missing data: prefix".to_string()))?;
        let (mime, payload) = rest
            .split_once(BASE64_MARKER)
            .ok_or_else(|| SampleError::InvalidDataUrl("only base64 payloads are supported".to_string()))?;
        let bytes = STANDARD.decode(payload.trim())?;
        Ok(Self::new(mime, bytes))
    }

    pub fn encode(&self) -> String {
        format!("{PREFIX}{}{BASE64_MARKER}{}", self.mime, STANDARD.encode(&self.bytes))
    }

    /// File extension hint for the decoder
    pub fn extension(&self) -> Option<&'static str> {
        extension_for_mime(&self.mime)
    }
}

pub fn is_data_url(url: &str) -> bool {
    url.starts_with(PREFIX)
}

pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Some("wav"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/ogg" | "application/ogg" => Some("ogg"),
        _ => None,
    }
}

pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "wav" | "wave" => "audio/wav",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_url() {
        let url = DataUrl::new("audio/wav", b"RIFF".to_vec()).encode();
        assert_eq!(url, "data:audio/wav;base64,UklGRg==");

        let parsed = DataUrl::parse(&url).unwrap();
        assert_eq!(parsed.bytes, b"RIFF");
        assert_eq!(parsed.extension(), Some("wav"));
        assert!(is_data_url(&url));
    }

    #[test]
    fn test_invalid_data_urls() {
        assert!(DataUrl::parse("samples/kick.wav").is_err());
        assert!(DataUrl::parse("data:audio/wav,plain").is_err());
        assert!(DataUrl::parse("data:audio/wav;base64,!!!").is_err());
    }

    #[test]
    fn test_mime_mapping() {
        assert_eq!(mime_for_extension("MP3"), "audio/mpeg");
        assert_eq!(extension_for_mime("audio/mpeg"), Some("mp3"));
        assert_eq!(extension_for_mime("text/plain"), None);
    }
}
