// Sample - Decoded audio held in memory
// Any format symphonia can probe (WAV, FLAC, OGG, MP3) decodes to interleaved f32

use crate::sampler::SampleError;
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved frames
    data: Vec<f32>,
}

impl Sample {
    pub fn new(name: impl Into<String>, sample_rate: u32, channels: u16, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            sample_rate,
            channels: channels.max(1),
            data,
        }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn frame_count(&self) -> usize {
        self.data.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Left/right value of one frame; mono is duplicated, extra channels ignored
    pub fn frame(&self, index: usize) -> (f32, f32) {
        let channels = self.channels as usize;
        let base = index * channels;
        match self.data.get(base..base + channels) {
            Some([mono]) => (*mono, *mono),
            Some([left, right, ..]) => (*left, *right),
            _ => (0.0, 0.0),
        }
    }

    /// Linearly interpolated frame at a fractional position
    pub fn interpolated(&self, position: f64) -> (f32, f32) {
        if position < 0.0 {
            return (0.0, 0.0);
        }
        let index = position as usize;
        let frac = position.fract() as f32;
        let (l1, r1) = self.frame(index);
        let (l2, r2) = self.frame(index + 1);
        (l1 + (l2 - l1) * frac, r1 + (r2 - r1) * frac)
    }

    /// Decode an in-memory file; `extension` helps the format probe
    pub fn decode(name: impl Into<String>, bytes: Vec<u8>, extension: Option<&str>) -> Result<Self, SampleError> {
        let name = name.into();
        let stream = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| SampleError::NoTrack(name.clone()))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channels = track.codec_params.channels.map_or(0, |c| c.count());

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;

        let mut data = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count();
                    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    data.extend_from_slice(buffer.samples());
                }
                Err(SymphoniaError::DecodeError(reason)) => {
                    warn!(sample = %name, reason, "skipping undecodable packet");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if sample_rate == 0 || channels == 0 {
            return Err(SampleError::NoTrack(name));
        }

        debug!(sample = %name, sample_rate, channels, frames = data.len() / channels, "sample decoded");
        Ok(Self::new(name, sample_rate, channels as u16, data))
    }

    /// Read and decode a file from disk
    pub fn load(path: &Path) -> Result<Self, SampleError> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path.extension().and_then(|e| e.to_str());
        Self::decode(name, bytes, extension)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    /// 16-bit WAV bytes for tests
    pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav() {
        let bytes = wav_bytes(22050, 1, &[0, 16384, -16384, 32767]);
        let sample = Sample::decode("tone.wav", bytes, Some("wav")).unwrap();
        assert_eq!(sample.sample_rate, 22050);
        assert_eq!(sample.channels, 1);
        assert_eq!(sample.frame_count(), 4);
        assert!((sample.frame(1).0 - 0.5).abs() < 1e-3);
        assert!((sample.frame(2).1 + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Sample::decode("junk", vec![1, 2, 3, 4], None).is_err());
    }

    #[test]
    fn test_interpolation_and_stereo_frames() {
        let sample = Sample::new("s", 48000, 2, vec![0.0, 1.0, 1.0, 0.0]);
        assert_eq!(sample.frame_count(), 2);
        assert_eq!(sample.frame(1), (1.0, 0.0));
        assert_eq!(sample.interpolated(0.5), (0.5, 0.5));
        assert_eq!(sample.frame(5), (0.0, 0.0));
        assert_eq!(sample.interpolated(-1.0), (0.0, 0.0));
    }
}
