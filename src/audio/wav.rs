// WAV encoding - 16-bit PCM RIFF/WAVE in memory

use crate::audio::offline::RenderedAudio;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;

/// Full scale of a 16-bit sample
const PCM16_SCALE: f32 = 32767.0;

/// Clamp to [-1, 1] and scale to 16-bit
pub fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * PCM16_SCALE) as i16
}

pub fn from_pcm16(sample: i16) -> f32 {
    sample as f32 / PCM16_SCALE
}

/// Encode interleaved audio as a complete WAV file
pub fn encode_wav(audio: &RenderedAudio) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + audio.samples.len() * 2));
    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for &sample in &audio.samples {
        writer.write_sample(to_pcm16(sample))?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

/// Decode a 16-bit WAV file back to interleaved floats
pub fn decode_wav(bytes: &[u8]) -> Result<RenderedAudio, hound::Error> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let samples = reader
        .into_samples::<i16>()
        .map(|s| s.map(from_pcm16))
        .collect::<Result<Vec<f32>, _>>()?;
    Ok(RenderedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let audio = RenderedAudio {
            samples: vec![0.0, 1.0, -1.0, 0.5],
            sample_rate: 44100,
            channels: 2,
        };
        let bytes = encode_wav(&audio).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        // PCM, 2 channels, 44.1 kHz, 16 bits
        assert_eq!(u16::from_le_bytes([bytes[20], bytes[21]]), 1);
        assert_eq!(u16::from_le_bytes([bytes[22], bytes[23]]), 2);
        assert_eq!(u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]), 44100);
        assert_eq!(u16::from_le_bytes([bytes[34], bytes[35]]), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]), 8);
        assert_eq!(i16::from_le_bytes([bytes[46], bytes[47]]), 32767);
        assert_eq!(i16::from_le_bytes([bytes[48], bytes[49]]), -32767);
    }

    #[test]
    fn test_round_trip_within_quantization_error() {
        let samples: Vec<f32> = (0..512).map(|i| (i as f32 * 0.05).sin() * 0.9).collect();
        let audio = RenderedAudio {
            samples: samples.clone(),
            sample_rate: 48000,
            channels: 1,
        };
        let decoded = decode_wav(&encode_wav(&audio).unwrap()).unwrap();
        assert_eq!(decoded.sample_rate, 48000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples.len(), samples.len());
        for (original, back) in samples.iter().zip(&decoded.samples) {
            assert!((original - back).abs() <= 1.0 / 32767.0 + f32::EPSILON);
        }
    }

    #[test]
    fn test_clamping() {
        assert_eq!(to_pcm16(2.0), 32767);
        assert_eq!(to_pcm16(-3.0), -32767);
        assert_eq!(to_pcm16(0.0), 0);
    }
}
