// MP3 encoding - 320 kbps CBR stereo, fed in 1152-sample frames
//
// The encoder itself is external. `FfmpegMp3Encoder` streams PCM into an
// ffmpeg process (libmp3lame); tests plug in their own `Mp3FrameEncoder`.

use crate::audio::offline::RenderedAudio;
use crate::audio::wav::to_pcm16;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::debug;

/// Samples per channel in one MPEG-1 Layer III frame
pub const MP3_FRAME_SAMPLES: usize = 1152;

pub const MP3_BITRATE_KBPS: u32 = 320;

#[derive(Debug, Error)]
pub enum Mp3Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MP3 encoder unavailable: {0}")]
    Unavailable(String),

    #[error("MP3 encoder failed: {0}")]
    Failed(String),
}

/// Frame-at-a-time MP3 encoder
pub trait Mp3FrameEncoder {
    /// Encode up to `MP3_FRAME_SAMPLES` stereo samples, returning any bytes produced
    fn encode_frame(&mut self, left: &[i16], right: &[i16]) -> Result<Vec<u8>, Mp3Error>;

    /// Emit whatever the encoder still buffers
    fn flush(&mut self) -> Result<Vec<u8>, Mp3Error>;
}

/// Split interleaved audio into 16-bit left/right; mono feeds both sides
pub fn stereo_pcm16(audio: &RenderedAudio) -> (Vec<i16>, Vec<i16>) {
    let channels = audio.channels.max(1) as usize;
    audio
        .samples
        .chunks_exact(channels)
        .map(|frame| match frame {
            [mono] => (to_pcm16(*mono), to_pcm16(*mono)),
            [left, right, ..] => (to_pcm16(*left), to_pcm16(*right)),
            [] => (0, 0),
        })
        .unzip()
}

/// Encode rendered audio frame by frame, then flush
pub fn encode_mp3<E: Mp3FrameEncoder + ?Sized>(audio: &RenderedAudio, encoder: &mut E) -> Result<Vec<u8>, Mp3Error> {
    let (left, right) = stereo_pcm16(audio);
    let mut out = Vec::new();
    for (l, r) in left
        .chunks(MP3_FRAME_SAMPLES)
        .zip(right.chunks(MP3_FRAME_SAMPLES))
    {
        out.extend(encoder.encode_frame(l, r)?);
    }
    out.extend(encoder.flush()?);
    Ok(out)
}

/// Streams frames to `ffmpeg ... -codec:a libmp3lame -b:a 320k`
pub struct FfmpegMp3Encoder {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl FfmpegMp3Encoder {
    pub fn spawn(ffmpeg: impl Into<PathBuf>, sample_rate: u32) -> Result<Self, Mp3Error> {
        let ffmpeg = ffmpeg.into();
        let mut child = Command::new(&ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-f", "s16le", "-ar"])
            .arg(sample_rate.to_string())
            .args(["-ac", "2", "-i", "pipe:0", "-codec:a", "libmp3lame", "-b:a"])
            .arg(format!("{MP3_BITRATE_KBPS}k"))
            .args(["-f", "mp3", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Mp3Error::Unavailable(format!("{}: {e}", ffmpeg.display())))?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Mp3Error::Failed("no stdout pipe".to_string()))?;
        // Drain stdout concurrently so a full pipe never blocks the writer
        let reader = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stdout.read_to_end(&mut bytes).map(|_| bytes)
        });

        debug!(ffmpeg = %ffmpeg.display(), sample_rate, "mp3 encoder started");
        Ok(Self {
            child,
            stdin,
            reader: Some(reader),
        })
    }
}

impl Mp3FrameEncoder for FfmpegMp3Encoder {
    fn encode_frame(&mut self, left: &[i16], right: &[i16]) -> Result<Vec<u8>, Mp3Error> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Mp3Error::Failed("encoder already flushed".to_string()))?;
        let mut pcm = Vec::with_capacity(left.len() * 4);
        for (l, r) in left.iter().zip(right) {
            pcm.extend_from_slice(&l.to_le_bytes());
            pcm.extend_from_slice(&r.to_le_bytes());
        }
        stdin.write_all(&pcm)?;
        Ok(Vec::new())
    }

    fn flush(&mut self) -> Result<Vec<u8>, Mp3Error> {
        // Closing stdin tells ffmpeg the stream ended
        self.stdin.take();
        let bytes = match self.reader.take() {
            Some(reader) => reader
                .join()
                .map_err(|_| Mp3Error::Failed("output reader panicked".to_string()))??,
            None => Vec::new(),
        };
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            pipe.read_to_string(&mut stderr)?;
        }
        let status = self.child.wait()?;
        if !status.success() {
            return Err(Mp3Error::Failed(format!("{status}: {}", stderr.trim())));
        }
        Ok(bytes)
    }
}

impl Drop for FfmpegMp3Encoder {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
