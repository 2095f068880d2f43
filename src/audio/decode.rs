//! Audio decoding via symphonia
//!
//! Decodes audio files and in-memory byte buffers (WAV, FLAC, MP3, OGG
//! Vorbis) to interleaved stereo f32 at the source sample rate. Two entry
//! points: [`decode_all`] drains a whole clip up front for sound effects,
//! [`AudioDecoder`] decodes incrementally for streamed music.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::{debug, warn};

/// Where encoded audio bytes come from
///
/// Cloning is cheap: file sources clone the path, memory sources clone the
/// `Arc`. A source can be reopened any number of times, which is how looped
/// music restarts decoding from the top.
#[derive(Debug, Clone)]
pub enum ByteSource {
    /// Read from a file on disk
    File(PathBuf),
    /// Read from a shared in-memory buffer
    Memory(Arc<[u8]>),
}

impl ByteSource {
    /// Open the source as a symphonia media stream with a format hint
    pub fn open(&self) -> Result<(MediaSourceStream, Hint)> {
        match self {
            ByteSource::File(path) => {
                let file = File::open(path).map_err(|e| {
                    Error::Stream(format!("Failed to open {}: {}", path.display(), e))
                })?;
                let mut hint = Hint::new();
                if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    hint.with_extension(ext);
                }
                let mss = MediaSourceStream::new(Box::new(file), Default::default());
                Ok((mss, hint))
            }
            ByteSource::Memory(bytes) => {
                let source = MemorySource::new(Arc::clone(bytes));
                let mss = MediaSourceStream::new(Box::new(source), Default::default());
                Ok((mss, Hint::new()))
            }
        }
    }

    /// Human-readable description for diagnostics
    pub fn describe(&self) -> String {
        match self {
            ByteSource::File(path) => path.display().to_string(),
            ByteSource::Memory(bytes) => format!("{}-byte memory buffer", bytes.len()),
        }
    }
}

/// Seekable media source over a shared byte buffer
///
/// The buffer is reference-counted, so the decoder holds it alive for as
/// long as decoding may still read from it, independent of the owning
/// `Music` or `Sound` value.
struct MemorySource {
    cursor: Cursor<Arc<[u8]>>,
}

impl MemorySource {
    fn new(bytes: Arc<[u8]>) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }
}

impl std::io::Read for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl std::io::Seek for MemorySource {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl MediaSource for MemorySource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.cursor.get_ref().len() as u64)
    }
}

/// Incremental audio decoder
///
/// Wraps a symphonia format reader and codec decoder for one audio track.
/// Each call to [`next_chunk`](Self::next_chunk) yields roughly one packet
/// of interleaved stereo f32 samples at the source sample rate.
pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
}

impl AudioDecoder {
    /// Probe a source and set up decoding for its first audio track
    ///
    /// Fails if the source cannot be opened, no supported audio track is
    /// found, or the codec cannot be instantiated. This is the load-time
    /// validation gate: a source that opens here is playable.
    pub fn open(source: &ByteSource) -> Result<Self> {
        let (mss, hint) = source.open()?;

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                Error::Decode(format!(
                    "Failed to probe {}: {}",
                    source.describe(),
                    e
                ))
            })?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                Error::Decode(format!("No audio track found in {}", source.describe()))
            })?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
            Error::Decode(format!(
                "Missing sample rate in {}",
                source.describe()
            ))
        })?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                Error::Decode(format!(
                    "Unsupported codec in {}: {}",
                    source.describe(),
                    e
                ))
            })?;

        debug!(
            "Opened {} ({} Hz, track {})",
            source.describe(),
            sample_rate,
            track_id
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
        })
    }

    /// Source sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decode the next chunk of audio
    ///
    /// Returns `Ok(None)` at end of stream. Corrupt packets are skipped
    /// with a warning rather than aborting mid-track.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Packet read failed: {}", e)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let mut samples = Vec::new();
                    append_stereo(&decoded, &mut samples);
                    if samples.is_empty() {
                        continue;
                    }
                    return Ok(Some(samples));
                }
                Err(e) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
            }
        }
    }
}

/// Decode an entire source to interleaved stereo f32
///
/// Returns the samples and the source sample rate. A source that yields no
/// audio frames at all is treated as a load failure, so callers never end
/// up holding an unplayable clip.
pub fn decode_all(source: &ByteSource) -> Result<(Vec<f32>, u32)> {
    let mut decoder = AudioDecoder::open(source)?;
    let mut samples = Vec::new();

    while let Some(chunk) = decoder.next_chunk()? {
        samples.extend_from_slice(&chunk);
    }

    if samples.is_empty() {
        return Err(Error::Decode(format!(
            "No audio frames decoded from {}",
            source.describe()
        )));
    }

    debug!(
        "Decoded {}: {} frames at {} Hz",
        source.describe(),
        samples.len() / 2,
        decoder.sample_rate()
    );

    Ok((samples, decoder.sample_rate()))
}

/// Append a decoded buffer to `out` as interleaved stereo f32
///
/// Mono input is duplicated to both sides; layouts with more than two
/// channels are downmixed by averaging alternating channels into left
/// and right.
fn append_stereo(decoded: &AudioBufferRef, out: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::U8(buf) => {
            push_frames(buf.as_ref(), |s: u8| (s as f32 - 128.0) / 128.0, out)
        }
        AudioBufferRef::U16(buf) => {
            push_frames(buf.as_ref(), |s: u16| (s as f32 - 32768.0) / 32768.0, out)
        }
        AudioBufferRef::U24(buf) => push_frames(
            buf.as_ref(),
            |s| (s.inner() as f32 - 8_388_608.0) / 8_388_608.0,
            out,
        ),
        AudioBufferRef::U32(buf) => push_frames(
            buf.as_ref(),
            |s: u32| ((s as f64 - 2_147_483_648.0) / 2_147_483_648.0) as f32,
            out,
        ),
        AudioBufferRef::S8(buf) => push_frames(buf.as_ref(), |s: i8| s as f32 / 128.0, out),
        AudioBufferRef::S16(buf) => push_frames(buf.as_ref(), |s: i16| s as f32 / 32768.0, out),
        AudioBufferRef::S24(buf) => {
            push_frames(buf.as_ref(), |s| s.inner() as f32 / 8_388_608.0, out)
        }
        AudioBufferRef::S32(buf) => {
            push_frames(buf.as_ref(), |s: i32| (s as f64 / 2_147_483_648.0) as f32, out)
        }
        AudioBufferRef::F32(buf) => push_frames(buf.as_ref(), |s: f32| s, out),
        AudioBufferRef::F64(buf) => push_frames(buf.as_ref(), |s: f64| s as f32, out),
    }
}

fn push_frames<S, F>(buf: &AudioBuffer<S>, convert: F, out: &mut Vec<f32>)
where
    S: Sample,
    F: Fn(S) -> f32,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    out.reserve(frames * 2);

    match channels {
        0 => {}
        1 => {
            let ch = buf.chan(0);
            for &sample in ch.iter().take(frames) {
                let s = convert(sample);
                out.push(s);
                out.push(s);
            }
        }
        2 => {
            let left = buf.chan(0);
            let right = buf.chan(1);
            for i in 0..frames {
                out.push(convert(left[i]));
                out.push(convert(right[i]));
            }
        }
        n => {
            // Downmix: even channels to the left, odd to the right
            let half = (n as f32 / 2.0).max(1.0);
            for i in 0..frames {
                let mut left = 0.0;
                let mut right = 0.0;
                for c in 0..n {
                    let s = convert(buf.chan(c)[i]);
                    if c % 2 == 0 {
                        left += s;
                    } else {
                        right += s;
                    }
                }
                out.push(left / half);
                out.push(right / half);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, sample_rate: u32, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let phase = i as f32 * 2.0 * std::f32::consts::PI * 440.0 / sample_rate as f32;
                let value = (phase.sin() * 0.5 * i16::MAX as f32) as i16;
                for _ in 0..channels {
                    writer.write_sample(value).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn memory_source(bytes: Vec<u8>) -> ByteSource {
        ByteSource::Memory(Arc::from(bytes))
    }

    #[test]
    fn test_decode_stereo_wav() {
        let source = memory_source(wav_bytes(2, 44100, 1000));
        let (samples, rate) = decode_all(&source).unwrap();
        assert_eq!(rate, 44100);
        assert_eq!(samples.len(), 2000);
    }

    #[test]
    fn test_decode_mono_duplicates_channels() {
        let source = memory_source(wav_bytes(1, 22050, 500));
        let (samples, rate) = decode_all(&source).unwrap();
        assert_eq!(rate, 22050);
        assert_eq!(samples.len(), 1000);
        for frame in samples.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        let source = memory_source(b"definitely not an audio container".to_vec());
        assert!(decode_all(&source).is_err());
    }

    #[test]
    fn test_decode_empty_buffer_fails() {
        let source = memory_source(Vec::new());
        assert!(decode_all(&source).is_err());
    }

    #[test]
    fn test_decode_zero_frame_wav_fails() {
        // Header only: the container opens but holds no audio
        let source = memory_source(wav_bytes(2, 44100, 0));
        assert!(AudioDecoder::open(&source).is_ok());
        match decode_all(&source) {
            Err(Error::Decode(_)) => {}
            other => panic!("expected decode error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_open_missing_file_is_stream_error() {
        let source = ByteSource::File(PathBuf::from("/nonexistent/clip.wav"));
        match AudioDecoder::open(&source) {
            Err(Error::Stream(_)) => {}
            other => panic!("expected stream error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_incremental_decode_matches_full_decode() {
        let bytes = wav_bytes(2, 44100, 2048);
        let source = memory_source(bytes);

        let (full, _) = decode_all(&source).unwrap();

        let mut decoder = AudioDecoder::open(&source).unwrap();
        let mut streamed = Vec::new();
        while let Some(chunk) = decoder.next_chunk().unwrap() {
            streamed.extend_from_slice(&chunk);
        }

        assert_eq!(full, streamed);
    }

    #[test]
    fn test_truncated_wav_header_fails() {
        let mut bytes = wav_bytes(2, 44100, 1000);
        bytes.truncate(20);
        let source = memory_source(bytes);
        assert!(AudioDecoder::open(&source).is_err());
    }

    #[test]
    fn test_describe_memory_source() {
        let source = memory_source(vec![0u8; 16]);
        assert_eq!(source.describe(), "16-byte memory buffer");
    }

    #[test]
    fn test_decode_8bit_wav() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..200i32 {
                writer.write_sample(((i % 64) - 32) as i8).unwrap();
            }
            writer.finalize().unwrap();
        }

        let source = memory_source(cursor.into_inner());
        let (samples, rate) = decode_all(&source).unwrap();
        assert_eq!(rate, 8000);
        assert_eq!(samples.len(), 400);
        assert!(samples.iter().all(|s| s.abs() <= 1.0));
    }
}
