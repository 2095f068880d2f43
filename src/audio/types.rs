//! Core audio data types
//!
//! All decoded audio in this crate is normalized to interleaved stereo f32
//! samples at the output device sample rate. The types here carry that
//! normalized form between the decoder, the mixer, and the output device.

use std::fmt;
use std::sync::Arc;

/// A single stereo audio frame (sample pair)
///
/// Samples are f32 in the range [-1.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFrame {
    /// Left channel sample
    pub left: f32,
    /// Right channel sample
    pub right: f32,
}

impl AudioFrame {
    /// Create a silent frame
    pub fn zero() -> Self {
        Self {
            left: 0.0,
            right: 0.0,
        }
    }

    /// Create a frame from left/right samples
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Scale each side by an independent gain
    ///
    /// Used for stereo panning, where the left and right attenuation
    /// levels are set separately.
    pub fn scaled(&self, left_gain: f32, right_gain: f32) -> Self {
        Self {
            left: self.left * left_gain,
            right: self.right * right_gain,
        }
    }

    /// Add another frame (mixing)
    pub fn add(&mut self, other: &AudioFrame) {
        self.left += other.left;
        self.right += other.right;
    }

    /// Clamp both samples to the valid [-1.0, 1.0] range
    ///
    /// Applied after summing channels so that loud overlapping sounds
    /// hard-limit instead of wrapping when converted to integer formats.
    pub fn clamp(&mut self) {
        self.left = self.left.clamp(-1.0, 1.0);
        self.right = self.right.clamp(-1.0, 1.0);
    }
}

/// Fully decoded audio clip
///
/// Samples are interleaved stereo f32 at a fixed sample rate. Shared between
/// the owning [`Sound`](crate::Sound) and any channels currently playing it
/// via `Arc`, so dropping the owner never invalidates in-flight playback.
#[derive(Debug)]
pub struct SampleBuffer {
    /// Interleaved stereo samples (left, right, left, right, ...)
    samples: Vec<f32>,
    /// Sample rate in Hz
    sample_rate: u32,
}

impl SampleBuffer {
    /// Create a buffer from interleaved stereo samples
    ///
    /// A trailing unpaired sample is dropped so the buffer always holds
    /// whole frames.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32) -> Self {
        if samples.len() % 2 != 0 {
            samples.pop();
        }
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of stereo frames in the buffer
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the frame at a position, or None past the end
    pub fn frame(&self, position: usize) -> Option<AudioFrame> {
        let idx = position * 2;
        if idx + 1 < self.samples.len() {
            Some(AudioFrame::new(self.samples[idx], self.samples[idx + 1]))
        } else {
            None
        }
    }

    /// Raw interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames() as u64 * 1000) / self.sample_rate as u64
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Shared handle to a decoded clip
pub type SharedSamples = Arc<SampleBuffer>;

/// Sample encoding negotiated with the output device
///
/// Recorded for diagnostics after the device is opened; the requested
/// encoding is always f32 but a device may only offer integer formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// Unsigned 8-bit
    U8,
    /// Signed 8-bit
    S8,
    /// Unsigned 16-bit, native endian
    U16,
    /// Signed 16-bit, native endian
    S16,
    /// Signed 32-bit, native endian
    S32,
    /// 32-bit float, native endian
    F32,
}

impl SampleEncoding {
    /// Map a backend sample format to an encoding name
    ///
    /// Returns None for formats the mixer cannot render to.
    pub fn from_cpal(format: cpal::SampleFormat) -> Option<Self> {
        match format {
            cpal::SampleFormat::U8 => Some(Self::U8),
            cpal::SampleFormat::I8 => Some(Self::S8),
            cpal::SampleFormat::U16 => Some(Self::U16),
            cpal::SampleFormat::I16 => Some(Self::S16),
            cpal::SampleFormat::I32 => Some(Self::S32),
            cpal::SampleFormat::F32 => Some(Self::F32),
            _ => None,
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = if cfg!(target_endian = "little") {
            "LSB"
        } else {
            "MSB"
        };
        match self {
            Self::U8 => write!(f, "U8"),
            Self::S8 => write!(f, "S8"),
            Self::U16 => write!(f, "U16{suffix}"),
            Self::S16 => write!(f, "S16{suffix}"),
            Self::S32 => write!(f, "S32{suffix}"),
            Self::F32 => write!(f, "F32"),
        }
    }
}

/// Negotiated output device parameters
///
/// The device may not honor the requested frequency or channel count;
/// this records what was actually obtained, the way a caller would query
/// the opened device for its effective spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Output sample rate in Hz
    pub frequency: u32,
    /// Output channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Sample encoding the device consumes
    pub encoding: SampleEncoding,
    /// Requested buffer size in frames
    pub buffer_frames: u32,
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}, {} frame buffer",
            self.frequency, self.channels, self.encoding, self.buffer_frames
        )
    }
}
