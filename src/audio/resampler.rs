//! Sample rate conversion using rubato
//!
//! Decoded audio is converted to the output device rate before it reaches
//! the mixer. Sound effects are converted in one shot at load time;
//! streamed music is converted chunk by chunk as it is decoded.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Input chunk size for streaming conversion, in frames
const STREAM_CHUNK_FRAMES: usize = 1024;

/// One-shot sample rate converter for fully loaded clips
pub struct Resampler;

impl Resampler {
    /// Resample interleaved stereo audio from one rate to another
    ///
    /// Returns the input unchanged when the rates already match.
    pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
        if from_rate == to_rate {
            return Ok(input.to_vec());
        }
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let input_frames = input.len() / 2;
        debug!(
            "Resampling {} frames from {} Hz to {} Hz",
            input_frames, from_rate, to_rate
        );

        let mut resampler = FastFixedIn::<f32>::new(
            to_rate as f64 / from_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            2,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

        let planar_input = deinterleave(input);
        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        Ok(interleave(&planar_output))
    }
}

/// Chunked sample rate converter for streamed audio
///
/// Accumulates interleaved stereo input and converts it in fixed-size
/// chunks, carrying filter state across calls so chunk boundaries do not
/// produce artifacts. Call [`finish`](Self::finish) once at end of stream
/// to flush the final partial chunk.
pub struct StreamResampler {
    inner: FastFixedIn<f32>,
    ratio: f64,
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Create a converter between two rates
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let ratio = to_rate as f64 / from_rate as f64;
        let inner = FastFixedIn::<f32>::new(
            ratio,
            1.0,
            PolynomialDegree::Septic,
            STREAM_CHUNK_FRAMES,
            2,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

        Ok(Self {
            inner,
            ratio,
            pending: Vec::new(),
        })
    }

    /// Feed interleaved stereo input, returning whatever output is ready
    ///
    /// Input shorter than the internal chunk size is buffered until enough
    /// has accumulated.
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let chunk_len = STREAM_CHUNK_FRAMES * 2;
        let mut output = Vec::new();

        while self.pending.len() >= chunk_len {
            let planar = deinterleave(&self.pending[..chunk_len]);
            let converted = self
                .inner
                .process(&planar, None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            output.extend_from_slice(&interleave(&converted));
            self.pending.drain(..chunk_len);
        }

        Ok(output)
    }

    /// Flush any buffered input shorter than a full chunk
    ///
    /// The converter pads the partial chunk with zeros internally, so the
    /// output is cut back to the frames that correspond to real input.
    pub fn finish(&mut self) -> Result<Vec<f32>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let input_frames = self.pending.len() / 2;
        let planar = deinterleave(&self.pending);
        self.pending.clear();
        let converted = self
            .inner
            .process_partial(Some(&planar), None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        let mut output = interleave(&converted);
        let real_frames = (input_frames as f64 * self.ratio).round() as usize;
        output.truncate(real_frames * 2);
        Ok(output)
    }
}

/// Split interleaved stereo samples into per-channel vectors
fn deinterleave(input: &[f32]) -> Vec<Vec<f32>> {
    let frames = input.len() / 2;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);

    for frame in input.chunks_exact(2) {
        left.push(frame[0]);
        right.push(frame[1]);
    }

    vec![left, right]
}

/// Merge per-channel vectors back into interleaved stereo
fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    if planar.len() < 2 {
        return Vec::new();
    }

    let frames = planar[0].len().min(planar[1].len());
    let mut output = Vec::with_capacity(frames * 2);

    for i in 0..frames {
        output.push(planar[0][i]);
        output.push(planar[1][i]);
    }

    output
}
