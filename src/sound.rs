//! Fully loaded sound effects

use crate::audio::decode::{self, ByteSource};
use crate::audio::resampler::Resampler;
use crate::audio::types::{SampleBuffer, SharedSamples};
use crate::error::Result;
use crate::mixer::{Loops, Mixer, MixerShared};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A sound effect, decoded and resampled in full at load time
///
/// Loading pays the whole decode cost up front so playback is just an
/// index walk over samples. The samples sit behind an `Arc` shared with
/// any channel playing them, so dropping the `Sound` mid-play is safe;
/// the channel finishes on its own.
pub struct Sound {
    shared: Arc<MixerShared>,
    buffer: SharedSamples,
}

impl Sound {
    /// Load a sound effect from a file
    ///
    /// Fails if the file cannot be opened or does not decode.
    pub fn read<P: AsRef<Path>>(mixer: &Mixer, path: P) -> Result<Self> {
        Self::load(mixer, ByteSource::File(path.as_ref().to_path_buf()))
    }

    /// Load a sound effect from encoded bytes
    pub fn from_bytes(mixer: &Mixer, bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Self::load(mixer, ByteSource::Memory(Arc::from(bytes.into())))
    }

    fn load(mixer: &Mixer, source: ByteSource) -> Result<Self> {
        let (samples, source_rate) = decode::decode_all(&source)?;
        let device_rate = mixer.spec().frequency;
        let samples = Resampler::resample(&samples, source_rate, device_rate)?;
        let buffer = Arc::new(SampleBuffer::new(samples, device_rate));

        debug!(
            "Loaded {}: {} frames ({} ms)",
            source.describe(),
            buffer.frames(),
            buffer.duration_ms()
        );

        Ok(Self {
            shared: Arc::clone(mixer.shared()),
            buffer,
        })
    }

    /// Start playback, returning the channel used
    ///
    /// `None` picks the first idle channel and fails with
    /// [`NoFreeChannel`](crate::Error::NoFreeChannel) when every channel
    /// is busy. An explicit channel replaces whatever it was playing.
    pub fn play(&self, channel: Option<usize>, loops: Loops) -> Result<usize> {
        self.shared
            .play_sound(Arc::clone(&self.buffer), channel, loops)
    }

    /// Number of stereo frames in the clip
    pub fn frames(&self) -> usize {
        self.buffer.frames()
    }

    /// Clip length in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.buffer.duration_ms()
    }
}
