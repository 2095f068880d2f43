//! Streamed music tracks

use crate::audio::decode::{AudioDecoder, ByteSource};
use crate::error::{Error, Result};
use crate::mixer::{Loops, Mixer, MixerShared};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A music track, streamed from its source during playback
///
/// Opening a track decodes just far enough to prove it contains audio;
/// the rest is decoded incrementally on a worker thread while the track
/// plays. A track created from bytes shares ownership of the buffer with
/// playback, so the bytes stay alive for as long as anything may still
/// read them.
pub struct Music {
    shared: Arc<MixerShared>,
    source: ByteSource,
}

impl Music {
    /// Open a music track from a file
    ///
    /// The file is re-read while the track plays, and once per repeat
    /// when looping.
    pub fn read<P: AsRef<Path>>(mixer: &Mixer, path: P) -> Result<Self> {
        Self::load(mixer, ByteSource::File(path.as_ref().to_path_buf()))
    }

    /// Open a music track from encoded bytes
    ///
    /// The track takes ownership of the bytes; playback streams from the
    /// same shared buffer without copying it.
    pub fn from_bytes(mixer: &Mixer, bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Self::load(mixer, ByteSource::Memory(Arc::from(bytes.into())))
    }

    fn load(mixer: &Mixer, source: ByteSource) -> Result<Self> {
        // Decode one chunk now so an unreadable or frameless source
        // fails at open, not at play
        let mut decoder = AudioDecoder::open(&source)?;
        if decoder.next_chunk()?.is_none() {
            return Err(Error::Decode(format!(
                "No audio frames decoded from {}",
                source.describe()
            )));
        }
        debug!(
            "Opened music {} ({} Hz)",
            source.describe(),
            decoder.sample_rate()
        );

        Ok(Self {
            shared: Arc::clone(mixer.shared()),
            source,
        })
    }

    /// Start playback
    ///
    /// There is one music slot per mixer: starting a track stops whatever
    /// was playing before it. Use
    /// [`set_music_volume`](crate::Mixer::set_music_volume) on the mixer
    /// to control its level.
    pub fn play(&self, loops: Loops) -> Result<()> {
        self.shared.play_music(self.source.clone(), loops)
    }
}
