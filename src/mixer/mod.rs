//! The mixer service
//!
//! [`Mixer`] owns the output device and the mixing state behind it. Sounds
//! and music hold `Arc` handles to the shared state, so playback keeps
//! working while the device stream itself stays with the mixer. The render
//! callback, driven by the output device, sums the sound effect channels
//! and the music stream into each output buffer.

pub mod channels;
pub mod stream;

use crate::audio::decode::ByteSource;
use crate::audio::output::{CpalOutput, OutputDevice};
use crate::audio::types::{AudioFrame, DeviceSpec, SharedSamples};
use crate::config::MixerConfig;
use crate::error::{Error, Result};
use channels::{ChannelTable, DEFAULT_CHANNELS};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use stream::MusicStream;
use tracing::{debug, info};

/// Maximum music volume
pub const MAX_VOLUME: u8 = 128;

/// How many times a clip or track plays
///
/// `Extra(n)` plays once plus `n` repeats; `Forever` repeats until halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Loops {
    /// Play through a single time
    #[default]
    Once,
    /// Play once, then repeat this many more times
    Extra(u32),
    /// Repeat until halted
    Forever,
}

impl Loops {
    /// Interpret a raw loop count
    ///
    /// Negative repeats forever, zero plays once, positive adds that many
    /// repeats.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            r if r < 0 => Loops::Forever,
            0 => Loops::Once,
            n => Loops::Extra(n as u32),
        }
    }

    /// Remaining plays after the first; `None` means unbounded
    pub(crate) fn extra_plays(self) -> Option<u32> {
        match self {
            Loops::Once => Some(0),
            Loops::Extra(n) => Some(n),
            Loops::Forever => None,
        }
    }
}

/// State shared between the mixer, its sounds, and the render callback
pub(crate) struct MixerShared {
    spec: DeviceSpec,
    channels: Mutex<ChannelTable>,
    music: Mutex<Option<MusicStream>>,
    music_volume: AtomicU8,
    closed: AtomicBool,
}

impl MixerShared {
    fn new(spec: DeviceSpec) -> Self {
        Self {
            spec,
            channels: Mutex::new(ChannelTable::new(DEFAULT_CHANNELS)),
            music: Mutex::new(None),
            music_volume: AtomicU8::new(MAX_VOLUME),
            closed: AtomicBool::new(false),
        }
    }

    pub fn spec(&self) -> DeviceSpec {
        self.spec
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::InvalidState("Mixer is closed".to_string()));
        }
        Ok(())
    }

    pub fn play_sound(
        &self,
        buffer: SharedSamples,
        channel: Option<usize>,
        loops: Loops,
    ) -> Result<usize> {
        self.ensure_open()?;
        self.channels.lock().unwrap().play(buffer, channel, loops)
    }

    pub fn play_music(&self, source: ByteSource, loops: Loops) -> Result<()> {
        self.ensure_open()?;
        let stream = MusicStream::start(source, loops, self.spec.frequency)?;
        // At most one music track: replacing stops the previous one
        let old = self.music.lock().unwrap().replace(stream);
        drop(old);
        Ok(())
    }

    pub fn halt_music(&self) {
        let old = self.music.lock().unwrap().take();
        drop(old);
    }

    pub fn is_music_playing(&self) -> bool {
        let mut slot = self.music.lock().unwrap();
        let finished = match slot.as_ref() {
            Some(stream) => stream.is_finished(),
            None => return false,
        };
        if finished {
            *slot = None;
            return false;
        }
        true
    }

    pub fn set_music_volume(&self, volume: u8) -> u8 {
        let clamped = volume.min(MAX_VOLUME);
        self.music_volume.swap(clamped, Ordering::Relaxed)
    }

    pub fn music_volume(&self) -> u8 {
        self.music_volume.load(Ordering::Relaxed)
    }

    pub fn allocate_channels(&self, count: usize) -> usize {
        self.channels.lock().unwrap().allocate(count)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap().count()
    }

    pub fn set_panning(&self, channel: usize, left: u8, right: u8) -> Result<()> {
        self.channels.lock().unwrap().set_panning(channel, left, right)
    }

    pub fn halt(&self, channel: usize) -> Result<()> {
        self.channels.lock().unwrap().halt(channel)
    }

    pub fn halt_all(&self) {
        self.channels.lock().unwrap().halt_all();
    }

    pub fn is_playing(&self, channel: usize) -> Result<bool> {
        self.channels.lock().unwrap().is_playing(channel)
    }

    pub fn playing_count(&self) -> usize {
        self.channels.lock().unwrap().playing_count()
    }

    /// Fill an interleaved stereo buffer with the next mixed frames
    ///
    /// Sums every active channel and the music stream, applies the music
    /// volume, and hard-limits the result. A finished music stream is
    /// retired here, on the device clock.
    pub fn render(&self, out: &mut [f32]) {
        let mut channels = self.channels.lock().unwrap();
        let mut music = self.music.lock().unwrap();
        let music_gain = self.music_volume.load(Ordering::Relaxed) as f32 / MAX_VOLUME as f32;

        for frame_out in out.chunks_exact_mut(2) {
            let mut acc = AudioFrame::zero();

            let mut music_finished = false;
            if let Some(stream) = music.as_mut() {
                match stream.next_frame() {
                    Some(frame) => acc.add(&frame.scaled(music_gain, music_gain)),
                    None => music_finished = true,
                }
            }
            if music_finished {
                *music = None;
            }

            channels.mix_into(&mut acc);
            acc.clamp();

            frame_out[0] = acc.left;
            frame_out[1] = acc.right;
        }
    }

    /// Stop everything and reject further playback
    fn shut_down(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.channels.lock().unwrap().halt_all();
        self.halt_music();
    }
}

/// Handle to an opened audio device and its mixing state
///
/// Opening a mixer claims an output device and starts the stream; dropping
/// it (or calling [`close`](Self::close)) stops the stream and halts all
/// playback. Sounds and music created from a mixer stay valid after it is
/// gone but can no longer be heard.
///
/// # Example
///
/// ```ignore
/// let mixer = Mixer::open(MixerConfig::default())?;
/// let click = Sound::read(&mixer, "click.wav")?;
/// let channel = click.play(None, Loops::Once)?;
/// mixer.set_panning(channel, 255, 128)?;
/// ```
pub struct Mixer {
    shared: Arc<MixerShared>,
    output: Box<dyn OutputDevice>,
}

impl Mixer {
    /// Open the configured audio device and start mixing
    pub fn open(config: MixerConfig) -> Result<Self> {
        config.validate()?;
        let output = CpalOutput::open(&config)?;
        Self::open_with_output(Box::new(output))
    }

    /// Start mixing into a caller-provided output device
    ///
    /// This is how tests and headless tools run the mixer without audio
    /// hardware: hand in a
    /// [`CaptureOutput`](crate::audio::output::CaptureOutput) and pull
    /// mixed frames through its handle.
    pub fn open_with_output(mut output: Box<dyn OutputDevice>) -> Result<Self> {
        let spec = output.spec();
        let shared = Arc::new(MixerShared::new(spec));

        let render_shared = Arc::clone(&shared);
        output.start(Box::new(move |buffer: &mut [f32]| {
            render_shared.render(buffer);
        }))?;

        info!("Mixer open: {}", spec);
        Ok(Self { shared, output })
    }

    /// Negotiated output device parameters
    pub fn spec(&self) -> DeviceSpec {
        self.shared.spec()
    }

    /// Resize the sound effect channel table, returning the new count
    ///
    /// Shrinking halts playback on the channels that go away.
    pub fn allocate_channels(&self, count: usize) -> usize {
        self.shared.allocate_channels(count)
    }

    /// Number of sound effect channels currently allocated
    pub fn channel_count(&self) -> usize {
        self.shared.channel_count()
    }

    /// Set per-side attenuation for a channel
    ///
    /// 255 leaves a side untouched, 0 silences it; `(255, 255)` restores
    /// center. Panning is channel state and persists across plays.
    pub fn set_panning(&self, channel: usize, left: u8, right: u8) -> Result<()> {
        self.shared.set_panning(channel, left, right)
    }

    /// True while the channel has a clip on it
    pub fn is_playing(&self, channel: usize) -> Result<bool> {
        self.shared.is_playing(channel)
    }

    /// Number of channels currently playing
    pub fn playing_channels(&self) -> usize {
        self.shared.playing_count()
    }

    /// Stop playback on one channel
    pub fn halt(&self, channel: usize) -> Result<()> {
        self.shared.halt(channel)
    }

    /// Stop playback on every channel
    pub fn halt_all(&self) {
        self.shared.halt_all();
    }

    /// Set the music volume, returning the previous value
    ///
    /// Values above [`MAX_VOLUME`] are clamped. Takes effect immediately,
    /// including on a track already playing.
    pub fn set_music_volume(&self, volume: u8) -> u8 {
        self.shared.set_music_volume(volume)
    }

    /// Current music volume
    pub fn music_volume(&self) -> u8 {
        self.shared.music_volume()
    }

    /// True while a music track is playing
    pub fn is_music_playing(&self) -> bool {
        self.shared.is_music_playing()
    }

    /// Stop the music track, if any
    pub fn halt_music(&self) {
        self.shared.halt_music()
    }

    /// True if the output backend has reported a stream error
    pub fn has_output_error(&self) -> bool {
        self.output.has_error()
    }

    /// Stop all playback and release the output device
    ///
    /// Dropping the mixer does the same; `close` exists so stream
    /// shutdown errors can be observed.
    pub fn close(mut self) -> Result<()> {
        debug!("Closing mixer");
        self.shared.shut_down();
        self.output.stop()
    }

    pub(crate) fn shared(&self) -> &Arc<MixerShared> {
        &self.shared
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.shared.shut_down();
        let _ = self.output.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================
