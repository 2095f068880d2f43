//! # Foley
//!
//! Channel-based sound effect and music playback.
//!
//! Two playback types cover the usual game-audio split:
//!
//! - [`Sound`]: short effects, fully decoded at load, played on any of a
//!   table of mixing channels with per-channel stereo panning
//! - [`Music`]: one long track at a time, streamed from its source while
//!   it plays, with its own volume control
//!
//! A [`Mixer`] owns the output device and everything behind it. Decoding
//! is handled by symphonia, sample rate conversion by rubato, and device
//! output by cpal; the mixer itself only keeps the channel table, sums
//! frames, applies gains, and hard-limits the result.
//!
//! ```ignore
//! use foley::{Loops, Mixer, MixerConfig, Music, Sound};
//!
//! let mixer = Mixer::open(MixerConfig::default())?;
//!
//! let click = Sound::read(&mixer, "click.wav")?;
//! let channel = click.play(None, Loops::Once)?;
//! mixer.set_panning(channel, 255, 128)?;
//!
//! let theme = Music::read(&mixer, "theme.ogg")?;
//! theme.play(Loops::Forever)?;
//! mixer.set_music_volume(96);
//! ```
//!
//! Tests and headless tools can run the whole pipeline without audio
//! hardware by opening the mixer with a
//! [`CaptureOutput`](audio::output::CaptureOutput) and pulling mixed
//! frames through its handle.

pub mod audio;
pub mod config;
pub mod error;
pub mod mixer;
pub mod music;
pub mod sound;

pub use audio::types::{DeviceSpec, SampleEncoding};
pub use config::MixerConfig;
pub use error::{Error, Result};
pub use mixer::{Loops, Mixer, MAX_VOLUME};
pub use music::Music;
pub use sound::Sound;
