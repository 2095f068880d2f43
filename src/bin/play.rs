//! Command-line playback tool
//!
//! Loads an audio file as a sound effect (or streams it as music) and
//! plays it through the configured output device. Device settings come
//! from an optional TOML config file, with command-line flags taking
//! precedence over it.

use anyhow::{Context, Result};
use clap::Parser;
use foley::audio::output::CpalOutput;
use foley::{Loops, Mixer, MixerConfig, Music, Sound};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "foley-play")]
#[command(about = "Play an audio file through the mixer")]
struct Args {
    /// Audio file to play (WAV, FLAC, MP3, OGG Vorbis)
    #[arg(required_unless_present = "list_devices")]
    file: Option<PathBuf>,

    /// Stream the file as music instead of loading it fully
    #[arg(short, long)]
    music: bool,

    /// Loop count: 0 plays once, N adds N repeats, -1 repeats forever
    #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
    loops: i32,

    /// Mixer configuration file (TOML)
    #[arg(short, long, env = "FOLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Output sample rate in Hz (overrides the config file)
    #[arg(long, env = "FOLEY_FREQUENCY")]
    frequency: Option<u32>,

    /// Device buffer size in frames (overrides the config file)
    #[arg(long)]
    buffer: Option<u32>,

    /// Output device name (overrides the config file)
    #[arg(short, long, env = "FOLEY_DEVICE")]
    device: Option<String>,

    /// Music volume, 0-128
    #[arg(short, long, default_value_t = 128)]
    volume: u8,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "foley=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.list_devices {
        for name in CpalOutput::list_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = resolve_config(&args)?;
    let file = args.file.context("No file given")?;

    let mixer = Mixer::open(config).context("Failed to open audio output")?;
    info!("Output: {}", mixer.spec());

    let loops = Loops::from_raw(args.loops);

    if args.music {
        let track = Music::read(&mixer, &file)
            .with_context(|| format!("Failed to open {}", file.display()))?;
        mixer.set_music_volume(args.volume);
        track.play(loops).context("Failed to start music")?;
        info!("Streaming {} (volume {})", file.display(), mixer.music_volume());

        while mixer.is_music_playing() {
            std::thread::sleep(Duration::from_millis(50));
        }
    } else {
        let sound = Sound::read(&mixer, &file)
            .with_context(|| format!("Failed to load {}", file.display()))?;
        let channel = sound
            .play(None, loops)
            .context("Failed to start playback")?;
        info!(
            "Playing {} on channel {} ({} ms)",
            file.display(),
            channel,
            sound.duration_ms()
        );

        while mixer.is_playing(channel)? {
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    // Let the device drain its final buffer before tearing down
    std::thread::sleep(Duration::from_millis(100));
    mixer.close()?;
    info!("Done");
    Ok(())
}

/// Device settings: the config file (or defaults) with any flags applied
/// on top
fn resolve_config(args: &Args) -> Result<MixerConfig> {
    let mut config = match &args.config {
        Some(path) => MixerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => MixerConfig::default(),
    };
    if let Some(frequency) = args.frequency {
        config.frequency = frequency;
    }
    if let Some(buffer) = args.buffer {
        config.buffer_frames = buffer;
    }
    if let Some(device) = &args.device {
        config.device = Some(device.clone());
    }
    Ok(config)
}
