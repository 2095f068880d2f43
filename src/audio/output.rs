//! Audio output via cpal
//!
//! [`OutputDevice`] is the seam between the mixer and the platform: the
//! mixer hands an implementation a render callback that fills interleaved
//! stereo f32 frames, and the implementation drives it from whatever clock
//! it has. [`CpalOutput`] is the real hardware-backed device;
//! [`CaptureOutput`] pulls frames on demand for tests and headless use.

use crate::audio::types::{DeviceSpec, SampleEncoding};
use crate::config::MixerConfig;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedBufferSize,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Callback that fills a buffer of interleaved stereo f32 frames
///
/// The callback must write every sample of the slice it is given; the
/// slice length is always an even number of samples.
pub type RenderFn = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Destination for mixed audio
///
/// Implementations convert the stereo f32 frames produced by the render
/// callback into whatever layout and sample format the backend consumes.
/// The device is driven from the thread that owns it; only the render
/// callback itself must be `Send`.
pub trait OutputDevice {
    /// Negotiated device parameters
    fn spec(&self) -> DeviceSpec;

    /// Begin pulling audio through the render callback
    fn start(&mut self, render: RenderFn) -> Result<()>;

    /// Stop pulling audio and release the stream
    fn stop(&mut self) -> Result<()>;

    /// True if the backend has reported a stream error since starting
    fn has_error(&self) -> bool;
}

/// Hardware audio output backed by cpal
///
/// Opens the requested device (or the system default), negotiates the
/// closest supported stream configuration to the requested frequency and
/// channel count, and records what was actually obtained in its spec.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    spec: DeviceSpec,
    stream: Option<Stream>,
    error_flag: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open an output device for the given configuration
    ///
    /// A named device that cannot be found falls back to the system
    /// default with a warning. Fails only when no usable device or
    /// stream configuration exists at all.
    pub fn open(config: &MixerConfig) -> Result<Self> {
        let device = Self::get_device(config.device.as_deref())?;
        let supported = Self::pick_config(&device, config.frequency, config.channels)?;

        let sample_format = supported.sample_format();
        let encoding = SampleEncoding::from_cpal(sample_format).ok_or_else(|| {
            Error::AudioOutput(format!(
                "Device sample format {:?} is not supported",
                sample_format
            ))
        })?;

        let buffer_frames = match supported.buffer_size() {
            SupportedBufferSize::Range { min, max } => config.buffer_frames.clamp(*min, *max),
            SupportedBufferSize::Unknown => config.buffer_frames,
        };

        let stream_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: BufferSize::Fixed(buffer_frames),
        };

        let spec = DeviceSpec {
            frequency: stream_config.sample_rate.0,
            channels: stream_config.channels,
            encoding,
            buffer_frames,
        };

        info!("Audio output ready: {}", spec);

        Ok(Self {
            device,
            config: stream_config,
            sample_format,
            spec,
            stream: None,
            error_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// List the names of all available output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn get_device(name: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();

        let device = match name {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    Error::AudioOutput(format!("Failed to enumerate devices: {}", e))
                })?;
                match devices.find(|d| d.name().map(|n| n == name).unwrap_or(false)) {
                    Some(device) => device,
                    None => {
                        warn!("Audio device '{}' not found, using default", name);
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput("No default output device available".to_string())
                        })?
                    }
                }
            }
            None => host.default_output_device().ok_or_else(|| {
                Error::AudioOutput("No default output device available".to_string())
            })?,
        };

        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        Ok(device)
    }

    /// Pick the supported configuration closest to the request
    ///
    /// Prefers an exact frequency and channel match in f32, then the
    /// integer formats, and finally falls back to whatever the device
    /// calls its default.
    fn pick_config(
        device: &Device,
        frequency: u32,
        channels: u16,
    ) -> Result<cpal::SupportedStreamConfig> {
        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to query device configs: {}", e)))?
            .collect();

        for format in [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16] {
            if let Some(range) = supported.iter().find(|c| {
                c.sample_format() == format
                    && c.channels() == channels
                    && c.min_sample_rate().0 <= frequency
                    && c.max_sample_rate().0 >= frequency
            }) {
                return Ok(range.clone().with_sample_rate(SampleRate(frequency)));
            }
        }

        let default = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to query default config: {}", e)))?;

        warn!(
            "Requested {} Hz / {} ch not supported, using device default: {} Hz / {} ch ({:?})",
            frequency,
            channels,
            default.sample_rate().0,
            default.channels(),
            default.sample_format()
        );

        Ok(default)
    }

    fn build_stream<T>(&mut self, mut render: RenderFn, convert: fn(f32) -> T) -> Result<()>
    where
        T: cpal::SizedSample + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let error_flag = Arc::clone(&self.error_flag);
        let mut scratch: Vec<f32> = Vec::new();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels.max(1);
                    scratch.resize(frames * 2, 0.0);
                    render(&mut scratch);
                    write_device_frames(data, &scratch, channels, convert);
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start output stream: {}", e)))?;

        self.stream = Some(stream);
        info!("Audio stream started ({:?})", self.sample_format);
        Ok(())
    }
}

impl OutputDevice for CpalOutput {
    fn spec(&self) -> DeviceSpec {
        self.spec
    }

    fn start(&mut self, render: RenderFn) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::InvalidState(
                "Output stream already started".to_string(),
            ));
        }

        match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(render, |s| s),
            SampleFormat::I16 => {
                self.build_stream::<i16>(render, |s| (s * i16::MAX as f32) as i16)
            }
            SampleFormat::U16 => {
                self.build_stream::<u16>(render, |s| ((s + 1.0) * 32767.5) as u16)
            }
            other => Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            ))),
        }
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
            debug!("Audio stream stopped");
        }
        Ok(())
    }

    fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::Relaxed)
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Map stereo frames onto the device channel layout
///
/// Mono devices get the average of both sides; devices with more than two
/// channels get silence on the extras.
fn write_device_frames<T: Copy>(
    data: &mut [T],
    stereo: &[f32],
    channels: usize,
    convert: fn(f32) -> T,
) {
    if channels == 0 {
        return;
    }
    for (i, frame) in data.chunks_mut(channels).enumerate() {
        let left = stereo.get(i * 2).copied().unwrap_or(0.0);
        let right = stereo.get(i * 2 + 1).copied().unwrap_or(0.0);
        if frame.len() == 1 {
            frame[0] = convert((left + right) * 0.5);
        } else {
            frame[0] = convert(left);
            frame[1] = convert(right);
            for extra in frame.iter_mut().skip(2) {
                *extra = convert(0.0);
            }
        }
    }
}

/// Output backend that renders only when asked
///
/// Holds the render callback and exposes it through a [`CaptureHandle`],
/// so tests and offline tools can pull exact numbers of frames and inspect
/// the mixed samples without any audio hardware.
pub struct CaptureOutput {
    spec: DeviceSpec,
    shared: Arc<CaptureShared>,
    fail_start: bool,
}

struct CaptureShared {
    render: Mutex<Option<RenderFn>>,
    started: AtomicBool,
}

/// Pull-side handle to a [`CaptureOutput`]
pub struct CaptureHandle {
    shared: Arc<CaptureShared>,
}

impl CaptureOutput {
    /// Create a stereo f32 capture device at the given sample rate
    pub fn stereo(frequency: u32) -> (Self, CaptureHandle) {
        Self::with_spec(DeviceSpec {
            frequency,
            channels: 2,
            encoding: SampleEncoding::F32,
            buffer_frames: 1024,
        })
    }

    /// Create a capture device with an explicit spec
    pub fn with_spec(spec: DeviceSpec) -> (Self, CaptureHandle) {
        let shared = Arc::new(CaptureShared {
            render: Mutex::new(None),
            started: AtomicBool::new(false),
        });
        let handle = CaptureHandle {
            shared: Arc::clone(&shared),
        };
        (
            Self {
                spec,
                shared,
                fail_start: false,
            },
            handle,
        )
    }

    /// Create a capture device whose start always fails
    ///
    /// Stands in for hardware that cannot be opened.
    pub fn failing(frequency: u32) -> (Self, CaptureHandle) {
        let (mut output, handle) = Self::stereo(frequency);
        output.fail_start = true;
        (output, handle)
    }
}

impl OutputDevice for CaptureOutput {
    fn spec(&self) -> DeviceSpec {
        self.spec
    }

    fn start(&mut self, render: RenderFn) -> Result<()> {
        if self.fail_start {
            return Err(Error::AudioOutput(
                "Simulated device start failure".to_string(),
            ));
        }
        *self.shared.render.lock().unwrap() = Some(render);
        self.shared.started.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.shared.started.store(false, Ordering::Relaxed);
        *self.shared.render.lock().unwrap() = None;
        Ok(())
    }

    fn has_error(&self) -> bool {
        false
    }
}

impl CaptureHandle {
    /// True while the owning output has been started and not stopped
    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::Relaxed)
    }

    /// Pull a number of stereo frames through the render callback
    ///
    /// Returns interleaved samples. After the output is stopped this
    /// returns silence.
    pub fn render_frames(&self, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0f32; frames * 2];
        if let Some(render) = self.shared.render.lock().unwrap().as_mut() {
            render(&mut buffer);
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_output_renders_on_demand() {
        let (mut output, handle) = CaptureOutput::stereo(44100);
        assert!(!handle.is_started());

        output
            .start(Box::new(|buf: &mut [f32]| {
                for sample in buf.iter_mut() {
                    *sample = 0.25;
                }
            }))
            .unwrap();

        assert!(handle.is_started());
        let frames = handle.render_frames(16);
        assert_eq!(frames.len(), 32);
        assert!(frames.iter().all(|&s| s == 0.25));

        output.stop().unwrap();
        assert!(!handle.is_started());
        let silent = handle.render_frames(4);
        assert!(silent.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_failing_capture_output() {
        let (mut output, _handle) = CaptureOutput::failing(44100);
        let result = output.start(Box::new(|_buf: &mut [f32]| {}));
        assert!(matches!(result, Err(Error::AudioOutput(_))));
    }

    #[test]
    fn test_write_device_frames_stereo() {
        let stereo = vec![0.5, -0.5, 0.25, -0.25];
        let mut data = vec![0.0f32; 4];
        write_device_frames(&mut data, &stereo, 2, |s| s);
        assert_eq!(data, vec![0.5, -0.5, 0.25, -0.25]);
    }

    #[test]
    fn test_write_device_frames_mono_averages() {
        let stereo = vec![0.5, -0.5, 1.0, 0.0];
        let mut data = vec![0.0f32; 2];
        write_device_frames(&mut data, &stereo, 1, |s| s);
        assert_eq!(data, vec![0.0, 0.5]);
    }

    #[test]
    fn test_write_device_frames_extra_channels_silent() {
        let stereo = vec![0.5, -0.5];
        let mut data = vec![9.0f32; 4];
        write_device_frames(&mut data, &stereo, 4, |s| s);
        assert_eq!(data, vec![0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_i16_conversion() {
        let stereo = vec![1.0, -1.0];
        let mut data = vec![0i16; 2];
        write_device_frames(&mut data, &stereo, 2, |s| (s * i16::MAX as f32) as i16);
        assert_eq!(data[0], i16::MAX);
        assert_eq!(data[1], -i16::MAX);
    }

    #[test]
    fn test_u16_conversion_midpoint() {
        let stereo = vec![0.0, 0.0];
        let mut data = vec![0u16; 2];
        write_device_frames(&mut data, &stereo, 2, |s| ((s + 1.0) * 32767.5) as u16);
        assert_eq!(data[0], 32767);
        assert_eq!(data[1], 32767);
    }
}
