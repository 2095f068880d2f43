//! Shared fixtures and helpers for integration tests
#![allow(dead_code)]

use foley::audio::output::{CaptureHandle, CaptureOutput};
use foley::Mixer;
use std::io::Cursor;
use std::path::PathBuf;

/// In-memory stereo WAV containing a 440 Hz sine tone
pub fn sine_wav(sample_rate: u32, frames: usize, amplitude: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            let phase = i as f32 * 2.0 * std::f32::consts::PI * 440.0 / sample_rate as f32;
            let value = (phase.sin() * amplitude * i16::MAX as f32) as i16;
            writer.write_sample(value).unwrap();
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// In-memory stereo WAV of silence
pub fn silent_wav(sample_rate: u32, frames: usize) -> Vec<u8> {
    sine_wav(sample_rate, frames, 0.0)
}

/// Write fixture bytes under a temp dir, returning the path
pub fn write_fixture(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Mixer over a capture output at 44100 Hz
pub fn capture_mixer() -> (Mixer, CaptureHandle) {
    capture_mixer_at(44100)
}

/// Mixer over a capture output at the given sample rate
pub fn capture_mixer_at(frequency: u32) -> (Mixer, CaptureHandle) {
    let (output, handle) = CaptureOutput::stereo(frequency);
    let mixer = Mixer::open_with_output(Box::new(output)).unwrap();
    (mixer, handle)
}

/// Root-mean-square level of interleaved samples
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Index of the last frame with amplitude above the threshold
pub fn last_audible_frame(samples: &[f32], threshold: f32) -> Option<usize> {
    samples
        .chunks_exact(2)
        .enumerate()
        .filter(|(_, frame)| frame[0].abs() > threshold || frame[1].abs() > threshold)
        .map(|(i, _)| i)
        .last()
}
