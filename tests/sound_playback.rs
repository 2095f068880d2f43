//! Sound effect loading and channel playback
//!
//! Runs the full pipeline against a capture output: decode, resample,
//! channel mixing, panning, and lifetime behavior, with the mixed frames
//! pulled synchronously so every assertion is deterministic.

mod common;

use common::*;
use foley::{Error, Loops, Sound};

#[test]
fn load_from_bytes_and_play() {
    let (mixer, handle) = capture_mixer();
    let sound = Sound::from_bytes(&mixer, sine_wav(44100, 2205, 0.5)).unwrap();
    assert_eq!(sound.frames(), 2205);
    assert_eq!(sound.duration_ms(), 50);

    let channel = sound.play(None, Loops::Once).unwrap();
    assert_eq!(channel, 0);
    assert!(mixer.is_playing(channel).unwrap());

    let samples = handle.render_frames(2205);
    assert!(rms(&samples) > 0.1);
    assert!(!mixer.is_playing(channel).unwrap());
}

#[test]
fn load_from_file() {
    let (mixer, _handle) = capture_mixer();
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir, "clip.wav", &sine_wav(44100, 100, 0.5));

    let sound = Sound::read(&mixer, &path).unwrap();
    assert_eq!(sound.frames(), 100);
}

#[test]
fn missing_file_is_stream_error() {
    let (mixer, _handle) = capture_mixer();
    match Sound::read(&mixer, "/nonexistent/clip.wav") {
        Err(Error::Stream(_)) => {}
        other => panic!("expected stream error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn garbage_bytes_fail_to_load() {
    let (mixer, _handle) = capture_mixer();
    let result = Sound::from_bytes(&mixer, b"not audio data".to_vec());
    assert!(result.is_err());
}

#[test]
fn truncated_wav_fails_to_load() {
    let (mixer, _handle) = capture_mixer();
    let mut bytes = sine_wav(44100, 1000, 0.5);
    bytes.truncate(30);
    assert!(Sound::from_bytes(&mixer, bytes).is_err());
}

#[test]
fn zero_frame_wav_fails_to_load() {
    let (mixer, _handle) = capture_mixer();
    // Valid container, no samples
    match Sound::from_bytes(&mixer, sine_wav(44100, 0, 0.5)) {
        Err(Error::Decode(_)) => {}
        other => panic!("expected decode error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn silent_clip_loads_and_completes() {
    let (mixer, handle) = capture_mixer();
    let sound = Sound::from_bytes(&mixer, silent_wav(44100, 500)).unwrap();
    let channel = sound.play(None, Loops::Once).unwrap();

    let samples = handle.render_frames(600);
    assert_eq!(rms(&samples), 0.0);
    assert!(!mixer.is_playing(channel).unwrap());
}

#[test]
fn sound_is_resampled_to_device_rate() {
    let (mixer, _handle) = capture_mixer();
    let sound = Sound::from_bytes(&mixer, sine_wav(22050, 1000, 0.5)).unwrap();
    let frames = sound.frames() as i64;
    assert!(
        (frames - 2000).abs() <= 16,
        "expected about 2000 frames, got {}",
        frames
    );
}

#[test]
fn loop_count_extends_playback() {
    let (mixer, handle) = capture_mixer();
    let sound = Sound::from_bytes(&mixer, sine_wav(44100, 500, 0.5)).unwrap();
    // Two extra repeats: audible for three passes, then silence
    sound.play(Some(0), Loops::Extra(2)).unwrap();

    let samples = handle.render_frames(2000);
    let last = last_audible_frame(&samples, 0.01).unwrap();
    assert!(
        (last as i64 - 1499).abs() <= 8,
        "last audible frame {}",
        last
    );
}

#[test]
fn forever_loops_until_halted() {
    let (mixer, handle) = capture_mixer();
    let sound = Sound::from_bytes(&mixer, sine_wav(44100, 100, 0.5)).unwrap();
    sound.play(Some(3), Loops::Forever).unwrap();

    let samples = handle.render_frames(10_000);
    assert!(rms(&samples[19_000..]) > 0.1);
    assert!(mixer.is_playing(3).unwrap());

    mixer.halt(3).unwrap();
    let silent = handle.render_frames(100);
    assert_eq!(rms(&silent), 0.0);
}

#[test]
fn dropping_sound_does_not_cut_playback() {
    let (mixer, handle) = capture_mixer();
    let sound = Sound::from_bytes(&mixer, sine_wav(44100, 1000, 0.5)).unwrap();
    sound.play(Some(0), Loops::Once).unwrap();
    drop(sound);

    let samples = handle.render_frames(500);
    assert!(rms(&samples) > 0.1);
    assert!(mixer.is_playing(0).unwrap());
}

#[test]
fn no_free_channel_when_all_busy() {
    let (mixer, _handle) = capture_mixer();
    mixer.allocate_channels(2);
    let sound = Sound::from_bytes(&mixer, sine_wav(44100, 100, 0.5)).unwrap();

    sound.play(None, Loops::Forever).unwrap();
    sound.play(None, Loops::Forever).unwrap();
    let result = sound.play(None, Loops::Once);
    assert!(matches!(result, Err(Error::NoFreeChannel)));
}

#[test]
fn explicit_channel_out_of_range() {
    let (mixer, _handle) = capture_mixer();
    let sound = Sound::from_bytes(&mixer, sine_wav(44100, 100, 0.5)).unwrap();

    let err = sound.play(Some(99), Loops::Once).unwrap_err();
    assert!(matches!(
        err,
        Error::ChannelOutOfRange {
            channel: 99,
            allocated: 8
        }
    ));
}

#[test]
fn panning_silences_attenuated_side() {
    let (mixer, handle) = capture_mixer();
    let sound = Sound::from_bytes(&mixer, sine_wav(44100, 1000, 0.5)).unwrap();
    let channel = sound.play(None, Loops::Once).unwrap();
    mixer.set_panning(channel, 255, 0).unwrap();

    let samples = handle.render_frames(500);
    let left: Vec<f32> = samples.iter().step_by(2).copied().collect();
    let right: Vec<f32> = samples.iter().skip(1).step_by(2).copied().collect();
    assert!(rms(&left) > 0.1);
    assert_eq!(rms(&right), 0.0);
}

#[test]
fn half_panning_halves_amplitude() {
    let (mixer, handle) = capture_mixer();
    let sound = Sound::from_bytes(&mixer, sine_wav(44100, 2000, 0.5)).unwrap();
    let channel = sound.play(None, Loops::Once).unwrap();
    mixer.set_panning(channel, 128, 255).unwrap();

    let samples = handle.render_frames(1000);
    let left: Vec<f32> = samples.iter().step_by(2).copied().collect();
    let right: Vec<f32> = samples.iter().skip(1).step_by(2).copied().collect();
    let ratio = rms(&left) / rms(&right);
    assert!((ratio - 128.0 / 255.0).abs() < 0.01, "ratio {}", ratio);
}

#[test]
fn panning_reset_restores_both_sides() {
    let (mixer, handle) = capture_mixer();
    let sound = Sound::from_bytes(&mixer, sine_wav(44100, 2000, 0.5)).unwrap();
    let channel = sound.play(None, Loops::Once).unwrap();

    mixer.set_panning(channel, 0, 255).unwrap();
    mixer.set_panning(channel, 255, 255).unwrap();

    let samples = handle.render_frames(500);
    let left: Vec<f32> = samples.iter().step_by(2).copied().collect();
    let right: Vec<f32> = samples.iter().skip(1).step_by(2).copied().collect();
    assert!((rms(&left) - rms(&right)).abs() < 1e-6);
    assert!(rms(&left) > 0.1);
}

#[test]
fn play_after_mixer_close_is_invalid_state() {
    let (mixer, _handle) = capture_mixer();
    let sound = Sound::from_bytes(&mixer, sine_wav(44100, 100, 0.5)).unwrap();
    mixer.close().unwrap();

    let result = sound.play(None, Loops::Once);
    assert!(matches!(result, Err(Error::InvalidState(_))));
}
