//! Streamed music playback
//!
//! Music is decoded incrementally on a worker thread and pushed through a
//! lock-free ring buffer; the render callback pops frames from the other
//! side. The buffer is primed on the calling thread before playback starts
//! so the track begins without a gap and open errors surface at the call
//! site, not on the worker.

use crate::audio::decode::{AudioDecoder, ByteSource};
use crate::audio::resampler::StreamResampler;
use crate::audio::types::AudioFrame;
use crate::error::Result;
use crate::mixer::Loops;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Seconds of device-rate audio the ring buffer holds
const BUFFER_SECONDS: usize = 1;

/// Frames staged before play returns
const PRIME_FRAMES: usize = 8192;

/// Worker poll interval while the ring buffer is full
const FULL_SLEEP: Duration = Duration::from_millis(5);

/// One playing music track
///
/// Owns the consumer side of the ring buffer and the decode worker.
/// Dropping the stream signals the worker to stop and joins it; the
/// worker polls the stop flag between pushes, so the join is prompt.
pub(crate) struct MusicStream {
    consumer: ringbuf::HeapCons<f32>,
    done: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MusicStream {
    /// Open the source, prime the buffer, and spawn the decode worker
    ///
    /// Decode output is converted to `device_rate` as it streams. A track
    /// short enough to fit in the buffer outright is handed over fully
    /// decoded with no worker at all.
    pub fn start(source: ByteSource, loops: Loops, device_rate: u32) -> Result<Self> {
        let decoder = AudioDecoder::open(&source)?;
        let source_rate = decoder.sample_rate();
        let resampler = if source_rate != device_rate {
            Some(StreamResampler::new(source_rate, device_rate)?)
        } else {
            None
        };

        let capacity = (device_rate as usize * BUFFER_SECONDS).max(PRIME_FRAMES) * 2;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let done = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let mut pump = MusicPump {
            source,
            device_rate,
            decoder,
            resampler,
            producer,
            pending: Vec::new(),
            pending_pos: 0,
            loops_left: loops.extra_plays(),
            decoding_done: false,
            decoded_this_pass: false,
        };

        let mut finished = false;
        while pump.producer.occupied_len() < PRIME_FRAMES * 2 {
            match pump.step() {
                Pump::Progress => {}
                Pump::Full => break,
                Pump::Finished => {
                    finished = true;
                    break;
                }
            }
        }

        let worker = if finished {
            done.store(true, Ordering::Release);
            None
        } else {
            let stop = Arc::clone(&stop);
            let done = Arc::clone(&done);
            Some(
                std::thread::Builder::new()
                    .name("foley-music".to_string())
                    .spawn(move || pump.run(stop, done))?,
            )
        };

        Ok(Self {
            consumer,
            done,
            stop,
            worker,
        })
    }

    /// Pop the next frame
    ///
    /// Returns `None` once the worker has finished and the buffer is
    /// drained. An underrun while decoding is still in progress yields
    /// silence rather than ending the track.
    pub fn next_frame(&mut self) -> Option<AudioFrame> {
        if self.consumer.occupied_len() >= 2 {
            let mut frame = [0.0f32; 2];
            self.consumer.pop_slice(&mut frame);
            return Some(AudioFrame::new(frame[0], frame[1]));
        }
        if self.done.load(Ordering::Acquire) {
            None
        } else {
            Some(AudioFrame::zero())
        }
    }

    /// True once every decoded frame has been consumed
    pub fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire) && self.consumer.occupied_len() < 2
    }
}

impl Drop for MusicStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// What a single pump step accomplished
enum Pump {
    /// Samples moved or decoded; step again
    Progress,
    /// Ring buffer full; wait before retrying
    Full,
    /// All audio decoded and handed off
    Finished,
}

/// Decode-side state machine
///
/// Invariant: new audio is only decoded once the previously staged
/// samples have been pushed, so `pending` never grows without bound.
struct MusicPump {
    source: ByteSource,
    device_rate: u32,
    decoder: AudioDecoder,
    resampler: Option<StreamResampler>,
    producer: ringbuf::HeapProd<f32>,
    pending: Vec<f32>,
    pending_pos: usize,
    loops_left: Option<u32>,
    decoding_done: bool,
    /// Whether any audio was decoded since the decoder was last opened
    decoded_this_pass: bool,
}

impl MusicPump {
    fn run(mut self, stop: Arc<AtomicBool>, done: Arc<AtomicBool>) {
        loop {
            if stop.load(Ordering::Relaxed) {
                debug!("Music worker stopping on request");
                break;
            }
            match self.step() {
                Pump::Progress => {}
                Pump::Full => std::thread::sleep(FULL_SLEEP),
                Pump::Finished => {
                    debug!("Music stream fully decoded");
                    done.store(true, Ordering::Release);
                    break;
                }
            }
        }
    }

    fn step(&mut self) -> Pump {
        if self.pending_pos < self.pending.len() {
            let pushed = self.producer.push_slice(&self.pending[self.pending_pos..]);
            self.pending_pos += pushed;
            if self.pending_pos < self.pending.len() {
                return Pump::Full;
            }
            self.pending.clear();
            self.pending_pos = 0;
            return Pump::Progress;
        }

        if self.decoding_done {
            return Pump::Finished;
        }

        match self.decoder.next_chunk() {
            Ok(Some(chunk)) => {
                self.decoded_this_pass = true;
                self.stage(&chunk);
                Pump::Progress
            }
            Ok(None) => {
                self.end_of_source();
                Pump::Progress
            }
            Err(e) => {
                warn!("Music decode failed mid-stream: {}", e);
                self.decoding_done = true;
                Pump::Progress
            }
        }
    }

    /// Stage a decoded chunk, converting its rate if needed
    fn stage(&mut self, chunk: &[f32]) {
        match self.resampler.as_mut() {
            Some(resampler) => match resampler.push(chunk) {
                Ok(converted) => self.pending.extend_from_slice(&converted),
                Err(e) => {
                    warn!("Music resample failed: {}", e);
                    self.decoding_done = true;
                }
            },
            None => self.pending.extend_from_slice(chunk),
        }
    }

    /// Flush the conversion tail, then either restart or finish
    fn end_of_source(&mut self) {
        if let Some(resampler) = self.resampler.as_mut() {
            match resampler.finish() {
                Ok(tail) => self.pending.extend_from_slice(&tail),
                Err(e) => warn!("Music resample flush failed: {}", e),
            }
        }

        // A pass that decoded nothing will decode nothing on a restart
        // either; finish rather than loop over a zero-frame source
        if !self.decoded_this_pass {
            self.decoding_done = true;
            return;
        }

        let restart = match self.loops_left {
            Some(0) => false,
            Some(n) => {
                self.loops_left = Some(n - 1);
                true
            }
            None => true,
        };

        if !restart {
            self.decoding_done = true;
            return;
        }

        self.decoded_this_pass = false;
        match AudioDecoder::open(&self.source) {
            Ok(decoder) => {
                let source_rate = decoder.sample_rate();
                self.decoder = decoder;
                self.resampler = if source_rate != self.device_rate {
                    match StreamResampler::new(source_rate, self.device_rate) {
                        Ok(resampler) => Some(resampler),
                        Err(e) => {
                            warn!("Music loop restart failed: {}", e);
                            self.decoding_done = true;
                            None
                        }
                    }
                } else {
                    None
                };
            }
            Err(e) => {
                warn!("Music loop restart failed: {}", e);
                self.decoding_done = true;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_source(sample_rate: u32, frames: usize) -> ByteSource {
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
                let value = (phase.sin() * 0.5 * i16::MAX as f32) as i16;
                writer.write_sample(value).unwrap();
                writer.write_sample(value).unwrap();
            }
            writer.finalize().unwrap();
        }
        ByteSource::Memory(Arc::from(cursor.into_inner()))
    }

    fn drain(stream: &mut MusicStream) -> usize {
        let mut frames = 0;
        while stream.next_frame().is_some() {
            frames += 1;
        }
        frames
    }

    #[test]
    fn test_short_track_plays_exact_frames() {
        // Fits the buffer outright: fully primed, no worker
        let mut stream = MusicStream::start(wav_source(44100, 1000), Loops::Once, 44100).unwrap();
        assert_eq!(drain(&mut stream), 1000);
        assert!(stream.is_finished());
    }

    #[test]
    fn test_extra_loop_doubles_frames() {
        let mut stream =
            MusicStream::start(wav_source(44100, 1000), Loops::Extra(1), 44100).unwrap();
        assert_eq!(drain(&mut stream), 2000);
    }

    #[test]
    fn test_resampled_track_length() {
        // 500 frames at 22050 Hz should come out near 1000 at 44100 Hz
        let mut stream = MusicStream::start(wav_source(22050, 500), Loops::Once, 44100).unwrap();
        let frames = drain(&mut stream) as i64;
        assert!(
            (frames - 1000).abs() <= 100,
            "expected about 1000 frames, got {}",
            frames
        );
    }

    #[test]
    fn test_forever_keeps_yielding() {
        let mut stream =
            MusicStream::start(wav_source(44100, 100), Loops::Forever, 44100).unwrap();
        for _ in 0..5000 {
            assert!(stream.next_frame().is_some());
        }
        assert!(!stream.is_finished());
        // Drop stops the worker
    }

    #[test]
    fn test_zero_frame_source_ends_instead_of_looping() {
        // A header-only WAV opens fine but decodes no audio; a forever
        // loop over it must end rather than restart the decoder endlessly
        let mut stream = MusicStream::start(wav_source(44100, 0), Loops::Forever, 44100).unwrap();
        assert_eq!(drain(&mut stream), 0);
        assert!(stream.is_finished());
    }

    #[test]
    fn test_garbage_source_fails_at_start() {
        let source = ByteSource::Memory(Arc::from(b"not audio".to_vec()));
        assert!(MusicStream::start(source, Loops::Once, 44100).is_err());
    }
}
