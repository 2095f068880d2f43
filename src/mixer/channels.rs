//! Sound effect channel table
//!
//! A fixed number of mixing channels, each holding at most one playing
//! clip. Channels are addressed by index; panning is channel state and
//! survives across plays until changed. All methods are called with the
//! table lock held, including the per-frame mix from the render callback.

use crate::audio::types::{AudioFrame, SharedSamples};
use crate::error::{Error, Result};
use crate::mixer::Loops;
use tracing::debug;

/// Number of mixing channels allocated when a mixer is opened
pub const DEFAULT_CHANNELS: usize = 8;

/// Playback state for one clip on one channel
struct ActiveSound {
    buffer: SharedSamples,
    /// Current frame position within the buffer
    position: usize,
    /// Remaining restarts after the current pass; `None` repeats forever
    loops_left: Option<u32>,
}

/// One mixing channel
struct Channel {
    active: Option<ActiveSound>,
    left_gain: f32,
    right_gain: f32,
}

impl Channel {
    fn idle() -> Self {
        Self {
            active: None,
            left_gain: 1.0,
            right_gain: 1.0,
        }
    }
}

pub(crate) struct ChannelTable {
    channels: Vec<Channel>,
}

impl ChannelTable {
    pub fn new(count: usize) -> Self {
        let mut channels = Vec::with_capacity(count);
        channels.resize_with(count, Channel::idle);
        Self { channels }
    }

    /// Resize the table, returning the new channel count
    ///
    /// Shrinking halts whatever was playing on the dropped channels.
    /// Growing adds idle channels with neutral panning.
    pub fn allocate(&mut self, count: usize) -> usize {
        if count < self.channels.len() {
            debug!(
                "Shrinking channel table from {} to {}",
                self.channels.len(),
                count
            );
            self.channels.truncate(count);
        } else {
            self.channels.resize_with(count, Channel::idle);
        }
        self.channels.len()
    }

    pub fn count(&self) -> usize {
        self.channels.len()
    }

    /// Start a clip on a channel
    ///
    /// `None` picks the first idle channel; an explicit index replaces
    /// whatever that channel was playing. Returns the channel used.
    pub fn play(
        &mut self,
        buffer: SharedSamples,
        channel: Option<usize>,
        loops: Loops,
    ) -> Result<usize> {
        let index = match channel {
            Some(index) => {
                self.check(index)?;
                index
            }
            None => self
                .channels
                .iter()
                .position(|c| c.active.is_none())
                .ok_or(Error::NoFreeChannel)?,
        };

        self.channels[index].active = Some(ActiveSound {
            buffer,
            position: 0,
            loops_left: loops.extra_plays(),
        });
        Ok(index)
    }

    /// Set per-side attenuation for a channel
    ///
    /// 255 is unattenuated, 0 is silent. (255, 255) restores center.
    pub fn set_panning(&mut self, channel: usize, left: u8, right: u8) -> Result<()> {
        self.check(channel)?;
        let ch = &mut self.channels[channel];
        ch.left_gain = left as f32 / 255.0;
        ch.right_gain = right as f32 / 255.0;
        Ok(())
    }

    pub fn halt(&mut self, channel: usize) -> Result<()> {
        self.check(channel)?;
        self.channels[channel].active = None;
        Ok(())
    }

    pub fn halt_all(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.active = None;
        }
    }

    pub fn is_playing(&self, channel: usize) -> Result<bool> {
        self.check(channel)?;
        Ok(self.channels[channel].active.is_some())
    }

    pub fn playing_count(&self) -> usize {
        self.channels.iter().filter(|c| c.active.is_some()).count()
    }

    /// Mix one frame from every active channel into the accumulator
    ///
    /// Advances playback positions and retires clips whose final pass has
    /// ended. A clip with remaining loops restarts from its first frame.
    pub fn mix_into(&mut self, acc: &mut AudioFrame) {
        for channel in self.channels.iter_mut() {
            let mut finished = false;
            if let Some(active) = channel.active.as_mut() {
                if let Some(frame) = active.buffer.frame(active.position) {
                    acc.add(&frame.scaled(channel.left_gain, channel.right_gain));
                    active.position += 1;
                }
                if active.position >= active.buffer.frames() {
                    match active.loops_left {
                        Some(0) => finished = true,
                        Some(n) => {
                            active.loops_left = Some(n - 1);
                            active.position = 0;
                        }
                        None => active.position = 0,
                    }
                }
            }
            if finished {
                channel.active = None;
            }
        }
    }

    fn check(&self, channel: usize) -> Result<()> {
        if channel >= self.channels.len() {
            return Err(Error::ChannelOutOfRange {
                channel,
                allocated: self.channels.len(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
