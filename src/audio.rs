// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{fmt, sync::Arc, time::Duration};

use crate::controller::Channel;

pub mod cpal;
pub mod decode;
pub mod mock;
pub mod resample;

/// Errors raised by an audio backend.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio device found with name {0}")]
    DeviceNotFound(String),

    #[error("audio backend error: {0}")]
    Backend(String),
}

/// A fully decoded recording. Samples are interleaved f32.
pub struct AudioBuffer {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Creates a new buffer from interleaved samples.
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> AudioBuffer {
        AudioBuffer {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the sample for the given frame and output channel. Mono buffers feed
    /// every output channel; otherwise extra output channels reuse the last channel.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.channels as usize;
        let channel = channel.min(channels - 1);
        self.samples
            .get(frame * channels + channel)
            .copied()
            .unwrap_or(0.0)
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

/// How a graph repeats its buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopStrategy {
    /// The backend wraps back to the first frame on its own. Sample accurate.
    Native,
    /// The backend plays the buffer once and reports exhaustion. The owner decides
    /// whether to start it again.
    Rechain,
}

/// Called by a graph playing with [`LoopStrategy::Rechain`] when it reaches the end
/// of its buffer. May be called from the audio thread.
pub type ExhaustedCallback = Arc<dyn Fn() + Send + Sync>;

/// A single playback chain: buffer source into a gain stage into the output.
pub trait AudioGraph: Send {
    /// Starts the buffer from its first frame. Anything the graph was playing before
    /// is replaced.
    fn start(
        &mut self,
        buffer: Arc<AudioBuffer>,
        gain: f32,
        strategy: LoopStrategy,
        on_exhausted: ExhaustedCallback,
    ) -> Result<(), AudioError>;

    /// Halts playback immediately. The exhaustion callback will not be called after
    /// this returns.
    fn stop(&mut self);

    /// Updates the gain without interrupting playback.
    fn set_gain(&mut self, gain: f32);
}

/// Creates audio graphs.
pub trait Backend: fmt::Display + Send + Sync {
    /// Creates a fresh, silent graph for the given channel.
    fn create_graph(&self, channel: Channel) -> Result<Box<dyn AudioGraph>, AudioError>;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, AudioError> {
    cpal::list_devices()
}

/// Gets the backend for the given device name. Names starting with "mock" get the
/// in-memory backend.
pub fn get_backend(device: &str, sample_rate: u32) -> Result<Arc<dyn Backend>, AudioError> {
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Backend::get(device)));
    }

    Ok(Arc::new(cpal::Backend::get(device, sample_rate)?))
}
