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
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{info, span, Level};

use super::{AudioBuffer, AudioError, AudioGraph, ExhaustedCallback, LoopStrategy};
use crate::controller::Channel;

/// What the mock knows about a graph that is currently sounding.
struct LiveGraph {
    channel: Channel,
    gain: f32,
    strategy: LoopStrategy,
    frames: usize,
    on_exhausted: ExhaustedCallback,
}

#[derive(Default)]
struct State {
    live: HashMap<u64, LiveGraph>,
    started: usize,
    peak: HashMap<Channel, usize>,
}

/// A mock backend. Doesn't actually play anything, but keeps track of every graph
/// that is sounding so tests can check for overlapping audio.
#[derive(Clone)]
pub struct Backend {
    name: String,
    next_id: Arc<AtomicU64>,
    state: Arc<Mutex<State>>,
}

impl Backend {
    /// Gets the given mock backend.
    pub fn get(name: &str) -> Backend {
        Backend {
            name: name.to_string(),
            next_id: Arc::new(AtomicU64::new(1)),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Returns the number of graphs sounding on the given channel.
    pub fn live_graphs(&self, channel: Channel) -> usize {
        self.state
            .lock()
            .live
            .values()
            .filter(|graph| graph.channel == channel)
            .count()
    }

    /// Returns the largest number of graphs that ever sounded at once on the channel.
    pub fn peak_graphs(&self, channel: Channel) -> usize {
        self.state.lock().peak.get(&channel).copied().unwrap_or(0)
    }

    /// Returns the number of times any graph was started.
    pub fn starts(&self) -> usize {
        self.state.lock().started
    }

    /// Returns the gain of the graph sounding on the channel.
    pub fn gain(&self, channel: Channel) -> Option<f32> {
        self.find(channel, |graph| graph.gain)
    }

    /// Returns the loop strategy of the graph sounding on the channel.
    pub fn strategy(&self, channel: Channel) -> Option<LoopStrategy> {
        self.find(channel, |graph| graph.strategy)
    }

    /// Returns the frame count of the buffer sounding on the channel.
    pub fn frames(&self, channel: Channel) -> Option<usize> {
        self.find(channel, |graph| graph.frames)
    }

    /// Simulates the sounding graph on the channel reaching the end of its buffer.
    /// Returns false if nothing was sounding. Graphs looping natively never run out.
    pub fn exhaust(&self, channel: Channel) -> bool {
        let callback = {
            let mut state = self.state.lock();
            let Some(id) = state
                .live
                .iter()
                .find(|(_, graph)| {
                    graph.channel == channel && graph.strategy == LoopStrategy::Rechain
                })
                .map(|(id, _)| *id)
            else {
                return false;
            };
            state.live.remove(&id).map(|graph| graph.on_exhausted)
        };

        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    fn find<T>(&self, channel: Channel, get: impl Fn(&LiveGraph) -> T) -> Option<T> {
        self.state
            .lock()
            .live
            .values()
            .find(|graph| graph.channel == channel)
            .map(get)
    }
}

impl super::Backend for Backend {
    fn create_graph(&self, channel: Channel) -> Result<Box<dyn AudioGraph>, AudioError> {
        Ok(Box::new(Graph {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            channel,
            state: self.state.clone(),
        }))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

/// A mock graph.
struct Graph {
    id: u64,
    channel: Channel,
    state: Arc<Mutex<State>>,
}

impl AudioGraph for Graph {
    fn start(
        &mut self,
        buffer: Arc<AudioBuffer>,
        gain: f32,
        strategy: LoopStrategy,
        on_exhausted: ExhaustedCallback,
    ) -> Result<(), AudioError> {
        let span = span!(Level::INFO, "play (mock)");
        let _enter = span.enter();

        info!(
            channel = %self.channel,
            frames = buffer.frames(),
            gain,
            strategy = ?strategy,
            "Playing recording."
        );

        let mut state = self.state.lock();
        state.live.insert(
            self.id,
            LiveGraph {
                channel: self.channel,
                gain,
                strategy,
                frames: buffer.frames(),
                on_exhausted,
            },
        );
        state.started += 1;

        let live = state
            .live
            .values()
            .filter(|graph| graph.channel == self.channel)
            .count();
        let peak = state.peak.entry(self.channel).or_insert(0);
        *peak = (*peak).max(live);
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().live.remove(&self.id);
    }

    fn set_gain(&mut self, gain: f32) {
        if let Some(graph) = self.state.lock().live.get_mut(&self.id) {
            graph.gain = gain;
        }
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A backend whose graphs can never be created. Used to exercise failure paths.
#[cfg(test)]
pub struct BrokenBackend {}

#[cfg(test)]
impl super::Backend for BrokenBackend {
    fn create_graph(&self, _channel: Channel) -> Result<Box<dyn AudioGraph>, AudioError> {
        Err(AudioError::Backend("device unplugged".to_string()))
    }
}

#[cfg(test)]
impl fmt::Display for BrokenBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broken (Mock)")
    }
}

/// Returns a short silent stereo buffer.
#[cfg(test)]
pub fn silent_buffer(frames: usize) -> Arc<AudioBuffer> {
    Arc::new(AudioBuffer::new(vec![0.0; frames * 2], 2, 44100))
}
