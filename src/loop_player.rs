// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
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
    mem,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, span, Level};

use crate::audio::{AudioBuffer, AudioGraph, Backend, ExhaustedCallback, LoopStrategy};
use crate::controller::{Channel, Event, Generation};
use crate::error::{LoadError, PlaybackError};
use crate::loader::{LoadTicket, Loader};

/// The single session a loop player may own.
enum Session {
    Idle,
    /// A load has been requested and no graph exists yet.
    Loading {
        generation: Generation,
        locator: PathBuf,
    },
    Playing {
        generation: Generation,
        locator: PathBuf,
        graph: Box<dyn AudioGraph>,
        buffer: Arc<AudioBuffer>,
    },
}

/// Plays one recording on a seamless loop. Each call to [`LoopPlayer::start`] opens
/// a new session identified by a generation; load results and exhaustion reports
/// for any other generation are ignored, so a superseded session can never make a
/// sound.
pub struct LoopPlayer {
    channel: Channel,
    backend: Arc<dyn Backend>,
    loader: Arc<dyn Loader>,
    events_tx: UnboundedSender<Event>,
    strategy: LoopStrategy,
    volume: f32,
    generation: Generation,
    session: Session,
}

impl LoopPlayer {
    /// Creates an idle loop player.
    pub fn new(
        channel: Channel,
        backend: Arc<dyn Backend>,
        loader: Arc<dyn Loader>,
        events_tx: UnboundedSender<Event>,
        strategy: LoopStrategy,
        volume: f32,
    ) -> LoopPlayer {
        LoopPlayer {
            channel,
            backend,
            loader,
            events_tx,
            strategy,
            volume: volume.clamp(0.0, 1.0),
            generation: Generation::default(),
            session: Session::Idle,
        }
    }

    /// Stops whatever is playing and starts loading the given recording. Playback
    /// begins once the matching [`Event::Loaded`] is handed to
    /// [`LoopPlayer::on_loaded`].
    pub fn start(&mut self, locator: &Path) -> Generation {
        self.stop();

        self.generation = self.generation.next();
        let span = span!(
            Level::INFO,
            "loop player",
            channel = %self.channel,
            generation = %self.generation
        );
        let _enter = span.enter();

        info!(path = ?locator, "Loading recording.");
        self.session = Session::Loading {
            generation: self.generation,
            locator: locator.to_path_buf(),
        };
        self.loader.request(LoadTicket {
            channel: self.channel,
            generation: self.generation,
            locator: locator.to_path_buf(),
        });
        self.generation
    }

    /// Halts the graph and forgets the session. A load still in flight becomes stale.
    /// Idempotent.
    pub fn stop(&mut self) {
        match mem::replace(&mut self.session, Session::Idle) {
            Session::Idle => {}
            Session::Loading { generation, .. } => {
                debug!(channel = %self.channel, generation = %generation, "Abandoning load.");
            }
            Session::Playing {
                generation,
                mut graph,
                ..
            } => {
                graph.stop();
                info!(channel = %self.channel, generation = %generation, "Stopped.");
            }
        }
    }

    /// Sets the gain of the current and any future session. Clamped to [0, 1].
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        if let Session::Playing { graph, .. } = &mut self.session {
            graph.set_gain(self.volume);
        }
    }

    /// Connects a finished load. Returns Ok(true) if playback started and Ok(false)
    /// if the load was stale and discarded. On failure the player is idle and no
    /// graph is left behind.
    pub fn on_loaded(
        &mut self,
        generation: Generation,
        result: Result<Arc<AudioBuffer>, LoadError>,
    ) -> Result<bool, PlaybackError> {
        let locator = match &self.session {
            Session::Loading {
                generation: current,
                locator,
            } if *current == generation => locator.clone(),
            _ => {
                debug!(channel = %self.channel, generation = %generation, "Discarding stale load.");
                return Ok(false);
            }
        };
        self.session = Session::Idle;

        let buffer = result?;
        let mut graph = self.backend.create_graph(self.channel)?;
        graph.start(
            buffer.clone(),
            self.volume,
            self.strategy,
            self.exhausted_callback(generation),
        )?;

        info!(
            channel = %self.channel,
            generation = %generation,
            path = ?locator,
            duration = ?buffer.duration(),
            "Playing."
        );
        self.session = Session::Playing {
            generation,
            locator,
            graph,
            buffer,
        };
        Ok(true)
    }

    /// Handles the graph reaching the end of its buffer. If `keep_looping` still
    /// holds the buffer starts over on the same graph; otherwise the session ends.
    pub fn on_exhausted(
        &mut self,
        generation: Generation,
        keep_looping: bool,
    ) -> Result<(), PlaybackError> {
        if !matches!(&self.session, Session::Playing { generation: current, .. } if *current == generation)
        {
            debug!(channel = %self.channel, generation = %generation, "Discarding stale exhaustion.");
            return Ok(());
        }

        if !keep_looping {
            self.stop();
            return Ok(());
        }

        let callback = self.exhausted_callback(generation);
        if let Session::Playing { graph, buffer, .. } = &mut self.session {
            debug!(channel = %self.channel, generation = %generation, "Looping.");
            if let Err(e) = graph.start(buffer.clone(), self.volume, self.strategy, callback) {
                self.stop();
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Returns true while a session is loading or playing.
    pub fn is_active(&self) -> bool {
        !matches!(self.session, Session::Idle)
    }

    /// Returns true once a session has a sounding graph.
    pub fn is_playing(&self) -> bool {
        matches!(self.session, Session::Playing { .. })
    }

    /// The generation of the most recent session.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The recording of the current session.
    pub fn locator(&self) -> Option<&Path> {
        match &self.session {
            Session::Idle => None,
            Session::Loading { locator, .. } | Session::Playing { locator, .. } => {
                Some(locator.as_path())
            }
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    fn exhausted_callback(&self, generation: Generation) -> ExhaustedCallback {
        let events_tx = self.events_tx.clone();
        let channel = self.channel;
        Arc::new(move || {
            // Nobody is listening once the controller is gone.
            let _ = events_tx.send(Event::Exhausted {
                channel,
                generation,
            });
        })
    }
}

impl Drop for LoopPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
