// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::{fmt, io, sync::Arc};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, span, Instrument, Level};

use crate::audio::AudioBuffer;
use crate::error::LoadError;
use crate::playback::PlaybackController;

pub mod keyboard;

/// One of the two independent audio channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// The tabla recording of the selected taal.
    Rhythm,
    /// The tanpura drone.
    Drone,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Rhythm => write!(f, "taal"),
            Channel::Drone => write!(f, "tanpura"),
        }
    }
}

/// Identifies one session of a channel or one run of the beat counter. Events
/// carrying a generation that is no longer current are discarded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    /// Returns the generation following this one.
    pub fn next(self) -> Generation {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a step along the tempo ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TempoStep {
    Up,
    Down,
}

/// Everything the playback controller reacts to. The first group comes from the
/// user interface; the rest is produced by the loader, the audio graphs and the
/// beat counter's ticker.
#[derive(Debug)]
pub enum Event {
    /// A different taal was selected.
    CycleChanged(String),
    /// A different key was selected.
    KeyChanged(String),
    /// The tempo was stepped up or down.
    TempoStep(TempoStep),
    /// Start the taal.
    PlayRequested,
    /// Stop the taal.
    StopRequested,
    /// The tanpura was switched on or off.
    DroneToggled(bool),
    /// The tanpura volume slider moved.
    DroneVolumeChanged(f32),
    /// A recording finished loading.
    Loaded {
        channel: Channel,
        generation: Generation,
        result: Result<Arc<AudioBuffer>, LoadError>,
    },
    /// A graph played its buffer to the end.
    Exhausted {
        channel: Channel,
        generation: Generation,
    },
    /// The beat counter should advance.
    Tick { generation: Generation },
    /// Stop everything and exit.
    Shutdown,
}

/// A source of user input events.
pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: UnboundedSender<Event>)
        -> JoinHandle<Result<(), io::Error>>;
}

/// Runs the playback controller against a stream of events. All state changes
/// happen on this one task, so the controller needs no locking.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller. `events_tx` must feed `events_rx`; it is handed to
    /// the driver.
    pub fn new(
        playback: PlaybackController,
        driver: Arc<dyn Driver>,
        events_tx: UnboundedSender<Event>,
        events_rx: UnboundedReceiver<Event>,
    ) -> Controller {
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(
                Controller::dispatch_events(playback, driver, events_tx, events_rx)
                    .instrument(span),
            ),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    async fn dispatch_events(
        mut playback: PlaybackController,
        driver: Arc<dyn Driver>,
        events_tx: UnboundedSender<Event>,
        mut events_rx: UnboundedReceiver<Event>,
    ) {
        let join_handle = driver.monitor_events(events_tx);

        info!(
            taal = playback.cycle(),
            key = playback.key(),
            tempo = playback.tempo(),
            "Controller started."
        );

        while let Some(event) = events_rx.recv().await {
            debug!(event = ?event, "Received event.");
            if !playback.handle(event) {
                break;
            }
        }

        playback.shutdown();
        info!("Controller closing.");
        join_handle.abort();
        match join_handle.await {
            Ok(Err(e)) => error!(err = %e, "Event monitor failed"),
            Err(e) if !e.is_cancelled() => error!(err = %e, "Error waiting for event monitor"),
            _ => {}
        }
    }
}
