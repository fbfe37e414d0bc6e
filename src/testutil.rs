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
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    audio::Backend,
    beat_counter::{TickHandle, Ticker},
    catalog::AssetCatalog,
    controller::{Event, Generation},
    display::DisplaySink,
    error::PlaybackError,
    loader::{LoadTicket, Loader},
    playback::{PlaybackController, Settings},
};

/// Wait for the given async predicate to return true or fail.
#[inline]
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate().await {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

/// A display that remembers everything it was told.
#[derive(Default)]
pub struct RecordingDisplay {
    positions: Mutex<Vec<Option<u32>>>,
    beat_counts: Mutex<Vec<Option<u32>>>,
    tempos: Mutex<Vec<u32>>,
    keys: Mutex<Option<(Vec<String>, String)>>,
    cycles: Mutex<Option<(Vec<(String, Option<u32>)>, String)>>,
    drone: Mutex<Option<bool>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingDisplay {
    pub fn positions(&self) -> Vec<Option<u32>> {
        self.positions.lock().clone()
    }

    pub fn beat_counts(&self) -> Vec<Option<u32>> {
        self.beat_counts.lock().clone()
    }

    pub fn tempos(&self) -> Vec<u32> {
        self.tempos.lock().clone()
    }

    /// The most recent key list and selection.
    pub fn keys(&self) -> Option<(Vec<String>, String)> {
        self.keys.lock().clone()
    }

    /// The most recent taal list and selection.
    pub fn cycles(&self) -> Option<(Vec<(String, Option<u32>)>, String)> {
        self.cycles.lock().clone()
    }

    pub fn drone(&self) -> Option<bool> {
        *self.drone.lock()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl DisplaySink for RecordingDisplay {
    fn set_beat_count_label(&self, count: Option<u32>) {
        self.beat_counts.lock().push(count);
    }

    fn set_beat_position(&self, position: Option<u32>) {
        self.positions.lock().push(position);
    }

    fn set_tempo_label(&self, bpm: u32) {
        self.tempos.lock().push(bpm);
    }

    fn set_available_keys(&self, keys: &[String], selected: &str) {
        *self.keys.lock() = Some((keys.to_vec(), selected.to_string()));
    }

    fn set_available_cycles(&self, cycles: &[(String, Option<u32>)], selected: &str) {
        *self.cycles.lock() = Some((cycles.to_vec(), selected.to_string()));
    }

    fn set_drone_state(&self, enabled: bool) {
        *self.drone.lock() = Some(enabled);
    }

    fn report_error(&self, error: &PlaybackError) {
        self.errors.lock().push(error.to_string());
    }
}

/// A loader that only records requests. Tests answer them by handing
/// [`Event::Loaded`] to the controller themselves, in whatever order they like.
#[derive(Default)]
pub struct ManualLoader {
    tickets: Mutex<Vec<LoadTicket>>,
}

impl ManualLoader {
    pub fn tickets(&self) -> Vec<LoadTicket> {
        self.tickets.lock().clone()
    }

    /// The most recent request for the given channel.
    pub fn last(&self, channel: crate::controller::Channel) -> Option<LoadTicket> {
        self.tickets
            .lock()
            .iter()
            .rev()
            .find(|ticket| ticket.channel == channel)
            .cloned()
    }
}

impl Loader for ManualLoader {
    fn request(&self, ticket: LoadTicket) {
        self.tickets.lock().push(ticket);
    }
}

/// A ticker that never fires on its own. Tests deliver [`Event::Tick`]s by hand.
#[derive(Default)]
pub struct ManualTicker {
    scheduled: Mutex<Vec<(Duration, Generation)>>,
    live: Arc<AtomicUsize>,
}

impl ManualTicker {
    /// Every schedule request so far.
    pub fn scheduled(&self) -> Vec<(Duration, Generation)> {
        self.scheduled.lock().clone()
    }

    /// The number of recurring ticks that haven't been cancelled.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl Ticker for ManualTicker {
    fn schedule(&self, period: Duration, generation: Generation) -> TickHandle {
        self.scheduled.lock().push((period, generation));
        self.live.fetch_add(1, Ordering::SeqCst);
        let live = self.live.clone();
        TickHandle::new(move || {
            live.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

/// Builds a playback controller with a manual ticker and a tanpura directory
/// that doesn't exist.
pub fn playback_with(
    catalog: AssetCatalog,
    backend: Arc<dyn Backend>,
    display: Arc<dyn DisplaySink>,
    loader: Arc<dyn Loader>,
    events_tx: UnboundedSender<Event>,
) -> PlaybackController {
    PlaybackController::new(
        Arc::new(catalog),
        display,
        backend,
        loader,
        Arc::new(ManualTicker::default()),
        events_tx,
        Settings {
            drone_directory: PathBuf::from("/nonexistent/tanpura"),
            ..Settings::default()
        },
    )
}
