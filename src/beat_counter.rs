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

//! The matra counter shown while a taal plays.

use std::{sync::Arc, time::Duration};

use tokio::{
    runtime::{Handle, TryCurrentError},
    sync::mpsc::UnboundedSender,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::controller::{Event, Generation};
use crate::display::DisplaySink;

/// Used when the tempo can't produce a sensible interval.
pub const DEFAULT_TEMPO: u32 = 120;

/// Microseconds in a minute.
const MICROS_PER_MINUTE: u64 = 60_000_000;

/// Returns the time between beats at the given tempo. Tempos that would give no
/// interval at all (zero, or more than one beat per microsecond) fall back to the
/// default.
pub fn tick_period(tempo: u32) -> Duration {
    let tempo = u64::from(tempo);
    if tempo == 0 || tempo > MICROS_PER_MINUTE {
        warn!(tempo, default = DEFAULT_TEMPO, "Invalid tempo, using default.");
        return Duration::from_micros(MICROS_PER_MINUTE / u64::from(DEFAULT_TEMPO));
    }
    Duration::from_micros(MICROS_PER_MINUTE / tempo)
}

/// Cancels a recurring tick when dropped.
pub struct TickHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TickHandle {
    pub fn new<F: FnOnce() + Send + 'static>(cancel: F) -> TickHandle {
        TickHandle {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Schedules recurring [`Event::Tick`]s.
pub trait Ticker: Send + Sync {
    /// Posts a tick tagged with `generation` every `period`, starting one period from
    /// now, until the handle is dropped.
    fn schedule(&self, period: Duration, generation: Generation) -> TickHandle;
}

/// Ticks from a tokio interval.
pub struct IntervalTicker {
    runtime: Handle,
    events_tx: UnboundedSender<Event>,
}

impl IntervalTicker {
    pub fn new(events_tx: UnboundedSender<Event>) -> Result<IntervalTicker, TryCurrentError> {
        Ok(IntervalTicker {
            runtime: Handle::try_current()?,
            events_tx,
        })
    }
}

impl Ticker for IntervalTicker {
    fn schedule(&self, period: Duration, generation: Generation) -> TickHandle {
        let events_tx = self.events_tx.clone();
        let task = self.runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately and beat 1 is already showing.
            interval.tick().await;
            loop {
                interval.tick().await;
                if events_tx.send(Event::Tick { generation }).is_err() {
                    return;
                }
            }
        });
        TickHandle::new(move || task.abort())
    }
}

struct Running {
    beat_count: u32,
    position: u32,
    period: Duration,
    _ticks: TickHandle,
}

/// Counts beats 1..=N and wraps around. At most one recurring tick exists at a time.
pub struct BeatCounter {
    ticker: Arc<dyn Ticker>,
    display: Arc<dyn DisplaySink>,
    generation: Generation,
    running: Option<Running>,
}

impl BeatCounter {
    pub fn new(ticker: Arc<dyn Ticker>, display: Arc<dyn DisplaySink>) -> BeatCounter {
        BeatCounter {
            ticker,
            display,
            generation: Generation::default(),
            running: None,
        }
    }

    /// Shows beat 1 and starts ticking at the given tempo. Restarts the counter if it
    /// was already running. The tempo is only read here.
    pub fn start(&mut self, beat_count: u32, tempo: u32) {
        // Cancel without hiding so the display goes straight to beat 1.
        self.running = None;
        if beat_count == 0 {
            warn!("Not starting a counter with zero beats.");
            self.stop();
            return;
        }

        let period = tick_period(tempo);
        self.generation = self.generation.next();
        info!(
            beat_count,
            period = ?period,
            generation = %self.generation,
            "Starting beat counter."
        );
        let ticks = self.ticker.schedule(period, self.generation);
        self.running = Some(Running {
            beat_count,
            position: 1,
            period,
            _ticks: ticks,
        });
        self.display.set_beat_position(Some(1));
    }

    /// Cancels the tick and hides the counter. Idempotent.
    pub fn stop(&mut self) {
        if self.running.take().is_some() {
            debug!(generation = %self.generation, "Stopped beat counter.");
        }
        self.display.set_beat_position(None);
    }

    /// Advances one beat. Ticks from a cancelled run are ignored.
    pub fn on_tick(&mut self, generation: Generation) {
        match &mut self.running {
            Some(running) if generation == self.generation => {
                running.position = running.position % running.beat_count + 1;
                self.display.set_beat_position(Some(running.position));
            }
            _ => debug!(generation = %generation, "Discarding stale tick."),
        }
    }

    /// The current beat, or 0 while stopped.
    pub fn position(&self) -> u32 {
        self.running.as_ref().map_or(0, |running| running.position)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The interval of the current run.
    pub fn period(&self) -> Option<Duration> {
        self.running.as_ref().map(|running| running.period)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }
}
