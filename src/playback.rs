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

//! The player itself: one loop player for the taal, one for the tanpura, and the
//! beat counter, all driven by [`Event`]s.
//!
//! The current taal, key and tempo are the only source of truth for what plays
//! next. Every restart stops the old session before the new one is started, so a
//! channel never has two graphs sounding at once.

use std::{path::PathBuf, sync::Arc};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, span, warn, Level};

use crate::{
    audio::{AudioBuffer, Backend, LoopStrategy},
    beat_counter::{BeatCounter, Ticker},
    catalog::{drone_locator, file_key, AssetCatalog},
    controller::{Channel, Event, Generation, TempoStep},
    cycles::CycleRegistry,
    display::DisplaySink,
    error::{LoadError, PlaybackError},
    loader::Loader,
    loop_player::LoopPlayer,
};

/// Startup parameters and tanpura location.
#[derive(Clone, Debug)]
pub struct Settings {
    pub cycle: String,
    pub key: String,
    pub tempo: u32,
    pub drone_directory: PathBuf,
    pub drone_extension: String,
    pub drone_volume: f32,
    pub registry: CycleRegistry,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            cycle: "teentaal".to_string(),
            key: "Gs".to_string(),
            tempo: 150,
            drone_directory: PathBuf::from("sounds/tanpura"),
            drone_extension: "mp3".to_string(),
            drone_volume: 0.25,
            registry: CycleRegistry::new(),
        }
    }
}

/// Owns the playback parameters and both channels.
pub struct PlaybackController {
    catalog: Arc<AssetCatalog>,
    registry: CycleRegistry,
    display: Arc<dyn DisplaySink>,
    rhythm: LoopPlayer,
    drone: LoopPlayer,
    counter: BeatCounter,
    cycle: String,
    key: String,
    tempo: u32,
    drone_enabled: bool,
    drone_directory: PathBuf,
    drone_extension: String,
}

impl PlaybackController {
    /// Creates a controller with both channels idle. The starting key and tempo are
    /// pinned to ones the catalog actually has, and the display is filled in.
    pub fn new(
        catalog: Arc<AssetCatalog>,
        display: Arc<dyn DisplaySink>,
        backend: Arc<dyn Backend>,
        loader: Arc<dyn Loader>,
        ticker: Arc<dyn Ticker>,
        events_tx: UnboundedSender<Event>,
        settings: Settings,
    ) -> PlaybackController {
        let rhythm = LoopPlayer::new(
            Channel::Rhythm,
            backend.clone(),
            loader.clone(),
            events_tx.clone(),
            LoopStrategy::Native,
            1.0,
        );
        let drone = LoopPlayer::new(
            Channel::Drone,
            backend,
            loader,
            events_tx,
            LoopStrategy::Rechain,
            settings.drone_volume,
        );

        let mut cycle = settings.cycle.to_lowercase();
        if !catalog.contains_cycle(&cycle) {
            if let Some(first) = catalog.cycles().first() {
                warn!(
                    taal = %cycle,
                    using = %first,
                    "Default taal is not in the catalog."
                );
                cycle = first.to_string();
            }
        }

        let mut playback = PlaybackController {
            counter: BeatCounter::new(ticker, display.clone()),
            catalog,
            registry: settings.registry,
            display,
            rhythm,
            drone,
            cycle,
            key: file_key(&settings.key),
            tempo: settings.tempo,
            drone_enabled: false,
            drone_directory: settings.drone_directory,
            drone_extension: settings.drone_extension,
        };
        playback.pin_key();
        playback.pin_tempo();
        playback.refresh_display();
        playback.display.set_drone_state(false);
        playback.display.set_beat_position(None);
        playback
    }

    pub fn cycle(&self) -> &str {
        &self.cycle
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    pub fn drone_enabled(&self) -> bool {
        self.drone_enabled
    }

    /// The beat the counter is showing, or 0 while hidden.
    pub fn beat_position(&self) -> u32 {
        self.counter.position()
    }

    /// Handles one event. Returns false once the controller should shut down.
    pub fn handle(&mut self, event: Event) -> bool {
        let result = match event {
            Event::CycleChanged(cycle) => self.set_cycle(&cycle),
            Event::KeyChanged(key) => self.set_key(&key),
            Event::TempoStep(step) => self.step_tempo(step),
            Event::PlayRequested => self.play_rhythm(),
            Event::StopRequested => {
                self.stop_rhythm();
                Ok(())
            }
            Event::DroneToggled(enabled) => self.set_drone_enabled(enabled),
            Event::DroneVolumeChanged(volume) => {
                self.set_drone_volume(volume);
                Ok(())
            }
            Event::Loaded {
                channel,
                generation,
                result,
            } => self.on_loaded(channel, generation, result),
            Event::Exhausted {
                channel,
                generation,
            } => self.on_exhausted(channel, generation),
            Event::Tick { generation } => {
                self.counter.on_tick(generation);
                Ok(())
            }
            Event::Shutdown => return false,
        };

        if let Err(e) = result {
            self.report(e);
        }
        true
    }

    /// Starts the taal with the current parameters, restarting it if it was already
    /// playing. The beat counter starts once the recording is sounding.
    pub fn play_rhythm(&mut self) -> Result<(), PlaybackError> {
        self.stop_rhythm();

        let span = span!(
            Level::INFO,
            "play taal",
            taal = %self.cycle,
            key = %self.key,
            tempo = self.tempo
        );
        let _enter = span.enter();

        let Some(locator) = self.catalog.resolve(&self.cycle, &self.key, self.tempo) else {
            return Err(PlaybackError::CatalogMismatch {
                cycle: self.cycle.clone(),
                key: self.key.clone(),
                tempo: self.tempo,
            });
        };
        let locator = locator.to_path_buf();
        self.rhythm.start(&locator);
        Ok(())
    }

    /// Stops the taal and hides the counter. Idempotent.
    pub fn stop_rhythm(&mut self) {
        self.rhythm.stop();
        self.counter.stop();
    }

    /// Starts the tanpura in the current key, restarting it if it was playing.
    pub fn play_drone(&mut self) {
        let locator = drone_locator(&self.drone_directory, &self.key, &self.drone_extension);
        self.drone.start(&locator);
    }

    pub fn stop_drone(&mut self) {
        self.drone.stop();
    }

    /// Selects a taal. Its key and tempo are pinned to ones it was recorded in, and
    /// a playing taal restarts with the new recording.
    pub fn set_cycle(&mut self, cycle: &str) -> Result<(), PlaybackError> {
        let cycle = cycle.to_lowercase();
        if !self.catalog.contains_cycle(&cycle) {
            return Err(PlaybackError::UnknownCycle(cycle));
        }

        info!(taal = %cycle, "Taal changed.");
        self.cycle = cycle;
        let key_changed = self.pin_key();
        self.pin_tempo();
        self.refresh_display();

        if self.rhythm.is_active() {
            self.play_rhythm()?;
        }
        // The tanpura follows the key, which may have had to change with the taal.
        if key_changed && self.drone_enabled {
            self.play_drone();
        }
        Ok(())
    }

    /// Selects a key. Both channels carry the key, so both restart if active.
    pub fn set_key(&mut self, key: &str) -> Result<(), PlaybackError> {
        let key = file_key(key);
        if !self.catalog.available_keys(&self.cycle).contains(&key.as_str()) {
            return Err(PlaybackError::UnknownKey {
                cycle: self.cycle.clone(),
                key,
            });
        }

        info!(key = %key, "Key changed.");
        self.key = key;
        self.pin_tempo();
        self.refresh_display();

        let rhythm = if self.rhythm.is_active() {
            self.play_rhythm()
        } else {
            Ok(())
        };
        if self.drone_enabled {
            self.play_drone();
        }
        rhythm
    }

    /// Moves one step along the tempo ladder. Does nothing at either end. The
    /// tanpura has no tempo and is never touched.
    pub fn step_tempo(&mut self, step: TempoStep) -> Result<(), PlaybackError> {
        let ladder = self.catalog.available_tempos(&self.cycle, &self.key);
        let Some(index) = ladder.iter().position(|tempo| *tempo == self.tempo) else {
            warn!(tempo = self.tempo, "Tempo is not on the ladder.");
            return Ok(());
        };

        let next = match step {
            TempoStep::Up => ladder.get(index + 1),
            TempoStep::Down => index.checked_sub(1).and_then(|i| ladder.get(i)),
        };
        let Some(tempo) = next.copied() else {
            debug!(tempo = self.tempo, step = ?step, "Already at the end of the ladder.");
            return Ok(());
        };

        info!(tempo, "Tempo changed.");
        self.tempo = tempo;
        self.display.set_tempo_label(tempo);
        if self.rhythm.is_active() {
            self.play_rhythm()?;
        }
        Ok(())
    }

    /// Switches the tanpura on or off. The taal is never affected.
    pub fn set_drone_enabled(&mut self, enabled: bool) -> Result<(), PlaybackError> {
        info!(enabled, "Tanpura toggled.");
        self.drone_enabled = enabled;
        self.display.set_drone_state(enabled);
        if enabled {
            self.play_drone();
        } else {
            self.stop_drone();
        }
        Ok(())
    }

    pub fn set_drone_volume(&mut self, volume: f32) {
        self.drone.set_volume(volume);
        debug!(volume = self.drone.volume(), "Tanpura volume changed.");
    }

    /// Stops everything.
    pub fn shutdown(&mut self) {
        info!("Shutting down playback.");
        self.stop_rhythm();
        self.stop_drone();
    }

    fn on_loaded(
        &mut self,
        channel: Channel,
        generation: Generation,
        result: Result<Arc<AudioBuffer>, LoadError>,
    ) -> Result<(), PlaybackError> {
        match channel {
            Channel::Rhythm => match self.rhythm.on_loaded(generation, result) {
                Ok(true) => {
                    match self.registry.beat_count(&self.cycle) {
                        Some(beat_count) => self.counter.start(beat_count, self.tempo),
                        None => warn!(taal = %self.cycle, "Unknown beat count, not counting."),
                    }
                    Ok(())
                }
                Ok(false) => Ok(()),
                Err(e) => {
                    self.counter.stop();
                    Err(e)
                }
            },
            Channel::Drone => self.drone.on_loaded(generation, result).map(|_| ()),
        }
    }

    fn on_exhausted(
        &mut self,
        channel: Channel,
        generation: Generation,
    ) -> Result<(), PlaybackError> {
        match channel {
            Channel::Rhythm => self.rhythm.on_exhausted(generation, true),
            Channel::Drone => self.drone.on_exhausted(generation, self.drone_enabled),
        }
    }

    /// Keeps the key if the taal has it, otherwise picks the first one recorded.
    /// Returns true if the key changed.
    fn pin_key(&mut self) -> bool {
        let keys = self.catalog.available_keys(&self.cycle);
        if keys.contains(&self.key.as_str()) {
            return false;
        }
        let Some(first) = keys.first() else {
            return false;
        };
        info!(from = %self.key, to = %first, "Key not recorded for taal.");
        self.key = first.to_string();
        true
    }

    /// Keeps the tempo if it's on the ladder, otherwise picks the slowest.
    fn pin_tempo(&mut self) {
        let tempos = self.catalog.available_tempos(&self.cycle, &self.key);
        if tempos.contains(&self.tempo) {
            return;
        }
        if let Some(first) = tempos.first() {
            info!(from = self.tempo, to = first, "Tempo not recorded.");
            self.tempo = *first;
        }
    }

    fn refresh_display(&self) {
        let cycles: Vec<(String, Option<u32>)> = self
            .catalog
            .cycles()
            .into_iter()
            .map(|cycle| {
                let name = self.catalog.display_name(cycle).unwrap_or(cycle).to_string();
                (name, self.registry.beat_count(cycle))
            })
            .collect();
        let selected = self
            .catalog
            .display_name(&self.cycle)
            .unwrap_or(&self.cycle)
            .to_string();
        self.display.set_available_cycles(&cycles, &selected);

        let keys: Vec<String> = self
            .catalog
            .available_keys(&self.cycle)
            .into_iter()
            .map(str::to_string)
            .collect();
        self.display.set_available_keys(&keys, &self.key);
        self.display.set_tempo_label(self.tempo);

        let beat_count = self.registry.beat_count(&self.cycle);
        if beat_count.is_none() {
            warn!(taal = %self.cycle, "No beat count registered for taal.");
        }
        self.display.set_beat_count_label(beat_count);
    }

    fn report(&self, err: PlaybackError) {
        error!(err = %err, "Playback error");
        self.display.report_error(&err);
    }
}
