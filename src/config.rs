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
use std::{
    collections::HashMap,
    error::Error,
    path::{Path, PathBuf},
    sync::Arc,
};

use config::{Config, File};
use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::info;

use crate::{
    audio::{self, cpal::DEFAULT_SAMPLE_RATE},
    beat_counter::IntervalTicker,
    catalog::AssetCatalog,
    controller::{keyboard, Controller, Event},
    cycles::CycleRegistry,
    display::ConsoleDisplay,
    loader::DecodingLoader,
    playback::{PlaybackController, Settings},
};

pub use self::error::ConfigError;

mod error;

const DEFAULT_EXTENSION: &str = "flac";
const DEFAULT_TANPURA_EXTENSION: &str = "mp3";

/// A YAML representation of the player configuration. Relative paths are resolved
/// against the directory holding the configuration file.
#[derive(Deserialize, Clone, Debug)]
pub struct Player {
    /// The audio device. Names starting with "mock" use the in-memory backend.
    audio_device: String,

    /// Output sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// The directory holding the taal recordings.
    taal_directory: String,

    /// The directory holding the tanpura recordings.
    tanpura_directory: String,

    /// A JSON list of taal file names inside the taal directory. The directory is
    /// listed when absent.
    manifest: Option<String>,

    /// The extension of taal recordings (default: flac).
    extension: Option<String>,

    /// The extension of tanpura recordings (default: mp3).
    tanpura_extension: Option<String>,

    default_cycle: Option<String>,
    default_key: Option<String>,
    default_tempo: Option<u32>,

    /// Tanpura volume between 0 and 1 (default: 0.25).
    drone_volume: Option<f32>,

    /// Beat counts for taals beyond the built-in ones.
    beat_counts: Option<HashMap<String, u32>>,
}

impl Player {
    /// Parses the player configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Player>()?)
    }

    pub fn audio_device(&self) -> &str {
        &self.audio_device
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or(DEFAULT_EXTENSION)
    }

    /// Where the catalog is read from: the manifest if there is one, otherwise the
    /// taal directory itself.
    pub fn catalog_path(&self, base: &Path) -> PathBuf {
        let taal_directory = base.join(&self.taal_directory);
        match &self.manifest {
            Some(manifest) => taal_directory.join(manifest),
            None => taal_directory,
        }
    }

    /// The startup parameters of the player.
    pub fn settings(&self, base: &Path) -> Settings {
        let defaults = Settings::default();
        Settings {
            cycle: self.default_cycle.clone().unwrap_or(defaults.cycle),
            key: self.default_key.clone().unwrap_or(defaults.key),
            tempo: self.default_tempo.unwrap_or(defaults.tempo),
            drone_directory: base.join(&self.tanpura_directory),
            drone_extension: self
                .tanpura_extension
                .clone()
                .unwrap_or_else(|| DEFAULT_TANPURA_EXTENSION.to_string()),
            drone_volume: self.drone_volume.unwrap_or(defaults.drone_volume),
            registry: match &self.beat_counts {
                Some(beat_counts) => CycleRegistry::with_extra(beat_counts),
                None => defaults.registry,
            },
        }
    }
}

/// Builds the playback controller described by the given config file. Load
/// results and ticks are posted to `events_tx`.
pub fn init_playback(
    path: &Path,
    events_tx: UnboundedSender<Event>,
) -> Result<PlaybackController, Box<dyn Error>> {
    let player = Player::deserialize(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let catalog = AssetCatalog::load(&player.catalog_path(base), player.extension())?;
    info!(recordings = catalog.len(), "Loaded catalog.");
    let backend = audio::get_backend(player.audio_device(), player.sample_rate())?;
    info!(backend = %backend, "Opened audio backend.");

    Ok(PlaybackController::new(
        Arc::new(catalog),
        Arc::new(ConsoleDisplay::stdout()),
        backend,
        Arc::new(DecodingLoader::new(events_tx.clone(), player.sample_rate())?),
        Arc::new(IntervalTicker::new(events_tx.clone())?),
        events_tx,
        player.settings(base),
    ))
}

/// Initializes the player from the given config file and returns the controller
/// running it with the keyboard driver.
pub fn init_controller(path: &Path) -> Result<Controller, Box<dyn Error>> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let playback = init_playback(path, events_tx.clone())?;
    Ok(Controller::new(
        playback,
        Arc::new(keyboard::Driver::new()),
        events_tx,
        events_rx,
    ))
}
