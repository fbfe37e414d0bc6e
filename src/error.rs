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
use std::path::PathBuf;

use crate::audio::{resample::ResampleError, AudioError};

/// Errors raised while building the asset catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unable to read manifest {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("manifest {0} is not a JSON list of file names: {1}")]
    Manifest(PathBuf, #[source] serde_json::Error),
}

/// Errors raised while fetching or decoding an audio resource.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unable to open {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("unable to decode {0}: {1}")]
    Decode(PathBuf, #[source] symphonia::core::errors::Error),

    #[error("{0} contains no playable audio track")]
    NoTrack(PathBuf),

    #[error("{0} decoded to an empty buffer")]
    Empty(PathBuf),

    #[error("unable to convert {0} to the output rate: {1}")]
    Resample(PathBuf, #[source] ResampleError),

    #[error("load of {0} was abandoned before it completed")]
    Abandoned(PathBuf),
}

/// Everything that can go wrong while the player reacts to an event. None of
/// these are fatal: the affected channel falls back to idle.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("no recording for taal {cycle} in key {key} at {tempo} bpm")]
    CatalogMismatch {
        cycle: String,
        key: String,
        tempo: u32,
    },

    #[error("taal {0} is not in the catalog")]
    UnknownCycle(String),

    #[error("key {key} is not available for taal {cycle}")]
    UnknownKey { cycle: String, key: String },

    #[error("load failed: {0}")]
    Load(#[from] LoadError),

    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
}
