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

//! Looping tabla (taal) and tanpura playback kept in step with a beat counter.

pub mod audio;
pub mod beat_counter;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod cycles;
pub mod display;
pub mod error;
pub mod loader;
pub mod loop_player;
pub mod playback;
#[cfg(test)]
mod testutil;
