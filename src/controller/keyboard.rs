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
use std::io;

use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::{Event, TempoStep};
use crate::catalog::file_key;

const PLAY: &str = "play";
const STOP: &str = "stop";
const TAAL: &str = "taal";
const KEY: &str = "key";
const FASTER: &str = "faster";
const SLOWER: &str = "slower";
const TANPURA: &str = "tanpura";
const VOLUME: &str = "volume";
const QUIT: &str = "quit";

/// Parses one line of keyboard input. Returns None for unrecognized input.
pub fn parse_command(input: &str) -> Option<Event> {
    let mut words = input.split_whitespace();
    let command = words.next()?.to_lowercase();
    let argument = words.next();
    if words.next().is_some() {
        return None;
    }

    match (command.as_str(), argument) {
        (PLAY, None) => Some(Event::PlayRequested),
        (STOP, None) => Some(Event::StopRequested),
        (TAAL, Some(name)) => Some(Event::CycleChanged(name.to_lowercase())),
        (KEY, Some(key)) => Some(Event::KeyChanged(file_key(key))),
        (FASTER, None) => Some(Event::TempoStep(TempoStep::Up)),
        (SLOWER, None) => Some(Event::TempoStep(TempoStep::Down)),
        (TANPURA, Some(state)) => match state.to_lowercase().as_str() {
            "on" => Some(Event::DroneToggled(true)),
            "off" => Some(Event::DroneToggled(false)),
            _ => None,
        },
        (VOLUME, Some(volume)) => volume.parse::<f32>().ok().map(Event::DroneVolumeChanged),
        (QUIT, None) => Some(Event::Shutdown),
        _ => None,
    }
}

/// A driver that reads commands from the keyboard.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Prompts for and forwards one command. Returns false once input is exhausted or
    /// the user quit.
    fn monitor_io<R, W>(
        events_tx: &UnboundedSender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}, {}, {} <name>, {} <key>, {}, {}, {} on|off, {} <0-1>, {}): ",
            PLAY, STOP, TAAL, KEY, FASTER, SLOWER, TANPURA, VOLUME, QUIT,
        )?;
        writer.flush()?;

        let mut input = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .send(Event::Shutdown)
                .map_err(|e| io::Error::other(e.to_string()))?;
            return Ok(false);
        }

        let Some(event) = parse_command(&input) else {
            warn!(input = input.trim(), "Unrecognized input");
            return Ok(true);
        };
        let keep_going = !matches!(event, Event::Shutdown);
        events_tx
            .send(event)
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(keep_going)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(
        &self,
        events_tx: UnboundedSender<Event>,
    ) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}
