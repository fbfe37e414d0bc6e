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
use std::io::{self, Write};

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::catalog::display_key;
use crate::error::PlaybackError;

/// Whatever shows the player's state to the user. Keys are passed in file form
/// (`Gs`); implementations convert them for display.
pub trait DisplaySink: Send + Sync {
    /// Shows the number of beats in the selected taal. None when it's unknown.
    fn set_beat_count_label(&self, count: Option<u32>);

    /// Shows the current beat. None hides the counter.
    fn set_beat_position(&self, position: Option<u32>);

    fn set_tempo_label(&self, bpm: u32);

    fn set_available_keys(&self, keys: &[String], selected: &str);

    /// Lists taals with their beat counts.
    fn set_available_cycles(&self, cycles: &[(String, Option<u32>)], selected: &str);

    fn set_drone_state(&self, enabled: bool);

    /// Surfaces a failure. Failures never stop the player.
    fn report_error(&self, error: &PlaybackError);
}

/// Writes the player's state as text lines.
pub struct ConsoleDisplay<W: Write + Send> {
    writer: Mutex<W>,
    beat_count: Mutex<Option<u32>>,
}

impl ConsoleDisplay<io::Stdout> {
    /// A display printing to standard out.
    pub fn stdout() -> ConsoleDisplay<io::Stdout> {
        ConsoleDisplay::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleDisplay<W> {
    pub fn new(writer: W) -> ConsoleDisplay<W> {
        ConsoleDisplay {
            writer: Mutex::new(writer),
            beat_count: Mutex::new(None),
        }
    }

    fn line(&self, line: String) {
        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!(err = %e, "Unable to write to display");
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> DisplaySink for ConsoleDisplay<W> {
    fn set_beat_count_label(&self, count: Option<u32>) {
        *self.beat_count.lock() = count;
        match count {
            Some(count) => self.line(format!("Matras: {}", count)),
            None => self.line("Matras: ?".to_string()),
        }
    }

    fn set_beat_position(&self, position: Option<u32>) {
        // Nothing to show while stopped; the counter just disappears.
        let Some(position) = position else {
            return;
        };
        match *self.beat_count.lock() {
            Some(count) => self.line(format!("{}/{}", position, count)),
            None => self.line(position.to_string()),
        }
    }

    fn set_tempo_label(&self, bpm: u32) {
        self.line(format!("Tempo: {} bpm", bpm));
    }

    fn set_available_keys(&self, keys: &[String], selected: &str) {
        let keys: Vec<String> = keys
            .iter()
            .map(|key| {
                if key == selected {
                    format!("[{}]", display_key(key))
                } else {
                    display_key(key)
                }
            })
            .collect();
        self.line(format!("Keys: {}", keys.join(" ")));
    }

    fn set_available_cycles(&self, cycles: &[(String, Option<u32>)], selected: &str) {
        let cycles: Vec<String> = cycles
            .iter()
            .map(|(name, count)| {
                let label = match count {
                    Some(count) => format!("{} ({})", name, count),
                    None => name.clone(),
                };
                if name.eq_ignore_ascii_case(selected) {
                    format!("[{}]", label)
                } else {
                    label
                }
            })
            .collect();
        self.line(format!("Taals: {}", cycles.join(" ")));
    }

    fn set_drone_state(&self, enabled: bool) {
        self.line(format!("Tanpura: {}", if enabled { "on" } else { "off" }));
    }

    fn report_error(&self, err: &PlaybackError) {
        error!(err = %err, "Playback error");
        self.line(format!("Error: {}", err));
    }
}
