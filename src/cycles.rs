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
use std::collections::HashMap;

use tracing::warn;

/// Beat counts for the taals the recordings ship with.
const BUILTIN_BEAT_COUNTS: [(&str, u32); 3] = [("ektaal", 12), ("teentaal", 16), ("jhaptaal", 10)];

/// Maps a taal name to the number of beats (matras) in one cycle.
/// Names are matched case-insensitively.
#[derive(Clone, Debug)]
pub struct CycleRegistry {
    beat_counts: HashMap<String, u32>,
}

impl CycleRegistry {
    /// Creates a registry with the built-in taals.
    pub fn new() -> CycleRegistry {
        CycleRegistry {
            beat_counts: BUILTIN_BEAT_COUNTS
                .iter()
                .map(|(name, count)| (name.to_string(), *count))
                .collect(),
        }
    }

    /// Creates a registry with the built-in taals plus the given extras. Extras
    /// override built-in entries of the same name. Zero beat counts are dropped.
    pub fn with_extra(extra: &HashMap<String, u32>) -> CycleRegistry {
        let mut registry = CycleRegistry::new();
        for (name, count) in extra {
            if *count == 0 {
                warn!(taal = name, "Ignoring taal with zero beats.");
                continue;
            }
            registry.beat_counts.insert(name.to_lowercase(), *count);
        }
        registry
    }

    /// Returns the beat count for the given taal, if known.
    pub fn beat_count(&self, cycle: &str) -> Option<u32> {
        self.beat_counts.get(&cycle.to_lowercase()).copied()
    }
}

impl Default for CycleRegistry {
    fn default() -> Self {
        CycleRegistry::new()
    }
}
