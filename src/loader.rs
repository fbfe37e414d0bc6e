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

//! Asynchronous loading of recordings.
//!
//! A load request never blocks the event loop: the recording is decoded on a
//! blocking worker and the result comes back as an [`Event::Loaded`] tagged with
//! the channel and generation that asked for it.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use tokio::{
    runtime::{Handle, TryCurrentError},
    sync::mpsc::UnboundedSender,
};
use tracing::{debug, error};

use crate::audio::{decode::decode_file, resample::resample, AudioBuffer};
use crate::controller::{Channel, Event, Generation};
use crate::error::LoadError;

/// A request to load one recording on behalf of a channel session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadTicket {
    pub channel: Channel,
    pub generation: Generation,
    pub locator: PathBuf,
}

/// Loads recordings. Implementations must eventually answer every ticket with an
/// [`Event::Loaded`] carrying the ticket's channel and generation.
pub trait Loader: Send + Sync {
    fn request(&self, ticket: LoadTicket);
}

/// Decodes recordings from disk on the tokio blocking pool and converts them to the
/// output rate. Converted recordings are cached, so switching back to a recording
/// doesn't decode it again.
pub struct DecodingLoader {
    runtime: Handle,
    sample_rate: u32,
    events_tx: UnboundedSender<Event>,
    cache: Arc<Mutex<HashMap<PathBuf, Arc<AudioBuffer>>>>,
}

impl DecodingLoader {
    /// Creates a loader bound to the current tokio runtime.
    pub fn new(
        events_tx: UnboundedSender<Event>,
        sample_rate: u32,
    ) -> Result<DecodingLoader, TryCurrentError> {
        Ok(DecodingLoader {
            runtime: Handle::try_current()?,
            sample_rate,
            events_tx,
            cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn load(
        cache: &Mutex<HashMap<PathBuf, Arc<AudioBuffer>>>,
        locator: &Path,
        sample_rate: u32,
    ) -> Result<Arc<AudioBuffer>, LoadError> {
        if let Some(buffer) = cache.lock().get(locator) {
            debug!(path = ?locator, "Using cached recording");
            return Ok(buffer.clone());
        }

        let buffer = resample(decode_file(locator)?, sample_rate)
            .map_err(|e| LoadError::Resample(locator.to_path_buf(), e))?;
        let buffer = Arc::new(buffer);
        cache.lock().insert(locator.to_path_buf(), buffer.clone());
        Ok(buffer)
    }
}

impl Loader for DecodingLoader {
    fn request(&self, ticket: LoadTicket) {
        let cache = self.cache.clone();
        let events_tx = self.events_tx.clone();
        let locator = ticket.locator.clone();
        let sample_rate = self.sample_rate;
        let decode = self
            .runtime
            .spawn_blocking(move || DecodingLoader::load(&cache, &locator, sample_rate));

        self.runtime.spawn(async move {
            let result = match decode.await {
                Ok(result) => result,
                Err(e) => {
                    error!(err = %e, path = ?ticket.locator, "Decoder task failed");
                    Err(LoadError::Abandoned(ticket.locator.clone()))
                }
            };
            let event = Event::Loaded {
                channel: ticket.channel,
                generation: ticket.generation,
                result,
            };
            // The receiver is gone once the controller has shut down.
            if events_tx.send(event).is_err() {
                debug!("Dropping load result, controller has shut down.");
            }
        });
    }
}
