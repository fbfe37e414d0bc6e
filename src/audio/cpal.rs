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
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, span, warn, Level};

use super::{AudioBuffer, AudioError, AudioGraph, ExhaustedCallback, LoopStrategy};
use crate::controller::Channel;

/// The output rate used when none is configured.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Lists output devices on every host.
pub fn list_devices() -> Result<Vec<String>, AudioError> {
    let mut devices: Vec<String> = list_cpal_devices()?
        .into_iter()
        .map(|(name, channels, host_id, _)| {
            format!("{} (Channels={}) ({})", name, channels, host_id.name())
        })
        .collect();
    devices.sort();
    Ok(devices)
}

/// Lists cpal output devices with their name, channel count and host.
fn list_cpal_devices() -> Result<Vec<(String, u16, cpal::HostId, cpal::Device)>, AudioError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout().map_err(|e| AudioError::Backend(e.to_string()))?;
    let _shh_stderr = shh::stderr().map_err(|e| AudioError::Backend(e.to_string()))?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host = cpal::host_from_id(host_id).map_err(|e| AudioError::Backend(e.to_string()))?;
        let host_devices = match host.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs
                .map(|config| config.channels())
                .max()
                .unwrap_or(0);
            if max_channels == 0 {
                continue;
            }

            #[allow(deprecated)]
            let name = device.name().map_err(|e| AudioError::Backend(e.to_string()))?;
            devices.push((name, max_channels, host_id, device));
        }
    }
    Ok(devices)
}

/// Changes applied by the audio callback before it mixes the next block.
enum Command {
    Start { id: u64, voice: Voice },
    Stop { id: u64 },
    Gain { id: u64, gain: f32 },
}

/// One graph's buffer source and gain stage, as seen by the audio thread.
struct Voice {
    /// Already at the stream's rate.
    buffer: Arc<AudioBuffer>,
    position: usize,
    gain: f32,
    strategy: LoopStrategy,
    on_exhausted: ExhaustedCallback,
    /// Cleared by the graph when it is stopped, so a voice that runs out at the same
    /// moment stays quiet.
    live: Arc<AtomicBool>,
}

/// Mixes every voice into the output.
struct Mixer {
    channels: usize,
    voices: Vec<(u64, Voice)>,
}

impl Mixer {
    fn new(channels: u16) -> Mixer {
        Mixer {
            channels: channels.max(1) as usize,
            voices: Vec::new(),
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Start { id, voice } => {
                self.voices.retain(|(existing, _)| *existing != id);
                self.voices.push((id, voice));
            }
            Command::Stop { id } => self.voices.retain(|(existing, _)| *existing != id),
            Command::Gain { id, gain } => {
                if let Some((_, voice)) = self.voices.iter_mut().find(|(existing, _)| *existing == id)
                {
                    voice.gain = gain;
                }
            }
        }
    }

    /// Fills the interleaved output block.
    fn process(&mut self, output: &mut [f32]) {
        output.fill(0.0);
        let channels = self.channels;

        self.voices.retain_mut(|(_, voice)| {
            let frames = voice.buffer.frames();
            if frames == 0 {
                return false;
            }

            for frame in output.chunks_mut(channels) {
                for (channel, sample) in frame.iter_mut().enumerate() {
                    *sample += voice.buffer.sample(voice.position, channel) * voice.gain;
                }

                voice.position += 1;
                if voice.position >= frames {
                    match voice.strategy {
                        LoopStrategy::Native => voice.position = 0,
                        LoopStrategy::Rechain => {
                            if voice.live.load(Ordering::Acquire) {
                                (voice.on_exhausted)();
                            }
                            return false;
                        }
                    }
                }
            }
            true
        });
    }
}

/// Plays graphs through a cpal output stream. All graphs share one stream and are
/// mixed in its callback.
pub struct Backend {
    name: String,
    channels: u16,
    sample_rate: u32,
    next_id: AtomicU64,
    commands: Sender<Command>,
    shutdown: Option<Sender<()>>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl Backend {
    /// Opens the named output device. "default" picks the host's default output.
    pub fn get(name: &str, sample_rate: u32) -> Result<Backend, AudioError> {
        let span = span!(Level::INFO, "cpal backend", device = name);
        let _enter = span.enter();

        let (device_name, device) = if name == "default" {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))?;
            #[allow(deprecated)]
            let device_name = device.name().unwrap_or_else(|_| name.to_string());
            (device_name, device)
        } else {
            list_cpal_devices()?
                .into_iter()
                .find(|(device_name, _, _, _)| device_name.trim() == name)
                .map(|(device_name, _, _, device)| (device_name, device))
                .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))?
        };

        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::Backend(e.to_string()))?;
        let channels = default_config.channels();
        let sample_format = default_config.sample_format();

        let (commands, command_rx) = crossbeam_channel::unbounded();
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        // The stream isn't Send, so it lives and dies on its own thread.
        let output_thread = thread::spawn(move || {
            let config = cpal::StreamConfig {
                channels,
                sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };
            let mixer = Mixer::new(channels);

            let stream = match sample_format {
                cpal::SampleFormat::I16 => {
                    build_stream::<i16>(&device, &config, mixer, command_rx)
                }
                cpal::SampleFormat::I32 => {
                    build_stream::<i32>(&device, &config, mixer, command_rx)
                }
                cpal::SampleFormat::U16 => {
                    build_stream::<u16>(&device, &config, mixer, command_rx)
                }
                _ => build_stream::<f32>(&device, &config, mixer, command_rx),
            }
            .and_then(|stream| {
                stream
                    .play()
                    .map_err(|e| AudioError::Backend(e.to_string()))?;
                Ok(stream)
            });

            match stream {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Blocks until the backend is dropped.
                    let _ = shutdown_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        ready_rx
            .recv()
            .map_err(|e| AudioError::Backend(e.to_string()))??;
        info!(
            device = %device_name,
            channels,
            sample_rate,
            "Output stream started."
        );

        Ok(Backend {
            name: device_name,
            channels,
            sample_rate,
            next_id: AtomicU64::new(1),
            commands,
            shutdown: Some(shutdown),
            output_thread: Some(output_thread),
        })
    }
}

/// Builds an output stream that converts the mixer's f32 output to the device's
/// sample type.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
    commands: Receiver<Command>,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                while let Ok(command) = commands.try_recv() {
                    mixer.apply(command);
                }
                scratch.resize(data.len(), 0.0);
                mixer.process(&mut scratch);
                for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                    *dst = T::from_sample(*src);
                }
            },
            |err| error!("CPAL output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Backend(e.to_string()))
}

impl Drop for Backend {
    fn drop(&mut self) {
        // Closing the shutdown channel releases the output thread.
        self.shutdown.take();
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({} Hz)",
            self.name, self.channels, self.sample_rate
        )
    }
}

impl super::Backend for Backend {
    fn create_graph(&self, channel: Channel) -> Result<Box<dyn AudioGraph>, AudioError> {
        Ok(Box::new(Graph {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            channel,
            sample_rate: self.sample_rate,
            commands: self.commands.clone(),
            live: Arc::new(AtomicBool::new(false)),
        }))
    }
}

/// A graph backed by one voice in the shared mixer.
struct Graph {
    id: u64,
    channel: Channel,
    sample_rate: u32,
    commands: Sender<Command>,
    live: Arc<AtomicBool>,
}

impl Graph {
    fn send(&self, command: Command) -> Result<(), AudioError> {
        self.commands
            .send(command)
            .map_err(|_| AudioError::Backend("output stream has stopped".to_string()))
    }
}

impl AudioGraph for Graph {
    fn start(
        &mut self,
        buffer: Arc<AudioBuffer>,
        gain: f32,
        strategy: LoopStrategy,
        on_exhausted: ExhaustedCallback,
    ) -> Result<(), AudioError> {
        if buffer.sample_rate() != self.sample_rate {
            warn!(
                channel = %self.channel,
                buffer_rate = buffer.sample_rate(),
                stream_rate = self.sample_rate,
                "Recording doesn't match the stream rate and will play off pitch."
            );
        }
        self.live.store(false, Ordering::Release);
        self.live = Arc::new(AtomicBool::new(true));
        info!(
            channel = %self.channel,
            frames = buffer.frames(),
            strategy = ?strategy,
            "Starting voice."
        );
        self.send(Command::Start {
            id: self.id,
            voice: Voice {
                buffer,
                position: 0,
                gain,
                strategy,
                on_exhausted,
                live: self.live.clone(),
            },
        })
    }

    fn stop(&mut self) {
        self.live.store(false, Ordering::Release);
        // Nothing left to silence if the stream is gone.
        let _ = self.send(Command::Stop { id: self.id });
    }

    fn set_gain(&mut self, gain: f32) {
        let _ = self.send(Command::Gain { id: self.id, gain });
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    };

    use super::{Command, Mixer, Voice};
    use crate::audio::{AudioBuffer, ExhaustedCallback, LoopStrategy};

    fn voice(
        samples: Vec<f32>,
        strategy: LoopStrategy,
        on_exhausted: ExhaustedCallback,
    ) -> (Voice, Arc<AtomicBool>) {
        let live = Arc::new(AtomicBool::new(true));
        (
            Voice {
                buffer: Arc::new(AudioBuffer::new(samples, 1, 4)),
                position: 0,
                gain: 1.0,
                strategy,
                on_exhausted,
                live: live.clone(),
            },
            live,
        )
    }

    fn counter() -> (ExhaustedCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (
            Arc::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
            count,
        )
    }

    #[test]
    fn test_native_loop_wraps_without_gap() {
        let mut mixer = Mixer::new(1);
        let (on_exhausted, exhausted) = counter();
        let (voice, _live) = voice(vec![0.1, 0.2, 0.3], LoopStrategy::Native, on_exhausted);
        mixer.apply(Command::Start { id: 1, voice });

        let mut output = vec![0.0; 7];
        mixer.process(&mut output);
        assert_eq!(vec![0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1], output);
        assert_eq!(0, exhausted.load(Ordering::SeqCst));
        assert_eq!(1, mixer.voices.len());
    }

    #[test]
    fn test_rechain_reports_once() {
        let mut mixer = Mixer::new(2);
        let (on_exhausted, exhausted) = counter();
        let (voice, _live) = voice(vec![0.5, 0.25], LoopStrategy::Rechain, on_exhausted);
        mixer.apply(Command::Start { id: 1, voice });

        let mut output = vec![0.0; 8];
        mixer.process(&mut output);
        // Mono feeds both output channels, then silence once the buffer ends.
        assert_eq!(vec![0.5, 0.5, 0.25, 0.25, 0.0, 0.0, 0.0, 0.0], output);
        assert_eq!(1, exhausted.load(Ordering::SeqCst));
        assert!(mixer.voices.is_empty());

        mixer.process(&mut output);
        assert_eq!(1, exhausted.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stopped_voice_stays_quiet() {
        let mut mixer = Mixer::new(1);
        let (on_exhausted, exhausted) = counter();
        let (voice, live) = voice(vec![0.5, 0.25], LoopStrategy::Rechain, on_exhausted);
        mixer.apply(Command::Start { id: 1, voice });

        // The graph was stopped but the command hasn't been applied yet.
        live.store(false, Ordering::SeqCst);
        let mut output = vec![0.0; 4];
        mixer.process(&mut output);
        assert_eq!(0, exhausted.load(Ordering::SeqCst));

        let (on_exhausted, _) = counter();
        let (voice, _live) = self::voice(vec![0.5], LoopStrategy::Native, on_exhausted);
        mixer.apply(Command::Start { id: 2, voice });
        mixer.apply(Command::Stop { id: 2 });
        mixer.process(&mut output);
        assert_eq!(vec![0.0; 4], output);
    }

    #[test]
    fn test_gain_and_restart() {
        let mut mixer = Mixer::new(1);
        let (on_exhausted, _) = counter();
        let (first, _live) = voice(vec![1.0; 4], LoopStrategy::Native, on_exhausted.clone());
        mixer.apply(Command::Start { id: 1, voice: first });
        mixer.apply(Command::Gain { id: 1, gain: 0.5 });

        let mut output = vec![0.0; 2];
        mixer.process(&mut output);
        assert_eq!(vec![0.5, 0.5], output);

        // Starting the same graph again replaces its voice rather than layering.
        let (second, _live) = voice(vec![0.25; 4], LoopStrategy::Native, on_exhausted);
        mixer.apply(Command::Start { id: 1, voice: second });
        mixer.process(&mut output);
        assert_eq!(vec![0.25, 0.25], output);
        assert_eq!(1, mixer.voices.len());
    }
}
