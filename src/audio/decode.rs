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
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info};

use super::AudioBuffer;
use crate::error::LoadError;

/// Decodes an entire audio file (FLAC, MP3, WAV, OGG, ...) into memory.
pub fn decode_file(path: &Path) -> Result<AudioBuffer, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::Io(path.to_path_buf(), e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Hint the probe with the extension.
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| LoadError::Decode(path.to_path_buf(), e))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LoadError::NoTrack(path.to_path_buf()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(&params, &decoder_opts)
        .map_err(|e| LoadError::Decode(path.to_path_buf(), e))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut sample_rate = params.sample_rate.unwrap_or(0);
    let mut sample_buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(LoadError::Decode(path.to_path_buf(), e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // A corrupt packet is skipped rather than failing the whole file.
                debug!(path = ?path, err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(LoadError::Decode(path.to_path_buf(), e)),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count() as u16;
        sample_rate = spec.rate;

        let required = decoded.capacity() * spec.channels.count();
        if sample_buffer
            .as_ref()
            .map_or(true, |buffer| buffer.capacity() < required)
        {
            sample_buffer = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buffer) = sample_buffer.as_mut() {
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());
        }
    }

    if samples.is_empty() || channels == 0 || sample_rate == 0 {
        return Err(LoadError::Empty(path.to_path_buf()));
    }

    let buffer = AudioBuffer::new(samples, channels, sample_rate);
    info!(
        path = ?path,
        channels,
        sample_rate,
        duration_ms = buffer.duration().as_millis(),
        "Decoded recording."
    );
    Ok(buffer)
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs};

    use hound::{SampleFormat, WavSpec, WavWriter};

    use super::decode_file;
    use crate::error::LoadError;

    #[test]
    fn test_decode_wav() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("teentaal_100_A.wav");
        let mut writer = WavWriter::create(
            &path,
            WavSpec {
                channels: 2,
                sample_rate: 8000,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        )?;
        for i in 0..8000 {
            let sample = if i % 2 == 0 { i16::MAX / 2 } else { i16::MIN / 2 };
            writer.write_sample(sample)?;
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;

        let buffer = decode_file(&path)?;
        assert_eq!(2, buffer.channels());
        assert_eq!(8000, buffer.sample_rate());
        assert_eq!(8000, buffer.frames());
        assert!((buffer.sample(0, 0) - 0.5).abs() < 0.01);
        assert!((buffer.sample(1, 0) + 0.5).abs() < 0.01);
        assert_eq!(0.0, buffer.sample(0, 1));
        Ok(())
    }

    #[test]
    fn test_decode_missing_file() {
        let result = decode_file(std::path::Path::new("does/not/exist.flac"));
        assert!(matches!(result, Err(LoadError::Io(_, _))));
    }

    #[test]
    fn test_decode_garbage() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("garbage.flac");
        fs::write(&path, b"this is not audio")?;
        assert!(matches!(decode_file(&path), Err(LoadError::Decode(_, _))));
        Ok(())
    }
}
