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
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::info;

use super::AudioBuffer;

/// Length of the sinc filter.
const SINC_LEN: usize = 256;

/// Frames borrowed from the opposite end of the recording on each side, so the
/// filter sees the loop point as continuous audio.
const WRAP_FRAMES: usize = SINC_LEN;

#[derive(Debug, thiserror::Error)]
#[error("unable to resample from {from} Hz to {to} Hz: {reason}")]
pub struct ResampleError {
    from: u32,
    to: u32,
    reason: String,
}

/// Converts a looping recording to the given sample rate. Buffers already at that
/// rate are returned untouched.
pub fn resample(buffer: AudioBuffer, target_rate: u32) -> Result<AudioBuffer, ResampleError> {
    let source_rate = buffer.sample_rate();
    if source_rate == target_rate || buffer.frames() == 0 {
        return Ok(buffer);
    }
    let error = |reason: String| ResampleError {
        from: source_rate,
        to: target_rate,
        reason,
    };
    if source_rate == 0 || target_rate == 0 {
        return Err(error("sample rate must be non-zero".to_string()));
    }

    let channels = buffer.channels() as usize;
    let frames = buffer.frames();
    let ratio = target_rate as f64 / source_rate as f64;

    // Planar input with the end of the loop in front and its start behind.
    let padded = frames + 2 * WRAP_FRAMES;
    let mut planar = vec![Vec::with_capacity(padded); channels];
    for offset in 0..padded {
        let frame = (offset as isize - WRAP_FRAMES as isize).rem_euclid(frames as isize) as usize;
        for (channel, samples) in planar.iter_mut().enumerate() {
            samples.push(buffer.sample(frame, channel));
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, padded, channels)
        .map_err(|e| error(e.to_string()))?;
    let output = resampler
        .process(&planar, None)
        .map_err(|e| error(e.to_string()))?;

    // Drop the filter delay and the wrapped lead-in, then keep one loop's worth.
    let skip = resampler.output_delay() + (WRAP_FRAMES as f64 * ratio).round() as usize;
    let expected = (frames as f64 * ratio).round() as usize;
    let available = output
        .first()
        .map_or(0, |samples| samples.len().saturating_sub(skip));
    let out_frames = expected.min(available);
    if out_frames == 0 {
        return Err(error("resampler produced no output".to_string()));
    }

    let mut samples = Vec::with_capacity(out_frames * channels);
    for frame in skip..skip + out_frames {
        for channel in &output {
            samples.push(channel[frame]);
        }
    }

    info!(
        from = source_rate,
        to = target_rate,
        frames = out_frames,
        "Resampled recording."
    );
    Ok(AudioBuffer::new(samples, channels as u16, target_rate))
}

#[cfg(test)]
mod test {
    use std::{error::Error, f32::consts::PI};

    use super::resample;
    use crate::audio::AudioBuffer;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_same_rate_is_untouched() -> Result<(), Box<dyn Error>> {
        let buffer = resample(AudioBuffer::new(vec![0.1, 0.2, 0.3], 1, 44100), 44100)?;
        assert_eq!(&[0.1, 0.2, 0.3], buffer.samples());
        assert_eq!(44100, buffer.sample_rate());
        Ok(())
    }

    #[test]
    fn test_upsample_keeps_length_and_level() -> Result<(), Box<dyn Error>> {
        // 44 whole cycles of a 441 Hz tone, so the loop point is continuous.
        let samples: Vec<f32> = (0..2200)
            .map(|i| 0.5 * (2.0 * PI * 441.0 * i as f32 / 22050.0).sin())
            .collect();
        let buffer = resample(AudioBuffer::new(samples, 1, 22050), 44100)?;

        assert_eq!(44100, buffer.sample_rate());
        assert_eq!(1, buffer.channels());
        assert_eq!(4400, buffer.frames());
        assert!((rms(buffer.samples()) - 0.5 / 2f32.sqrt()).abs() < 0.02);
        Ok(())
    }

    #[test]
    fn test_loop_point_stays_continuous() -> Result<(), Box<dyn Error>> {
        // A steady stereo level must come out steady right up to both ends.
        let buffer = resample(AudioBuffer::new(vec![0.5; 4800 * 2], 2, 48000), 44100)?;

        assert_eq!(44100, buffer.sample_rate());
        assert_eq!(2, buffer.channels());
        assert_eq!(4410, buffer.frames());
        for sample in buffer.samples() {
            assert!((sample - 0.5).abs() < 0.05, "sample {} strayed", sample);
        }
        Ok(())
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(resample(AudioBuffer::new(vec![0.5; 4], 1, 0), 44100).is_err());
    }
}
