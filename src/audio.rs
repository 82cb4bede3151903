//! WAV decode/encode and resampling.
//!
//! The whole pipeline runs on mono f32 samples at 16 kHz. Input WAVs may
//! arrive at any rate or channel count and are mixed down and resampled
//! here; output WAVs are written as 16-bit PCM mono at 16 kHz.

use crate::error::{Result, VoxError};
use rubato::{FftFixedIn, Resampler};
use std::path::Path;

/// Sample rate shared by the recognition and synthesis models.
pub const SAMPLE_RATE: u32 = 16_000;

const RESAMPLE_CHUNK: usize = 1024;
const RESAMPLE_SUB_CHUNKS: usize = 2;

/// Load a WAV file as mono f32 samples at 16 kHz.
///
/// Stereo input is averaged down to mono; input at other sample rates is
/// resampled.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or decoded.
pub fn load_wav_mono_16k(path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| VoxError::Audio(format!("cannot open WAV {}: {e}", path.display())))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map_err(|e| VoxError::Audio(format!("WAV read error: {e}")))
                        .map(|v| v as f32 / max)
                })
                .collect::<Result<Vec<f32>>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| VoxError::Audio(format!("WAV read error: {e}"))))
            .collect::<Result<Vec<f32>>>()?,
    };

    let mono = mixdown(samples, spec.channels);

    if spec.sample_rate == SAMPLE_RATE {
        Ok(mono)
    } else {
        resample(&mono, spec.sample_rate, SAMPLE_RATE)
    }
}

/// Write samples as a 16 kHz mono 16-bit PCM WAV file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_wav_mono_16k(path: &Path, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| VoxError::Audio(format!("cannot create WAV {}: {e}", path.display())))?;

    for &s in samples {
        let sample_i16 = (s * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer
            .write_sample(sample_i16)
            .map_err(|e| VoxError::Audio(format!("WAV write error: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| VoxError::Audio(format!("WAV finalize error: {e}")))?;

    Ok(())
}

/// Average interleaved channels down to mono.
fn mixdown(samples: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    let ch = channels as usize;
    samples
        .chunks(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Resample mono samples between rates.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    let mut resampler = FftFixedIn::<f64>::new(
        from_rate as usize,
        to_rate as usize,
        RESAMPLE_CHUNK,
        RESAMPLE_SUB_CHUNKS,
        1,
    )
    .map_err(|e| VoxError::Audio(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output: Vec<f64> = Vec::with_capacity(
        (samples.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize,
    );

    let mut chunks = input.chunks_exact(RESAMPLE_CHUNK);
    for chunk in chunks.by_ref() {
        let frames = resampler
            .process(&[chunk.to_vec()], None)
            .map_err(|e| VoxError::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&frames[0]);
    }

    // The last partial chunk, then one empty call to drain the FFT latency.
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let frames = resampler
            .process_partial(Some(&[tail.to_vec()]), None)
            .map_err(|e| VoxError::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&frames[0]);
    }
    let frames = resampler
        .process_partial(Option::<&[Vec<f64>]>::None, None)
        .map_err(|e| VoxError::Audio(format!("resample flush failed: {e}")))?;
    output.extend_from_slice(&frames[0]);

    Ok(output.iter().map(|&s| s as f32).collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use tempfile::TempDir;

    fn sine(rate: u32, seconds: f32, freq: f32) -> Vec<f32> {
        let n = (rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn wav_round_trip_preserves_samples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let samples = sine(SAMPLE_RATE, 0.25, 440.0);

        write_wav_mono_16k(&path, &samples).unwrap();
        let loaded = load_wav_mono_16k(&path).unwrap();

        assert_eq!(loaded.len(), samples.len());
        for (a, b) in samples.iter().zip(&loaded) {
            assert!((a - b).abs() < 1.0 / 16384.0, "quantization drift: {a} vs {b}");
        }
    }

    #[test]
    fn stereo_input_is_mixed_down() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        // Left fixed at ~0.4, right at ~-0.4; the mix should be near zero.
        for _ in 0..1000 {
            writer.write_sample((0.4f32 * 32767.0) as i16).unwrap();
            writer.write_sample((-0.4f32 * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let loaded = load_wav_mono_16k(&path).unwrap();
        assert_eq!(loaded.len(), 1000);
        assert!(loaded.iter().all(|s| s.abs() < 0.01));
    }

    #[test]
    fn eight_khz_input_is_upsampled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slow.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in sine(8_000, 1.0, 200.0) {
            writer.write_sample((s * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let loaded = load_wav_mono_16k(&path).unwrap();
        // One second at 16 kHz, within the resampler's chunk padding and latency.
        let expected = SAMPLE_RATE as i64;
        let delta = (expected - loaded.len() as i64).abs();
        assert!(
            delta <= (4 * RESAMPLE_CHUNK) as i64,
            "unexpected resampled length: {}",
            loaded.len()
        );
    }

    #[test]
    fn float_wavs_decode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("float.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in [0.0f32, 0.25, -0.25, 1.0] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let loaded = load_wav_mono_16k(&path).unwrap();
        assert_eq!(loaded, vec![0.0, 0.25, -0.25, 1.0]);
    }
}
