// Audio cleaning ahead of transcription: mono, resample, noise gate, normalize.
//
// The noise gate is best-effort: if it cannot run, the un-denoised audio is
// used. Failing to export the cleaned file is fatal.

use std::path::Path;

use anyhow::{Context, Result};

use crate::audio::wav;
use crate::config::CleanerConfig;

pub trait AudioCleaner: Send {
    /// Clean `input` and write the result to `output`.
    fn clean(&self, input: &Path, output: &Path) -> Result<()>;
}

pub struct WavCleaner {
    config: CleanerConfig,
}

/// Frame length used for noise floor estimation.
const FRAME_SECS: f32 = 0.02;
/// Fewer frames than this and the floor estimate is meaningless.
const MIN_FRAMES: usize = 10;
/// Gain applied to frames below the gate threshold (-20 dB).
const GATE_ATTENUATION: f32 = 0.1;

impl WavCleaner {
    pub fn new(config: CleanerConfig) -> Self {
        Self { config }
    }
}

impl AudioCleaner for WavCleaner {
    fn clean(&self, input: &Path, output: &Path) -> Result<()> {
        tracing::info!("Cleaning {}", input.display());
        let audio = wav::read_mono_f32(input).with_context(|| {
            format!(
                "Failed to decode {} (only WAV input is supported)",
                input.display()
            )
        })?;

        let mut samples = resample_linear(&audio.samples, audio.sample_rate, self.config.sample_rate);

        if self.config.noise_reduction {
            match reduce_noise(&samples, self.config.sample_rate, self.config.gate_margin_db) {
                Ok(gated) => samples = gated,
                Err(e) => tracing::warn!("Noise reduction failed, keeping original audio: {:#}", e),
            }
        }

        normalize_peak(&mut samples, self.config.headroom_db);

        wav::write_i16(output, &samples, self.config.sample_rate)
            .context("Failed to export cleaned audio")?;
        tracing::info!("Saved cleaned audio to {}", output.display());
        Ok(())
    }
}

/// Linear-interpolation resampler. Good enough for speech models.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 {
        return samples.to_vec();
    }
    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Attenuate frames whose RMS stays within `margin_db` of the estimated noise
/// floor (10th percentile frame RMS).
pub fn reduce_noise(samples: &[f32], sample_rate: u32, margin_db: f32) -> Result<Vec<f32>> {
    let frame_len = ((sample_rate as f32 * FRAME_SECS) as usize).max(1);
    let frame_count = samples.len() / frame_len;
    if frame_count < MIN_FRAMES {
        anyhow::bail!(
            "recording too short to estimate a noise floor ({} frames)",
            frame_count
        );
    }

    let rms: Vec<f32> = samples
        .chunks(frame_len)
        .map(|frame| (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt())
        .collect();

    let mut sorted = rms.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let floor = sorted[sorted.len() / 10];
    if floor <= f32::EPSILON {
        // Digital silence somewhere; nothing to gate against.
        return Ok(samples.to_vec());
    }
    let threshold = floor * 10f32.powf(margin_db / 20.0);

    let mut out = Vec::with_capacity(samples.len());
    for (frame, level) in samples.chunks(frame_len).zip(rms.iter()) {
        let gain = if *level < threshold { GATE_ATTENUATION } else { 1.0 };
        out.extend(frame.iter().map(|s| s * gain));
    }
    Ok(out)
}

/// Scale so the loudest sample sits `headroom_db` below full scale.
pub fn normalize_peak(samples: &mut [f32], headroom_db: f32) {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak <= f32::EPSILON {
        return;
    }
    let gain = 10f32.powf(-headroom_db / 20.0) / peak;
    for s in samples.iter_mut() {
        *s *= gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn speech_like(sample_rate: u32, secs: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * secs) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                // Loud tone in the second half, faint hiss throughout.
                let hiss = if i % 2 == 0 { 0.01 } else { -0.01 };
                let tone = if t > secs / 2.0 { 0.4 * (t * 440.0 * 6.28).sin() } else { 0.0 };
                hiss + tone
            })
            .collect()
    }

    #[test]
    fn test_resample_halves_length() {
        let samples: Vec<f32> = (0..32000).map(|i| i as f32 / 32000.0).collect();
        let out = resample_linear(&samples, 32000, 16000);
        assert_eq!(out.len(), 16000);
        assert!((out[100] - samples[200]).abs() < 1e-6);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_normalize_peak_hits_headroom() {
        let mut samples = vec![0.1, -0.25, 0.05];
        normalize_peak(&mut samples, 0.0);
        assert!((samples[1] + 1.0).abs() < 1e-6);
        assert!((samples[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_silence_is_noop() {
        let mut samples = vec![0.0; 10];
        normalize_peak(&mut samples, 0.1);
        assert!(samples.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_noise_gate_attenuates_hiss_only() {
        let samples = speech_like(16000, 1.0);
        let gated = reduce_noise(&samples, 16000, 6.0).unwrap();
        assert_eq!(gated.len(), samples.len());
        // Hiss-only region is attenuated.
        assert!(gated[100].abs() < samples[100].abs());
        // Loud region passes through untouched.
        let i = 12000;
        assert_eq!(gated[i], samples[i]);
    }

    #[test]
    fn test_noise_gate_rejects_short_audio() {
        let samples = vec![0.1; 100];
        assert!(reduce_noise(&samples, 16000, 6.0).is_err());
    }

    #[test]
    fn test_clean_writes_16k_mono_even_when_gate_fails() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("raw.wav");
        let output = tmp.path().join("cleaned.wav");
        // 50 ms at 8 kHz: too short for the gate, still exported.
        wav::write_i16(&input, &vec![0.2; 400], 8000).unwrap();

        let cleaner = WavCleaner::new(CleanerConfig::default());
        cleaner.clean(&input, &output).unwrap();

        let audio = wav::read_mono_f32(&output).unwrap();
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.samples.len(), 800);
        let peak = audio.samples.iter().fold(0.0f32, |a, s| a.max(s.abs()));
        assert!(peak > 0.95);
    }

    #[test]
    fn test_clean_rejects_non_wav() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("meeting.m4a");
        std::fs::write(&input, b"not audio").unwrap();
        let cleaner = WavCleaner::new(CleanerConfig::default());
        let err = cleaner.clean(&input, &tmp.path().join("out.wav")).unwrap_err();
        assert!(format!("{:#}", err).contains("only WAV"));
    }
}
