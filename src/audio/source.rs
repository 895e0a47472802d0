// Audio sources feeding live mode. Each source yields mono f32 chunks at a
// fixed sample rate until it runs out (file) or is stopped (microphone).

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::audio::cleaner::resample_linear;
use crate::audio::wav;

pub trait AudioSource: Send {
    fn sample_rate(&self) -> u32;

    /// Next chunk of samples, or `None` once the source is exhausted.
    fn read_chunk(&mut self) -> Result<Option<Vec<f32>>>;
}

/// Replays a WAV file as if it were being captured.
pub struct WavReplaySource {
    samples: Vec<f32>,
    sample_rate: u32,
    chunk_len: usize,
    position: usize,
    realtime: bool,
    started: Option<Instant>,
}

impl WavReplaySource {
    pub fn open(path: &Path, sample_rate: u32, chunk_secs: f32, realtime: bool) -> Result<Self> {
        let audio = wav::read_mono_f32(path)?;
        let samples = resample_linear(&audio.samples, audio.sample_rate, sample_rate);
        tracing::info!(
            "Replaying {} ({:.1}s)",
            path.display(),
            samples.len() as f64 / sample_rate as f64
        );
        Ok(Self::from_samples(samples, sample_rate, chunk_secs, realtime))
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, chunk_secs: f32, realtime: bool) -> Self {
        let chunk_len = ((sample_rate as f32 * chunk_secs) as usize).max(1);
        Self {
            samples,
            sample_rate,
            chunk_len,
            position: 0,
            realtime,
            started: None,
        }
    }
}

impl AudioSource for WavReplaySource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_chunk(&mut self) -> Result<Option<Vec<f32>>> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }

        if self.realtime {
            // Don't hand out audio faster than it would have been recorded.
            let started = *self.started.get_or_insert_with(Instant::now);
            let due = Duration::from_secs_f64(self.position as f64 / self.sample_rate as f64);
            let elapsed = started.elapsed();
            if due > elapsed {
                std::thread::sleep(due - elapsed);
            }
        }

        let end = (self.position + self.chunk_len).min(self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;
        Ok(Some(chunk))
    }
}

#[cfg(feature = "mic")]
pub use mic::MicSource;

#[cfg(feature = "mic")]
mod mic {
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use anyhow::{Context, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    use super::AudioSource;
    use crate::audio::cleaner::resample_linear;

    /// Give up if the device delivers nothing for this long.
    const STALL_TIMEOUT: Duration = Duration::from_secs(5);

    /// SAFETY: the stream is only touched from the thread that owns the
    /// `MicSource`; it is kept alive here and dropped with it.
    struct SendableStream(cpal::Stream);

    unsafe impl Send for SendableStream {}

    /// Default input device, captured at its native format and converted to
    /// mono at the requested rate inside the callback.
    pub struct MicSource {
        _stream: SendableStream,
        buffer: Arc<Mutex<Vec<f32>>>,
        sample_rate: u32,
        chunk_len: usize,
    }

    impl MicSource {
        pub fn open(sample_rate: u32, chunk_secs: f32) -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .context("No default input device available")?;
            let default_config = device
                .default_input_config()
                .context("Failed to query default input config")?;

            let native_rate = default_config.sample_rate().0;
            let channels = default_config.channels().max(1) as usize;
            let stream_config: cpal::StreamConfig = default_config.clone().into();
            tracing::info!(
                "Microphone: {} ({}ch/{}Hz/{:?})",
                device.name().unwrap_or_else(|_| "unknown".to_string()),
                channels,
                native_rate,
                default_config.sample_format()
            );

            let buffer = Arc::new(Mutex::new(Vec::new()));
            let err_callback = |err| tracing::error!("Audio stream error: {}", err);

            let stream = match default_config.sample_format() {
                cpal::SampleFormat::F32 => {
                    let buffer = Arc::clone(&buffer);
                    device.build_input_stream(
                        &stream_config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            let mono = mix_down(data.iter().copied(), channels);
                            push(&buffer, resample_linear(&mono, native_rate, sample_rate));
                        },
                        err_callback,
                        None,
                    )?
                }
                cpal::SampleFormat::I16 => {
                    let buffer = Arc::clone(&buffer);
                    device.build_input_stream(
                        &stream_config,
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            let mono =
                                mix_down(data.iter().map(|&s| s as f32 / 32768.0), channels);
                            push(&buffer, resample_linear(&mono, native_rate, sample_rate));
                        },
                        err_callback,
                        None,
                    )?
                }
                other => anyhow::bail!("Unsupported input sample format: {:?}", other),
            };
            stream.play().context("Failed to start input stream")?;

            Ok(Self {
                _stream: SendableStream(stream),
                buffer,
                sample_rate,
                chunk_len: ((sample_rate as f32 * chunk_secs) as usize).max(1),
            })
        }
    }

    fn mix_down(samples: impl Iterator<Item = f32>, channels: usize) -> Vec<f32> {
        let interleaved: Vec<f32> = samples.collect();
        if channels == 1 {
            return interleaved;
        }
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }

    fn push(buffer: &Arc<Mutex<Vec<f32>>>, samples: Vec<f32>) {
        if let Ok(mut buf) = buffer.lock() {
            buf.extend_from_slice(&samples);
        }
    }

    impl AudioSource for MicSource {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn read_chunk(&mut self) -> Result<Option<Vec<f32>>> {
            let waiting_since = Instant::now();
            loop {
                {
                    let mut buf = self
                        .buffer
                        .lock()
                        .map_err(|_| anyhow::anyhow!("microphone buffer poisoned"))?;
                    if buf.len() >= self.chunk_len {
                        return Ok(Some(buf.drain(..self.chunk_len).collect()));
                    }
                }
                if waiting_since.elapsed() > STALL_TIMEOUT {
                    anyhow::bail!("Microphone delivered no audio for {:?}", STALL_TIMEOUT);
                }
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_replay_yields_fixed_chunks_then_none() {
        let mut source = WavReplaySource::from_samples(vec![0.1; 250], 100, 1.0, false);
        assert_eq!(source.sample_rate(), 100);
        assert_eq!(source.read_chunk().unwrap().unwrap().len(), 100);
        assert_eq!(source.read_chunk().unwrap().unwrap().len(), 100);
        assert_eq!(source.read_chunk().unwrap().unwrap().len(), 50);
        assert!(source.read_chunk().unwrap().is_none());
    }

    #[test]
    fn test_replay_open_resamples_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("meeting.wav");
        wav::write_i16(&path, &vec![0.0; 8000], 8000).unwrap();

        let mut source = WavReplaySource::open(&path, 16000, 0.5, false).unwrap();
        let mut total = 0;
        while let Some(chunk) = source.read_chunk().unwrap() {
            assert!(chunk.len() <= 8000);
            total += chunk.len();
        }
        assert_eq!(total, 16000);
    }

    #[test]
    fn test_realtime_replay_is_paced() {
        let mut source = WavReplaySource::from_samples(vec![0.0; 30], 100, 0.1, true);
        let start = Instant::now();
        while source.read_chunk().unwrap().is_some() {}
        // Third chunk is due 0.2s after the first.
        assert!(start.elapsed() >= Duration::from_millis(190));
    }
}
