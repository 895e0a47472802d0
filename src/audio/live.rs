// Live recording: producer thread reads audio chunks -> bounded queue ->
// consumer transcribes fixed-size blocks and emits text lines.
//
// Both sides observe the same `CancellationToken` at every blocking wait. A
// model call already in flight is allowed to finish.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, SendTimeoutError};
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::source::AudioSource;
use crate::config::LiveConfig;
use crate::transcribe::backend::BlockTranscriber;

/// How long the consumer blocks on an empty queue before re-checking the token.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);
/// How long the producer blocks on a full queue before re-checking the token.
const SEND_TIMEOUT: Duration = Duration::from_millis(200);

pub const RECORDING_FILE_NAME: &str = "live_recording_raw.wav";

/// Cooperative shutdown signal shared by the producer and the consumer.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a live session produced.
#[derive(Debug, Clone)]
pub struct LiveSummary {
    pub recording: PathBuf,
    pub recorded_secs: f64,
    pub blocks: usize,
    pub lines: usize,
    pub cancelled: bool,
}

/// Run a live session until the source is exhausted or `token` is cancelled.
///
/// Every non-empty transcribed line is passed to `on_text`. The raw capture is
/// written to `recording_path` as 16-bit mono WAV.
pub fn run_live(
    source: Box<dyn AudioSource>,
    transcriber: &dyn BlockTranscriber,
    config: &LiveConfig,
    recording_path: &Path,
    token: CancellationToken,
    mut on_text: impl FnMut(&str),
) -> Result<LiveSummary> {
    let sample_rate = source.sample_rate();
    let block_len = ((sample_rate as f32 * config.block_secs) as usize).max(1);

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(recording_path, spec)
        .with_context(|| format!("Failed to create {}", recording_path.display()))?;

    let (tx, rx) = bounded::<Vec<f32>>(config.queue_capacity.max(1));
    let producer_token = token.clone();
    let producer = std::thread::Builder::new()
        .name("live-producer".to_string())
        .spawn(move || produce(source, tx, producer_token))
        .context("Failed to spawn producer thread")?;

    let mut pending: Vec<f32> = Vec::new();
    let mut recorded_samples: usize = 0;
    let mut blocks = 0;
    let mut lines = 0;
    let mut disconnected = false;
    let mut write_error: Option<anyhow::Error> = None;

    let mut transcribe = |block: &[f32], on_text: &mut dyn FnMut(&str)| {
        blocks += 1;
        match transcriber.transcribe_block(block, sample_rate) {
            Ok(segments) => {
                for segment in segments {
                    let text = segment.text.trim();
                    if !text.is_empty() {
                        lines += 1;
                        on_text(text);
                    }
                }
            }
            Err(e) => tracing::warn!("Block transcription failed: {:#}", e),
        }
    };

    while !token.is_cancelled() {
        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(chunk) => {
                if let Err(e) = write_chunk(&mut writer, &chunk) {
                    write_error = Some(anyhow::Error::from(e).context(format!(
                        "Failed to write {}",
                        recording_path.display()
                    )));
                    break;
                }
                recorded_samples += chunk.len();
                pending.extend_from_slice(&chunk);

                while pending.len() >= block_len {
                    let block: Vec<f32> = pending.drain(..block_len).collect();
                    transcribe(&block, &mut on_text);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                disconnected = true;
                break;
            }
        }
    }

    if disconnected && !pending.is_empty() {
        tracing::debug!("Transcribing final {} samples", pending.len());
        let tail = std::mem::take(&mut pending);
        transcribe(&tail, &mut on_text);
    }

    // Unblock a producer stuck on a full queue.
    drop(rx);
    let produced = producer
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
    if let Some(e) = write_error {
        if let Err(producer_error) = produced {
            tracing::warn!("Audio source also failed: {:#}", producer_error);
        }
        return Err(e);
    }
    writer.finalize()?;
    produced?;

    let cancelled = token.is_cancelled();
    tracing::info!(
        "Live session ended ({} blocks, {} lines{})",
        blocks,
        lines,
        if cancelled { ", cancelled" } else { "" }
    );

    Ok(LiveSummary {
        recording: recording_path.to_path_buf(),
        recorded_secs: recorded_samples as f64 / sample_rate as f64,
        blocks,
        lines,
        cancelled,
    })
}

fn write_chunk<W: std::io::Write + std::io::Seek>(
    writer: &mut WavWriter<W>,
    chunk: &[f32],
) -> hound::Result<()> {
    for &sample in chunk {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    Ok(())
}

fn produce(
    mut source: Box<dyn AudioSource>,
    tx: crossbeam_channel::Sender<Vec<f32>>,
    token: CancellationToken,
) -> Result<()> {
    while !token.is_cancelled() {
        let mut chunk = match source.read_chunk()? {
            Some(chunk) => chunk,
            None => break,
        };
        loop {
            match tx.send_timeout(chunk, SEND_TIMEOUT) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if token.is_cancelled() {
                        return Ok(());
                    }
                    chunk = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Ok(()),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav;
    use crate::transcribe::backend::TranscriptSegment;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeSource {
        chunks: Vec<Vec<f32>>,
        endless: bool,
    }

    impl AudioSource for FakeSource {
        fn sample_rate(&self) -> u32 {
            100
        }

        fn read_chunk(&mut self) -> Result<Option<Vec<f32>>> {
            if self.endless {
                std::thread::sleep(Duration::from_millis(5));
                return Ok(Some(vec![0.1; 50]));
            }
            if self.chunks.is_empty() {
                return Ok(None);
            }
            Ok(Some(self.chunks.remove(0)))
        }
    }

    struct FakeTranscriber {
        block_lens: Mutex<Vec<usize>>,
    }

    impl BlockTranscriber for FakeTranscriber {
        fn transcribe_block(&self, samples: &[f32], _sample_rate: u32) -> Result<Vec<TranscriptSegment>> {
            let mut lens = self.block_lens.lock().unwrap();
            lens.push(samples.len());
            Ok(vec![
                TranscriptSegment::new("seg_000", 0.0, 1.0, format!(" block {} ", lens.len())),
                TranscriptSegment::new("seg_001", 1.0, 2.0, "   "),
            ])
        }
    }

    fn live_config() -> LiveConfig {
        LiveConfig {
            sample_rate: 100,
            chunk_secs: 0.5,
            block_secs: 3.0,
            queue_capacity: 2,
            realtime_replay: false,
        }
    }

    #[test]
    fn test_blocks_and_tail_are_transcribed() {
        let tmp = TempDir::new().unwrap();
        let recording = tmp.path().join(RECORDING_FILE_NAME);
        let source = FakeSource {
            chunks: vec![vec![0.2; 50]; 7],
            endless: false,
        };
        let transcriber = FakeTranscriber {
            block_lens: Mutex::new(Vec::new()),
        };
        let mut lines = Vec::new();

        let summary = run_live(
            Box::new(source),
            &transcriber,
            &live_config(),
            &recording,
            CancellationToken::new(),
            |line| lines.push(line.to_string()),
        )
        .unwrap();

        assert_eq!(*transcriber.block_lens.lock().unwrap(), vec![300, 50]);
        assert_eq!(lines, vec!["block 1", "block 2"]);
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.lines, 2);
        assert!(!summary.cancelled);
        assert!((summary.recorded_secs - 3.5).abs() < 1e-9);

        let audio = wav::read_mono_f32(&recording).unwrap();
        assert_eq!(audio.samples.len(), 350);
    }

    #[test]
    fn test_cancel_stops_endless_source() {
        let tmp = TempDir::new().unwrap();
        let recording = tmp.path().join(RECORDING_FILE_NAME);
        let source = FakeSource {
            chunks: Vec::new(),
            endless: true,
        };
        let transcriber = FakeTranscriber {
            block_lens: Mutex::new(Vec::new()),
        };
        let token = CancellationToken::new();
        let cancel = token.clone();

        let summary = run_live(
            Box::new(source),
            &transcriber,
            &live_config(),
            &recording,
            token,
            |_| cancel.cancel(),
        )
        .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.lines, 1);
        // Tail is dropped on cancellation.
        assert_eq!(*transcriber.block_lens.lock().unwrap(), vec![300]);
    }

    struct DropFlagSource {
        inner: FakeSource,
        dropped: Arc<AtomicBool>,
    }

    impl AudioSource for DropFlagSource {
        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }

        fn read_chunk(&mut self) -> Result<Option<Vec<f32>>> {
            self.inner.read_chunk()
        }
    }

    impl Drop for DropFlagSource {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_recording_write_failure_joins_producer() {
        let dropped = Arc::new(AtomicBool::new(false));
        let source = DropFlagSource {
            inner: FakeSource {
                chunks: Vec::new(),
                endless: true,
            },
            dropped: dropped.clone(),
        };
        let transcriber = FakeTranscriber {
            block_lens: Mutex::new(Vec::new()),
        };

        // Writes to /dev/full fail once the buffered writer flushes.
        let err = run_live(
            Box::new(source),
            &transcriber,
            &live_config(),
            Path::new("/dev/full"),
            CancellationToken::new(),
            |_| {},
        )
        .unwrap_err();

        assert!(format!("{:#}", err).contains("/dev/full"));
        // The source lives on the producer thread; it is gone once that
        // thread has been joined.
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_pre_cancelled_token_records_nothing() {
        let tmp = TempDir::new().unwrap();
        let recording = tmp.path().join(RECORDING_FILE_NAME);
        let token = CancellationToken::new();
        token.cancel();
        let transcriber = FakeTranscriber {
            block_lens: Mutex::new(Vec::new()),
        };

        let summary = run_live(
            Box::new(FakeSource {
                chunks: vec![vec![0.2; 50]; 3],
                endless: false,
            }),
            &transcriber,
            &live_config(),
            &recording,
            token,
            |_| {},
        )
        .unwrap();

        assert_eq!(summary.blocks, 0);
        assert!(transcriber.block_lens.lock().unwrap().is_empty());
    }
}
