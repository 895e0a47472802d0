use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use meetscribe::artifacts::{file_ready, Artifact, ArtifactStore};
use meetscribe::audio::live::{run_live, CancellationToken, RECORDING_FILE_NAME};
use meetscribe::audio::source::{AudioSource, WavReplaySource};
use meetscribe::config::Config;
use meetscribe::evaluate::REPORT_FILE_NAME;
use meetscribe::pipeline::orchestrator::{ConsoleReporter, Orchestrator};
use meetscribe::pipeline::stages::build_stages;
use meetscribe::pipeline::status::PipelineStatus;
use meetscribe::transcribe::build_block_transcriber;

fn resolve_workdir(config: &Config, workdir: Option<&Path>) -> PathBuf {
    workdir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.output.directory.clone())
}

/// First Ctrl+C cancels `token`; a second one exits immediately.
fn install_ctrlc(token: &CancellationToken) {
    let token = token.clone();
    let result = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(130);
        }
        eprintln!("Stopping... (press Ctrl+C again to abort)");
        token.cancel();
    });
    if let Err(e) = result {
        tracing::warn!("Failed to install Ctrl+C handler: {}", e);
    }
}

/// Run the batch pipeline on `audio`. Returns an error (and so a non-zero
/// exit) if the input is missing or any stage fails.
pub fn run_pipeline(
    config: &Config,
    audio: &Path,
    workdir: Option<&Path>,
    backend: Option<&str>,
    token: CancellationToken,
) -> Result<()> {
    if !file_ready(audio) {
        anyhow::bail!("Input audio {} is missing or empty", audio.display());
    }

    let workdir = resolve_workdir(config, workdir);
    let store = ArtifactStore::open(&workdir)?;
    let stages = build_stages(config, audio, backend, token)?;

    println!("meetscribe: processing {}", audio.display());
    println!("  Working dir: {}", workdir.display());

    let orchestrator =
        Orchestrator::new(store.clone(), stages).with_input_label(audio.display().to_string());
    let report = orchestrator.run(&mut ConsoleReporter);

    match report.failure {
        None => {
            println!();
            println!("SUCCESS: pipeline complete");
            println!("  Transcript: {}", store.path(Artifact::DiarizedTranscript).display());
            println!("  Summary:    {}", store.path(Artifact::Summary).display());
            Ok(())
        }
        Some(failure) => {
            println!();
            println!("FAILED at stage '{}' ({})", failure.stage, failure.kind);
            println!("  {}", failure.reason);
            println!("  Rerun the same command to resume from the last completed stage.");
            anyhow::bail!("{} stage failed: {}", failure.stage, failure.reason)
        }
    }
}

pub fn run(config: &Config, audio: &Path, workdir: Option<&Path>, backend: Option<&str>) -> Result<()> {
    let token = CancellationToken::new();
    install_ctrlc(&token);
    run_pipeline(config, audio, workdir, backend, token)
}

/// Show the last run's status and artifact readiness.
pub fn show_status(config: &Config, workdir: Option<&Path>) -> Result<()> {
    let workdir = resolve_workdir(config, workdir);

    println!("meetscribe status:");
    println!("  Working dir: {}", workdir.display());

    match PipelineStatus::read(&workdir) {
        Some(status) => {
            if let Some(input) = &status.input {
                println!("  Input:       {}", input);
            }
            println!("  Last update: {}", status.updated_at);
            println!("  State:       {}", status.summary_line());
            for stage in &status.stages {
                match &stage.reason {
                    Some(reason) => println!("    {:<11} {} ({})", stage.stage, stage.state, reason),
                    None => println!("    {:<11} {}", stage.stage, stage.state),
                }
            }
        }
        None => println!("  No pipeline run recorded"),
    }

    println!("  Artifacts:");
    for artifact in Artifact::ALL {
        let path = workdir.join(artifact.file_name());
        let mark = if file_ready(&path) { "ready" } else { "-" };
        println!("    {:<24} {}", artifact.file_name(), mark);
    }

    Ok(())
}

fn open_source(config: &Config, replay: Option<&Path>) -> Result<Box<dyn AudioSource>> {
    let live = &config.live;
    if let Some(path) = replay {
        return Ok(Box::new(WavReplaySource::open(
            path,
            live.sample_rate,
            live.chunk_secs,
            live.realtime_replay,
        )?));
    }

    #[cfg(feature = "mic")]
    {
        Ok(Box::new(meetscribe::audio::source::MicSource::open(
            live.sample_rate,
            live.chunk_secs,
        )?))
    }
    #[cfg(not(feature = "mic"))]
    {
        anyhow::bail!("Microphone capture requires building with `--features mic`; use --replay <WAV>")
    }
}

/// Live mode: print transcribed lines as they arrive, keep the raw audio.
pub fn record(
    config: &Config,
    replay: Option<&Path>,
    workdir: Option<&Path>,
    process: bool,
    backend: Option<&str>,
) -> Result<()> {
    let workdir = resolve_workdir(config, workdir);
    std::fs::create_dir_all(&workdir)
        .with_context(|| format!("Failed to create {}", workdir.display()))?;
    let recording = workdir.join(RECORDING_FILE_NAME);

    let source = open_source(config, replay)?;
    let transcriber = build_block_transcriber(&config.transcription, backend)?;

    let token = CancellationToken::new();
    install_ctrlc(&token);

    println!("Recording... press Ctrl+C to stop");
    let summary = run_live(
        source,
        transcriber.as_ref(),
        &config.live,
        &recording,
        token,
        |line| println!("{}", line),
    )?;
    println!(
        "Saved {:.1}s of audio to {}",
        summary.recorded_secs,
        summary.recording.display()
    );

    if process {
        // The Ctrl+C handler is bound to the live token; a fresh token keeps
        // the pipeline's polling interruptible by the second-press exit.
        run_pipeline(config, &summary.recording, Some(&workdir), backend, CancellationToken::new())?;
    }
    Ok(())
}

/// Score `hypothesis` against `reference`, print the report and save it.
pub fn evaluate(hypothesis: &Path, reference: &Path, output: Option<&Path>) -> Result<()> {
    let hypothesis_text = std::fs::read_to_string(hypothesis)
        .with_context(|| format!("Failed to read {}", hypothesis.display()))?;
    let reference_text = std::fs::read_to_string(reference)
        .with_context(|| format!("Failed to read {}", reference.display()))?;

    let report = meetscribe::evaluate::evaluate(&reference_text, &hypothesis_text)?;
    let rendered = report.render();
    println!("{}", rendered);

    let output = match output {
        Some(p) => p.to_path_buf(),
        None => hypothesis
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(REPORT_FILE_NAME),
    };
    std::fs::write(&output, &rendered)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Report saved to {}", output.display());
    Ok(())
}

/// Write the commented default config to `path` (or the platform config path).
pub fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::platform_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
    };

    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, Config::generate_default_commented())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
