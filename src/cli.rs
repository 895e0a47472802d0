use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "meetscribe",
    version,
    about = "Turn a meeting recording into a speaker-attributed transcript and summary"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run clean -> transcribe -> diarize -> merge -> summarize on an audio file.
    /// Stages whose output already exists in the working directory are skipped.
    Run {
        /// Input WAV file
        audio: PathBuf,

        /// Working directory for artifacts (defaults to [output] directory)
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Force a specific transcription backend (azure or local)
        #[arg(long)]
        backend: Option<String>,
    },

    /// Show the last run's stage status and which artifacts exist
    Status {
        /// Working directory for artifacts (defaults to [output] directory)
        #[arg(long)]
        workdir: Option<PathBuf>,
    },

    /// Record and transcribe live until Ctrl+C (or until the replayed file ends)
    Record {
        /// Replay a WAV file instead of capturing from the microphone
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Working directory for the raw recording (defaults to [output] directory)
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Run the full pipeline on the recording afterwards
        #[arg(long)]
        process: bool,

        /// Force a specific transcription backend (azure or local)
        #[arg(long)]
        backend: Option<String>,
    },

    /// Score a transcript against a reference text (WER, MER, WIL, WIP, CER)
    Evaluate {
        /// Transcript to score, e.g. transcript.txt
        hypothesis: PathBuf,

        /// Ground-truth text
        reference: PathBuf,

        /// Where to save the report (defaults to wer_report.txt beside the transcript)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Write a commented default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
