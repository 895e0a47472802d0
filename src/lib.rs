pub mod artifacts;
pub mod audio;
pub mod config;
pub mod diarize;
pub mod error;
pub mod evaluate;
pub mod merge;
pub mod pipeline;
pub mod summarize;
pub mod transcribe;
