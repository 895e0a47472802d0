pub mod chunker;
pub mod llm;
pub mod prompt;
pub mod runner;
