pub mod orchestrator;
pub mod stages;
pub mod status;
