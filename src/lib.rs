pub mod cli;
pub mod config;
pub mod orchestrator;
pub mod report;
pub mod topology;
