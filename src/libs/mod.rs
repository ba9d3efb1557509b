pub mod app;
pub mod args;
pub mod error;
#[cfg(test)]
pub mod fake;
pub mod kafka;
pub mod message;
pub mod orchestrator;
pub mod settings;
