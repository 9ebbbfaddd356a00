//! Vigil: scheduled probes, debounced status, and fan-out alerting.

pub mod config;
pub mod database;
pub mod monitoring;
pub mod notifications;
pub mod orchestrator;
pub mod pool;

#[cfg(test)]
mod test_support;
