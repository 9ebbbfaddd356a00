use std::time::Instant;

use anyhow::Result;

use super::types::{MonitorDefinition, ProbeResult};

pub mod http;
pub mod mysql;
pub mod push;
pub mod redis;
pub mod tcp;
pub mod tls;

pub use http::HttpChecker;
pub use mysql::MysqlChecker;
pub use push::PushChecker;
pub use redis::RedisChecker;
pub use tcp::TcpChecker;
pub use tls::TlsChecker;

/// Checker trait for different types of monitoring checks
///
/// `Err` means the probe itself could not be carried out; the executor turns
/// it into a failure result. Checkers return `Ok` with a failure or degraded
/// result when they reached the target and judged it unhealthy.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, definition: &MonitorDefinition) -> Result<ProbeResult>;
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
