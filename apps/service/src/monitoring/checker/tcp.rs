use std::time::Instant;

use anyhow::{Result, anyhow, bail};
use tokio::net::TcpStream;

use super::{Checker, elapsed_ms};
use crate::monitoring::target::{DEFAULT_TCP_PORT, host_port};
use crate::monitoring::types::{MonitorDefinition, MonitorKind, ProbeResult};

/// TCP port checker
pub struct TcpChecker;

#[async_trait::async_trait]
impl Checker for TcpChecker {
    async fn check(&self, definition: &MonitorDefinition) -> Result<ProbeResult> {
        let MonitorKind::Tcp(settings) = &definition.kind else {
            bail!("TCP checker cannot run a {} monitor", definition.kind.name());
        };
        let (host, port) = host_port(&definition.target, settings.port.unwrap_or(DEFAULT_TCP_PORT))?;

        let start = Instant::now();
        TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| anyhow!("TCP connection failed: {e}"))?;

        Ok(ProbeResult::success(definition.id).with_latency(elapsed_ms(start)))
    }
}
