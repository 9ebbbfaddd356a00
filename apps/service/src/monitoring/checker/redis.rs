use std::time::Instant;

use anyhow::{Result, anyhow, bail};

use super::{Checker, elapsed_ms};
use crate::monitoring::target::redis_url;
use crate::monitoring::types::{MonitorDefinition, MonitorKind, ProbeResult};

/// Redis checker: `PING` must answer `PONG`.
pub struct RedisChecker;

#[async_trait::async_trait]
impl Checker for RedisChecker {
    async fn check(&self, definition: &MonitorDefinition) -> Result<ProbeResult> {
        let MonitorKind::Redis(settings) = &definition.kind else {
            bail!("Redis checker cannot run a {} monitor", definition.kind.name());
        };
        let url = redis_url(&definition.target, settings)?;

        let start = Instant::now();
        let client = redis::Client::open(url.as_str())?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Redis connection failed: {e}"))?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow!("Redis ping failed: {e}"))?;
        let latency = elapsed_ms(start);

        if reply != "PONG" {
            return Ok(ProbeResult::failure(definition.id, format!("unexpected PING reply `{reply}`"))
                .with_latency(latency));
        }
        Ok(ProbeResult::success(definition.id).with_latency(latency))
    }
}
