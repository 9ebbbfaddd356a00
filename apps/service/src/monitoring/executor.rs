use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;

use super::checker::{
    Checker, HttpChecker, MysqlChecker, PushChecker, RedisChecker, TcpChecker, TlsChecker,
};
use super::types::{MonitorDefinition, MonitorKind, ProbeResult};
use crate::database::Database;

/// Runs one probe for a monitor. Never fails: every problem becomes a failure result.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, definition: &MonitorDefinition) -> ProbeResult;
}

/// Monitoring executor - routes each monitor kind to its checker
pub struct ProbeExecutor {
    http: Arc<HttpChecker>,
    tls: Arc<TlsChecker>,
    tcp: Arc<TcpChecker>,
    mysql: Arc<MysqlChecker>,
    redis: Arc<RedisChecker>,
    push: Arc<PushChecker>,
}

impl ProbeExecutor {
    pub fn new(store: Arc<dyn Database>) -> Result<Self> {
        Ok(Self {
            http: Arc::new(HttpChecker::new()?),
            tls: Arc::new(TlsChecker::new()?),
            tcp: Arc::new(TcpChecker),
            mysql: Arc::new(MysqlChecker),
            redis: Arc::new(RedisChecker),
            push: Arc::new(PushChecker::new(store)),
        })
    }

    fn checker(&self, kind: &MonitorKind) -> Arc<dyn Checker> {
        match kind {
            MonitorKind::Http(_) => self.http.clone(),
            MonitorKind::Tls(_) => self.tls.clone(),
            MonitorKind::Tcp(_) => self.tcp.clone(),
            MonitorKind::Mysql(_) => self.mysql.clone(),
            MonitorKind::Redis(_) => self.redis.clone(),
            MonitorKind::Push(_) => self.push.clone(),
        }
    }
}

#[async_trait]
impl Prober for ProbeExecutor {
    async fn probe(&self, definition: &MonitorDefinition) -> ProbeResult {
        run_guarded(self.checker(&definition.kind), definition.clone()).await
    }
}

/// Runs `checker` in its own task, bounded by the monitor's probe timeout.
///
/// Errors, panics and timeouts all come back as failure results. A timed out
/// probe task is aborted.
pub async fn run_guarded(checker: Arc<dyn Checker>, definition: MonitorDefinition) -> ProbeResult {
    let monitor_id = definition.id;
    let limit = definition.probe_timeout();
    let start = Instant::now();

    let mut task = tokio::spawn(async move { checker.check(&definition).await });
    let result = match timeout(limit, &mut task).await {
        Ok(Ok(Ok(mut result))) => {
            result.monitor_id = monitor_id;
            result
        }
        Ok(Ok(Err(e))) => ProbeResult::failure(monitor_id, format!("{e:#}")),
        Ok(Err(e)) if e.is_panic() => ProbeResult::failure(monitor_id, "probe panicked"),
        Ok(Err(e)) => ProbeResult::failure(monitor_id, format!("probe aborted: {e}")),
        Err(_) => {
            task.abort();
            ProbeResult::failure(monitor_id, format!("timed out after {}ms", limit.as_millis()))
        }
    };

    let result = match result.latency_ms {
        Some(_) => result,
        None => result.with_latency(start.elapsed().as_millis() as u64),
    };
    debug!(monitor_id, outcome = %result.outcome, "Probe finished");
    result
}
