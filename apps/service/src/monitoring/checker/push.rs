use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};

use super::Checker;
use crate::database::Database;
use crate::database::models::Heartbeat;
use crate::monitoring::types::{MonitorDefinition, MonitorKind, ProbeOutcome, ProbeResult, PushSettings};

/// Passive checker: judges the most recent heartbeat pushed for the monitor.
pub struct PushChecker {
    store: Arc<dyn Database>,
}

impl PushChecker {
    pub fn new(store: Arc<dyn Database>) -> Self {
        Self { store }
    }
}

pub fn judge_heartbeat(
    definition: &MonitorDefinition,
    settings: &PushSettings,
    heartbeat: Option<&Heartbeat>,
    now: DateTime<Utc>,
) -> ProbeResult {
    let Some(heartbeat) = heartbeat else {
        return ProbeResult::failure(definition.id, "no heartbeat received");
    };

    let age = (now - heartbeat.received_at).num_seconds().max(0) as u64;
    let allowed = definition.interval.as_secs() * u64::from(settings.grace_factor.max(1));
    if age > allowed {
        return ProbeResult::failure(definition.id, format!("no heartbeat for {age}s"));
    }

    let result = match heartbeat.outcome {
        ProbeOutcome::Success => ProbeResult::success(definition.id),
        ProbeOutcome::Degraded => ProbeResult::degraded(definition.id, "heartbeat reported degraded"),
        ProbeOutcome::Failure => ProbeResult::failure(definition.id, "heartbeat reported failure"),
    };
    match &heartbeat.message {
        Some(message) => result.with_message(message.clone()),
        None => result,
    }
}

#[async_trait::async_trait]
impl Checker for PushChecker {
    async fn check(&self, definition: &MonitorDefinition) -> Result<ProbeResult> {
        let MonitorKind::Push(settings) = &definition.kind else {
            bail!("Push checker cannot run a {} monitor", definition.kind.name());
        };
        let heartbeat = self.store.get_last_heartbeat(definition.id).await?;
        Ok(judge_heartbeat(definition, settings, heartbeat.as_ref(), Utc::now()))
    }
}
