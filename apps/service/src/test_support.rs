//! Shared test doubles and fixtures.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use crate::database::models::{ChannelRecord, Heartbeat, MonitorRecord};
use crate::database::{Database, DatabaseImpl, initialize_database};
use crate::monitoring::executor::Prober;
use crate::monitoring::types::{
    ChannelId, HttpSettings, MonitorDefinition, MonitorId, MonitorKind, MonitorState,
    MonitorStatus, ProbeOutcome, ProbeResult, StatusTransition,
};
use crate::notifications::dispatcher::DeliveryOutcome;
use crate::notifications::message::AlertMessage;
use crate::notifications::models::{ChannelConfig, NotificationChannel};
use crate::notifications::senders::{NotificationSender, SenderError};
use crate::pool::open_pool;

/// A migrated libsql database in a temporary directory.
pub(crate) async fn create_test_database() -> Result<(Arc<DatabaseImpl>, TempDir)> {
    let dir = tempfile::tempdir()?;
    let pool = open_pool(&dir.path().join("vigil.db"), 4).await?;
    {
        let conn = pool.get().await.map_err(|e| anyhow::anyhow!("{e}"))?;
        initialize_database(&conn).await?;
    }
    Ok((Arc::new(DatabaseImpl::new_from_pool(pool)), dir))
}

pub(crate) fn http_monitor(id: MonitorId, channels: &[ChannelId]) -> MonitorDefinition {
    MonitorDefinition {
        id,
        name: format!("monitor-{id}"),
        kind: MonitorKind::Http(HttpSettings::default()),
        target: "https://example.com".to_string(),
        interval: Duration::from_secs(60),
        timeout: Duration::from_secs(10),
        failure_threshold: 1,
        recovery_threshold: 1,
        enabled: true,
        channels: channels.to_vec(),
    }
}

pub(crate) fn webhook_channel(id: ChannelId, url: &str) -> NotificationChannel {
    NotificationChannel {
        id,
        name: format!("channel-{id}"),
        config: ChannelConfig::Webhook {
            url: url.to_string(),
            method: None,
            headers: Default::default(),
            body_template: None,
        },
        enabled: true,
    }
}

pub(crate) fn transition(
    monitor_id: MonitorId,
    previous: MonitorStatus,
    current: MonitorStatus,
) -> StatusTransition {
    StatusTransition {
        id: Uuid::new_v4(),
        monitor_id,
        previous,
        current,
        timestamp: Utc::now(),
        result_id: Uuid::new_v4(),
        detail: "HTTP 503".to_string(),
    }
}

/// In-memory `Database` with switchable read/write failures.
#[derive(Default)]
pub(crate) struct MemoryStore {
    monitors: Mutex<Vec<MonitorRecord>>,
    channels: Mutex<Vec<ChannelRecord>>,
    results: Mutex<Vec<ProbeResult>>,
    transitions: Mutex<Vec<StatusTransition>>,
    states: Mutex<HashMap<MonitorId, MonitorState>>,
    heartbeats: Mutex<Vec<Heartbeat>>,
    deliveries: Mutex<Vec<DeliveryOutcome>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    /// One-shot stall applied to the next channel read
    channel_read_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub(crate) fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn delay_next_channel_read(&self, delay: Duration) {
        *self.channel_read_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn states(&self) -> HashMap<MonitorId, MonitorState> {
        self.states.lock().unwrap().clone()
    }

    pub(crate) fn results(&self) -> Vec<ProbeResult> {
        self.results.lock().unwrap().clone()
    }

    pub(crate) fn transitions(&self) -> Vec<StatusTransition> {
        self.transitions.lock().unwrap().clone()
    }

    pub(crate) fn deliveries(&self) -> Vec<DeliveryOutcome> {
        self.deliveries.lock().unwrap().clone()
    }

    fn read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("read failure injected");
        }
        Ok(())
    }

    fn write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("write failure injected");
        }
        Ok(())
    }
}

#[async_trait]
impl Database for MemoryStore {
    async fn get_enabled_monitors(&self) -> Result<Vec<MonitorRecord>> {
        self.read()?;
        Ok(self.monitors.lock().unwrap().iter().filter(|m| m.enabled).cloned().collect())
    }

    async fn get_monitor(&self, id: MonitorId) -> Result<Option<MonitorRecord>> {
        self.read()?;
        Ok(self.monitors.lock().unwrap().iter().find(|m| m.id == Some(id)).cloned())
    }

    async fn list_monitors(&self) -> Result<Vec<MonitorRecord>> {
        self.read()?;
        Ok(self.monitors.lock().unwrap().clone())
    }

    async fn save_monitor(&self, monitor: &MonitorRecord) -> Result<MonitorId> {
        self.write()?;
        let mut monitors = self.monitors.lock().unwrap();
        if let Some(id) = monitor.id {
            if let Some(existing) = monitors.iter_mut().find(|m| m.id == Some(id)) {
                *existing = monitor.clone();
                return Ok(id);
            }
        }
        let id = monitors.len() as MonitorId + 1;
        monitors.push(MonitorRecord { id: Some(id), ..monitor.clone() });
        Ok(id)
    }

    async fn set_monitor_enabled(&self, id: MonitorId, enabled: bool) -> Result<()> {
        self.write()?;
        let mut monitors = self.monitors.lock().unwrap();
        let Some(monitor) = monitors.iter_mut().find(|m| m.id == Some(id)) else {
            bail!("monitor {id} not found");
        };
        monitor.enabled = enabled;
        Ok(())
    }

    async fn get_enabled_channels(&self) -> Result<Vec<ChannelRecord>> {
        self.read()?;
        let delay = self.channel_read_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.channels.lock().unwrap().iter().filter(|c| c.enabled).cloned().collect())
    }

    async fn get_channel(&self, id: i64) -> Result<Option<ChannelRecord>> {
        self.read()?;
        Ok(self.channels.lock().unwrap().iter().find(|c| c.id == Some(id)).cloned())
    }

    async fn save_channel(&self, channel: &ChannelRecord) -> Result<i64> {
        self.write()?;
        let mut channels = self.channels.lock().unwrap();
        let id = channels.len() as i64 + 1;
        channels.push(ChannelRecord { id: Some(id), ..channel.clone() });
        Ok(id)
    }

    async fn save_result(&self, result: &ProbeResult) -> Result<()> {
        self.write()?;
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }

    async fn get_recent_results(&self, monitor_id: MonitorId, limit: usize) -> Result<Vec<ProbeResult>> {
        self.read()?;
        let results = self.results.lock().unwrap();
        Ok(results.iter().rev().filter(|r| r.monitor_id == monitor_id).take(limit).cloned().collect())
    }

    async fn save_transition(&self, transition: &StatusTransition) -> Result<()> {
        self.write()?;
        self.transitions.lock().unwrap().push(transition.clone());
        Ok(())
    }

    async fn get_recent_transitions(&self, limit: usize) -> Result<Vec<StatusTransition>> {
        self.read()?;
        Ok(self.transitions.lock().unwrap().iter().rev().take(limit).cloned().collect())
    }

    async fn save_monitor_state(&self, state: &MonitorState) -> Result<()> {
        self.write()?;
        self.states.lock().unwrap().insert(state.monitor_id, state.clone());
        Ok(())
    }

    async fn load_monitor_states(&self) -> Result<Vec<MonitorState>> {
        self.read()?;
        Ok(self.states.lock().unwrap().values().cloned().collect())
    }

    async fn record_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        self.write()?;
        self.heartbeats.lock().unwrap().push(heartbeat.clone());
        Ok(())
    }

    async fn get_last_heartbeat(&self, monitor_id: MonitorId) -> Result<Option<Heartbeat>> {
        self.read()?;
        let heartbeats = self.heartbeats.lock().unwrap();
        Ok(heartbeats
            .iter()
            .filter(|h| h.monitor_id == monitor_id)
            .max_by_key(|h| h.received_at)
            .cloned())
    }

    async fn save_delivery(&self, delivery: &DeliveryOutcome) -> Result<()> {
        self.write()?;
        self.deliveries.lock().unwrap().push(delivery.clone());
        Ok(())
    }

    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.write()?;
        let mut deleted = 0;
        let mut results = self.results.lock().unwrap();
        let before = results.len();
        results.retain(|r| r.timestamp >= cutoff);
        deleted += (before - results.len()) as u64;
        let mut transitions = self.transitions.lock().unwrap();
        let before = transitions.len();
        transitions.retain(|t| t.timestamp >= cutoff);
        deleted += (before - transitions.len()) as u64;
        Ok(deleted)
    }
}

/// Prober that replays scripted outcomes per monitor and tracks overlap.
pub(crate) struct ScriptedProber {
    scripts: Mutex<HashMap<MonitorId, VecDeque<ProbeOutcome>>>,
    fallback: ProbeOutcome,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    started: Notify,
    calls: Mutex<HashMap<MonitorId, usize>>,
    running: Mutex<HashMap<MonitorId, usize>>,
    max_overlap: AtomicUsize,
}

impl ScriptedProber {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: ProbeOutcome::Success,
            delay: None,
            gate: None,
            started: Notify::new(),
            calls: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            max_overlap: AtomicUsize::new(0),
        }
    }

    /// Outcome used once a monitor's script runs out.
    pub(crate) fn always(mut self, outcome: ProbeOutcome) -> Self {
        self.fallback = outcome;
        self
    }

    pub(crate) fn script(self, monitor_id: MonitorId, outcomes: &[ProbeOutcome]) -> Self {
        self.scripts.lock().unwrap().insert(monitor_id, outcomes.iter().copied().collect());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Each probe waits for one permit.
    pub(crate) fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn started(&self) -> &Notify {
        &self.started
    }

    pub(crate) fn calls(&self, monitor_id: MonitorId) -> usize {
        self.calls.lock().unwrap().get(&monitor_id).copied().unwrap_or(0)
    }

    pub(crate) fn max_overlap(&self) -> usize {
        self.max_overlap.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, definition: &MonitorDefinition) -> ProbeResult {
        let id = definition.id;
        *self.calls.lock().unwrap().entry(id).or_default() += 1;
        {
            let mut running = self.running.lock().unwrap();
            let count = running.entry(id).or_default();
            *count += 1;
            self.max_overlap.fetch_max(*count, Ordering::SeqCst);
        }
        self.started.notify_one();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.fallback);
        *self.running.lock().unwrap().entry(id).or_default() -= 1;

        match outcome {
            ProbeOutcome::Success => ProbeResult::success(id),
            ProbeOutcome::Degraded => ProbeResult::degraded(id, "scripted degradation"),
            ProbeOutcome::Failure => ProbeResult::failure(id, "scripted failure"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendBehavior {
    Deliver,
    Fail,
    Hang,
    Panic,
}

/// Sender double keyed by webhook URL; records every attempt before acting.
pub(crate) struct RecordingSender {
    behaviors: HashMap<String, SendBehavior>,
    sent: Mutex<Vec<(String, AlertMessage)>>,
}

impl RecordingSender {
    pub(crate) fn new() -> Self {
        Self { behaviors: HashMap::new(), sent: Mutex::new(Vec::new()) }
    }

    pub(crate) fn with_behavior(mut self, url: &str, behavior: SendBehavior) -> Self {
        self.behaviors.insert(url.to_string(), behavior);
        self
    }

    pub(crate) fn sent_urls(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    pub(crate) fn messages(&self) -> Vec<AlertMessage> {
        self.sent.lock().unwrap().iter().map(|(_, message)| message.clone()).collect()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, config: &ChannelConfig, message: &AlertMessage) -> Result<(), SenderError> {
        let url = match config {
            ChannelConfig::Webhook { url, .. } => url.clone(),
            other => other.kind().to_string(),
        };
        self.sent.lock().unwrap().push((url.clone(), message.clone()));

        match self.behaviors.get(&url).copied().unwrap_or(SendBehavior::Deliver) {
            SendBehavior::Deliver => Ok(()),
            SendBehavior::Fail => Err(SenderError::SendFailed("HTTP 500".into())),
            SendBehavior::Hang => std::future::pending().await,
            SendBehavior::Panic => panic!("sender bug"),
        }
    }
}
