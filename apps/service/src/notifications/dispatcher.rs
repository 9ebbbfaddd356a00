use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::message::AlertMessage;
use super::models::{ChannelConfig, ChannelKind, NotificationChannel};
use super::senders::{NotificationSender, SenderError, default_senders, http_client};
use crate::database::Database;
use crate::monitoring::types::{
    ChannelId, HttpSettings, MonitorDefinition, MonitorId, MonitorKind, MonitorStatus, StatusTransition,
};

/// Extra time granted to the fan-out on top of the per-channel timeout.
const JOIN_MARGIN: Duration = Duration::from_secs(1);

/// Result of one delivery attempt to one channel
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub transition_id: Uuid,
    pub monitor_id: MonitorId,
    pub channel_id: ChannelId,
    pub channel_kind: ChannelKind,
    pub delivered: bool,
    pub reason: Option<String>,
    pub elapsed_ms: u64,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Upper bound for a single channel send
    pub send_timeout: Duration,
    /// Announce the first UP of a never-seen monitor
    pub notify_initial_status: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self { send_timeout: Duration::from_secs(10), notify_initial_status: false }
    }
}

/// Fans a status transition out to every subscribed channel.
///
/// Every channel is sent in its own task with its own timeout. A channel that
/// hangs or panics is reported as failed and never delays the others beyond
/// the shared deadline. Nothing is retried.
pub struct Dispatcher {
    senders: HashMap<ChannelKind, Arc<dyn NotificationSender>>,
    store: Option<Arc<dyn Database>>,
    settings: DispatcherSettings,
    in_flight: Mutex<JoinSet<()>>,
    /// Completion signal of the latest fan-out per monitor
    tails: Mutex<HashMap<MonitorId, oneshot::Receiver<()>>>,
}

impl Dispatcher {
    /// Dispatcher with the built-in sender for every channel kind.
    pub fn new(settings: DispatcherSettings) -> Result<Self, SenderError> {
        let client = http_client(settings.send_timeout)?;
        let senders = default_senders(client, settings.send_timeout);
        Ok(Self::with_senders(settings, senders))
    }

    pub fn with_senders(
        settings: DispatcherSettings,
        senders: HashMap<ChannelKind, Arc<dyn NotificationSender>>,
    ) -> Self {
        Self {
            senders,
            store: None,
            settings,
            in_flight: Mutex::new(JoinSet::new()),
            tails: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the sender used for `kind`.
    pub fn with_sender(mut self, kind: ChannelKind, sender: Arc<dyn NotificationSender>) -> Self {
        self.senders.insert(kind, sender);
        self
    }

    /// Persist delivery outcomes (best effort) in addition to logging them.
    pub fn with_store(mut self, store: Arc<dyn Database>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// First-ever UP is only announced when configured to.
    pub fn should_notify(&self, transition: &StatusTransition) -> bool {
        if transition.current == MonitorStatus::Unknown {
            return false;
        }
        !(transition.is_initial()
            && transition.current == MonitorStatus::Up
            && !self.settings.notify_initial_status)
    }

    /// Starts the fan-out in the background and returns immediately.
    ///
    /// Fan-outs for the same monitor run one after another in call order, so
    /// a recovery never reaches a channel before the alert it follows.
    pub fn notify(
        self: &Arc<Self>,
        transition: StatusTransition,
        monitor: Arc<MonitorDefinition>,
        channels: Arc<Vec<NotificationChannel>>,
    ) {
        let dispatcher = Arc::clone(self);
        let (done, tail) = oneshot::channel();
        let previous = self
            .tails
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(transition.monitor_id, tail);

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(async move {
            if let Some(previous) = previous {
                // resolves on completion or when the previous fan-out is dropped
                let _ = previous.await;
            }
            dispatcher.dispatch(&transition, &monitor, &channels).await;
            let _ = done.send(());
        });
    }

    /// Sends to every enabled channel the monitor subscribes to and waits for
    /// the outcomes, bounded by the send timeout plus a small margin.
    pub async fn dispatch(
        &self,
        transition: &StatusTransition,
        monitor: &MonitorDefinition,
        channels: &[NotificationChannel],
    ) -> Vec<DeliveryOutcome> {
        if !self.should_notify(transition) {
            debug!(
                monitor_id = monitor.id,
                status = %transition.current,
                "Initial status, not notifying"
            );
            return Vec::new();
        }

        let message = Arc::new(AlertMessage::new(transition, monitor));
        let send_timeout = self.settings.send_timeout;
        let started_at = Utc::now();
        let started = Instant::now();

        let mut outcomes = Vec::new();
        let mut pending: BTreeMap<ChannelId, ChannelKind> = BTreeMap::new();
        let mut sends = JoinSet::new();

        for channel in channels.iter().filter(|c| c.enabled && monitor.subscribes_to(c.id)) {
            let kind = channel.config.kind();
            let Some(sender) = self.senders.get(&kind).cloned() else {
                outcomes.push(self.outcome(
                    transition,
                    channel.id,
                    kind,
                    Err(format!("No sender registered for {kind}")),
                    Duration::ZERO,
                    started_at,
                ));
                continue;
            };

            pending.insert(channel.id, kind);
            let channel_id = channel.id;
            let config = channel.config.clone();
            let message = Arc::clone(&message);
            sends.spawn(async move {
                let attempt_started = Instant::now();
                let result = attempt(sender.as_ref(), &config, &message, send_timeout).await;
                (channel_id, result, attempt_started.elapsed())
            });
        }

        let deadline = started + send_timeout + JOIN_MARGIN;
        loop {
            match timeout_at(deadline, sends.join_next()).await {
                Ok(Some(Ok((channel_id, result, elapsed)))) => {
                    if let Some(kind) = pending.remove(&channel_id) {
                        outcomes.push(self.outcome(transition, channel_id, kind, result, elapsed, started_at));
                    }
                }
                Ok(Some(Err(e))) => warn!(error = %e, "Notification task ended abnormally"),
                Ok(None) => break,
                Err(_) => {
                    sends.abort_all();
                    break;
                }
            }
        }

        let abandoned = started.elapsed();
        for (channel_id, kind) in std::mem::take(&mut pending) {
            outcomes.push(self.outcome(
                transition,
                channel_id,
                kind,
                Err("Abandoned at dispatch deadline".to_string()),
                abandoned,
                started_at,
            ));
        }

        outcomes.sort_by_key(|o| o.channel_id);
        for outcome in &outcomes {
            self.record(outcome).await;
        }
        outcomes
    }

    /// Sends a synthetic recovery for a placeholder monitor through one
    /// channel, whether or not it is enabled. Nothing is persisted.
    pub async fn test_channel(&self, channel: &NotificationChannel) -> DeliveryOutcome {
        let monitor = MonitorDefinition {
            id: 0,
            name: "Vigil test".to_string(),
            kind: MonitorKind::Http(HttpSettings::default()),
            target: "https://example.com".to_string(),
            interval: Duration::from_secs(60),
            timeout: self.settings.send_timeout,
            failure_threshold: 1,
            recovery_threshold: 1,
            enabled: true,
            channels: vec![channel.id],
        };
        let now = Utc::now();
        let transition = StatusTransition {
            id: Uuid::new_v4(),
            monitor_id: monitor.id,
            previous: MonitorStatus::Down,
            current: MonitorStatus::Up,
            timestamp: now,
            result_id: Uuid::new_v4(),
            detail: "This is a test notification".to_string(),
        };
        let message = AlertMessage::new(&transition, &monitor);

        let kind = channel.config.kind();
        let started = Instant::now();
        let result = match self.senders.get(&kind) {
            Some(sender) => attempt(sender.as_ref(), &channel.config, &message, self.settings.send_timeout).await,
            None => Err(format!("No sender registered for {kind}")),
        };
        let outcome = self.outcome(&transition, channel.id, kind, result, started.elapsed(), now);
        log_outcome(&outcome);
        outcome
    }

    fn outcome(
        &self,
        transition: &StatusTransition,
        channel_id: ChannelId,
        channel_kind: ChannelKind,
        result: Result<(), String>,
        elapsed: Duration,
        attempted_at: DateTime<Utc>,
    ) -> DeliveryOutcome {
        DeliveryOutcome {
            transition_id: transition.id,
            monitor_id: transition.monitor_id,
            channel_id,
            channel_kind,
            delivered: result.is_ok(),
            reason: result.err(),
            elapsed_ms: elapsed.as_millis() as u64,
            attempted_at,
        }
    }

    async fn record(&self, outcome: &DeliveryOutcome) {
        log_outcome(outcome);
        if let Some(store) = &self.store {
            if let Err(e) = store.save_delivery(outcome).await {
                warn!(channel_id = outcome.channel_id, error = %e, "Failed to persist delivery outcome");
            }
        }
    }

    /// Waits up to `grace` for background fan-outs, then abandons the rest.
    pub async fn shutdown(&self, grace: Duration) {
        let mut in_flight = std::mem::take(
            &mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if in_flight.is_empty() {
            return;
        }

        info!(pending = in_flight.len(), "Waiting for in-flight notifications");
        let drained = timeout(grace, async { while in_flight.join_next().await.is_some() {} }).await;
        if drained.is_err() {
            warn!(abandoned = in_flight.len(), "Abandoning in-flight notifications");
            in_flight.abort_all();
        }
    }
}

/// One bounded send. Errors, panics and timeouts all come back as a reason.
async fn attempt(
    sender: &dyn NotificationSender,
    config: &ChannelConfig,
    message: &AlertMessage,
    send_timeout: Duration,
) -> Result<(), String> {
    match timeout(send_timeout, AssertUnwindSafe(sender.send(config, message)).catch_unwind()).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(_)) => Err("Sender panicked".to_string()),
        Err(_) => Err(format!("Timed out after {}s", send_timeout.as_secs_f64())),
    }
}

fn log_outcome(outcome: &DeliveryOutcome) {
    if outcome.delivered {
        info!(
            monitor_id = outcome.monitor_id,
            channel_id = outcome.channel_id,
            channel = %outcome.channel_kind,
            elapsed_ms = outcome.elapsed_ms,
            "Notification delivered"
        );
    } else {
        warn!(
            monitor_id = outcome.monitor_id,
            channel_id = outcome.channel_id,
            channel = %outcome.channel_kind,
            reason = outcome.reason.as_deref().unwrap_or_default(),
            "Notification failed"
        );
    }
}
