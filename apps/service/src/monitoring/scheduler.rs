use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use arc_swap::ArcSwap;
use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::evaluator::evaluate;
use super::executor::Prober;
use super::types::{MonitorDefinition, MonitorId, MonitorState};
use crate::database::Database;
use crate::notifications::{Dispatcher, NotificationChannel};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Concurrent probe workers, independent of the number of monitors
    pub workers: usize,
    /// How often due monitors are looked for
    pub tick: Duration,
    pub refresh_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { workers: 4, tick: Duration::from_secs(1), refresh_interval: Duration::from_secs(60) }
    }
}

/// Scheduling phase of one monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Due,
    Running,
}

/// Immutable configuration view, replaced wholesale on refresh
#[derive(Default)]
struct Snapshot {
    monitors: HashMap<MonitorId, Arc<MonitorDefinition>>,
    channels: Arc<Vec<NotificationChannel>>,
}

struct Slot {
    phase: Phase,
    last_check: Option<Instant>,
    state: MonitorState,
    /// Removed from configuration while Running; dropped on release
    retired: bool,
    /// Kind or target changed while Running; state restarts on release
    reset: bool,
    /// Forced check requested while Running
    recheck: bool,
}

impl Slot {
    fn new(state: MonitorState) -> Self {
        Self { phase: Phase::Idle, last_check: None, state, retired: false, reset: false, recheck: false }
    }
}

struct Shared {
    store: Arc<dyn Database>,
    prober: Arc<dyn Prober>,
    dispatcher: Arc<Dispatcher>,
    settings: SchedulerSettings,
    snapshot: ArcSwap<Snapshot>,
    slots: Mutex<HashMap<MonitorId, Slot>>,
    /// Persisted states not yet claimed by a slot
    persisted: Mutex<HashMap<MonitorId, MonitorState>>,
    queue: mpsc::UnboundedSender<MonitorId>,
    reload: Notify,
    /// Held for the whole of a refresh so snapshots are applied in read order
    refreshing: AsyncMutex<()>,
}

/// Drives every enabled monitor through Idle -> Due -> Running -> Idle.
///
/// A tick loop marks monitors Due once their interval has elapsed and queues
/// them; a fixed pool of workers drains the queue. A monitor is only picked up
/// by a worker while it is Due, so at most one probe per monitor is ever in
/// flight. Configuration is read into an immutable snapshot that is swapped
/// atomically on refresh.
pub struct Scheduler {
    shared: Arc<Shared>,
    queue_rx: mpsc::UnboundedReceiver<MonitorId>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Database>,
        prober: Arc<dyn Prober>,
        dispatcher: Arc<Dispatcher>,
        settings: SchedulerSettings,
    ) -> Self {
        let (queue, queue_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            store,
            prober,
            dispatcher,
            settings,
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            slots: Mutex::new(HashMap::new()),
            persisted: Mutex::new(HashMap::new()),
            queue,
            reload: Notify::new(),
            refreshing: AsyncMutex::new(()),
        });
        Self { shared, queue_rx }
    }

    /// Loads persisted state and configuration, then spawns the loops.
    pub async fn start(self) -> SchedulerHandle {
        let Scheduler { shared, queue_rx } = self;

        match shared.store.load_monitor_states().await {
            Ok(states) => {
                info!(count = states.len(), "Loaded persisted monitor states");
                *lock(&shared.persisted) = states
                    .into_iter()
                    .map(|state| (state.monitor_id, state.warm_start()))
                    .collect();
            }
            Err(e) => warn!(error = %e, "Failed to load monitor states, starting cold"),
        }
        if let Err(e) = shared.refresh().await {
            warn!(error = %e, "Initial configuration load failed");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        tasks.spawn(tick_loop(Arc::clone(&shared), shutdown_rx.clone()));
        tasks.spawn(refresh_loop(Arc::clone(&shared), shutdown_rx.clone()));

        let queue_rx = Arc::new(AsyncMutex::new(queue_rx));
        let workers = shared.settings.workers.max(1);
        for worker in 0..workers {
            tasks.spawn(worker_loop(
                worker,
                Arc::clone(&shared),
                Arc::clone(&queue_rx),
                shutdown_rx.clone(),
            ));
        }
        info!(workers, "Scheduler started");

        SchedulerHandle { shared, shutdown_tx, tasks }
    }
}

/// Operational surface of a running scheduler. Every method is safe to call
/// while the loops are running.
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    tasks: JoinSet<()>,
}

impl SchedulerHandle {
    /// Queue an immediate check. False when the monitor is unknown or already
    /// Due or Running; a Running monitor is queued again once it is released.
    pub fn check_now(&self, id: MonitorId) -> bool {
        self.shared.force(id)
    }

    /// Force a check of every configured monitor. Returns how many were queued.
    pub fn check_all(&self) -> usize {
        let ids: Vec<MonitorId> = self.shared.snapshot.load().monitors.keys().copied().collect();
        ids.into_iter().filter(|id| self.shared.force(*id)).count()
    }

    /// Ask the refresh loop to reload configuration now.
    pub fn reload(&self) {
        self.shared.reload.notify_one();
    }

    /// Reload configuration and wait for it. Returns the number of monitors scheduled.
    pub async fn refresh_now(&self) -> Result<usize> {
        self.shared.refresh().await
    }

    pub fn phase(&self, id: MonitorId) -> Option<Phase> {
        lock(&self.shared.slots).get(&id).map(|slot| slot.phase)
    }

    pub fn state(&self, id: MonitorId) -> Option<MonitorState> {
        lock(&self.shared.slots).get(&id).map(|slot| slot.state.clone())
    }

    pub fn monitor_ids(&self) -> Vec<MonitorId> {
        let mut ids: Vec<_> = self.shared.snapshot.load().monitors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Stop scheduling and wait for running probes to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Scheduler task failed");
            }
        }
        info!("Scheduler stopped");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn enqueue(&self, id: MonitorId) {
        if self.queue.send(id).is_err() {
            debug!(monitor_id = id, "Queue closed, dropping check");
        }
    }

    fn force(&self, id: MonitorId) -> bool {
        let snapshot = self.snapshot.load();
        if !snapshot.monitors.contains_key(&id) {
            return false;
        }
        let mut slots = lock(&self.slots);
        let Some(slot) = slots.get_mut(&id) else { return false };
        match slot.phase {
            Phase::Idle => {
                slot.phase = Phase::Due;
                self.enqueue(id);
                true
            }
            Phase::Due => false,
            Phase::Running => {
                slot.recheck = true;
                false
            }
        }
    }

    /// Marks every Idle monitor whose interval has elapsed as Due.
    fn mark_due(&self, now: Instant) {
        let snapshot = self.snapshot.load();
        let mut slots = lock(&self.slots);
        for (id, definition) in &snapshot.monitors {
            let Some(slot) = slots.get_mut(id) else { continue };
            if slot.phase != Phase::Idle {
                continue;
            }
            let due = slot.last_check.is_none_or(|last| now >= last + definition.interval);
            if due {
                slot.phase = Phase::Due;
                self.enqueue(*id);
            }
        }
    }

    /// Fetch configuration and swap in a new snapshot. On a store error the
    /// previous snapshot stays in place.
    async fn refresh(&self) -> Result<usize> {
        let _refreshing = self.refreshing.lock().await;
        let records = self.store.get_enabled_monitors().await?;
        let channel_records = self.store.get_enabled_channels().await?;

        let mut monitors = HashMap::new();
        for record in records {
            match record.to_definition() {
                Ok(definition) if definition.enabled => {
                    monitors.insert(definition.id, Arc::new(definition));
                }
                Ok(_) => {}
                Err(e) => warn!(monitor_id = ?record.id, name = %record.name, error = %e, "Skipping invalid monitor"),
            }
        }

        let mut channels = Vec::new();
        for record in channel_records {
            match record.to_channel() {
                Ok(channel) => channels.push(channel),
                Err(e) => warn!(channel_id = ?record.id, name = %record.name, error = %e, "Skipping invalid channel"),
            }
        }

        let count = monitors.len();
        {
            let mut slots = lock(&self.slots);
            let mut persisted = lock(&self.persisted);
            let previous = self.snapshot.load();

            for (id, definition) in &monitors {
                match slots.get_mut(id) {
                    Some(slot) => {
                        slot.retired = false;
                        let changed = previous
                            .monitors
                            .get(id)
                            .is_some_and(|old| old.probes_differently(definition));
                        if changed {
                            debug!(monitor_id = id, "Monitor kind or target changed");
                            if slot.phase == Phase::Running {
                                slot.reset = true;
                            } else {
                                slot.state = MonitorState::new(*id);
                                slot.last_check = None;
                            }
                        }
                    }
                    None => {
                        let state = persisted.remove(id).unwrap_or_else(|| MonitorState::new(*id));
                        slots.insert(*id, Slot::new(state));
                    }
                }
            }

            slots.retain(|id, slot| {
                if monitors.contains_key(id) {
                    return true;
                }
                if slot.phase == Phase::Running {
                    slot.retired = true;
                    return true;
                }
                false
            });

            self.snapshot.store(Arc::new(Snapshot { monitors, channels: Arc::new(channels) }));
        }

        debug!(monitors = count, "Configuration refreshed");
        Ok(count)
    }

    /// Claims a Due monitor for this worker.
    fn claim(&self, id: MonitorId) -> Option<(Arc<MonitorDefinition>, MonitorState)> {
        let snapshot = self.snapshot.load();
        let mut slots = lock(&self.slots);
        let slot = slots.get_mut(&id)?;
        if slot.phase != Phase::Due {
            return None;
        }
        let Some(definition) = snapshot.monitors.get(&id).cloned() else {
            slot.phase = Phase::Idle;
            return None;
        };
        slot.phase = Phase::Running;
        slot.last_check = Some(Instant::now());
        Some((definition, slot.state.clone()))
    }

    /// Hands the monitor back to Idle, storing the evaluated state if any.
    fn release(&self, id: MonitorId, state: Option<MonitorState>) {
        let mut slots = lock(&self.slots);
        let Some(slot) = slots.get_mut(&id) else { return };
        if slot.retired {
            slots.remove(&id);
            return;
        }

        if slot.reset {
            slot.reset = false;
            slot.state = MonitorState::new(id);
            slot.last_check = None;
        } else if let Some(state) = state {
            slot.state = state;
        }

        if slot.recheck {
            slot.recheck = false;
            slot.phase = Phase::Due;
            self.enqueue(id);
        } else {
            slot.phase = Phase::Idle;
        }
    }

    async fn run_check(&self, id: MonitorId) {
        let Some((probed, state)) = self.claim(id) else { return };

        let result = self.prober.probe(&probed).await;

        let snapshot = self.snapshot.load_full();
        let current = match snapshot.monitors.get(&id) {
            Some(current) if current.enabled && !current.probes_differently(&probed) => {
                Arc::clone(current)
            }
            _ => {
                debug!(monitor_id = id, "Monitor changed during probe, discarding result");
                self.release(id, None);
                return;
            }
        };

        let (next, transition) = evaluate(&state, &result, &current);

        if let Err(e) = self.store.save_result(&result).await {
            warn!(monitor_id = id, error = %e, "Failed to save probe result");
        }
        if let Some(transition) = &transition {
            info!(
                monitor_id = id,
                previous = %transition.previous,
                status = %transition.current,
                detail = %transition.detail,
                "Monitor status changed"
            );
            if let Err(e) = self.store.save_transition(transition).await {
                warn!(monitor_id = id, error = %e, "Failed to save status transition");
            }
            // state is mirrored on transitions only
            if let Err(e) = self.store.save_monitor_state(&next).await {
                warn!(monitor_id = id, error = %e, "Failed to save monitor state");
            }
        }

        self.release(id, Some(next));

        if let Some(transition) = transition {
            self.dispatcher.notify(transition, current, Arc::clone(&snapshot.channels));
        }
    }
}

async fn tick_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(shared.settings.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => shared.mark_due(Instant::now()),
            _ = shutdown.changed() => break,
        }
    }
}

async fn refresh_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(shared.settings.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately and start() has already refreshed
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shared.reload.notified() => info!("Configuration reload requested"),
            _ = shutdown.changed() => break,
        }
        if let Err(e) = shared.refresh().await {
            warn!(error = %e, "Configuration refresh failed, keeping previous snapshot");
        }
    }
}

async fn worker_loop(
    worker: usize,
    shared: Arc<Shared>,
    queue: Arc<AsyncMutex<mpsc::UnboundedReceiver<MonitorId>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                id = queue.recv() => id,
                _ = shutdown.changed() => None,
            }
        };
        let Some(id) = next else { break };
        shared.run_check(id).await;
    }
    debug!(worker, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio::sync::Semaphore;
    use tokio::time::sleep;

    use super::*;
    use crate::database::models::{ChannelRecord, MonitorRecord};
    use crate::monitoring::types::{MonitorStatus, ProbeOutcome};
    use crate::notifications::{ChannelKind, DispatcherSettings};
    use crate::test_support::{MemoryStore, RecordingSender, ScriptedProber};

    struct Harness {
        store: Arc<MemoryStore>,
        prober: Arc<ScriptedProber>,
        sender: Arc<RecordingSender>,
        dispatcher: Arc<Dispatcher>,
    }

    impl Harness {
        fn new(prober: ScriptedProber) -> Self {
            let sender = Arc::new(RecordingSender::new());
            let dispatcher = Arc::new(
                Dispatcher::with_senders(DispatcherSettings::default(), HashMap::new())
                    .with_sender(ChannelKind::Webhook, sender.clone()),
            );
            Self { store: Arc::new(MemoryStore::default()), prober: Arc::new(prober), sender, dispatcher }
        }

        async fn add_monitor(&self, interval: i64, failure_threshold: i64) -> MonitorId {
            let record = MonitorRecord::new("api", "http", "https://example.com/health")
                .with_interval(interval, 1)
                .with_thresholds(failure_threshold, 1)
                .with_channels(&[1]);
            self.store.save_monitor(&record).await.unwrap()
        }

        async fn add_channel(&self) {
            let record = ChannelRecord::new(
                "ops",
                "webhook",
                serde_json::json!({ "url": "http://hooks.local/ops" }),
            );
            self.store.save_channel(&record).await.unwrap();
        }

        async fn start(&self) -> SchedulerHandle {
            Scheduler::new(
                self.store.clone(),
                self.prober.clone(),
                self.dispatcher.clone(),
                SchedulerSettings {
                    workers: 4,
                    tick: Duration::from_millis(100),
                    refresh_interval: Duration::from_secs(300),
                },
            )
            .start()
            .await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn checks_at_least_once_per_interval() {
        let harness = Harness::new(ScriptedProber::new());
        let id = harness.add_monitor(5, 1).await;
        let handle = harness.start().await;

        sleep(Duration::from_millis(15_500)).await;
        handle.shutdown().await;

        // at 0s, 5s, 10s and 15s
        assert_eq!(harness.prober.calls(id), 4);
        assert_eq!(harness.store.results().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_checks_never_overlap() {
        let harness = Harness::new(ScriptedProber::new().with_delay(Duration::from_secs(3)));
        let id = harness.add_monitor(1, 1).await;
        let handle = harness.start().await;

        for _ in 0..20 {
            handle.check_now(id);
            sleep(Duration::from_millis(250)).await;
        }
        handle.shutdown().await;

        assert!(harness.prober.calls(id) > 1);
        assert_eq!(harness.prober.max_overlap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_alerts_once() {
        let harness = Harness::new(ScriptedProber::new().always(ProbeOutcome::Failure));
        harness.add_channel().await;
        let id = harness.add_monitor(1, 3).await;
        let handle = harness.start().await;

        sleep(Duration::from_millis(10_500)).await;
        assert_eq!(handle.state(id).unwrap().status, MonitorStatus::Down);
        handle.shutdown().await;
        harness.dispatcher.shutdown(Duration::from_secs(5)).await;

        assert!(harness.store.results().len() >= 10);
        let transitions = harness.store.transitions();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].current, MonitorStatus::Down);
        let messages = harness.sender.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].title, "[ALERT] api");
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_mid_flight_discards_the_result() {
        let gate = Arc::new(Semaphore::new(0));
        let harness = Harness::new(ScriptedProber::new().with_gate(gate.clone()));
        let id = harness.add_monitor(60, 1).await;
        let handle = harness.start().await;

        harness.prober.started().notified().await;
        assert_eq!(handle.phase(id), Some(Phase::Running));

        harness.store.set_monitor_enabled(id, false).await.unwrap();
        assert_eq!(handle.refresh_now().await.unwrap(), 0);
        assert_eq!(handle.phase(id), Some(Phase::Running));
        assert!(!handle.check_now(id));

        gate.add_permits(1);
        sleep(Duration::from_secs(1)).await;

        assert_eq!(handle.phase(id), None);
        assert!(harness.store.results().is_empty());
        assert!(harness.store.transitions().is_empty());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failure_keeps_the_previous_snapshot() {
        let harness = Harness::new(ScriptedProber::new());
        let id = harness.add_monitor(60, 1).await;
        let handle = harness.start().await;
        sleep(Duration::from_millis(500)).await;

        harness.store.set_fail_reads(true);
        assert!(handle.refresh_now().await.is_err());
        assert_eq!(handle.monitor_ids(), vec![id]);
        assert!(handle.check_now(id));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn store_write_failures_do_not_stop_probing() {
        let harness = Harness::new(ScriptedProber::new().always(ProbeOutcome::Failure));
        let id = harness.add_monitor(1, 1).await;
        harness.store.set_fail_writes(true);
        let handle = harness.start().await;

        sleep(Duration::from_millis(3_500)).await;
        let state = handle.state(id).unwrap();
        handle.shutdown().await;

        assert_eq!(harness.prober.calls(id), 4);
        assert_eq!(state.status, MonitorStatus::Down);
        assert_eq!(state.consecutive_failures, 4);
        assert!(harness.store.results().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_rows_are_skipped() {
        let harness = Harness::new(ScriptedProber::new());
        let good = harness.add_monitor(60, 1).await;
        let bad = MonitorRecord::new("broken", "gopher", "gopher://example.com");
        harness.store.save_monitor(&bad).await.unwrap();

        let handle = harness.start().await;
        assert_eq!(handle.monitor_ids(), vec![good]);
        assert!(!handle.check_now(999));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn warm_restart_does_not_reannounce() {
        let harness = Harness::new(ScriptedProber::new().always(ProbeOutcome::Failure));
        harness.add_channel().await;
        let id = harness.add_monitor(5, 1).await;
        let mut down = MonitorState::new(id);
        down.status = MonitorStatus::Down;
        down.consecutive_failures = 7;
        harness.store.save_monitor_state(&down).await.unwrap();

        let handle = harness.start().await;
        sleep(Duration::from_secs(6)).await;
        let state = handle.state(id).unwrap();
        handle.shutdown().await;
        harness.dispatcher.shutdown(Duration::from_secs(1)).await;

        assert_eq!(state.status, MonitorStatus::Down);
        assert_eq!(state.consecutive_failures, 2);
        assert!(harness.store.transitions().is_empty());
        assert!(harness.sender.messages().is_empty());
        // no transition, so the stored row is untouched
        assert_eq!(harness.store.states()[&id], down);
    }

    #[tokio::test(start_paused = true)]
    async fn state_is_stored_only_on_transitions() {
        let harness = Harness::new(ScriptedProber::new());
        let id = harness.add_monitor(1, 1).await;
        let handle = harness.start().await;

        sleep(Duration::from_millis(4_500)).await;
        let live = handle.state(id).unwrap();
        handle.shutdown().await;

        assert_eq!(harness.prober.calls(id), 5);
        assert_eq!(live.consecutive_successes, 5);
        assert_eq!(harness.store.transitions().len(), 1);

        let stored = harness.store.states()[&id].clone();
        assert_eq!(stored.status, MonitorStatus::Up);
        assert_eq!(stored.consecutive_successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_apply_in_order() {
        let harness = Harness::new(ScriptedProber::new());
        let id = harness.add_monitor(60, 1).await;
        let handle = harness.start().await;
        sleep(Duration::from_millis(500)).await;

        // the first refresh reads the monitor as enabled, then stalls on channels
        harness.store.delay_next_channel_read(Duration::from_secs(5));
        let stale = handle.refresh_now();
        let fresh = async {
            sleep(Duration::from_secs(1)).await;
            harness.store.set_monitor_enabled(id, false).await.unwrap();
            handle.refresh_now().await
        };
        let (stale, fresh) = tokio::join!(stale, fresh);

        assert_eq!(stale.unwrap(), 1);
        assert_eq!(fresh.unwrap(), 0);
        assert!(handle.monitor_ids().is_empty());
        assert_eq!(handle.phase(id), None);

        sleep(Duration::from_secs(120)).await;
        assert_eq!(harness.prober.calls(id), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn added_monitors_are_picked_up_on_refresh() {
        let harness = Harness::new(ScriptedProber::new());
        let first = harness.add_monitor(60, 1).await;
        let handle = harness.start().await;
        sleep(Duration::from_millis(500)).await;

        let second = harness.add_monitor(60, 1).await;
        assert_eq!(harness.prober.calls(second), 0);
        assert_eq!(handle.refresh_now().await.unwrap(), 2);
        sleep(Duration::from_millis(500)).await;
        handle.shutdown().await;

        assert_eq!(harness.prober.calls(first), 1);
        assert_eq!(harness.prober.calls(second), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn target_change_while_running_restarts_state() {
        let gate = Arc::new(Semaphore::new(1));
        let harness = Harness::new(
            ScriptedProber::new().always(ProbeOutcome::Failure).with_gate(gate.clone()),
        );
        let id = harness.add_monitor(1, 1).await;
        let handle = harness.start().await;

        // first check settles Down, the second is held at the gate
        sleep(Duration::from_millis(1_500)).await;
        assert_eq!(handle.phase(id), Some(Phase::Running));
        assert_eq!(handle.state(id).unwrap().status, MonitorStatus::Down);

        let mut record = harness.store.get_monitor(id).await.unwrap().unwrap();
        record.target = "https://example.com/v2/health".to_string();
        harness.store.save_monitor(&record).await.unwrap();
        assert_eq!(handle.refresh_now().await.unwrap(), 1);
        assert_eq!(handle.state(id).unwrap().status, MonitorStatus::Down);

        gate.add_permits(1);
        sleep(Duration::from_millis(50)).await;

        let state = handle.state(id).unwrap();
        assert_eq!(state.status, MonitorStatus::Unknown);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(harness.store.results().len(), 1);
        assert_eq!(harness.store.transitions().len(), 1);

        gate.add_permits(8);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_is_dispatched() {
        let prober = ScriptedProber::new().script(1, &[ProbeOutcome::Failure, ProbeOutcome::Success]);
        let harness = Harness::new(prober);
        harness.add_channel().await;
        let id = harness.add_monitor(2, 1).await;
        assert_eq!(id, 1);
        let handle = harness.start().await;

        sleep(Duration::from_millis(2_500)).await;
        handle.shutdown().await;
        harness.dispatcher.shutdown(Duration::from_secs(1)).await;

        let statuses: Vec<_> = harness.store.transitions().iter().map(|t| t.current).collect();
        assert_eq!(statuses, vec![MonitorStatus::Down, MonitorStatus::Up]);
        let titles: Vec<_> = harness.sender.messages().into_iter().map(|m| m.title).collect();
        assert_eq!(titles, vec!["[ALERT] api".to_string(), "[RECOVERED] api".to_string()]);
    }
}
