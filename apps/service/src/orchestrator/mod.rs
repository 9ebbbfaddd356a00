/// Orchestrator module - coordinates all components
///
/// The orchestrator is the core coordinator that:
/// - Opens the result store and applies migrations
/// - Wires the probe executor, scheduler and notification dispatcher together
/// - Runs retention cleanup in the background
/// - Provides the one-shot operations used by the CLI
pub mod retention;


pub use retention::{RetentionCleanup, RetentionPolicy};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::models::{Heartbeat, MonitorRecord};
use crate::database::{Database, DatabaseImpl, initialize_database};
use crate::monitoring::executor::{ProbeExecutor, Prober};
use crate::monitoring::scheduler::{Scheduler, SchedulerHandle};
use crate::monitoring::types::{MonitorId, MonitorKind, MonitorState, ProbeOutcome, ProbeResult};
use crate::notifications::{DeliveryOutcome, Dispatcher};
use crate::pool::{LibsqlPool, open_pool};

/// Main orchestrator for the Vigil service
pub struct Orchestrator {
    config: Arc<Config>,
    database: Arc<dyn Database>,
    prober: Arc<dyn Prober>,
    dispatcher: Arc<Dispatcher>,
}

/// A running engine: scheduler, dispatcher and retention task
pub struct Engine {
    scheduler: SchedulerHandle,
    dispatcher: Arc<Dispatcher>,
    retention: JoinHandle<()>,
    retention_shutdown: watch::Sender<bool>,
    grace: Duration,
}

impl Orchestrator {
    /// Open the configured database file and build every component.
    pub async fn new(config: Config) -> Result<Self> {
        let pool = open_pool(&config.database.path, config.database.max_connections).await?;
        Self::with_pool(config, pool).await
    }

    /// Build on an existing pool, applying migrations first.
    pub async fn with_pool(config: Config, pool: LibsqlPool) -> Result<Self> {
        {
            let conn = pool.get().await.map_err(|e| anyhow!("failed to get database connection: {e}"))?;
            info!("Initializing database schema...");
            initialize_database(&conn).await?;
        }

        let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));
        let prober = Arc::new(ProbeExecutor::new(database.clone())?);
        let dispatcher =
            Arc::new(Dispatcher::new(config.dispatcher_settings())?.with_store(database.clone()));

        Ok(Self::from_parts(config, database, prober, dispatcher))
    }

    pub fn from_parts(
        config: Config,
        database: Arc<dyn Database>,
        prober: Arc<dyn Prober>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self { config: Arc::new(config), database, prober, dispatcher }
    }

    pub fn database(&self) -> Arc<dyn Database> {
        self.database.clone()
    }

    /// Start scheduling and background cleanup.
    pub async fn start(&self) -> Result<Engine> {
        info!("Starting Vigil engine...");
        let scheduler = Scheduler::new(
            self.database.clone(),
            self.prober.clone(),
            self.dispatcher.clone(),
            self.config.scheduler_settings(),
        )
        .start()
        .await;

        let policy = RetentionPolicy {
            days: self.config.retention.days,
            cleanup_interval: Duration::from_secs(self.config.retention.cleanup_interval_seconds.max(60)),
        };
        info!(days = policy.days, "Retention policy");
        let (retention_shutdown, shutdown_rx) = watch::channel(false);
        let retention =
            RetentionCleanup::new(self.database.clone(), policy).start_periodic_cleanup(shutdown_rx);

        Ok(Engine {
            scheduler,
            dispatcher: self.dispatcher.clone(),
            retention,
            retention_shutdown,
            grace: self.config.shutdown_grace(),
        })
    }

    /// Probe a stored monitor once without recording anything.
    pub async fn check_once(&self, id: MonitorId) -> Result<ProbeResult> {
        let record = self
            .database
            .get_monitor(id)
            .await?
            .ok_or_else(|| anyhow!("Monitor {id} not found"))?;
        let definition = record.to_definition()?;
        Ok(self.prober.probe(&definition).await)
    }

    /// Record a heartbeat for a push monitor.
    pub async fn record_push(
        &self,
        id: MonitorId,
        outcome: ProbeOutcome,
        message: Option<String>,
    ) -> Result<Heartbeat> {
        let record = self
            .database
            .get_monitor(id)
            .await?
            .ok_or_else(|| anyhow!("Monitor {id} not found"))?;
        let definition = record.to_definition()?;
        if !matches!(definition.kind, MonitorKind::Push(_)) {
            bail!("Monitor {id} is a {} monitor, not a push monitor", definition.kind.name());
        }

        let heartbeat = Heartbeat::new(id, outcome, message);
        self.database.record_heartbeat(&heartbeat).await?;
        info!(monitor_id = id, outcome = %outcome, "Heartbeat recorded");
        Ok(heartbeat)
    }

    /// Send a test message through one stored channel.
    pub async fn test_channel(&self, id: i64) -> Result<DeliveryOutcome> {
        let record = self
            .database
            .get_channel(id)
            .await?
            .ok_or_else(|| anyhow!("Channel {id} not found"))?;
        let channel = record.to_channel()?;
        Ok(self.dispatcher.test_channel(&channel).await)
    }

    /// Every stored monitor with its last persisted state, if any.
    pub async fn monitor_overview(&self) -> Result<Vec<(MonitorRecord, Option<MonitorState>)>> {
        let monitors = self.database.list_monitors().await?;
        let mut states: HashMap<MonitorId, MonitorState> = self
            .database
            .load_monitor_states()
            .await?
            .into_iter()
            .map(|state| (state.monitor_id, state))
            .collect();

        Ok(monitors
            .into_iter()
            .map(|record| {
                let state = record.id.and_then(|id| states.remove(&id));
                (record, state)
            })
            .collect())
    }
}

impl Engine {
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Stop scheduling, drain running probes, then give in-flight
    /// notifications up to the grace period.
    pub async fn shutdown(self) {
        info!("Shutting down...");
        self.scheduler.shutdown().await;

        let _ = self.retention_shutdown.send(true);
        if let Err(e) = self.retention.await {
            warn!(error = %e, "Retention task failed");
        }

        self.dispatcher.shutdown(self.grace).await;
        info!("Shutdown complete");
    }
}
