use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use uuid::Uuid;

use super::models::{ChannelRecord, Heartbeat, MonitorRecord, from_millis, to_millis};
use crate::monitoring::types::{
    MonitorId, MonitorState, MonitorStatus, ProbeOutcome, ProbeResult, StatusTransition,
};
use crate::notifications::dispatcher::DeliveryOutcome;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Read/write contract between the engine and its storage
#[async_trait]
pub trait Database: Send + Sync {
    /// Get all enabled monitors
    async fn get_enabled_monitors(&self) -> Result<Vec<MonitorRecord>>;

    async fn get_monitor(&self, id: MonitorId) -> Result<Option<MonitorRecord>>;

    /// All monitors, enabled or not
    async fn list_monitors(&self) -> Result<Vec<MonitorRecord>>;

    /// Insert (no id) or update a monitor, returning its id
    async fn save_monitor(&self, monitor: &MonitorRecord) -> Result<MonitorId>;

    async fn set_monitor_enabled(&self, id: MonitorId, enabled: bool) -> Result<()>;

    async fn get_enabled_channels(&self) -> Result<Vec<ChannelRecord>>;

    /// Any channel by id, enabled or not
    async fn get_channel(&self, id: i64) -> Result<Option<ChannelRecord>>;

    async fn save_channel(&self, channel: &ChannelRecord) -> Result<i64>;

    /// Append a probe result
    async fn save_result(&self, result: &ProbeResult) -> Result<()>;

    /// Most recent results first
    async fn get_recent_results(&self, monitor_id: MonitorId, limit: usize) -> Result<Vec<ProbeResult>>;

    async fn save_transition(&self, transition: &StatusTransition) -> Result<()>;

    /// Most recent transitions first, across all monitors
    async fn get_recent_transitions(&self, limit: usize) -> Result<Vec<StatusTransition>>;

    async fn save_monitor_state(&self, state: &MonitorState) -> Result<()>;

    /// Counters come back as they were at the last transition and are only
    /// informational; callers restart debouncing with `MonitorState::warm_start`.
    /// `failing_outcome` is not stored and always loads as `None`.
    async fn load_monitor_states(&self) -> Result<Vec<MonitorState>>;

    async fn record_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()>;

    async fn get_last_heartbeat(&self, monitor_id: MonitorId) -> Result<Option<Heartbeat>>;

    async fn save_delivery(&self, delivery: &DeliveryOutcome) -> Result<()>;

    /// Delete history older than `cutoff`, returning the number of rows removed
    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

const MONITOR_COLUMNS: &str = "id, name, kind, target, interval_seconds, timeout_seconds, \
     failure_threshold, recovery_threshold, enabled, settings, notify_channels, created_at, updated_at";

const CHANNEL_COLUMNS: &str = "id, name, kind, config, enabled, created_at, updated_at";

const RESULT_COLUMNS: &str = "id, monitor_id, timestamp, outcome, latency_ms, status_code, \
     expires_at, days_until_expiry, message";

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow::anyhow!("failed to get database connection: {e}"))
    }

    async fn query_monitors(&self, sql: &str, id: Option<MonitorId>) -> Result<Vec<MonitorRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = match id {
            Some(id) => conn.query(sql, params![id]).await?,
            None => conn.query(sql, ()).await?,
        };

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn query_channels(&self, sql: &str, id: Option<i64>) -> Result<Vec<ChannelRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = match id {
            Some(id) => conn.query(sql, params![id]).await?,
            None => conn.query(sql, ()).await?,
        };

        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            channels.push(channel_from_row(&row)?);
        }
        Ok(channels)
    }
}

fn channel_from_row(row: &Row) -> Result<ChannelRecord> {
    Ok(ChannelRecord {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        kind: row.get(2)?,
        config: row.get(3)?,
        enabled: row.get::<i64>(4)? != 0,
        created_at: from_millis(row.get(5)?),
        updated_at: from_millis(row.get(6)?),
    })
}

fn monitor_from_row(row: &Row) -> Result<MonitorRecord> {
    Ok(MonitorRecord {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        kind: row.get(2)?,
        target: row.get(3)?,
        interval_seconds: row.get(4)?,
        timeout_seconds: row.get(5)?,
        failure_threshold: row.get(6)?,
        recovery_threshold: row.get(7)?,
        enabled: row.get::<i64>(8)? != 0,
        settings: row.get(9)?,
        notify_channels: row.get(10)?,
        created_at: from_millis(row.get(11)?),
        updated_at: from_millis(row.get(12)?),
    })
}

fn result_from_row(row: &Row) -> Result<ProbeResult> {
    let id: String = row.get(0)?;
    let outcome: String = row.get(3)?;
    Ok(ProbeResult {
        id: Uuid::parse_str(&id)?,
        monitor_id: row.get(1)?,
        timestamp: from_millis(row.get(2)?),
        outcome: outcome.parse::<ProbeOutcome>().map_err(anyhow::Error::msg)?,
        latency_ms: row.get::<Option<i64>>(4)?.map(|v| v.max(0) as u64),
        status_code: row.get::<Option<i64>>(5)?.and_then(|v| u16::try_from(v).ok()),
        expires_at: row.get::<Option<i64>>(6)?.map(from_millis),
        days_until_expiry: row.get(7)?,
        message: row.get(8)?,
    })
}

fn status_column(row: &Row, index: i32) -> Result<MonitorStatus> {
    let raw: String = row.get(index)?;
    raw.parse().map_err(anyhow::Error::msg)
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn get_enabled_monitors(&self) -> Result<Vec<MonitorRecord>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE enabled = 1 ORDER BY id");
        self.query_monitors(&sql, None).await
    }

    async fn get_monitor(&self, id: MonitorId) -> Result<Option<MonitorRecord>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?");
        Ok(self.query_monitors(&sql, Some(id)).await?.into_iter().next())
    }

    async fn list_monitors(&self) -> Result<Vec<MonitorRecord>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY id");
        self.query_monitors(&sql, None).await
    }

    async fn save_monitor(&self, monitor: &MonitorRecord) -> Result<MonitorId> {
        let conn = self.get_conn().await?;
        let now = to_millis(Utc::now());

        if let Some(id) = monitor.id {
            conn.execute(
                "UPDATE monitors SET name = ?, kind = ?, target = ?, interval_seconds = ?, timeout_seconds = ?, \
                 failure_threshold = ?, recovery_threshold = ?, enabled = ?, settings = ?, notify_channels = ?, \
                 updated_at = ? WHERE id = ?",
                params![
                    monitor.name.clone(),
                    monitor.kind.clone(),
                    monitor.target.clone(),
                    monitor.interval_seconds,
                    monitor.timeout_seconds,
                    monitor.failure_threshold,
                    monitor.recovery_threshold,
                    i64::from(monitor.enabled),
                    monitor.settings.clone(),
                    monitor.notify_channels.clone(),
                    now,
                    id
                ],
            )
            .await?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO monitors (name, kind, target, interval_seconds, timeout_seconds, failure_threshold, \
                 recovery_threshold, enabled, settings, notify_channels, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    monitor.name.clone(),
                    monitor.kind.clone(),
                    monitor.target.clone(),
                    monitor.interval_seconds,
                    monitor.timeout_seconds,
                    monitor.failure_threshold,
                    monitor.recovery_threshold,
                    i64::from(monitor.enabled),
                    monitor.settings.clone(),
                    monitor.notify_channels.clone(),
                    to_millis(monitor.created_at),
                    now
                ],
            )
            .await?;
            Ok(conn.last_insert_rowid())
        }
    }

    async fn set_monitor_enabled(&self, id: MonitorId, enabled: bool) -> Result<()> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE monitors SET enabled = ?, updated_at = ? WHERE id = ?",
                params![i64::from(enabled), to_millis(Utc::now()), id],
            )
            .await?;
        anyhow::ensure!(changed > 0, "monitor {id} does not exist");
        Ok(())
    }

    async fn get_enabled_channels(&self) -> Result<Vec<ChannelRecord>> {
        let sql = format!("SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE enabled = 1 ORDER BY id");
        self.query_channels(&sql, None).await
    }

    async fn get_channel(&self, id: i64) -> Result<Option<ChannelRecord>> {
        let sql = format!("SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE id = ?");
        Ok(self.query_channels(&sql, Some(id)).await?.into_iter().next())
    }

    async fn save_channel(&self, channel: &ChannelRecord) -> Result<i64> {
        let conn = self.get_conn().await?;
        let now = to_millis(Utc::now());

        if let Some(id) = channel.id {
            conn.execute(
                "UPDATE notification_channels SET name = ?, kind = ?, config = ?, enabled = ?, updated_at = ? WHERE id = ?",
                params![
                    channel.name.clone(),
                    channel.kind.clone(),
                    channel.config.clone(),
                    i64::from(channel.enabled),
                    now,
                    id
                ],
            )
            .await?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO notification_channels (name, kind, config, enabled, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    channel.name.clone(),
                    channel.kind.clone(),
                    channel.config.clone(),
                    i64::from(channel.enabled),
                    to_millis(channel.created_at),
                    now
                ],
            )
            .await?;
            Ok(conn.last_insert_rowid())
        }
    }

    async fn save_result(&self, result: &ProbeResult) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            &format!("INSERT INTO probe_results ({RESULT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                result.id.to_string(),
                result.monitor_id,
                to_millis(result.timestamp),
                result.outcome.as_str(),
                result.latency_ms.map(|v| v as i64),
                result.status_code.map(i64::from),
                result.expires_at.map(to_millis),
                result.days_until_expiry,
                result.message.clone()
            ],
        )
        .await
        .with_context(|| format!("saving result for monitor {}", result.monitor_id))?;
        Ok(())
    }

    async fn get_recent_results(&self, monitor_id: MonitorId, limit: usize) -> Result<Vec<ProbeResult>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RESULT_COLUMNS} FROM probe_results WHERE monitor_id = ? \
                     ORDER BY timestamp DESC, rowid DESC LIMIT ?"
                ),
                params![monitor_id, limit as i64],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(result_from_row(&row)?);
        }
        Ok(results)
    }

    async fn save_transition(&self, transition: &StatusTransition) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO status_transitions (id, monitor_id, previous_status, new_status, timestamp, result_id, detail) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                transition.id.to_string(),
                transition.monitor_id,
                transition.previous.as_str(),
                transition.current.as_str(),
                to_millis(transition.timestamp),
                transition.result_id.to_string(),
                transition.detail.clone()
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_recent_transitions(&self, limit: usize) -> Result<Vec<StatusTransition>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, monitor_id, previous_status, new_status, timestamp, result_id, detail \
                 FROM status_transitions ORDER BY timestamp DESC, rowid DESC LIMIT ?",
                params![limit as i64],
            )
            .await?;

        let mut transitions = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let result_id: String = row.get(5)?;
            transitions.push(StatusTransition {
                id: Uuid::parse_str(&id)?,
                monitor_id: row.get(1)?,
                previous: status_column(&row, 2)?,
                current: status_column(&row, 3)?,
                timestamp: from_millis(row.get(4)?),
                result_id: Uuid::parse_str(&result_id)?,
                detail: row.get(6)?,
            });
        }
        Ok(transitions)
    }

    async fn save_monitor_state(&self, state: &MonitorState) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitor_states (monitor_id, status, consecutive_failures, consecutive_successes, \
             last_transition_at, last_check_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(monitor_id) DO UPDATE SET status = excluded.status, \
             consecutive_failures = excluded.consecutive_failures, \
             consecutive_successes = excluded.consecutive_successes, \
             last_transition_at = excluded.last_transition_at, \
             last_check_at = excluded.last_check_at, updated_at = excluded.updated_at",
            params![
                state.monitor_id,
                state.status.as_str(),
                i64::from(state.consecutive_failures),
                i64::from(state.consecutive_successes),
                state.last_transition_at.map(to_millis),
                state.last_check_at.map(to_millis),
                to_millis(Utc::now())
            ],
        )
        .await?;
        Ok(())
    }

    async fn load_monitor_states(&self) -> Result<Vec<MonitorState>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT monitor_id, status, consecutive_failures, consecutive_successes, \
                 last_transition_at, last_check_at FROM monitor_states ORDER BY monitor_id",
                (),
            )
            .await?;

        let mut states = Vec::new();
        while let Some(row) = rows.next().await? {
            states.push(MonitorState {
                monitor_id: row.get(0)?,
                status: status_column(&row, 1)?,
                consecutive_failures: row.get::<i64>(2)?.clamp(0, u32::MAX as i64) as u32,
                consecutive_successes: row.get::<i64>(3)?.clamp(0, u32::MAX as i64) as u32,
                failing_outcome: None,
                last_transition_at: row.get::<Option<i64>>(4)?.map(from_millis),
                last_check_at: row.get::<Option<i64>>(5)?.map(from_millis),
            });
        }
        Ok(states)
    }

    async fn record_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO heartbeats (monitor_id, received_at, outcome, message) VALUES (?, ?, ?, ?)",
            params![
                heartbeat.monitor_id,
                to_millis(heartbeat.received_at),
                heartbeat.outcome.as_str(),
                heartbeat.message.clone()
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_last_heartbeat(&self, monitor_id: MonitorId) -> Result<Option<Heartbeat>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT monitor_id, received_at, outcome, message FROM heartbeats \
                 WHERE monitor_id = ? ORDER BY received_at DESC, id DESC LIMIT 1",
                params![monitor_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let outcome: String = row.get(2)?;
        Ok(Some(Heartbeat {
            monitor_id: row.get(0)?,
            received_at: from_millis(row.get(1)?),
            outcome: outcome.parse().map_err(anyhow::Error::msg)?,
            message: row.get(3)?,
        }))
    }

    async fn save_delivery(&self, delivery: &DeliveryOutcome) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO notification_deliveries (transition_id, monitor_id, channel_id, channel_kind, delivered, \
             reason, elapsed_ms, attempted_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                delivery.transition_id.to_string(),
                delivery.monitor_id,
                delivery.channel_id,
                delivery.channel_kind.as_str(),
                i64::from(delivery.delivered),
                delivery.reason.clone(),
                delivery.elapsed_ms as i64,
                to_millis(delivery.attempted_at)
            ],
        )
        .await?;
        Ok(())
    }

    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        let cutoff = to_millis(cutoff);

        let mut deleted = 0;
        for (table, column) in [
            ("probe_results", "timestamp"),
            ("status_transitions", "timestamp"),
            ("heartbeats", "received_at"),
            ("notification_deliveries", "attempted_at"),
        ] {
            let removed = conn
                .execute(&format!("DELETE FROM {table} WHERE {column} < ?"), params![cutoff])
                .await?;
            tracing::debug!(table, removed, "retention cleanup");
            deleted += removed;
        }
        Ok(deleted)
    }
}
