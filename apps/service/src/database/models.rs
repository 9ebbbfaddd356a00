use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitoring::types::{ChannelId, MonitorDefinition, MonitorId, ProbeOutcome};
use crate::monitoring::validation::{self, DefinitionError};
use crate::notifications::models::{ChannelConfig, NotificationChannel};

/// Monitor row as stored; turned into a `MonitorDefinition` after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorRecord {
    pub id: Option<MonitorId>,
    pub name: String,
    pub kind: String,
    pub target: String,
    pub interval_seconds: i64,
    pub timeout_seconds: i64,
    pub failure_threshold: i64,
    pub recovery_threshold: i64,
    pub enabled: bool,
    /// JSON object with kind-specific settings
    pub settings: String,
    /// JSON array of channel ids
    pub notify_channels: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonitorRecord {
    /// Create a new monitor record with default scheduling parameters
    pub fn new(name: impl Into<String>, kind: impl Into<String>, target: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name: name.into(),
            kind: kind.into(),
            target: target.into(),
            interval_seconds: 60,
            timeout_seconds: 30,
            failure_threshold: 3,
            recovery_threshold: 1,
            enabled: true,
            settings: "{}".into(),
            notify_channels: "[]".into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings.to_string();
        self
    }

    pub fn with_channels(mut self, channels: &[ChannelId]) -> Self {
        self.notify_channels = serde_json::Value::from(channels.to_vec()).to_string();
        self
    }

    pub fn with_interval(mut self, interval_seconds: i64, timeout_seconds: i64) -> Self {
        self.interval_seconds = interval_seconds;
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_thresholds(mut self, failure: i64, recovery: i64) -> Self {
        self.failure_threshold = failure;
        self.recovery_threshold = recovery;
        self
    }

    /// Validate the row and build the scheduler's view of it.
    pub fn to_definition(&self) -> Result<MonitorDefinition, DefinitionError> {
        let kind = validation::parse_kind(&self.kind, &self.settings)?;
        let interval = validation::validate_check_interval(self.interval_seconds)?;
        let timeout = validation::validate_timeout(self.timeout_seconds)?;
        let failure_threshold =
            validation::validate_threshold("failure_threshold", self.failure_threshold)?;
        let recovery_threshold =
            validation::validate_threshold("recovery_threshold", self.recovery_threshold)?;
        let channels = if self.notify_channels.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.notify_channels).map_err(DefinitionError::Channels)?
        };

        let definition = MonitorDefinition {
            id: self.id.unwrap_or_default(),
            name: self.name.clone(),
            kind,
            target: self.target.trim().to_string(),
            interval: Duration::from_secs(interval),
            timeout: Duration::from_secs(timeout),
            failure_threshold,
            recovery_threshold,
            enabled: self.enabled,
            channels,
        };
        validation::validate_definition(&definition)?;
        Ok(definition)
    }
}

/// Notification channel row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: Option<ChannelId>,
    pub name: String,
    pub kind: String,
    /// JSON object with kind-specific configuration
    pub config: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelRecord {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, config: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name: name.into(),
            kind: kind.into(),
            config: config.to_string(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_channel(&self) -> Result<NotificationChannel, DefinitionError> {
        Ok(NotificationChannel {
            id: self.id.unwrap_or_default(),
            name: self.name.clone(),
            config: ChannelConfig::parse(&self.kind, &self.config)?,
            enabled: self.enabled,
        })
    }
}

/// A heartbeat pushed by a passive monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub monitor_id: MonitorId,
    pub received_at: DateTime<Utc>,
    pub outcome: ProbeOutcome,
    pub message: Option<String>,
}

impl Heartbeat {
    pub fn new(monitor_id: MonitorId, outcome: ProbeOutcome, message: Option<String>) -> Self {
        Self { monitor_id, received_at: Utc::now(), outcome, message }
    }
}

/// Convert a timestamp to the integer milliseconds stored in the database
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert stored milliseconds back to a timestamp
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
