use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type MonitorId = i64;
pub type ChannelId = i64;

/// Debounced status of a monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Degraded,
    #[default]
    Unknown,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
            MonitorStatus::Degraded => "degraded",
            MonitorStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(MonitorStatus::Up),
            "down" => Ok(MonitorStatus::Down),
            "degraded" => Ok(MonitorStatus::Degraded),
            "unknown" => Ok(MonitorStatus::Unknown),
            other => Err(format!("unknown monitor status `{other}`")),
        }
    }
}

/// Raw outcome of a single probe, before debouncing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    Success,
    Degraded,
    Failure,
}

impl ProbeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Success => "success",
            ProbeOutcome::Degraded => "degraded",
            ProbeOutcome::Failure => "failure",
        }
    }

    /// Status a monitor settles on once this outcome has been confirmed.
    pub fn status(&self) -> MonitorStatus {
        match self {
            ProbeOutcome::Success => MonitorStatus::Up,
            ProbeOutcome::Degraded => MonitorStatus::Degraded,
            ProbeOutcome::Failure => MonitorStatus::Down,
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" | "up" => Ok(ProbeOutcome::Success),
            "degraded" => Ok(ProbeOutcome::Degraded),
            "failure" | "down" => Ok(ProbeOutcome::Failure),
            other => Err(format!("unknown probe outcome `{other}`")),
        }
    }
}

/// Result of one probe execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub id: Uuid,

    pub monitor_id: MonitorId,

    /// When the probe finished
    pub timestamp: DateTime<Utc>,

    pub outcome: ProbeOutcome,

    /// Response time in milliseconds
    pub latency_ms: Option<u64>,

    /// HTTP status code (if applicable)
    pub status_code: Option<u16>,

    /// Certificate expiry (TLS probes only)
    pub expires_at: Option<DateTime<Utc>>,

    pub days_until_expiry: Option<i64>,

    /// Diagnostic text, the error for failures
    pub message: Option<String>,
}

impl ProbeResult {
    fn new(monitor_id: MonitorId, outcome: ProbeOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            monitor_id,
            timestamp: Utc::now(),
            outcome,
            latency_ms: None,
            status_code: None,
            expires_at: None,
            days_until_expiry: None,
            message: None,
        }
    }

    pub fn success(monitor_id: MonitorId) -> Self {
        Self::new(monitor_id, ProbeOutcome::Success)
    }

    pub fn degraded(monitor_id: MonitorId, message: impl Into<String>) -> Self {
        Self::new(monitor_id, ProbeOutcome::Degraded).with_message(message)
    }

    pub fn failure(monitor_id: MonitorId, error: impl Into<String>) -> Self {
        Self::new(monitor_id, ProbeOutcome::Failure).with_message(error)
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>, days_until_expiry: i64) -> Self {
        self.expires_at = Some(expires_at);
        self.days_until_expiry = Some(days_until_expiry);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ProbeOutcome::Success
    }

    /// One-line summary used in logs, alerts and the CLI.
    pub fn detail(&self) -> String {
        let mut parts = Vec::new();
        if let Some(code) = self.status_code {
            parts.push(format!("HTTP {code}"));
        }
        if let Some(days) = self.days_until_expiry {
            parts.push(format!("certificate expires in {days} days"));
        }
        if let Some(latency) = self.latency_ms {
            parts.push(format!("{latency}ms"));
        }
        if let Some(message) = &self.message {
            parts.push(message.clone());
        }
        if parts.is_empty() { self.outcome.to_string() } else { parts.join(", ") }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Patterns like `200`, `2xx` or `200-299`. Empty means 2xx and 3xx.
    pub accepted_statuses: Vec<String>,
    /// Accepted in addition to `accepted_statuses`
    pub expected_status: Option<u16>,
    /// Body must contain this text
    pub keyword: Option<String>,
    pub follow_redirects: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
            accepted_statuses: Vec::new(),
            expected_status: None,
            keyword: None,
            follow_redirects: true,
        }
    }
}

impl HttpSettings {
    pub fn accepts(&self, status_code: u16) -> bool {
        if self.expected_status == Some(status_code) {
            return true;
        }
        if self.accepted_statuses.is_empty() {
            return (200..400).contains(&status_code);
        }
        self.accepted_statuses
            .iter()
            .any(|pattern| status_pattern_matches(pattern, status_code).unwrap_or(false))
    }
}

/// `None` when the pattern itself is malformed.
pub fn status_pattern_matches(pattern: &str, status_code: u16) -> Option<bool> {
    let pattern = pattern.trim();
    let lower = pattern.to_ascii_lowercase();

    if let Some(class) = lower.strip_suffix("xx") {
        let class: u16 = class.parse().ok()?;
        if !(1..=5).contains(&class) {
            return None;
        }
        return Some(status_code / 100 == class);
    }

    if let Some((start, end)) = pattern.split_once('-') {
        let start: u16 = start.trim().parse().ok()?;
        let end: u16 = end.trim().parse().ok()?;
        if start > end {
            return None;
        }
        return Some((start..=end).contains(&status_code));
    }

    pattern.parse::<u16>().ok().map(|code| code == status_code)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// Expiry within this many days reports degraded
    pub warning_days: i64,
    /// Expiry within this many days reports failure
    pub critical_days: i64,
    /// SNI name when it differs from the target host
    pub server_name: Option<String>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self { warning_days: 30, critical_days: 7, server_name: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpSettings {
    /// Used when the target carries no port
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MysqlSettings {
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub password: Option<String>,
    pub database: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushSettings {
    /// Heartbeats older than `interval * grace_factor` count as missed
    pub grace_factor: u32,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self { grace_factor: 2 }
    }
}

/// Check kind together with its kind-specific settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MonitorKind {
    #[serde(alias = "https", alias = "keyword")]
    Http(HttpSettings),
    #[serde(alias = "ssl")]
    Tls(TlsSettings),
    #[serde(alias = "port", alias = "ping")]
    Tcp(TcpSettings),
    Mysql(MysqlSettings),
    Redis(RedisSettings),
    Push(PushSettings),
}

impl MonitorKind {
    pub fn name(&self) -> &'static str {
        match self {
            MonitorKind::Http(_) => "http",
            MonitorKind::Tls(_) => "tls",
            MonitorKind::Tcp(_) => "tcp",
            MonitorKind::Mysql(_) => "mysql",
            MonitorKind::Redis(_) => "redis",
            MonitorKind::Push(_) => "push",
        }
    }
}

/// Validated, immutable view of a monitor used by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorDefinition {
    pub id: MonitorId,
    pub name: String,
    pub kind: MonitorKind,
    pub target: String,
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive failures needed to declare DOWN (or DEGRADED)
    pub failure_threshold: u32,
    /// Consecutive successes needed to declare UP
    pub recovery_threshold: u32,
    pub enabled: bool,
    pub channels: Vec<ChannelId>,
}

impl MonitorDefinition {
    /// Hard bound for one probe: the configured timeout, capped below the interval.
    pub fn probe_timeout(&self) -> Duration {
        let cap = self.interval * 9 / 10;
        self.timeout.min(cap).max(Duration::from_millis(100))
    }

    /// True when a probe result from `other` no longer describes this monitor.
    pub fn probes_differently(&self, other: &MonitorDefinition) -> bool {
        self.kind != other.kind || self.target != other.target
    }

    pub fn subscribes_to(&self, channel: ChannelId) -> bool {
        self.channels.contains(&channel)
    }
}

/// Evaluator state for one monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorState {
    pub monitor_id: MonitorId,
    pub status: MonitorStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Which non-success outcome the failure counter is counting
    pub failing_outcome: Option<ProbeOutcome>,
    pub last_transition_at: Option<DateTime<Utc>>,
    pub last_check_at: Option<DateTime<Utc>>,
}

impl MonitorState {
    pub fn new(monitor_id: MonitorId) -> Self {
        Self {
            monitor_id,
            status: MonitorStatus::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            failing_outcome: None,
            last_transition_at: None,
            last_check_at: None,
        }
    }

    /// Keeps the persisted status but restarts debouncing.
    pub fn warm_start(mut self) -> Self {
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.failing_outcome = None;
        self
    }
}

/// A recorded change of status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub id: Uuid,
    pub monitor_id: MonitorId,
    pub previous: MonitorStatus,
    pub current: MonitorStatus,
    pub timestamp: DateTime<Utc>,
    /// The probe result that caused the change
    pub result_id: Uuid,
    pub detail: String,
}

impl StatusTransition {
    pub fn is_initial(&self) -> bool {
        self.previous == MonitorStatus::Unknown
    }

    pub fn is_recovery(&self) -> bool {
        self.current == MonitorStatus::Up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_patterns() {
        assert_eq!(status_pattern_matches("200", 200), Some(true));
        assert_eq!(status_pattern_matches("200", 201), Some(false));
        assert_eq!(status_pattern_matches("2xx", 204), Some(true));
        assert_eq!(status_pattern_matches("4XX", 404), Some(true));
        assert_eq!(status_pattern_matches("2xx", 301), Some(false));
        assert_eq!(status_pattern_matches("200-299", 250), Some(true));
        assert_eq!(status_pattern_matches("300 - 399", 404), Some(false));
        assert_eq!(status_pattern_matches("9xx", 900), None);
        assert_eq!(status_pattern_matches("299-200", 250), None);
        assert_eq!(status_pattern_matches("abc", 200), None);
    }

    #[test]
    fn default_http_acceptance_is_2xx_and_3xx() {
        let settings = HttpSettings::default();
        assert!(settings.accepts(200));
        assert!(settings.accepts(302));
        assert!(!settings.accepts(404));
        assert!(!settings.accepts(500));

        let settings = HttpSettings { expected_status: Some(401), ..Default::default() };
        assert!(settings.accepts(401));
        assert!(settings.accepts(204));

        let settings =
            HttpSettings { accepted_statuses: vec!["200".into()], ..Default::default() };
        assert!(settings.accepts(200));
        assert!(!settings.accepts(204));
    }

    #[test]
    fn kind_aliases_deserialize() {
        let kind: MonitorKind = serde_json::from_str(r#"{"type":"ssl"}"#).unwrap();
        assert_eq!(kind, MonitorKind::Tls(TlsSettings::default()));

        let kind: MonitorKind =
            serde_json::from_str(r#"{"type":"keyword","keyword":"ok","method":"HEAD"}"#).unwrap();
        let MonitorKind::Http(settings) = kind else { panic!("expected http") };
        assert_eq!(settings.keyword.as_deref(), Some("ok"));
        assert_eq!(settings.method, HttpMethod::Head);
        assert!(settings.follow_redirects);
    }

    #[test]
    fn probe_timeout_stays_below_interval() {
        let definition = MonitorDefinition {
            id: 1,
            name: "api".into(),
            kind: MonitorKind::Tcp(TcpSettings::default()),
            target: "localhost:80".into(),
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            failure_threshold: 3,
            recovery_threshold: 1,
            enabled: true,
            channels: vec![],
        };
        assert_eq!(definition.probe_timeout(), Duration::from_secs(9));

        let definition = MonitorDefinition { timeout: Duration::from_secs(5), ..definition };
        assert_eq!(definition.probe_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn detail_joins_diagnostics() {
        let result = ProbeResult::failure(1, "connection refused").with_latency(12);
        assert_eq!(result.detail(), "12ms, connection refused");
        assert_eq!(ProbeResult::success(1).detail(), "success");
    }
}
