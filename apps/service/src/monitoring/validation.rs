//! Monitor definition validation.
//!
//! Rows coming out of storage are checked here before the scheduler sees them;
//! a row that fails is skipped on its own and never blocks the rest.

use reqwest::header::{HeaderName, HeaderValue};
use thiserror::Error;

use super::target::{self, TargetError};
use super::types::{MonitorDefinition, MonitorKind, status_pattern_matches};

pub const MIN_INTERVAL: u64 = 1;
pub const MAX_INTERVAL: u64 = 86_400;
pub const MIN_TIMEOUT: u64 = 1;
pub const MAX_TIMEOUT: u64 = 300;
pub const MAX_THRESHOLD: u32 = 1_000;

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("unknown {what} kind `{kind}`")]
    UnknownKind { what: &'static str, kind: String },

    #[error("invalid {kind} settings: {source}")]
    Settings {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("check interval {0}s is out of range ({MIN_INTERVAL}..={MAX_INTERVAL})")]
    Interval(i64),

    #[error("timeout {0}s is out of range ({MIN_TIMEOUT}..={MAX_TIMEOUT})")]
    Timeout(i64),

    #[error("{name} {value} is out of range (1..={MAX_THRESHOLD})")]
    Threshold { name: &'static str, value: i64 },

    #[error("invalid accepted status pattern `{0}`")]
    StatusPattern(String),

    #[error("invalid header `{0}`")]
    Header(String),

    #[error("TLS critical window ({critical}d) is wider than the warning window ({warning}d)")]
    ExpiryWindows { warning: i64, critical: i64 },

    #[error("invalid channel list: {0}")]
    Channels(#[source] serde_json::Error),
}

/// Build a typed kind from the stored kind name and its JSON settings object.
pub fn parse_kind(kind: &str, settings: &str) -> Result<MonitorKind, DefinitionError> {
    tagged_from_parts(kind, settings)
        .map_err(|source| classify(kind, source, "monitor"))
}

/// Merges `{"type": kind}` into the settings object so serde can pick the variant.
pub(crate) fn tagged_from_parts<T: serde::de::DeserializeOwned>(
    kind: &str,
    settings: &str,
) -> Result<T, serde_json::Error> {
    let mut value: serde_json::Value = if settings.trim().is_empty() {
        serde_json::Value::Object(Default::default())
    } else {
        serde_json::from_str(settings)?
    };
    if let serde_json::Value::Object(map) = &mut value {
        map.insert("type".into(), serde_json::Value::String(kind.to_ascii_lowercase()));
    }
    serde_json::from_value(value)
}

pub(crate) fn classify(kind: &str, source: serde_json::Error, what: &'static str) -> DefinitionError {
    if source.to_string().starts_with("unknown variant") {
        DefinitionError::UnknownKind { what, kind: kind.to_string() }
    } else {
        DefinitionError::Settings { kind: kind.to_string(), source }
    }
}

pub fn validate_check_interval(interval_seconds: i64) -> Result<u64, DefinitionError> {
    u64::try_from(interval_seconds)
        .ok()
        .filter(|secs| (MIN_INTERVAL..=MAX_INTERVAL).contains(secs))
        .ok_or(DefinitionError::Interval(interval_seconds))
}

pub fn validate_timeout(timeout_seconds: i64) -> Result<u64, DefinitionError> {
    u64::try_from(timeout_seconds)
        .ok()
        .filter(|secs| (MIN_TIMEOUT..=MAX_TIMEOUT).contains(secs))
        .ok_or(DefinitionError::Timeout(timeout_seconds))
}

pub fn validate_threshold(name: &'static str, value: i64) -> Result<u32, DefinitionError> {
    u32::try_from(value)
        .ok()
        .filter(|value| (1..=MAX_THRESHOLD).contains(value))
        .ok_or(DefinitionError::Threshold { name, value })
}

/// Validates a monitor target based on its kind
pub fn validate_target(kind: &MonitorKind, target: &str) -> Result<(), DefinitionError> {
    match kind {
        MonitorKind::Http(_) => target::http_url(target).map(drop)?,
        MonitorKind::Tls(_) => target::tls_endpoint(target).map(drop)?,
        MonitorKind::Tcp(settings) => {
            target::host_port(target, settings.port.unwrap_or(target::DEFAULT_TCP_PORT))
                .map(drop)?
        }
        MonitorKind::Mysql(_) => target::mysql_target(target).map(drop)?,
        MonitorKind::Redis(settings) => target::redis_url(target, settings).map(drop)?,
        // push monitors are passive, the target is informational
        MonitorKind::Push(_) => {}
    }
    Ok(())
}

fn validate_settings(kind: &MonitorKind) -> Result<(), DefinitionError> {
    match kind {
        MonitorKind::Http(settings) => {
            if let Some(pattern) = settings
                .accepted_statuses
                .iter()
                .find(|pattern| status_pattern_matches(pattern, 200).is_none())
            {
                return Err(DefinitionError::StatusPattern(pattern.clone()));
            }
            for (name, value) in &settings.headers {
                if HeaderName::from_bytes(name.as_bytes()).is_err()
                    || HeaderValue::from_str(value).is_err()
                {
                    return Err(DefinitionError::Header(name.clone()));
                }
            }
        }
        MonitorKind::Tls(settings) => {
            if settings.critical_days > settings.warning_days {
                return Err(DefinitionError::ExpiryWindows {
                    warning: settings.warning_days,
                    critical: settings.critical_days,
                });
            }
        }
        _ => {}
    }
    Ok(())
}

/// Full check of an assembled definition.
pub fn validate_definition(definition: &MonitorDefinition) -> Result<(), DefinitionError> {
    validate_target(&definition.kind, &definition.target)?;
    validate_settings(&definition.kind)
}
