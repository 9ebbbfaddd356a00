use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::monitoring::types::{MonitorDefinition, MonitorId, MonitorStatus, StatusTransition};

/// Channel-independent alert content built from one transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMessage {
    pub title: String,
    pub monitor_id: MonitorId,
    pub monitor_name: String,
    pub monitor_kind: String,
    pub target: String,
    pub previous: MonitorStatus,
    pub current: MonitorStatus,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertMessage {
    pub fn new(transition: &StatusTransition, monitor: &MonitorDefinition) -> Self {
        let label = match transition.current {
            MonitorStatus::Up => "RECOVERED",
            MonitorStatus::Down => "ALERT",
            MonitorStatus::Degraded => "DEGRADED",
            MonitorStatus::Unknown => "UNKNOWN",
        };
        Self {
            title: format!("[{label}] {}", monitor.name),
            monitor_id: monitor.id,
            monitor_name: monitor.name.clone(),
            monitor_kind: monitor.kind.name().to_string(),
            target: monitor.target.clone(),
            previous: transition.previous,
            current: transition.current,
            detail: transition.detail.clone(),
            timestamp: transition.timestamp,
        }
    }

    fn fields(&self) -> [(&'static str, String); 6] {
        [
            ("Monitor", self.monitor_name.clone()),
            ("Type", self.monitor_kind.clone()),
            ("Target", self.target.clone()),
            ("Status", format!("{} -> {}", self.previous, self.current)),
            ("Detail", self.detail.clone()),
            ("Time", self.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ]
    }

    /// Plain text body, one `Label: value` line per field
    pub fn text(&self) -> String {
        self.fields()
            .iter()
            .map(|(label, value)| format!("{label}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn markdown(&self) -> String {
        let mut out = format!("## {}\n", self.title);
        for (label, value) in self.fields() {
            out.push_str(&format!("\n**{label}**: {value}"));
        }
        out
    }

    pub fn html(&self) -> String {
        let mut out = format!("<h3>{}</h3>\n<table>", escape_html(&self.title));
        for (label, value) in self.fields() {
            out.push_str(&format!("\n<tr><td><b>{label}</b></td><td>{}</td></tr>", escape_html(&value)));
        }
        out.push_str("\n</table>");
        out
    }

    /// Flat variables exposed to user templates
    pub fn context(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("title", self.title.clone()),
            ("content", self.text()),
            ("monitor_id", self.monitor_id.to_string()),
            ("monitor_name", self.monitor_name.clone()),
            ("monitor_type", self.monitor_kind.clone()),
            ("target", self.target.clone()),
            ("previous_status", self.previous.to_string()),
            ("status", self.current.to_string()),
            ("detail", self.detail.clone()),
            ("timestamp", self.timestamp.to_rfc3339()),
        ])
    }
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
