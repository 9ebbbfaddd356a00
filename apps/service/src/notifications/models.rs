use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::monitoring::types::ChannelId;
use crate::monitoring::validation::{DefinitionError, classify, tagged_from_parts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Webhook,
    Email,
    Wecom,
    Telegram,
    Bark,
    Pushplus,
    Serverchan,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 7] = [
        ChannelKind::Webhook,
        ChannelKind::Email,
        ChannelKind::Wecom,
        ChannelKind::Telegram,
        ChannelKind::Bark,
        ChannelKind::Pushplus,
        ChannelKind::Serverchan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Webhook => "webhook",
            ChannelKind::Email => "email",
            ChannelKind::Wecom => "wecom",
            ChannelKind::Telegram => "telegram",
            ChannelKind::Bark => "bark",
            ChannelKind::Pushplus => "pushplus",
            ChannelKind::Serverchan => "serverchan",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Implicit TLS, usually port 465
    #[default]
    Ssl,
    /// STARTTLS upgrade, usually port 587
    Starttls,
    /// Plaintext, only for local relays
    None,
}

/// Typed per-kind channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    Webhook {
        url: String,
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Tera template for the request body; a JSON payload is sent when absent
        #[serde(default)]
        body_template: Option<String>,
    },
    Email {
        smtp_host: String,
        #[serde(default)]
        smtp_port: Option<u16>,
        #[serde(default)]
        security: SmtpSecurity,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        from: String,
        to: Vec<String>,
    },
    #[serde(alias = "wechat")]
    Wecom { webhook_url: String },
    Telegram {
        bot_token: String,
        chat_id: String,
        #[serde(default)]
        api_base: Option<String>,
    },
    Bark {
        #[serde(default = "default_bark_server")]
        server: String,
        key: String,
    },
    Pushplus {
        token: String,
        #[serde(default)]
        endpoint: Option<String>,
    },
    Serverchan {
        sendkey: String,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

fn default_bark_server() -> String {
    "https://api.day.app".to_string()
}

impl ChannelConfig {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelConfig::Webhook { .. } => ChannelKind::Webhook,
            ChannelConfig::Email { .. } => ChannelKind::Email,
            ChannelConfig::Wecom { .. } => ChannelKind::Wecom,
            ChannelConfig::Telegram { .. } => ChannelKind::Telegram,
            ChannelConfig::Bark { .. } => ChannelKind::Bark,
            ChannelConfig::Pushplus { .. } => ChannelKind::Pushplus,
            ChannelConfig::Serverchan { .. } => ChannelKind::Serverchan,
        }
    }

    /// Parse the stored kind name and its JSON configuration object.
    pub fn parse(kind: &str, config: &str) -> Result<Self, DefinitionError> {
        tagged_from_parts(kind, config).map_err(|source| classify(kind, source, "channel"))
    }
}

/// A configured, validated delivery target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: ChannelId,
    pub name: String,
    pub config: ChannelConfig,
    pub enabled: bool,
}
