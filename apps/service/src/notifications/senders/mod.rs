use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use thiserror::Error;

use super::message::AlertMessage;
use super::models::{ChannelConfig, ChannelKind};

pub mod bark;
pub mod email;
pub mod pushplus;
pub mod serverchan;
pub mod telegram;
pub mod webhook;
pub mod wecom;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid channel configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(#[from] tera::Error),
    #[error("Email error: {0}")]
    EmailError(String),
}

/// Delivers a formatted alert through one kind of channel
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, config: &ChannelConfig, message: &AlertMessage) -> Result<(), SenderError>;
}

pub(crate) fn wrong_config(expected: ChannelKind, config: &ChannelConfig) -> SenderError {
    SenderError::InvalidConfiguration(format!(
        "Expected {expected} config, but found {}.",
        config.kind()
    ))
}

/// Anything at or above 400 counts as a failed delivery.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, SenderError> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        return Err(SenderError::SendFailed(format!("HTTP {status}: {body}")));
    }
    Ok(response)
}

/// Shared HTTP client for all HTTP-based senders.
pub fn http_client(timeout: Duration) -> Result<Client, SenderError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// One sender per channel kind.
pub fn default_senders(
    client: Client,
    send_timeout: Duration,
) -> HashMap<ChannelKind, Arc<dyn NotificationSender>> {
    let mut senders: HashMap<ChannelKind, Arc<dyn NotificationSender>> = HashMap::new();
    senders.insert(ChannelKind::Webhook, Arc::new(webhook::WebhookSender::new(client.clone())));
    senders.insert(ChannelKind::Email, Arc::new(email::EmailSender::new(send_timeout)));
    senders.insert(ChannelKind::Wecom, Arc::new(wecom::WecomSender::new(client.clone())));
    senders.insert(ChannelKind::Telegram, Arc::new(telegram::TelegramSender::new(client.clone())));
    senders.insert(ChannelKind::Bark, Arc::new(bark::BarkSender::new(client.clone())));
    senders.insert(ChannelKind::Pushplus, Arc::new(pushplus::PushPlusSender::new(client.clone())));
    senders.insert(ChannelKind::Serverchan, Arc::new(serverchan::ServerChanSender::new(client)));
    senders
}
