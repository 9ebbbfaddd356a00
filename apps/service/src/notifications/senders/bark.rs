use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::{NotificationSender, SenderError, ensure_success, wrong_config};
use crate::notifications::message::AlertMessage;
use crate::notifications::models::{ChannelConfig, ChannelKind};

/// Bark iOS push: `GET {server}/{key}/{title}/{body}`.
pub struct BarkSender {
    client: Client,
}

impl BarkSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

pub fn push_url(server: &str, key: &str, message: &AlertMessage) -> Result<Url, SenderError> {
    let mut url = Url::parse(server)
        .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid Bark server: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| SenderError::InvalidConfiguration(format!("Invalid Bark server: {server}")))?
        .pop_if_empty()
        .push(key)
        .push(&message.title)
        .push(&message.text());
    Ok(url)
}

#[async_trait]
impl NotificationSender for BarkSender {
    async fn send(&self, config: &ChannelConfig, message: &AlertMessage) -> Result<(), SenderError> {
        let ChannelConfig::Bark { server, key } = config else {
            return Err(wrong_config(ChannelKind::Bark, config));
        };

        let url = push_url(server, key, message)?;
        ensure_success(self.client.get(url).send().await?).await?;
        Ok(())
    }
}
