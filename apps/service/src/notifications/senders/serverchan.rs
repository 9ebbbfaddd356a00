use async_trait::async_trait;
use reqwest::Client;

use super::{NotificationSender, SenderError, ensure_success, wrong_config};
use crate::notifications::message::AlertMessage;
use crate::notifications::models::{ChannelConfig, ChannelKind};

/// ServerChan (Turbo) push: form post of `title` and markdown `desp`.
pub struct ServerChanSender {
    client: Client,
}

impl ServerChanSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

pub fn send_url(sendkey: &str, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{sendkey}.send", endpoint.trim_end_matches('/')),
        None => format!("https://sctapi.ftqq.com/{sendkey}.send"),
    }
}

#[async_trait]
impl NotificationSender for ServerChanSender {
    async fn send(&self, config: &ChannelConfig, message: &AlertMessage) -> Result<(), SenderError> {
        let ChannelConfig::Serverchan { sendkey, endpoint } = config else {
            return Err(wrong_config(ChannelKind::Serverchan, config));
        };

        let markdown = message.markdown();
        let form = [("title", message.title.as_str()), ("desp", markdown.as_str())];
        let response =
            self.client.post(send_url(sendkey, endpoint.as_deref())).form(&form).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}
