use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{NotificationSender, SenderError, ensure_success, wrong_config};
use crate::notifications::message::AlertMessage;
use crate::notifications::models::{ChannelConfig, ChannelKind};

/// Enterprise WeChat group robot webhook.
pub struct WecomSender {
    client: Client,
}

impl WecomSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct WecomReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[async_trait]
impl NotificationSender for WecomSender {
    async fn send(&self, config: &ChannelConfig, message: &AlertMessage) -> Result<(), SenderError> {
        let ChannelConfig::Wecom { webhook_url } = config else {
            return Err(wrong_config(ChannelKind::Wecom, config));
        };

        let payload = json!({
            "msgtype": "markdown",
            "markdown": { "content": message.markdown() },
        });

        let response = self.client.post(webhook_url).json(&payload).send().await?;
        let reply: WecomReply = ensure_success(response).await?.json().await?;
        // the robot answers 200 with an error code in the body
        if reply.errcode != 0 {
            return Err(SenderError::SendFailed(format!("errcode {}: {}", reply.errcode, reply.errmsg)));
        }
        Ok(())
    }
}
