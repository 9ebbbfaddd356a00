use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{NotificationSender, SenderError, ensure_success, wrong_config};
use crate::notifications::message::AlertMessage;
use crate::notifications::models::{ChannelConfig, ChannelKind};

const PUSHPLUS_ENDPOINT: &str = "https://www.pushplus.plus/send";

pub struct PushPlusSender {
    client: Client,
}

impl PushPlusSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct PushPlusReply {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[async_trait]
impl NotificationSender for PushPlusSender {
    async fn send(&self, config: &ChannelConfig, message: &AlertMessage) -> Result<(), SenderError> {
        let ChannelConfig::Pushplus { token, endpoint } = config else {
            return Err(wrong_config(ChannelKind::Pushplus, config));
        };

        let payload = json!({
            "token": token,
            "title": message.title,
            "content": message.html(),
            "template": "html",
        });

        let response = self
            .client
            .post(endpoint.as_deref().unwrap_or(PUSHPLUS_ENDPOINT))
            .json(&payload)
            .send()
            .await?;
        let reply: PushPlusReply = ensure_success(response).await?.json().await?;
        if reply.code != 200 {
            return Err(SenderError::SendFailed(format!("code {}: {}", reply.code, reply.msg)));
        }
        Ok(())
    }
}
