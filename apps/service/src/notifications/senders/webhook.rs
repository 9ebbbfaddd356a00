use async_trait::async_trait;
use reqwest::{Client, Method, header};
use serde_json::json;
use tera::{Context, Tera};

use super::{NotificationSender, SenderError, ensure_success, wrong_config};
use crate::notifications::message::AlertMessage;
use crate::notifications::models::{ChannelConfig, ChannelKind};

/// A sender for pushing notifications via a custom webhook.
pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// JSON body sent when the channel has no template of its own.
pub fn default_payload(message: &AlertMessage) -> serde_json::Value {
    json!({
        "title": message.title,
        "content": message.text(),
        "monitor": {
            "id": message.monitor_id,
            "name": message.monitor_name,
            "type": message.monitor_kind,
            "target": message.target,
        },
        "previous_status": message.previous,
        "status": message.current,
        "message": message.detail,
        "timestamp": message.timestamp.to_rfc3339(),
    })
}

pub fn render_body(template: &str, message: &AlertMessage) -> Result<String, SenderError> {
    let context = Context::from_serialize(message.context())?;
    Ok(Tera::one_off(template, &context, false)?)
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(&self, config: &ChannelConfig, message: &AlertMessage) -> Result<(), SenderError> {
        let ChannelConfig::Webhook { url, method, headers, body_template } = config else {
            return Err(wrong_config(ChannelKind::Webhook, config));
        };

        let http_method = match method.as_deref().map(str::trim) {
            None | Some("") => Method::POST,
            Some(raw) => Method::from_bytes(raw.to_ascii_uppercase().as_bytes()).map_err(|_| {
                SenderError::InvalidConfiguration(format!("Unsupported HTTP method: {raw}"))
            })?,
        };

        let mut header_map = header::HeaderMap::new();
        for (key, value) in headers {
            let name = header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                SenderError::InvalidConfiguration(format!("Invalid header name: {e}"))
            })?;
            let value = header::HeaderValue::from_str(value).map_err(|e| {
                SenderError::InvalidConfiguration(format!("Invalid header value: {e}"))
            })?;
            header_map.insert(name, value);
        }
        if !header_map.contains_key(header::CONTENT_TYPE) {
            header_map.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        }

        let mut request = self.client.request(http_method.clone(), url).headers(header_map);
        if http_method != Method::GET {
            let body = match body_template {
                Some(template) => render_body(template, message)?,
                None => default_payload(message).to_string(),
            };
            request = request.body(body);
        }

        ensure_success(request.send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::monitoring::types::MonitorStatus;
    use crate::notifications::message::tests::sample_message;
    use crate::notifications::senders::testing::serve_once;

    #[tokio::test]
    async fn posts_default_json_payload() {
        let (base, captured) = serve_once(200, "{}").await;
        let sender = WebhookSender::new(Client::new());
        let config = ChannelConfig::Webhook {
            url: format!("{base}/hook"),
            method: None,
            headers: BTreeMap::from([("X-Token".to_string(), "secret".to_string())]),
            body_template: None,
        };

        sender.send(&config, &sample_message(MonitorStatus::Down)).await.unwrap();

        let request = captured.await.unwrap();
        assert_eq!(request.request_line, "POST /hook HTTP/1.1");
        assert_eq!(request.header("x-token"), Some("secret"));
        assert_eq!(request.header("content-type"), Some("application/json"));
        let payload: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(payload["status"], "down");
        assert_eq!(payload["previous_status"], "up");
        assert_eq!(payload["monitor"]["id"], 12);
        assert_eq!(payload["title"], "[ALERT] checkout <api>");
    }

    #[tokio::test]
    async fn renders_body_template() {
        let (base, captured) = serve_once(204, "").await;
        let sender = WebhookSender::new(Client::new());
        let config = ChannelConfig::Webhook {
            url: base,
            method: Some("put".into()),
            headers: BTreeMap::new(),
            body_template: Some(r#"{"text":"{{ monitor_name }} is {{ status }}"}"#.into()),
        };

        sender.send(&config, &sample_message(MonitorStatus::Down)).await.unwrap();

        let request = captured.await.unwrap();
        assert!(request.request_line.starts_with("PUT / "));
        assert_eq!(request.body, r#"{"text":"checkout <api> is down"}"#);
    }

    #[tokio::test]
    async fn error_status_is_a_failed_delivery() {
        let (base, _captured) = serve_once(500, "boom").await;
        let sender = WebhookSender::new(Client::new());
        let config = ChannelConfig::Webhook {
            url: base,
            method: None,
            headers: BTreeMap::new(),
            body_template: None,
        };

        let error = sender.send(&config, &sample_message(MonitorStatus::Down)).await.unwrap_err();
        assert!(matches!(error, SenderError::SendFailed(ref reason) if reason.contains("500")));
    }

    #[tokio::test]
    async fn rejects_foreign_config() {
        let sender = WebhookSender::new(Client::new());
        let config = ChannelConfig::Serverchan { sendkey: "k".into(), endpoint: None };
        let error = sender.send(&config, &sample_message(MonitorStatus::Up)).await.unwrap_err();
        assert!(matches!(error, SenderError::InvalidConfiguration(_)));
    }
}
