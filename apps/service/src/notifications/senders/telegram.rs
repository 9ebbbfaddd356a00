use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{NotificationSender, SenderError, ensure_success, wrong_config};
use crate::notifications::message::AlertMessage;
use crate::notifications::models::{ChannelConfig, ChannelKind};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// A sender for pushing notifications via the Telegram Bot API.
pub struct TelegramSender {
    client: Client,
}

impl TelegramSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Escapes text for Telegram MarkdownV2.
/// Characters to escape: _ * [ ] ( ) ~ ` > # + - = | { } . ! \
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|'
                | '{' | '}' | '.' | '!' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Bold title followed by the escaped plain-text body.
pub fn format_message(message: &AlertMessage) -> String {
    format!("*{}*\n\n{}", escape_markdown_v2(&message.title), escape_markdown_v2(&message.text()))
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, config: &ChannelConfig, message: &AlertMessage) -> Result<(), SenderError> {
        let ChannelConfig::Telegram { bot_token, chat_id, api_base } = config else {
            return Err(wrong_config(ChannelKind::Telegram, config));
        };

        let base = api_base.as_deref().unwrap_or(TELEGRAM_API).trim_end_matches('/');
        let api_url = format!("{base}/bot{bot_token}/sendMessage");

        let text = format_message(message);
        let payload = TelegramMessage {
            chat_id,
            text: &text,
            parse_mode: "MarkdownV2",
            disable_web_page_preview: true,
        };

        let response = self.client.post(&api_url).json(&payload).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::MonitorStatus;
    use crate::notifications::message::tests::sample_message;
    use crate::notifications::senders::testing::serve_once;

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape_markdown_v2("a.b-c!"), "a\\.b\\-c\\!");
        assert_eq!(escape_markdown_v2("[x](y)"), "\\[x\\]\\(y\\)");
        assert_eq!(escape_markdown_v2("plain text"), "plain text");
    }

    #[tokio::test]
    async fn posts_to_bot_api() {
        let (base, captured) = serve_once(200, r#"{"ok":true}"#).await;
        let sender = TelegramSender::new(Client::new());
        let config = ChannelConfig::Telegram {
            bot_token: "123:abc".into(),
            chat_id: "-100".into(),
            api_base: Some(base),
        };

        sender.send(&config, &sample_message(MonitorStatus::Up)).await.unwrap();

        let request = captured.await.unwrap();
        assert_eq!(request.request_line, "POST /bot123:abc/sendMessage HTTP/1.1");
        let payload: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(payload["chat_id"], "-100");
        assert_eq!(payload["parse_mode"], "MarkdownV2");
        assert!(payload["text"].as_str().unwrap().starts_with("*\\[RECOVERED\\] checkout <api\\>*"));
    }
}
