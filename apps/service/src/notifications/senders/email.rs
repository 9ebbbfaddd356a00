use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{NotificationSender, SenderError, wrong_config};
use crate::notifications::message::AlertMessage;
use crate::notifications::models::{ChannelConfig, ChannelKind, SmtpSecurity};

/// SMTP delivery with an HTML body.
pub struct EmailSender {
    timeout: Duration,
}

impl EmailSender {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

pub fn default_port(security: SmtpSecurity) -> u16 {
    match security {
        SmtpSecurity::Ssl => 465,
        SmtpSecurity::Starttls => 587,
        SmtpSecurity::None => 25,
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, SenderError> {
    raw.trim()
        .parse()
        .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid address `{raw}`: {e}")))
}

/// Build the message without touching the network.
pub fn build_email(from: &str, to: &[String], message: &AlertMessage) -> Result<Message, SenderError> {
    if to.is_empty() {
        return Err(SenderError::InvalidConfiguration("No recipients configured".into()));
    }

    let mut builder = Message::builder().from(parse_mailbox(from)?).subject(message.title.clone());
    for recipient in to {
        builder = builder.to(parse_mailbox(recipient)?);
    }
    builder
        .header(ContentType::TEXT_HTML)
        .body(message.html())
        .map_err(|e| SenderError::EmailError(e.to_string()))
}

#[async_trait]
impl NotificationSender for EmailSender {
    async fn send(&self, config: &ChannelConfig, message: &AlertMessage) -> Result<(), SenderError> {
        let ChannelConfig::Email { smtp_host, smtp_port, security, username, password, from, to } =
            config
        else {
            return Err(wrong_config(ChannelKind::Email, config));
        };

        let email = build_email(from, to, message)?;

        let builder = match security {
            SmtpSecurity::Ssl => AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host),
            SmtpSecurity::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host),
            SmtpSecurity::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)),
        }
        .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid SMTP host: {e}")))?;

        let mut builder = builder
            .port(smtp_port.unwrap_or_else(|| default_port(*security)))
            .timeout(Some(self.timeout));
        if let (Some(username), Some(password)) = (username, password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        builder.build().send(email).await.map_err(|e| SenderError::EmailError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::MonitorStatus;
    use crate::notifications::message::tests::sample_message;

    #[test]
    fn builds_html_message() {
        let email = build_email(
            "Vigil <alerts@example.com>",
            &["ops@example.com".to_string(), "oncall@example.com".to_string()],
            &sample_message(MonitorStatus::Down),
        )
        .unwrap();

        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("Subject: [ALERT] checkout <api>"));
        assert!(raw.contains("To: ops@example.com, oncall@example.com"));
        assert!(raw.contains("Content-Type: text/html"));
    }

    #[test]
    fn rejects_bad_addresses_and_empty_recipients() {
        let message = sample_message(MonitorStatus::Down);
        assert!(matches!(
            build_email("not an address", &["ops@example.com".into()], &message),
            Err(SenderError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            build_email("alerts@example.com", &[], &message),
            Err(SenderError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn ports_follow_security_mode() {
        assert_eq!(default_port(SmtpSecurity::Ssl), 465);
        assert_eq!(default_port(SmtpSecurity::Starttls), 587);
    }
}
