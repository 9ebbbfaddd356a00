use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use super::{Checker, elapsed_ms};
use crate::monitoring::target::tls_endpoint;
use crate::monitoring::types::{MonitorDefinition, MonitorId, MonitorKind, ProbeResult, TlsSettings};

/// TLS certificate checker: handshake, then read the leaf certificate's expiry.
pub struct TlsChecker {
    connector: TlsConnector,
}

impl TlsChecker {
    pub fn new() -> Result<Self> {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            warn!(error = %error, "Failed to load a native root certificate");
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        debug!(added, ignored, "Loaded native root certificates");

        let config =
            ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()?
                .with_root_certificates(roots)
                .with_no_client_auth();

        Ok(Self { connector: TlsConnector::from(Arc::new(config)) })
    }

    async fn peer_expiry(&self, host: &str, port: u16, sni: &str) -> Result<DateTime<Utc>> {
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("TCP connection to {host}:{port} failed"))?;
        let server_name = ServerName::try_from(sni.to_string())
            .map_err(|e| anyhow!("Invalid server name `{sni}`: {e}"))?;
        let tls = self
            .connector
            .connect(server_name, stream)
            .await
            .map_err(|e| anyhow!("TLS handshake failed: {e}"))?;

        let (_, session) = tls.get_ref();
        let leaf = session
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| anyhow!("Server presented no certificate"))?;
        let (_, certificate) = x509_parser::parse_x509_certificate(leaf.as_ref())
            .map_err(|e| anyhow!("Invalid certificate: {e}"))?;

        let not_after = certificate.validity().not_after.timestamp();
        DateTime::from_timestamp(not_after, 0)
            .ok_or_else(|| anyhow!("Certificate expiry {not_after} is out of range"))
    }
}

/// Expired or inside the critical window fails; inside the warning window is degraded.
pub fn classify_expiry(
    monitor_id: MonitorId,
    settings: &TlsSettings,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ProbeResult {
    let days = (expires_at - now).num_days();
    let result = if expires_at <= now {
        ProbeResult::failure(monitor_id, "certificate expired")
    } else if days <= settings.critical_days {
        ProbeResult::failure(monitor_id, format!("certificate expires in {days} days"))
    } else if days <= settings.warning_days {
        ProbeResult::degraded(monitor_id, format!("certificate expires in {days} days"))
    } else {
        ProbeResult::success(monitor_id)
    };
    result.with_expiry(expires_at, days)
}

#[async_trait::async_trait]
impl Checker for TlsChecker {
    async fn check(&self, definition: &MonitorDefinition) -> Result<ProbeResult> {
        let MonitorKind::Tls(settings) = &definition.kind else {
            bail!("TLS checker cannot run a {} monitor", definition.kind.name());
        };
        let (host, port) = tls_endpoint(&definition.target)?;
        let sni = settings.server_name.as_deref().unwrap_or(&host);

        let start = Instant::now();
        let expires_at = self.peer_expiry(&host, port, sni).await?;
        let latency = elapsed_ms(start);

        Ok(classify_expiry(definition.id, settings, expires_at, Utc::now()).with_latency(latency))
    }
}
