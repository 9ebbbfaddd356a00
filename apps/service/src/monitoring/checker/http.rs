use std::time::Instant;

use anyhow::{Result, anyhow, bail};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;

use super::{Checker, elapsed_ms};
use crate::monitoring::target::http_url;
use crate::monitoring::types::{HttpSettings, MonitorDefinition, MonitorKind, ProbeResult};

/// HTTP/HTTPS checker
pub struct HttpChecker {
    following: reqwest::Client,
    direct: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self> {
        let user_agent = concat!("Vigil/", env!("CARGO_PKG_VERSION"));
        let following = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::limited(10))
            .build()?;
        let direct =
            reqwest::Client::builder().user_agent(user_agent).redirect(Policy::none()).build()?;

        Ok(Self { following, direct })
    }

    fn client(&self, settings: &HttpSettings) -> &reqwest::Client {
        if settings.follow_redirects { &self.following } else { &self.direct }
    }
}

fn header_map(settings: &HttpSettings) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &settings.headers {
        headers.insert(HeaderName::from_bytes(name.as_bytes())?, HeaderValue::from_str(value)?);
    }
    Ok(headers)
}

/// Judge a completed response: status first, then the optional keyword.
pub fn judge_response(
    definition: &MonitorDefinition,
    settings: &HttpSettings,
    status_code: u16,
    body: Option<&str>,
) -> ProbeResult {
    if !settings.accepts(status_code) {
        return ProbeResult::failure(definition.id, format!("unexpected status code {status_code}"))
            .with_status_code(status_code);
    }

    if let Some(keyword) = settings.keyword.as_deref() {
        if !body.is_some_and(|body| body.contains(keyword)) {
            return ProbeResult::failure(definition.id, format!("keyword `{keyword}` not found"))
                .with_status_code(status_code);
        }
    }

    ProbeResult::success(definition.id).with_status_code(status_code)
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, definition: &MonitorDefinition) -> Result<ProbeResult> {
        let MonitorKind::Http(settings) = &definition.kind else {
            bail!("HTTP checker cannot run a {} monitor", definition.kind.name());
        };
        let url = http_url(&definition.target)?;

        let mut request = self
            .client(settings)
            .request(settings.method.as_reqwest(), url)
            .timeout(definition.probe_timeout())
            .headers(header_map(settings)?);
        if let Some(body) = &settings.body {
            request = request.body(body.clone());
        }

        let start = Instant::now();
        let response = request.send().await.map_err(|e| anyhow!("HTTP request failed: {e}"))?;
        let status_code = response.status().as_u16();

        let body = match settings.keyword {
            Some(_) => Some(response.text().await.map_err(|e| anyhow!("Failed to read body: {e}"))?),
            None => None,
        };
        let latency = elapsed_ms(start);

        Ok(judge_response(definition, settings, status_code, body.as_deref()).with_latency(latency))
    }
}
