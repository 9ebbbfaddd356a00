//! Parsing of monitor targets into connectable endpoints.

use thiserror::Error;
use url::Url;

use super::types::RedisSettings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid target `{target}`: {reason}")]
pub struct TargetError {
    pub target: String,
    pub reason: String,
}

impl TargetError {
    fn new(target: &str, reason: impl Into<String>) -> Self {
        Self { target: target.to_string(), reason: reason.into() }
    }
}

pub const DEFAULT_TCP_PORT: u16 = 80;
pub const DEFAULT_TLS_PORT: u16 = 443;
pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Split `host:port`, `[v6]:port`, or a bare host (which gets `default_port`).
pub fn host_port(target: &str, default_port: u16) -> Result<(String, u16), TargetError> {
    let trimmed = target.trim();

    let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| TargetError::new(target, "unterminated IPv6 literal"))?;
        let port = match tail {
            "" => default_port,
            _ => {
                let port = tail
                    .strip_prefix(':')
                    .ok_or_else(|| TargetError::new(target, "unexpected text after address"))?;
                parse_port(target, port)?
            }
        };
        (host, port)
    } else {
        match trimmed.rsplit_once(':') {
            // more than one colon: a bare IPv6 address
            Some((host, _)) if host.contains(':') => (trimmed, default_port),
            Some((host, port)) => (host, parse_port(target, port)?),
            None => (trimmed, default_port),
        }
    };

    if host.is_empty() {
        return Err(TargetError::new(target, "missing host"));
    }
    Ok((host.to_string(), port))
}

fn parse_port(target: &str, port: &str) -> Result<u16, TargetError> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(TargetError::new(target, format!("invalid port `{port}`"))),
        Ok(port) => Ok(port),
    }
}

/// Absolute http(s) URL for HTTP probes.
pub fn http_url(target: &str) -> Result<Url, TargetError> {
    let url = Url::parse(target.trim()).map_err(|e| TargetError::new(target, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(TargetError::new(target, format!("unsupported scheme `{other}`"))),
    }
    if url.host_str().is_none() {
        return Err(TargetError::new(target, "missing host"));
    }
    Ok(url)
}

/// Host and port for a TLS handshake. Accepts URLs as well as `host[:port]`.
pub fn tls_endpoint(target: &str) -> Result<(String, u16), TargetError> {
    let trimmed = target.trim();
    if trimmed.contains("://") {
        let url = Url::parse(trimmed).map_err(|e| TargetError::new(target, e.to_string()))?;
        let host = url
            .host_str()
            .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
            .filter(|host| !host.is_empty())
            .ok_or_else(|| TargetError::new(target, "missing host"))?;
        let port = url.port_or_known_default().unwrap_or(DEFAULT_TLS_PORT);
        return Ok((host, port));
    }
    host_port(trimmed, DEFAULT_TLS_PORT)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlTarget {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

/// `[mysql://][user[:pass]@]host[:port][/db]`
pub fn mysql_target(target: &str) -> Result<MysqlTarget, TargetError> {
    let trimmed = target.trim();
    let raw = if trimmed.contains("://") { trimmed.to_string() } else { format!("mysql://{trimmed}") };
    let url = Url::parse(&raw).map_err(|e| TargetError::new(target, e.to_string()))?;
    if url.scheme() != "mysql" {
        return Err(TargetError::new(target, format!("unsupported scheme `{}`", url.scheme())));
    }

    let host = url
        .host_str()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
        .filter(|host| !host.is_empty())
        .ok_or_else(|| TargetError::new(target, "missing host"))?;
    let user = Some(url.username()).filter(|user| !user.is_empty()).map(str::to_string);
    let database =
        Some(url.path().trim_matches('/')).filter(|db| !db.is_empty()).map(str::to_string);

    Ok(MysqlTarget {
        host,
        port: url.port().unwrap_or(DEFAULT_MYSQL_PORT),
        user,
        password: url.password().map(str::to_string),
        database,
    })
}

/// Connection URL for a Redis probe with settings applied on top of the target.
pub fn redis_url(target: &str, settings: &RedisSettings) -> Result<Url, TargetError> {
    let trimmed = target.trim();
    let mut url = if trimmed.starts_with("redis://") || trimmed.starts_with("rediss://") {
        Url::parse(trimmed).map_err(|e| TargetError::new(target, e.to_string()))?
    } else {
        let (host, port) = host_port(trimmed, DEFAULT_REDIS_PORT)?;
        let host = if host.contains(':') { format!("[{host}]") } else { host };
        Url::parse(&format!("redis://{host}:{port}"))
            .map_err(|e| TargetError::new(target, e.to_string()))?
    };

    if url.host_str().is_none() {
        return Err(TargetError::new(target, "missing host"));
    }
    if let Some(password) = &settings.password {
        url.set_password(Some(password))
            .map_err(|_| TargetError::new(target, "cannot attach password"))?;
    }
    if let Some(database) = settings.database {
        url.set_path(&format!("/{database}"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_port_forms() {
        assert_eq!(host_port("example.com:8080", 80).unwrap(), ("example.com".into(), 8080));
        assert_eq!(host_port("example.com", 80).unwrap(), ("example.com".into(), 80));
        assert_eq!(host_port("[::1]:5432", 80).unwrap(), ("::1".into(), 5432));
        assert_eq!(host_port("[::1]", 80).unwrap(), ("::1".into(), 80));
        assert_eq!(host_port("fe80::1", 22).unwrap(), ("fe80::1".into(), 22));
        assert!(host_port(":80", 80).is_err());
        assert!(host_port("host:0", 80).is_err());
        assert!(host_port("host:http", 80).is_err());
        assert!(host_port("[::1", 80).is_err());
    }

    #[test]
    fn tls_endpoint_accepts_urls_and_hosts() {
        assert_eq!(tls_endpoint("https://example.com/path").unwrap(), ("example.com".into(), 443));
        assert_eq!(tls_endpoint("https://example.com:8443").unwrap(), ("example.com".into(), 8443));
        assert_eq!(tls_endpoint("example.com").unwrap(), ("example.com".into(), 443));
        assert_eq!(tls_endpoint("mail.example.com:993").unwrap(), ("mail.example.com".into(), 993));
    }

    #[test]
    fn http_url_requires_http_scheme() {
        assert!(http_url("https://example.com/health").is_ok());
        assert!(http_url("ftp://example.com").is_err());
        assert!(http_url("example.com").is_err());
    }

    #[test]
    fn mysql_targets() {
        let parsed = mysql_target("monitor:secret@db.local:3307/app").unwrap();
        assert_eq!(parsed.host, "db.local");
        assert_eq!(parsed.port, 3307);
        assert_eq!(parsed.user.as_deref(), Some("monitor"));
        assert_eq!(parsed.password.as_deref(), Some("secret"));
        assert_eq!(parsed.database.as_deref(), Some("app"));

        let parsed = mysql_target("db.local").unwrap();
        assert_eq!(parsed.port, DEFAULT_MYSQL_PORT);
        assert_eq!(parsed.user, None);
        assert_eq!(parsed.database, None);

        assert!(mysql_target("postgres://db.local").is_err());
    }

    #[test]
    fn redis_urls() {
        let url = redis_url("cache.local", &RedisSettings::default()).unwrap();
        assert_eq!(url.as_str(), "redis://cache.local:6379");

        let settings = RedisSettings { password: Some("pw".into()), database: Some(2) };
        let url = redis_url("cache.local:6380", &settings).unwrap();
        assert_eq!(url.password(), Some("pw"));
        assert_eq!(url.port(), Some(6380));
        assert_eq!(url.path(), "/2");

        let url = redis_url("redis://cache.local:7000/1", &RedisSettings::default()).unwrap();
        assert_eq!(url.port(), Some(7000));
    }
}
