use std::time::Instant;

use anyhow::{Result, anyhow, bail};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder};

use super::{Checker, elapsed_ms};
use crate::monitoring::target::{MysqlTarget, mysql_target};
use crate::monitoring::types::{MonitorDefinition, MonitorKind, MysqlSettings, ProbeResult};

const DEFAULT_USER: &str = "root";

/// MySQL checker: connect, authenticate and `COM_PING`.
pub struct MysqlChecker;

/// Settings win over credentials embedded in the target.
pub fn connection_options(target: &MysqlTarget, settings: &MysqlSettings) -> OptsBuilder {
    let user = settings.user.clone().or_else(|| target.user.clone()).unwrap_or_else(|| DEFAULT_USER.into());
    let password = settings.password.clone().or_else(|| target.password.clone());
    let database = settings.database.clone().or_else(|| target.database.clone());

    OptsBuilder::default()
        .ip_or_hostname(target.host.clone())
        .tcp_port(target.port)
        .user(Some(user))
        .pass(password)
        .db_name(database)
}

#[async_trait::async_trait]
impl Checker for MysqlChecker {
    async fn check(&self, definition: &MonitorDefinition) -> Result<ProbeResult> {
        let MonitorKind::Mysql(settings) = &definition.kind else {
            bail!("MySQL checker cannot run a {} monitor", definition.kind.name());
        };
        let target = mysql_target(&definition.target)?;

        let start = Instant::now();
        let mut conn = Conn::new(connection_options(&target, settings))
            .await
            .map_err(|e| anyhow!("MySQL connection failed: {e}"))?;
        conn.ping().await.map_err(|e| anyhow!("MySQL ping failed: {e}"))?;
        let latency = elapsed_ms(start);

        if let Err(e) = conn.disconnect().await {
            tracing::debug!(monitor_id = definition.id, error = %e, "MySQL disconnect failed");
        }
        Ok(ProbeResult::success(definition.id).with_latency(latency))
    }
}

#[cfg(test)]
mod tests {
    use mysql_async::Opts;

    use super::*;

    #[test]
    fn settings_override_target_credentials() {
        let target = mysql_target("app:secret@db.internal:3307/orders").unwrap();
        let settings = MysqlSettings { user: Some("monitor".into()), ..Default::default() };

        let opts = Opts::from(connection_options(&target, &settings));
        assert_eq!(opts.ip_or_hostname(), "db.internal");
        assert_eq!(opts.tcp_port(), 3307);
        assert_eq!(opts.user(), Some("monitor"));
        assert_eq!(opts.pass(), Some("secret"));
        assert_eq!(opts.db_name(), Some("orders"));
    }

    #[test]
    fn defaults_to_root_user() {
        let target = mysql_target("db.internal").unwrap();
        let opts = Opts::from(connection_options(&target, &MysqlSettings::default()));
        assert_eq!(opts.user(), Some("root"));
        assert_eq!(opts.tcp_port(), 3306);
        assert_eq!(opts.pass(), None);
    }
}
