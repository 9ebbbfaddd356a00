use std::{env, fmt, fs, path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::scheduler::SchedulerSettings;
use crate::notifications::DispatcherSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    ReadFailed { path: path::PathBuf, source: std::io::Error },
    #[error("Failed to write config {}: {source}", path.display())]
    WriteFailed { path: path::PathBuf, source: std::io::Error },
    #[error("Failed to parse config {}: {source}", path.display())]
    ParseFailed { path: path::PathBuf, source: toml::de::Error },
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("Invalid value `{value}` for {name}")]
    InvalidOverride { name: &'static str, value: String },
    #[error("Neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub tick_millis: u64,
    pub refresh_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub send_timeout_seconds: u64,
    pub shutdown_grace_seconds: u64,
    pub notify_initial_status: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub days: u32,
    pub cleanup_interval_seconds: u64,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
}

/// $XDG_DATA_HOME/vigil/vigil.db, falling back to the working directory
fn default_database_path() -> path::PathBuf {
    let data_home = env::var("XDG_DATA_HOME")
        .map(path::PathBuf::from)
        .ok()
        .or_else(|| env::home_dir().map(|home| home.join(".local/share")));
    match data_home {
        Some(dir) => dir.join("vigil/vigil.db"),
        None => path::PathBuf::from("vigil.db"),
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_database_path(), max_connections: 8 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { workers: 8, tick_millis: 1000, refresh_interval_seconds: 60 }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { send_timeout_seconds: 10, shutdown_grace_seconds: 15, notify_initial_status: false }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 90, cleanup_interval_seconds: 3600 }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Max Connections", &self.database.max_connections)?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Workers", &self.scheduler.workers)?;
        write_1(f, "Tick (ms)", &self.scheduler.tick_millis)?;
        write_1(f, "Refresh Interval (s)", &self.scheduler.refresh_interval_seconds)?;
        write_title_1(f, "Notifications")?;
        write_1(f, "Send Timeout (s)", &self.notifications.send_timeout_seconds)?;
        write_1(f, "Shutdown Grace (s)", &self.notifications.shutdown_grace_seconds)?;
        write_1(f, "Notify Initial Status", &self.notifications.notify_initial_status)?;
        write_title_1(f, "Retention")?;
        write_1(f, "Days", &self.retention.days)?;
        write_1(f, "Cleanup Interval (s)", &self.retention.cleanup_interval_seconds)?;

        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidOverride { name, value })
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/vigil/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// use vigil_service::config::Config;
    ///
    /// let cfg = Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), vigil_service::config::ConfigError>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())
                .map_err(|source| ConfigError::ParseFailed { path: config_path, source })
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Load from file, then apply `VIGIL_*` environment overrides.
    pub fn load(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let mut config = Self::from_config(optional_path)?;
        config.apply_overrides(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Override file values from a variable lookup (the environment in production).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup("VIGIL_DATABASE_PATH") {
            self.database.path = path::PathBuf::from(path);
        }
        if let Some(workers) = lookup("VIGIL_WORKERS") {
            self.scheduler.workers = parse_override("VIGIL_WORKERS", workers)?;
        }
        if let Some(seconds) = lookup("VIGIL_REFRESH_INTERVAL_SECONDS") {
            self.scheduler.refresh_interval_seconds =
                parse_override("VIGIL_REFRESH_INTERVAL_SECONDS", seconds)?;
        }
        Ok(())
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            workers: self.scheduler.workers.max(1),
            tick: Duration::from_millis(self.scheduler.tick_millis.max(10)),
            refresh_interval: Duration::from_secs(self.scheduler.refresh_interval_seconds.max(1)),
        }
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            send_timeout: Duration::from_secs(self.notifications.send_timeout_seconds.max(1)),
            notify_initial_status: self.notifications.notify_initial_status,
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.notifications.shutdown_grace_seconds)
    }
}
