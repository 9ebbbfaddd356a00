use std::env::var;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError,
};

/// Output format selected through `RUST_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    /// Anything unrecognised falls back to the compact human format.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            Some("json") => Self::Json,
            Some("pretty") => Self::Pretty,
            _ => Self::Compact,
        }
    }

    fn from_env() -> Self {
        Self::from_env_value(var("RUST_LOG_FORMAT").ok().as_deref())
    }
}

pub fn init() {
    init_with_level(LevelFilter::INFO);
}

/// Like [`try_init`] but reports a second initialisation on stderr instead of failing.
pub fn init_with_level(level: LevelFilter) {
    if let Err(error) = try_init(level) {
        eprintln!("tracing subscriber already initialised: {error}");
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
pub fn try_init(level: LevelFilter) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_layer = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => {
            tracing_subscriber::fmt::layer().pretty().with_filter(env_filter).boxed()
        }
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(log_layer).try_init()
}
