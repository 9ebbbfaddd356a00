//! Shared tracing setup for the workspace binaries.

mod subscriber;

pub use subscriber::{LogFormat, init, init_with_level, try_init};
pub use tracing::level_filters::LevelFilter;
