/// Monitoring engine module - handles execution of monitoring checks
///
/// This module is responsible for:
/// - Executing HTTP, TLS, TCP, MySQL, Redis and push checks
/// - Debouncing raw results into monitor status
/// - Scheduling checks without overlap
/// - Validating monitor definitions
pub mod checker;
pub mod evaluator;
pub mod executor;
pub mod scheduler;
pub mod target;
pub mod types;
pub mod validation;

pub use evaluator::evaluate;
pub use executor::{ProbeExecutor, Prober};
pub use scheduler::{Phase, Scheduler, SchedulerHandle, SchedulerSettings};
pub use types::{MonitorDefinition, MonitorState, MonitorStatus, ProbeOutcome, ProbeResult};
