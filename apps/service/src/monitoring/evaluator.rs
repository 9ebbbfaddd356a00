//! Debouncing of raw probe outcomes into monitor status.
//!
//! `evaluate` is pure: it never touches storage or the clock, so the scheduler
//! decides what to persist from its return value alone.

use uuid::Uuid;

use super::types::{
    MonitorDefinition, MonitorState, MonitorStatus, ProbeOutcome, ProbeResult, StatusTransition,
};

/// Fold one probe result into a monitor's state.
///
/// A transition is returned only when the status actually changes. A monitor
/// in `Unknown` takes its status straight from the first result.
pub fn evaluate(
    state: &MonitorState,
    result: &ProbeResult,
    definition: &MonitorDefinition,
) -> (MonitorState, Option<StatusTransition>) {
    let mut next = state.clone();
    next.last_check_at = Some(result.timestamp);

    match result.outcome {
        ProbeOutcome::Success => {
            next.consecutive_successes = next.consecutive_successes.saturating_add(1);
            next.consecutive_failures = 0;
            next.failing_outcome = None;
        }
        outcome => {
            // degraded and failure streams are counted separately
            next.consecutive_failures = if next.failing_outcome == Some(outcome) {
                next.consecutive_failures.saturating_add(1)
            } else {
                1
            };
            next.failing_outcome = Some(outcome);
            next.consecutive_successes = 0;
        }
    }

    let settled = if state.status == MonitorStatus::Unknown {
        Some(result.outcome.status())
    } else {
        match result.outcome {
            ProbeOutcome::Success
                if next.consecutive_successes >= definition.recovery_threshold.max(1) =>
            {
                Some(MonitorStatus::Up)
            }
            ProbeOutcome::Failure | ProbeOutcome::Degraded
                if next.consecutive_failures >= definition.failure_threshold.max(1) =>
            {
                Some(result.outcome.status())
            }
            _ => None,
        }
    };

    match settled {
        Some(status) if status != state.status => {
            next.status = status;
            next.last_transition_at = Some(result.timestamp);
            let transition = StatusTransition {
                id: Uuid::new_v4(),
                monitor_id: definition.id,
                previous: state.status,
                current: status,
                timestamp: result.timestamp,
                result_id: result.id,
                detail: result.detail(),
            };
            (next, Some(transition))
        }
        _ => (next, None),
    }
}
