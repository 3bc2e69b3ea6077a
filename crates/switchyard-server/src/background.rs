//! Periodic maintenance tasks.

use crate::AppState;
use std::sync::Arc;
use std::time::Duration;

/// Terminal calls older than this are dropped from the in-memory table; the
/// store keeps the durable record.
const TERMINAL_CALL_RETENTION_SECS: i64 = 3_600;

/// Re-runs every registered health check on a fixed interval so readiness
/// reflects current state rather than the last request-triggered probe.
pub fn start_health_task(state: Arc<AppState>, interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            state.health.run_all().await;
        }
    });
}

/// Closes channel sessions that stopped sending frames and prunes finished
/// calls. A session is idle once it misses the configured number of
/// heartbeat intervals.
pub fn start_session_reaper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(state.channel.heartbeat_interval_secs.max(1));
        let max_idle = interval * state.channel.missed_heartbeat_limit.max(1);
        loop {
            tokio::time::sleep(interval).await;

            let reaped = state.sessions.reap_idle(max_idle).await;
            if !reaped.is_empty() {
                tracing::info!(count = reaped.len(), "reaped idle channel sessions");
            }

            let pruned = state.calls.prune_terminal(TERMINAL_CALL_RETENTION_SECS);
            if pruned > 0 {
                tracing::debug!(count = pruned, "pruned finished calls");
            }
        }
    });
}
