//! In-memory call reconciliation table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use switchyard_types::{Call, CallEvent};

/// Tracks live calls keyed by the vendor's call id.
///
/// Webhooks are delivered at-least-once and can arrive out of order;
/// reconciliation dedups on the vendor id and lets status advance only
/// forward. Uses `std::sync::RwLock` intentionally: all lock acquisitions
/// are brief HashMap operations that never span `.await` points.
#[derive(Clone, Default)]
pub struct CallTable {
    calls: Arc<RwLock<HashMap<String, Call>>>,
}

impl CallTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Call>> {
        self.calls.read().unwrap_or_else(|poisoned| {
            tracing::error!("call table lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Call>> {
        self.calls.write().unwrap_or_else(|poisoned| {
            tracing::error!("call table lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Folds one vendor event into the table and returns the current call
    /// state. The first event for a vendor id creates the call; replayed or
    /// out-of-order events fill missing fields without moving status
    /// backward.
    pub fn reconcile(&self, event: &CallEvent) -> Call {
        let mut calls = self.write();
        match calls.get_mut(&event.vendor_call_id) {
            Some(call) => {
                let advanced = call.apply(event);
                if !advanced && call.status != event.status {
                    tracing::debug!(
                        vendor_call_id = %event.vendor_call_id,
                        current = call.status.label(),
                        reported = event.status.label(),
                        "ignoring stale call status"
                    );
                }
                call.clone()
            }
            None => {
                let call = Call::from_event(event);
                tracing::info!(
                    vendor_call_id = %event.vendor_call_id,
                    vendor = %event.vendor,
                    status = call.status.label(),
                    direction = call.direction.label(),
                    "tracking new call"
                );
                calls.insert(event.vendor_call_id.clone(), call.clone());
                call
            }
        }
    }

    /// Registers a call the gateway itself placed.
    pub fn track(&self, call: Call) {
        self.write().insert(call.vendor_call_id.clone(), call);
    }

    pub fn get(&self, vendor_call_id: &str) -> Option<Call> {
        self.read().get(vendor_call_id).cloned()
    }

    /// Number of calls not yet completed or failed.
    pub fn active_count(&self) -> usize {
        self.read()
            .values()
            .filter(|c| !c.status.is_terminal())
            .count()
    }

    /// Drops terminal calls last touched more than `max_age_secs` ago.
    pub fn prune_terminal(&self, max_age_secs: i64) -> usize {
        let cutoff = chrono::Utc::now() - chrono::Duration::seconds(max_age_secs);
        let mut calls = self.write();
        let before = calls.len();
        calls.retain(|_, call| !(call.status.is_terminal() && call.updated_at < cutoff));
        before - calls.len()
    }
}
