//! Best-effort recording facade over an [`InteractionStore`].

use crate::{FailureWindow, InteractionStore};
use std::sync::Arc;
use switchyard_types::{Call, InteractionRecord, Turn};

/// Records turns and call state without ever failing the caller.
///
/// Storage errors are logged and counted in the shared [`FailureWindow`];
/// the conversation path proceeds regardless. Reads still surface errors,
/// since a caller asking for history can meaningfully handle one.
#[derive(Clone)]
pub struct Recorder {
    store: Arc<dyn InteractionStore>,
    failures: Arc<FailureWindow>,
}

impl Recorder {
    pub fn new(store: Arc<dyn InteractionStore>, failures: Arc<FailureWindow>) -> Self {
        Self { store, failures }
    }

    /// Persists a terminal turn; never fails.
    pub async fn record_turn(&self, turn: &Turn) {
        if let Err(e) = self.store.record_turn(turn).await {
            self.failures.record_failure();
            tracing::warn!(
                correlation_id = %turn.correlation_id,
                error = %e,
                "failed to record turn"
            );
        }
    }

    /// Persists call state; never fails.
    pub async fn record_call(&self, call: &Call) {
        if let Err(e) = self.store.record_call(call).await {
            self.failures.record_failure();
            tracing::warn!(
                vendor_call_id = %call.vendor_call_id,
                error = %e,
                "failed to record call state"
            );
        }
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<InteractionRecord>, crate::StoreError> {
        self.store.recent(limit).await
    }

    pub async fn for_owner(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<InteractionRecord>, crate::StoreError> {
        self.store.for_owner(owner_id, limit).await
    }

    /// True when recent write failures exceed the window threshold.
    pub fn degraded(&self) -> bool {
        self.failures.degraded()
    }
}
