//! Health aggregation: named, timeout-bounded checks with cached results.
//!
//! Components register a probe once at startup; a background cycle runs all
//! probes concurrently, bounds each with its own timeout, and caches the
//! outcomes. Endpoint handlers read the cache, so a wedged dependency can
//! never wedge the health endpoint itself.
//!
//! Liveness asks only "is the process running", and therefore always
//! succeeds. Readiness requires every critical check to be healthy.

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Default per-probe deadline when the registrant does not pick one.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

type ProbeFuture = Pin<Box<dyn Future<Output = Result<Option<String>, String>> + Send>>;
type Probe = Arc<dyn Fn() -> ProbeFuture + Send + Sync>;

struct Check {
    name: String,
    timeout: Duration,
    /// Critical checks gate readiness; informational ones only show up in
    /// the detailed report.
    critical: bool,
    probe: Probe,
}

/// Outcome of one probe run.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub healthy: bool,
    /// Probe-supplied detail on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Failure or timeout description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub checked_at: String,
}

/// The aggregated report served to callers.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `ok` or `degraded`.
    pub status: &'static str,
    pub uptime_secs: u64,
    pub checks: HashMap<String, CheckResult>,
}

/// Holds registered checks and the cache of their latest results.
pub struct HealthRegistry {
    checks: Vec<Check>,
    results: Arc<RwLock<HashMap<String, CheckResult>>>,
    started: Instant,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            results: Arc::new(RwLock::new(HashMap::new())),
            started: Instant::now(),
        }
    }

    /// Registers a named probe. The closure is invoked once per cycle and
    /// must resolve within `timeout`; `Ok(detail)` marks the check healthy.
    pub fn register<F, Fut>(&mut self, name: &str, timeout: Duration, critical: bool, probe: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<String>, String>> + Send + 'static,
    {
        self.checks.push(Check {
            name: name.to_string(),
            timeout,
            critical,
            probe: Arc::new(move || Box::pin(probe()) as ProbeFuture),
        });
    }

    /// Runs every registered probe concurrently and refreshes the cache.
    pub async fn run_all(&self) {
        let mut handles = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let name = check.name.clone();
            let timeout = check.timeout;
            let probe = Arc::clone(&check.probe);
            handles.push(tokio::spawn(async move {
                let started = Instant::now();
                let outcome = tokio::time::timeout(timeout, probe()).await;
                let duration_ms = started.elapsed().as_millis() as u64;
                let result = match outcome {
                    Ok(Ok(detail)) => CheckResult {
                        healthy: true,
                        detail,
                        error: None,
                        duration_ms,
                        checked_at: chrono::Utc::now().to_rfc3339(),
                    },
                    Ok(Err(error)) => CheckResult {
                        healthy: false,
                        detail: None,
                        error: Some(error),
                        duration_ms,
                        checked_at: chrono::Utc::now().to_rfc3339(),
                    },
                    Err(_) => CheckResult {
                        healthy: false,
                        detail: None,
                        error: Some(format!("timed out after {}ms", timeout.as_millis())),
                        duration_ms,
                        checked_at: chrono::Utc::now().to_rfc3339(),
                    },
                };
                (name, result)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((name, result)) => {
                    if !result.healthy {
                        tracing::warn!(
                            check = %name,
                            error = result.error.as_deref().unwrap_or("unknown"),
                            "health check failed"
                        );
                    }
                    let mut results = self.lock_results_mut();
                    results.insert(name, result);
                }
                Err(e) => tracing::error!(error = %e, "health check task panicked"),
            }
        }
    }

    fn lock_results_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CheckResult>> {
        self.results.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_results(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, CheckResult>> {
        self.results.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Seconds since the registry was created at process startup.
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// True until a critical check has a cached failure. Checks that have
    /// never run yet do not count against readiness, so startup ordering
    /// cannot wedge the gate.
    pub fn ready(&self) -> bool {
        let results = self.lock_results();
        self.checks
            .iter()
            .filter(|c| c.critical)
            .all(|c| results.get(&c.name).map(|r| r.healthy).unwrap_or(true))
    }

    /// Full report from the cached results.
    pub fn report(&self) -> HealthReport {
        let checks = self.lock_results().clone();
        let status = if checks.values().all(|r| r.healthy) {
            "ok"
        } else {
            "degraded"
        };
        HealthReport {
            status,
            uptime_secs: self.uptime_secs(),
            checks,
        }
    }
}
