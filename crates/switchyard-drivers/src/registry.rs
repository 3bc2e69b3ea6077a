//! The driver registry: one active driver, validated switches.

use crate::{
    Driver, DriverError, DriverStatus, DriversConfig, SarvamDriver, TelnyxDriver, TwilioDriver,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

type DriverFactory = Box<dyn Fn() -> Result<Arc<dyn Driver>, DriverError> + Send + Sync>;

/// Errors surfaced by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown driver '{0}'")]
    UnknownDriver(String),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("no driver configured for startup")]
    NoStartupDriver,
}

/// One row in the driver listing.
#[derive(Debug, Clone, Serialize)]
pub struct DriverSummary {
    pub name: String,
    pub active: bool,
}

/// Holds the single active [`Driver`] and the factories for every configured
/// vendor.
///
/// Reads of the active driver are a brief `RwLock` clone of the `Arc`; the
/// lock is never held across an await. Switches are serialized through an
/// async mutex so two concurrent switch requests cannot interleave their
/// validate/initialize/swap sequences.
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
    active: RwLock<Arc<dyn Driver>>,
    switch_serial: Mutex<()>,
}

impl DriverRegistry {
    /// Builds the registry from configuration and activates the startup
    /// driver, failing if it cannot be constructed and initialized.
    pub async fn from_config(config: &DriversConfig) -> Result<Self, RegistryError> {
        let mut factories: HashMap<String, DriverFactory> = HashMap::new();

        if let Some(twilio) = config.twilio.clone() {
            factories.insert(
                "twilio".to_string(),
                Box::new(move || {
                    TwilioDriver::new(twilio.clone()).map(|d| Arc::new(d) as Arc<dyn Driver>)
                }),
            );
        }
        if let Some(telnyx) = config.telnyx.clone() {
            factories.insert(
                "telnyx".to_string(),
                Box::new(move || {
                    TelnyxDriver::new(telnyx.clone()).map(|d| Arc::new(d) as Arc<dyn Driver>)
                }),
            );
        }
        if let Some(sarvam) = config.sarvam.clone() {
            factories.insert(
                "sarvam".to_string(),
                Box::new(move || {
                    SarvamDriver::new(sarvam.clone()).map(|d| Arc::new(d) as Arc<dyn Driver>)
                }),
            );
        }

        if factories.is_empty() {
            return Err(RegistryError::NoStartupDriver);
        }

        let factory = factories
            .get(&config.active)
            .ok_or_else(|| RegistryError::UnknownDriver(config.active.clone()))?;
        let driver = factory()?;
        if !driver.validate_config() {
            return Err(DriverError::configuration(
                driver.name(),
                "startup driver configuration is incomplete",
            )
            .into());
        }
        driver.initialize().await?;
        tracing::info!(driver = %config.active, "startup driver activated");

        Ok(Self {
            factories,
            active: RwLock::new(driver),
            switch_serial: Mutex::new(()),
        })
    }

    /// Builds a registry around an already-constructed driver. The driver is
    /// registered under its own name; no other vendors are known.
    pub fn with_driver(driver: Arc<dyn Driver>) -> Self {
        Self {
            factories: HashMap::new(),
            active: RwLock::new(driver),
            switch_serial: Mutex::new(()),
        }
    }

    /// Returns the currently active driver.
    pub fn active(&self) -> Arc<dyn Driver> {
        let guard = match self.active.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("driver registry lock poisoned; recovering");
                poisoned.into_inner()
            }
        };
        Arc::clone(&guard)
    }

    /// Switches the active driver to `name`.
    ///
    /// The candidate is constructed, structurally validated, and initialized
    /// before the swap; any failure leaves the previously active driver in
    /// place and serving traffic throughout.
    pub async fn switch(&self, name: &str) -> Result<DriverStatus, RegistryError> {
        let _serial = self.switch_serial.lock().await;

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::UnknownDriver(name.to_string()))?;
        let candidate = factory()?;
        if !candidate.validate_config() {
            return Err(DriverError::configuration(
                candidate.name(),
                "driver configuration is incomplete",
            )
            .into());
        }
        candidate.initialize().await?;

        let status = candidate.status();
        let previous = {
            let mut guard = match self.active.write() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    tracing::error!("driver registry lock poisoned; recovering");
                    poisoned.into_inner()
                }
            };
            std::mem::replace(&mut *guard, candidate)
        };
        tracing::info!(from = previous.name(), to = name, "driver switched");
        Ok(status)
    }

    /// Lists every configured driver, flagging the active one.
    pub fn known(&self) -> Vec<DriverSummary> {
        let active_name = self.active().name();
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        let mut summaries: Vec<DriverSummary> = names
            .into_iter()
            .map(|name| DriverSummary {
                name: name.clone(),
                active: name == active_name,
            })
            .collect();
        // A driver installed via `with_driver` has no factory entry.
        if !summaries.iter().any(|s| s.active) {
            summaries.push(DriverSummary {
                name: active_name.to_string(),
                active: true,
            });
        }
        summaries
    }
}
