use anyhow::Result;
use std::sync::Arc;

use super::{PowerMeter, Relay, ShellyEmMeter, ShellyRelay};
use crate::config::Config;

/// Factory for creating the meter and relay clients from configuration
pub struct DeviceFactory {
    config: Config,
}

impl DeviceFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Create the energy meter client
    pub fn create_meter(&self) -> Result<Arc<dyn PowerMeter>> {
        let meter = ShellyEmMeter::new(
            &self.config.meter.url,
            self.config.controller.request_timeout(),
        )?;
        tracing::debug!(url = %meter.url(), "meter client ready");
        Ok(Arc::new(meter))
    }

    /// Create the relay client
    pub fn create_relay(&self) -> Result<Arc<dyn Relay>> {
        let relay = ShellyRelay::new(
            &self.config.relay.base_url,
            self.config.controller.request_timeout(),
        )?;
        Ok(Arc::new(relay))
    }
}
