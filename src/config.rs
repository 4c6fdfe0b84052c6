use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::time::Duration;
use validator::Validate;

/// Environment prefix; nested keys are separated by `__`,
/// e.g. `SURPLUS__CONTROLLER__POLL_INTERVAL_SECONDS=10`.
pub const ENV_PREFIX: &str = "SURPLUS__";
/// Overrides the location of the TOML config file.
pub const CONFIG_FILE_ENV: &str = "SURPLUS_CONFIG_FILE";
pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub meter: MeterConfig,
    #[validate(nested)]
    pub relay: RelayConfig,
    #[serde(default)]
    #[validate(nested)]
    pub controller: ControllerConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MeterConfig {
    /// JSON-RPC endpoint of the energy meter, e.g. `http://192.168.1.162/rpc`.
    #[validate(url)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RelayConfig {
    /// Relay endpoint without the `turn` parameter, e.g. `http://192.168.1.51/relay/0`.
    #[validate(url)]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ControllerConfig {
    #[serde(default = "default_poll_interval_seconds")]
    #[validate(range(min = 1))]
    pub poll_interval_seconds: u64,
    /// Readings strictly below this value (watts) count as grid injection.
    #[serde(default = "default_injection_threshold_w")]
    #[validate(range(min = -1_000_000.0, max = 1_000_000.0))]
    pub injection_threshold_w: f64,
    #[serde(default = "default_request_timeout_seconds")]
    #[validate(range(min = 1))]
    pub request_timeout_seconds: u64,
    /// Consecutive failed reads before a safety warning. 0 disables it.
    #[serde(default = "default_failure_limit")]
    pub failure_limit: u32,
    /// Run a single cycle and exit instead of looping.
    #[serde(default)]
    pub run_once: bool,
}

fn default_poll_interval_seconds() -> u64 {
    5
}

fn default_injection_threshold_w() -> f64 {
    -30.0
}

fn default_request_timeout_seconds() -> u64 {
    5
}

fn default_failure_limit() -> u32 {
    10
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            injection_threshold_w: default_injection_threshold_w(),
            request_timeout_seconds: default_request_timeout_seconds(),
            failure_limit: default_failure_limit(),
            run_once: false,
        }
    }
}

impl ControllerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn failure_limit(&self) -> Option<u32> {
        (self.failure_limit > 0).then_some(self.failure_limit)
    }
}

impl Config {
    /// Load from the TOML file and environment, then validate.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::from_figment(Self::figment(&path))
    }

    pub fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract().context("failed to load configuration")?;
        cfg.check().context("invalid configuration")?;
        Ok(cfg)
    }

    /// Field validation plus checks the derive cannot express.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        // Range checks let NaN through.
        anyhow::ensure!(
            self.controller.injection_threshold_w.is_finite(),
            "controller.injection_threshold_w must be a finite number of watts"
        );
        Ok(())
    }
}
