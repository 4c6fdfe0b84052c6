use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::http::{build_client, classify, TransportFailure};
use crate::domain::Reading;

/// RPC method returning the status of one energy-meter channel.
pub const GET_STATUS_METHOD: &str = "EM1.GetStatus";
/// The meter channel we sample.
pub const METER_CHANNEL: u8 = 0;
/// Field of the status object holding signed active power in watts.
pub const ACTIVE_POWER_FIELD: &str = "act_power";

/// Meter-specific errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeterError {
    #[error("Meter unreachable: {0}")]
    Unreachable(String),
    #[error("Meter request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Meter rejected request: HTTP {0}")]
    RequestRejected(u16),
    #[error("Malformed meter response: {0}")]
    MalformedResponse(String),
    #[error("Field '{0}' missing from meter response")]
    MissingField(&'static str),
    #[error("Field '{field}' is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PowerMeter: Send + Sync {
    /// Take one active-power sample. No retries.
    async fn read(&self) -> Result<Reading, MeterError>;
}

#[derive(Debug, Serialize)]
struct RpcRequest {
    id: u32,
    method: &'static str,
    params: RpcParams,
}

#[derive(Debug, Serialize)]
struct RpcParams {
    id: u8,
}

/// Shelly EM energy meter reached over its JSON-RPC endpoint (`/rpc`).
#[derive(Debug, Clone)]
pub struct ShellyEmMeter {
    url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl ShellyEmMeter {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("invalid meter URL '{url}'"))?;
        let client = build_client(timeout).context("failed to build meter HTTP client")?;
        Ok(Self {
            url,
            client,
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn transport_error(&self, err: &reqwest::Error) -> MeterError {
        match classify(err) {
            TransportFailure::Timeout => MeterError::Timeout(self.timeout),
            TransportFailure::Unreachable(cause) => MeterError::Unreachable(cause),
        }
    }
}

#[async_trait]
impl PowerMeter for ShellyEmMeter {
    async fn read(&self) -> Result<Reading, MeterError> {
        let request = RpcRequest {
            id: 1,
            method: GET_STATUS_METHOD,
            params: RpcParams { id: METER_CHANNEL },
        };

        let resp = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(MeterError::RequestRejected(status.as_u16()));
        }

        let body = resp.text().await.map_err(|e| self.transport_error(&e))?;
        let reading = parse_status(&body)?;
        debug!(active_power_w = reading.active_power_w, "meter read");
        Ok(reading)
    }
}

/// Extract `result.act_power` from an `EM1.GetStatus` response body.
///
/// Numbers are taken as-is, numeric strings are coerced. `null` counts as
/// missing; booleans, arrays and objects are rejected.
pub fn parse_status(body: &str) -> Result<Reading, MeterError> {
    let doc: Value =
        serde_json::from_str(body).map_err(|e| MeterError::MalformedResponse(e.to_string()))?;

    let value = doc
        .get("result")
        .and_then(|result| result.get(ACTIVE_POWER_FIELD))
        .filter(|v| !v.is_null())
        .ok_or(MeterError::MissingField(ACTIVE_POWER_FIELD))?;

    coerce_f64(value)
        .map(Reading::new)
        .ok_or_else(|| MeterError::NotNumeric {
            field: ACTIVE_POWER_FIELD,
            value: value.to_string(),
        })
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
