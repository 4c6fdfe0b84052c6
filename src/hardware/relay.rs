use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::http::{build_client, classify, TransportFailure};
use crate::domain::RelayState;

/// Query parameter carrying the requested relay state.
pub const TURN_PARAM: &str = "turn";

/// Relay-specific errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("Relay unreachable: {0}")]
    Unreachable(String),
    #[error("Relay request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Relay rejected command: HTTP {0}")]
    RequestRejected(u16),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Relay: Send + Sync {
    /// Command the relay into `state`. Sending the current state again is harmless.
    async fn set(&self, state: RelayState) -> Result<(), RelayError>;
}

/// Shelly smart socket driven through its HTTP relay endpoint
/// (`/relay/<n>?turn=on|off`).
#[derive(Debug, Clone)]
pub struct ShellyRelay {
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl ShellyRelay {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid relay URL '{base_url}'"))?;
        let client = build_client(timeout).context("failed to build relay HTTP client")?;
        Ok(Self {
            base_url,
            client,
            timeout,
        })
    }

    /// Full command URL for `state`.
    ///
    /// Any `turn` pair already present on the base URL is replaced, so a
    /// base of `.../relay/0?turn=` works as well as `.../relay/0`.
    pub fn command_url(&self, state: RelayState) -> Url {
        let retained: Vec<(String, String)> = self
            .base_url
            .query_pairs()
            .filter(|(k, _)| k != TURN_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut url = self.base_url.clone();
        url.set_query(None);
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &retained {
                pairs.append_pair(k, v);
            }
            pairs.append_pair(TURN_PARAM, state.as_turn_param());
        }
        url
    }

    fn transport_error(&self, err: &reqwest::Error) -> RelayError {
        match classify(err) {
            TransportFailure::Timeout => RelayError::Timeout(self.timeout),
            TransportFailure::Unreachable(cause) => RelayError::Unreachable(cause),
        }
    }
}

#[async_trait]
impl Relay for ShellyRelay {
    async fn set(&self, state: RelayState) -> Result<(), RelayError> {
        let resp = self
            .client
            .get(self.command_url(state))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::RequestRejected(status.as_u16()));
        }
        debug!(%state, "relay command accepted");
        Ok(())
    }
}
