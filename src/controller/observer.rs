//! Diagnostic events emitted by the control loop.
//!
//! The loop never logs directly; it reports to a [`LoopObserver`]. The
//! production observer turns events into `tracing` records, tests plug in a
//! recorder.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

use super::safety::SafetyEvent;
use crate::domain::{Reading, RelayState};
use crate::hardware::{MeterError, RelayError};

#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    ReadFailed {
        error: MeterError,
        consecutive_failures: u32,
    },
    FailureLimitReached {
        consecutive_failures: u32,
        limit: u32,
    },
    Decision {
        reading: Reading,
        threshold_w: f64,
        state: RelayState,
    },
    RelayCommanded {
        state: RelayState,
    },
    RelayFailed {
        state: RelayState,
        error: RelayError,
    },
    Stopped {
        consecutive_failures: u32,
        /// Latest failure-limit crossing seen during this run, if any.
        last_safety_event: Option<(DateTime<Utc>, SafetyEvent)>,
    },
}

pub trait LoopObserver: Send + Sync {
    fn notify(&self, event: &LoopEvent);
}

/// Emits each event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LoopObserver for TracingObserver {
    fn notify(&self, event: &LoopEvent) {
        match event {
            LoopEvent::ReadFailed {
                error,
                consecutive_failures,
            } => warn!(
                op = "meter.read",
                error = %error,
                consecutive_failures,
                "meter read failed, no relay action this cycle"
            ),
            LoopEvent::FailureLimitReached {
                consecutive_failures,
                limit,
            } => error!(
                consecutive_failures,
                limit,
                "SAFETY: meter failure limit reached, relay left in last commanded state"
            ),
            LoopEvent::Decision {
                reading,
                threshold_w,
                state: RelayState::On,
            } => info!(
                active_power_w = reading.active_power_w,
                threshold_w,
                "grid injection detected, switching consumers on"
            ),
            LoopEvent::Decision {
                reading,
                threshold_w,
                state: RelayState::Off,
            } => info!(
                active_power_w = reading.active_power_w,
                threshold_w,
                "consumption within limits, switching consumers off"
            ),
            LoopEvent::RelayCommanded { state } => info!(state = %state, "relay command sent"),
            LoopEvent::RelayFailed { state, error } => warn!(
                op = "relay.set",
                state = %state,
                error = %error,
                "relay command failed"
            ),
            LoopEvent::Stopped {
                consecutive_failures,
                last_safety_event: None,
            } => info!(consecutive_failures, "control loop stopped"),
            LoopEvent::Stopped {
                consecutive_failures,
                last_safety_event: Some((at, event)),
            } => info!(
                consecutive_failures,
                last_safety_event = ?event,
                last_safety_event_at = %at,
                "control loop stopped"
            ),
        }
    }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LoopEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LoopEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, pred: impl Fn(&LoopEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl LoopObserver for RecordingObserver {
    fn notify(&self, event: &LoopEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
