pub mod decision;
pub mod observer;
pub mod safety;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ControllerConfig;
use crate::domain::{Reading, RelayState};
use crate::hardware::{MeterError, PowerMeter, Relay, RelayError};

pub use decision::decide;
pub use observer::{LoopEvent, LoopObserver, RecordingObserver, TracingObserver};
pub use safety::{SafetyEvent, SafetyMonitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Running,
    Stopped,
}

/// Mutable state carried between iterations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopState {
    /// Failed meter reads since the last successful one.
    pub consecutive_failures: u32,
    pub phase: LoopPhase,
}

impl Default for LoopState {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            phase: LoopPhase::Running,
        }
    }
}

/// What a single read-decide-act cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// The meter could not be read; the relay was left alone.
    ReadFailed {
        error: MeterError,
        consecutive_failures: u32,
        limit_reached: bool,
    },
    /// A reading was obtained and the relay was commanded.
    Actuated {
        reading: Reading,
        state: RelayState,
        relay: Result<(), RelayError>,
    },
}

/// Periodically samples the meter and switches the relay on grid injection.
pub struct ControlLoop {
    config: ControllerConfig,
    meter: Arc<dyn PowerMeter>,
    relay: Arc<dyn Relay>,
    observer: Arc<dyn LoopObserver>,
    safety: SafetyMonitor,
    state: LoopState,
}

impl ControlLoop {
    pub fn new(config: &ControllerConfig, meter: Arc<dyn PowerMeter>, relay: Arc<dyn Relay>) -> Self {
        Self {
            safety: SafetyMonitor::new(config.failure_limit()),
            config: config.clone(),
            meter,
            relay,
            observer: Arc::new(TracingObserver),
            state: LoopState::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LoopObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Run one cycle: read, decide, act. Never fails; errors are reported
    /// to the observer and returned in the outcome.
    pub async fn step(&mut self) -> IterationOutcome {
        match self.meter.read().await {
            Err(error) => self.on_read_failure(error),
            Ok(reading) => {
                self.state.consecutive_failures = 0;
                let state = decide(reading, self.config.injection_threshold_w);
                self.observer.notify(&LoopEvent::Decision {
                    reading,
                    threshold_w: self.config.injection_threshold_w,
                    state,
                });

                let relay = self.relay.set(state).await;
                match &relay {
                    Ok(()) => self.observer.notify(&LoopEvent::RelayCommanded { state }),
                    Err(error) => self.observer.notify(&LoopEvent::RelayFailed {
                        state,
                        error: error.clone(),
                    }),
                }

                IterationOutcome::Actuated {
                    reading,
                    state,
                    relay,
                }
            }
        }
    }

    fn on_read_failure(&mut self, error: MeterError) -> IterationOutcome {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        let consecutive_failures = self.state.consecutive_failures;
        self.observer.notify(&LoopEvent::ReadFailed {
            error: error.clone(),
            consecutive_failures,
        });

        let limit_reached = match self.safety.check_meter_failures(consecutive_failures) {
            Some(SafetyEvent::MeterFailureLimit {
                consecutive_failures,
                limit,
            }) => {
                self.observer.notify(&LoopEvent::FailureLimitReached {
                    consecutive_failures,
                    limit,
                });
                true
            }
            None => false,
        };

        IterationOutcome::ReadFailed {
            error,
            consecutive_failures,
            limit_reached,
        }
    }

    /// Loop until `cancel` fires. Cancellation is honoured before each cycle
    /// and while waiting between cycles; an in-flight request is allowed to
    /// finish (it is bounded by the request timeout).
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            poll_interval_seconds = self.config.poll_interval_seconds,
            injection_threshold_w = self.config.injection_threshold_w,
            failure_limit = self.config.failure_limit,
            "control loop started"
        );

        let interval = self.config.poll_interval();
        while !cancel.is_cancelled() {
            self.step().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.stop();
    }

    /// Run a single cycle unless `cancel` fires first. An interrupted cycle
    /// is abandoned and the relay keeps its last commanded state.
    pub async fn run_once(&mut self, cancel: CancellationToken) -> Option<IterationOutcome> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.step() => Some(outcome),
        };
        self.stop();
        outcome
    }

    fn stop(&mut self) {
        self.state.phase = LoopPhase::Stopped;
        self.observer.notify(&LoopEvent::Stopped {
            consecutive_failures: self.state.consecutive_failures,
            last_safety_event: self.safety.last_event(),
        });
    }
}
