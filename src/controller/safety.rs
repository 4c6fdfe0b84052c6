use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Safety event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyEvent {
    /// The meter failed `consecutive_failures` reads in a row, at or past the limit.
    /// No corrective action is taken; the relay keeps its last commanded state.
    MeterFailureLimit {
        consecutive_failures: u32,
        limit: u32,
    },
}

/// Watches meter health and keeps a short history of safety events.
#[derive(Debug, Clone)]
pub struct SafetyMonitor {
    failure_limit: Option<u32>,
    last_events: VecDeque<(DateTime<Utc>, SafetyEvent)>,
    max_event_history: usize,
}

impl SafetyMonitor {
    /// `None` disables the failure-limit warning.
    pub fn new(failure_limit: Option<u32>) -> Self {
        Self {
            failure_limit,
            last_events: VecDeque::new(),
            max_event_history: 100,
        }
    }

    /// Check the consecutive-failure count after a failed read.
    ///
    /// Returns an event on every failure at or beyond the limit, so the
    /// warning repeats each poll interval while the meter stays down.
    pub fn check_meter_failures(&mut self, consecutive_failures: u32) -> Option<SafetyEvent> {
        let limit = self.failure_limit?;
        if consecutive_failures < limit {
            return None;
        }
        let event = SafetyEvent::MeterFailureLimit {
            consecutive_failures,
            limit,
        };
        self.record_event(Utc::now(), event.clone());
        Some(event)
    }

    fn record_event(&mut self, timestamp: DateTime<Utc>, event: SafetyEvent) {
        self.last_events.push_back((timestamp, event));

        if self.last_events.len() > self.max_event_history {
            self.last_events.pop_front();
        }
    }

    /// Most recent safety event with its timestamp
    pub fn last_event(&self) -> Option<(DateTime<Utc>, SafetyEvent)> {
        self.last_events.back().cloned()
    }
}
