//! End-to-end cycles against mock meter and relay HTTP endpoints.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use surplus_relay_controller::config::ControllerConfig;
use surplus_relay_controller::controller::{
    ControlLoop, IterationOutcome, LoopEvent, LoopPhase, RecordingObserver, SafetyEvent,
};
use surplus_relay_controller::domain::{Reading, RelayState};
use surplus_relay_controller::hardware::{MeterError, ShellyEmMeter, ShellyRelay};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_millis(200);

struct Rig {
    meter: MockServer,
    relay: MockServer,
}

impl Rig {
    async fn start() -> Self {
        Self {
            meter: MockServer::start().await,
            relay: MockServer::start().await,
        }
    }

    async fn meter_reports(&self, act_power: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 1,
                "src": "shellyem",
                "result": {"id": 0, "act_power": act_power, "voltage": 230.4}
            })))
            .mount(&self.meter)
            .await;
    }

    async fn meter_hangs(&self) {
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": {"act_power": -500.0}}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&self.meter)
            .await;
    }

    async fn relay_expects(&self, turn: &str, times: u64) {
        Mock::given(method("GET"))
            .and(path("/relay/0"))
            .and(query_param("turn", turn))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ison": turn == "on"})))
            .expect(times)
            .mount(&self.relay)
            .await;
    }

    async fn relay_never_called(&self) {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&self.relay)
            .await;
    }

    fn control(&self, config: &ControllerConfig) -> (ControlLoop, Arc<RecordingObserver>) {
        let meter = ShellyEmMeter::new(&format!("{}/rpc", self.meter.uri()), TIMEOUT).unwrap();
        let relay =
            ShellyRelay::new(&format!("{}/relay/0", self.relay.uri()), TIMEOUT).unwrap();
        let observer = Arc::new(RecordingObserver::new());
        let control = ControlLoop::new(config, Arc::new(meter), Arc::new(relay))
            .with_observer(observer.clone());
        (control, observer)
    }
}

#[tokio::test]
async fn injection_turns_relay_on() {
    let rig = Rig::start().await;
    rig.meter_reports(json!(-69.8)).await;
    rig.relay_expects("on", 1).await;
    let (mut control, _) = rig.control(&ControllerConfig::default());

    let outcome = control.step().await;

    assert_eq!(
        outcome,
        IterationOutcome::Actuated {
            reading: Reading::new(-69.8),
            state: RelayState::On,
            relay: Ok(()),
        }
    );
}

#[tokio::test]
async fn consumption_turns_relay_off() {
    let rig = Rig::start().await;
    rig.meter_reports(json!(12.0)).await;
    rig.relay_expects("off", 1).await;
    let (mut control, _) = rig.control(&ControllerConfig::default());

    let outcome = control.step().await;

    assert!(matches!(
        outcome,
        IterationOutcome::Actuated {
            state: RelayState::Off,
            relay: Ok(()),
            ..
        }
    ));
}

#[tokio::test]
async fn meter_timeout_leaves_relay_alone() {
    let rig = Rig::start().await;
    rig.meter_hangs().await;
    rig.relay_never_called().await;
    let (mut control, observer) = rig.control(&ControllerConfig::default());

    let outcome = control.step().await;

    assert_eq!(
        outcome,
        IterationOutcome::ReadFailed {
            error: MeterError::Timeout(TIMEOUT),
            consecutive_failures: 1,
            limit_reached: false,
        }
    );
    assert_eq!(control.state().consecutive_failures, 1);
    assert_eq!(control.state().phase, LoopPhase::Running);
    assert_eq!(
        observer.events(),
        vec![LoopEvent::ReadFailed {
            error: MeterError::Timeout(TIMEOUT),
            consecutive_failures: 1,
        }]
    );
}

#[tokio::test]
async fn threshold_reading_turns_relay_off() {
    let rig = Rig::start().await;
    rig.meter_reports(json!(-30.0)).await;
    rig.relay_expects("off", 1).await;
    let (mut control, _) = rig.control(&ControllerConfig::default());

    let outcome = control.step().await;

    assert!(matches!(
        outcome,
        IterationOutcome::Actuated {
            state: RelayState::Off,
            ..
        }
    ));
}

#[tokio::test]
async fn ten_timeouts_raise_safety_warning() {
    let rig = Rig::start().await;
    rig.meter_hangs().await;
    rig.relay_never_called().await;
    let (mut control, observer) = rig.control(&ControllerConfig::default());

    for _ in 0..10 {
        control.step().await;
    }

    let events = observer.events();
    let limit_positions: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, LoopEvent::FailureLimitReached { .. }))
        .map(|(i, _)| i)
        .collect();

    assert_eq!(control.state().consecutive_failures, 10);
    assert_eq!(limit_positions, vec![events.len() - 1]);
    assert_eq!(
        events[events.len() - 2],
        LoopEvent::ReadFailed {
            error: MeterError::Timeout(TIMEOUT),
            consecutive_failures: 10,
        }
    );
    assert_eq!(
        events[events.len() - 1],
        LoopEvent::FailureLimitReached {
            consecutive_failures: 10,
            limit: 10,
        }
    );
}

#[tokio::test]
async fn unreachable_meter_counts_as_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let relay_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&relay_server)
        .await;

    let meter = ShellyEmMeter::new(&format!("http://{addr}/rpc"), TIMEOUT).unwrap();
    let relay = ShellyRelay::new(&format!("{}/relay/0", relay_server.uri()), TIMEOUT).unwrap();
    let mut control =
        ControlLoop::new(&ControllerConfig::default(), Arc::new(meter), Arc::new(relay));

    let outcome = control.step().await;

    assert!(matches!(
        outcome,
        IterationOutcome::ReadFailed {
            error: MeterError::Unreachable(_),
            consecutive_failures: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn relay_rejection_keeps_loop_running() {
    let rig = Rig::start().await;
    rig.meter_reports(json!(-250.0)).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&rig.relay)
        .await;
    let (mut control, observer) = rig.control(&ControllerConfig::default());

    control.step().await;
    control.step().await;

    assert_eq!(control.state().consecutive_failures, 0);
    assert_eq!(
        observer.count(|e| matches!(e, LoopEvent::RelayFailed { .. })),
        2
    );
}

#[tokio::test]
async fn run_loop_polls_until_cancelled() {
    let rig = Rig::start().await;
    rig.meter_reports(json!(-120.0)).await;
    Mock::given(method("GET"))
        .and(path("/relay/0"))
        .and(query_param("turn", "on"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&rig.relay)
        .await;

    let config = ControllerConfig {
        poll_interval_seconds: 1,
        ..ControllerConfig::default()
    };
    let (mut control, observer) = rig.control(&config);
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        stopper.cancel();
    });
    control.run(cancel).await;

    let commands = observer.count(|e| matches!(e, LoopEvent::RelayCommanded { .. }));
    assert_eq!(commands, 2);
    assert_eq!(control.state().phase, LoopPhase::Stopped);
    assert!(matches!(
        observer.events().last(),
        Some(LoopEvent::Stopped {
            consecutive_failures: 0,
            last_safety_event: None,
        })
    ));
}

#[tokio::test]
async fn stop_notice_carries_last_safety_event() {
    let rig = Rig::start().await;
    rig.meter_hangs().await;
    rig.relay_never_called().await;

    let config = ControllerConfig {
        poll_interval_seconds: 1,
        failure_limit: 1,
        ..ControllerConfig::default()
    };
    let (mut control, observer) = rig.control(&config);
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1700)).await;
        stopper.cancel();
    });
    control.run(cancel).await;

    match observer.events().last() {
        Some(LoopEvent::Stopped {
            consecutive_failures: 2,
            last_safety_event: Some((_, event)),
        }) => assert_eq!(
            *event,
            SafetyEvent::MeterFailureLimit {
                consecutive_failures: 2,
                limit: 1,
            }
        ),
        other => panic!("unexpected final event: {other:?}"),
    }
}
