use anyhow::Result;
use surplus_relay_controller::{config, controller, hardware, telemetry};
use config::Config;
use controller::ControlLoop;
use hardware::DeviceFactory;
use telemetry::init_tracing;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;

    let factory = DeviceFactory::new(&cfg);
    let meter = factory.create_meter()?;
    let relay = factory.create_relay()?;
    let mut control = ControlLoop::new(&cfg.controller, meter, relay);

    info!(
        meter_url = %cfg.meter.url,
        relay_url = %cfg.relay.base_url,
        "starting surplus relay controller"
    );

    let cancel = CancellationToken::new();
    telemetry::cancel_on_shutdown(cancel.clone());

    if cfg.controller.run_once {
        match control.run_once(cancel).await {
            Some(outcome) => info!(?outcome, "single cycle complete"),
            None => info!("single cycle interrupted by shutdown signal"),
        }
    } else {
        control.run(cancel).await;
    }

    info!("shutdown complete, relay left in last commanded state");
    Ok(())
}
