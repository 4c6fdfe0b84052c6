pub mod factory;
pub mod http;
pub mod meter;
pub mod relay;

pub use factory::DeviceFactory;
pub use meter::{MeterError, PowerMeter, ShellyEmMeter};
pub use relay::{Relay, RelayError, ShellyRelay};

#[cfg(test)]
pub use meter::MockPowerMeter;
#[cfg(test)]
pub use relay::MockRelay;
