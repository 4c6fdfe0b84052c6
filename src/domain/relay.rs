use serde::{Deserialize, Serialize};
use strum::Display;

/// Commanded state of the smart socket.
///
/// The relay is write-only from our side: this is the state we asked for,
/// not a value read back from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RelayState {
    On,
    Off,
}

impl RelayState {
    /// Value of the `turn` query parameter understood by the relay.
    pub fn as_turn_param(&self) -> &'static str {
        match self {
            RelayState::On => "on",
            RelayState::Off => "off",
        }
    }
}
