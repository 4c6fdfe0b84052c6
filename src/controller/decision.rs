use crate::domain::{Reading, RelayState};

/// Map the latest reading onto the desired relay state.
///
/// Strictly below the threshold means surplus is being exported, so the
/// consumers are switched on. Equal to the threshold is not injection.
/// No smoothing or hysteresis: only the current reading matters.
pub fn decide(reading: Reading, threshold_w: f64) -> RelayState {
    if reading.is_injecting(threshold_w) {
        RelayState::On
    } else {
        RelayState::Off
    }
}
