//! Status LED looks, one per vehicle state.

use crate::devices::{Indicator, Rgb};
use crate::state::VehicleState;

/// Steady colour, blink colour and optional pulse timing, applied as a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub struct IndicatorProfile {
    pub steady: Rgb,
    pub blink: Rgb,
    /// (on_ms, off_ms) of the blink colour; `None` shows the steady colour only.
    pub pulse: Option<(u16, u16)>,
}

impl IndicatorProfile {
    const fn new(steady: Rgb, blink: Rgb, pulse: Option<(u16, u16)>) -> Self {
        Self {
            steady,
            blink,
            pulse,
        }
    }

    pub const STARTUP: Self = Self::new(Rgb(255, 255, 255), Rgb(0, 0, 255), None);
    pub const IDLE: Self = Self::new(Rgb(255, 255, 0), Rgb(0, 0, 255), None);
    pub const CALIBRATING: Self = Self::new(Rgb(128, 0, 128), Rgb(128, 255, 128), Some((250, 250)));
    pub const MANUAL: Self = Self::new(Rgb(255, 165, 0), Rgb(0, 89, 255), None);
    pub const ASSIST: Self = Self::new(Rgb(34, 139, 34), Rgb(140, 34, 140), None);
    pub const AUTO: Self = Self::new(Rgb(0, 255, 0), Rgb(255, 0, 255), None);
    pub const FALLEN: Self = Self::new(Rgb(255, 140, 0), Rgb(255, 0, 0), Some((500, 1500)));
    pub const EMERGENCY_STOP: Self = Self::new(Rgb(255, 0, 0), Rgb(0, 0, 255), None);
    /// Dark LED, used when the supervisor shuts down.
    pub const OFF: Self = Self::new(Rgb::BLACK, Rgb::BLACK, None);

    pub const fn for_state(state: VehicleState) -> Self {
        match state {
            VehicleState::Idle => Self::IDLE,
            VehicleState::Calibrating => Self::CALIBRATING,
            VehicleState::Manual => Self::MANUAL,
            VehicleState::Assist => Self::ASSIST,
            VehicleState::Auto => Self::AUTO,
            VehicleState::Fallen => Self::FALLEN,
            VehicleState::EmergencyStop => Self::EMERGENCY_STOP,
        }
    }

    /// Push the whole look to the indicator. A profile without a pulse switches pulsing off.
    pub fn apply<I: Indicator>(&self, indicator: &mut I) {
        indicator.set_steady(self.steady);
        indicator.set_blink(self.blink);
        match self.pulse {
            Some((on_ms, off_ms)) => indicator.set_pulse(on_ms, off_ms),
            None => indicator.disable_pulse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_calibrating_and_fallen_pulse() {
        for state in VehicleState::ALL {
            let pulsing = IndicatorProfile::for_state(state).pulse.is_some();
            assert_eq!(
                pulsing,
                matches!(state, VehicleState::Calibrating | VehicleState::Fallen),
                "{}",
                state
            );
        }
        assert_eq!(IndicatorProfile::FALLEN.pulse, Some((500, 1500)));
    }
}
