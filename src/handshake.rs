//! Steering actuator mode-and-arm handshake.
//!
//! Engaging the actuator is two steps: command the control mode, then poll the driver until it
//! reports that it accepts motion commands. No position or torque command may be issued for the
//! new mode before the poll succeeds.

use core::fmt;

use embedded_hal::delay::DelayNs;

use crate::devices::{ActuatorMode, SteeringActuator};

/// How long to keep polling the actuator for the armed confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum ArmPolicy {
    /// Poll back-to-back until the driver arms. Blocks the whole loop if it never does.
    UntilArmed,
    /// Poll at most `attempts` times, waiting `interval_us` between polls.
    Bounded { attempts: u32, interval_us: u32 },
}

impl Default for ArmPolicy {
    fn default() -> Self {
        ArmPolicy::Bounded {
            attempts: 50,
            interval_us: 2_000,
        }
    }
}

/// The actuator could not be engaged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum ArmError {
    /// The driver never confirmed it was armed within the attempt budget.
    NotArmed { mode: ActuatorMode, attempts: u32 },
}

impl fmt::Display for ArmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmError::NotArmed { mode, attempts } => {
                write!(f, "actuator not armed in {} after {} polls", mode, attempts)
            }
        }
    }
}

/// Command `mode` and poll the actuator until it is armed.
///
/// Returns the number of polls it took.
pub fn arm<A, D>(
    actuator: &mut A,
    delay: &mut D,
    mode: ActuatorMode,
    policy: ArmPolicy,
) -> Result<u32, ArmError>
where
    A: SteeringActuator,
    D: DelayNs,
{
    actuator.set_mode(mode);

    match policy {
        ArmPolicy::UntilArmed => {
            let mut polls: u32 = 0;
            loop {
                polls = polls.saturating_add(1);
                if actuator.enable_operation() {
                    return Ok(polls);
                }
            }
        }
        ArmPolicy::Bounded {
            attempts,
            interval_us,
        } => {
            for poll in 1..=attempts {
                if actuator.enable_operation() {
                    return Ok(poll);
                }
                if poll < attempts {
                    delay.delay_us(interval_us);
                }
            }
            Err(ArmError::NotArmed { mode, attempts })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Drive {
        mode: Option<ActuatorMode>,
        arm_after: Option<u32>,
        polls: u32,
    }

    impl SteeringActuator for Drive {
        fn start(&mut self) {}
        fn update(&mut self) {}
        fn set_mode(&mut self, mode: ActuatorMode) {
            self.mode = Some(mode);
        }
        fn enable_operation(&mut self) -> bool {
            self.polls += 1;
            matches!(self.arm_after, Some(n) if self.polls >= n)
        }
        fn set_position(&mut self, _rad: f32) {}
        fn set_torque(&mut self, _nm: f32) {}
        fn position(&self) -> f32 {
            0.0
        }
        fn velocity(&self) -> f32 {
            0.0
        }
        fn torque(&self) -> f32 {
            0.0
        }
    }

    #[derive(Default)]
    struct Waits(u32);

    impl DelayNs for Waits {
        fn delay_ns(&mut self, ns: u32) {
            self.0 += ns / 1_000;
        }
    }

    #[test]
    fn bounded_arm_succeeds_within_budget() {
        let mut drive = Drive {
            arm_after: Some(3),
            ..Drive::default()
        };
        let mut waits = Waits::default();
        let policy = ArmPolicy::Bounded {
            attempts: 5,
            interval_us: 100,
        };

        assert_eq!(arm(&mut drive, &mut waits, ActuatorMode::TorqueProfile, policy), Ok(3));
        assert_eq!(drive.mode, Some(ActuatorMode::TorqueProfile));
        assert_eq!(waits.0, 200);
    }

    #[test]
    fn bounded_arm_reports_exhaustion() {
        let mut drive = Drive::default();
        let mut waits = Waits::default();
        let policy = ArmPolicy::Bounded {
            attempts: 4,
            interval_us: 250,
        };

        let err = arm(&mut drive, &mut waits, ActuatorMode::PositionProfile, policy);
        assert_eq!(
            err,
            Err(ArmError::NotArmed {
                mode: ActuatorMode::PositionProfile,
                attempts: 4
            })
        );
        assert_eq!(drive.polls, 4);
        // No wait after the final poll.
        assert_eq!(waits.0, 750);
    }

    #[test]
    fn until_armed_polls_without_waiting() {
        let mut drive = Drive {
            arm_after: Some(40),
            ..Drive::default()
        };
        let mut waits = Waits::default();

        let polls = arm(&mut drive, &mut waits, ActuatorMode::PositionProfile, ArmPolicy::UntilArmed);
        assert_eq!(polls, Ok(40));
        assert_eq!(waits.0, 0);
    }
}
