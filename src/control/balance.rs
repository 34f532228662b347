//! Steer-to-balance control law.
//!
//! Torque on the steering column is a PID on the roll angle (derivative from the gyro rate rather
//! than a finite difference) plus an optional proportional pull toward the steering reference.
//! Positive roll produces positive torque, steering into the fall.

use super::Pid;

/// Tunable gains of [`BalanceController`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BalanceGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Output saturation (N·m).
    pub torque_limit: f32,
    /// Gain on the steering-angle error.
    pub steer_gain: f32,
}

impl Default for BalanceGains {
    fn default() -> Self {
        Self {
            kp: 10.0,
            ki: 0.0,
            kd: 0.5,
            torque_limit: 5.0,
            steer_gain: 0.0,
        }
    }
}

/// One sample of the balance law inputs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BalanceInput {
    /// Roll angle φ (rad).
    pub roll: f32,
    /// Steering angle δ (rad).
    pub steer: f32,
    /// Roll rate φ̇ (rad/s).
    pub roll_rate: f32,
    /// Steering rate δ̇ (rad/s).
    pub steer_rate: f32,
    /// Roll reference φ_r (rad).
    pub roll_ref: f32,
    /// Steering reference δ_r (rad).
    pub steer_ref: f32,
}

impl BalanceInput {
    fn is_finite(&self) -> bool {
        self.roll.is_finite()
            && self.steer.is_finite()
            && self.roll_rate.is_finite()
            && self.steer_rate.is_finite()
            && self.roll_ref.is_finite()
            && self.steer_ref.is_finite()
    }
}

pub struct BalanceController {
    gains: BalanceGains,
    roll: Pid,
}

impl BalanceController {
    pub fn new(gains: BalanceGains) -> Self {
        let limit = gains.torque_limit.abs();
        let roll = Pid::new(gains.kp, gains.ki, gains.kd)
            .with_output_limits(-limit, limit)
            .with_integral_limits(-limit, limit);
        Self { gains, roll }
    }

    pub fn gains(&self) -> &BalanceGains {
        &self.gains
    }

    /// Forget the accumulated integral.
    pub fn reset(&mut self) {
        self.roll.reset();
    }

    /// Steering torque (N·m) for this sample, `dt` seconds after the previous one.
    ///
    /// Non-finite inputs produce zero torque and leave the controller state untouched.
    pub fn control(&mut self, input: &BalanceInput, dt: f32) -> f32 {
        if !input.is_finite() {
            return 0.0;
        }
        let limit = self.gains.torque_limit.abs();

        // The PID works on (reference - measurement); negate so leaning right steers right.
        let lean = -self
            .roll
            .update(input.roll_ref, input.roll, input.roll_rate, dt);
        let steer = self.gains.steer_gain * (input.steer_ref - input.steer);

        let u = (lean + steer).clamp(-limit, limit);
        if u.is_finite() { u } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(roll: f32, roll_rate: f32) -> BalanceInput {
        BalanceInput {
            roll,
            roll_rate,
            ..BalanceInput::default()
        }
    }

    #[test]
    fn steers_into_the_lean() {
        let mut law = BalanceController::new(BalanceGains::default());
        let u = law.control(&input(0.1, 0.0), 0.01);
        assert!((u - 1.0).abs() < 1e-5);

        let u = law.control(&input(0.0, 2.0), 0.01);
        assert!((u - 1.0).abs() < 1e-5);
    }

    #[test]
    fn output_saturates_at_torque_limit() {
        let mut law = BalanceController::new(BalanceGains::default());
        assert_eq!(law.control(&input(1.0, 0.0), 0.01), 5.0);
        assert_eq!(law.control(&input(-1.0, -4.0), 0.01), -5.0);
    }

    #[test]
    fn zero_dt_does_not_integrate() {
        let gains = BalanceGains {
            kp: 0.0,
            ki: 1.0,
            kd: 0.0,
            ..BalanceGains::default()
        };
        let mut law = BalanceController::new(gains);
        assert_eq!(law.control(&input(0.5, 0.0), 0.0), 0.0);
        assert_eq!(law.control(&input(0.5, 0.0), -1.0), 0.0);
        assert!((law.control(&input(0.5, 0.0), 1.0) - 0.5).abs() < 1e-6);

        law.reset();
        assert_eq!(law.control(&input(0.5, 0.0), 0.0), 0.0);
    }

    #[test]
    fn steering_error_term() {
        let gains = BalanceGains {
            kp: 0.0,
            kd: 0.0,
            steer_gain: 2.0,
            ..BalanceGains::default()
        };
        let mut law = BalanceController::new(gains);
        let sample = BalanceInput {
            steer: 0.1,
            steer_ref: 0.3,
            ..BalanceInput::default()
        };
        assert!((law.control(&sample, 0.01) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn non_finite_input_gives_zero() {
        let mut law = BalanceController::new(BalanceGains::default());
        assert_eq!(law.control(&input(f32::NAN, 0.0), 0.01), 0.0);
        assert_eq!(law.control(&input(0.0, f32::INFINITY), 0.01), 0.0);
    }
}
