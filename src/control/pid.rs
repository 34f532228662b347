//! Generic PID controller for closed-loop control.
//!
//! Works in `no_std` and does not allocate memory. The derivative term is fed from a measured rate
//! (a gyro or encoder velocity) rather than differentiated from the measurement.

/// PID controller with tunable gains and output clamping.
#[derive(Clone, Copy, Debug)]
pub struct Pid {
    /// Proportional gain
    kp: f32,
    /// Integral gain
    ki: f32,
    /// Derivative gain
    kd: f32,

    /// Integrator state
    integral: f32,

    /// Output clamp
    out_min: f32,
    out_max: f32,

    /// Integral anti-windup clamp
    int_min: f32,
    int_max: f32,
}

impl Pid {
    /// Create a new PID controller.
    ///
    /// `kp`, `ki`, `kd` are the gain constants.
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,

            integral: 0.0,

            out_min: -1.0,
            out_max: 1.0,

            int_min: -1.0,
            int_max: 1.0,
        }
    }

    /// Set output limits.
    pub fn with_output_limits(mut self, min: f32, max: f32) -> Self {
        self.out_min = min;
        self.out_max = max;
        self
    }

    /// Set integral limits for anti-windup.
    pub fn with_integral_limits(mut self, min: f32, max: f32) -> Self {
        self.int_min = min;
        self.int_max = max;
        self
    }

    /// Reset the integrator.
    pub fn reset(&mut self) {
        self.integral = 0.0;
    }

    /// Update the controller.
    ///
    /// `setpoint`: desired value
    /// `measurement`: current value
    /// `rate`: measured rate of change of `measurement`
    /// `dt`: timestep in seconds
    ///
    /// A non-positive or non-finite `dt` holds the integrator.
    pub fn update(&mut self, setpoint: f32, measurement: f32, rate: f32, dt: f32) -> f32 {
        let error = setpoint - measurement;

        // ----- P term -----
        let p = self.kp * error;

        // ----- I term -----
        if dt.is_finite() && dt > 0.0 {
            self.integral = (self.integral + error * dt * self.ki).clamp(self.int_min, self.int_max);
        }
        let i = self.integral;

        // ----- D term (on measurement, so setpoint steps do not kick) -----
        let d = -self.kd * rate;

        // ----- Output clamp -----
        (p + i + d).clamp(self.out_min, self.out_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_output_is_clamped() {
        let mut pid = Pid::new(2.0, 0.0, 0.0).with_output_limits(-3.0, 3.0);
        assert_eq!(pid.update(1.0, 0.0, 0.0, 0.01), 2.0);
        assert_eq!(pid.update(5.0, 0.0, 0.0, 0.01), 3.0);
        assert_eq!(pid.update(-5.0, 0.0, 0.0, 0.01), -3.0);
    }

    #[test]
    fn integral_is_held_for_bad_dt() {
        let mut pid = Pid::new(0.0, 1.0, 0.0).with_integral_limits(-10.0, 10.0);
        assert_eq!(pid.update(1.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(pid.update(1.0, 0.0, 0.0, f32::NAN), 0.0);
        assert!((pid.update(1.0, 0.0, 0.0, 0.5) - 0.5).abs() < 1e-6);

        pid.reset();
        assert_eq!(pid.update(0.0, 0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn integral_windup_is_limited() {
        let mut pid = Pid::new(0.0, 1.0, 0.0)
            .with_integral_limits(-0.2, 0.2)
            .with_output_limits(-1.0, 1.0);
        for _ in 0..100 {
            pid.update(1.0, 0.0, 0.0, 0.1);
        }
        assert!((pid.update(1.0, 0.0, 0.0, 0.1) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn derivative_opposes_measured_rate() {
        let mut pid = Pid::new(0.0, 0.0, 0.5).with_output_limits(-100.0, 100.0);
        assert_eq!(pid.update(0.0, 0.0, 2.0, 0.01), -1.0);
        // Independent of dt and of setpoint steps.
        assert_eq!(pid.update(3.0, 0.0, -2.0, 0.0), 1.0);
    }
}
