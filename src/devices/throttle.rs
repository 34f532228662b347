//! PWM throttle for the hub-motor controller.
//!
//! The controller's throttle input is fed from an RC-filtered PWM pin. The drive is open loop: the
//! reported speed is the last commanded speed.

use embedded_hal::pwm::SetDutyCycle;

use super::PropulsionDrive;

pub struct PwmThrottle<P: SetDutyCycle> {
    pwm: P,
    /// Speed at full duty (m/s).
    max_speed: f32,
    commanded: f32,
}

impl<P: SetDutyCycle> PwmThrottle<P> {
    pub fn new(pwm: P, max_speed: f32) -> Self {
        Self {
            pwm,
            max_speed,
            commanded: 0.0,
        }
    }

    /// Duty for `mps`, clamped to the forward range.
    fn duty_for(&self, mps: f32) -> u16 {
        let max = self.pwm.max_duty_cycle();
        if !(mps > 0.0) || !(self.max_speed > 0.0) {
            return 0;
        }
        let frac = (mps / self.max_speed).min(1.0);
        (frac * f32::from(max)) as u16
    }

    pub fn free(self) -> P {
        self.pwm
    }
}

impl<P: SetDutyCycle> PropulsionDrive for PwmThrottle<P> {
    fn start(&mut self) {
        self.set_speed(0.0);
    }

    fn set_speed(&mut self, mps: f32) {
        let duty = self.duty_for(mps);
        let _ = self.pwm.set_duty_cycle(duty);
        self.commanded = if duty == 0 { 0.0 } else { mps.min(self.max_speed) };
    }

    fn speed(&self) -> f32 {
        self.commanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    struct Pin {
        duty: u16,
    }

    impl embedded_hal::pwm::ErrorType for Pin {
        type Error = Infallible;
    }

    impl SetDutyCycle for Pin {
        fn max_duty_cycle(&self) -> u16 {
            1000
        }
        fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
            self.duty = duty;
            Ok(())
        }
    }

    #[test]
    fn speed_maps_linearly_and_clamps() {
        let mut throttle = PwmThrottle::new(Pin { duty: 7 }, 8.0);
        throttle.start();
        assert_eq!(throttle.pwm.duty, 0);

        throttle.set_speed(2.0);
        assert_eq!(throttle.pwm.duty, 250);
        assert_eq!(throttle.speed(), 2.0);

        throttle.set_speed(20.0);
        assert_eq!(throttle.pwm.duty, 1000);
        assert_eq!(throttle.speed(), 8.0);

        throttle.set_speed(-1.0);
        assert_eq!(throttle.pwm.duty, 0);
        assert_eq!(throttle.speed(), 0.0);
    }
}
