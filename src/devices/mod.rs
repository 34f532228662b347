//! # Collaborator contracts and board drivers
//!
//! The supervisor talks to the vehicle only through the traits in this module. The submodules
//! are the drivers the firmware plugs in on the Pico 2 board:
//!
//! - [`mpu6050`] – MPU-6050 inertial sensor over I2C
//! - [`mcp2515`] – MCP2515 SPI CAN controller, the fieldbus port
//! - [`cia402`] – CiA 402 steering servo drive on top of a [`Fieldbus`]
//! - [`throttle`] – PWM throttle for the propulsion motor controller
//! - [`rgb_indicator`] – RGB status LED and buzzer

use core::fmt;

use embedded_hal::delay::DelayNs;

pub mod cia402;
pub mod mcp2515;
pub mod mpu6050;
pub mod rgb_indicator;
pub mod throttle;

pub use cia402::Cia402Drive;
pub use mcp2515::Mcp2515;
pub use mpu6050::Mpu6050;
pub use rgb_indicator::RgbIndicator;
pub use throttle::PwmThrottle;

/// Steering actuator control mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum ActuatorMode {
    /// Commands are target positions (rad).
    PositionProfile,
    /// Commands are target torques (N·m).
    TorqueProfile,
    /// Power stage off.
    Disabled,
}

impl fmt::Display for ActuatorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActuatorMode::PositionProfile => "PositionProfile",
            ActuatorMode::TorqueProfile => "TorqueProfile",
            ActuatorMode::Disabled => "Disabled",
        })
    }
}

/// 8-bit RGB colour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
}

/// Inertial measurement unit.
pub trait InertialSensor {
    fn start(&mut self);
    /// Sample the sensor once.
    fn update(&mut self);
    /// Zero the gyroscope. Returns `true` on success.
    fn calibrate_gyros(&mut self) -> bool;
    /// Calibrate the accelerometer against the expected gravity vector (m/s²).
    fn calibrate_accel(&mut self, gx: f32, gy: f32, gz: f32) -> bool;
    /// Lateral acceleration (m/s²).
    fn accel_y(&self) -> f32;
    /// Vertical acceleration (m/s²).
    fn accel_z(&self) -> f32;
    /// Roll rate (rad/s).
    fn gyro_x(&self) -> f32;
}

/// Fieldbus-controlled steering actuator.
pub trait SteeringActuator {
    fn start(&mut self);
    /// Refresh position, velocity and torque feedback.
    fn update(&mut self);
    fn set_mode(&mut self, mode: ActuatorMode);
    /// Advance the enable sequence by one poll. Returns `true` once the drive is armed.
    fn enable_operation(&mut self) -> bool;
    /// Target position (rad).
    fn set_position(&mut self, rad: f32);
    /// Target torque (N·m).
    fn set_torque(&mut self, nm: f32);
    fn position(&self) -> f32;
    fn velocity(&self) -> f32;
    fn torque(&self) -> f32;
}

/// Open-loop propulsion motor.
pub trait PropulsionDrive {
    fn start(&mut self);
    /// Commanded speed (m/s).
    fn set_speed(&mut self, mps: f32);
    /// Current speed (m/s).
    fn speed(&self) -> f32;
}

/// Visual and audible status signalling.
pub trait Indicator {
    fn start(&mut self);
    /// Advance blink, pulse and beep timing.
    fn update(&mut self, now_us: u64);
    fn set_steady(&mut self, color: Rgb);
    fn set_blink(&mut self, color: Rgb);
    /// Alternate to the blink colour for `on_ms`, then the steady colour for `off_ms`.
    fn set_pulse(&mut self, on_ms: u16, off_ms: u16);
    fn disable_pulse(&mut self);
    /// Short alert tone.
    fn beep(&mut self, ms: u16);
    /// Coded alert: one slot per bit, MSB first, tone on for set bits.
    fn beep_pattern(&mut self, pattern: u8);
}

/// Monotonic time plus blocking delays.
pub trait Timebase: DelayNs {
    /// Microseconds since boot.
    fn now_us(&self) -> u64;
}

/// Raw CAN frame with a standard 11-bit identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u16,
    pub len: u8,
    pub data: [u8; 8],
}

impl CanFrame {
    /// Build a data frame. Returns `None` if `payload` is longer than 8 bytes.
    pub fn new(id: u16, payload: &[u8]) -> Option<Self> {
        if payload.len() > 8 {
            return None;
        }
        let mut data = [0u8; 8];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            id: id & 0x7FF,
            len: payload.len() as u8,
            data,
        })
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.len.min(8))]
    }
}

/// Frame-level access to the fieldbus.
pub trait Fieldbus {
    type Error: fmt::Debug;

    fn transmit(&mut self, frame: &CanFrame) -> Result<(), Self::Error>;
    /// Non-blocking receive.
    fn receive(&mut self) -> Result<Option<CanFrame>, Self::Error>;
}
