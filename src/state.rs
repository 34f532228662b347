//! Vehicle state and the per-tick data the supervisor works on.

use core::fmt;

use bitflags::bitflags;

/// Operating mode of the vehicle.
///
/// The discriminant is the state byte carried in telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
#[repr(u8)]
pub enum VehicleState {
    Idle = 0,
    Calibrating = 1,
    Manual = 2,
    Assist = 3,
    Auto = 4,
    Fallen = 5,
    EmergencyStop = 6,
}

impl VehicleState {
    pub const ALL: [VehicleState; 7] = [
        VehicleState::Idle,
        VehicleState::Calibrating,
        VehicleState::Manual,
        VehicleState::Assist,
        VehicleState::Auto,
        VehicleState::Fallen,
        VehicleState::EmergencyStop,
    ];

    /// Wire encoding of this state.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            VehicleState::Idle => "Idle",
            VehicleState::Calibrating => "Calibrating",
            VehicleState::Manual => "Manual",
            VehicleState::Assist => "Assist",
            VehicleState::Auto => "Auto",
            VehicleState::Fallen => "Fallen",
            VehicleState::EmergencyStop => "EmergencyStop",
        }
    }
}

/// Raw state byte that names no known state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownState(pub u8);

impl TryFrom<u8> for VehicleState {
    type Error = UnknownState;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        VehicleState::ALL
            .iter()
            .copied()
            .find(|s| s.as_u8() == raw)
            .ok_or(UnknownState(raw))
    }
}

impl fmt::Display for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Sticky operator requests.
    ///
    /// Set by inbound commands and cleared only by the transition that consumes them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RequestFlags: u8 {
        /// Run sensor calibration from Idle.
        const CALIBRATE = 0b0000_0001;
        /// Enter manual steering from Idle.
        const MANUAL = 0b0000_0010;
        /// Emergency stop while riding.
        const STOP = 0b0000_0100;
        /// Leave Manual or EmergencyStop.
        const RESUME = 0b0000_1000;
    }
}

/// How an inbound flag byte is combined with the pending set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum FlagUpdate {
    /// The byte replaces the whole set.
    Replace,
    /// The byte is OR-ed into the set.
    Merge,
}

impl RequestFlags {
    /// Apply a raw request byte. Undefined bits are kept as received.
    pub fn apply(&mut self, raw: u8, update: FlagUpdate) {
        let incoming = RequestFlags::from_bits_retain(raw);
        match update {
            FlagUpdate::Replace => *self = incoming,
            FlagUpdate::Merge => *self |= incoming,
        }
    }
}

/// One tick's worth of measurements.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SensorSnapshot {
    /// Roll angle φ (rad).
    pub roll: f32,
    /// Roll rate φ̇ (rad/s).
    pub roll_rate: f32,
    /// Steering angle δ (rad).
    pub steer: f32,
    /// Steering rate δ̇ (rad/s).
    pub steer_rate: f32,
    /// Steering actuator torque (N·m).
    pub torque: f32,
    /// Propulsion speed v (m/s).
    pub speed: f32,
}

/// Operator setpoints, changed only by inbound commands.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReferenceSetpoint {
    /// Target steering angle δ_r (rad).
    pub steer: f32,
    /// Target propulsion speed v_r (m/s).
    pub speed: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_bytes_match_wire_encoding() {
        for (i, s) in VehicleState::ALL.iter().enumerate() {
            assert_eq!(s.as_u8() as usize, i);
            assert_eq!(VehicleState::try_from(i as u8), Ok(*s));
        }
        assert_eq!(VehicleState::try_from(7), Err(UnknownState(7)));
    }

    #[test]
    fn replace_assigns_and_merge_accumulates() {
        let mut flags = RequestFlags::STOP;
        flags.apply(0b0000_1000, FlagUpdate::Merge);
        assert_eq!(flags, RequestFlags::STOP | RequestFlags::RESUME);

        flags.apply(0b0000_0001, FlagUpdate::Replace);
        assert_eq!(flags, RequestFlags::CALIBRATE);
    }

    #[test]
    fn undefined_bits_survive_replace() {
        let mut flags = RequestFlags::empty();
        flags.apply(0b1000_0010, FlagUpdate::Replace);
        assert!(flags.contains(RequestFlags::MANUAL));
        assert_eq!(flags.bits(), 0b1000_0010);
    }
}
