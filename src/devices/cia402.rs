//! CiA 402 servo drive used as the steering actuator.
//!
//! The drive is reached through expedited SDO transfers on a [`Fieldbus`]. Every access is a
//! request/response pair with a bounded wait for the reply.
//!
//! Units on the bus are motor-side encoder counts and per-mille of rated torque; this driver
//! converts to steering-column radians and N·m with the configured gear ratio.

use core::f32::consts::PI;

use micromath::F32Ext;

use super::{ActuatorMode, CanFrame, Fieldbus, SteeringActuator};

// Object dictionary entries
pub mod od {
    pub const CONTROLWORD: u16 = 0x6040;
    pub const STATUSWORD: u16 = 0x6041;
    pub const MODES_OF_OPERATION: u16 = 0x6060;
    pub const POSITION_ACTUAL: u16 = 0x6064;
    pub const VELOCITY_ACTUAL: u16 = 0x606C;
    pub const TARGET_TORQUE: u16 = 0x6071;
    pub const MAX_TORQUE: u16 = 0x6072;
    pub const MAX_CURRENT: u16 = 0x6073;
    pub const TORQUE_ACTUAL: u16 = 0x6077;
    pub const TARGET_POSITION: u16 = 0x607A;
    pub const PROFILE_VELOCITY: u16 = 0x6081;
    pub const PROFILE_ACCELERATION: u16 = 0x6083;
    pub const PROFILE_DECELERATION: u16 = 0x6084;
    pub const TORQUE_SLOPE: u16 = 0x6087;
}

// Controlword commands
mod cw {
    pub const DISABLE_VOLTAGE: u16 = 0x0000;
    pub const SHUTDOWN: u16 = 0x0006;
    pub const SWITCH_ON: u16 = 0x0007;
    pub const ENABLE_OPERATION: u16 = 0x000F;
    /// Enable operation with "new set-point" and "change set immediately".
    pub const NEW_SETPOINT: u16 = 0x003F;
    pub const FAULT_RESET: u16 = 0x0080;
}

const MODE_PROFILE_POSITION: u8 = 1;
const MODE_PROFILE_TORQUE: u8 = 4;

const SDO_RX_BASE: u16 = 0x600;
const SDO_TX_BASE: u16 = 0x580;

/// Receive polls before an SDO request is given up.
const RESPONSE_POLLS: u32 = 500;

/// Error type for `Cia402Drive` operations.
#[derive(Debug)]
pub enum Error<E> {
    /// Fieldbus port error.
    Bus(E),
    /// No SDO reply within the poll budget.
    Timeout,
    /// The drive aborted the transfer with this abort code.
    Abort(u32),
    /// Reply did not look like an SDO response.
    Malformed,
}

/// Power state decoded from the statusword.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum PowerState {
    NotReady,
    SwitchOnDisabled,
    ReadyToSwitchOn,
    SwitchedOn,
    OperationEnabled,
    QuickStopActive,
    Fault,
}

impl PowerState {
    pub fn from_statusword(sw: u16) -> Self {
        if sw & 0x004F == 0x0008 {
            PowerState::Fault
        } else if sw & 0x004F == 0x0040 {
            PowerState::SwitchOnDisabled
        } else if sw & 0x006F == 0x0021 {
            PowerState::ReadyToSwitchOn
        } else if sw & 0x006F == 0x0023 {
            PowerState::SwitchedOn
        } else if sw & 0x006F == 0x0027 {
            PowerState::OperationEnabled
        } else if sw & 0x006F == 0x0007 {
            PowerState::QuickStopActive
        } else {
            PowerState::NotReady
        }
    }

    /// Controlword that moves one step closer to operation enabled.
    fn next_command(self) -> Option<u16> {
        match self {
            PowerState::Fault => Some(cw::FAULT_RESET),
            PowerState::SwitchOnDisabled | PowerState::QuickStopActive => Some(cw::SHUTDOWN),
            PowerState::ReadyToSwitchOn => Some(cw::SWITCH_ON),
            PowerState::SwitchedOn => Some(cw::ENABLE_OPERATION),
            PowerState::OperationEnabled | PowerState::NotReady => None,
        }
    }
}

/// Drive limits and unit conversion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriveConfig {
    pub node_id: u8,
    /// Per-mille of rated current.
    pub max_current: u16,
    /// Per-mille of rated torque.
    pub max_torque: u16,
    /// Per-mille of rated torque per second.
    pub torque_slope: u32,
    /// Steering-side profile velocity (rad/s).
    pub profile_velocity: f32,
    /// Steering-side profile acceleration (rad/s²).
    pub profile_acceleration: f32,
    /// Motor revolutions per steering revolution.
    pub gear_ratio: f32,
    pub counts_per_rev: u32,
    /// Motor rated torque (N·m).
    pub rated_torque: f32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            node_id: 127,
            max_current: 1000,
            max_torque: 1000,
            torque_slope: 10_000,
            profile_velocity: 8.0 * PI,
            profile_acceleration: 16.0 * PI,
            gear_ratio: 10.0,
            counts_per_rev: 4096,
            rated_torque: 0.5,
        }
    }
}

impl DriveConfig {
    fn counts_per_rad(&self) -> f32 {
        self.gear_ratio * self.counts_per_rev as f32 / (2.0 * PI)
    }

    fn rad_to_counts(&self, rad: f32) -> i32 {
        let counts = (rad * self.counts_per_rad()).round();
        counts.clamp(i32::MIN as f32, i32::MAX as f32) as i32
    }

    fn counts_to_rad(&self, counts: i32) -> f32 {
        counts as f32 / self.counts_per_rad()
    }

    /// Steering-side N·m to motor per-mille, saturated at the configured maximum.
    fn nm_to_permille(&self, nm: f32) -> i16 {
        let permille = nm / (self.gear_ratio * self.rated_torque) * 1000.0;
        let max = f32::from(self.max_torque.min(i16::MAX as u16));
        permille.clamp(-max, max) as i16
    }

    fn permille_to_nm(&self, permille: i16) -> f32 {
        f32::from(permille) / 1000.0 * self.rated_torque * self.gear_ratio
    }
}

pub struct Cia402Drive<B: Fieldbus> {
    bus: B,
    config: DriveConfig,
    mode: ActuatorMode,
    armed: bool,

    position: f32,
    velocity: f32,
    torque: f32,

    faults: u32,
}

impl<B: Fieldbus> Cia402Drive<B> {
    pub fn new(bus: B, config: DriveConfig) -> Self {
        Self {
            bus,
            config,
            mode: ActuatorMode::Disabled,
            armed: false,
            position: 0.0,
            velocity: 0.0,
            torque: 0.0,
            faults: 0,
        }
    }

    fn rx_id(&self) -> u16 {
        SDO_RX_BASE + u16::from(self.config.node_id)
    }

    fn tx_id(&self) -> u16 {
        SDO_TX_BASE + u16::from(self.config.node_id)
    }

    /// Wait for the SDO reply addressed to `index`/`sub`.
    fn await_reply(&mut self, index: u16, sub: u8) -> Result<[u8; 8], Error<B::Error>> {
        for _ in 0..RESPONSE_POLLS {
            let Some(frame) = self.bus.receive().map_err(Error::Bus)? else {
                continue;
            };
            if frame.id != self.tx_id() || frame.len < 4 {
                continue;
            }
            let d = frame.data;
            if u16::from_le_bytes([d[1], d[2]]) != index || d[3] != sub {
                continue;
            }
            if d[0] == 0x80 {
                return Err(Error::Abort(u32::from_le_bytes([d[4], d[5], d[6], d[7]])));
            }
            return Ok(d);
        }
        Err(Error::Timeout)
    }

    /// Expedited download of 1, 2 or 4 bytes.
    fn sdo_write(&mut self, index: u16, sub: u8, value: &[u8]) -> Result<(), Error<B::Error>> {
        let command = match value.len() {
            1 => 0x2F,
            2 => 0x2B,
            4 => 0x23,
            _ => return Err(Error::Malformed),
        };
        let mut payload = [0u8; 8];
        payload[0] = command;
        payload[1..3].copy_from_slice(&index.to_le_bytes());
        payload[3] = sub;
        payload[4..4 + value.len()].copy_from_slice(value);
        let frame = CanFrame::new(self.rx_id(), &payload).ok_or(Error::Malformed)?;
        self.bus.transmit(&frame).map_err(Error::Bus)?;

        let reply = self.await_reply(index, sub)?;
        if reply[0] != 0x60 {
            return Err(Error::Malformed);
        }
        Ok(())
    }

    /// Expedited upload, returned as a little-endian word.
    fn sdo_read(&mut self, index: u16, sub: u8) -> Result<u32, Error<B::Error>> {
        let mut payload = [0u8; 8];
        payload[0] = 0x40;
        payload[1..3].copy_from_slice(&index.to_le_bytes());
        payload[3] = sub;
        let frame = CanFrame::new(self.rx_id(), &payload).ok_or(Error::Malformed)?;
        self.bus.transmit(&frame).map_err(Error::Bus)?;

        let reply = self.await_reply(index, sub)?;
        if reply[0] & 0xE3 != 0x43 {
            return Err(Error::Malformed);
        }
        Ok(u32::from_le_bytes([reply[4], reply[5], reply[6], reply[7]]))
    }

    fn controlword(&mut self, word: u16) -> Result<(), Error<B::Error>> {
        self.sdo_write(od::CONTROLWORD, 0, &word.to_le_bytes())
    }

    pub fn power_state(&mut self) -> Result<PowerState, Error<B::Error>> {
        let sw = self.sdo_read(od::STATUSWORD, 0)? as u16;
        Ok(PowerState::from_statusword(sw))
    }

    fn configure(&mut self) -> Result<(), Error<B::Error>> {
        let c = self.config;
        let counts_per_rad = c.counts_per_rad();
        let velocity = (c.profile_velocity * counts_per_rad) as u32;
        let acceleration = (c.profile_acceleration * counts_per_rad) as u32;

        self.controlword(cw::FAULT_RESET)?;
        self.sdo_write(od::MAX_CURRENT, 0, &c.max_current.to_le_bytes())?;
        self.sdo_write(od::MAX_TORQUE, 0, &c.max_torque.to_le_bytes())?;
        self.sdo_write(od::TORQUE_SLOPE, 0, &c.torque_slope.to_le_bytes())?;
        self.sdo_write(od::PROFILE_VELOCITY, 0, &velocity.to_le_bytes())?;
        self.sdo_write(od::PROFILE_ACCELERATION, 0, &acceleration.to_le_bytes())?;
        self.sdo_write(od::PROFILE_DECELERATION, 0, &acceleration.to_le_bytes())?;
        self.controlword(cw::SHUTDOWN)
    }

    fn refresh(&mut self) -> Result<(), Error<B::Error>> {
        let position = self.sdo_read(od::POSITION_ACTUAL, 0)? as i32;
        let velocity = self.sdo_read(od::VELOCITY_ACTUAL, 0)? as i32;
        let torque = self.sdo_read(od::TORQUE_ACTUAL, 0)? as u16 as i16;
        self.position = self.config.counts_to_rad(position);
        self.velocity = self.config.counts_to_rad(velocity);
        self.torque = self.config.permille_to_nm(torque);
        Ok(())
    }

    fn apply_mode(&mut self, mode: ActuatorMode) -> Result<(), Error<B::Error>> {
        match mode {
            ActuatorMode::PositionProfile => {
                self.sdo_write(od::MODES_OF_OPERATION, 0, &[MODE_PROFILE_POSITION])
            }
            ActuatorMode::TorqueProfile => {
                // Start from zero torque so the switch does not kick the column.
                self.sdo_write(od::TARGET_TORQUE, 0, &0i16.to_le_bytes())?;
                self.sdo_write(od::MODES_OF_OPERATION, 0, &[MODE_PROFILE_TORQUE])
            }
            ActuatorMode::Disabled => self.controlword(cw::DISABLE_VOLTAGE),
        }
    }

    fn note_fault(&mut self, what: &str) {
        self.faults = self.faults.saturating_add(1);
        log_debug!("steering drive: {} failed", what);
    }

    /// Failed bus transactions since start.
    pub fn fault_count(&self) -> u32 {
        self.faults
    }

    pub fn free(self) -> B {
        self.bus
    }
}

impl<B: Fieldbus> SteeringActuator for Cia402Drive<B> {
    fn start(&mut self) {
        if self.configure().is_err() {
            self.note_fault("configure");
        }
    }

    fn update(&mut self) {
        if self.refresh().is_err() {
            self.note_fault("feedback");
        }
    }

    fn set_mode(&mut self, mode: ActuatorMode) {
        self.mode = mode;
        self.armed = false;
        if self.apply_mode(mode).is_err() {
            self.note_fault("mode select");
        }
    }

    fn enable_operation(&mut self) -> bool {
        if self.mode == ActuatorMode::Disabled {
            return false;
        }
        let state = match self.power_state() {
            Ok(state) => state,
            Err(_) => {
                self.note_fault("statusword");
                return false;
            }
        };
        if state == PowerState::OperationEnabled {
            self.armed = true;
            return true;
        }
        if let Some(word) = state.next_command() {
            if self.controlword(word).is_err() {
                self.note_fault("controlword");
            }
        }
        false
    }

    fn set_position(&mut self, rad: f32) {
        if !self.armed || self.mode != ActuatorMode::PositionProfile {
            return;
        }
        let counts = self.config.rad_to_counts(rad);
        let result = self
            .sdo_write(od::TARGET_POSITION, 0, &counts.to_le_bytes())
            .and_then(|_| self.controlword(cw::NEW_SETPOINT))
            .and_then(|_| self.controlword(cw::ENABLE_OPERATION));
        if result.is_err() {
            self.note_fault("position");
        }
    }

    fn set_torque(&mut self, nm: f32) {
        if !self.armed || self.mode != ActuatorMode::TorqueProfile {
            return;
        }
        let permille = self.config.nm_to_permille(nm);
        if self
            .sdo_write(od::TARGET_TORQUE, 0, &permille.to_le_bytes())
            .is_err()
        {
            self.note_fault("torque");
        }
    }

    fn position(&self) -> f32 {
        self.position
    }

    fn velocity(&self) -> f32 {
        self.velocity
    }

    fn torque(&self) -> f32 {
        self.torque
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::collections::{BTreeMap, VecDeque};

    /// In-memory drive: answers SDO requests and walks the power state machine on controlwords.
    struct FakeDrive {
        node: u8,
        objects: BTreeMap<u16, u32>,
        replies: VecDeque<CanFrame>,
        writes: std::vec::Vec<(u16, u32)>,
    }

    impl FakeDrive {
        fn new(node: u8) -> Self {
            let mut objects = BTreeMap::new();
            objects.insert(od::STATUSWORD, 0x0040);
            Self {
                node,
                objects,
                replies: VecDeque::new(),
                writes: std::vec::Vec::new(),
            }
        }

        fn on_controlword(&mut self, word: u16) {
            let sw = self.objects[&od::STATUSWORD] as u16;
            let next = match (PowerState::from_statusword(sw), word) {
                (PowerState::Fault, cw::FAULT_RESET) => 0x0040,
                (_, cw::SHUTDOWN) => 0x0021,
                (PowerState::ReadyToSwitchOn, cw::SWITCH_ON) => 0x0023,
                (PowerState::SwitchedOn, cw::ENABLE_OPERATION) => 0x0027,
                (_, cw::DISABLE_VOLTAGE) => 0x0040,
                _ => sw,
            };
            self.objects.insert(od::STATUSWORD, u32::from(next));
        }
    }

    impl Fieldbus for FakeDrive {
        type Error = Infallible;

        fn transmit(&mut self, frame: &CanFrame) -> Result<(), Infallible> {
            assert_eq!(frame.id, 0x600 + u16::from(self.node));
            let d = frame.data;
            let index = u16::from_le_bytes([d[1], d[2]]);
            let mut reply = [0u8; 8];
            reply[1..4].copy_from_slice(&d[1..4]);
            if d[0] == 0x40 {
                reply[0] = 0x43;
                let value = self.objects.get(&index).copied().unwrap_or(0);
                reply[4..8].copy_from_slice(&value.to_le_bytes());
            } else {
                reply[0] = 0x60;
                let value = u32::from_le_bytes([d[4], d[5], d[6], d[7]]);
                self.writes.push((index, value));
                if index == od::CONTROLWORD {
                    self.on_controlword(value as u16);
                } else {
                    self.objects.insert(index, value);
                }
            }
            self.replies
                .push_back(CanFrame::new(0x580 + u16::from(self.node), &reply).unwrap());
            Ok(())
        }

        fn receive(&mut self) -> Result<Option<CanFrame>, Infallible> {
            Ok(self.replies.pop_front())
        }
    }

    fn drive() -> Cia402Drive<FakeDrive> {
        let mut drive = Cia402Drive::new(FakeDrive::new(127), DriveConfig::default());
        drive.start();
        drive
    }

    #[test]
    fn enable_walks_the_power_state_machine() {
        let mut drive = drive();
        drive.set_mode(ActuatorMode::PositionProfile);
        assert_eq!(drive.bus.objects[&od::MODES_OF_OPERATION], 1);

        // Ready to switch on -> switched on -> operation enabled.
        assert!(!drive.enable_operation());
        assert!(!drive.enable_operation());
        assert!(drive.enable_operation());
        assert_eq!(drive.fault_count(), 0);
    }

    #[test]
    fn commands_are_ignored_until_armed_in_matching_mode() {
        let mut drive = drive();
        drive.set_mode(ActuatorMode::TorqueProfile);
        drive.set_torque(1.0);
        assert!(!drive.bus.writes.iter().any(|&(i, v)| i == od::TARGET_TORQUE && v != 0));

        while !drive.enable_operation() {}
        drive.set_position(0.3);
        assert!(!drive.bus.objects.contains_key(&od::TARGET_POSITION));

        drive.set_torque(1.0);
        // 1 N·m at the column over a 10:1 gear and 0.5 N·m rated motor = 200 per-mille.
        assert_eq!(drive.bus.objects[&od::TARGET_TORQUE], 200);
    }

    #[test]
    fn position_target_is_scaled_to_motor_counts() {
        let mut drive = drive();
        drive.set_mode(ActuatorMode::PositionProfile);
        while !drive.enable_operation() {}

        drive.set_position(PI / 2.0);
        let counts = drive.bus.objects[&od::TARGET_POSITION] as i32;
        assert_eq!(counts, 10 * 4096 / 4);
    }

    #[test]
    fn feedback_is_converted_back() {
        let mut drive = drive();
        drive
            .bus
            .objects
            .insert(od::POSITION_ACTUAL, (-(10 * 4096 / 4) as i32) as u32);
        drive.bus.objects.insert(od::TORQUE_ACTUAL, (-100i16) as u16 as u32);
        drive.update();

        assert!((drive.position() + PI / 2.0).abs() < 1e-4);
        assert!((drive.torque() + 0.5).abs() < 1e-6);
    }

    #[test]
    fn silent_bus_times_out() {
        struct Silent;
        impl Fieldbus for Silent {
            type Error = Infallible;
            fn transmit(&mut self, _frame: &CanFrame) -> Result<(), Infallible> {
                Ok(())
            }
            fn receive(&mut self) -> Result<Option<CanFrame>, Infallible> {
                Ok(None)
            }
        }

        let mut drive = Cia402Drive::new(Silent, DriveConfig::default());
        drive.set_mode(ActuatorMode::PositionProfile);
        assert!(!drive.enable_operation());
        assert!(matches!(drive.power_state(), Err(Error::Timeout)));
        assert_eq!(drive.fault_count(), 2);
    }
}
