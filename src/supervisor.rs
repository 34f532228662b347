//! # Supervisor
//!
//! Owns the vehicle state, the operator references and the pending request flags, and runs the
//! fixed per-tick sequence:
//!
//! 1. snapshot the sensors
//! 2. advance the indicator timing
//! 3. evaluate the current state's transition rules
//! 4. on a transition: arm the steering actuator if the target needs it, clear the consumed
//!    flags, commit the state and apply its entry effects
//! 5. run the action of the (new) current state
//! 6. emit one status record
//! 7. take at most one inbound command
//!
//! Everything happens on the caller's thread inside [`Supervisor::tick`]; the only wait that is
//! not bounded is the [`ArmPolicy::UntilArmed`](crate::handshake::ArmPolicy::UntilArmed)
//! handshake.

use micromath::F32Ext;

use crate::config::{ConfigError, GRAVITY, SupervisorConfig};
use crate::control::{BalanceController, BalanceInput};
use crate::devices::{
    ActuatorMode, Indicator, InertialSensor, PropulsionDrive, SteeringActuator, Timebase,
};
use crate::handshake::{self, ArmError};
use crate::indicator::IndicatorProfile;
use crate::link::{Command, StatusRecord, TelemetryLink};
use crate::rules::{self, RuleInput};
use crate::state::{ReferenceSetpoint, RequestFlags, SensorSnapshot, VehicleState};
use crate::vehicle_fsm::{VehicleContext, VehicleEvent, VehicleFsm};

/// Coded alerts reporting calibration results.
pub mod alert {
    pub const GYRO_OK: u8 = 0b0111_0111;
    pub const GYRO_FAIL: u8 = 0b1000_1000;
    pub const ACCEL_OK: u8 = 0b1010_1010;
    pub const ACCEL_FAIL: u8 = 0b0011_0011;
}

/// Startup beep length (ms).
const STARTUP_BEEP_MS: u16 = 100;

/// The vehicle hardware the supervisor drives.
pub struct Devices<S, A, P, I> {
    pub imu: S,
    pub steering: A,
    pub propulsion: P,
    pub indicator: I,
}

/// What happened during one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickOutcome {
    /// State at the end of the tick.
    pub state: VehicleState,
    /// `(from, to)` if the state changed.
    pub transition: Option<(VehicleState, VehicleState)>,
    /// Arm handshake failure that forced an emergency stop.
    pub fault: Option<ArmError>,
}

/// Actuator mode a state drives the steering in, if any.
pub fn engaged_mode(state: VehicleState) -> Option<ActuatorMode> {
    match state {
        VehicleState::Manual | VehicleState::Assist => Some(ActuatorMode::PositionProfile),
        VehicleState::Auto => Some(ActuatorMode::TorqueProfile),
        _ => None,
    }
}

pub struct Supervisor<S, A, P, I, L, T> {
    devices: Devices<S, A, P, I>,
    link: L,
    clock: T,
    config: SupervisorConfig,

    fsm: VehicleFsm,
    fsm_ctx: VehicleContext,

    flags: RequestFlags,
    reference: ReferenceSetpoint,
    snapshot: SensorSnapshot,

    balance: BalanceController,
    /// Time of the previous Auto action; `None` until the first one after entering Auto.
    last_auto_us: Option<u64>,
}

impl<S, A, P, I, L, T> Supervisor<S, A, P, I, L, T>
where
    S: InertialSensor,
    A: SteeringActuator,
    P: PropulsionDrive,
    I: Indicator,
    L: TelemetryLink,
    T: Timebase,
{
    /// Build a supervisor in Idle. Nothing is sent to the hardware until [`Supervisor::start`].
    pub fn new(
        devices: Devices<S, A, P, I>,
        link: L,
        clock: T,
        config: SupervisorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut fsm_ctx = VehicleContext::default();
        let mut fsm = VehicleFsm::Idle;
        fsm.init(&mut fsm_ctx);

        Ok(Self {
            devices,
            link,
            clock,
            config,
            fsm,
            fsm_ctx,
            flags: RequestFlags::empty(),
            reference: ReferenceSetpoint::default(),
            snapshot: SensorSnapshot::default(),
            balance: BalanceController::new(config.balance),
            last_auto_us: None,
        })
    }

    /// Bring up the collaborators: indicator first so the rider sees the board is alive, then the
    /// drives and the sensor, and finally the link.
    pub fn start(&mut self) {
        let d = &mut self.devices;
        d.indicator.start();
        d.indicator.beep(STARTUP_BEEP_MS);
        IndicatorProfile::STARTUP.apply(&mut d.indicator);

        d.steering.start();
        d.propulsion.start();
        d.imu.start();
        self.link.start();

        self.apply_entry_effects();
        log_info!("supervisor started in {}", self.state().name());
    }

    /// Run one pass of the control loop.
    pub fn tick(&mut self) -> TickOutcome {
        let now_us = self.clock.now_us();

        self.snapshot = self.read_sensors();
        self.devices.indicator.update(now_us);

        let from = self.state();
        let mut outcome = TickOutcome {
            state: from,
            transition: None,
            fault: None,
        };

        let input = RuleInput {
            snapshot: &self.snapshot,
            flags: self.flags,
            config: &self.config,
        };
        if let Some(rule) = rules::evaluate(from, &input) {
            let mut target = rule.target;
            let mut clears = rule.clears;

            if let Some(mode) = engaged_mode(target) {
                if let Err(fault) = handshake::arm(
                    &mut self.devices.steering,
                    &mut self.clock,
                    mode,
                    self.config.arm_policy,
                ) {
                    log_error!("{} -> {} aborted: {}", from.name(), target.name(), fault);
                    outcome.fault = Some(fault);
                    target = VehicleState::EmergencyStop;
                    clears = RequestFlags::empty();
                }
            }

            self.flags.remove(clears);
            self.commit(target);
            log_info!("{} -> {} ({})", from.name(), target.name(), rule.name);
            outcome.transition = Some((from, target));
        }

        self.run_action(now_us);
        self.report(now_us);
        self.poll_command();

        outcome.state = self.state();
        outcome
    }

    /// Apply an operator command.
    pub fn apply_command(&mut self, command: Command) {
        match command {
            Command::SetSpeed(mps) => {
                self.reference.speed = mps;
                self.devices.propulsion.set_speed(mps);
            }
            Command::SetSteering(rad) => self.reference.steer = rad,
            Command::Requests { raw, update } => self.flags.apply(raw, update),
        }
    }

    /// Stop propulsion, release the steering and darken the indicator.
    pub fn shutdown(&mut self) {
        self.devices.propulsion.set_speed(0.0);
        self.devices.steering.set_mode(ActuatorMode::Disabled);
        IndicatorProfile::OFF.apply(&mut self.devices.indicator);
        self.devices.indicator.update(self.clock.now_us());
        log_warn!("supervisor shut down in {}", self.state().name());
    }

    pub fn state(&self) -> VehicleState {
        self.fsm.state()
    }

    pub fn flags(&self) -> RequestFlags {
        self.flags
    }

    pub fn reference(&self) -> ReferenceSetpoint {
        self.reference
    }

    /// Measurements taken at the start of the last tick.
    pub fn snapshot(&self) -> &SensorSnapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn devices(&self) -> &Devices<S, A, P, I> {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut Devices<S, A, P, I> {
        &mut self.devices
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn read_sensors(&mut self) -> SensorSnapshot {
        let d = &mut self.devices;
        d.imu.update();
        d.steering.update();

        SensorSnapshot {
            roll: d.imu.accel_y().atan2(d.imu.accel_z()),
            roll_rate: d.imu.gyro_x(),
            steer: d.steering.position(),
            steer_rate: d.steering.velocity(),
            torque: d.steering.torque(),
            speed: d.propulsion.speed(),
        }
    }

    fn commit(&mut self, target: VehicleState) {
        self.fsm
            .dispatch(&mut self.fsm_ctx, &VehicleEvent::Commit(target));
        self.apply_entry_effects();
    }

    /// Push what the entry hook of the current state asked for to the hardware.
    fn apply_entry_effects(&mut self) {
        if let Some(profile) = self.fsm_ctx.pending_profile.take() {
            profile.apply(&mut self.devices.indicator);
        }
        if core::mem::take(&mut self.fsm_ctx.halt_propulsion) {
            self.devices.propulsion.set_speed(0.0);
        }
        if core::mem::take(&mut self.fsm_ctx.reset_balance) {
            self.balance.reset();
            self.last_auto_us = None;
        }
    }

    fn run_action(&mut self, now_us: u64) {
        match self.state() {
            VehicleState::Calibrating => self.calibrate(),
            VehicleState::Assist => {
                let error = self.snapshot.steer - self.reference.steer;
                self.devices.steering.set_position(error);
            }
            VehicleState::Auto => {
                let dt = match self.last_auto_us {
                    Some(prev) => now_us.saturating_sub(prev) as f32 / 1_000_000.0,
                    None => 0.0,
                };
                self.last_auto_us = Some(now_us);

                let input = BalanceInput {
                    roll: self.snapshot.roll,
                    steer: self.snapshot.steer,
                    roll_rate: self.snapshot.roll_rate,
                    steer_rate: self.snapshot.steer_rate,
                    roll_ref: self.config.roll_reference,
                    steer_ref: self.reference.steer,
                };
                let torque = self.balance.control(&input, dt);
                self.devices.steering.set_torque(torque);
            }
            VehicleState::Idle
            | VehicleState::Manual
            | VehicleState::Fallen
            | VehicleState::EmergencyStop => {}
        }
    }

    /// Zero the gyros and the accelerometer and announce each result with a coded alert.
    fn calibrate(&mut self) {
        let d = &mut self.devices;

        if d.imu.calibrate_gyros() {
            log_info!("gyro calibration ok");
            d.indicator.beep_pattern(alert::GYRO_OK);
        } else {
            log_warn!("gyro calibration failed");
            d.indicator.beep_pattern(alert::GYRO_FAIL);
        }

        if d.imu.calibrate_accel(0.0, 0.0, GRAVITY) {
            log_info!("accelerometer calibration ok");
            d.indicator.beep_pattern(alert::ACCEL_OK);
        } else {
            log_warn!("accelerometer calibration failed");
            d.indicator.beep_pattern(alert::ACCEL_FAIL);
        }
    }

    fn report(&mut self, now_us: u64) {
        let uptime_s = (now_us / 1_000) as f32 / 1_000.0;
        let record = StatusRecord::new(self.state(), &self.snapshot, uptime_s);
        self.link.send_status(&record);
    }

    fn poll_command(&mut self) {
        if !self.link.available() {
            return;
        }
        self.clock.delay_ms(self.config.command_settle_ms);
        if let Some(command) = self.link.read_command() {
            log_debug!("command received");
            self.apply_command(command);
        }
    }
}
