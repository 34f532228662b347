//! Typed state machine holding the supervisory state.
//!
//! Rule evaluation and the arm handshake happen in the supervisor; the machine only accepts the
//! decided target. Entry hooks publish each state's side effects into the context and the
//! supervisor applies them to the hardware right after the dispatch.

use typed_fsm::{state_machine, Transition};

use crate::indicator::IndicatorProfile;
use crate::state::VehicleState;

// FSM Context
#[derive(Debug, Default)]
pub struct VehicleContext {
    /// Indicator look of the state just entered, not yet shown.
    pub pending_profile: Option<IndicatorProfile>,
    /// Set the propulsion speed to zero.
    pub halt_propulsion: bool,
    /// Clear the balance law history and restart its clock.
    pub reset_balance: bool,
}

// FSM Events
#[derive(Clone, Copy, Debug)]
pub enum VehicleEvent {
    /// Move to the given state.
    Commit(VehicleState),
}

state_machine! {
    Name: VehicleFsm,
    Context: VehicleContext,
    Event: VehicleEvent,
    States: {
        Idle => {
            entry: |ctx| {
                ctx.pending_profile = Some(IndicatorProfile::IDLE);
            }
            process: |_ctx, evt| {
                match evt {
                    VehicleEvent::Commit(VehicleState::Idle) => Transition::None,
                    VehicleEvent::Commit(target) => Transition::To(VehicleFsm::from_state(*target)),
                }
            }
        },

        Calibrating => {
            entry: |ctx| {
                ctx.pending_profile = Some(IndicatorProfile::CALIBRATING);
            }
            process: |_ctx, evt| {
                match evt {
                    VehicleEvent::Commit(VehicleState::Calibrating) => Transition::None,
                    VehicleEvent::Commit(target) => Transition::To(VehicleFsm::from_state(*target)),
                }
            }
        },

        Manual => {
            entry: |ctx| {
                ctx.pending_profile = Some(IndicatorProfile::MANUAL);
            }
            process: |_ctx, evt| {
                match evt {
                    VehicleEvent::Commit(VehicleState::Manual) => Transition::None,
                    VehicleEvent::Commit(target) => Transition::To(VehicleFsm::from_state(*target)),
                }
            }
        },

        Assist => {
            entry: |ctx| {
                ctx.pending_profile = Some(IndicatorProfile::ASSIST);
            }
            process: |_ctx, evt| {
                match evt {
                    VehicleEvent::Commit(VehicleState::Assist) => Transition::None,
                    VehicleEvent::Commit(target) => Transition::To(VehicleFsm::from_state(*target)),
                }
            }
        },

        Auto => {
            entry: |ctx| {
                ctx.pending_profile = Some(IndicatorProfile::AUTO);
                ctx.reset_balance = true;
            }
            process: |_ctx, evt| {
                match evt {
                    VehicleEvent::Commit(VehicleState::Auto) => Transition::None,
                    VehicleEvent::Commit(target) => Transition::To(VehicleFsm::from_state(*target)),
                }
            }
        },

        Fallen => {
            entry: |ctx| {
                ctx.pending_profile = Some(IndicatorProfile::FALLEN);
            }
            process: |_ctx, evt| {
                match evt {
                    VehicleEvent::Commit(VehicleState::Fallen) => Transition::None,
                    VehicleEvent::Commit(target) => Transition::To(VehicleFsm::from_state(*target)),
                }
            }
        },

        EmergencyStop => {
            entry: |ctx| {
                ctx.pending_profile = Some(IndicatorProfile::EMERGENCY_STOP);
                ctx.halt_propulsion = true;
            }
            process: |_ctx, evt| {
                match evt {
                    VehicleEvent::Commit(VehicleState::EmergencyStop) => Transition::None,
                    VehicleEvent::Commit(target) => Transition::To(VehicleFsm::from_state(*target)),
                }
            }
        }
    }
}

impl VehicleFsm {
    pub fn from_state(state: VehicleState) -> Self {
        match state {
            VehicleState::Idle => VehicleFsm::Idle,
            VehicleState::Calibrating => VehicleFsm::Calibrating,
            VehicleState::Manual => VehicleFsm::Manual,
            VehicleState::Assist => VehicleFsm::Assist,
            VehicleState::Auto => VehicleFsm::Auto,
            VehicleState::Fallen => VehicleFsm::Fallen,
            VehicleState::EmergencyStop => VehicleFsm::EmergencyStop,
        }
    }

    pub fn state(&self) -> VehicleState {
        match self {
            VehicleFsm::Idle => VehicleState::Idle,
            VehicleFsm::Calibrating => VehicleState::Calibrating,
            VehicleFsm::Manual => VehicleState::Manual,
            VehicleFsm::Assist => VehicleState::Assist,
            VehicleFsm::Auto => VehicleState::Auto,
            VehicleFsm::Fallen => VehicleState::Fallen,
            VehicleFsm::EmergencyStop => VehicleState::EmergencyStop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_publishes_idle_profile() {
        let mut ctx = VehicleContext::default();
        let mut fsm = VehicleFsm::Idle;
        fsm.init(&mut ctx);
        assert_eq!(fsm.state(), VehicleState::Idle);
        assert_eq!(ctx.pending_profile, Some(IndicatorProfile::IDLE));
    }

    #[test]
    fn commit_runs_entry_hooks() {
        let mut ctx = VehicleContext::default();
        let mut fsm = VehicleFsm::Idle;
        fsm.init(&mut ctx);

        fsm.dispatch(&mut ctx, &VehicleEvent::Commit(VehicleState::EmergencyStop));
        assert_eq!(fsm.state(), VehicleState::EmergencyStop);
        assert!(ctx.halt_propulsion);
        assert_eq!(ctx.pending_profile, Some(IndicatorProfile::EMERGENCY_STOP));

        ctx = VehicleContext::default();
        fsm.dispatch(&mut ctx, &VehicleEvent::Commit(VehicleState::Auto));
        assert!(ctx.reset_balance);
        assert!(!ctx.halt_propulsion);
    }

    #[test]
    fn every_state_is_reachable_and_maps_back() {
        for target in VehicleState::ALL {
            let mut ctx = VehicleContext::default();
            let mut fsm = VehicleFsm::Idle;
            fsm.init(&mut ctx);
            fsm.dispatch(&mut ctx, &VehicleEvent::Commit(target));
            assert_eq!(fsm.state(), target);
            assert_eq!(VehicleFsm::from_state(target).state(), target);
            assert_eq!(ctx.pending_profile, Some(IndicatorProfile::for_state(target)));
        }
    }
}
