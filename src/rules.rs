//! Ordered transition rules.
//!
//! Each state owns a fixed list of `(predicate, target, clears)` rules. Every rule is evaluated on
//! every tick and a satisfied rule overrides any earlier satisfied one, so the **last** satisfied
//! rule in list order decides the next state. `evaluate` makes that explicit as a fold.

use crate::config::SupervisorConfig;
use crate::state::{RequestFlags, SensorSnapshot, VehicleState};

/// Everything a predicate may look at during one tick.
#[derive(Clone, Copy, Debug)]
pub struct RuleInput<'a> {
    pub snapshot: &'a SensorSnapshot,
    pub flags: RequestFlags,
    pub config: &'a SupervisorConfig,
}

/// A single guarded transition.
#[derive(Debug)]
pub struct Rule {
    /// Short label used in logs.
    pub name: &'static str,
    pub when: fn(&RuleInput<'_>) -> bool,
    pub target: VehicleState,
    /// Request flags consumed when this rule is taken.
    pub clears: RequestFlags,
}

impl Rule {
    const fn new(
        name: &'static str,
        when: fn(&RuleInput<'_>) -> bool,
        target: VehicleState,
        clears: RequestFlags,
    ) -> Self {
        Self {
            name,
            when,
            target,
            clears,
        }
    }
}

fn fallen_over(i: &RuleInput<'_>) -> bool {
    i.snapshot.roll.abs() > i.config.fall_threshold
}

fn back_upright(i: &RuleInput<'_>) -> bool {
    i.snapshot.roll.abs() < i.config.upright_threshold
}

fn rolling(i: &RuleInput<'_>) -> bool {
    i.snapshot.speed > i.config.assist_engage_speed
}

fn stopped(i: &RuleInput<'_>) -> bool {
    i.snapshot.speed < i.config.assist_release_speed
}

fn fast(i: &RuleInput<'_>) -> bool {
    i.snapshot.speed > i.config.high_speed_threshold
}

fn slow(i: &RuleInput<'_>) -> bool {
    i.snapshot.speed < i.config.low_speed_threshold
}

fn calibrate_requested(i: &RuleInput<'_>) -> bool {
    i.flags.contains(RequestFlags::CALIBRATE)
}

fn manual_requested(i: &RuleInput<'_>) -> bool {
    i.flags.contains(RequestFlags::MANUAL)
}

fn stop_requested(i: &RuleInput<'_>) -> bool {
    i.flags.contains(RequestFlags::STOP)
}

fn resume_requested(i: &RuleInput<'_>) -> bool {
    i.flags.contains(RequestFlags::RESUME)
}

fn always(_: &RuleInput<'_>) -> bool {
    true
}

const NONE: RequestFlags = RequestFlags::empty();

static IDLE: [Rule; 4] = [
    Rule::new("fall", fallen_over, VehicleState::Fallen, NONE),
    Rule::new("rolling", rolling, VehicleState::Assist, NONE),
    Rule::new("calibrate", calibrate_requested, VehicleState::Calibrating, NONE),
    Rule::new("manual", manual_requested, VehicleState::Manual, NONE),
];

static CALIBRATING: [Rule; 1] = [Rule::new(
    "done",
    always,
    VehicleState::Idle,
    RequestFlags::CALIBRATE,
)];

static MANUAL: [Rule; 1] = [Rule::new(
    "resume",
    resume_requested,
    VehicleState::Idle,
    RequestFlags::RESUME.union(RequestFlags::MANUAL),
)];

static ASSIST: [Rule; 4] = [
    Rule::new("fall", fallen_over, VehicleState::Fallen, NONE),
    Rule::new("fast", fast, VehicleState::Auto, NONE),
    Rule::new("stopped", stopped, VehicleState::Idle, NONE),
    Rule::new("stop", stop_requested, VehicleState::EmergencyStop, NONE),
];

static AUTO: [Rule; 3] = [
    Rule::new("fall", fallen_over, VehicleState::Fallen, NONE),
    Rule::new("slow", slow, VehicleState::Assist, NONE),
    Rule::new("stop", stop_requested, VehicleState::EmergencyStop, NONE),
];

static FALLEN: [Rule; 1] = [Rule::new("upright", back_upright, VehicleState::Idle, NONE)];

static EMERGENCY_STOP: [Rule; 2] = [
    Rule::new("fall", fallen_over, VehicleState::Fallen, NONE),
    Rule::new(
        "resume",
        resume_requested,
        VehicleState::Idle,
        RequestFlags::RESUME.union(RequestFlags::STOP),
    ),
];

/// The ordered rule list for `state`.
pub fn rules_for(state: VehicleState) -> &'static [Rule] {
    match state {
        VehicleState::Idle => &IDLE,
        VehicleState::Calibrating => &CALIBRATING,
        VehicleState::Manual => &MANUAL,
        VehicleState::Assist => &ASSIST,
        VehicleState::Auto => &AUTO,
        VehicleState::Fallen => &FALLEN,
        VehicleState::EmergencyStop => &EMERGENCY_STOP,
    }
}

/// Evaluate every rule of `state` in order; the last satisfied rule wins.
pub fn evaluate(state: VehicleState, input: &RuleInput<'_>) -> Option<&'static Rule> {
    rules_for(state)
        .iter()
        .fold(None, |chosen, rule| if (rule.when)(input) { Some(rule) } else { chosen })
}
