//! # balance_fw
//!
//! Supervisory firmware for a steer-balanced vehicle: a steering column driven by a CiA 402 servo
//! over CAN keeps the vehicle upright while a separate hub motor provides propulsion.
//!
//! The library is hardware independent and builds on the host for testing. The Pico 2 binary in
//! `main.rs` (feature `firmware`) plugs the board drivers from [`devices`] into a
//! [`supervisor::Supervisor`] and calls [`supervisor::Supervisor::tick`] forever.
//!
//! - [`state`] – vehicle states, request flags and per-tick measurements
//! - [`rules`] – ordered transition rules, last satisfied rule wins
//! - [`vehicle_fsm`] – typed state machine and entry effects
//! - [`handshake`] – actuator mode-and-arm handshake
//! - [`control`] – balance law
//! - [`link`] – command and telemetry transports
//! - [`devices`] – collaborator traits and board drivers

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod logging;

pub mod config;
pub mod control;
pub mod devices;
pub mod handshake;
pub mod indicator;
pub mod link;
pub mod rules;
pub mod state;
pub mod supervisor;
pub mod vehicle_fsm;

pub use config::SupervisorConfig;
pub use state::{FlagUpdate, RequestFlags, VehicleState};
pub use supervisor::{Devices, Supervisor, TickOutcome};
