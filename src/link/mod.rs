//! # Command and telemetry link
//!
//! One status record goes out every tick and at most one operator command comes in. Two
//! transports implement [`TelemetryLink`]:
//!
//! - [`PacketLink`] – fixed 32-byte frames over a packet radio ([`Radio`])
//! - [`LineLink`] – tab-separated text over a serial byte stream ([`ByteStream`])
//!
//! The transport is picked when the supervisor is built; the supervisor itself only sees the
//! trait.

use core::fmt;

use crate::state::{FlagUpdate, SensorSnapshot, UnknownState, VehicleState};

pub mod line;
pub mod packet;
pub mod rx_queue;

pub use line::{ByteStream, LineLink};
pub use packet::{PacketLink, Radio};
pub use rx_queue::RxQueue;

/// Header byte of a binary status frame.
pub const STATUS_HEADER: u8 = 13;
/// Length of a binary status frame.
pub const STATUS_FRAME_LEN: usize = 27;

/// Operator command decoded from either transport.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Speed reference (m/s), also applied to the propulsion drive.
    SetSpeed(f32),
    /// Steering reference (rad).
    SetSteering(f32),
    /// Request flag byte and how to combine it with the pending set.
    Requests { raw: u8, update: FlagUpdate },
}

/// Bidirectional low-rate operator channel.
pub trait TelemetryLink {
    fn start(&mut self);
    /// Emit one status record.
    fn send_status(&mut self, record: &StatusRecord);
    /// Whether inbound data is waiting.
    fn available(&mut self) -> bool;
    /// Consume one inbound command. `None` if nothing usable was received.
    fn read_command(&mut self) -> Option<Command>;
}

/// Status reported once per tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusRecord {
    pub state: VehicleState,
    pub roll: f32,
    pub steer: f32,
    pub roll_rate: f32,
    pub steer_rate: f32,
    pub torque: f32,
    pub speed: f32,
    /// Seconds since boot. Only the line format carries it.
    pub uptime_s: f32,
}

/// Rejected binary status frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum FrameError {
    /// Fewer bytes than a full frame.
    Truncated(usize),
    /// First byte is not the status header.
    Header(u8),
    /// Length byte does not match the frame size.
    Length(u8),
    /// State byte names no known state.
    UnknownState(u8),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Truncated(n) => write!(f, "status frame truncated at {} bytes", n),
            FrameError::Header(h) => write!(f, "bad status header {}", h),
            FrameError::Length(l) => write!(f, "bad status length {}", l),
            FrameError::UnknownState(s) => write!(f, "unknown state {}", s),
        }
    }
}

impl From<UnknownState> for FrameError {
    fn from(e: UnknownState) -> Self {
        FrameError::UnknownState(e.0)
    }
}

impl StatusRecord {
    pub fn new(state: VehicleState, snapshot: &SensorSnapshot, uptime_s: f32) -> Self {
        Self {
            state,
            roll: snapshot.roll,
            steer: snapshot.steer,
            roll_rate: snapshot.roll_rate,
            steer_rate: snapshot.steer_rate,
            torque: snapshot.torque,
            speed: snapshot.speed,
            uptime_s,
        }
    }

    /// Binary frame: header, length, state, then φ, δ, φ̇, δ̇, torque, v as little-endian f32.
    pub fn encode_frame(&self) -> [u8; STATUS_FRAME_LEN] {
        let mut frame = [0u8; STATUS_FRAME_LEN];
        frame[0] = STATUS_HEADER;
        frame[1] = STATUS_FRAME_LEN as u8;
        frame[2] = self.state.as_u8();
        let values = [
            self.roll,
            self.steer,
            self.roll_rate,
            self.steer_rate,
            self.torque,
            self.speed,
        ];
        for (chunk, value) in frame[3..].chunks_exact_mut(4).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        frame
    }

    /// Parse a binary status frame. The uptime is not transmitted and reads back as zero.
    pub fn decode_frame(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < STATUS_FRAME_LEN {
            return Err(FrameError::Truncated(frame.len()));
        }
        if frame[0] != STATUS_HEADER {
            return Err(FrameError::Header(frame[0]));
        }
        if usize::from(frame[1]) != STATUS_FRAME_LEN {
            return Err(FrameError::Length(frame[1]));
        }
        let state = VehicleState::try_from(frame[2])?;
        let f = |at: usize| f32::from_le_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]]);
        Ok(Self {
            state,
            roll: f(3),
            steer: f(7),
            roll_rate: f(11),
            steer_rate: f(15),
            torque: f(19),
            speed: f(23),
            uptime_s: 0.0,
        })
    }

    /// Text line: `state φ δ φ̇ δ̇ v torque uptime`, tab separated and newline terminated.
    pub fn write_line<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        write!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            self.state.as_u8(),
            self.roll,
            self.steer,
            self.roll_rate,
            self.steer_rate,
            self.speed,
            self.torque,
            self.uptime_s
        )
    }
}
