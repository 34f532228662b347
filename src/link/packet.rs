//! Packet-framed link over a half-duplex radio.

use super::{Command, StatusRecord, TelemetryLink};
use crate::state::FlagUpdate;

/// Radio payload size.
pub const PAYLOAD_LEN: usize = 32;

/// Command payloads shorter than this carry no argument and are dropped.
const MIN_COMMAND_LEN: usize = 6;

mod opcode {
    pub const SET_SPEED: u8 = 1;
    pub const SET_STEERING: u8 = 2;
    pub const SET_REQUESTS: u8 = 3;
}

/// Half-duplex packet radio (nRF24L01-class).
pub trait Radio {
    fn start_listening(&mut self);
    fn stop_listening(&mut self);
    /// Send one payload. Returns `true` if it was acknowledged.
    fn write(&mut self, payload: &[u8]) -> bool;
    fn available(&mut self) -> bool;
    /// Read one payload into `buf` and return its length.
    fn read(&mut self, buf: &mut [u8; PAYLOAD_LEN]) -> usize;
}

pub struct PacketLink<R: Radio> {
    radio: R,
}

impl<R: Radio> PacketLink<R> {
    pub fn new(radio: R) -> Self {
        Self { radio }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn free(self) -> R {
        self.radio
    }
}

/// Decode one command payload.
pub fn parse_command(payload: &[u8]) -> Option<Command> {
    if payload.len() < MIN_COMMAND_LEN {
        return None;
    }
    let arg = f32::from_le_bytes([payload[2], payload[3], payload[4], payload[5]]);
    match payload[0] {
        opcode::SET_SPEED => Some(Command::SetSpeed(arg)),
        opcode::SET_STEERING => Some(Command::SetSteering(arg)),
        opcode::SET_REQUESTS => Some(Command::Requests {
            raw: payload[2],
            update: FlagUpdate::Replace,
        }),
        _ => None,
    }
}

impl<R: Radio> TelemetryLink for PacketLink<R> {
    fn start(&mut self) {
        self.radio.start_listening();
    }

    fn send_status(&mut self, record: &StatusRecord) {
        let frame = record.encode_frame();
        self.radio.stop_listening();
        if !self.radio.write(&frame) {
            log_debug!("radio: status frame not acknowledged");
        }
        self.radio.start_listening();
    }

    fn available(&mut self) -> bool {
        self.radio.available()
    }

    fn read_command(&mut self) -> Option<Command> {
        let mut buf = [0u8; PAYLOAD_LEN];
        let n = self.radio.read(&mut buf).min(PAYLOAD_LEN);
        let command = parse_command(&buf[..n]);
        if command.is_none() {
            log_debug!("radio: ignored payload with opcode {}", buf[0]);
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SensorSnapshot, VehicleState};
    use std::collections::VecDeque;
    use std::vec::Vec;

    #[derive(Default)]
    struct FakeRadio {
        listening: bool,
        /// (listening at write time, payload)
        sent: Vec<(bool, Vec<u8>)>,
        inbox: VecDeque<Vec<u8>>,
    }

    impl Radio for FakeRadio {
        fn start_listening(&mut self) {
            self.listening = true;
        }
        fn stop_listening(&mut self) {
            self.listening = false;
        }
        fn write(&mut self, payload: &[u8]) -> bool {
            self.sent.push((self.listening, payload.to_vec()));
            true
        }
        fn available(&mut self) -> bool {
            !self.inbox.is_empty()
        }
        fn read(&mut self, buf: &mut [u8; PAYLOAD_LEN]) -> usize {
            let Some(p) = self.inbox.pop_front() else {
                return 0;
            };
            buf[..p.len()].copy_from_slice(&p);
            p.len()
        }
    }

    fn payload(op: u8, arg: [u8; 4]) -> Vec<u8> {
        let mut p = vec![0u8; PAYLOAD_LEN];
        p[0] = op;
        p[2..6].copy_from_slice(&arg);
        p
    }

    #[test]
    fn status_is_sent_with_reception_paused() {
        let mut link = PacketLink::new(FakeRadio::default());
        link.start();
        let record = StatusRecord::new(VehicleState::Assist, &SensorSnapshot::default(), 1.0);
        link.send_status(&record);

        let radio = link.radio();
        assert_eq!(radio.sent.len(), 1);
        assert!(!radio.sent[0].0);
        assert_eq!(radio.sent[0].1, record.encode_frame().to_vec());
        assert!(radio.listening);
    }

    #[test]
    fn opcodes_decode() {
        let mut link = PacketLink::new(FakeRadio::default());
        link.radio.inbox.push_back(payload(1, 3.5f32.to_le_bytes()));
        link.radio.inbox.push_back(payload(2, (-0.25f32).to_le_bytes()));
        link.radio.inbox.push_back(payload(3, [0x84, 0, 0, 0]));
        link.radio.inbox.push_back(payload(7, [0; 4]));
        link.radio.inbox.push_back(vec![1, 0, 0]);

        assert!(link.available());
        assert_eq!(link.read_command(), Some(Command::SetSpeed(3.5)));
        assert_eq!(link.read_command(), Some(Command::SetSteering(-0.25)));
        assert_eq!(
            link.read_command(),
            Some(Command::Requests {
                raw: 0x84,
                update: FlagUpdate::Replace
            })
        );
        assert_eq!(link.read_command(), None);
        assert_eq!(link.read_command(), None);
        assert!(!link.available());
    }
}
