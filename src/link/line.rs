//! Line-oriented link over a serial byte stream.
//!
//! Outbound records are tab-separated text lines. Inbound commands are a single opcode byte
//! followed by an ASCII number (`s`, `d`) or one raw byte (`c`).

use heapless::String;

use super::{Command, StatusRecord, TelemetryLink};
use crate::state::FlagUpdate;

/// Longest rendered status line (eight fields of up to 40 characters).
const LINE_CAPACITY: usize = 320;

/// Characters kept for one number. Fraction digits past this are below `f32` precision.
const NUMBER_CAPACITY: usize = 24;

/// Serial byte stream (UART or USB CDC).
pub trait ByteStream {
    fn write(&mut self, bytes: &[u8]);
    /// Block until written bytes have left the device.
    fn flush(&mut self);
    /// Next received byte, if any.
    fn read_byte(&mut self) -> Option<u8>;
    fn available(&mut self) -> bool;

    /// Next received byte, waiting up to the stream's read timeout for one to arrive.
    fn wait_byte(&mut self) -> Option<u8> {
        self.read_byte()
    }
}

pub struct LineLink<S: ByteStream> {
    stream: S,
    /// Byte looked at by the number parser but not consumed.
    peeked: Option<u8>,
}

impl<S: ByteStream> LineLink<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            peeked: None,
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn free(self) -> S {
        self.stream
    }

    fn peek(&mut self) -> Option<u8> {
        if self.peeked.is_none() {
            self.peeked = self.stream.read_byte();
        }
        self.peeked
    }

    fn next(&mut self) -> Option<u8> {
        self.peeked.take().or_else(|| self.stream.read_byte())
    }

    /// Like [`Self::peek`], but gives a number split across transfers time to arrive.
    fn peek_waiting(&mut self) -> Option<u8> {
        if self.peeked.is_none() {
            self.peeked = self.stream.wait_byte();
        }
        self.peeked
    }

    /// Read a decimal number from the stream.
    ///
    /// Bytes that cannot start a number are skipped. An optional sign, digits and one decimal
    /// point are accepted; the first other byte ends the number and stays in the stream. Returns
    /// 0.0 when the stream runs dry before a digit arrives, and `None` for a number `f32` cannot
    /// hold.
    fn parse_float(&mut self) -> Option<f32> {
        loop {
            match self.peek_waiting() {
                None => return Some(0.0),
                Some(b) if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.') => break,
                Some(_) => {
                    self.next();
                }
            }
        }

        let mut text: String<NUMBER_CAPACITY> = String::new();
        if let Some(sign @ (b'-' | b'+')) = self.peek_waiting() {
            let _ = text.push(char::from(sign));
            self.next();
        }

        let mut digits = 0usize;
        let mut fraction = false;
        let mut overflow = false;
        while let Some(b) = self.peek_waiting() {
            match b {
                b'0'..=b'9' => {
                    digits += 1;
                    if text.push(char::from(b)).is_err() && !fraction {
                        overflow = true;
                    }
                }
                b'.' if !fraction => {
                    fraction = true;
                    let _ = text.push('.');
                }
                _ => break,
            }
            self.next();
        }

        if digits == 0 {
            return Some(0.0);
        }
        if overflow {
            log_debug!("serial: number has more than {} integer digits", NUMBER_CAPACITY);
            return None;
        }
        match text.parse::<f32>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                log_debug!("serial: number out of range");
                None
            }
        }
    }
}

impl<S: ByteStream> TelemetryLink for LineLink<S> {
    fn start(&mut self) {
        self.peeked = None;
    }

    fn send_status(&mut self, record: &StatusRecord) {
        let mut line: String<LINE_CAPACITY> = String::new();
        if record.write_line(&mut line).is_err() {
            log_warn!("serial: status line truncated");
        }
        self.stream.write(line.as_bytes());
        self.stream.flush();
    }

    fn available(&mut self) -> bool {
        self.peeked.is_some() || self.stream.available()
    }

    fn read_command(&mut self) -> Option<Command> {
        let opcode = self.next()?;
        match opcode {
            b's' => self.parse_float().map(Command::SetSpeed),
            b'd' => self.parse_float().map(Command::SetSteering),
            b'c' => match self.next() {
                Some(raw) => Some(Command::Requests {
                    raw,
                    update: FlagUpdate::Merge,
                }),
                None => {
                    log_debug!("serial: request opcode without a flag byte");
                    None
                }
            },
            other => {
                log_debug!("serial: ignored opcode {}", other);
                None
            }
        }
    }
}
