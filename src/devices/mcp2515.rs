//! Microchip MCP2515 stand-alone CAN controller.
//!
//! This module handles SPI framing and register access for the MCP2515 and exposes it as a
//! [`Fieldbus`] port. Only standard 11-bit frames are used. The chip-select line is driven by hand
//! around every instruction.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use super::{CanFrame, Fieldbus};

// SPI instructions
mod ins {
    pub const RESET: u8 = 0xC0;
    pub const READ: u8 = 0x03;
    pub const WRITE: u8 = 0x02;
    pub const READ_STATUS: u8 = 0xA0;
    pub const LOAD_TX0: u8 = 0x40;
    pub const RTS_TX0: u8 = 0x81;
    pub const READ_RX0: u8 = 0x90;
    pub const READ_RX1: u8 = 0x94;
}

// Register addresses
pub mod reg {
    pub const CANSTAT: u8 = 0x0E;
    pub const CANCTRL: u8 = 0x0F;
    pub const CNF3: u8 = 0x28;
    pub const CNF2: u8 = 0x29;
    pub const CNF1: u8 = 0x2A;
    pub const TXB0CTRL: u8 = 0x30;
    pub const RXB0CTRL: u8 = 0x60;
    pub const RXB1CTRL: u8 = 0x70;
}

/// Bit timing for 1 Mbit/s from a 16 MHz crystal: (CNF1, CNF2, CNF3).
pub const TIMING_1M_16MHZ: (u8, u8, u8) = (0x00, 0xD0, 0x82);

const TXREQ: u8 = 1 << 3;
const MODE_MASK: u8 = 0b1110_0000;
const MODE_NORMAL: u8 = 0x00;
const MODE_CONFIG: u8 = 0x80;

/// Error type for `Mcp2515` operations.
#[derive(Debug)]
pub enum Error<E> {
    /// SPI transfer failed.
    Spi(E),
    /// Chip-select pin could not be driven.
    ChipSelect,
    /// Transmit buffer still holds an unsent frame.
    Busy,
    /// The controller did not enter the requested operating mode.
    Mode(u8),
}

pub struct Mcp2515<S, CS> {
    spi: S,
    cs: CS,
}

impl<S: SpiBus, CS: OutputPin> Mcp2515<S, CS> {
    pub fn new(spi: S, mut cs: CS) -> Self {
        let _ = cs.set_high();
        Self { spi, cs }
    }

    /// Run `f` with the chip selected.
    fn selected<R>(
        &mut self,
        f: impl FnOnce(&mut S) -> Result<R, S::Error>,
    ) -> Result<R, Error<S::Error>> {
        self.cs.set_low().map_err(|_| Error::ChipSelect)?;
        let result = f(&mut self.spi).and_then(|r| self.spi.flush().map(|_| r));
        self.cs.set_high().map_err(|_| Error::ChipSelect)?;
        result.map_err(Error::Spi)
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error<S::Error>> {
        self.selected(|spi| spi.write(&[ins::WRITE, reg, value]))
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, Error<S::Error>> {
        self.selected(|spi| {
            let mut buf = [ins::READ, reg, 0];
            spi.transfer_in_place(&mut buf)?;
            Ok(buf[2])
        })
    }

    /// Reset the controller, program the bit timing and enter normal mode.
    pub fn init(
        &mut self,
        delay: &mut impl DelayNs,
        timing: (u8, u8, u8),
    ) -> Result<(), Error<S::Error>> {
        self.selected(|spi| spi.write(&[ins::RESET]))?;
        delay.delay_ms(5);

        self.set_mode(MODE_CONFIG)?;
        self.write_reg(reg::CNF1, timing.0)?;
        self.write_reg(reg::CNF2, timing.1)?;
        self.write_reg(reg::CNF3, timing.2)?;
        // Accept every frame, roll RXB0 over into RXB1.
        self.write_reg(reg::RXB0CTRL, 0x64)?;
        self.write_reg(reg::RXB1CTRL, 0x60)?;
        self.set_mode(MODE_NORMAL)
    }

    fn set_mode(&mut self, mode: u8) -> Result<(), Error<S::Error>> {
        self.write_reg(reg::CANCTRL, mode)?;
        let stat = self.read_reg(reg::CANSTAT)?;
        if stat & MODE_MASK != mode {
            return Err(Error::Mode(stat & MODE_MASK));
        }
        Ok(())
    }

    fn read_rx(&mut self, instruction: u8) -> Result<CanFrame, Error<S::Error>> {
        let mut buf = [0u8; 14];
        buf[0] = instruction;
        self.selected(|spi| spi.transfer_in_place(&mut buf))?;

        // SIDH, SIDL, EID8, EID0, DLC, D0..D7
        let id = (u16::from(buf[1]) << 3) | u16::from(buf[2] >> 5);
        let len = (buf[5] & 0x0F).min(8);
        let mut frame = CanFrame {
            id,
            len,
            data: [0; 8],
        };
        frame.data.copy_from_slice(&buf[6..14]);
        Ok(frame)
    }

    pub fn free(self) -> (S, CS) {
        (self.spi, self.cs)
    }
}

impl<S: SpiBus, CS: OutputPin> Fieldbus for Mcp2515<S, CS> {
    type Error = Error<S::Error>;

    fn transmit(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        if self.read_reg(reg::TXB0CTRL)? & TXREQ != 0 {
            return Err(Error::Busy);
        }

        let mut buf = [0u8; 14];
        buf[0] = ins::LOAD_TX0;
        buf[1] = (frame.id >> 3) as u8;
        buf[2] = ((frame.id & 0x07) << 5) as u8;
        buf[5] = frame.len.min(8);
        buf[6..14].copy_from_slice(&frame.data);
        let n = 6 + usize::from(frame.len.min(8));
        self.selected(|spi| spi.write(&buf[..n]))?;

        self.selected(|spi| spi.write(&[ins::RTS_TX0]))
    }

    fn receive(&mut self) -> Result<Option<CanFrame>, Self::Error> {
        let status = self.selected(|spi| {
            let mut buf = [ins::READ_STATUS, 0];
            spi.transfer_in_place(&mut buf)?;
            Ok(buf[1])
        })?;

        // Reading a receive buffer clears its interrupt flag when CS rises.
        if status & 0x01 != 0 {
            return self.read_rx(ins::READ_RX0).map(Some);
        }
        if status & 0x02 != 0 {
            return self.read_rx(ins::READ_RX1).map(Some);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::vec::Vec;

    /// Records every selected transaction and replies from a canned MISO script.
    #[derive(Default)]
    struct Bus {
        mosi: Vec<Vec<u8>>,
        current: Vec<u8>,
        miso: Vec<Vec<u8>>,
    }

    impl embedded_hal::spi::ErrorType for Bus {
        type Error = Infallible;
    }

    impl SpiBus for Bus {
        fn read(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
            words.fill(0);
            Ok(())
        }
        fn write(&mut self, words: &[u8]) -> Result<(), Infallible> {
            self.current.extend_from_slice(words);
            Ok(())
        }
        fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Infallible> {
            self.current.extend_from_slice(write);
            read.fill(0);
            Ok(())
        }
        fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
            self.current.extend_from_slice(words);
            let reply = if self.miso.is_empty() {
                Vec::new()
            } else {
                self.miso.remove(0)
            };
            for (w, r) in words.iter_mut().zip(reply) {
                *w = r;
            }
            Ok(())
        }
        fn flush(&mut self) -> Result<(), Infallible> {
            let done = core::mem::take(&mut self.current);
            self.mosi.push(done);
            Ok(())
        }
    }

    struct Cs;

    impl embedded_hal::digital::ErrorType for Cs {
        type Error = Infallible;
    }

    impl OutputPin for Cs {
        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    #[test]
    fn transmit_loads_standard_id_and_requests_send() {
        let mut can = Mcp2515::new(Bus::default(), Cs);
        let frame = CanFrame::new(0x67F, &[0x2F, 0x60, 0x60, 0x00, 0x04]).unwrap();
        can.transmit(&frame).unwrap();

        let sent = &can.spi.mosi;
        assert_eq!(sent[0], vec![ins::READ, reg::TXB0CTRL, 0]);
        assert_eq!(
            sent[1],
            vec![ins::LOAD_TX0, 0xCF, 0xE0, 0, 0, 5, 0x2F, 0x60, 0x60, 0x00, 0x04]
        );
        assert_eq!(sent[2], vec![ins::RTS_TX0]);
    }

    #[test]
    fn busy_transmit_buffer_is_reported() {
        let mut bus = Bus::default();
        bus.miso.push(vec![0, 0, TXREQ]);
        let mut can = Mcp2515::new(bus, Cs);
        let frame = CanFrame::new(0x100, &[1]).unwrap();
        assert!(matches!(can.transmit(&frame), Err(Error::Busy)));
    }

    #[test]
    fn receive_decodes_rx0() {
        let mut bus = Bus::default();
        bus.miso.push(vec![0, 0x01]);
        bus.miso.push(vec![0, 0xEF, 0xE0, 0, 0, 4, 0x4B, 0x41, 0x60, 0x00, 0, 0, 0, 0]);
        let mut can = Mcp2515::new(bus, Cs);

        let frame = can.receive().unwrap().unwrap();
        assert_eq!(frame.id, 0x77F);
        assert_eq!(frame.payload(), &[0x4B, 0x41, 0x60, 0x00]);
        assert_eq!(can.receive().unwrap(), None);
    }
}
