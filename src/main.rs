//! SPDX-License-Identifier: MIT OR Apache-2.0
//!
//! # Steer-balanced vehicle supervisor
//!
//! Firmware entry point. The architecture follows three layers:
//! - **Hardware Module:** HAL setup for the board (`hardware.rs`).
//! - **USB Module:** USB CDC serial with an interrupt-fed receive queue (`usb_module.rs`).
//! - **Supervisor:** the hardware-independent `balance_fw` library, ticked at a fixed rate.
//!
//! Target: Raspberry Pi Pico 2 W (RP2350).

#![no_std]
#![no_main]

// --- Imports ---
use defmt::*;
use defmt_rtt as _;
use panic_probe as _;

use balance_fw::config::SupervisorConfig;
use balance_fw::devices::cia402::DriveConfig;
use balance_fw::devices::{mcp2515, mpu6050};
use balance_fw::devices::{Cia402Drive, Mcp2515, Mpu6050, PwmThrottle, RgbIndicator};
use balance_fw::link::LineLink;
use balance_fw::{Devices, Supervisor};

// --- Modules ---
mod hardware;
mod usb_module;

// --- HAL Selection ---
use rp235x_hal as hal;
use hal::entry;

// --- Bootloader Configuration ---

#[unsafe(link_section = ".start_block")]
#[used]
pub static IMAGE_DEF: hal::block::ImageDef = hal::block::ImageDef::secure_exe();

// --- Board Constants ---

/// Hub motor speed at full throttle (m/s).
const MAX_SPEED: f32 = 8.0;

/// Control loop period (µs).
const TICK_PERIOD_US: u64 = 10_000;

/// Entry point.
#[entry]
fn main() -> ! {
    info!("Program start");

    // 1. Initialize Hardware Stack (Clocks, Timer, I2C, SPI, PWM, USB)
    let mut hw = hardware::init();

    // 2. Bring up the CAN controller for the steering drive
    let mut can = Mcp2515::new(hw.spi, hw.can_cs);
    if can.init(&mut hw.timer, mcp2515::TIMING_1M_16MHZ).is_err() {
        error!("CAN controller did not start");
    }

    // 3. Assemble the supervisor
    let devices = Devices {
        imu: Mpu6050::new(hw.i2c, hw.timer, mpu6050::DEFAULT_ADDRESS),
        steering: Cia402Drive::new(can, DriveConfig::default()),
        propulsion: PwmThrottle::new(hw.throttle, MAX_SPEED),
        indicator: RgbIndicator::new(hw.red, hw.green, hw.blue, hw.buzzer),
    };
    let link = LineLink::new(usb_module::UsbStream::new(hw.timer));
    let clock = hardware::BoardTimer::new(hw.timer);

    let mut supervisor = match Supervisor::new(devices, link, clock, SupervisorConfig::default()) {
        Ok(supervisor) => supervisor,
        Err(e) => defmt::panic!("invalid configuration: {}", e),
    };
    supervisor.start();

    let mut last_tick = hw.timer.get_counter();

    // 4. Main Application Loop
    loop {
        let current_time = hw.timer.get_counter();

        // Periodic Task: Supervisor Tick
        if current_time.ticks().saturating_sub(last_tick.ticks()) >= TICK_PERIOD_US {
            last_tick = current_time;

            let outcome = supervisor.tick();
            if let Some(fault) = outcome.fault {
                warn!("vehicle stopped: {}", fault);
            }
        }
    }
}

// --- Metadata ---

#[unsafe(link_section = ".bi_entries")]
#[used]
pub static PICOTOOL_ENTRIES: [hal::binary_info::EntryAddr; 4] = [
    hal::binary_info::rp_cargo_bin_name!(),
    hal::binary_info::rp_cargo_version!(),
    hal::binary_info::rp_program_description!(c"Steer-balanced vehicle supervisor"),
    hal::binary_info::rp_program_build_attribute!()
];
