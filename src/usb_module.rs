//! USB Module
//!
//! This module encapsulates the USB Serial handling.
//! It manages the global static resources required for the USB stack,
//! handles the initialization, and implements the `USBCTRL_IRQ` interrupt handler.
//! Received bytes are queued by the interrupt and drained by the main loop
//! through [`UsbStream`].

use core::cell::RefCell;
use critical_section::Mutex;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

use rp235x_hal as hal;
use hal::pac;

use rp235x_hal::pac::interrupt;

use balance_fw::link::{ByteStream, RxQueue};

use crate::hardware::Timer;

type UsbBusType = hal::usb::UsbBus;

// Global USB Objects (Mutex protected for ISR access)
static USB_DEVICE: Mutex<RefCell<Option<UsbDevice<UsbBusType>>>> = Mutex::new(RefCell::new(None));
static USB_SERIAL: Mutex<RefCell<Option<SerialPort<UsbBusType>>>> = Mutex::new(RefCell::new(None));

/// Bytes received from the host, waiting for the main loop.
static RX: RxQueue<256> = RxQueue::new();

/// How long a command's number may trail its opcode across USB transfers (µs).
const READ_TIMEOUT_US: u64 = 20_000;

/// Initialize USB Serial and enable the USB interrupt.
///
/// This setup includes creating the static bus allocator using `unsafe` (safe pattern for no_std),
/// initializing the SerialPort and UsbDevice, and unmasking the NVIC interrupt.
pub fn init(
    usb_periph: pac::USB,
    usb_dpram: pac::USB_DPRAM,
    usb_clock: hal::clocks::UsbClock,
    resets: &mut pac::RESETS,
) {
    // 1. Create the USB Bus
    let usb_bus = hal::usb::UsbBus::new(
        usb_periph,
        usb_dpram,
        usb_clock,
        true,
        resets,
    );

    // 2. Create static allocator
    static mut USB_BUS: Option<usb_device::bus::UsbBusAllocator<hal::usb::UsbBus>> = None;

    // Safety: This is called only once at initialization time, before interrupts are enabled.
    let bus_allocator = unsafe {
        let bus_ptr = core::ptr::addr_of_mut!(USB_BUS);
        *bus_ptr = Some(usb_device::bus::UsbBusAllocator::new(usb_bus));
        (*bus_ptr).as_ref().unwrap()
    };

    // 3. Create Device and Serial Port
    let serial = SerialPort::new(bus_allocator);
    let usb_dev = UsbDeviceBuilder::new(bus_allocator, UsbVidPid(0x16c0, 0x27dd))
        .strings(&[StringDescriptors::default()
            .manufacturer("Raspberry Pi")
            .product("Balance Supervisor")
            .serial_number("BAL001")])
        .unwrap()
        .device_class(usbd_serial::USB_CLASS_CDC)
        .build();

    // 4. Move to Global Storage
    critical_section::with(|cs| {
        USB_DEVICE.borrow_ref_mut(cs).replace(usb_dev);
        USB_SERIAL.borrow_ref_mut(cs).replace(serial);
    });

    // 5. Enable Interrupt
    unsafe {
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::USBCTRL_IRQ);
    }
}

/// Telemetry byte stream over the USB CDC port.
pub struct UsbStream {
    timer: Timer,
}

impl UsbStream {
    pub fn new(timer: Timer) -> Self {
        Self { timer }
    }
}

impl ByteStream for UsbStream {
    /// Queue bytes for the host. Whatever does not fit in the endpoint buffer is dropped.
    fn write(&mut self, data: &[u8]) {
        critical_section::with(|cs| {
            let mut serial = USB_SERIAL.borrow_ref_mut(cs);
            if let Some(serial) = serial.as_mut() {
                let mut rest = data;
                while !rest.is_empty() {
                    match serial.write(rest) {
                        Ok(n) if n > 0 => rest = &rest[n..],
                        _ => break,
                    }
                }
            }
        });
    }

    fn flush(&mut self) {
        critical_section::with(|cs| {
            if let Some(serial) = USB_SERIAL.borrow_ref_mut(cs).as_mut() {
                let _ = serial.flush();
            }
        });
    }

    fn read_byte(&mut self) -> Option<u8> {
        RX.pop()
    }

    fn available(&mut self) -> bool {
        !RX.is_empty()
    }

    fn wait_byte(&mut self) -> Option<u8> {
        let start = self.timer.get_counter();
        loop {
            if let Some(b) = RX.pop() {
                return Some(b);
            }
            if self.timer.get_counter().ticks().saturating_sub(start.ticks()) >= READ_TIMEOUT_US {
                return None;
            }
        }
    }
}

/// USB Interrupt Handler
///
/// Handles all USB events (Enumeration, Data In/Out) and moves received
/// bytes into the receive queue, so the connection stays up even while the
/// main loop is blocked in a handshake.
#[allow(non_snake_case)]
#[interrupt]
fn USBCTRL_IRQ() {
    critical_section::with(|cs| {
        let mut dev = USB_DEVICE.borrow_ref_mut(cs);
        let mut serial = USB_SERIAL.borrow_ref_mut(cs);

        if let (Some(dev), Some(serial)) = (dev.as_mut(), serial.as_mut()) {
            if dev.poll(&mut [serial]) {
                let mut buf = [0u8; 64];
                if let Ok(n) = serial.read(&mut buf) {
                    if RX.push_slice(&buf[..n]) > 0 {
                        defmt::warn!("usb: receive queue full");
                    }
                }
            }
        }
    });
}
