//! Hardware Abstraction Module
//!
//! This module handles the low-level configuration of the RP2350 peripherals.
//! It sets up Clocks, PLLs, the Timer, I2C (IMU), SPI (CAN controller), the PWM
//! channels (RGB LED, throttle) and USB, and hands them to `main` in a
//! `Hardware` struct.
//!
//! Pin map (Pico 2):
//!
//! | Function        | GPIO        |
//! |-----------------|-------------|
//! | IMU SDA / SCL   | 4 / 5       |
//! | CAN MISO / CS   | 16 / 17     |
//! | CAN SCK / MOSI  | 18 / 19     |
//! | LED R / G / B   | 10 / 11 / 12|
//! | Throttle PWM    | 14          |
//! | Buzzer          | 15          |

use embedded_hal::delay::DelayNs;
use hal::fugit::RateExtU32;
use hal::gpio::bank0::{Gpio4, Gpio5, Gpio15, Gpio16, Gpio17, Gpio18, Gpio19};
use hal::gpio::{FunctionI2C, FunctionSio, FunctionSpi, Pin, PullDown, PullUp, SioOutput};
use hal::pac;
use hal::Clock;
use rp235x_hal as hal;

use balance_fw::devices::Timebase;

use crate::usb_module;

/// External crystal frequency used by the Raspberry Pi Pico 2 W.
const XTAL_FREQ_HZ: u32 = 12_000_000u32;

pub type Timer = hal::Timer<hal::timer::CopyableTimer0>;

pub type ImuI2c = hal::I2C<
    pac::I2C0,
    (
        Pin<Gpio4, FunctionI2C, PullUp>,
        Pin<Gpio5, FunctionI2C, PullUp>,
    ),
>;

pub type CanSpi = hal::spi::Spi<
    hal::spi::Enabled,
    pac::SPI0,
    (
        Pin<Gpio19, FunctionSpi, PullDown>,
        Pin<Gpio16, FunctionSpi, PullDown>,
        Pin<Gpio18, FunctionSpi, PullDown>,
    ),
    8,
>;

pub type CanCs = Pin<Gpio17, FunctionSio<SioOutput>, PullDown>;
pub type BuzzerPin = Pin<Gpio15, FunctionSio<SioOutput>, PullDown>;

type PwmChannel<S, C> = hal::pwm::Channel<hal::pwm::Slice<S, hal::pwm::FreeRunning>, C>;
pub type RedLed = PwmChannel<hal::pwm::Pwm5, hal::pwm::A>;
pub type GreenLed = PwmChannel<hal::pwm::Pwm5, hal::pwm::B>;
pub type BlueLed = PwmChannel<hal::pwm::Pwm6, hal::pwm::A>;
pub type ThrottlePwm = PwmChannel<hal::pwm::Pwm7, hal::pwm::A>;

/// Everything `main` needs after bring-up.
pub struct Hardware {
    pub timer: Timer,
    pub i2c: ImuI2c,
    pub spi: CanSpi,
    pub can_cs: CanCs,
    pub red: RedLed,
    pub green: GreenLed,
    pub blue: BlueLed,
    pub throttle: ThrottlePwm,
    pub buzzer: BuzzerPin,
}

/// Microsecond timer as the supervisor's clock.
pub struct BoardTimer(Timer);

impl BoardTimer {
    pub fn new(timer: Timer) -> Self {
        Self(timer)
    }
}

impl DelayNs for BoardTimer {
    fn delay_ns(&mut self, ns: u32) {
        self.0.delay_ns(ns);
    }

    fn delay_us(&mut self, us: u32) {
        self.0.delay_us(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.delay_ms(ms);
    }
}

impl Timebase for BoardTimer {
    fn now_us(&self) -> u64 {
        self.0.get_counter().ticks()
    }
}

/// Initializes the entire hardware stack.
///
/// This function:
/// 1.  Takes ownership of the raw PAC peripherals.
/// 2.  Configures the Watchdog and Clocks (System & USB).
/// 3.  Initializes the Microsecond Timer.
/// 4.  Configures the I2C bus for the IMU and the SPI bus for the CAN controller.
/// 5.  Sets up the PWM slices for the RGB LED and the throttle.
/// 6.  Initializes the USB Serial module.
pub fn init() -> Hardware {
    // 1. Take ownership of raw peripherals
    let mut pac = pac::Peripherals::take().unwrap();
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);

    // 2. Configure Clocks
    let clocks = hal::clocks::init_clocks_and_plls(
        XTAL_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .unwrap();

    // 3. Configure Timer (Microsecond precision)
    let timer = hal::Timer::new_timer0(pac.TIMER0, &mut pac.RESETS, &clocks);

    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    // 4. Buses
    let sda: Pin<_, FunctionI2C, PullUp> = pins.gpio4.reconfigure();
    let scl: Pin<_, FunctionI2C, PullUp> = pins.gpio5.reconfigure();
    let i2c = hal::I2C::i2c0(
        pac.I2C0,
        sda,
        scl,
        400.kHz(),
        &mut pac.RESETS,
        &clocks.system_clock,
    );

    let mosi = pins.gpio19.into_function::<FunctionSpi>();
    let miso = pins.gpio16.into_function::<FunctionSpi>();
    let sclk = pins.gpio18.into_function::<FunctionSpi>();
    let spi = hal::spi::Spi::<_, _, _, 8>::new(pac.SPI0, (mosi, miso, sclk)).init(
        &mut pac.RESETS,
        clocks.peripheral_clock.freq(),
        8.MHz(),
        embedded_hal::spi::MODE_0,
    );
    let can_cs = pins.gpio17.into_push_pull_output();

    // 5. PWM (free running, default top)
    let slices = hal::pwm::Slices::new(pac.PWM, &mut pac.RESETS);

    let mut rg = slices.pwm5;
    rg.enable();
    let mut red = rg.channels.channel_a;
    red.output_to(pins.gpio10);
    let mut green = rg.channels.channel_b;
    green.output_to(pins.gpio11);

    let mut b = slices.pwm6;
    b.enable();
    let mut blue = b.channels.channel_a;
    blue.output_to(pins.gpio12);

    let mut drive = slices.pwm7;
    drive.enable();
    let mut throttle = drive.channels.channel_a;
    throttle.output_to(pins.gpio14);

    let buzzer = pins.gpio15.into_push_pull_output();

    // 6. Configure USB Serial (via module)
    usb_module::init(
        pac.USB,
        pac.USB_DPRAM,
        clocks.usb_clock,
        &mut pac.RESETS,
    );

    Hardware {
        timer,
        i2c,
        spi,
        can_cs,
        red,
        green,
        blue,
        throttle,
        buzzer,
    }
}
