//! RGB status LED and piezo buzzer.
//!
//! Setters only record the requested look; [`Indicator::update`] drives the pins from the
//! current time so the main loop never waits on a blink or a tone.

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use heapless::Deque;

use super::{Indicator, Rgb};

/// Length of one bit slot in a coded alert.
const SLOT_US: u64 = 150_000;
/// Tone length inside a slot whose bit is set.
const SLOT_TONE_US: u64 = 100_000;
/// Silence between two queued alerts.
const ALERT_GAP_US: u64 = 300_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Alert {
    Tone { ms: u16 },
    Pattern(u8),
}

impl Alert {
    fn length_us(self) -> u64 {
        match self {
            Alert::Tone { ms } => u64::from(ms) * 1_000,
            Alert::Pattern(_) => 8 * SLOT_US,
        }
    }

    /// Whether the buzzer sounds `elapsed` microseconds into the alert.
    fn sounding(self, elapsed: u64) -> bool {
        match self {
            Alert::Tone { .. } => elapsed < self.length_us(),
            Alert::Pattern(bits) => {
                let slot = elapsed / SLOT_US;
                if slot >= 8 {
                    return false;
                }
                let set = bits & (0x80 >> slot) != 0;
                set && elapsed % SLOT_US < SLOT_TONE_US
            }
        }
    }
}

pub struct RgbIndicator<R, G, B, Z>
where
    R: SetDutyCycle,
    G: SetDutyCycle,
    B: SetDutyCycle,
    Z: OutputPin,
{
    red: R,
    green: G,
    blue: B,
    buzzer: Z,

    steady: Rgb,
    blink: Rgb,
    pulse: Option<(u16, u16)>,
    pulse_epoch: Option<u64>,

    alerts: Deque<Alert, 4>,
    playing: Option<(Alert, u64)>,
    quiet_until: u64,

    shown: Option<Rgb>,
}

impl<R, G, B, Z> RgbIndicator<R, G, B, Z>
where
    R: SetDutyCycle,
    G: SetDutyCycle,
    B: SetDutyCycle,
    Z: OutputPin,
{
    pub fn new(red: R, green: G, blue: B, buzzer: Z) -> Self {
        Self {
            red,
            green,
            blue,
            buzzer,
            steady: Rgb::BLACK,
            blink: Rgb::BLACK,
            pulse: None,
            pulse_epoch: None,
            alerts: Deque::new(),
            playing: None,
            quiet_until: 0,
            shown: None,
        }
    }

    /// Colour the LED should show at `now_us`.
    fn color_at(&mut self, now_us: u64) -> Rgb {
        let Some((on_ms, off_ms)) = self.pulse else {
            return self.steady;
        };
        let period = (u64::from(on_ms) + u64::from(off_ms)) * 1_000;
        if period == 0 {
            return self.steady;
        }
        let epoch = *self.pulse_epoch.get_or_insert(now_us);
        let phase = now_us.saturating_sub(epoch) % period;
        if phase < u64::from(on_ms) * 1_000 {
            self.blink
        } else {
            self.steady
        }
    }

    fn show(&mut self, color: Rgb) {
        if self.shown == Some(color) {
            return;
        }
        let _ = self.red.set_duty_cycle_fraction(u16::from(color.0), 255);
        let _ = self.green.set_duty_cycle_fraction(u16::from(color.1), 255);
        let _ = self.blue.set_duty_cycle_fraction(u16::from(color.2), 255);
        self.shown = Some(color);
    }

    fn buzz(&mut self, now_us: u64) {
        if self.playing.is_none() && now_us >= self.quiet_until {
            if let Some(next) = self.alerts.pop_front() {
                self.playing = Some((next, now_us));
            }
        }

        let on = match self.playing {
            Some((alert, started)) => {
                let elapsed = now_us.saturating_sub(started);
                if elapsed >= alert.length_us() {
                    self.playing = None;
                    self.quiet_until = now_us + ALERT_GAP_US;
                    false
                } else {
                    alert.sounding(elapsed)
                }
            }
            None => false,
        };

        let _ = if on {
            self.buzzer.set_high()
        } else {
            self.buzzer.set_low()
        };
    }

    fn queue(&mut self, alert: Alert) {
        // A full queue drops the oldest pending alert.
        if self.alerts.is_full() {
            let _ = self.alerts.pop_front();
        }
        let _ = self.alerts.push_back(alert);
    }
}

impl<R, G, B, Z> Indicator for RgbIndicator<R, G, B, Z>
where
    R: SetDutyCycle,
    G: SetDutyCycle,
    B: SetDutyCycle,
    Z: OutputPin,
{
    fn start(&mut self) {
        self.shown = None;
        self.show(Rgb::BLACK);
        let _ = self.buzzer.set_low();
    }

    fn update(&mut self, now_us: u64) {
        let color = self.color_at(now_us);
        self.show(color);
        self.buzz(now_us);
    }

    fn set_steady(&mut self, color: Rgb) {
        self.steady = color;
    }

    fn set_blink(&mut self, color: Rgb) {
        self.blink = color;
    }

    fn set_pulse(&mut self, on_ms: u16, off_ms: u16) {
        self.pulse = Some((on_ms, off_ms));
        self.pulse_epoch = None;
    }

    fn disable_pulse(&mut self) {
        self.pulse = None;
        self.pulse_epoch = None;
    }

    fn beep(&mut self, ms: u16) {
        self.queue(Alert::Tone { ms });
    }

    fn beep_pattern(&mut self, pattern: u8) {
        self.queue(Alert::Pattern(pattern));
    }
}
