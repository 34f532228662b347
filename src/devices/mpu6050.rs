//! InvenSense MPU-6050 six-axis IMU over I2C.
//!
//! Configured for ±8 g and ±1000 °/s with the 188 Hz digital low-pass filter. Calibration is a
//! plain average of a burst of samples subtracted from every later reading.

use core::f32::consts::PI;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use micromath::F32Ext;

use super::InertialSensor;
use crate::config::GRAVITY;

/// Default 7-bit bus address (AD0 low).
pub const DEFAULT_ADDRESS: u8 = 0x68;

pub mod reg {
    pub const SMPLRT_DIV: u8 = 0x19;
    pub const CONFIG: u8 = 0x1A;
    pub const GYRO_CONFIG: u8 = 0x1B;
    pub const ACCEL_CONFIG: u8 = 0x1C;
    pub const ACCEL_XOUT_H: u8 = 0x3B;
    pub const PWR_MGMT_1: u8 = 0x6B;
    pub const WHO_AM_I: u8 = 0x75;
}

const WHO_AM_I_VALUE: u8 = 0x68;

/// LSB per g at AFS_SEL = 2.
const ACCEL_LSB_PER_G: f32 = 4096.0;
/// LSB per °/s at FS_SEL = 2.
const GYRO_LSB_PER_DPS: f32 = 32.8;

const CALIBRATION_SAMPLES: u16 = 200;
const CALIBRATION_INTERVAL_US: u32 = 2_000;
/// Mean rate above which the vehicle is assumed to be moving during gyro calibration (rad/s).
const MAX_REST_RATE: f32 = 0.2;
/// Allowed mismatch between measured and expected gravity magnitude (m/s²).
const MAX_GRAVITY_ERROR: f32 = 2.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Axes {
    x: f32,
    y: f32,
    z: f32,
}

pub struct Mpu6050<I, D> {
    i2c: I,
    delay: D,
    address: u8,

    accel: Axes,
    gyro: Axes,
    accel_offset: Axes,
    gyro_offset: Axes,

    /// Consecutive failed reads.
    errors: u32,
}

impl<I: I2c, D: DelayNs> Mpu6050<I, D> {
    pub fn new(i2c: I, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            accel: Axes::default(),
            gyro: Axes::default(),
            accel_offset: Axes::default(),
            gyro_offset: Axes::default(),
            errors: 0,
        }
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), I::Error> {
        self.i2c.write(self.address, &[reg, value])
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, I::Error> {
        let mut buf = [0u8; 1];
        self.i2c.write_read(self.address, &[reg], &mut buf)?;
        Ok(buf[0])
    }

    fn configure(&mut self) -> Result<(), I::Error> {
        // Wake up, clock from the X gyro PLL.
        self.write_reg(reg::PWR_MGMT_1, 0x01)?;
        self.delay.delay_ms(10);
        self.write_reg(reg::SMPLRT_DIV, 0x00)?;
        self.write_reg(reg::CONFIG, 0x01)?;
        self.write_reg(reg::GYRO_CONFIG, 2 << 3)?;
        self.write_reg(reg::ACCEL_CONFIG, 2 << 3)?;
        Ok(())
    }

    /// Read accelerometer (m/s²) and gyro (rad/s) without offsets applied.
    fn read_raw(&mut self) -> Result<(Axes, Axes), I::Error> {
        let mut buf = [0u8; 14];
        self.i2c
            .write_read(self.address, &[reg::ACCEL_XOUT_H], &mut buf)?;

        let word = |i: usize| f32::from(i16::from_be_bytes([buf[i], buf[i + 1]]));
        let accel_scale = GRAVITY / ACCEL_LSB_PER_G;
        let gyro_scale = PI / (180.0 * GYRO_LSB_PER_DPS);

        let accel = Axes {
            x: word(0) * accel_scale,
            y: word(2) * accel_scale,
            z: word(4) * accel_scale,
        };
        // Bytes 6..8 hold the die temperature.
        let gyro = Axes {
            x: word(8) * gyro_scale,
            y: word(10) * gyro_scale,
            z: word(12) * gyro_scale,
        };
        Ok((accel, gyro))
    }

    /// Average a burst of raw samples.
    fn average(&mut self) -> Result<(Axes, Axes), I::Error> {
        let mut accel = Axes::default();
        let mut gyro = Axes::default();
        for _ in 0..CALIBRATION_SAMPLES {
            let (a, g) = self.read_raw()?;
            accel.x += a.x;
            accel.y += a.y;
            accel.z += a.z;
            gyro.x += g.x;
            gyro.y += g.y;
            gyro.z += g.z;
            self.delay.delay_us(CALIBRATION_INTERVAL_US);
        }
        let n = f32::from(CALIBRATION_SAMPLES);
        Ok((
            Axes {
                x: accel.x / n,
                y: accel.y / n,
                z: accel.z / n,
            },
            Axes {
                x: gyro.x / n,
                y: gyro.y / n,
                z: gyro.z / n,
            },
        ))
    }

    /// Consecutive failed reads since the last good one.
    pub fn error_count(&self) -> u32 {
        self.errors
    }
}

impl<I: I2c, D: DelayNs> InertialSensor for Mpu6050<I, D> {
    fn start(&mut self) {
        match self.read_reg(reg::WHO_AM_I) {
            Ok(WHO_AM_I_VALUE) => {}
            Ok(other) => log_warn!("imu: unexpected WHO_AM_I {}", other),
            Err(_) => log_error!("imu: no response at address {}", self.address),
        }
        if self.configure().is_err() {
            log_error!("imu: configuration failed");
        }
    }

    fn update(&mut self) {
        match self.read_raw() {
            Ok((accel, gyro)) => {
                self.accel = accel;
                self.gyro = gyro;
                self.errors = 0;
            }
            Err(_) => {
                // Keep the previous sample.
                self.errors = self.errors.saturating_add(1);
            }
        }
    }

    fn calibrate_gyros(&mut self) -> bool {
        let Ok((_, gyro)) = self.average() else {
            return false;
        };
        let rate = (gyro.x * gyro.x + gyro.y * gyro.y + gyro.z * gyro.z).sqrt();
        if rate > MAX_REST_RATE {
            return false;
        }
        self.gyro_offset = gyro;
        true
    }

    fn calibrate_accel(&mut self, gx: f32, gy: f32, gz: f32) -> bool {
        let Ok((accel, _)) = self.average() else {
            return false;
        };
        let measured = (accel.x * accel.x + accel.y * accel.y + accel.z * accel.z).sqrt();
        let expected = (gx * gx + gy * gy + gz * gz).sqrt();
        if (measured - expected).abs() > MAX_GRAVITY_ERROR {
            return false;
        }
        self.accel_offset = Axes {
            x: accel.x - gx,
            y: accel.y - gy,
            z: accel.z - gz,
        };
        true
    }

    fn accel_y(&self) -> f32 {
        self.accel.y - self.accel_offset.y
    }

    fn accel_z(&self) -> f32 {
        self.accel.z - self.accel_offset.z
    }

    fn gyro_x(&self) -> f32 {
        self.gyro.x - self.gyro_offset.x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};

    /// Answers every burst read with the same sample.
    struct Bus {
        sample: [u8; 14],
        writes: std::vec::Vec<(u8, u8)>,
        fail: bool,
    }

    impl ErrorType for Bus {
        type Error = ErrorKind;
    }

    impl I2c for Bus {
        fn transaction(&mut self, _addr: u8, ops: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
            if self.fail {
                return Err(ErrorKind::Other);
            }
            let mut reg = 0u8;
            for op in ops.iter_mut() {
                match op {
                    Operation::Write(bytes) => {
                        reg = bytes[0];
                        if bytes.len() == 2 {
                            self.writes.push((bytes[0], bytes[1]));
                        }
                    }
                    Operation::Read(buf) => {
                        if reg == reg::WHO_AM_I {
                            buf[0] = WHO_AM_I_VALUE;
                        } else {
                            buf.copy_from_slice(&self.sample[..buf.len()]);
                        }
                    }
                }
            }
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn sample(ay: i16, az: i16, gx: i16) -> [u8; 14] {
        let mut s = [0u8; 14];
        s[2..4].copy_from_slice(&ay.to_be_bytes());
        s[4..6].copy_from_slice(&az.to_be_bytes());
        s[8..10].copy_from_slice(&gx.to_be_bytes());
        s
    }

    fn imu(sample: [u8; 14]) -> Mpu6050<Bus, NoDelay> {
        let bus = Bus {
            sample,
            writes: std::vec::Vec::new(),
            fail: false,
        };
        Mpu6050::new(bus, NoDelay, DEFAULT_ADDRESS)
    }

    #[test]
    fn start_selects_ranges() {
        let mut imu = imu([0; 14]);
        imu.start();
        assert!(imu.i2c.writes.contains(&(reg::GYRO_CONFIG, 0x10)));
        assert!(imu.i2c.writes.contains(&(reg::ACCEL_CONFIG, 0x10)));
    }

    #[test]
    fn readings_are_scaled() {
        let mut imu = imu(sample(0, 4096, 328));
        imu.update();
        assert!((imu.accel_z() - GRAVITY).abs() < 1e-3);
        assert!((imu.gyro_x() - 10.0_f32.to_radians()).abs() < 1e-3);
    }

    #[test]
    fn gyro_calibration_removes_bias() {
        let mut imu = imu(sample(0, 4096, 3));
        assert!(imu.calibrate_gyros());
        imu.update();
        assert!(imu.gyro_x().abs() < 1e-6);
    }

    #[test]
    fn calibration_fails_while_moving_or_on_bus_error() {
        let mut moving = imu(sample(0, 4096, 3280));
        assert!(!moving.calibrate_gyros());

        let mut tilted = imu(sample(0, 0, 0));
        assert!(!tilted.calibrate_accel(0.0, 0.0, GRAVITY));

        let mut broken = imu(sample(0, 4096, 0));
        broken.i2c.fail = true;
        assert!(!broken.calibrate_gyros());
        broken.update();
        assert_eq!(broken.error_count(), 1);
    }
}
