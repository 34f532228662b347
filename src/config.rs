//! Supervisor tuning and thresholds.

use core::f32::consts::PI;
use core::fmt;

use crate::control::BalanceGains;
use crate::handshake::ArmPolicy;

/// Standard gravity used as the accelerometer calibration reference (m/s²).
pub const GRAVITY: f32 = 9.806_65;

/// Thresholds, references and policies used by the supervisor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SupervisorConfig {
    /// |φ| above this is considered fallen (rad).
    pub fall_threshold: f32,
    /// |φ| below this is considered upright again (rad).
    pub upright_threshold: f32,
    /// Idle switches to Assist above this speed (m/s).
    pub assist_engage_speed: f32,
    /// Assist drops back to Idle below this speed (m/s).
    pub assist_release_speed: f32,
    /// Assist switches to Auto above this speed (m/s).
    pub high_speed_threshold: f32,
    /// Auto drops back to Assist below this speed (m/s).
    pub low_speed_threshold: f32,
    /// Roll reference fed to the balance law (rad).
    pub roll_reference: f32,
    /// Arm handshake retry policy.
    pub arm_policy: ArmPolicy,
    /// Wait before reading an inbound command so the whole record has arrived (ms).
    pub command_settle_ms: u32,
    /// Balance law gains.
    pub balance: BalanceGains,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            fall_threshold: PI / 4.0,
            upright_threshold: PI / 20.0,
            assist_engage_speed: 1.0,
            assist_release_speed: 0.5,
            high_speed_threshold: 2.5,
            low_speed_threshold: 2.0,
            roll_reference: 0.0,
            arm_policy: ArmPolicy::default(),
            command_settle_ms: 10,
            balance: BalanceGains::default(),
        }
    }
}

/// Rejected configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum ConfigError {
    /// The fall threshold must sit above the upright threshold.
    FallBand,
    /// The Auto engage speed must sit above the Auto release speed.
    AutoBand,
    /// The Assist engage speed must sit above the Assist release speed.
    AssistBand,
    /// A bounded handshake needs at least one attempt.
    ZeroArmAttempts,
    /// The balance torque limit must be positive.
    TorqueLimit,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConfigError::FallBand => "fall threshold must exceed upright threshold",
            ConfigError::AutoBand => "high speed threshold must exceed low speed threshold",
            ConfigError::AssistBand => "assist engage speed must exceed assist release speed",
            ConfigError::ZeroArmAttempts => "bounded arm policy needs at least one attempt",
            ConfigError::TorqueLimit => "torque limit must be positive",
        };
        f.write_str(msg)
    }
}

impl SupervisorConfig {
    /// Check that both hysteresis bands are open and the policies are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fall_threshold > self.upright_threshold) {
            return Err(ConfigError::FallBand);
        }
        if !(self.high_speed_threshold > self.low_speed_threshold) {
            return Err(ConfigError::AutoBand);
        }
        if !(self.assist_engage_speed > self.assist_release_speed) {
            return Err(ConfigError::AssistBand);
        }
        if let ArmPolicy::Bounded { attempts: 0, .. } = self.arm_policy {
            return Err(ConfigError::ZeroArmAttempts);
        }
        if !(self.balance.torque_limit > 0.0) {
            return Err(ConfigError::TorqueLimit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SupervisorConfig::default().validate(), Ok(()));
    }

    #[test]
    fn collapsed_bands_are_rejected() {
        let mut cfg = SupervisorConfig::default();
        cfg.upright_threshold = cfg.fall_threshold;
        assert_eq!(cfg.validate(), Err(ConfigError::FallBand));

        let mut cfg = SupervisorConfig::default();
        cfg.low_speed_threshold = 3.0;
        assert_eq!(cfg.validate(), Err(ConfigError::AutoBand));

        let mut cfg = SupervisorConfig::default();
        cfg.assist_release_speed = 1.0;
        assert_eq!(cfg.validate(), Err(ConfigError::AssistBand));
    }

    #[test]
    fn zero_attempt_budget_is_rejected() {
        let cfg = SupervisorConfig {
            arm_policy: ArmPolicy::Bounded {
                attempts: 0,
                interval_us: 100,
            },
            ..SupervisorConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroArmAttempts));
    }
}
