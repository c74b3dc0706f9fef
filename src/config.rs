//! Coordinator configuration.
//!
//! Every option is required except the position hold and landing tables,
//! a missing value is a configuration error rather than a silent default.
//!
//! ```
//! use flight_tasks::Config;
//!
//! let config = Config::from_toml_str(
//!     r#"
//!     update_rate = 30.0
//!     task_timeout = 0.5
//!     linear_motion_profile_acceleration = 1.0
//!     linear_motion_profile_duration = 5.0
//!     linear_motion_profile_timestep = 0.1
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.profile().timestep, 0.1);
//! ```

use crate::{motion::ProfileConfig, task::{LandConfig, PositionHoldConfig}, Error, Result};
use core::time::Duration;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Control loop frequency (Hz).
    pub update_rate: f64,

    /// Time without a task before the fallback velocity is sent (s).
    pub task_timeout: f64,

    /// Acceleration magnitude of generated motion plans (m/s^2).
    pub linear_motion_profile_acceleration: f64,

    /// Duration of generated motion plans (s).
    pub linear_motion_profile_duration: f64,

    /// Sample spacing of generated motion plans (s).
    pub linear_motion_profile_timestep: f64,

    #[serde(default)]
    pub position_hold: PositionHoldConfig,

    #[serde(default)]
    pub land: LandConfig,
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.profile().validate()?;
        self.update_period()?;
        self.task_timeout()?;
        self.land.validate()?;
        Ok(())
    }

    pub fn profile(&self) -> ProfileConfig {
        ProfileConfig::new(
            self.linear_motion_profile_acceleration,
            self.linear_motion_profile_duration,
            self.linear_motion_profile_timestep,
        )
    }

    /// Time between two ticks of the control loop.
    pub fn update_period(&self) -> Result<Duration> {
        if !(self.update_rate.is_finite() && self.update_rate > 0.) {
            return Err(Error::Config(format!(
                "update_rate must be positive, got {}",
                self.update_rate
            )));
        }
        positive_duration("update_rate", 1. / self.update_rate)
    }

    pub fn task_timeout(&self) -> Result<Duration> {
        positive_duration("task_timeout", self.task_timeout)
    }
}

fn positive_duration(name: &str, secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(Error::Config(format!("{name} must be positive, got {secs}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::{task::LandConfig, Error};
    use core::time::Duration;

    const CONFIG: &str = r#"
        update_rate = 20.0
        task_timeout = 0.25
        linear_motion_profile_acceleration = 1.5
        linear_motion_profile_duration = 4.0
        linear_motion_profile_timestep = 0.05

        [position_hold]
        max_translation_speed = 3.0

        [land]
        cushion_height = 0.6
    "#;

    #[test]
    fn parses_named_options() {
        let config = Config::from_toml_str(CONFIG).unwrap();

        assert_eq!(config.update_period().unwrap(), Duration::from_millis(50));
        assert_eq!(config.task_timeout().unwrap(), Duration::from_millis(250));
        assert_eq!(config.profile().acceleration, 1.5);
        assert_eq!(config.profile().duration, 4.0);
        assert_eq!(config.position_hold.max_translation_speed, 3.0);
        assert_eq!(config.position_hold.max_translation_acceleration, 0.0);
        assert_eq!(config.land.cushion_height, 0.6);
        assert_eq!(config.land.descend_rate, LandConfig::default().descend_rate);
    }

    #[test]
    fn missing_option_is_an_error() {
        let config = CONFIG.replace("linear_motion_profile_timestep = 0.05", "");
        assert!(matches!(
            Config::from_toml_str(&config),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn non_positive_option_is_an_error() {
        for (from, to) in [
            ("linear_motion_profile_timestep = 0.05", "linear_motion_profile_timestep = 0.0"),
            ("linear_motion_profile_acceleration = 1.5", "linear_motion_profile_acceleration = -1.5"),
            ("update_rate = 20.0", "update_rate = 0.0"),
            ("task_timeout = 0.25", "task_timeout = -1.0"),
            ("cushion_height = 0.6", "cushion_height = 0.0"),
        ] {
            let config = CONFIG.replace(from, to);
            assert!(matches!(
                Config::from_toml_str(&config),
                Err(Error::Config(_))
            ));
        }
    }
}
