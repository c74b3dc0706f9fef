use super::{TaskController, TaskStatus, TaskStep, VehicleState};
use crate::{motion::VelocityCommand, transition::TransitionContext, Error, Result};
use nalgebra::Vector3;
use serde::Deserialize;
use tracing::{debug, info, trace};

/// Descent profile of the [`Land`] task. Rates are speeds downward.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LandConfig {
    /// Descent speed above the cushion height (m/s).
    pub descend_rate: f64,

    /// Acceleration toward the descent speed (m/s^2).
    pub descend_acceleration: f64,

    /// Descent speed below the cushion height (m/s).
    pub cushion_rate: f64,

    pub cushion_acceleration: f64,

    /// Height under which the descent slows to the cushion rate (m).
    pub cushion_height: f64,

    /// Height under which the vehicle is on the ground (m).
    pub landing_detected_height: f64,
}

impl Default for LandConfig {
    fn default() -> Self {
        Self {
            descend_rate: 0.5,
            descend_acceleration: 0.5,
            cushion_rate: 0.15,
            cushion_acceleration: 0.5,
            cushion_height: 0.4,
            landing_detected_height: 0.05,
        }
    }
}

impl LandConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("land.descend_rate", self.descend_rate),
            ("land.descend_acceleration", self.descend_acceleration),
            ("land.cushion_rate", self.cushion_rate),
            ("land.cushion_acceleration", self.cushion_acceleration),
            ("land.cushion_height", self.cushion_height),
            ("land.landing_detected_height", self.landing_detected_height),
        ] {
            if !value.is_finite() || value <= 0. {
                return Err(Error::Config(format!("{name} must be positive, got {value}")));
            }
        }
        Ok(())
    }
}

/// Descends in place until the ground is detected.
///
/// The descent speed ramps toward `descend_rate`, then toward the slower
/// `cushion_rate` once below `cushion_height`. The task is done as soon as
/// the height drops under `landing_detected_height`.
pub struct Land {
    config: LandConfig,
    update_period: f64,
    descend_rate: f64,
    canceled: bool,
}

impl Land {
    pub fn new(config: LandConfig, update_period: f64) -> Self {
        Self {
            config,
            update_period,
            descend_rate: 0.,
            canceled: false,
        }
    }

    /// The descent speed commanded by the last step (m/s).
    pub fn descend_rate(&self) -> f64 {
        self.descend_rate
    }
}

impl TaskController for Land {
    fn begin(&mut self, context: TransitionContext) {
        // Continue from whatever the vehicle was already descending at
        self.descend_rate = (-context.last_commanded_velocity.z).max(0.);
        debug!(descend_rate = self.descend_rate, "landing starting");
    }

    fn step(&mut self, state: &VehicleState) -> TaskStep {
        if self.canceled {
            return TaskStep::finished(TaskStatus::Canceled);
        }

        let height = state.position.z;
        if height < self.config.landing_detected_height {
            info!(height, "landing detected");
            return TaskStep::finished(TaskStatus::Done);
        }

        let (rate, acceleration) = if height < self.config.cushion_height {
            (self.config.cushion_rate, self.config.cushion_acceleration)
        } else {
            (self.config.descend_rate, self.config.descend_acceleration)
        };
        let max_change = acceleration * self.update_period;
        self.descend_rate += (rate - self.descend_rate).clamp(-max_change, max_change);
        trace!(height, descend_rate = self.descend_rate, "descending");

        TaskStep::running(VelocityCommand::new(
            Vector3::new(0., 0., -self.descend_rate),
            state.timestamp,
        ))
    }

    fn cancel(&mut self) -> bool {
        self.canceled = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{Land, LandConfig};
    use crate::task::{TaskController, TaskStatus, VehicleState};
    use crate::time::Timestamp;
    use crate::transition::TransitionContext;
    use crate::Error;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn config() -> LandConfig {
        LandConfig {
            descend_rate: 1.,
            descend_acceleration: 2.,
            cushion_rate: 0.2,
            cushion_acceleration: 4.,
            cushion_height: 0.5,
            landing_detected_height: 0.1,
        }
    }

    fn at_height(z: f64) -> VehicleState {
        VehicleState {
            timestamp: Timestamp::from_secs_f64(3.),
            position: Vector3::new(1., 1., z),
            velocity: Vector3::zeros(),
        }
    }

    fn context(z_velocity: f64) -> TransitionContext {
        TransitionContext {
            last_commanded_velocity: Vector3::new(0., 0., z_velocity),
            last_ending_status: None,
            timeout_fallback_sent: false,
        }
    }

    #[test]
    fn ramps_up_to_descend_rate() {
        let mut land = Land::new(config(), 0.1);
        land.begin(context(0.));

        let mut rates = Vec::new();
        for _ in 0..7 {
            let step = land.step(&at_height(3.));
            assert_eq!(step.status, TaskStatus::Running);
            rates.push(-step.command.unwrap().target_velocity.z);
        }

        assert_relative_eq!(rates[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(rates[3], 0.8, epsilon = 1e-12);
        assert_relative_eq!(rates[6], 1., epsilon = 1e-12);
    }

    #[test]
    fn slows_to_cushion_rate_near_the_ground() {
        let mut land = Land::new(config(), 0.1);
        land.begin(context(-1.));
        assert_relative_eq!(land.descend_rate(), 1.);

        land.step(&at_height(0.4));
        assert_relative_eq!(land.descend_rate(), 0.6, epsilon = 1e-12);

        let step = land.step(&at_height(0.3));
        assert_relative_eq!(land.descend_rate(), 0.2, epsilon = 1e-12);

        let command = step.command.unwrap();
        assert_eq!(command.target_timestamp, Timestamp::from_secs_f64(3.));
        assert_relative_eq!(command.target_velocity, Vector3::new(0., 0., -0.2), epsilon = 1e-12);
    }

    #[test]
    fn done_below_detected_height() {
        let mut land = Land::new(config(), 0.1);
        land.begin(context(0.5));
        assert_eq!(land.descend_rate(), 0.);

        let step = land.step(&at_height(0.05));
        assert_eq!(step.status, TaskStatus::Done);
        assert_eq!(step.command, None);
    }

    #[test]
    fn cancel_is_accepted() {
        let mut land = Land::new(config(), 0.1);
        land.begin(context(0.));
        assert!(land.cancel());
        assert_eq!(land.step(&at_height(2.)).status, TaskStatus::Canceled);
    }

    #[test]
    fn rejects_non_positive_limits() {
        assert!(LandConfig::default().validate().is_ok());

        let config = LandConfig {
            cushion_rate: 0.,
            ..LandConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
