use super::{TaskController, TaskStatus, TaskStep, VehicleState};
use crate::{motion::VelocityCommand, transition::TransitionContext};
use nalgebra::{Vector2, Vector3};
use serde::Deserialize;
use tracing::{debug, trace};

/// Limits of the position hold law.
#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PositionHoldConfig {
    /// Maximum horizontal acceleration (m/s^2).
    pub max_translation_acceleration: f64,

    /// Maximum horizontal speed (m/s).
    pub max_translation_speed: f64,

    /// Distance to the hold point under which the vehicle is commanded to stop (m).
    pub translation_position_hold_tolerance: f64,
}

/// Drives to and holds a horizontal position with a trapezoidal acceleration law.
///
/// Accelerates toward the hold point until the maximum speed, then coasts,
/// and decelerates once stopping within the remaining distance would need the
/// maximum acceleration. Inside the tolerance the horizontal velocity is zero.
pub struct PositionHold {
    config: PositionHoldConfig,
    hold: Option<Vector2<f64>>,
    z_velocity: Option<f64>,
    update_period: f64,
    canceled: bool,
}

impl PositionHold {
    /// Hold the position the vehicle is at when the task starts.
    pub fn new(config: PositionHoldConfig, update_period: f64) -> Self {
        Self {
            config,
            hold: None,
            z_velocity: None,
            update_period,
            canceled: false,
        }
    }

    /// Hold a fixed horizontal position.
    pub fn at(config: PositionHoldConfig, update_period: f64, x: f64, y: f64) -> Self {
        Self {
            hold: Some(Vector2::new(x, y)),
            ..Self::new(config, update_period)
        }
    }

    /// Builder method to command a vertical velocity while holding.
    pub fn with_z_velocity(mut self, z_velocity: f64) -> Self {
        self.z_velocity = Some(z_velocity);
        self
    }

    /// Horizontal velocity response for the vehicle at `position` moving at `velocity`.
    pub fn hold_response(&self, position: Vector2<f64>, velocity: Vector2<f64>) -> Vector2<f64> {
        let hold = self.hold.unwrap_or(position);
        let delta = position - hold;

        let speed = velocity.norm();
        let distance = delta.norm();

        if distance <= self.config.translation_position_hold_tolerance {
            trace!("position hold tolerance hit");
            return Vector2::zeros();
        }

        let acceleration = self.trapezoidal_acceleration(distance, speed);
        let angle = delta.y.atan2(delta.x);

        // Push the velocity toward the hold point, opposite to the offset
        velocity + acceleration * self.update_period * -Vector2::new(angle.cos(), angle.sin())
    }

    fn trapezoidal_acceleration(&self, distance: f64, speed: f64) -> f64 {
        if distance == 0. {
            return 0.;
        }

        // Acceleration needed to stop exactly at the hold point
        let stopping_acceleration = speed.powi(2) / (2. * distance);

        if stopping_acceleration < self.config.max_translation_acceleration {
            if speed < self.config.max_translation_speed {
                self.config.max_translation_acceleration
            } else {
                0.
            }
        } else {
            -self.config.max_translation_acceleration
        }
    }
}

impl TaskController for PositionHold {
    fn begin(&mut self, context: TransitionContext) {
        debug!(
            last_velocity = ?context.last_commanded_velocity,
            timeout_sent = context.timeout_fallback_sent,
            "position hold starting"
        );
    }

    fn step(&mut self, state: &VehicleState) -> TaskStep {
        if self.canceled {
            return TaskStep::finished(TaskStatus::Canceled);
        }

        let position = state.position.xy();
        if self.hold.is_none() {
            debug!(x = position.x, y = position.y, "latching hold position");
            self.hold = Some(position);
        }

        let response = self.hold_response(position, state.velocity.xy());
        let z = self.z_velocity.unwrap_or(0.);

        TaskStep::running(VelocityCommand::new(
            Vector3::new(response.x, response.y, z),
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
    use super::{PositionHold, PositionHoldConfig};
    use crate::task::{TaskController, TaskStatus, VehicleState};
    use crate::time::Timestamp;
    use approx::assert_relative_eq;
    use nalgebra::{Vector2, Vector3};

    fn config() -> PositionHoldConfig {
        PositionHoldConfig {
            max_translation_acceleration: 1.,
            max_translation_speed: 2.,
            translation_position_hold_tolerance: 0.1,
        }
    }

    #[test]
    fn accelerates_toward_hold_point() {
        let hold = PositionHold::at(config(), 0.1, 0., 0.);
        let response = hold.hold_response(Vector2::new(4., 0.), Vector2::zeros());
        assert_relative_eq!(response, Vector2::new(-0.1, 0.), epsilon = 1e-12);
    }

    #[test]
    fn coasts_at_max_speed() {
        let hold = PositionHold::at(config(), 0.1, 0., 0.);
        let response = hold.hold_response(Vector2::new(0., 10.), Vector2::new(0., -2.));
        assert_relative_eq!(response, Vector2::new(0., -2.), epsilon = 1e-12);
    }

    #[test]
    fn decelerates_when_close() {
        let hold = PositionHold::at(config(), 0.1, 0., 0.);
        // 1.5^2 / (2 * 1) > 1, brake
        let response = hold.hold_response(Vector2::new(1., 0.), Vector2::new(-1.5, 0.));
        assert_relative_eq!(response, Vector2::new(-1.4, 0.), epsilon = 1e-12);
    }

    #[test]
    fn stops_inside_tolerance() {
        let hold = PositionHold::at(config(), 0.1, 0., 0.);
        let response = hold.hold_response(Vector2::new(0.05, 0.), Vector2::new(0.3, 0.));
        assert_eq!(response, Vector2::zeros());
    }

    #[test]
    fn latches_position_and_keeps_z_velocity() {
        let mut hold = PositionHold::new(config(), 0.1).with_z_velocity(-0.5);
        let state = VehicleState {
            timestamp: Timestamp::from_secs_f64(2.),
            position: Vector3::new(3., 4., 5.),
            velocity: Vector3::zeros(),
        };

        let step = hold.step(&state);
        assert_eq!(step.status, TaskStatus::Running);

        let command = step.command.unwrap();
        assert_eq!(command.target_timestamp, state.timestamp);
        assert_eq!(command.target_velocity, Vector3::new(0., 0., -0.5));
    }

    #[test]
    fn cancel_is_accepted() {
        let mut hold = PositionHold::new(config(), 0.1);
        assert!(hold.cancel());

        let state = VehicleState {
            timestamp: Timestamp::default(),
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
        };
        assert_eq!(hold.step(&state).status, TaskStatus::Canceled);
    }
}
