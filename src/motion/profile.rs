use super::{MotionPlan, MotionPoint, Sample, VelocityCommand};
use crate::{time::Timestamp, Error, Result};
use nalgebra::Vector3;
use serde::Deserialize;
use tracing::{debug, trace};

/// Parameters of a [`LinearMotionProfileGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ProfileConfig {
    /// Magnitude of the acceleration used to reach a new velocity (m/s^2).
    pub acceleration: f64,

    /// Length of each generated plan (s).
    pub duration: f64,

    /// Time between two samples of a plan (s).
    pub timestep: f64,
}

impl ProfileConfig {
    pub fn new(acceleration: f64, duration: f64, timestep: f64) -> Self {
        Self {
            acceleration,
            duration,
            timestep,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("linear_motion_profile_acceleration", self.acceleration),
            ("linear_motion_profile_duration", self.duration),
            ("linear_motion_profile_timestep", self.timestep),
        ] {
            if !value.is_finite() || value <= 0. {
                return Err(Error::Config(format!("{name} must be positive, got {value}")));
            }
        }
        Ok(())
    }
}

/// Velocity, acceleration and position samples of a trapezoidal velocity profile.
///
/// The velocity ramps from the start velocity toward the target at a constant
/// acceleration and then holds the target for the rest of the plan duration.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapezoidalProfile {
    pub velocities: Vec<Vector3<f64>>,

    /// First difference of `velocities` divided by the timestep,
    /// one element shorter than `velocities`.
    pub accelerations: Vec<Vector3<f64>>,

    /// Cumulative sum of `velocities` times the timestep offset by the start position.
    /// `positions[i]` is reached after integrating `velocities[i]`.
    pub positions: Vec<Vector3<f64>>,
}

impl TrapezoidalProfile {
    pub fn new(
        config: &ProfileConfig,
        start_position: Vector3<f64>,
        start_velocity: Vector3<f64>,
        target_velocity: Vector3<f64>,
    ) -> Self {
        let dt = config.timestep;
        let delta = target_velocity - start_velocity;
        let delta_norm = delta.norm();

        // A zero delta has no direction, hold the current velocity
        let acceleration = if delta_norm == 0. {
            Vector3::zeros()
        } else {
            delta * (config.acceleration / delta_norm)
        };

        let acceleration_time = (delta_norm / config.acceleration).min(config.duration);
        let steady_time = config.duration - acceleration_time;

        let acceleration_steps = (acceleration_time / dt).floor() as usize;
        let steady_steps = (steady_time / dt).floor() as usize;

        let mut velocities = Vec::with_capacity(1 + acceleration_steps + steady_steps);
        velocities.push(start_velocity);
        velocities.extend(
            (1..=acceleration_steps).map(|step| start_velocity + acceleration * (step as f64 * dt)),
        );
        velocities.extend(core::iter::repeat(target_velocity).take(steady_steps));

        let accelerations = velocities
            .windows(2)
            .map(|pair| (pair[1] - pair[0]) / dt)
            .collect();

        let positions = velocities
            .iter()
            .scan(start_position, |position, velocity| {
                *position += velocity * dt;
                Some(*position)
            })
            .collect();

        Self {
            velocities,
            accelerations,
            positions,
        }
    }
}

/// Generates motion plans that reach a velocity with a bounded acceleration.
///
/// Each plan starts on the previous plan at the time of the new command,
/// so successive commands produce a continuous trajectory.
///
/// ```
/// use flight_tasks::motion::{LinearMotionProfileGenerator, ProfileConfig, VelocityCommand};
/// use flight_tasks::time::Timestamp;
/// use nalgebra::Vector3;
/// use approx::assert_relative_eq;
///
/// let config = ProfileConfig::new(1., 5., 0.5);
/// let mut generator = LinearMotionProfileGenerator::new(config).unwrap();
///
/// let now = Timestamp::default();
/// let command = VelocityCommand::new(Vector3::new(2., 0., 0.), now);
/// let plan = generator.generate_plan(&command, now);
///
/// assert_eq!(plan.len(), 10);
/// assert_relative_eq!(plan.points()[4].velocity, Vector3::new(2., 0., 0.));
/// ```
#[derive(Debug, Clone)]
pub struct LinearMotionProfileGenerator {
    config: ProfileConfig,
    last_plan: Option<MotionPlan>,
    pending_start: Option<MotionPoint>,
}

impl LinearMotionProfileGenerator {
    /// Create a new generator, failing if any parameter is not positive.
    pub fn new(config: ProfileConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            last_plan: None,
            pending_start: None,
        })
    }

    /// The most recently generated plan.
    pub fn last_plan(&self) -> Option<&MotionPlan> {
        self.last_plan.as_ref()
    }

    /// Force the next plan to start at `point` instead of the previous plan.
    pub fn reinitialize_start(&mut self, point: MotionPoint) {
        self.pending_start = Some(point);
    }

    /// Generate a plan that reaches `command.target_velocity`.
    ///
    /// `now` is the current time, no plan starts earlier than it.
    pub fn generate_plan(&mut self, command: &VelocityCommand, now: Timestamp) -> MotionPlan {
        let start = self.start_point(command.target_timestamp, now);
        let profile = TrapezoidalProfile::new(
            &self.config,
            start.position,
            start.velocity,
            command.target_velocity,
        );
        let TrapezoidalProfile {
            velocities,
            accelerations,
            positions,
        } = profile;

        let mut points = Vec::with_capacity(velocities.len().max(2) - 1);
        points.push(MotionPoint {
            timestamp: start.timestamp,
            position: start.position,
            velocity: start.velocity,
            acceleration: accelerations.first().copied().unwrap_or_else(Vector3::zeros),
        });

        // Positions lag by one index since they integrate the previous velocity
        for i in 1..velocities.len().saturating_sub(1) {
            points.push(MotionPoint {
                timestamp: start.timestamp.offset_secs(i as f64 * self.config.timestep),
                position: positions[i - 1],
                velocity: velocities[i],
                acceleration: accelerations[i],
            });
        }

        trace!(
            points = points.len(),
            start = start.timestamp.as_micros(),
            "generated motion plan"
        );

        let plan = MotionPlan::new(points);
        self.last_plan = Some(plan.clone());
        plan
    }

    fn start_point(&mut self, time: Timestamp, now: Timestamp) -> MotionPoint {
        if let Some(mut point) = self.pending_start.take() {
            point.timestamp = point.timestamp.max(now);
            return point;
        }

        let time = time.max(now);
        match self.last_plan.as_ref().and_then(|plan| plan.sample(time)) {
            Some(Sample::Within(point)) => point,
            Some(Sample::Before(first)) => {
                debug!(
                    requested = time.as_micros(),
                    plan_start = first.timestamp.as_micros(),
                    "re-plan requested before the last plan, starting from its first point"
                );
                first
            }
            Some(Sample::After(mut last)) => {
                debug!("re-plan requested past the last plan, restarting from its final point");
                last.timestamp = now;
                last
            }
            None => MotionPoint::at_rest(Vector3::zeros(), time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LinearMotionProfileGenerator, ProfileConfig, TrapezoidalProfile};
    use crate::motion::{MotionPoint, VelocityCommand};
    use crate::time::Timestamp;
    use crate::Error;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn generator() -> LinearMotionProfileGenerator {
        LinearMotionProfileGenerator::new(ProfileConfig::new(1., 5., 0.5)).unwrap()
    }

    #[test]
    fn rejects_non_positive_parameters() {
        for config in [
            ProfileConfig::new(0., 5., 0.5),
            ProfileConfig::new(1., -5., 0.5),
            ProfileConfig::new(1., 5., 0.),
            ProfileConfig::new(f64::NAN, 5., 0.5),
        ] {
            assert!(matches!(
                LinearMotionProfileGenerator::new(config),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn trapezoid_ramps_then_holds() {
        let profile = TrapezoidalProfile::new(
            &ProfileConfig::new(1., 5., 0.5),
            Vector3::zeros(),
            Vector3::zeros(),
            Vector3::new(2., 0., 0.),
        );

        // 2s of acceleration (4 steps) and 3s of steady velocity (6 steps)
        assert_eq!(profile.velocities.len(), 11);
        assert_eq!(profile.accelerations.len(), 10);
        assert_eq!(profile.positions.len(), 11);

        assert_relative_eq!(profile.velocities[0], Vector3::zeros());
        assert_relative_eq!(profile.velocities[1], Vector3::new(0.5, 0., 0.));
        assert_relative_eq!(profile.velocities[4], Vector3::new(2., 0., 0.));
        assert_relative_eq!(profile.velocities[10], Vector3::new(2., 0., 0.));

        for acceleration in &profile.accelerations[..4] {
            assert_relative_eq!(*acceleration, Vector3::new(1., 0., 0.));
        }
        for acceleration in &profile.accelerations[4..] {
            assert_relative_eq!(*acceleration, Vector3::zeros());
        }

        // Integral of the trapezoid plus the first sample
        assert_relative_eq!(profile.positions[10], Vector3::new(8.5, 0., 0.), epsilon = 1e-9);
    }

    #[test]
    fn unreachable_velocity_ramps_for_whole_duration() {
        let config = ProfileConfig::new(1., 5., 0.5);
        let target = Vector3::new(0., 0., -20.);
        let profile = TrapezoidalProfile::new(&config, Vector3::zeros(), Vector3::zeros(), target);

        assert_eq!(profile.velocities.len(), 11);
        let last = profile.velocities[10];
        assert_relative_eq!(last, Vector3::new(0., 0., -5.), epsilon = 1e-9);
        assert!(last.norm() <= target.norm());
    }

    #[test]
    fn zero_delta_holds_velocity() {
        let velocity = Vector3::new(1., -1., 0.5);
        let profile = TrapezoidalProfile::new(
            &ProfileConfig::new(1., 5., 0.5),
            Vector3::zeros(),
            velocity,
            velocity,
        );

        assert_eq!(profile.velocities.len(), 11);
        assert!(profile.velocities.iter().all(|v| *v == velocity));
        assert!(profile.accelerations.iter().all(|a| *a == Vector3::zeros()));
    }

    #[test]
    fn plan_matches_profile() {
        let mut generator = generator();
        let now = Timestamp::from_secs_f64(100.);
        let command = VelocityCommand::new(Vector3::new(2., 0., 0.), now);
        let plan = generator.generate_plan(&command, now);

        assert_eq!(plan.len(), 10);
        assert_eq!(plan.first().unwrap().timestamp, now);
        assert_relative_eq!(plan.first().unwrap().velocity, Vector3::zeros());
        assert_relative_eq!(plan.first().unwrap().acceleration, Vector3::new(1., 0., 0.));
        assert_relative_eq!(plan.last().unwrap().velocity, Vector3::new(2., 0., 0.));
        assert_eq!(generator.last_plan(), Some(&plan));
    }

    #[test]
    fn timestamps_are_evenly_spaced() {
        let mut generator = generator();
        let now = Timestamp::from_secs_f64(3.);
        let plan = generator.generate_plan(&VelocityCommand::new(Vector3::new(0., 1., 0.), now), now);

        for pair in plan.points().windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
            assert_eq!(pair[1].timestamp.as_micros() - pair[0].timestamp.as_micros(), 500_000);
        }
    }

    #[test]
    fn emitted_samples_integrate_consistently() {
        let mut generator = generator();
        let now = Timestamp::default();
        generator.reinitialize_start(MotionPoint {
            timestamp: now,
            position: Vector3::new(1., 2., 3.),
            velocity: Vector3::new(0.5, 0., -0.25),
            acceleration: Vector3::zeros(),
        });
        let plan = generator.generate_plan(
            &VelocityCommand::new(Vector3::new(-1., 1.5, 0.), now),
            now,
        );

        let dt = 0.5;
        let start = plan.points()[0];
        let mut velocity = start.velocity;
        let mut position = start.position;
        for point in plan.points() {
            assert_relative_eq!(point.velocity, velocity, epsilon = 1e-9);
            assert_relative_eq!(point.position, position, epsilon = 1e-9);
            velocity += point.acceleration * dt;
            position += point.velocity * dt;
        }
    }

    #[test]
    fn replan_starts_on_previous_plan() {
        let mut generator = generator();
        let now = Timestamp::default();
        let first = generator.generate_plan(&VelocityCommand::new(Vector3::new(2., 0., 0.), now), now);

        let sample = first.points()[3];
        let second = generator.generate_plan(
            &VelocityCommand::new(Vector3::new(-1., 0., 0.), sample.timestamp),
            now,
        );

        let start = second.points()[0];
        assert_eq!(start.timestamp, sample.timestamp);
        assert_eq!(start.position, sample.position);
        assert_eq!(start.velocity, sample.velocity);
    }

    #[test]
    fn replan_interpolates_between_samples() {
        let mut generator = generator();
        let now = Timestamp::default();
        generator.generate_plan(&VelocityCommand::new(Vector3::new(2., 0., 0.), now), now);

        let time = Timestamp::from_secs_f64(0.25);
        let plan = generator.generate_plan(&VelocityCommand::new(Vector3::new(2., 0., 0.), time), now);

        let start = plan.points()[0];
        assert_eq!(start.timestamp, time);
        assert_relative_eq!(start.velocity, Vector3::new(0.25, 0., 0.));
    }

    #[test]
    fn replan_past_horizon_restarts_from_final_point() {
        let mut generator = generator();
        let start = Timestamp::default();
        let first = generator.generate_plan(&VelocityCommand::new(Vector3::new(2., 0., 0.), start), start);
        let last = *first.last().unwrap();

        let now = Timestamp::from_secs_f64(60.);
        let plan = generator.generate_plan(&VelocityCommand::new(Vector3::new(2., 0., 0.), now), now);

        let point = plan.points()[0];
        assert_eq!(point.timestamp, now);
        assert_eq!(point.position, last.position);
        assert_eq!(point.velocity, last.velocity);
    }

    #[test]
    fn stale_command_never_starts_before_now() {
        let mut generator = generator();
        let now = Timestamp::from_secs_f64(10.);
        generator.generate_plan(&VelocityCommand::new(Vector3::new(1., 0., 0.), now), now);

        let later = Timestamp::from_secs_f64(11.);
        let plan = generator.generate_plan(&VelocityCommand::new(Vector3::new(1., 0., 0.), now), later);
        assert!(plan.points()[0].timestamp >= later);
    }

    #[test]
    fn pending_start_is_used_once_and_clamped_to_now() {
        let mut generator = generator();
        let point = MotionPoint::at_rest(Vector3::new(0., 0., 1.5), Timestamp::from_secs_f64(1.));
        generator.reinitialize_start(point);

        let now = Timestamp::from_secs_f64(2.);
        let plan = generator.generate_plan(&VelocityCommand::new(Vector3::zeros(), now), now);
        assert_eq!(plan.points()[0].timestamp, now);
        assert_eq!(plan.points()[0].position, point.position);

        // The next plan starts on the previous plan again
        let next = generator.generate_plan(&VelocityCommand::new(Vector3::zeros(), now), now);
        assert_eq!(next.points()[0], plan.points()[0]);
    }
}
