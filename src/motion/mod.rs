//! Motion points, plans and velocity commands.

use crate::time::Timestamp;
use nalgebra::Vector3;

mod profile;
pub use profile::{LinearMotionProfileGenerator, ProfileConfig, TrapezoidalProfile};

/// A desired state of the vehicle at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionPoint {
    pub timestamp: Timestamp,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
}

impl MotionPoint {
    /// A motion point with zero velocity and acceleration.
    pub fn at_rest(position: Vector3<f64>, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            position,
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
        }
    }

    /// Linearly interpolate between `self` and `next` at `time`.
    ///
    /// `time` is expected to lie between the two timestamps and `next` must be
    /// strictly later than `self`.
    pub fn interpolate(&self, next: &MotionPoint, time: Timestamp) -> MotionPoint {
        let fraction = time.seconds_since(self.timestamp) / next.timestamp.seconds_since(self.timestamp);

        MotionPoint {
            timestamp: time,
            position: lerp(&self.position, &next.position, fraction),
            velocity: lerp(&self.velocity, &next.velocity, fraction),
            acceleration: lerp(&self.acceleration, &next.acceleration, fraction),
        }
    }
}

fn lerp(first: &Vector3<f64>, second: &Vector3<f64>, fraction: f64) -> Vector3<f64> {
    first + (second - first) * fraction
}

/// Where a time falls relative to a [`MotionPlan`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// The time is earlier than the first point of the plan.
    Before(MotionPoint),

    /// The time is covered by the plan, the point is interpolated.
    Within(MotionPoint),

    /// The time is later than the last point of the plan.
    After(MotionPoint),
}

/// An ordered sequence of motion points with a fixed timestep.
///
/// Plans are never mutated once created, a re-plan produces a new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionPlan {
    points: Vec<MotionPoint>,
}

impl MotionPlan {
    pub fn new(points: Vec<MotionPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[MotionPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&MotionPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&MotionPoint> {
        self.points.last()
    }

    /// Sample the plan at `time`.
    ///
    /// A time equal to one of the plan's own timestamps returns that point unchanged.
    /// Returns `None` for an empty plan.
    pub fn sample(&self, time: Timestamp) -> Option<Sample> {
        let first = self.points.first()?;
        let last = self.points.last()?;

        if time < first.timestamp {
            return Some(Sample::Before(*first));
        }
        if time > last.timestamp {
            return Some(Sample::After(*last));
        }
        if time == last.timestamp {
            return Some(Sample::Within(*last));
        }

        let point = self
            .points
            .windows(2)
            .find(|pair| pair[0].timestamp <= time && time < pair[1].timestamp)
            .map(|pair| pair[0].interpolate(&pair[1], time))
            .unwrap_or(*last);
        Some(Sample::Within(point))
    }
}

impl<'a> IntoIterator for &'a MotionPlan {
    type Item = &'a MotionPoint;
    type IntoIter = core::slice::Iter<'a, MotionPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// A velocity a task wants the vehicle to reach, stamped with the time it applies from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityCommand {
    pub target_velocity: Vector3<f64>,
    pub target_timestamp: Timestamp,
}

impl VelocityCommand {
    pub fn new(target_velocity: Vector3<f64>, target_timestamp: Timestamp) -> Self {
        Self {
            target_velocity,
            target_timestamp,
        }
    }
}
