use crate::{motion::MotionPlan, time::Timestamp};
use nalgebra::Vector3;

/// Frame of every velocity command sent to the vehicle.
pub const LEVEL_FRAME: &str = "level_quad";

/// A velocity command as published to the actuation layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampedVelocity {
    pub frame_id: &'static str,
    pub timestamp: Timestamp,
    pub linear: Vector3<f64>,
}

impl StampedVelocity {
    /// A velocity in the vehicle's level frame.
    pub fn level(linear: Vector3<f64>, timestamp: Timestamp) -> Self {
        Self {
            frame_id: LEVEL_FRAME,
            timestamp,
            linear,
        }
    }
}

/// Receives the commands produced by the coordinator.
pub trait CommandSink: Send {
    fn publish_velocity(&mut self, velocity: &StampedVelocity);

    /// Publish a feed-forward trajectory.
    fn publish_plan(&mut self, plan: &MotionPlan);
}

/// Estimated vehicle state.
pub trait Sensors: Send {
    fn velocity(&mut self) -> Vector3<f64>;

    fn position(&mut self) -> Vector3<f64>;
}
