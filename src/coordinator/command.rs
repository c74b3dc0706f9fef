use crate::{
    hal::{CommandSink, StampedVelocity},
    motion::{LinearMotionProfileGenerator, MotionPlan, MotionPoint, VelocityCommand},
    task::VehicleState,
    time::Timestamp,
};
use nalgebra::Vector3;
use tracing::{debug, trace, warn};

/// Turns velocity commands into published motion plans.
pub struct CommandHandler {
    generator: LinearMotionProfileGenerator,
    sink: Box<dyn CommandSink>,
    last_velocity: Vector3<f64>,
}

impl CommandHandler {
    pub fn new(generator: LinearMotionProfileGenerator, sink: Box<dyn CommandSink>) -> Self {
        Self {
            generator,
            sink,
            last_velocity: Vector3::zeros(),
        }
    }

    /// The target velocity of the last command sent.
    pub fn last_velocity(&self) -> Vector3<f64> {
        self.last_velocity
    }

    /// Start the next plan from the measured state of the vehicle,
    /// unless a previous plan already gives a continuous start.
    pub fn prepare(&mut self, state: &VehicleState) {
        if self.generator.last_plan().is_some() {
            return;
        }

        debug!(position = ?state.position, velocity = ?state.velocity, "starting plans from measured state");
        self.generator.reinitialize_start(MotionPoint {
            timestamp: state.timestamp,
            position: state.position,
            velocity: state.velocity,
            acceleration: Vector3::zeros(),
        });
    }

    /// Plan toward `command` and publish the plan with its velocity.
    pub fn send(&mut self, command: &VelocityCommand, now: Timestamp) -> MotionPlan {
        trace!(velocity = ?command.target_velocity, "sending velocity command");
        let plan = self.generator.generate_plan(command, now);
        self.sink.publish_plan(&plan);

        let velocity = StampedVelocity::level(command.target_velocity, command.target_timestamp);
        self.sink.publish_velocity(&velocity);
        self.last_velocity = command.target_velocity;

        plan
    }

    /// Send the fallback command used when no task arrives in time.
    pub fn send_timeout(&mut self, command: &VelocityCommand, now: Timestamp) {
        warn!(velocity = ?command.target_velocity, "sending idle timeout command");
        self.send(command, now);
    }
}
