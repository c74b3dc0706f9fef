//! Task transition rules and the continuity data handed between tasks.

use crate::{
    gateway::TaskRequest,
    motion::VelocityCommand,
    task::{TaskKind, TaskStatus},
    time::Timestamp,
};
use nalgebra::Vector3;
use tracing::{debug, warn};

/// State left behind by the previous task, handed to the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionContext {
    pub last_commanded_velocity: Vector3<f64>,

    /// How the previous task ended, `None` before the first task.
    pub last_ending_status: Option<TaskStatus>,

    /// Whether the idle fallback velocity was sent since the previous task ended.
    pub timeout_fallback_sent: bool,
}

/// Decides whether a requested task may follow the current state of the vehicle.
pub trait TransitionValidator: Send {
    /// Returns `true` if `request` may start given `context`.
    fn check_transition(&self, context: &TransitionContext, request: &TaskRequest) -> bool;

    /// Complete the context before it is handed to the new task.
    fn fill_out_transition(&self, context: TransitionContext) -> TransitionContext {
        context
    }

    /// The command sent when no task has been running for too long.
    fn timeout_command(&self, last_velocity: &Vector3<f64>, now: Timestamp) -> VelocityCommand {
        let _ = last_velocity;
        VelocityCommand::new(Vector3::zeros(), now)
    }

    /// Called once when a safety episode begins.
    fn signal_safety_active(&mut self) {}
}

/// The default validator.
///
/// Any task may follow any other until a safety episode begins,
/// after which only landing is allowed.
#[derive(Debug, Default)]
pub struct StateMonitor {
    safety_active: bool,
}

impl StateMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_safety_active(&self) -> bool {
        self.safety_active
    }
}

impl TransitionValidator for StateMonitor {
    fn check_transition(&self, context: &TransitionContext, request: &TaskRequest) -> bool {
        if self.safety_active && request.kind != TaskKind::Land {
            warn!(kind = %request.kind, "only landing is allowed during a safety episode");
            return false;
        }

        debug!(
            kind = %request.kind,
            preempt = request.preempt,
            last_status = ?context.last_ending_status,
            "task transition allowed"
        );
        true
    }

    fn timeout_command(&self, last_velocity: &Vector3<f64>, now: Timestamp) -> VelocityCommand {
        debug!(?last_velocity, "decelerating to zero velocity after idle timeout");
        VelocityCommand::new(Vector3::zeros(), now)
    }

    fn signal_safety_active(&mut self) {
        self.safety_active = true;
    }
}
