//! Task controllers: the pluggable policies run by the coordinator.

use crate::{motion::VelocityCommand, time::Timestamp, transition::TransitionContext};
use core::fmt;
use nalgebra::Vector3;

pub mod land;
pub use land::{Land, LandConfig};

pub mod position_hold;
pub use position_hold::{PositionHold, PositionHoldConfig};

/// The kind of a requested task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Takeoff,
    Land,
    HoldPosition,
    Translate,
    Velocity,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Takeoff => "takeoff",
            TaskKind::Land => "land",
            TaskKind::HoldPosition => "hold_position",
            TaskKind::Translate => "translate",
            TaskKind::Velocity => "velocity",
        };
        f.write_str(name)
    }
}

/// The status a task reports after each step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Done,
    Failed(String),
    Aborted(String),
    Canceled,
}

/// Estimated state of the vehicle handed to a task each step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub timestamp: Timestamp,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

/// Output of one task step.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStep {
    /// Velocity to command this tick, if any.
    pub command: Option<VelocityCommand>,
    pub status: TaskStatus,
}

impl TaskStep {
    pub fn running(command: VelocityCommand) -> Self {
        Self {
            command: Some(command),
            status: TaskStatus::Running,
        }
    }

    pub fn finished(status: TaskStatus) -> Self {
        Self {
            command: None,
            status,
        }
    }
}

/// A control policy run by the coordinator, one step per tick.
pub trait TaskController: Send {
    /// Called once when the task becomes active with the state left by the previous task.
    fn begin(&mut self, context: TransitionContext);

    /// Observe the vehicle and produce this tick's command and status.
    fn step(&mut self, state: &VehicleState) -> TaskStep;

    /// Ask the task to cancel.
    ///
    /// Returns `true` if the task stopped, its status is then [`TaskStatus::Canceled`].
    /// Returning `false` keeps the task running, the request is made again next tick.
    fn cancel(&mut self) -> bool;
}
