//! The request/response channel between the coordinator and whoever assigns tasks.

use crate::task::{TaskController, TaskKind};
use async_trait::async_trait;
use core::fmt;

/// A request to run a task.
pub struct TaskRequest {
    pub kind: TaskKind,
    pub controller: Box<dyn TaskController>,

    /// The request replaces whatever the requester had asked for before.
    pub preempt: bool,
}

impl TaskRequest {
    pub fn new<T>(kind: TaskKind, controller: T) -> Self
    where
        T: TaskController + 'static,
    {
        Self {
            kind,
            controller: Box::new(controller),
            preempt: false,
        }
    }

    /// Builder method to set `preempt` and return `self`
    pub fn with_preempt(mut self, preempt: bool) -> Self {
        self.preempt = preempt;
        self
    }
}

impl fmt::Debug for TaskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRequest")
            .field("kind", &self.kind)
            .field("preempt", &self.preempt)
            .finish_non_exhaustive()
    }
}

/// The terminal result of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    Succeeded,
    Failed(String),
    Aborted(String),
    Canceled,
}

impl TaskResult {
    /// The success flag carried by a succeeded result on the wire,
    /// `None` for aborted and canceled requests.
    pub fn success(&self) -> Option<bool> {
        match self {
            TaskResult::Succeeded => Some(true),
            TaskResult::Failed(_) => Some(false),
            TaskResult::Aborted(_) | TaskResult::Canceled => None,
        }
    }
}

/// Delivers task requests and cancellations, and accepts their results.
#[async_trait]
pub trait RequestGateway: Send {
    /// Wait until requests can be exchanged. Called once at start-up.
    async fn wait_until_ready(&mut self);

    /// Take the next pending request, if any.
    fn take_request(&mut self) -> Option<TaskRequest>;

    /// Whether the requester asked to cancel the current request.
    fn is_cancel_requested(&self) -> bool;

    /// Report the terminal result of the current request.
    fn report(&mut self, result: TaskResult);

    /// Ask for a landing maneuver to be run as a preempting request.
    fn request_landing(&mut self);
}

#[cfg(test)]
mod tests {
    use super::TaskResult;

    #[test]
    fn success_flags() {
        assert_eq!(TaskResult::Succeeded.success(), Some(true));
        assert_eq!(TaskResult::Failed("no odometry".into()).success(), Some(false));
        assert_eq!(TaskResult::Aborted("illegal".into()).success(), None);
        assert_eq!(TaskResult::Canceled.success(), None);
    }
}
