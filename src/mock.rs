//! In-memory collaborators for tests and simulation.
//!
//! Every mock is a cheap handle over shared state: hand one clone to the
//! coordinator and keep another to drive or inspect it.

use crate::{
    gateway::{RequestGateway, TaskRequest, TaskResult},
    hal::{CommandSink, Sensors, StampedVelocity},
    motion::{MotionPlan, VelocityCommand},
    safety::SafetyMonitor,
    task::{TaskController, TaskStatus, TaskStep, VehicleState},
    transition::TransitionContext,
};
use async_trait::async_trait;
use nalgebra::Vector3;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct GatewayState {
    requests: VecDeque<TaskRequest>,
    cancel_requested: bool,
    results: Vec<TaskResult>,
    landing_requests: usize,
}

/// A request gateway fed from a queue.
#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_request(&self, request: TaskRequest) {
        lock(&self.state).requests.push_back(request);
    }

    /// Ask to cancel the current request. Cleared once a result is reported.
    pub fn request_cancel(&self) {
        lock(&self.state).cancel_requested = true;
    }

    /// Every result reported so far, oldest first.
    pub fn results(&self) -> Vec<TaskResult> {
        lock(&self.state).results.clone()
    }

    pub fn landing_requests(&self) -> usize {
        lock(&self.state).landing_requests
    }
}

#[async_trait]
impl RequestGateway for MockGateway {
    async fn wait_until_ready(&mut self) {}

    fn take_request(&mut self) -> Option<TaskRequest> {
        lock(&self.state).requests.pop_front()
    }

    fn is_cancel_requested(&self) -> bool {
        lock(&self.state).cancel_requested
    }

    fn report(&mut self, result: TaskResult) {
        let mut state = lock(&self.state);
        state.cancel_requested = false;
        state.results.push(result);
    }

    fn request_landing(&mut self) {
        lock(&self.state).landing_requests += 1;
    }
}

/// A safety monitor whose status is set by hand.
#[derive(Debug, Clone)]
pub struct MockSafety {
    active: Arc<AtomicBool>,
    fatal: Arc<AtomicBool>,
    bond: bool,
}

impl Default for MockSafety {
    fn default() -> Self {
        Self {
            active: Arc::default(),
            fatal: Arc::default(),
            bond: true,
        }
    }
}

impl MockSafety {
    pub fn new() -> Self {
        Self::default()
    }

    /// A monitor that refuses to form a bond.
    pub fn without_bond() -> Self {
        Self {
            bond: false,
            ..Self::default()
        }
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn set_fatal(&self, fatal: bool) {
        self.fatal.store(fatal, Ordering::SeqCst);
    }
}

#[async_trait]
impl SafetyMonitor for MockSafety {
    async fn form_bond(&mut self) -> bool {
        self.bond
    }

    fn is_safety_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn is_fatal_active(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }
}

/// Records everything published to it.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    velocities: Arc<Mutex<Vec<StampedVelocity>>>,
    plans: Arc<Mutex<Vec<MotionPlan>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn velocities(&self) -> Vec<StampedVelocity> {
        lock(&self.velocities).clone()
    }

    pub fn plans(&self) -> Vec<MotionPlan> {
        lock(&self.plans).clone()
    }
}

impl CommandSink for RecordingSink {
    fn publish_velocity(&mut self, velocity: &StampedVelocity) {
        lock(&self.velocities).push(*velocity);
    }

    fn publish_plan(&mut self, plan: &MotionPlan) {
        lock(&self.plans).push(plan.clone());
    }
}

#[derive(Debug, Default)]
struct Estimate {
    position: Vector3<f64>,
    velocity: Vector3<f64>,
}

/// Sensors reporting a state set by hand.
#[derive(Debug, Clone, Default)]
pub struct MockSensors {
    estimate: Arc<Mutex<Estimate>>,
}

impl MockSensors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&self, position: Vector3<f64>) {
        lock(&self.estimate).position = position;
    }

    pub fn set_velocity(&self, velocity: Vector3<f64>) {
        lock(&self.estimate).velocity = velocity;
    }
}

impl Sensors for MockSensors {
    fn velocity(&mut self) -> Vector3<f64> {
        lock(&self.estimate).velocity
    }

    fn position(&mut self) -> Vector3<f64> {
        lock(&self.estimate).position
    }
}

/// A task that commands a constant velocity and finishes after a set number of steps.
#[derive(Debug, Clone)]
pub struct ScriptedTask {
    velocity: Vector3<f64>,
    finish: Option<(usize, TaskStatus)>,
    accepts_cancel: bool,
    steps: Arc<AtomicUsize>,
    context: Arc<Mutex<Option<TransitionContext>>>,
}

impl ScriptedTask {
    /// A task that runs until canceled.
    pub fn new(velocity: Vector3<f64>) -> Self {
        Self {
            velocity,
            finish: None,
            accepts_cancel: true,
            steps: Arc::default(),
            context: Arc::default(),
        }
    }

    /// Report `status` on step number `steps`.
    pub fn finish_after(mut self, steps: usize, status: TaskStatus) -> Self {
        self.finish = Some((steps, status));
        self
    }

    pub fn refuse_cancel(mut self) -> Self {
        self.accepts_cancel = false;
        self
    }

    /// Number of times the task was stepped.
    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }

    /// The context the task began with.
    pub fn context(&self) -> Option<TransitionContext> {
        lock(&self.context).clone()
    }
}

impl TaskController for ScriptedTask {
    fn begin(&mut self, context: TransitionContext) {
        *lock(&self.context) = Some(context);
    }

    fn step(&mut self, state: &VehicleState) -> TaskStep {
        let steps = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.finish {
            Some((after, status)) if steps >= *after => TaskStep::finished(status.clone()),
            _ => TaskStep::running(VelocityCommand::new(self.velocity, state.timestamp)),
        }
    }

    fn cancel(&mut self) -> bool {
        self.accepts_cancel
    }
}
