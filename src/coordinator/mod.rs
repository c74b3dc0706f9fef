//! The task lifecycle coordinator.
//!
//! A single control loop steps the active task at a fixed rate. Safety status,
//! idle timer firings and landing completion arrive from other contexts and are
//! handled under the same lock as the loop, so no two of them ever interleave.

use crate::{
    error::Fault,
    gateway::{RequestGateway, TaskRequest, TaskResult},
    hal::Sensors,
    safety::SafetyMonitor,
    task::{TaskController, TaskKind, TaskStatus, VehicleState},
    time::{self, Timestamp},
    transition::{TransitionContext, TransitionValidator},
    Result,
};
use core::{mem, time::Duration};
use embedded_time::Clock;
use std::sync::Arc;
use tokio::{
    sync::Mutex,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

mod builder;
pub use builder::Builder;

mod command;
pub use command::CommandHandler;

mod timer;
use timer::{IdleTimer, TimeoutHandler};

/// Observable lifecycle state of a [`Coordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No task is running.
    Idle,
    TaskActive,
    /// A safety episode began, only a landing may run.
    SafetyLanding,
    /// The coordinator stopped for good.
    Terminated,
}

/// Whether the control loop keeps running after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

struct ActiveTask {
    kind: TaskKind,
    controller: Box<dyn TaskController>,
}

enum Lifecycle {
    Idle {
        fallback_sent: bool,
    },
    TaskActive(ActiveTask),
    SafetyLanding {
        task: Option<ActiveTask>,
        landed: Option<bool>,
    },
    Terminated,
}

impl Lifecycle {
    fn state(&self) -> CoordinatorState {
        match self {
            Lifecycle::Idle { .. } => CoordinatorState::Idle,
            Lifecycle::TaskActive(_) => CoordinatorState::TaskActive,
            Lifecycle::SafetyLanding { .. } => CoordinatorState::SafetyLanding,
            Lifecycle::Terminated => CoordinatorState::Terminated,
        }
    }
}

/// The task lifecycle coordinator.
///
/// Clones share the same state, so one clone can run the control loop while
/// another delivers landing completion or inspects the state.
pub struct Coordinator<C> {
    inner: Arc<Mutex<Inner<C>>>,
    update_period: Duration,
}

impl<C> Clone for Coordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            update_period: self.update_period,
        }
    }
}

pub(crate) struct Parts<C> {
    pub clock: C,
    pub safety: Box<dyn SafetyMonitor>,
    pub gateway: Box<dyn RequestGateway>,
    pub validator: Box<dyn TransitionValidator>,
    pub sensors: Box<dyn Sensors>,
    pub commands: CommandHandler,
    pub update_period: Duration,
    pub task_timeout: Duration,
}

impl<C> Coordinator<C>
where
    C: Clock + Send + 'static,
    u64: TryFrom<C::T>,
{
    /// Start building a coordinator.
    pub fn builder() -> Builder<C> {
        Builder::default()
    }

    pub(crate) fn new(parts: Parts<C>) -> Self {
        let Parts {
            clock,
            safety,
            gateway,
            validator,
            sensors,
            commands,
            update_period,
            task_timeout,
        } = parts;

        let inner = Arc::new_cyclic(|weak| {
            Mutex::new(Inner {
                lifecycle: Lifecycle::Idle {
                    fallback_sent: false,
                },
                clock,
                safety,
                gateway,
                validator,
                sensors,
                commands,
                timer: IdleTimer::new(task_timeout, weak.clone()),
                last_ending: None,
                last_tick: Timestamp::default(),
                fault: None,
            })
        });

        Self {
            inner,
            update_period,
        }
    }

    pub fn update_period(&self) -> Duration {
        self.update_period
    }

    /// Run the control loop until the coordinator stops.
    ///
    /// Returns `Ok` once a safety landing completes and an error on a fault.
    pub async fn run(&self) -> Result<()> {
        info!(period = ?self.update_period, "starting control loop");

        let mut interval = interval(self.update_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if self.tick().await? == Flow::Stop {
                info!("control loop stopped");
                return Ok(());
            }
        }
    }

    /// Run one iteration of the control loop.
    pub async fn tick(&self) -> Result<Flow> {
        let mut inner = self.inner.lock().await;
        let now = time::now(&inner.clock)?;
        inner.tick(now)
    }

    pub async fn state(&self) -> CoordinatorState {
        self.inner.lock().await.lifecycle.state()
    }

    /// Deliver the outcome of the landing requested for a safety episode.
    pub async fn landing_complete(&self, success: bool) {
        self.inner.lock().await.on_landing_complete(success);
    }

    /// Deliver an idle timer firing.
    ///
    /// Fails if a task is running or the timer was not armed, the coordinator
    /// is then terminated.
    pub async fn idle_timeout(&self) -> Result<()> {
        self.inner.lock().await.on_idle_timeout(None)?;
        Ok(())
    }

    pub async fn is_idle_timer_armed(&self) -> bool {
        self.inner.lock().await.timer.is_armed()
    }

    /// How the last task ended, `None` before the first task finished.
    pub async fn last_ending_status(&self) -> Option<TaskStatus> {
        self.inner.lock().await.last_ending.clone()
    }
}

struct Inner<C> {
    lifecycle: Lifecycle,
    clock: C,
    safety: Box<dyn SafetyMonitor>,
    gateway: Box<dyn RequestGateway>,
    validator: Box<dyn TransitionValidator>,
    sensors: Box<dyn Sensors>,
    commands: CommandHandler,
    timer: IdleTimer<Inner<C>>,
    last_ending: Option<TaskStatus>,
    last_tick: Timestamp,

    /// Raised outside the control loop, returned by its next tick.
    fault: Option<Fault>,
}

impl<C> Inner<C>
where
    C: Clock + Send + 'static,
    u64: TryFrom<C::T>,
{
    fn tick(&mut self, now: Timestamp) -> Result<Flow> {
        self.last_tick = now;

        if let Some(fault) = self.fault.take() {
            return Err(fault.into());
        }
        if let Lifecycle::Terminated = self.lifecycle {
            return Ok(Flow::Stop);
        }

        let safety = self.safety.status();
        if safety.fatal {
            error!("safety monitor is fatal active, terminating");
            self.terminate();
            return Err(Fault::SafetyFatal.into());
        }

        if let Lifecycle::SafetyLanding {
            landed: Some(success),
            ..
        } = self.lifecycle
        {
            info!(success, "safety landing complete, stopping");
            if let Lifecycle::SafetyLanding {
                task: Some(task), ..
            } = mem::replace(&mut self.lifecycle, Lifecycle::Terminated)
            {
                let reason = String::from("landing completed before the task finished");
                warn!(kind = %task.kind, "{reason}");
                self.finish(TaskResult::Aborted(reason.clone()), TaskStatus::Aborted(reason));
            }
            self.terminate();
            return Ok(Flow::Stop);
        }

        if safety.active
            && !matches!(self.lifecycle, Lifecycle::SafetyLanding { .. })
        {
            self.begin_safety_landing();
        }

        if matches!(self.lifecycle, Lifecycle::Idle { .. }) && !self.timer.has_started() {
            debug!("arming idle timer");
            self.timer.arm();
        }

        self.lifecycle = match mem::replace(&mut self.lifecycle, Lifecycle::Terminated) {
            Lifecycle::Idle { fallback_sent } => match self.accept_request(fallback_sent, now) {
                Some(task) => {
                    self.timer.disarm();
                    Lifecycle::TaskActive(task)
                }
                None => Lifecycle::Idle { fallback_sent },
            },
            Lifecycle::TaskActive(task) => match self.run_task(task, now) {
                Some(task) => Lifecycle::TaskActive(task),
                None => {
                    self.timer.arm();
                    Lifecycle::Idle {
                        fallback_sent: false,
                    }
                }
            },
            Lifecycle::SafetyLanding {
                task: Some(task),
                landed,
            } => Lifecycle::SafetyLanding {
                task: self.run_task(task, now),
                landed,
            },
            Lifecycle::SafetyLanding { task: None, landed } => Lifecycle::SafetyLanding {
                task: self.accept_request(false, now),
                landed,
            },
            Lifecycle::Terminated => Lifecycle::Terminated,
        };

        Ok(Flow::Continue)
    }

    fn vehicle_state(&mut self, now: Timestamp) -> VehicleState {
        VehicleState {
            timestamp: now,
            position: self.sensors.position(),
            velocity: self.sensors.velocity(),
        }
    }

    /// Take a pending request and start it if the transition is legal.
    fn accept_request(&mut self, fallback_sent: bool, now: Timestamp) -> Option<ActiveTask> {
        let request = self.gateway.take_request()?;

        let context = TransitionContext {
            last_commanded_velocity: self.commands.last_velocity(),
            last_ending_status: self.last_ending.clone(),
            timeout_fallback_sent: fallback_sent,
        };
        if !self.validator.check_transition(&context, &request) {
            warn!(kind = %request.kind, "illegal task transition, aborting request");
            self.gateway.report(TaskResult::Aborted(format!(
                "illegal transition to {}",
                request.kind
            )));
            return None;
        }

        let context = self.validator.fill_out_transition(context);
        let state = self.vehicle_state(now);
        self.commands.prepare(&state);

        let TaskRequest {
            kind,
            mut controller,
            preempt,
        } = request;
        info!(%kind, preempt, "task accepted");
        controller.begin(context);

        Some(ActiveTask { kind, controller })
    }

    /// Step `task` once, returning it while it keeps running.
    fn run_task(&mut self, mut task: ActiveTask, now: Timestamp) -> Option<ActiveTask> {
        let canceled = self.gateway.is_cancel_requested() && {
            let accepted = task.controller.cancel();
            if !accepted {
                debug!(kind = %task.kind, "task refused to cancel");
            }
            accepted
        };

        let status = if canceled {
            TaskStatus::Canceled
        } else {
            let state = self.vehicle_state(now);
            let step = task.controller.step(&state);
            if let Some(command) = step.command {
                self.commands.send(&command, now);
            }
            step.status
        };

        let result = match &status {
            TaskStatus::Running => return Some(task),
            TaskStatus::Done => {
                info!(kind = %task.kind, "task done");
                TaskResult::Succeeded
            }
            TaskStatus::Failed(reason) => {
                warn!(kind = %task.kind, %reason, "task failed");
                TaskResult::Failed(reason.clone())
            }
            TaskStatus::Aborted(reason) => {
                warn!(kind = %task.kind, %reason, "task aborted");
                TaskResult::Aborted(reason.clone())
            }
            TaskStatus::Canceled => {
                info!(kind = %task.kind, "task canceled");
                TaskResult::Canceled
            }
        };

        self.finish(result, status);
        None
    }

    /// Report the terminal result of a request and remember how it ended.
    fn finish(&mut self, result: TaskResult, status: TaskStatus) {
        debug!(success = ?result.success(), "reporting task result");
        self.gateway.report(result);
        self.last_ending = Some(status);
    }

    fn begin_safety_landing(&mut self) {
        warn!("safety active, requesting landing");
        self.gateway.request_landing();
        self.validator.signal_safety_active();

        let previous = mem::replace(
            &mut self.lifecycle,
            Lifecycle::SafetyLanding {
                task: None,
                landed: None,
            },
        );
        match previous {
            Lifecycle::Idle { .. } => self.timer.disarm(),
            Lifecycle::TaskActive(task) => {
                let reason = String::from("preempted by safety landing");
                warn!(kind = %task.kind, "task preempted by safety landing");
                self.finish(TaskResult::Aborted(reason.clone()), TaskStatus::Aborted(reason));
            }
            Lifecycle::SafetyLanding { .. } | Lifecycle::Terminated => {}
        }
    }

    fn on_landing_complete(&mut self, success: bool) {
        match &mut self.lifecycle {
            Lifecycle::SafetyLanding { landed, .. } => {
                if success {
                    info!("safety landing succeeded");
                } else {
                    error!("safety landing failed");
                }
                *landed = Some(success);
            }
            lifecycle => warn!(
                state = ?lifecycle.state(),
                success,
                "landing completion outside a safety episode, ignoring"
            ),
        }
    }

    fn on_idle_timeout(&mut self, epoch: Option<u64>) -> core::result::Result<(), Fault> {
        if self.timer.is_stale(epoch) {
            debug!(?epoch, "ignoring stale idle timer firing");
            return Ok(());
        }

        match self.lifecycle {
            Lifecycle::Idle { .. } => {}
            Lifecycle::Terminated => return Ok(()),
            Lifecycle::TaskActive(_) | Lifecycle::SafetyLanding { .. } => {
                return Err(self.fail(Fault::TimeoutWithTaskActive));
            }
        }
        // The timer is armed once per idle period, so this also bounds the fallback to one
        if !self.timer.consume(epoch) {
            return Err(self.fail(Fault::IdleTimerNotArmed));
        }

        let now = match time::now(&self.clock) {
            Ok(now) => now,
            Err(error) => {
                warn!(%error, "clock unavailable, stamping fallback with the last tick");
                self.last_tick
            }
        };

        warn!("no task started before the idle timeout, commanding fallback velocity");
        let command = self
            .validator
            .timeout_command(&self.commands.last_velocity(), now);
        self.commands.send_timeout(&command, now);
        self.lifecycle = Lifecycle::Idle {
            fallback_sent: true,
        };

        Ok(())
    }

    fn fail(&mut self, fault: Fault) -> Fault {
        error!(%fault, "coordinator fault, terminating");
        self.terminate();
        self.fault = Some(fault);
        fault
    }

    fn terminate(&mut self) {
        self.timer.disarm();
        self.lifecycle = Lifecycle::Terminated;
    }
}

impl<C> TimeoutHandler for Inner<C>
where
    C: Clock + Send + 'static,
    u64: TryFrom<C::T>,
{
    fn idle_timeout(&mut self, epoch: u64) {
        // Faults are stored and surface on the next tick
        let _ = self.on_idle_timeout(Some(epoch));
    }
}
