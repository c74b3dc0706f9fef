//! # flight-tasks
//! Task lifecycle coordination and linear motion profiles for multi-rotor flight software.
//!
//! # Coordination
//! [`Coordinator`] runs one task at a time at a fixed rate, enforces the legal
//! transitions between tasks (see [`transition`]) and lands the vehicle when the
//! [`SafetyMonitor`](safety::SafetyMonitor) asks for it.
//!
//! Tasks implement [`TaskController`](task::TaskController)
//! (see [`PositionHold`](task::PositionHold) and [`Land`](task::Land) for concrete tasks)
//! and arrive through a [`RequestGateway`](gateway::RequestGateway).
//!
//! # Motion profiles
//! [`LinearMotionProfileGenerator`](motion::LinearMotionProfileGenerator) turns each
//! velocity command into a feed-forward [`MotionPlan`](motion::MotionPlan) that
//! continues smoothly from the previous one.
//!
//! [`hal`] contains the traits connecting the coordinator to the vehicle.

pub mod config;
pub use config::Config;

pub mod coordinator;
pub use coordinator::{Builder, Coordinator, CoordinatorState, Flow};

mod error;
pub use error::{Error, Fault, Result};

pub mod gateway;

pub mod hal;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub mod motion;

pub mod safety;

pub mod task;

pub mod time;

pub mod transition;
