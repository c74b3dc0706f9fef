//! The independent safety watchdog.

use async_trait::async_trait;

/// Degraded status reported by a [`SafetyMonitor`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SafetyStatus {
    /// The vehicle must land.
    pub active: bool,

    /// The coordinator must stop immediately.
    pub fatal: bool,
}

/// A heartbeat bond with a safety watchdog.
#[async_trait]
pub trait SafetyMonitor: Send {
    /// Form the bond with the watchdog, returning `false` on failure.
    ///
    /// Called once at start-up before the control loop runs.
    async fn form_bond(&mut self) -> bool;

    fn is_safety_active(&self) -> bool;

    fn is_fatal_active(&self) -> bool;

    fn status(&self) -> SafetyStatus {
        SafetyStatus {
            active: self.is_safety_active(),
            fatal: self.is_fatal_active(),
        }
    }
}
