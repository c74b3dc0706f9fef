use core::time::Duration;
use std::sync::Weak;
use tokio::{sync::Mutex, task::JoinHandle};

/// Receives the firings of an [`IdleTimer`].
pub(crate) trait TimeoutHandler: Send + 'static {
    /// Called under the lock with the epoch the timer was armed with.
    fn idle_timeout(&mut self, epoch: u64);
}

/// One-shot timer that calls back into the state it belongs to.
///
/// Every arm or disarm starts a new epoch, so a firing that raced with a
/// state change carries an old epoch and can be told apart from a real one.
pub(crate) struct IdleTimer<T> {
    timeout: Duration,
    target: Weak<Mutex<T>>,
    epoch: u64,
    started: bool,
    armed: bool,
    handle: Option<JoinHandle<()>>,
}

impl<T> IdleTimer<T>
where
    T: TimeoutHandler,
{
    pub fn new(timeout: Duration, target: Weak<Mutex<T>>) -> Self {
        Self {
            timeout,
            target,
            epoch: 0,
            started: false,
            armed: false,
            handle: None,
        }
    }

    /// Returns `true` once the timer has been armed at least once.
    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Start a new countdown, replacing any countdown in progress.
    pub fn arm(&mut self) {
        self.disarm();
        self.started = true;
        self.armed = true;

        let epoch = self.epoch;
        let timeout = self.timeout;
        let target = self.target.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(target) = target.upgrade() {
                target.lock().await.idle_timeout(epoch);
            }
        }));
    }

    /// Stop the countdown. Any firing already on its way becomes stale.
    pub fn disarm(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.armed = false;
        self.epoch += 1;
    }

    /// Returns `true` if a firing armed at `epoch` was superseded by a later arm or disarm.
    /// A firing without an epoch is never stale.
    pub fn is_stale(&self, epoch: Option<u64>) -> bool {
        epoch.map_or(false, |epoch| epoch != self.epoch)
    }

    /// Consume the current countdown after a firing.
    /// Returns `false` if the timer was not armed.
    ///
    /// `epoch` is `None` for a firing delivered from outside the timer, the
    /// pending countdown is then cancelled as well.
    pub fn consume(&mut self, epoch: Option<u64>) -> bool {
        if let Some(handle) = self.handle.take() {
            // A firing with an epoch runs on the timer task itself
            if epoch.is_none() {
                handle.abort();
            }
        }
        self.epoch += 1;
        core::mem::replace(&mut self.armed, false)
    }
}

impl<T> Drop for IdleTimer<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
