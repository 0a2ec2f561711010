//! Enter-low-voltage timeout watch.
//!
//! Low voltage counts as "wanted" when the requested mode is at least
//! [`SleepMode::LowVoltage`] and the LV gate is found closed, either by the
//! idle hook or by the heartbeat poll. If that lasts longer than
//! [`PmConfig::lv_timeout`](crate::PmConfig) the registered
//! [`LvTimeoutCallback`] is told which modules are still voting active. It
//! fires once per episode and never changes a vote.

use embassy_time::{Duration, Instant};
use platform::{PmHal, SleepMode};

use crate::manager::PowerManager;
use crate::module::{ModuleId, ModuleSet, SleepModule};

/// Notified when low voltage has been blocked for too long.
pub trait LvTimeoutCallback: Sync {
    /// `blockers` are the gate members still voting active.
    fn on_timeout(&self, blockers: ModuleSet<SleepModule>);
}

impl<F> LvTimeoutCallback for F
where
    F: Fn(ModuleSet<SleepModule>) + Sync,
{
    fn on_timeout(&self, blockers: ModuleSet<SleepModule>) {
        self(blockers);
    }
}

/// Tracks one "wanted but blocked" episode.
#[derive(Debug, Clone, Copy, Default)]
pub struct LvTimeoutWatch {
    blocked_since: Option<Instant>,
    reported: bool,
}

impl LvTimeoutWatch {
    /// No episode in progress.
    pub const fn new() -> Self {
        Self {
            blocked_since: None,
            reported: false,
        }
    }

    /// Start an episode at `now` unless one is already running.
    pub fn mark_blocked(&mut self, now: Instant) {
        if self.blocked_since.is_none() {
            self.blocked_since = Some(now);
        }
    }

    /// End the current episode.
    pub fn clear(&mut self) {
        self.blocked_since = None;
        self.reported = false;
    }

    /// `true` while an episode is running.
    pub fn is_blocked(&self) -> bool {
        self.blocked_since.is_some()
    }

    /// Returns `true` exactly once per episode, the first time it is polled
    /// at least `timeout` after the episode started.
    pub fn poll(&mut self, now: Instant, timeout: Duration) -> bool {
        let Some(since) = self.blocked_since else {
            return false;
        };
        if self.reported || now.saturating_duration_since(since) < timeout {
            return false;
        }
        self.reported = true;
        true
    }
}

impl<H: PmHal> PowerManager<H> {
    /// Install the callback told about a stuck low-voltage request,
    /// replacing any previous one.
    pub fn register_lv_timeout_callback(&self, callback: &'static dyn LvTimeoutCallback) {
        self.hooks.lock(|h| h.borrow_mut().lv_timeout = Some(callback));
    }

    /// Poll the enter-low-voltage timeout.
    ///
    /// Returns `true` if the timeout fired on this call. Called from the RTC
    /// heartbeat; may also be polled directly.
    pub fn check_enter_lv_timeout(&self) -> bool {
        let now = self.with_hal(|hal| hal.now());
        let gate = self.config.lv_gate;
        let timeout = self.config.lv_timeout;
        let fired = self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let blockers = s.votes.lv_blockers(gate);
            if blockers.is_empty() || s.requested < SleepMode::LowVoltage {
                s.lv_watch.clear();
                return None;
            }
            s.lv_watch.mark_blocked(now);
            s.lv_watch.poll(now, timeout).then_some(blockers)
        });
        let Some(blockers) = fired else {
            return false;
        };

        warn!(
            "pm: low voltage blocked for {} ms by {} modules",
            timeout.as_millis(),
            blockers.len()
        );
        for module in blockers.iter() {
            warn!("pm:   still active: {}", module.name());
        }
        if let Some(callback) = self.hooks.lock(|h| h.borrow().lv_timeout) {
            callback.on_timeout(blockers);
        }
        true
    }
}
