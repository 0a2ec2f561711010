//! Idle-time sleep entry.
//!
//! The RTOS idle task calls [`PowerManager::suppress_ticks_and_sleep`] when
//! nothing is ready to run for a while. The core picks the deepest mode the
//! current votes allow, runs the sleep callbacks around the HAL transition
//! and reports how many ticks went by.
//!
//! The planned mode is the current state from the moment it is chosen until
//! the post-sleep callbacks have run, so callbacks and other threads can see
//! it.
//!
//! A wake always wins: the queue is checked once before the callbacks and
//! again, inside the critical section, right before the transition. A wake
//! the worker already handled in between shows up as the state having gone
//! back to active, which cancels the transition as well.

use embassy_time::Duration;
use platform::{PmHal, SleepMode, SleepOutcome};

use crate::manager::{PowerManager, SystemPowerState};

impl<H: PmHal> PowerManager<H> {
    /// Sleep for up to `expected_idle_ticks` OS ticks and return how many
    /// ticks actually elapsed, at most `expected_idle_ticks`.
    ///
    /// Returns 0 without sleeping when the budget is too short, the votes
    /// allow nothing deeper than WFI, or a message is pending.
    pub fn suppress_ticks_and_sleep(&self, expected_idle_ticks: u32) -> u32 {
        if expected_idle_ticks < self.config.min_idle_ticks {
            return 0;
        }
        let Some(mode) = self.plan_sleep() else {
            return 0;
        };

        let (pre_sleep, post_sleep, devices) = self.hooks.lock(|h| {
            let h = h.borrow();
            (
                h.pre_sleep.snapshot(),
                h.post_sleep.snapshot(),
                h.devices.snapshot(),
            )
        });

        for callback in &pre_sleep {
            callback.call(mode);
        }
        for device in &devices {
            device.enter_sleep(mode);
        }

        let budget = Duration::from_ticks(
            self.config
                .tick_period
                .as_ticks()
                .saturating_mul(u64::from(expected_idle_ticks)),
        );

        let target = SystemPowerState::from_mode(mode);
        let outcome = critical_section::with(|_| {
            // A wake the worker handled since planning has already put the
            // state back to active.
            let wakeup = self.state.lock(|s| {
                let s = s.borrow();
                (s.current == target).then(|| s.wakeup.config().clone())
            });
            let wakeup = wakeup.filter(|_| self.queue.is_empty())?;
            let result: Result<SleepOutcome, H::Error> = self.hal.lock(|hal| {
                let mut hal = hal.borrow_mut();
                hal.arm_wakeup(mode, &wakeup, budget)?;
                hal.enter_sleep(mode)
            });
            if let Ok(SleepOutcome::Slept { source, .. }) = result {
                self.state.lock(|s| s.borrow_mut().wakeup.record(mode, source));
            }
            Some(result)
        });

        for device in &devices {
            device.exit_sleep(mode);
        }
        for callback in &post_sleep {
            callback.call(mode);
        }
        self.state
            .lock(|s| s.borrow_mut().current = SystemPowerState::Active);

        match outcome {
            Some(Ok(SleepOutcome::Slept { elapsed, source })) => {
                let ticks = self.elapsed_ticks(elapsed).min(expected_idle_ticks);
                debug!("pm: {} for {} ticks, woken by {}", mode.name(), ticks, source.name());
                ticks
            }
            Some(Ok(SleepOutcome::Aborted)) => {
                debug!("pm: {} aborted by pending wake", mode.name());
                0
            }
            Some(Err(_)) => {
                error!("pm: {} transition failed", mode.name());
                0
            }
            None => {
                debug!("pm: {} skipped, wake pending", mode.name());
                0
            }
        }
    }

    /// Deepest mode the votes allow right now, or `None` to stay in WFI.
    /// A planned mode is published as the current state straight away.
    fn plan_sleep(&self) -> Option<SleepMode> {
        let now = self.with_hal(|hal| hal.now());
        let lv_gate = self.config.lv_gate;
        let deep_gate = self.config.deep_sleep_gate;
        critical_section::with(|_| {
            if !self.queue.is_empty() {
                return None;
            }
            self.state.lock(|s| {
                let mut s = s.borrow_mut();
                if s.requested == SleepMode::Normal {
                    return None;
                }
                if !s.votes.low_voltage_eligible(lv_gate) {
                    s.lv_watch.mark_blocked(now);
                    return None;
                }
                s.lv_watch.clear();
                let mode = if s.requested >= SleepMode::DeepSleep
                    && s.votes.deep_sleep_eligible(deep_gate)
                {
                    s.requested
                } else {
                    SleepMode::LowVoltage
                };
                s.current = SystemPowerState::from_mode(mode);
                Some(mode)
            })
        })
    }

    fn elapsed_ticks(&self, elapsed: Duration) -> u32 {
        elapsed
            .as_ticks()
            .checked_div(self.config.tick_period.as_ticks())
            .and_then(|t| u32::try_from(t).ok())
            .unwrap_or(u32::MAX)
    }
}
