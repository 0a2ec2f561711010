//! Desktop [`PmHal`] backed by the host clock.
//!
//! The core calls `enter_sleep` inside its critical section, which on the
//! host is one process-wide lock. Sleeping out the whole budget there would
//! stall every producer, so the simulated core waits on a [`WakeLine`]
//! instead: anything that plays an interrupt raises the line first and the
//! sleep ends straight away, the way a pending IRQ ends WFI on target.
//! Alarms are deadlines polled by the heartbeat task.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration as StdDuration;

use embassy_time::{Duration, Instant};
use platform::{
    AlarmId, CpuFrequency, LpoSource, PmHal, SleepMode, SleepOutcome, WakeupConfig,
    WakeupSource,
};

/// Longest single simulated sleep.
pub const MAX_SIM_SLEEP: Duration = Duration::from_millis(50);

/// Simulated wake interrupt line.
///
/// A raise stays pending until a sleep consumes it, so a wake raised just
/// before the transition is never lost.
pub struct WakeLine {
    pending: Mutex<Option<WakeupSource>>,
    raised: Condvar,
}

impl WakeLine {
    /// Idle line.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            raised: Condvar::new(),
        }
    }

    /// Assert the line. The first source raised since the last sleep wins.
    pub fn raise(&self, source: WakeupSource) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.get_or_insert(source);
        self.raised.notify_all();
    }

    fn take(&self) -> Option<WakeupSource> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Block until the line is raised or `timeout` passes.
    fn wait(&self, timeout: StdDuration) -> Option<WakeupSource> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut pending, _) = self
            .raised
            .wait_timeout_while(pending, timeout, |p| p.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        pending.take()
    }
}

impl Default for WakeLine {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from the simulated board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimHalError {
    /// `enter_sleep` without a preceding `arm_wakeup`.
    NotArmed,
}

impl core::fmt::Display for SimHalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotArmed => write!(f, "Sleep entered without armed wake sources"),
        }
    }
}

impl std::error::Error for SimHalError {}

/// Wake plan for the transition in progress.
#[derive(Debug, Clone, Copy)]
struct Armed {
    wake_after: Duration,
    source: WakeupSource,
}

/// Simulated sleep controller, clock tree and RTC.
pub struct SimHal {
    wake: Arc<WakeLine>,
    armed: Option<Armed>,
    alarm: Option<(AlarmId, Instant)>,
    cpu: CpuFrequency,
    lpo: LpoSource,
    sleeps: u32,
}

impl SimHal {
    /// Boot state: default clock, RC oscillator, nothing armed. Sleeps end
    /// early when `wake` is raised.
    pub fn new(wake: Arc<WakeLine>) -> Self {
        Self {
            wake,
            armed: None,
            alarm: None,
            cpu: CpuFrequency::Default,
            lpo: LpoSource::Rosc,
            sleeps: 0,
        }
    }

    /// Take the alarm if its deadline has passed by `now`.
    pub fn take_expired_alarm(&mut self, now: Instant) -> Option<AlarmId> {
        match self.alarm {
            Some((id, deadline)) if deadline <= now => {
                self.alarm = None;
                Some(id)
            }
            _ => None,
        }
    }

    /// Clock last programmed.
    pub fn cpu_frequency(&self) -> CpuFrequency {
        self.cpu
    }

    /// Oscillator last selected.
    pub fn lpo(&self) -> LpoSource {
        self.lpo
    }

    /// Completed transitions.
    pub fn sleeps(&self) -> u32 {
        self.sleeps
    }
}

/// Earliest timer wake: the idle budget, the RTC period if armed, and the
/// simulator cap.
fn plan_wake(config: &WakeupConfig, budget: Duration) -> Armed {
    let mut plan = Armed {
        wake_after: budget.min(MAX_SIM_SLEEP),
        source: WakeupSource::Rtc,
    };
    if let Some(period) = config.rtc_period.filter(|_| config.is_enabled(WakeupSource::Rtc)) {
        plan.wake_after = plan.wake_after.min(period);
    }
    plan
}

impl PmHal for SimHal {
    type Error = SimHalError;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn arm_wakeup(
        &mut self,
        mode: SleepMode,
        config: &WakeupConfig,
        budget: Duration,
    ) -> Result<(), Self::Error> {
        let plan = plan_wake(config, budget);
        tracing::trace!(
            mode = mode.name(),
            wake_after_ms = plan.wake_after.as_millis(),
            "sim: wake armed"
        );
        self.armed = Some(plan);
        Ok(())
    }

    fn enter_sleep(&mut self, mode: SleepMode) -> Result<SleepOutcome, Self::Error> {
        let plan = self.armed.take().ok_or(SimHalError::NotArmed)?;
        if let Some(source) = self.wake.take() {
            tracing::trace!(mode = mode.name(), source = source.name(), "sim: wake pending");
            return Ok(SleepOutcome::Aborted);
        }
        let started = Instant::now();
        let source = self
            .wake
            .wait(StdDuration::from_micros(plan.wake_after.as_micros()))
            .unwrap_or(plan.source);
        self.sleeps = self.sleeps.saturating_add(1);
        let elapsed = Instant::now().saturating_duration_since(started);
        tracing::trace!(
            mode = mode.name(),
            source = source.name(),
            elapsed_ms = elapsed.as_millis(),
            "sim: woke"
        );
        Ok(SleepOutcome::Slept { elapsed, source })
    }

    fn set_cpu_frequency(&mut self, freq: CpuFrequency) -> Result<(), Self::Error> {
        tracing::info!(mhz = freq.mhz(), "sim: cpu clock");
        self.cpu = freq;
        Ok(())
    }

    fn arm_alarm(&mut self, alarm: AlarmId, after: Duration) -> Result<(), Self::Error> {
        let deadline = Instant::now().checked_add(after).unwrap_or(Instant::MAX);
        self.alarm = Some((alarm, deadline));
        Ok(())
    }

    fn switch_lpo(&mut self, source: LpoSource) -> Result<(), Self::Error> {
        tracing::info!(source = source.name(), "sim: 32k source");
        self.lpo = source;
        Ok(())
    }
}
