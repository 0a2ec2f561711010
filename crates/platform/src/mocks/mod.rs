//! Mock implementations for testing
//!
//! [`MockPmHal`] records every call the PM core makes into the board layer
//! and lets tests script what the next sleep attempt reports.

#![cfg(any(test, feature = "std"))]

use std::vec::Vec;

use embassy_time::{Duration, Instant};

use crate::power::{
    AlarmId, CpuFrequency, LpoSource, PmHal, SleepMode, SleepOutcome, WakeupConfig,
    WakeupSource,
};

/// Error injected by [`MockPmHal::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockHalError;

/// Everything [`MockPmHal`] has been asked to do, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HalCall {
    /// `arm_wakeup(mode, config, budget)`
    ArmWakeup(SleepMode, WakeupConfig, Duration),
    /// `enter_sleep(mode)`
    EnterSleep(SleepMode),
    /// `set_cpu_frequency(freq)`
    SetCpuFrequency(CpuFrequency),
    /// `arm_alarm(alarm, after)`
    ArmAlarm(AlarmId, Duration),
    /// `switch_lpo(source)`
    SwitchLpo(LpoSource),
}

/// Scriptable [`PmHal`] for host tests.
pub struct MockPmHal {
    now: Instant,
    next_outcome: SleepOutcome,
    fail_next: bool,
    calls: Vec<HalCall>,
}

impl MockPmHal {
    /// Create a mock whose clock starts at zero and whose sleeps last 10 ms
    /// and end on an RTC wake.
    pub fn new() -> Self {
        Self {
            now: Instant::from_ticks(0),
            next_outcome: SleepOutcome::Slept {
                elapsed: Duration::from_millis(10),
                source: WakeupSource::Rtc,
            },
            fail_next: false,
            calls: Vec::new(),
        }
    }

    /// Script the result of every following `enter_sleep`.
    pub fn set_outcome(&mut self, outcome: SleepOutcome) {
        self.next_outcome = outcome;
    }

    /// Make the next HAL call return [`MockHalError`].
    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    /// Move the clock forward.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// All recorded calls.
    pub fn calls(&self) -> &[HalCall] {
        &self.calls
    }

    /// Number of `enter_sleep` calls so far.
    pub fn sleep_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, HalCall::EnterSleep(_)))
            .count()
    }

    /// Most recent clock applied through `set_cpu_frequency`.
    pub fn last_cpu_frequency(&self) -> Option<CpuFrequency> {
        self.calls.iter().rev().find_map(|c| match c {
            HalCall::SetCpuFrequency(f) => Some(*f),
            _ => None,
        })
    }

    fn record(&mut self, call: HalCall) -> Result<(), MockHalError> {
        self.calls.push(call);
        if core::mem::take(&mut self.fail_next) {
            return Err(MockHalError);
        }
        Ok(())
    }
}

impl Default for MockPmHal {
    fn default() -> Self {
        Self::new()
    }
}

impl PmHal for MockPmHal {
    type Error = MockHalError;

    fn now(&self) -> Instant {
        self.now
    }

    fn arm_wakeup(
        &mut self,
        mode: SleepMode,
        config: &WakeupConfig,
        budget: Duration,
    ) -> Result<(), Self::Error> {
        self.record(HalCall::ArmWakeup(mode, config.clone(), budget))
    }

    fn enter_sleep(&mut self, mode: SleepMode) -> Result<SleepOutcome, Self::Error> {
        self.record(HalCall::EnterSleep(mode))?;
        if let SleepOutcome::Slept { elapsed, .. } = self.next_outcome {
            self.now += elapsed;
        }
        Ok(self.next_outcome)
    }

    fn set_cpu_frequency(&mut self, freq: CpuFrequency) -> Result<(), Self::Error> {
        self.record(HalCall::SetCpuFrequency(freq))
    }

    fn arm_alarm(&mut self, alarm: AlarmId, after: Duration) -> Result<(), Self::Error> {
        self.record(HalCall::ArmAlarm(alarm, after))
    }

    fn switch_lpo(&mut self, source: LpoSource) -> Result<(), Self::Error> {
        self.record(HalCall::SwitchLpo(source))
    }
}
