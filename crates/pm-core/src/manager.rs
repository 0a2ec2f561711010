//! The PM context.
//!
//! [`PowerManager`] owns every table the core arbitrates over. State that
//! drivers touch directly (votes, registries, the HAL handle) sits behind
//! critical-section mutexes, so each call is a short critical section and is
//! safe from interrupt, thread or worker context alike.
//!
//! Lock order, where two are held at once: `state` then `hal`. Callbacks are
//! always run with every lock released.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use platform::{CpuFrequency, LpoSource, PmHal, SleepMode, WakeupSource};

use crate::callback::{
    CallbackId, CallbackRegistry, DeviceHookTable, DeviceSleepHooks, SleepCallback,
};
use crate::config::{PmConfig, MAX_SLEEP_CALLBACKS, PM_QUEUE_DEPTH};
use crate::cpu_freq::CpuFreqArbiter;
use crate::error::PmError;
use crate::lpo::{LpoParty, LpoSwitchListener};
use crate::lv_timeout::{LvTimeoutCallback, LvTimeoutWatch};
use crate::message::PmMessage;
use crate::module::{DeviceId, ModuleId, ModuleSet, PowerModule, SleepModule};
use crate::vote::{PowerState, SleepVote, VoteTables};
use crate::wakeup::{WakeupParam, WakeupRegistry};
use crate::worker::SendCounters;

pub(crate) type CsMutex<T> = Mutex<CriticalSectionRawMutex, RefCell<T>>;

/// Where the system is right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemPowerState {
    /// Running, or idling in plain WFI.
    Active,
    /// Inside a low-voltage transition.
    LowVoltage,
    /// Inside a deep-sleep transition.
    DeepSleep,
    /// Inside a super-deep-sleep transition.
    SuperDeepSleep,
}

impl SystemPowerState {
    /// State the system is in while sleeping in `mode`.
    pub const fn from_mode(mode: SleepMode) -> Self {
        match mode {
            SleepMode::Normal => Self::Active,
            SleepMode::LowVoltage => Self::LowVoltage,
            SleepMode::DeepSleep => Self::DeepSleep,
            SleepMode::SuperDeepSleep => Self::SuperDeepSleep,
        }
    }

    /// Console name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::LowVoltage => "low-voltage",
            Self::DeepSleep => "deep",
            Self::SuperDeepSleep => "super-deep",
        }
    }
}

/// Point-in-time view for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmStatus {
    /// Current aggregate state.
    pub state: SystemPowerState,
    /// Mode the idle hook aims for.
    pub requested: SleepMode,
    /// LV gate members voting active.
    pub lv_blockers: ModuleSet<SleepModule>,
    /// Whether the deep-sleep gate is open.
    pub deep_sleep_eligible: bool,
    /// Effective CPU floor.
    pub cpu_freq: CpuFrequency,
    /// Source that ended the last sleep.
    pub wakeup_reason: WakeupSource,
    /// Source feeding the 32 kHz tick.
    pub lpo: LpoSource,
    /// RTC state-change edges counted toward the current repeat target.
    pub rtc_edges: u32,
    /// RTC heartbeats seen since boot.
    pub heartbeats: u32,
}

pub(crate) struct PmState {
    pub(crate) votes: VoteTables,
    pub(crate) cpu: CpuFreqArbiter,
    pub(crate) wakeup: WakeupRegistry,
    pub(crate) lv_watch: LvTimeoutWatch,
    pub(crate) requested: SleepMode,
    pub(crate) current: SystemPowerState,
    pub(crate) rtc_edges: u32,
    pub(crate) heartbeats: u32,
    pub(crate) lpo: LpoSource,
}

pub(crate) struct HookTables {
    pub(crate) pre_sleep: CallbackRegistry<MAX_SLEEP_CALLBACKS>,
    pub(crate) post_sleep: CallbackRegistry<MAX_SLEEP_CALLBACKS>,
    pub(crate) devices: DeviceHookTable,
    pub(crate) lv_timeout: Option<&'static dyn LvTimeoutCallback>,
    pub(crate) lpo: [Option<&'static dyn LpoSwitchListener>; LpoParty::COUNT],
}

/// Sleep-vote arbitration and message dispatch for one SoC.
///
/// Typically placed in a `static` (via `StaticCell`) and shared by
/// reference between drivers, interrupt handlers, the worker thread and the
/// idle hook.
pub struct PowerManager<H: PmHal> {
    pub(crate) config: PmConfig,
    pub(crate) state: CsMutex<PmState>,
    pub(crate) hooks: CsMutex<HookTables>,
    pub(crate) hal: CsMutex<H>,
    pub(crate) queue: Channel<CriticalSectionRawMutex, PmMessage, PM_QUEUE_DEPTH>,
    pub(crate) counters: SendCounters,
}

impl<H: PmHal> PowerManager<H> {
    /// Fresh context: every module active, every domain on, every CPU floor
    /// at default, requested mode from `config`.
    pub fn new(hal: H, config: PmConfig) -> Self {
        Self {
            state: Mutex::new(RefCell::new(PmState {
                votes: VoteTables::new(),
                cpu: CpuFreqArbiter::new(),
                wakeup: WakeupRegistry::new(),
                lv_watch: LvTimeoutWatch::new(),
                requested: config.default_mode,
                current: SystemPowerState::Active,
                rtc_edges: 0,
                heartbeats: 0,
                lpo: LpoSource::Rosc,
            })),
            hooks: Mutex::new(RefCell::new(HookTables {
                pre_sleep: CallbackRegistry::new(),
                post_sleep: CallbackRegistry::new(),
                devices: DeviceHookTable::new(),
                lv_timeout: None,
                lpo: [None; LpoParty::COUNT],
            })),
            hal: Mutex::new(RefCell::new(hal)),
            queue: Channel::new(),
            counters: SendCounters::new(),
            config,
        }
    }

    /// Configuration this context was built with.
    pub fn config(&self) -> &PmConfig {
        &self.config
    }

    /// Run `f` with exclusive access to the HAL.
    pub fn with_hal<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        self.hal.lock(|hal| f(&mut hal.borrow_mut()))
    }

    // ── Sleep votes ─────────────────────────────────────────────────────

    /// Record `module`'s permission to sleep.
    ///
    /// Idempotent. Nothing is evaluated here; the next idle-hook entry sees
    /// the new vote.
    pub fn vote_sleep(
        &self,
        module: SleepModule,
        asleep: bool,
        sleep_time: u32,
    ) -> Result<(), PmError> {
        self.state
            .lock(|s| s.borrow_mut().votes.vote_sleep(module, asleep, sleep_time));
        debug!("pm: vote sleep {} {}", module.name(), u8::from(asleep));
        Ok(())
    }

    /// [`vote_sleep`](Self::vote_sleep) with a raw module id.
    ///
    /// # Errors
    ///
    /// [`PmError::InvalidModule`] if `raw` is not a module id.
    pub fn vote_sleep_raw(&self, raw: u8, asleep: bool, sleep_time: u32) -> Result<(), PmError> {
        self.vote_sleep(SleepModule::try_from(raw)?, asleep, sleep_time)
    }

    /// Current vote of `module`.
    pub fn sleep_state(&self, module: SleepModule) -> SleepVote {
        self.state.lock(|s| s.borrow().votes.sleep_vote(module))
    }

    /// Raw-id read; `None` for an id that is not a module.
    pub fn sleep_state_raw(&self, raw: u8) -> Option<bool> {
        let module = SleepModule::try_from(raw).ok()?;
        Some(self.sleep_state(module).asleep)
    }

    /// Whether every LV-gate member votes "asleep".
    pub fn low_voltage_eligible(&self) -> bool {
        let gate = self.config.lv_gate;
        self.state.lock(|s| s.borrow().votes.low_voltage_eligible(gate))
    }

    /// LV-gate members still voting active.
    pub fn lv_blockers(&self) -> ModuleSet<SleepModule> {
        let gate = self.config.lv_gate;
        self.state.lock(|s| s.borrow().votes.lv_blockers(gate))
    }

    // ── Power votes ─────────────────────────────────────────────────────

    /// Record `domain`'s power vote. Idempotent.
    pub fn vote_power(&self, domain: PowerModule, state: PowerState) -> Result<(), PmError> {
        self.state
            .lock(|s| s.borrow_mut().votes.vote_power(domain, state));
        debug!("pm: vote power {} {}", domain.name(), state.name());
        Ok(())
    }

    /// Current vote of `domain`.
    pub fn power_state(&self, domain: PowerModule) -> PowerState {
        self.state.lock(|s| s.borrow().votes.power_state(domain))
    }

    /// Whether every deep-sleep-gate domain is voted off.
    pub fn deep_sleep_eligible(&self) -> bool {
        let gate = self.config.deep_sleep_gate;
        self.state.lock(|s| s.borrow().votes.deep_sleep_eligible(gate))
    }

    // ── Modes ───────────────────────────────────────────────────────────

    /// Aggregate power state.
    pub fn current_state(&self) -> SystemPowerState {
        self.state.lock(|s| s.borrow().current)
    }

    /// Set the deepest mode the idle hook may enter. [`SleepMode::Normal`]
    /// keeps it at plain WFI.
    pub fn set_sleep_mode(&self, mode: SleepMode) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            s.requested = mode;
            if mode == SleepMode::Normal {
                s.lv_watch.clear();
            }
        });
        info!("pm: sleep mode {}", mode.name());
    }

    /// Mode the idle hook aims for.
    pub fn sleep_mode(&self) -> SleepMode {
        self.state.lock(|s| s.borrow().requested)
    }

    // ── CPU frequency ───────────────────────────────────────────────────

    /// Record `device`'s CPU floor and reprogram the clock if the effective
    /// frequency changed.
    ///
    /// # Errors
    ///
    /// [`PmError::Hal`] if the clock switch failed. The vote is kept and the
    /// next vote retries the switch.
    pub fn vote_cpu_freq(&self, device: DeviceId, floor: CpuFrequency) -> Result<(), PmError> {
        let applied: Result<Option<CpuFrequency>, PmError> = self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let Some(next) = s.cpu.vote(device, floor) else {
                return Ok(None);
            };
            self.hal
                .lock(|hal| hal.borrow_mut().set_cpu_frequency(next))
                .map_err(|_| PmError::Hal)?;
            s.cpu.mark_applied(next);
            Ok(Some(next))
        });
        match applied {
            Ok(Some(freq)) => info!("pm: cpu {} MHz", freq.mhz()),
            Ok(None) => {}
            Err(_) => error!("pm: cpu switch for {} failed", device.name()),
        }
        applied.map(|_| ())
    }

    /// Highest floor any device has voted.
    pub fn current_max_cpu_freq(&self) -> CpuFrequency {
        self.state.lock(|s| s.borrow().cpu.current_max())
    }

    /// Floor voted by `device`.
    pub fn cpu_freq_vote(&self, device: DeviceId) -> CpuFrequency {
        self.state.lock(|s| s.borrow().cpu.floor(device))
    }

    // ── Wakeup sources ──────────────────────────────────────────────────

    /// Arm `source` for the next sleep.
    ///
    /// # Errors
    ///
    /// See [`WakeupRegistry::set_source`].
    pub fn wakeup_source_set(
        &self,
        source: WakeupSource,
        param: WakeupParam,
    ) -> Result<(), PmError> {
        self.state
            .lock(|s| s.borrow_mut().wakeup.set_source(source, param))
    }

    /// Disarm `source`.
    pub fn wakeup_source_clear(&self, source: WakeupSource) {
        self.state.lock(|s| s.borrow_mut().wakeup.clear_source(source));
    }

    /// Source that ended the most recent sleep.
    pub fn sleep_wakeup_reason(&self) -> WakeupSource {
        self.state.lock(|s| s.borrow().wakeup.last_reason())
    }

    /// Source that ended the most recent deep sleep.
    pub fn deep_sleep_wakeup_source(&self) -> WakeupSource {
        self.state.lock(|s| s.borrow().wakeup.deep_sleep_source())
    }

    // ── Callbacks ───────────────────────────────────────────────────────

    /// Run `callback` before every transition, in ascending `priority`;
    /// among equal priorities the latest registration runs first.
    ///
    /// # Errors
    ///
    /// [`PmError::OutOfMemory`] when the registry is full.
    pub fn register_pre_sleep(
        &self,
        callback: &'static dyn SleepCallback,
        priority: u8,
    ) -> Result<CallbackId, PmError> {
        self.hooks
            .lock(|h| h.borrow_mut().pre_sleep.register(callback, priority))
    }

    /// Remove a pre-sleep callback.
    ///
    /// # Errors
    ///
    /// [`PmError::NotFound`] if `id` is not registered.
    pub fn unregister_pre_sleep(&self, id: CallbackId) -> Result<(), PmError> {
        self.hooks.lock(|h| h.borrow_mut().pre_sleep.unregister(id))
    }

    /// Run `callback` after every transition. Ordering as for
    /// [`register_pre_sleep`](Self::register_pre_sleep).
    ///
    /// # Errors
    ///
    /// [`PmError::OutOfMemory`] when the registry is full.
    pub fn register_post_sleep(
        &self,
        callback: &'static dyn SleepCallback,
        priority: u8,
    ) -> Result<CallbackId, PmError> {
        self.hooks
            .lock(|h| h.borrow_mut().post_sleep.register(callback, priority))
    }

    /// Remove a post-sleep callback.
    ///
    /// # Errors
    ///
    /// [`PmError::NotFound`] if `id` is not registered.
    pub fn unregister_post_sleep(&self, id: CallbackId) -> Result<(), PmError> {
        self.hooks.lock(|h| h.borrow_mut().post_sleep.unregister(id))
    }

    /// Install enter/exit hooks for `device`, replacing any previous pair.
    pub fn register_device_hooks(&self, device: DeviceId, hooks: &'static dyn DeviceSleepHooks) {
        self.hooks
            .lock(|h| h.borrow_mut().devices.register(device, hooks));
    }

    /// Remove `device`'s hooks.
    ///
    /// # Errors
    ///
    /// [`PmError::NotFound`] if none are installed.
    pub fn unregister_device_hooks(&self, device: DeviceId) -> Result<(), PmError> {
        self.hooks.lock(|h| h.borrow_mut().devices.unregister(device))
    }

    // ── Status ──────────────────────────────────────────────────────────

    /// Snapshot of the aggregate state.
    pub fn status(&self) -> PmStatus {
        let lv_gate = self.config.lv_gate;
        let deep_gate = self.config.deep_sleep_gate;
        self.state.lock(|s| {
            let s = s.borrow();
            PmStatus {
                state: s.current,
                requested: s.requested,
                lv_blockers: s.votes.lv_blockers(lv_gate),
                deep_sleep_eligible: s.votes.deep_sleep_eligible(deep_gate),
                cpu_freq: s.cpu.current_max(),
                wakeup_reason: s.wakeup.last_reason(),
                lpo: s.lpo,
                rtc_edges: s.rtc_edges,
                heartbeats: s.heartbeats,
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use platform::mocks::{HalCall, MockPmHal};

    fn pm() -> PowerManager<MockPmHal> {
        PowerManager::new(MockPmHal::new(), PmConfig::default())
    }

    #[test]
    fn test_raw_vote_rejects_out_of_range_module() {
        let pm = pm();
        assert_eq!(pm.vote_sleep_raw(200, true, 0), Err(PmError::InvalidModule));
        assert_eq!(pm.sleep_state_raw(200), None);
        pm.vote_sleep_raw(SleepModule::Uart1 as u8, true, 0).unwrap();
        assert_eq!(pm.sleep_state_raw(SleepModule::Uart1 as u8), Some(true));
    }

    #[test]
    fn test_cpu_vote_programs_clock_only_on_change() {
        let pm = pm();
        pm.vote_cpu_freq(DeviceId::Audio, CpuFrequency::Mhz120).unwrap();
        pm.vote_cpu_freq(DeviceId::Wifi, CpuFrequency::Mhz80).unwrap();
        pm.vote_cpu_freq(DeviceId::Audio, CpuFrequency::Default).unwrap();

        let switches: std::vec::Vec<_> = pm.with_hal(|hal| {
            hal.calls()
                .iter()
                .filter_map(|c| match c {
                    HalCall::SetCpuFrequency(f) => Some(*f),
                    _ => None,
                })
                .collect()
        });
        assert_eq!(switches, [CpuFrequency::Mhz120, CpuFrequency::Mhz80]);
        assert_eq!(pm.current_max_cpu_freq(), CpuFrequency::Mhz80);
    }

    #[test]
    fn test_failed_cpu_switch_is_retried_on_next_vote() {
        let pm = pm();
        pm.with_hal(MockPmHal::fail_next);
        assert_eq!(pm.vote_cpu_freq(DeviceId::Audio, CpuFrequency::Mhz240), Err(PmError::Hal));
        assert_eq!(pm.cpu_freq_vote(DeviceId::Audio), CpuFrequency::Mhz240);

        pm.vote_cpu_freq(DeviceId::Bt, CpuFrequency::Mhz40).unwrap();
        assert_eq!(pm.with_hal(|hal| hal.last_cpu_frequency()), Some(CpuFrequency::Mhz240));
    }

    #[test]
    fn test_set_sleep_mode() {
        let pm = pm();
        assert_eq!(pm.sleep_mode(), SleepMode::LowVoltage);
        pm.set_sleep_mode(SleepMode::DeepSleep);
        assert_eq!(pm.sleep_mode(), SleepMode::DeepSleep);
        assert_eq!(pm.current_state(), SystemPowerState::Active);
    }
}
