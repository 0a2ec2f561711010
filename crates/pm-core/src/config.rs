//! PM core configuration and constants
//!
//! Compile-time sizing lives in constants; the gates and timings a board may
//! want to tune live in [`PmConfig`], whose `Default` is built from the same
//! constants.

use embassy_time::Duration;
use platform::SleepMode;

use crate::module::{ModuleSet, PowerModule, SleepModule};

/// Depth of the PM message queue.
///
/// 20 messages at one RTC tick per 10 ms gives roughly 200 ms of burst
/// tolerance before drops begin.
pub const PM_QUEUE_DEPTH: usize = 20;

/// Stack reserved for the dedicated PM worker thread, in 32-bit words.
pub const PM_THREAD_STACK_WORDS: usize = 1024;

/// Drops between two "queue full" error logs.
pub const DROP_LOG_INTERVAL: u32 = 1000;

/// Capacity of each pre-/post-sleep callback registry.
pub const MAX_SLEEP_CALLBACKS: usize = 16;

/// How long the LOG module stays awake after a console wake in low voltage.
pub const CONSOLE_GRACE: Duration = Duration::from_secs(2);

/// How long low voltage may be wanted but blocked before the timeout
/// callback fires.
pub const ENTER_LV_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle budgets shorter than this (in OS ticks) are not worth a transition.
pub const MIN_IDLE_TICKS: u32 = 2;

/// One RTOS tick.
pub const OS_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Sleep modules left out of the default low-voltage gate: the radio stacks
/// and the generic application slot manage their own duty cycle.
pub const LV_GATE_EXCLUDED: [SleepModule; 3] =
    [SleepModule::Bt, SleepModule::WifiMac, SleepModule::App];

/// Power domains that must be voted off before deep sleep.
pub const DEEP_SLEEP_DOMAINS: [PowerModule; 8] = [
    PowerModule::Audio,
    PowerModule::Video,
    PowerModule::Bt,
    PowerModule::WifiMac,
    PowerModule::WifiPhy,
    PowerModule::Cpu1,
    PowerModule::Cpu2,
    PowerModule::App,
];

/// Runtime configuration for [`crate::PowerManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmConfig {
    /// Every module here must vote "asleep" before low voltage is allowed.
    pub lv_gate: ModuleSet<SleepModule>,
    /// Every domain here must vote "off" before deep sleep is allowed.
    pub deep_sleep_gate: ModuleSet<PowerModule>,
    /// Sleep mode requested at boot.
    pub default_mode: SleepMode,
    /// See [`CONSOLE_GRACE`].
    pub console_grace: Duration,
    /// See [`ENTER_LV_TIMEOUT`].
    pub lv_timeout: Duration,
    /// See [`MIN_IDLE_TICKS`].
    pub min_idle_ticks: u32,
    /// See [`OS_TICK_PERIOD`].
    pub tick_period: Duration,
    /// See [`DROP_LOG_INTERVAL`]. Zero disables drop logging.
    pub drop_log_interval: u32,
}

impl Default for PmConfig {
    fn default() -> Self {
        Self {
            lv_gate: ModuleSet::all_except(&LV_GATE_EXCLUDED),
            deep_sleep_gate: DEEP_SLEEP_DOMAINS.into_iter().collect(),
            default_mode: SleepMode::LowVoltage,
            console_grace: CONSOLE_GRACE,
            lv_timeout: ENTER_LV_TIMEOUT,
            min_idle_ticks: MIN_IDLE_TICKS,
            tick_period: OS_TICK_PERIOD,
            drop_log_interval: DROP_LOG_INTERVAL,
        }
    }
}
