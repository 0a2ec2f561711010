//! Power management abstraction
//!
//! Shared power-state vocabulary and the [`PmHal`] boundary the PM core
//! drives: arming wake sources, the low-power transition itself, CPU clock
//! selection, one-shot RTC alarms and the 32 kHz source switch.
//!
//! Nothing in here touches registers. Board crates implement [`PmHal`];
//! host tests use [`crate::mocks::MockPmHal`].

use embassy_time::{Duration, Instant};

/// Sleep depth requested by the application or reached by the idle hook.
///
/// Ordered from shallowest to deepest, so `a > b` means "`a` sleeps deeper".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepMode {
    /// Plain WFI idle, every clock running.
    Normal,
    /// Peripherals clock-gated, core retained at reduced supply voltage.
    LowVoltage,
    /// Power domains shut down, re-initialisation required on wake.
    DeepSleep,
    /// Deep sleep with the always-on domain trimmed further.
    SuperDeepSleep,
}

impl SleepMode {
    /// Short lowercase name used by console output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::LowVoltage => "low-voltage",
            Self::DeepSleep => "deep",
            Self::SuperDeepSleep => "super-deep",
        }
    }
}

/// Interrupt class that ended the most recent sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeupSource {
    /// No wake recorded yet (cold boot).
    None,
    /// GPIO edge or level.
    Gpio,
    /// RTC alarm.
    Rtc,
    /// WiFi MAC wake.
    Wifi,
    /// Bluetooth controller wake.
    Bt,
    /// USB plug detect.
    Usb,
    /// Capacitive touch.
    Touch,
}

impl WakeupSource {
    /// Every source that can actually fire, in bit order.
    pub const FIRING: [Self; 6] = [
        Self::Gpio,
        Self::Rtc,
        Self::Wifi,
        Self::Bt,
        Self::Usb,
        Self::Touch,
    ];

    /// Bit used by [`WakeupConfig::enabled`]; `None` has no bit.
    pub const fn bit(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Gpio => 1 << 0,
            Self::Rtc => 1 << 1,
            Self::Wifi => 1 << 2,
            Self::Bt => 1 << 3,
            Self::Usb => 1 << 4,
            Self::Touch => 1 << 5,
        }
    }

    /// Short lowercase name used by console output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gpio => "gpio",
            Self::Rtc => "rtc",
            Self::Wifi => "wifi",
            Self::Bt => "bt",
            Self::Usb => "usb",
            Self::Touch => "touch",
        }
    }
}

/// CPU / bus clock selections, lowest first.
///
/// `Default` is the boot clock and is what a device votes when it has no
/// requirement; there is no separate "abstain" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CpuFrequency {
    /// Boot clock (26 MHz crystal).
    Default,
    /// 40 MHz.
    Mhz40,
    /// 60 MHz.
    Mhz60,
    /// 80 MHz.
    Mhz80,
    /// 120 MHz.
    Mhz120,
    /// 240 MHz.
    Mhz240,
    /// 320 MHz.
    Mhz320,
    /// 480 MHz.
    Mhz480,
}

impl CpuFrequency {
    /// All selections, ascending.
    pub const ALL: [Self; 8] = [
        Self::Default,
        Self::Mhz40,
        Self::Mhz60,
        Self::Mhz80,
        Self::Mhz120,
        Self::Mhz240,
        Self::Mhz320,
        Self::Mhz480,
    ];

    /// Clock rate in MHz.
    pub const fn mhz(self) -> u32 {
        match self {
            Self::Default => 26,
            Self::Mhz40 => 40,
            Self::Mhz60 => 60,
            Self::Mhz80 => 80,
            Self::Mhz120 => 120,
            Self::Mhz240 => 240,
            Self::Mhz320 => 320,
            Self::Mhz480 => 480,
        }
    }

    /// Exact reverse of [`mhz`](Self::mhz).
    pub fn from_mhz(mhz: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.mhz() == mhz)
    }
}

/// Low-power oscillator feeding the 32 kHz tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LpoSource {
    /// Internal RC oscillator (boot default, least accurate).
    Rosc,
    /// External 32.768 kHz crystal.
    Xtal32k,
    /// Divided down from the 26 MHz crystal.
    Derived26m,
}

impl LpoSource {
    /// Short lowercase name used by console output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rosc => "rosc",
            Self::Xtal32k => "xtal32k",
            Self::Derived26m => "26m",
        }
    }
}

/// One-shot RTC alarms owned by the PM core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmId {
    /// Console grace window after a UART wake in low-voltage mode.
    ConsoleGrace,
}

/// GPIO wake trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpioTrigger {
    /// Low level.
    LowLevel,
    /// High level.
    HighLevel,
    /// Rising edge.
    RisingEdge,
    /// Falling edge.
    FallingEdge,
}

/// GPIO wake pin configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpioWake {
    /// Pad number.
    pub pin: u8,
    /// Trigger condition.
    pub trigger: GpioTrigger,
}

/// Maximum number of GPIO wake pins tracked at once.
pub const MAX_GPIO_WAKE_PINS: usize = 8;

/// Wake sources armed before each low-power transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WakeupConfig {
    /// Bitmask of [`WakeupSource::bit`] values.
    pub enabled: u8,
    /// Periodic RTC wake, if armed.
    pub rtc_period: Option<Duration>,
    /// GPIO wake pins.
    pub gpio: heapless::Vec<GpioWake, MAX_GPIO_WAKE_PINS>,
}

impl WakeupConfig {
    /// Returns `true` if `source` is armed.
    pub fn is_enabled(&self, source: WakeupSource) -> bool {
        self.enabled & source.bit() != 0
    }
}

/// What the hardware reports after a transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepOutcome {
    /// The core slept for `elapsed` and was woken by `source`.
    Slept {
        /// Wall-clock time spent in the low-power state.
        elapsed: Duration,
        /// Interrupt that ended the sleep.
        source: WakeupSource,
    },
    /// A wake interrupt was already pending; the transition never started.
    Aborted,
}

/// Board hooks the PM core drives.
///
/// All methods are called with the PM core's HAL lock held, which on target
/// is a critical section. Implementations must not block and must not call
/// back into the PM core.
pub trait PmHal {
    /// Error type
    type Error: core::fmt::Debug;

    /// Current time on the always-on clock.
    fn now(&self) -> Instant;

    /// Program wake sources and the wake timer for the coming transition.
    fn arm_wakeup(
        &mut self,
        mode: SleepMode,
        config: &WakeupConfig,
        budget: Duration,
    ) -> Result<(), Self::Error>;

    /// Perform the low-power transition and return once the core runs again.
    ///
    /// Runs inside a critical section, so interrupt handlers and message
    /// producers wait until it returns. It must return [`SleepOutcome::Aborted`]
    /// when a wake interrupt is already pending and must come back as soon as
    /// one is raised during the sleep. Host implementations model the wake
    /// interrupt line instead of sleeping out the whole budget.
    fn enter_sleep(&mut self, mode: SleepMode) -> Result<SleepOutcome, Self::Error>;

    /// Switch the CPU / bus clock.
    fn set_cpu_frequency(&mut self, freq: CpuFrequency) -> Result<(), Self::Error>;

    /// Arm a one-shot RTC alarm. Expiry is reported back as a PM message.
    fn arm_alarm(&mut self, alarm: AlarmId, after: Duration) -> Result<(), Self::Error>;

    /// Re-source the 32 kHz tick, preserving the tick count.
    fn switch_lpo(&mut self, source: LpoSource) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_modes_order_by_depth() {
        assert!(SleepMode::Normal < SleepMode::LowVoltage);
        assert!(SleepMode::LowVoltage < SleepMode::DeepSleep);
        assert!(SleepMode::DeepSleep < SleepMode::SuperDeepSleep);
    }

    #[test]
    fn test_cpu_frequency_from_mhz_round_trips_table() {
        for f in CpuFrequency::ALL {
            assert_eq!(CpuFrequency::from_mhz(f.mhz()), Some(f));
        }
        assert_eq!(CpuFrequency::from_mhz(100), None);
    }

    #[test]
    fn test_wakeup_bits_are_distinct() {
        let mut seen = 0u8;
        for source in WakeupSource::FIRING {
            assert_eq!(seen & source.bit(), 0);
            seen |= source.bit();
        }
        assert_eq!(WakeupSource::None.bit(), 0);
    }

    #[test]
    fn test_wakeup_config_is_enabled() {
        let config = WakeupConfig {
            enabled: WakeupSource::Rtc.bit() | WakeupSource::Gpio.bit(),
            ..WakeupConfig::default()
        };
        assert!(config.is_enabled(WakeupSource::Rtc));
        assert!(config.is_enabled(WakeupSource::Gpio));
        assert!(!config.is_enabled(WakeupSource::Usb));
    }
}
