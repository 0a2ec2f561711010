//! Messages carried by the PM queue.
//!
//! Each message is a small `Copy` value, enqueued by value from interrupt
//! context and discarded once the worker has handled it.

use platform::{AlarmId, SleepMode, WakeupSource};

use crate::module::SleepModule;

/// What an interrupt or driver asks the worker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PmMessage {
    /// A wake interrupt fired; classify and act on it.
    CallbackHandle(WakeupEvent),
    /// Request low voltage as the idle-time target.
    EnterLowVoltage,
    /// Request deep sleep as the idle-time target.
    EnterDeepSleep,
    /// A one-shot RTC alarm armed by the worker has expired.
    AlarmExpired(AlarmId),
}

/// Payload of [`PmMessage::CallbackHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WakeupEvent {
    /// Sleep mode the system was in when the interrupt fired.
    pub mode: SleepMode,
    /// Interrupt class.
    pub source: WakeupSource,
    /// Source-specific detail.
    pub detail: WakeDetail,
}

/// Source-specific part of a wake event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeDetail {
    /// No extra information.
    None,
    /// Periodic RTC tick (about every 10 ms). Handled on the cheap path.
    Heartbeat,
    /// RTC alarm that is a real state change. `owner` is held active until
    /// `repeat` such edges have been counted.
    RtcEdge {
        /// Module kept awake while the count accumulates.
        owner: SleepModule,
        /// Edges to count before `owner` may sleep again.
        repeat: u32,
    },
    /// GPIO wake.
    Gpio {
        /// The pin is the console UART RX line.
        console: bool,
    },
}

impl PmMessage {
    /// Periodic RTC tick.
    pub const fn rtc_heartbeat(mode: SleepMode) -> Self {
        Self::CallbackHandle(WakeupEvent {
            mode,
            source: WakeupSource::Rtc,
            detail: WakeDetail::Heartbeat,
        })
    }

    /// RTC state-change edge.
    pub const fn rtc_edge(mode: SleepMode, owner: SleepModule, repeat: u32) -> Self {
        Self::CallbackHandle(WakeupEvent {
            mode,
            source: WakeupSource::Rtc,
            detail: WakeDetail::RtcEdge { owner, repeat },
        })
    }

    /// GPIO wake; `console` marks the console UART RX pin.
    pub const fn gpio(mode: SleepMode, console: bool) -> Self {
        Self::CallbackHandle(WakeupEvent {
            mode,
            source: WakeupSource::Gpio,
            detail: WakeDetail::Gpio { console },
        })
    }

    /// Wake from any other source, no detail.
    pub const fn wakeup(mode: SleepMode, source: WakeupSource) -> Self {
        Self::CallbackHandle(WakeupEvent {
            mode,
            source,
            detail: WakeDetail::None,
        })
    }
}
