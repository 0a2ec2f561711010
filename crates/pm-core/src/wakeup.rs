//! Wakeup source registry.
//!
//! Holds which sources are armed for the next sleep and which one ended the
//! last one. The deep-sleep source is kept separately because on target it
//! is read back once after the reboot that deep sleep implies.

use embassy_time::Duration;
use platform::{GpioWake, SleepMode, WakeupConfig, WakeupSource};

use crate::error::PmError;

/// Parameter passed with [`WakeupRegistry::set_source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeupParam {
    /// RTC wake period.
    Rtc {
        /// Period between RTC wakes.
        period: Duration,
    },
    /// GPIO pin and trigger.
    Gpio(GpioWake),
    /// Sources with nothing to configure (radio, USB, touch).
    Plain,
}

/// Armed wake sources and last wake reasons.
pub struct WakeupRegistry {
    config: WakeupConfig,
    last_reason: WakeupSource,
    deep_sleep_source: WakeupSource,
}

impl WakeupRegistry {
    /// Nothing armed, no wake recorded.
    pub const fn new() -> Self {
        Self {
            config: WakeupConfig {
                enabled: 0,
                rtc_period: None,
                gpio: heapless::Vec::new(),
            },
            last_reason: WakeupSource::None,
            deep_sleep_source: WakeupSource::None,
        }
    }

    /// Arm `source` with `param`.
    ///
    /// A GPIO pin already present is reconfigured in place.
    ///
    /// # Errors
    ///
    /// - [`PmError::InvalidParam`] if `param` does not fit `source`.
    /// - [`PmError::OutOfMemory`] if the GPIO pin table is full.
    pub fn set_source(&mut self, source: WakeupSource, param: WakeupParam) -> Result<(), PmError> {
        match (source, param) {
            (WakeupSource::None, _) => return Err(PmError::InvalidParam),
            (WakeupSource::Rtc, WakeupParam::Rtc { period }) => {
                if period == Duration::from_ticks(0) {
                    return Err(PmError::InvalidParam);
                }
                self.config.rtc_period = Some(period);
            }
            (WakeupSource::Gpio, WakeupParam::Gpio(pin)) => {
                if let Some(existing) = self.config.gpio.iter_mut().find(|g| g.pin == pin.pin) {
                    *existing = pin;
                } else {
                    self.config
                        .gpio
                        .push(pin)
                        .map_err(|_| PmError::OutOfMemory)?;
                }
            }
            (
                WakeupSource::Wifi | WakeupSource::Bt | WakeupSource::Usb | WakeupSource::Touch,
                WakeupParam::Plain,
            ) => {}
            _ => return Err(PmError::InvalidParam),
        }
        self.config.enabled |= source.bit();
        Ok(())
    }

    /// Disarm `source` and forget its parameters.
    pub fn clear_source(&mut self, source: WakeupSource) {
        self.config.enabled &= !source.bit();
        match source {
            WakeupSource::Rtc => self.config.rtc_period = None,
            WakeupSource::Gpio => self.config.gpio.clear(),
            _ => {}
        }
    }

    /// Sources to arm before the next transition.
    pub fn config(&self) -> &WakeupConfig {
        &self.config
    }

    /// Record what woke the system out of `mode`.
    pub fn record(&mut self, mode: SleepMode, source: WakeupSource) {
        self.last_reason = source;
        if mode >= SleepMode::DeepSleep {
            self.deep_sleep_source = source;
        }
    }

    /// Source that ended the most recent sleep.
    pub fn last_reason(&self) -> WakeupSource {
        self.last_reason
    }

    /// Source that ended the most recent deep sleep.
    pub fn deep_sleep_source(&self) -> WakeupSource {
        self.deep_sleep_source
    }
}

impl Default for WakeupRegistry {
    fn default() -> Self {
        Self::new()
    }
}
