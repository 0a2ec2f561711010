//! CPU-frequency arbitration.
//!
//! Each device votes a floor; the effective clock is the highest floor.
//! A device with no requirement votes [`CpuFrequency::Default`], which is
//! also the initial vote of every device.

use platform::CpuFrequency;

use crate::module::{DeviceId, ModuleId};

/// Per-device frequency floors and the clock currently applied.
pub struct CpuFreqArbiter {
    floors: [CpuFrequency; DeviceId::COUNT],
    applied: CpuFrequency,
}

impl CpuFreqArbiter {
    /// Every device at the default floor.
    pub const fn new() -> Self {
        Self {
            floors: [CpuFrequency::Default; DeviceId::COUNT],
            applied: CpuFrequency::Default,
        }
    }

    /// Record `device`'s floor.
    ///
    /// Returns the new effective frequency when it differs from the applied
    /// one; the caller programs the clock and then calls
    /// [`mark_applied`](Self::mark_applied).
    pub fn vote(&mut self, device: DeviceId, floor: CpuFrequency) -> Option<CpuFrequency> {
        if let Some(slot) = self.floors.get_mut(device.index()) {
            *slot = floor;
        }
        let effective = self.current_max();
        (effective != self.applied).then_some(effective)
    }

    /// Highest floor among all devices.
    pub fn current_max(&self) -> CpuFrequency {
        self.floors
            .iter()
            .copied()
            .max()
            .unwrap_or(CpuFrequency::Default)
    }

    /// Floor currently voted by `device`.
    pub fn floor(&self, device: DeviceId) -> CpuFrequency {
        self.floors
            .get(device.index())
            .copied()
            .unwrap_or(CpuFrequency::Default)
    }

    /// Clock most recently programmed into the hardware.
    pub fn applied(&self) -> CpuFrequency {
        self.applied
    }

    /// Record that `freq` is now running.
    pub fn mark_applied(&mut self, freq: CpuFrequency) {
        self.applied = freq;
    }
}

impl Default for CpuFreqArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_floor_wins() {
        let mut cpu = CpuFreqArbiter::new();
        assert_eq!(cpu.vote(DeviceId::Audio, CpuFrequency::Mhz120), Some(CpuFrequency::Mhz120));
        cpu.mark_applied(CpuFrequency::Mhz120);
        assert_eq!(cpu.vote(DeviceId::Wifi, CpuFrequency::Mhz80), None);
        assert_eq!(cpu.current_max(), CpuFrequency::Mhz120);
        assert_eq!(cpu.vote(DeviceId::Video, CpuFrequency::Mhz320), Some(CpuFrequency::Mhz320));
    }

    #[test]
    fn test_dropping_the_top_vote_lowers_the_clock() {
        let mut cpu = CpuFreqArbiter::new();
        cpu.vote(DeviceId::Audio, CpuFrequency::Mhz240);
        cpu.mark_applied(CpuFrequency::Mhz240);
        cpu.vote(DeviceId::Bt, CpuFrequency::Mhz60);

        let next = cpu.vote(DeviceId::Audio, CpuFrequency::Default);

        assert_eq!(next, Some(CpuFrequency::Mhz60));
        assert_eq!(cpu.floor(DeviceId::Audio), CpuFrequency::Default);
    }

    #[test]
    fn test_repeat_vote_is_not_a_change() {
        let mut cpu = CpuFreqArbiter::new();
        assert_eq!(cpu.vote(DeviceId::App, CpuFrequency::Default), None);
    }
}
