//! Sleep and power vote tables.
//!
//! Plain data: no locking here. [`crate::PowerManager`] keeps the tables
//! behind a critical-section mutex so drivers may vote from any context.

use crate::module::{ModuleId, ModuleSet, PowerModule, SleepModule};

/// One module's sleep vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SleepVote {
    /// `true` = "I permit deeper sleep", `false` = "keep the system active".
    pub asleep: bool,
    /// Advisory duration hint from the voter, not used for arbitration.
    pub sleep_time: u32,
}

/// Power-domain vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    /// Domain must stay powered.
    On,
    /// Domain may be shut down.
    Off,
}

impl PowerState {
    /// Console name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// Sleep and power votes for every module.
///
/// Zero-initialised: every module is active, every domain is on.
#[derive(Debug, Clone)]
pub struct VoteTables {
    asleep: ModuleSet<SleepModule>,
    sleep_time: [u32; SleepModule::COUNT],
    powered_off: ModuleSet<PowerModule>,
}

impl VoteTables {
    /// Fresh tables, nothing permitting sleep.
    pub const fn new() -> Self {
        Self {
            asleep: ModuleSet::empty(),
            sleep_time: [0; SleepModule::COUNT],
            powered_off: ModuleSet::empty(),
        }
    }

    /// Record `module`'s sleep vote. Idempotent.
    pub fn vote_sleep(&mut self, module: SleepModule, asleep: bool, sleep_time: u32) {
        if asleep {
            self.asleep.insert(module);
        } else {
            self.asleep.remove(module);
        }
        if let Some(slot) = self.sleep_time.get_mut(module.index()) {
            *slot = sleep_time;
        }
    }

    /// Current vote of `module`.
    pub fn sleep_vote(&self, module: SleepModule) -> SleepVote {
        SleepVote {
            asleep: self.asleep.contains(module),
            sleep_time: self.sleep_time.get(module.index()).copied().unwrap_or(0),
        }
    }

    /// Modules currently voting "asleep".
    pub fn asleep(&self) -> ModuleSet<SleepModule> {
        self.asleep
    }

    /// Record `domain`'s power vote. Idempotent.
    pub fn vote_power(&mut self, domain: PowerModule, state: PowerState) {
        match state {
            PowerState::Off => self.powered_off.insert(domain),
            PowerState::On => self.powered_off.remove(domain),
        }
    }

    /// Current vote of `domain`.
    pub fn power_state(&self, domain: PowerModule) -> PowerState {
        if self.powered_off.contains(domain) {
            PowerState::Off
        } else {
            PowerState::On
        }
    }

    /// AND-reduction of the sleep votes over `gate`.
    pub fn low_voltage_eligible(&self, gate: ModuleSet<SleepModule>) -> bool {
        self.asleep.is_superset(gate)
    }

    /// Gate members still holding the system awake.
    pub fn lv_blockers(&self, gate: ModuleSet<SleepModule>) -> ModuleSet<SleepModule> {
        gate.difference(self.asleep)
    }

    /// AND-reduction of the power votes over `gate`.
    pub fn deep_sleep_eligible(&self, gate: ModuleSet<PowerModule>) -> bool {
        self.powered_off.is_superset(gate)
    }
}

impl Default for VoteTables {
    fn default() -> Self {
        Self::new()
    }
}
