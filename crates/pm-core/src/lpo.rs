//! 32 kHz low-power oscillator switch.
//!
//! The BT and WiFi controllers both count sleep time on the 32 kHz tick, so
//! re-sourcing it is a three-step handshake: each registered party is asked
//! to prepare, the switch happens inside one critical section so no tick is
//! lost, and each party is told which source ended up running.

use platform::{LpoSource, PmHal};

use crate::error::PmError;
use crate::manager::PowerManager;

/// Subsystem taking part in the switch handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LpoParty {
    /// Bluetooth controller.
    Bt,
    /// WiFi MAC.
    Wifi,
}

impl LpoParty {
    /// Number of parties.
    pub const COUNT: usize = 2;

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Bt => 0,
            Self::Wifi => 1,
        }
    }
}

/// Callbacks around a 32 kHz source switch.
pub trait LpoSwitchListener: Sync {
    /// Called before the switch to `target`. Save anything derived from the
    /// current tick.
    fn prepare(&self, target: LpoSource);
    /// Called after the switch attempt with the source now running, which is
    /// the old one if the switch failed.
    fn completed(&self, running: LpoSource);
}

impl<H: PmHal> PowerManager<H> {
    /// Install `listener` for `party`, replacing any previous one.
    pub fn register_lpo_listener(&self, party: LpoParty, listener: &'static dyn LpoSwitchListener) {
        self.hooks.lock(|h| {
            if let Some(slot) = h.borrow_mut().lpo.get_mut(party.index()) {
                *slot = Some(listener);
            }
        });
    }

    /// Source currently feeding the 32 kHz tick.
    pub fn lpo_source(&self) -> LpoSource {
        self.state.lock(|s| s.borrow().lpo)
    }

    /// Re-source the 32 kHz tick.
    ///
    /// Switching to the source already running is a no-op and notifies no
    /// one.
    ///
    /// # Errors
    ///
    /// [`PmError::Hal`] if the board refused the switch; listeners are then
    /// told the old source is still running.
    pub fn switch_lpo_source(&self, target: LpoSource) -> Result<(), PmError> {
        let current = self.lpo_source();
        if current == target {
            return Ok(());
        }

        let listeners = self.hooks.lock(|h| h.borrow().lpo);
        for listener in listeners.iter().flatten() {
            listener.prepare(target);
        }

        let switched = critical_section::with(|_| {
            let ok = self.hal.lock(|hal| hal.borrow_mut().switch_lpo(target)).is_ok();
            if ok {
                self.state.lock(|s| s.borrow_mut().lpo = target);
            }
            ok
        });

        let running = if switched { target } else { current };
        for listener in listeners.iter().flatten() {
            listener.completed(running);
        }

        if switched {
            info!("pm: lpo switched to {}", target.name());
            Ok(())
        } else {
            error!("pm: lpo switch to {} failed", target.name());
            Err(PmError::Hal)
        }
    }
}
