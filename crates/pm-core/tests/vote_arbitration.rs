//! Vote-table reduction through the public `PowerManager` API.
//!
//! Low voltage needs every module in the LV gate to vote "asleep"; deep
//! sleep additionally needs every domain in the deep-sleep gate voted off.

#![allow(clippy::unwrap_used)]

use platform::mocks::MockPmHal;
use pm_core::config::{DEEP_SLEEP_DOMAINS, LV_GATE_EXCLUDED};
use pm_core::{ModuleId, PmConfig, PowerManager, PowerModule, PowerState, SleepModule};
use proptest::prelude::*;

fn pm() -> PowerManager<MockPmHal> {
    PowerManager::new(MockPmHal::new(), PmConfig::default())
}

proptest! {
    /// Eligibility is exactly the AND of the gate members' votes; modules
    /// outside the gate never matter.
    #[test]
    fn eligibility_is_and_over_gate(
        votes in proptest::collection::vec(any::<bool>(), SleepModule::COUNT)
    ) {
        let pm = pm();
        for (module, asleep) in SleepModule::ALL.iter().zip(&votes) {
            pm.vote_sleep(*module, *asleep, 0).unwrap();
        }
        let gate = pm.config().lv_gate;
        let expected = SleepModule::ALL
            .iter()
            .zip(&votes)
            .filter(|(m, _)| gate.contains(**m))
            .all(|(_, asleep)| *asleep);
        prop_assert_eq!(pm.low_voltage_eligible(), expected);
    }

    /// With every gate member asleep, any single member voting active closes
    /// the gate and is reported as the only blocker.
    #[test]
    fn single_active_vote_blocks(pick in 0usize..SleepModule::COUNT) {
        let pm = pm();
        let gate = pm.config().lv_gate;
        for m in gate.iter() {
            pm.vote_sleep(m, true, 0).unwrap();
        }
        prop_assert!(pm.low_voltage_eligible());

        let module = *SleepModule::ALL.get(pick).unwrap();
        pm.vote_sleep(module, false, 0).unwrap();
        if gate.contains(module) {
            prop_assert!(!pm.low_voltage_eligible());
            prop_assert_eq!(pm.lv_blockers().iter().collect::<Vec<_>>(), vec![module]);
        } else {
            prop_assert!(pm.low_voltage_eligible());
        }
    }
}

/// Voting every non-excluded module asleep one by one opens the gate only
/// after the last vote; one UART1 vote closes it again.
#[test]
fn uart1_through_app3_scenario() {
    let pm = pm();
    let voters: Vec<SleepModule> = SleepModule::ALL
        .iter()
        .copied()
        .filter(|m| !LV_GATE_EXCLUDED.contains(m))
        .collect();
    assert_eq!(voters.first(), Some(&SleepModule::I2c1));
    assert_eq!(voters.last(), Some(&SleepModule::App3));

    for (i, module) in voters.iter().enumerate() {
        assert!(!pm.low_voltage_eligible(), "eligible before {} voted", i);
        pm.vote_sleep(*module, true, 0).unwrap();
    }
    assert!(pm.low_voltage_eligible());
    assert!(pm.lv_blockers().is_empty());

    pm.vote_sleep(SleepModule::Uart1, false, 0).unwrap();
    assert!(!pm.low_voltage_eligible());
}

/// Voting the same thing twice leaves the same state as voting it once.
#[test]
fn repeated_vote_is_idempotent() {
    let once = pm();
    let twice = pm();
    once.vote_sleep(SleepModule::Audio, true, 40).unwrap();
    twice.vote_sleep(SleepModule::Audio, true, 40).unwrap();
    twice.vote_sleep(SleepModule::Audio, true, 40).unwrap();

    assert_eq!(once.sleep_state(SleepModule::Audio), twice.sleep_state(SleepModule::Audio));
    assert_eq!(once.lv_blockers(), twice.lv_blockers());
    assert_eq!(once.low_voltage_eligible(), twice.low_voltage_eligible());
}

/// Excluded modules (BT, WiFi MAC, APP) can stay active without blocking.
#[test]
fn excluded_modules_never_block() {
    let pm = pm();
    for m in pm.config().lv_gate.iter() {
        pm.vote_sleep(m, true, 0).unwrap();
    }
    for m in LV_GATE_EXCLUDED {
        pm.vote_sleep(m, false, 0).unwrap();
    }
    assert!(pm.low_voltage_eligible());
}

/// Deep sleep needs every gated domain off; domains default to on.
#[test]
fn deep_sleep_gate_needs_every_domain_off() {
    let pm = pm();
    assert_eq!(pm.power_state(PowerModule::Audio), PowerState::On);
    assert!(!pm.deep_sleep_eligible());

    for domain in DEEP_SLEEP_DOMAINS {
        pm.vote_power(domain, PowerState::Off).unwrap();
    }
    assert!(pm.deep_sleep_eligible());

    pm.vote_power(PowerModule::WifiPhy, PowerState::On).unwrap();
    assert!(!pm.deep_sleep_eligible());

    // Not gated.
    pm.vote_power(PowerModule::WifiPhy, PowerState::Off).unwrap();
    pm.vote_power(PowerModule::Mem1, PowerState::On).unwrap();
    assert!(pm.deep_sleep_eligible());
}

/// Raw ids past the module count are rejected; reads return `None`.
#[test]
fn raw_ids_are_range_checked() {
    let pm = pm();
    let past_end = u8::try_from(SleepModule::COUNT).unwrap();
    assert_eq!(
        pm.vote_sleep_raw(past_end, true, 0),
        Err(pm_core::PmError::InvalidModule)
    );
    assert_eq!(pm.sleep_state_raw(past_end), None);
    assert_eq!(pm.sleep_state_raw(0), Some(false));
}

/// Votes cast from several threads at once all land; the last vote of each
/// module wins and the gate opens once every member has settled asleep.
#[test]
fn concurrent_voters_settle_consistently() {
    let pm = pm();
    let gate: Vec<SleepModule> = pm.config().lv_gate.iter().collect();
    let chunk = gate.len().div_ceil(4);

    std::thread::scope(|s| {
        for modules in gate.chunks(chunk) {
            let pm = &pm;
            s.spawn(move || {
                for round in 0..200u32 {
                    for m in modules {
                        pm.vote_sleep(*m, round & 1 == 0, round).unwrap();
                    }
                }
                for m in modules {
                    pm.vote_sleep(*m, true, 0).unwrap();
                }
            });
        }
        // Readers run against the writers without tearing the table.
        for _ in 0..200 {
            let _ = pm.low_voltage_eligible();
            let _ = pm.lv_blockers();
        }
    });

    assert!(pm.low_voltage_eligible());
    for m in &gate {
        assert!(pm.sleep_state(*m).asleep, "{} still awake", m.name());
    }
}
