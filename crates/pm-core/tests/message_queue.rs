//! PM message queue and worker behaviour.
//!
//! Producers never block; a full queue drops and counts. The worker handles
//! messages in FIFO order and is the only place wake events turn into vote
//! changes.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use embassy_time::Duration;
use platform::mocks::{HalCall, MockPmHal};
use pm_core::config::PM_QUEUE_DEPTH;
use pm_core::{
    AlarmId, ModuleSet, PmConfig, PmError, PmMessage, PowerManager, SleepMode, SleepModule,
    WakeDetail, WakeupEvent, WakeupSource,
};

fn pm() -> PowerManager<MockPmHal> {
    PowerManager::new(MockPmHal::new(), PmConfig::default())
}

fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

fn fill(pm: &PowerManager<MockPmHal>) {
    for _ in 0..PM_QUEUE_DEPTH {
        pm.send_msg(PmMessage::rtc_heartbeat(SleepMode::LowVoltage)).unwrap();
    }
}

// ── Producer side ───────────────────────────────────────────────────────

/// The send after the queue is full fails straight away instead of waiting
/// for the worker.
#[test]
fn send_to_full_queue_fails_immediately() {
    let pm = pm();
    fill(&pm);
    assert_eq!(pm.pending(), PM_QUEUE_DEPTH);

    let started = std::time::Instant::now();
    assert_eq!(pm.send_msg(PmMessage::EnterDeepSleep), Err(PmError::QueueFull));
    assert!(started.elapsed() < std::time::Duration::from_millis(100));

    let stats = pm.stats();
    assert_eq!(stats.success, 20);
    assert_eq!(stats.fail, 1);
}

/// 2500 drops produce exactly two reports, at drop 1000 and drop 2000.
#[test]
fn drop_reports_are_rate_limited() {
    let pm = pm();
    fill(&pm);

    for drop in 1..=2500u32 {
        let _ = pm.send_msg(PmMessage::EnterLowVoltage);
        let expected = drop / 1000;
        assert_eq!(pm.stats().drop_reports, expected, "after drop {}", drop);
    }
    assert_eq!(pm.stats().fail, 2500);
    assert_eq!(pm.stats().drop_reports, 2);
}

/// Draining frees room for new messages.
#[test]
fn queue_accepts_again_after_drain() {
    let pm = pm();
    fill(&pm);
    assert_eq!(pm.process_pending(), PM_QUEUE_DEPTH);
    pm.send_msg(PmMessage::EnterDeepSleep).unwrap();
    assert_eq!(pm.pending(), 1);
}

// ── Ordering ────────────────────────────────────────────────────────────

/// Messages take effect in the order they were sent.
#[test]
fn messages_are_handled_in_fifo_order() {
    let pm = pm();
    pm.send_msg(PmMessage::wakeup(SleepMode::LowVoltage, WakeupSource::Wifi)).unwrap();
    pm.send_msg(PmMessage::EnterDeepSleep).unwrap();
    pm.send_msg(PmMessage::wakeup(SleepMode::LowVoltage, WakeupSource::Bt)).unwrap();
    pm.send_msg(PmMessage::EnterLowVoltage).unwrap();
    pm.send_msg(PmMessage::wakeup(SleepMode::LowVoltage, WakeupSource::Usb)).unwrap();

    assert_eq!(pm.process_pending(), 5);
    assert_eq!(pm.sleep_wakeup_reason(), WakeupSource::Usb);
    assert_eq!(pm.sleep_mode(), SleepMode::LowVoltage);

    pm.send_msg(PmMessage::EnterLowVoltage).unwrap();
    pm.send_msg(PmMessage::EnterDeepSleep).unwrap();
    pm.process_pending();
    assert_eq!(pm.sleep_mode(), SleepMode::DeepSleep);
}

// ── Wake handling ───────────────────────────────────────────────────────

/// An RTC state-change edge holds its owner active until the repeat count
/// is reached, then releases it and restarts the count.
#[test]
fn rtc_edge_holds_owner_until_repeat_count() {
    let pm = pm();
    pm.vote_sleep(SleepModule::Timer1, true, 0).unwrap();

    let edge = PmMessage::rtc_edge(SleepMode::LowVoltage, SleepModule::Timer1, 3);
    for expected_edges in 1..=2 {
        pm.send_msg(edge).unwrap();
        pm.process_pending();
        assert!(!pm.sleep_state(SleepModule::Timer1).asleep);
        assert_eq!(pm.status().rtc_edges, expected_edges);
    }

    pm.send_msg(edge).unwrap();
    pm.process_pending();
    assert!(pm.sleep_state(SleepModule::Timer1).asleep);
    assert_eq!(pm.status().rtc_edges, 0);
    assert_eq!(pm.sleep_wakeup_reason(), WakeupSource::Rtc);
}

/// Heartbeats only bump a counter; they do not touch votes.
#[test]
fn heartbeat_is_counted_without_vote_changes() {
    let pm = pm();
    pm.vote_sleep(SleepModule::Timer1, true, 0).unwrap();
    for _ in 0..5 {
        pm.send_msg(PmMessage::rtc_heartbeat(SleepMode::LowVoltage)).unwrap();
    }
    pm.process_pending();
    assert_eq!(pm.status().heartbeats, 5);
    assert_eq!(pm.status().rtc_edges, 0);
    assert!(pm.sleep_state(SleepModule::Timer1).asleep);
}

/// A heartbeat after a real wake leaves the wake reason alone.
#[test]
fn heartbeat_keeps_last_wake_reason() {
    let pm = pm();
    pm.send_msg(PmMessage::wakeup(SleepMode::LowVoltage, WakeupSource::Usb))
        .unwrap();
    for _ in 0..3 {
        pm.send_msg(PmMessage::rtc_heartbeat(SleepMode::LowVoltage)).unwrap();
    }
    assert_eq!(pm.process_pending(), 4);

    assert_eq!(pm.sleep_wakeup_reason(), WakeupSource::Usb);
    assert_eq!(pm.status().heartbeats, 3);
}

/// A console GPIO wake in low voltage keeps LOG awake for the grace window.
#[test]
fn console_wake_opens_grace_window() {
    let pm = pm();
    pm.vote_sleep(SleepModule::Log, true, 0).unwrap();

    pm.send_msg(PmMessage::gpio(SleepMode::LowVoltage, true)).unwrap();
    pm.process_pending();

    assert!(!pm.sleep_state(SleepModule::Log).asleep);
    assert_eq!(pm.sleep_wakeup_reason(), WakeupSource::Gpio);
    let armed = pm.with_hal(|hal| {
        hal.calls()
            .contains(&HalCall::ArmAlarm(AlarmId::ConsoleGrace, Duration::from_secs(2)))
    });
    assert!(armed);

    pm.send_msg(PmMessage::AlarmExpired(AlarmId::ConsoleGrace)).unwrap();
    pm.process_pending();
    assert!(pm.sleep_state(SleepModule::Log).asleep);
}

/// Non-console pins and wakes from other modes leave LOG alone.
#[test]
fn other_gpio_wakes_do_not_touch_log() {
    let pm = pm();
    pm.vote_sleep(SleepModule::Log, true, 0).unwrap();

    pm.send_msg(PmMessage::gpio(SleepMode::LowVoltage, false)).unwrap();
    pm.send_msg(PmMessage::gpio(SleepMode::Normal, true)).unwrap();
    pm.process_pending();

    assert!(pm.sleep_state(SleepModule::Log).asleep);
    assert_eq!(pm.with_hal(|hal| hal.calls().len()), 0);
}

/// If the grace alarm cannot be armed LOG is released at once rather than
/// being held awake forever.
#[test]
fn failed_grace_alarm_releases_log() {
    let pm = pm();
    pm.vote_sleep(SleepModule::Log, true, 0).unwrap();
    pm.with_hal(MockPmHal::fail_next);

    pm.send_msg(PmMessage::gpio(SleepMode::LowVoltage, true)).unwrap();
    pm.process_pending();

    assert!(pm.sleep_state(SleepModule::Log).asleep);
}

/// A detail that does not belong to the source is ignored.
#[test]
fn mismatched_wake_detail_is_ignored() {
    let pm = pm();
    let odd = PmMessage::CallbackHandle(WakeupEvent {
        mode: SleepMode::LowVoltage,
        source: WakeupSource::Gpio,
        detail: WakeDetail::RtcEdge {
            owner: SleepModule::Uart1,
            repeat: 1,
        },
    });
    pm.send_msg(odd).unwrap();
    pm.send_msg(PmMessage::wakeup(SleepMode::LowVoltage, WakeupSource::None)).unwrap();
    assert_eq!(pm.process_pending(), 2);

    assert_eq!(pm.sleep_wakeup_reason(), WakeupSource::None);
    assert!(!pm.sleep_state(SleepModule::Uart1).asleep);
}

/// A deep-sleep wake is remembered separately from later shallow wakes.
#[test]
fn deep_sleep_wake_source_is_kept() {
    let pm = pm();
    pm.send_msg(PmMessage::wakeup(SleepMode::DeepSleep, WakeupSource::Touch)).unwrap();
    pm.send_msg(PmMessage::gpio(SleepMode::LowVoltage, false)).unwrap();
    pm.process_pending();

    assert_eq!(pm.deep_sleep_wakeup_source(), WakeupSource::Touch);
    assert_eq!(pm.sleep_wakeup_reason(), WakeupSource::Gpio);
}

// ── Enter-LV timeout ────────────────────────────────────────────────────

/// Blocked low voltage is reported once after the timeout, with the
/// modules still voting active.
#[test]
fn lv_timeout_reports_blockers_once() {
    let pm = pm();
    let reported: &'static Mutex<Vec<ModuleSet<SleepModule>>> = leak(Mutex::new(Vec::new()));
    pm.register_lv_timeout_callback(leak(move |blockers: ModuleSet<SleepModule>| {
        reported.lock().unwrap().push(blockers);
    }));
    for m in pm.config().lv_gate.iter() {
        pm.vote_sleep(m, true, 0).unwrap();
    }
    pm.vote_sleep(SleepModule::Dma, false, 0).unwrap();

    let heartbeat = PmMessage::rtc_heartbeat(SleepMode::Normal);
    pm.send_msg(heartbeat).unwrap();
    pm.process_pending();
    assert!(reported.lock().unwrap().is_empty());

    pm.with_hal(|hal| hal.advance(Duration::from_secs(30)));
    pm.send_msg(heartbeat).unwrap();
    pm.send_msg(heartbeat).unwrap();
    pm.process_pending();

    let reports = reported.lock().unwrap().clone();
    assert_eq!(reports, vec![ModuleSet::empty().with(SleepModule::Dma)]);
}

/// Once the gate opens the episode ends, and a later block starts a new one.
#[test]
fn lv_timeout_rearms_after_gate_opens() {
    let pm = pm();
    for m in pm.config().lv_gate.iter() {
        pm.vote_sleep(m, true, 0).unwrap();
    }
    pm.vote_sleep(SleepModule::Dma, false, 0).unwrap();
    assert!(!pm.check_enter_lv_timeout());
    pm.with_hal(|hal| hal.advance(Duration::from_secs(31)));
    assert!(pm.check_enter_lv_timeout());

    pm.vote_sleep(SleepModule::Dma, true, 0).unwrap();
    assert!(!pm.check_enter_lv_timeout());

    pm.vote_sleep(SleepModule::Dma, false, 0).unwrap();
    assert!(!pm.check_enter_lv_timeout());
    pm.with_hal(|hal| hal.advance(Duration::from_secs(31)));
    assert!(pm.check_enter_lv_timeout());
}

/// With the requested mode at normal nothing is "wanted", so nothing fires.
#[test]
fn lv_timeout_is_quiet_in_normal_mode() {
    let pm = pm();
    pm.set_sleep_mode(SleepMode::Normal);
    assert!(!pm.check_enter_lv_timeout());
    pm.with_hal(|hal| hal.advance(Duration::from_secs(60)));
    assert!(!pm.check_enter_lv_timeout());
}

// ── Worker loop ─────────────────────────────────────────────────────────

/// The async worker drains what was queued before it started and picks up
/// messages sent while it waits.
#[tokio::test]
async fn worker_loop_handles_messages() {
    let pm = pm();
    pm.send_msg(PmMessage::EnterDeepSleep).unwrap();

    let sender = async {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        pm.send_msg(PmMessage::wakeup(SleepMode::LowVoltage, WakeupSource::Usb)).unwrap();
    };
    let worker = tokio::time::timeout(std::time::Duration::from_millis(100), pm.run());
    let (timed_out, ()) = tokio::join!(worker, sender);

    assert!(timed_out.is_err());
    assert_eq!(pm.pending(), 0);
    assert_eq!(pm.sleep_mode(), SleepMode::DeepSleep);
    assert_eq!(pm.sleep_wakeup_reason(), WakeupSource::Usb);
}

// ── Concurrency ─────────────────────────────────────────────────────────

/// A producer racing the worker never loses a message: every send is
/// either accepted and later handled, or counted as dropped.
#[test]
fn concurrent_send_and_drain_accounts_for_every_message() {
    const SENT: u32 = 500;
    let pm = pm();
    let done = AtomicBool::new(false);

    let handled = std::thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..SENT {
                let _ = pm.send_msg(PmMessage::EnterLowVoltage);
            }
            done.store(true, Ordering::Release);
        });

        let mut handled = 0usize;
        loop {
            let finished = done.load(Ordering::Acquire);
            handled += pm.process_pending();
            if finished && pm.pending() == 0 {
                break handled;
            }
            std::thread::yield_now();
        }
    });

    let stats = pm.stats();
    assert_eq!(stats.success + stats.fail, SENT);
    assert_eq!(handled, stats.success as usize);
}
