//! Message queue and worker.
//!
//! Interrupt handlers hand work to the PM core through [`PowerManager::send_msg`],
//! which never blocks: when the 20-deep queue is full the message is dropped
//! and counted. A single consumer drains the queue in FIFO order, either the
//! dedicated worker ([`PowerManager::run`]) or a polling loop
//! ([`PowerManager::process_pending`]).
//!
//! # Architecture
//!
//! ```text
//!  GPIO / RTC / radio ISR ──try_send──► Channel<PmMessage, 20> ──receive──► worker
//!                                                                            │
//!                                           votes, wake reason, alarms ◄─────┘
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

use platform::{AlarmId, PmHal, SleepMode, WakeupSource};

use crate::error::PmError;
use crate::manager::{PowerManager, SystemPowerState};
use crate::message::{PmMessage, WakeDetail, WakeupEvent};
use crate::module::{ModuleId, SleepModule};

/// Queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendStats {
    /// Messages accepted.
    pub success: u32,
    /// Messages dropped because the queue was full.
    pub fail: u32,
    /// Rate-limited "queue full" reports emitted.
    pub drop_reports: u32,
}

pub(crate) struct SendCounters {
    success: AtomicU32,
    fail: AtomicU32,
    drop_reports: AtomicU32,
}

impl SendCounters {
    pub(crate) const fn new() -> Self {
        Self {
            success: AtomicU32::new(0),
            fail: AtomicU32::new(0),
            drop_reports: AtomicU32::new(0),
        }
    }
}

impl<H: PmHal> PowerManager<H> {
    /// Enqueue `msg` without blocking. Safe from interrupt context.
    ///
    /// # Errors
    ///
    /// [`PmError::QueueFull`] if the queue has no room; the message is
    /// dropped. Every `drop_log_interval`-th drop is logged.
    pub fn send_msg(&self, msg: PmMessage) -> Result<(), PmError> {
        match self.queue.try_send(msg) {
            Ok(()) => {
                self.counters.success.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => {
                let fails = self
                    .counters
                    .fail
                    .fetch_add(1, Ordering::Relaxed)
                    .wrapping_add(1);
                if fails.checked_rem(self.config.drop_log_interval) == Some(0) {
                    self.counters.drop_reports.fetch_add(1, Ordering::Relaxed);
                    error!("pm: queue full, {} messages dropped", fails);
                }
                Err(PmError::QueueFull)
            }
        }
    }

    /// Queue counters since boot.
    pub fn stats(&self) -> SendStats {
        SendStats {
            success: self.counters.success.load(Ordering::Relaxed),
            fail: self.counters.fail.load(Ordering::Relaxed),
            drop_reports: self.counters.drop_reports.load(Ordering::Relaxed),
        }
    }

    /// Messages waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Worker loop. Blocks on the queue and handles one message at a time.
    pub async fn run(&self) -> ! {
        info!("pm: worker started");
        loop {
            let msg = self.queue.receive().await;
            self.handle(msg);
        }
    }

    /// Handle everything currently queued and return how many messages that
    /// was. For polling builds without a worker thread.
    pub fn process_pending(&self) -> usize {
        let mut handled = 0usize;
        while let Ok(msg) = self.queue.try_receive() {
            self.handle(msg);
            handled = handled.saturating_add(1);
        }
        handled
    }

    fn handle(&self, msg: PmMessage) {
        match msg {
            PmMessage::CallbackHandle(event) => self.handle_wakeup(event),
            PmMessage::EnterLowVoltage => self.set_sleep_mode(SleepMode::LowVoltage),
            PmMessage::EnterDeepSleep => self.set_sleep_mode(SleepMode::DeepSleep),
            PmMessage::AlarmExpired(AlarmId::ConsoleGrace) => {
                self.state
                    .lock(|s| s.borrow_mut().votes.vote_sleep(SleepModule::Log, true, 0));
                debug!("pm: console grace over");
            }
        }
    }

    fn handle_wakeup(&self, event: WakeupEvent) {
        match (event.source, event.detail) {
            // Cheap path: this fires every ~10 ms. The tick is not a wake
            // reason and leaves the power state alone.
            (WakeupSource::Rtc, WakeDetail::Heartbeat) => {
                self.state.lock(|s| {
                    let mut s = s.borrow_mut();
                    s.heartbeats = s.heartbeats.wrapping_add(1);
                });
                self.check_enter_lv_timeout();
            }
            (WakeupSource::Rtc, WakeDetail::RtcEdge { owner, repeat }) => {
                let edges = self.state.lock(|s| {
                    let mut s = s.borrow_mut();
                    record_wake(&mut s, event);
                    s.rtc_edges = s.rtc_edges.wrapping_add(1);
                    let edges = s.rtc_edges;
                    if edges >= repeat {
                        s.votes.vote_sleep(owner, true, 0);
                        s.rtc_edges = 0;
                    } else {
                        s.votes.vote_sleep(owner, false, 0);
                    }
                    edges
                });
                info!(
                    "pm: rtc wake from {} for {}, edge {}/{}",
                    event.mode.name(),
                    owner.name(),
                    edges,
                    repeat
                );
            }
            (WakeupSource::Gpio, WakeDetail::Gpio { console }) => {
                self.state.lock(|s| record_wake(&mut s.borrow_mut(), event));
                info!("pm: gpio wake from {}", event.mode.name());
                if console && event.mode == SleepMode::LowVoltage {
                    self.start_console_grace();
                }
            }
            (source, WakeDetail::None) if source != WakeupSource::None => {
                self.state.lock(|s| record_wake(&mut s.borrow_mut(), event));
                info!("pm: {} wake from {}", source.name(), event.mode.name());
            }
            _ => debug!("pm: ignoring {} wake with mismatched detail", event.source.name()),
        }
    }

    /// Hold LOG awake so the console can take input, and arm the alarm that
    /// releases it again.
    fn start_console_grace(&self) {
        self.state
            .lock(|s| s.borrow_mut().votes.vote_sleep(SleepModule::Log, false, 0));
        let grace = self.config.console_grace;
        let armed = self
            .hal
            .lock(|hal| hal.borrow_mut().arm_alarm(AlarmId::ConsoleGrace, grace));
        if armed.is_err() {
            error!("pm: console grace alarm failed, releasing log");
            self.state
                .lock(|s| s.borrow_mut().votes.vote_sleep(SleepModule::Log, true, 0));
        }
    }
}

fn record_wake(state: &mut crate::manager::PmState, event: WakeupEvent) {
    state.wakeup.record(event.mode, event.source);
    state.current = SystemPowerState::Active;
}
