//! PM core desktop simulator
//!
//! Runs the power manager on the host: a dedicated worker thread drains the
//! message queue, an idle thread plays the RTOS idle hook, a 10 ms task
//! stands in for the RTC heartbeat, and stdin takes `pm` console commands.
//!
//! Run with: `RUST_LOG=info cargo run -p simulator --bin pm-sim`

#![allow(missing_docs)]

mod console;
mod hal;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Context as _;
use embassy_time::Instant;
use pm_core::{
    LpoParty, LpoSource, LpoSwitchListener, ModuleId, ModuleSet, PmConfig, PmMessage,
    PowerManager, SleepMode, SleepModule, WakeupSource,
};
use static_cell::StaticCell;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::hal::{SimHal, WakeLine};

type Pm = PowerManager<SimHal>;

static PM: StaticCell<Pm> = StaticCell::new();

/// RTC heartbeat period.
const HEARTBEAT: StdDuration = StdDuration::from_millis(10);

/// Worker stack. Host threads need far more than the target's
/// `PM_THREAD_STACK_WORDS`.
const WORKER_STACK_BYTES: usize = 262_144;

/// Ticks the idle hook offers per call, as if the next timer were this far
/// out.
const IDLE_TICKS: u32 = 20;

/// Radio stack stand-in that logs the LPO handshake.
struct RadioClock(&'static str);

impl LpoSwitchListener for RadioClock {
    fn prepare(&self, target: LpoSource) {
        tracing::debug!(party = self.0, target = target.name(), "lpo: prepare");
    }

    fn completed(&self, running: LpoSource) {
        tracing::debug!(party = self.0, running = running.name(), "lpo: completed");
    }
}

static BT_CLOCK: RadioClock = RadioClock("bt");
static WIFI_CLOCK: RadioClock = RadioClock("wifi");

fn report_lv_timeout(blockers: ModuleSet<SleepModule>) {
    let names: Vec<&str> = blockers.iter().map(|m| m.name()).collect();
    tracing::warn!(blockers = %names.join(","), "low voltage held off too long");
}

fn trace_sleep(mode: SleepMode) {
    tracing::trace!(mode = mode.name(), "sleep transition");
}

fn spawn_worker(pm: &'static Pm) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("pm".into())
        .stack_size(WORKER_STACK_BYTES)
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread().build() {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!(error = %e, "pm: worker runtime failed");
                    return;
                }
            };
            rt.block_on(pm.run())
        })
        .context("spawning pm worker thread")?;
    Ok(())
}

fn spawn_idle(pm: &'static Pm) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("idle".into())
        .spawn(move || loop {
            if pm.suppress_ticks_and_sleep(IDLE_TICKS) == 0 {
                std::thread::sleep(StdDuration::from_millis(1));
            }
        })
        .context("spawning idle thread")?;
    Ok(())
}

async fn heartbeat(pm: &'static Pm, wake: Arc<WakeLine>) {
    let mut tick = tokio::time::interval(HEARTBEAT);
    loop {
        tick.tick().await;
        // The RTC interrupt ends the idle sleep before it queues anything.
        wake.raise(WakeupSource::Rtc);
        // Dropped heartbeats are counted by the core.
        let _ = pm.send_msg(PmMessage::rtc_heartbeat(pm.sleep_mode()));
        let now = Instant::now();
        if let Some(alarm) = pm.with_hal(|hal| hal.take_expired_alarm(now)) {
            let _ = pm.send_msg(PmMessage::AlarmExpired(alarm));
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let wake = Arc::new(WakeLine::new());
    let hal = SimHal::new(wake.clone());
    let pm: &'static Pm = PM.init(PowerManager::new(hal, PmConfig::default()));
    pm.register_lv_timeout_callback(&report_lv_timeout);
    pm.register_lpo_listener(LpoParty::Bt, &BT_CLOCK);
    pm.register_lpo_listener(LpoParty::Wifi, &WIFI_CLOCK);
    pm.register_pre_sleep(&trace_sleep, u8::MAX)?;

    spawn_worker(pm)?;
    spawn_idle(pm)?;
    tokio::spawn(heartbeat(pm, wake.clone()));

    println!("pm simulator; 'help' lists commands, ctrl-d quits");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        // A keystroke is a UART edge on target.
        wake.raise(WakeupSource::Gpio);
        match console::execute(pm, &line) {
            Ok(reply) if reply.is_empty() => {}
            Ok(reply) => println!("{reply}"),
            Err(e) => println!("error: {e}"),
        }
    }

    let (sleeps, cpu, lpo) = pm.with_hal(|hal| (hal.sleeps(), hal.cpu_frequency(), hal.lpo()));
    println!("{sleeps} sleeps; cpu {} MHz; lpo {}", cpu.mhz(), lpo.name());
    Ok(())
}
