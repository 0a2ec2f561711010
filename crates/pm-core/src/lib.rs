//! PM sleep-vote arbitration and message-dispatch core
//!
//! Many independent owners (peripheral drivers, radio stacks, application
//! slots) each express a preference about how deeply the SoC may sleep, which
//! power domains may be shut down and how fast the CPU must run. This crate
//! reduces those votes to one decision and carries it out from the RTOS idle
//! hook.
//!
//! # Architecture
//!
//! ```text
//!  drivers ──vote_sleep / vote_power / vote_cpu_freq──┐
//!                                                     ▼
//!  ISRs ──send_msg──► queue ──► worker ──────► PowerManager (votes, registries)
//!                                                     │
//!  RTOS idle task ──suppress_ticks_and_sleep──────────┘
//!                        │
//!            pre-sleep callbacks → device hooks → PmHal transition
//!            → wake reason → device hooks → post-sleep callbacks
//! ```
//!
//! # Reductions
//!
//! - Sleep: AND over the low-voltage gate (every member must vote asleep).
//! - Power: AND over the deep-sleep gate (every domain must vote off).
//! - CPU: MAX over per-device floors.
//!
//! # Features
//!
//! - `std`: `std::error::Error` impls and the platform mocks
//! - `defmt`: defmt logging and `defmt::Format` derives (hardware builds)
//! - `tracing`: tracing logging (desktop simulator)

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

// Must come first: the logging macros are textually scoped.
mod fmt;

pub mod callback;
pub mod config;
pub mod cpu_freq;
pub mod error;
pub mod idle;
pub mod lpo;
pub mod lv_timeout;
pub mod manager;
pub mod message;
pub mod module;
pub mod vote;
pub mod wakeup;
pub mod worker;

pub use callback::{CallbackId, DeviceSleepHooks, SleepCallback};
pub use config::PmConfig;
pub use error::PmError;
pub use lpo::{LpoParty, LpoSwitchListener};
pub use lv_timeout::LvTimeoutCallback;
pub use manager::{PmStatus, PowerManager, SystemPowerState};
pub use message::{PmMessage, WakeDetail, WakeupEvent};
pub use module::{DeviceId, ModuleId, ModuleSet, PowerModule, SleepModule};
pub use vote::{PowerState, SleepVote};
pub use wakeup::WakeupParam;
pub use worker::SendStats;

pub use platform::{
    AlarmId, CpuFrequency, GpioTrigger, GpioWake, LpoSource, PmHal, SleepMode, SleepOutcome,
    WakeupConfig, WakeupSource,
};
