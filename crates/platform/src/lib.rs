//! Board abstraction for the PM core
//!
//! Shared power-state types and the [`PmHal`] trait that separates the
//! arbitration logic in `pm-core` from register-level sleep control.
//!
//! # Architecture Layers
//!
//! ```text
//! Drivers / application
//!         ↓
//! PM core (pm-core crate: votes, queue, idle hook)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Board support (sleep controller, RTC, clock tree)
//! ```
//!
//! # Features
//!
//! - `std`: Enable standard library support and [`mocks`] (for testing)
//! - `defmt`: Enable defmt logging

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

pub mod mocks;
pub mod power;

pub use power::{
    AlarmId, CpuFrequency, GpioTrigger, GpioWake, LpoSource, PmHal, SleepMode, SleepOutcome,
    WakeupConfig, WakeupSource, MAX_GPIO_WAKE_PINS,
};
